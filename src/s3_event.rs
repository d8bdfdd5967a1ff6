use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};

/// 网页上传的视频已经分析过，通知里带这个标记的直接跳过
pub const WEB_UPLOAD_MARKER: &str = "WEB_UPLOAD";

/// S3 事件通知
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct S3Event {
    #[serde(rename = "Records", default)]
    pub records: Vec<S3EventRecord>,
}

/// S3 事件记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3EventRecord {
    /// 事件名称（例如 ObjectCreated:Put）
    #[serde(rename = "eventName", default)]
    pub event_name: String,

    #[serde(rename = "awsRegion", default)]
    pub aws_region: String,

    pub s3: S3Entity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Entity {
    #[serde(default)]
    pub bucket: BucketInfo,

    pub object: ObjectInfo,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BucketInfo {
    #[serde(default)]
    pub name: String,
}

/// 对象信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectInfo {
    /// 键（URL 编码过的文件路径）
    pub key: String,

    #[serde(default)]
    pub size: Option<i64>,
}

impl S3Event {
    /// 需要分析的视频键（仅 .mp4，大小写不敏感）
    pub fn video_keys(&self) -> Vec<String> {
        self.records
            .iter()
            .map(|r| r.s3.object.key.clone())
            .filter(|key| key.to_lowercase().ends_with(".mp4"))
            .collect()
    }
}

/// 通知内容里是否带网页上传标记
pub fn is_web_upload(raw: &serde_json::Value) -> bool {
    raw.to_string().contains(WEB_UPLOAD_MARKER)
}

/// 还原事件通知里的对象键（`+` 为空格，再做百分号解码）
pub fn decode_object_key(key: &str) -> String {
    let plus_decoded = key.replace('+', " ");
    percent_decode_str(&plus_decoded)
        .decode_utf8_lossy()
        .into_owned()
}

/// 对象键的文件名部分
pub fn file_name_of(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

/// 处理请求的响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub status: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// 已提交分析的视频键
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub accepted: Vec<String>,
}
