use anyhow::Result;
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::models::ChannelOrder;

/// 分析参数
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// 分类窗口长度（帧）
    pub window_length: usize,
    /// 窗口步长（帧）
    pub stride: usize,
    /// 分类器输出顺序对应的违章类别
    pub categories: Vec<String>,
    /// 违章判定置信度下限
    pub min_confidence: f32,
    /// 通用目标检测置信度下限
    pub detection_floor: f32,
    /// 车牌检测置信度下限
    pub plate_floor: f32,
    /// 车牌检测框外扩像素
    pub plate_pad: u32,
    /// 车牌投票确认所需的最少次数
    pub min_plate_votes: usize,
    /// 地点（暂无定位，固定值）
    pub location: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            window_length: 50,
            stride: 10,
            categories: vec![
                "신호위반".to_string(),
                "중앙선침범".to_string(),
                "진로변경위반".to_string(),
            ],
            min_confidence: 0.5,
            detection_floor: 0.4,
            plate_floor: 0.4,
            plate_pad: 5,
            min_plate_votes: 2,
            location: "--".to_string(),
        }
    }
}

/// 模型文件
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub object_detector: PathBuf,
    /// 类别名文件（每行一个），缺省时使用 class_{i}
    pub object_labels: Option<PathBuf>,
    pub plate_detector: PathBuf,
    pub classifier: PathBuf,
    /// 检测模型输入边长
    pub detector_input_size: u32,
    /// 分类模型每帧边长
    pub classifier_input_size: u32,
    pub classifier_channel_order: ChannelOrder,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            object_detector: PathBuf::from("models/object_detector.onnx"),
            object_labels: None,
            plate_detector: PathBuf::from("models/license_plate_detector.onnx"),
            classifier: PathBuf::from("models/violation_classifier.onnx"),
            detector_input_size: 640,
            classifier_input_size: 128,
            classifier_channel_order: ChannelOrder::Bgr,
        }
    }
}

/// OCR 引擎（名称 + 服务地址）
#[derive(Debug, Clone)]
pub struct OcrConfig {
    pub engines: Vec<(String, String)>,
    pub timeout_secs: u64,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            engines: Vec::new(),
            timeout_secs: 10,
        }
    }
}

/// 对象存储
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub bucket: Option<String>,
    pub region: String,
    /// 自定义 endpoint（兼容 S3 的服务），缺省为 AWS
    pub endpoint: Option<String>,
    /// 预签名 URL 有效期（秒）
    pub presign_expires_secs: u64,
    /// 下载视频的临时目录
    pub temp_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: None,
            region: "ap-southeast-2".to_string(),
            endpoint: None,
            presign_expires_secs: 3600,
            temp_dir: PathBuf::from("temp_videos"),
        }
    }
}

/// 结果转发
#[derive(Debug, Clone)]
pub struct ForwardingConfig {
    pub enabled: bool,
    pub url: String,
    pub timeout_secs: u64,
}

impl Default for ForwardingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: "http://backend:8080/api/violations".to_string(),
            timeout_secs: 3,
        }
    }
}

/// 举报草稿生成（OpenAI 兼容接口）
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.groq.com/openai/v1/chat/completions".to_string(),
            api_key: None,
            model: "llama-3.3-70b-versatile".to_string(),
            timeout_secs: 60,
        }
    }
}

/// 完整服务配置
#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    pub analysis: AnalysisConfig,
    pub models: ModelConfig,
    pub ocr: OcrConfig,
    pub storage: StorageConfig,
    pub forwarding: ForwardingConfig,
    pub llm: LlmConfig,
    /// 日志级别（trace, debug, info, warn, error）
    pub log_level: String,
}

/// 命令行覆盖项
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub log_level: Option<String>,
    pub min_confidence: Option<f32>,
    pub location: Option<String>,
    pub forward_url: Option<String>,
}

/// 单一来源（配置文件或环境变量）的取值
trait Source {
    fn get(&self, section: &str, key: &str) -> Option<String>;

    fn parse<T: FromStr>(&self, section: &str, key: &str) -> Option<T> {
        self.get(section, key).and_then(|v| v.trim().parse().ok())
    }
}

struct FileSource(Option<configparser::ini::Ini>);

impl Source for FileSource {
    fn get(&self, section: &str, key: &str) -> Option<String> {
        let ini = self.0.as_ref()?;
        ini.get(section, key)
            .or_else(|| ini.get("DEFAULT", key))
            .filter(|v| !v.is_empty())
    }
}

/// 环境变量 `VIOLATION_PARSE_{SECTION}_{KEY}`，另外兼容几个常用的通用变量名
struct EnvSource;

impl EnvSource {
    fn alias(section: &str, key: &str) -> Option<&'static str> {
        match (section, key) {
            ("storage", "bucket") => Some("S3_BUCKET_NAME"),
            ("storage", "region") => Some("AWS_REGION"),
            ("llm", "api_key") => Some("GROQ_API_KEY"),
            ("logging", "level") => Some("LOG_LEVEL"),
            _ => None,
        }
    }
}

impl Source for EnvSource {
    fn get(&self, section: &str, key: &str) -> Option<String> {
        let name = format!(
            "VIOLATION_PARSE_{}_{}",
            section.to_uppercase(),
            key.to_uppercase()
        );
        env::var(name)
            .ok()
            .or_else(|| Self::alias(section, key).and_then(|alias| env::var(alias).ok()))
            .filter(|v| !v.is_empty())
    }
}

/// 环境变量优先于配置文件
struct Layered {
    env: EnvSource,
    file: FileSource,
}

impl Source for Layered {
    fn get(&self, section: &str, key: &str) -> Option<String> {
        self.env
            .get(section, key)
            .or_else(|| self.file.get(section, key))
    }
}

/// 配置加载器
pub struct ConfigLoader;

impl ConfigLoader {
    /// 从多个源加载配置，优先级：命令行参数 > 环境变量 > 配置文件 > 默认值
    pub fn load(config_file: Option<&Path>, cli: &CliOverrides) -> Result<ServiceConfig> {
        let file = match config_file {
            // 显式指定的配置文件必须能读
            Some(path) => Some(Self::load_ini(path)?),
            None => Self::find_default_location()
                .map(|path| Self::load_ini(&path))
                .transpose()?,
        };
        let source = Layered {
            env: EnvSource,
            file: FileSource(file),
        };

        let mut config = Self::from_source(&source);

        if let Some(level) = &cli.log_level {
            config.log_level = level.clone();
        }
        if let Some(min_confidence) = cli.min_confidence {
            config.analysis.min_confidence = min_confidence;
        }
        if let Some(location) = &cli.location {
            config.analysis.location = location.clone();
        }
        if let Some(url) = &cli.forward_url {
            config.forwarding.url = url.clone();
        }

        Ok(config)
    }

    fn from_source(source: &impl Source) -> ServiceConfig {
        let d = ServiceConfig::default();

        let analysis = AnalysisConfig {
            window_length: source
                .parse("analysis", "window_length")
                .unwrap_or(d.analysis.window_length),
            stride: source
                .parse("analysis", "stride")
                .unwrap_or(d.analysis.stride),
            categories: source
                .get("analysis", "categories")
                .map(|v| split_list(&v))
                .filter(|v| !v.is_empty())
                .unwrap_or(d.analysis.categories),
            min_confidence: source
                .parse("analysis", "min_confidence")
                .unwrap_or(d.analysis.min_confidence),
            detection_floor: source
                .parse("analysis", "detection_floor")
                .unwrap_or(d.analysis.detection_floor),
            plate_floor: source
                .parse("analysis", "plate_floor")
                .unwrap_or(d.analysis.plate_floor),
            plate_pad: source
                .parse("analysis", "plate_pad")
                .unwrap_or(d.analysis.plate_pad),
            min_plate_votes: source
                .parse("analysis", "min_plate_votes")
                .unwrap_or(d.analysis.min_plate_votes),
            location: source
                .get("analysis", "location")
                .unwrap_or(d.analysis.location),
        };

        let models = ModelConfig {
            object_detector: source
                .get("models", "object_detector")
                .map(PathBuf::from)
                .unwrap_or(d.models.object_detector),
            object_labels: source
                .get("models", "object_labels")
                .map(PathBuf::from),
            plate_detector: source
                .get("models", "plate_detector")
                .map(PathBuf::from)
                .unwrap_or(d.models.plate_detector),
            classifier: source
                .get("models", "classifier")
                .map(PathBuf::from)
                .unwrap_or(d.models.classifier),
            detector_input_size: source
                .parse("models", "detector_input_size")
                .unwrap_or(d.models.detector_input_size),
            classifier_input_size: source
                .parse("models", "classifier_input_size")
                .unwrap_or(d.models.classifier_input_size),
            classifier_channel_order: source
                .parse("models", "classifier_channel_order")
                .unwrap_or(d.models.classifier_channel_order),
        };

        let ocr = OcrConfig {
            engines: source
                .get("ocr", "engines")
                .map(|v| parse_engines(&v))
                .unwrap_or(d.ocr.engines),
            timeout_secs: source
                .parse("ocr", "timeout_secs")
                .unwrap_or(d.ocr.timeout_secs),
        };

        let storage = StorageConfig {
            bucket: source.get("storage", "bucket"),
            region: source
                .get("storage", "region")
                .unwrap_or(d.storage.region),
            endpoint: source.get("storage", "endpoint"),
            presign_expires_secs: source
                .parse("storage", "presign_expires_secs")
                .unwrap_or(d.storage.presign_expires_secs),
            temp_dir: source
                .get("storage", "temp_dir")
                .map(PathBuf::from)
                .unwrap_or(d.storage.temp_dir),
        };

        let forwarding = ForwardingConfig {
            enabled: source
                .get("forwarding", "enabled")
                .map(|v| parse_bool(&v))
                .unwrap_or(d.forwarding.enabled),
            url: source
                .get("forwarding", "url")
                .unwrap_or(d.forwarding.url),
            timeout_secs: source
                .parse("forwarding", "timeout_secs")
                .unwrap_or(d.forwarding.timeout_secs),
        };

        let llm = LlmConfig {
            api_url: source.get("llm", "api_url").unwrap_or(d.llm.api_url),
            api_key: source.get("llm", "api_key"),
            model: source.get("llm", "model").unwrap_or(d.llm.model),
            timeout_secs: source
                .parse("llm", "timeout_secs")
                .unwrap_or(d.llm.timeout_secs),
        };

        let log_level = source
            .get("logging", "level")
            .unwrap_or_else(|| "info".to_string());

        ServiceConfig {
            analysis,
            models,
            ocr,
            storage,
            forwarding,
            llm,
            log_level,
        }
    }

    fn load_ini(config_path: &Path) -> Result<configparser::ini::Ini> {
        if !config_path.exists() {
            return Err(anyhow::anyhow!("配置文件不存在: {}", config_path.display()));
        }

        let mut config_parser = configparser::ini::Ini::new();
        config_parser
            .load(config_path)
            .map_err(|e| anyhow::anyhow!("读取配置文件失败: {}: {}", config_path.display(), e))?;
        Ok(config_parser)
    }

    /// 默认位置依次查找
    fn find_default_location() -> Option<PathBuf> {
        // 1. 当前目录的 violation-parse.ini
        // 2. 当前目录的 .violation-parse.ini
        let mut candidates = vec![
            PathBuf::from("violation-parse.ini"),
            PathBuf::from(".violation-parse.ini"),
        ];

        // 3. 用户主目录的 .violation-parse.ini
        if let Some(home) = env::var_os("HOME") {
            candidates.push(PathBuf::from(home).join(".violation-parse.ini"));
        }

        // 4. /etc/violation-parse.ini (Linux/macOS)
        candidates.push(PathBuf::from("/etc/violation-parse.ini"));

        candidates.into_iter().find(|p| p.exists())
    }

    /// 创建默认配置文件
    pub fn create_default_config(config_path: &Path) -> Result<()> {
        let d = ServiceConfig::default();
        let mut config_parser = configparser::ini::Ini::new();
        let mut set = |section: &str, key: &str, value: String| {
            config_parser.set(section, key, Some(value));
        };

        set("analysis", "window_length", d.analysis.window_length.to_string());
        set("analysis", "stride", d.analysis.stride.to_string());
        set("analysis", "categories", d.analysis.categories.join(","));
        set("analysis", "min_confidence", d.analysis.min_confidence.to_string());
        set("analysis", "detection_floor", d.analysis.detection_floor.to_string());
        set("analysis", "plate_floor", d.analysis.plate_floor.to_string());
        set("analysis", "plate_pad", d.analysis.plate_pad.to_string());
        set("analysis", "min_plate_votes", d.analysis.min_plate_votes.to_string());
        set("analysis", "location", d.analysis.location.clone());

        set("models", "object_detector", d.models.object_detector.display().to_string());
        set("models", "object_labels", String::new());
        set("models", "plate_detector", d.models.plate_detector.display().to_string());
        set("models", "classifier", d.models.classifier.display().to_string());
        set("models", "detector_input_size", d.models.detector_input_size.to_string());
        set("models", "classifier_input_size", d.models.classifier_input_size.to_string());
        set("models", "classifier_channel_order", d.models.classifier_channel_order.to_string());

        set("ocr", "engines", String::new());
        set("ocr", "timeout_secs", d.ocr.timeout_secs.to_string());

        set("storage", "bucket", String::new());
        set("storage", "region", d.storage.region.clone());
        set("storage", "endpoint", String::new());
        set("storage", "presign_expires_secs", d.storage.presign_expires_secs.to_string());
        set("storage", "temp_dir", d.storage.temp_dir.display().to_string());

        set("forwarding", "enabled", d.forwarding.enabled.to_string());
        set("forwarding", "url", d.forwarding.url.clone());
        set("forwarding", "timeout_secs", d.forwarding.timeout_secs.to_string());

        set("llm", "api_url", d.llm.api_url.clone());
        set("llm", "api_key", String::new());
        set("llm", "model", d.llm.model.clone());
        set("llm", "timeout_secs", d.llm.timeout_secs.to_string());

        set("logging", "level", "info".to_string());

        config_parser
            .write(config_path)
            .map_err(|e| anyhow::anyhow!("写入配置文件失败: {}: {}", config_path.display(), e))?;

        Ok(())
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_bool(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

/// `paddle=http://host:8866/ocr, easy=http://host:8867/ocr`
fn parse_engines(value: &str) -> Vec<(String, String)> {
    split_list(value)
        .into_iter()
        .filter_map(|entry| {
            let (name, url) = entry.split_once('=')?;
            let (name, url) = (name.trim(), url.trim());
            if name.is_empty() || url.is_empty() {
                return None;
            }
            Some((name.to_string(), url.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_list_parsing_skips_malformed_entries() {
        let engines = parse_engines("paddle=http://a/ocr, broken, =http://x, easy = http://b/ocr");
        assert_eq!(
            engines,
            vec![
                ("paddle".to_string(), "http://a/ocr".to_string()),
                ("easy".to_string(), "http://b/ocr".to_string()),
            ]
        );
    }

    #[test]
    fn file_values_override_defaults() {
        let mut ini = configparser::ini::Ini::new();
        ini.set("analysis", "min_confidence", Some("0.7".to_string()));
        ini.set("analysis", "categories", Some("a, b".to_string()));
        ini.set("models", "classifier_channel_order", Some("rgb".to_string()));
        ini.set("forwarding", "enabled", Some("false".to_string()));
        ini.set("storage", "bucket", Some("".to_string()));

        let config = ConfigLoader::from_source(&FileSource(Some(ini)));
        assert_eq!(config.analysis.min_confidence, 0.7);
        assert_eq!(config.analysis.categories, vec!["a", "b"]);
        assert_eq!(config.models.classifier_channel_order, ChannelOrder::Rgb);
        assert!(!config.forwarding.enabled);
        assert_eq!(config.storage.bucket, None);
        assert_eq!(config.analysis.window_length, 50);
    }

    #[test]
    fn unparsable_values_fall_back_to_defaults() {
        let mut ini = configparser::ini::Ini::new();
        ini.set("analysis", "stride", Some("ten".to_string()));
        let config = ConfigLoader::from_source(&FileSource(Some(ini)));
        assert_eq!(config.analysis.stride, 10);
    }
}
