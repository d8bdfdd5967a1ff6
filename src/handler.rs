use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::Json as ResponseJson,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::processor::{AnalysisReport, ModelStatus};
use crate::s3_event::{is_web_upload, S3Event, WebhookResponse};
use crate::service::ViolationService;

/// 路由共享状态
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ViolationService>,
}

/// 服务状态
#[derive(Debug, Serialize)]
pub struct ServiceStatus {
    pub status: String,
    pub service: String,
    pub models: ModelStatus,
    /// 正在处理的任务数
    pub in_progress: usize,
}

pub async fn root(State(state): State<AppState>) -> ResponseJson<ServiceStatus> {
    ResponseJson(ServiceStatus {
        status: "running".to_string(),
        service: "violation-parse".to_string(),
        models: state.service.analyzer().model_status(),
        in_progress: state.service.registry().len(),
    })
}

/// 健康检查
pub async fn health_check() -> &'static str {
    "OK"
}

/// 处理 S3 上传通知
///
/// 每个 .mp4 记录各自起一个后台任务，立即返回。
pub async fn handle_s3_webhook(
    State(state): State<AppState>,
    Json(raw): Json<serde_json::Value>,
) -> Result<ResponseJson<WebhookResponse>, (StatusCode, String)> {
    if is_web_upload(&raw) {
        info!("🚫 网页上传的视频已分析过，跳过");
        return Ok(ResponseJson(WebhookResponse {
            status: "skipped".to_string(),
            reason: Some("already_analyzed_in_web".to_string()),
            accepted: Vec::new(),
        }));
    }

    let event: S3Event = serde_json::from_value(raw).map_err(|e| {
        warn!("无法解析 S3 通知: {}", e);
        (StatusCode::BAD_REQUEST, format!("无法解析 S3 通知: {}", e))
    })?;

    let keys = event.video_keys();
    for key in &keys {
        info!("🔔 收到 S3 通知: {}", key);
        let service = state.service.clone();
        let key = key.clone();
        tokio::spawn(async move {
            service.process(&key).await;
        });
    }

    Ok(ResponseJson(WebhookResponse {
        status: "ok".to_string(),
        reason: None,
        accepted: keys,
    }))
}

/// 本地分析请求
#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    /// 本地视频路径
    pub input: String,
}

/// 直接分析服务器本地的视频
pub async fn handle_analyze(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<ResponseJson<AnalysisReport>, (StatusCode, String)> {
    info!("收到分析请求: {}", request.input);
    let analyzer = state.service.analyzer().clone();
    let path = PathBuf::from(request.input);
    let report = tokio::task::spawn_blocking(move || analyzer.analyze(&path))
        .await
        .map_err(|e| {
            error!("分析任务异常退出: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("分析任务异常退出: {}", e),
            )
        })?;
    Ok(ResponseJson(report))
}
