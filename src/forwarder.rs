use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{info, warn};

use crate::payload::IncidentPayload;

/// 违章记录转发
#[async_trait]
pub trait ResultForwarder: Send + Sync {
    async fn forward(&self, payload: &IncidentPayload) -> Result<()>;
}

/// 以 JSON POST 到记录服务
pub struct HttpResultForwarder {
    client: reqwest::Client,
    url: String,
}

impl HttpResultForwarder {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .context("创建 HTTP 客户端失败")?,
            url: url.into(),
        })
    }
}

#[async_trait]
impl ResultForwarder for HttpResultForwarder {
    async fn forward(&self, payload: &IncidentPayload) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(payload)
            .send()
            .await
            .context("转发请求失败")?;

        let status = response.status();
        if status.is_success() {
            info!("📡 违章记录已转发: {}", self.url);
            Ok(())
        } else {
            let error_text = response.text().await.unwrap_or_default();
            warn!("记录服务返回错误状态: {} - {}", status, error_text);
            Err(anyhow::anyhow!("记录服务返回错误状态: {}", status))
        }
    }
}
