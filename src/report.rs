use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

use crate::config::LlmConfig;

/// 非违章结论时使用的固定草稿
pub const NO_VIOLATION_DRAFT: &str = "위반 사항 없음 또는 분석 실패";

const SYSTEM_PROMPT: &str = "당신은 대한민국 안전신문고 신고 초안 생성기입니다.
[작성 규칙]
1. 사용자가 제공한 내용을 전부 포함하세요.
2. 위치, 시각, 위반 행위를 반드시 포함하세요.
3. '노란선'은 '중앙선'으로 해석하세요.
4. 법적 근거나 금액은 출력하지 마세요.
5. 사용자가 안전신문고에 바로 신고할 수 있도록 사용자의 입장에서 상세 내용을 작성하세요.

### 1. 위반 일시
- 일시: (사용자가 제공한 날짜 및 시간)
### 2. 위반 위치
- 위치: (사용자가 제공한 위치)
### 3. 위반 항목 분석
- 분석 대상: (위반 행위 이름)
- 상세 내용: (신고용 상세 설명 문장)";

/// 生成举报草稿所需的事实
#[derive(Debug, Clone)]
pub struct DraftRequest {
    pub datetime: String,
    pub location: String,
    pub violation: String,
    pub plate: String,
}

impl DraftRequest {
    fn prompt(&self) -> String {
        format!(
            "다음 위반 사실을 바탕으로 안전신문고 신고 내용을 \"상세 내용\" 칸에 들어갈 말투로 작성해줘.\n\
             - 위반 일시: {}\n\
             - 위반 장소: {}\n\
             - 위반 항목: {}\n\
             - 차량 번호: {}",
            self.datetime, self.location, self.violation, self.plate
        )
    }
}

/// 举报草稿生成
///
/// 不返回错误：失败时返回说明失败原因的文本。
#[async_trait]
pub trait ReportDrafter: Send + Sync {
    async fn draft(&self, request: &DraftRequest) -> String;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI 兼容的 chat completions 接口
pub struct ChatReportDrafter {
    client: reqwest::Client,
    config: LlmConfig,
}

impl ChatReportDrafter {
    pub fn new(config: LlmConfig) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()
                .context("创建 HTTP 客户端失败")?,
            config,
        })
    }

    async fn request(&self, request: &DraftRequest) -> Result<Option<String>> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow!("API key 未配置"))?;

        let prompt = request.prompt();
        let body = ChatRequest {
            model: &self.config.model,
            temperature: 0.0,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
        };

        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .context("草稿生成请求失败")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("HTTP {} - {}", status, error_text);
        }

        let reply: ChatResponse = response.json().await.context("解析草稿响应失败")?;
        Ok(reply
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty()))
    }
}

#[async_trait]
impl ReportDrafter for ChatReportDrafter {
    async fn draft(&self, request: &DraftRequest) -> String {
        info!("📝 正在生成举报草稿（{}）", request.violation);
        match self.request(request).await {
            Ok(Some(text)) => text,
            Ok(None) => "초안을 생성할 수 없습니다.".to_string(),
            Err(e) => {
                warn!("⚠️  举报草稿生成失败: {:#}", e);
                format!("초안 생성 에러: {}", e)
            }
        }
    }
}
