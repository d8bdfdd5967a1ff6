use anyhow::{Context, Result};
use image::{DynamicImage, GrayImage, ImageOutputFormat};
use serde::Deserialize;
use std::io::Cursor;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::OcrConfig;
use crate::selection::argmax_first_by;

/// OCR 引擎识别出的一个文本片段
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OcrToken {
    pub text: String,
    pub confidence: f32,
}

/// OCR 引擎
///
/// 出错或者没有识别出任何片段时，该引擎对本次结果不产生贡献。
pub trait OcrEngine: Send + Sync {
    fn name(&self) -> &str;

    fn recognize(&self, image: &GrayImage) -> Result<Vec<OcrToken>>;
}

/// 单个引擎对一张车牌图的识别结果
#[derive(Debug, Clone, PartialEq)]
pub enum EngineReading {
    Recognized {
        engine: String,
        /// 所有片段直接拼接
        text: String,
        /// 片段置信度的平均值
        confidence: f32,
    },
    Unavailable {
        engine: String,
        reason: String,
    },
}

/// 最终采用的引擎输出
#[derive(Debug, Clone, PartialEq)]
pub struct OcrOutput {
    pub engine: String,
    pub text: String,
    pub confidence: f32,
}

/// 让所有引擎各自识别一遍
pub fn read_all(engines: &[Box<dyn OcrEngine>], image: &GrayImage) -> Vec<EngineReading> {
    engines
        .iter()
        .map(|engine| {
            let name = engine.name().to_string();
            match engine.recognize(image) {
                Ok(tokens) if tokens.is_empty() => EngineReading::Unavailable {
                    engine: name,
                    reason: "no text".to_string(),
                },
                Ok(tokens) => {
                    let text: String = tokens.iter().map(|t| t.text.as_str()).collect();
                    let confidence =
                        tokens.iter().map(|t| t.confidence).sum::<f32>() / tokens.len() as f32;
                    EngineReading::Recognized {
                        engine: name,
                        text,
                        confidence,
                    }
                }
                Err(e) => {
                    debug!("OCR 引擎 {} 识别失败: {}", name, e);
                    EngineReading::Unavailable {
                        engine: name,
                        reason: e.to_string(),
                    }
                }
            }
        })
        .collect()
}

/// 取平均置信度最高的引擎，相同时取靠前的引擎
pub fn select_best(readings: &[EngineReading]) -> Option<OcrOutput> {
    let recognized: Vec<OcrOutput> = readings
        .iter()
        .filter_map(|reading| match reading {
            EngineReading::Recognized {
                engine,
                text,
                confidence,
            } => Some(OcrOutput {
                engine: engine.clone(),
                text: text.clone(),
                confidence: *confidence,
            }),
            EngineReading::Unavailable { .. } => None,
        })
        .collect();

    let best = argmax_first_by(&recognized, |a, b| a.confidence.partial_cmp(&b.confidence))?;
    recognized.into_iter().nth(best)
}

#[derive(Debug, Deserialize)]
struct RemoteOcrResponse {
    #[serde(default)]
    tokens: Vec<OcrToken>,
}

/// HTTP OCR 服务
///
/// 以 `image/png` 形式 POST 车牌图，响应为
/// `{"tokens": [{"text": "...", "confidence": 0.9}]}`。
pub struct RemoteOcrEngine {
    name: String,
    url: String,
    client: reqwest::blocking::Client,
}

impl RemoteOcrEngine {
    pub fn new(name: impl Into<String>, url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            url: url.into(),
            client: reqwest::blocking::Client::builder()
                .timeout(timeout)
                .build()
                .context("创建 OCR HTTP 客户端失败")?,
        })
    }
}

impl OcrEngine for RemoteOcrEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn recognize(&self, image: &GrayImage) -> Result<Vec<OcrToken>> {
        let mut png = Cursor::new(Vec::new());
        DynamicImage::ImageLuma8(image.clone())
            .write_to(&mut png, ImageOutputFormat::Png)
            .context("车牌图像编码失败")?;

        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "image/png")
            .body(png.into_inner())
            .send()
            .with_context(|| format!("OCR 请求失败: {}", self.url))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().unwrap_or_default();
            anyhow::bail!("OCR 服务返回错误: HTTP {} - {}", status, error_text);
        }

        let body: RemoteOcrResponse = response.json().context("解析 OCR 响应失败")?;
        Ok(body.tokens)
    }
}

/// 按配置创建全部 HTTP OCR 引擎，创建失败的跳过
///
/// reqwest 阻塞客户端不能在异步上下文中构造，在阻塞线程池里创建。
pub async fn connect_remote_engines(config: &OcrConfig) -> Result<Vec<Box<dyn OcrEngine>>> {
    let config = config.clone();
    tokio::task::spawn_blocking(move || remote_engines(&config))
        .await
        .context("创建 OCR 引擎的任务异常退出")
}

fn remote_engines(config: &OcrConfig) -> Vec<Box<dyn OcrEngine>> {
    let timeout = Duration::from_secs(config.timeout_secs);
    let mut engines: Vec<Box<dyn OcrEngine>> = Vec::new();
    for (name, url) in &config.engines {
        match RemoteOcrEngine::new(name.clone(), url.clone(), timeout) {
            Ok(engine) => {
                info!("✅ OCR 引擎 {} -> {}", name, url);
                engines.push(Box::new(engine));
            }
            Err(e) => warn!("⚠️  OCR 引擎 {} 初始化失败: {:#}", name, e),
        }
    }
    if engines.is_empty() {
        warn!("⚠️  未配置 OCR 引擎，车牌将无法识别");
    }
    engines
}
