use chrono::Local;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::classifier::{build_windows, classify_windows, prepare_frame};
use crate::config::AnalysisConfig;
use crate::decision::{Decision, DecisionPolicy, Segment};
use crate::detector::{detect_or_empty, DetectionSet};
use crate::error::FrameSourceError;
use crate::frame::FrameSourceOpener;
use crate::models::ModelSet;
use crate::plate::{OcrEngine, PlateRecognizer, PlateRecognizerOptions, PlateVerdict};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// 分析结论
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Violation,
    NormalDriving,
    /// 帧数不足一个分类窗口
    InsufficientFrames,
    /// 分类模型没有加载成功
    ClassifierUnavailable,
    /// 视频无法读取
    Failed,
}

/// 单个视频的分析报告
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub verdict: Verdict,
    /// 违章类别，或者对应结论的显示文本
    pub category: String,
    pub plate: String,
    /// 最大概率（百分比，保留两位小数）
    pub probability_percent: f64,
    /// 目标检测出现过的类别
    pub detected_objects: String,
    pub timestamp: String,
    pub location: String,
    pub segment: Option<Segment>,
}

impl AnalysisReport {
    fn new(verdict: Verdict, category: impl Into<String>, location: &str) -> Self {
        Self {
            verdict,
            category: category.into(),
            plate: "-".to_string(),
            probability_percent: 0.0,
            detected_objects: "없음".to_string(),
            timestamp: Local::now().format(TIMESTAMP_FORMAT).to_string(),
            location: location.to_string(),
            segment: None,
        }
    }

    pub fn failed(location: &str) -> Self {
        Self {
            plate: "Error".to_string(),
            ..Self::new(Verdict::Failed, "에러 발생", location)
        }
    }

    pub fn is_violation(&self) -> bool {
        self.verdict == Verdict::Violation
    }
}

/// 各模型是否加载成功
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ModelStatus {
    pub object_detector: bool,
    pub plate_detector: bool,
    pub classifier: bool,
    pub ocr_engines: usize,
}

fn percent(probability: f32) -> f64 {
    (probability as f64 * 10000.0).round() / 100.0
}

/// 违章视频分析
///
/// 第一遍顺序解码：每帧做目标检测，同时缓存缩放后的分类器输入；
/// 判定出违章后重新打开视频，定位到违章区间做车牌识别。
pub struct ViolationAnalyzer {
    opener: Arc<dyn FrameSourceOpener>,
    models: ModelSet,
    plate: Option<PlateRecognizer>,
    policy: DecisionPolicy,
    config: AnalysisConfig,
}

impl ViolationAnalyzer {
    pub fn new(
        opener: Arc<dyn FrameSourceOpener>,
        models: ModelSet,
        engines: Vec<Box<dyn OcrEngine>>,
        config: AnalysisConfig,
    ) -> Self {
        let plate = models.plate_detector.clone().map(|detector| {
            PlateRecognizer::new(
                detector,
                engines,
                PlateRecognizerOptions {
                    confidence_floor: config.plate_floor,
                    pad: config.plate_pad,
                    min_votes: config.min_plate_votes,
                },
            )
        });
        let policy = DecisionPolicy {
            categories: config.categories.clone(),
            min_confidence: config.min_confidence,
            window_length: config.window_length,
            stride: config.stride,
        };

        Self {
            opener,
            models,
            plate,
            policy,
            config,
        }
    }

    pub fn model_status(&self) -> ModelStatus {
        ModelStatus {
            object_detector: self.models.object_detector.is_some(),
            plate_detector: self.models.plate_detector.is_some(),
            classifier: self.models.classifier.is_some(),
            ocr_engines: self.plate.as_ref().map_or(0, |p| p.engine_count()),
        }
    }

    /// 分析本地视频，任何情况下都返回报告
    pub fn analyze(&self, path: &Path) -> AnalysisReport {
        let total_start = Instant::now();
        info!("🎬 [违章分析] 开始分析视频: {}", path.display());
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        let report = match self.run(path) {
            Ok(report) => report,
            Err(e) => {
                error!("❌ [违章分析] 分析失败: {}", e);
                AnalysisReport::failed(&self.config.location)
            }
        };

        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        info!(
            "🎉 [违章分析] 完成: {} / 车牌 {} / 概率 {:.2}%，总耗时: {:.2}秒",
            report.category,
            report.plate,
            report.probability_percent,
            total_start.elapsed().as_secs_f64()
        );
        report
    }

    fn run(&self, path: &Path) -> Result<AnalysisReport, FrameSourceError> {
        let location = self.config.location.as_str();

        // 1. 顺序解码 + 目标检测
        let decode_start = Instant::now();
        info!("⏳ [违章分析] 正在解码并检测目标...");
        let mut source = self.opener.open(path)?;
        let object_detector = self.models.object_detector.as_deref();
        let classifier = self.models.classifier.as_deref();

        let mut detected = DetectionSet::default();
        let mut prepared = Vec::new();
        let mut frame_count = 0usize;
        loop {
            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    warn!("⚠️  [违章分析] 第 {} 帧解码失败，视为视频结束: {}", frame_count, e);
                    break;
                }
            };
            frame_count += 1;

            let detections = detect_or_empty(object_detector, &frame.image, self.config.detection_floor);
            detected.extend(&detections);

            if let Some(classifier) = classifier {
                prepared.push(prepare_frame(&frame.image, classifier.input_size()));
            }
        }
        drop(source);
        info!(
            "✅ [违章分析] 解码完成，耗时: {:.2}秒",
            decode_start.elapsed().as_secs_f64()
        );
        info!("  • 帧数: {} 帧", frame_count);
        info!("  • 检测到的目标: {}", detected.summary());

        let mut report = AnalysisReport::new(Verdict::NormalDriving, "정상 주행", location);
        report.detected_objects = detected.summary();

        // 2. 帧数不足，不做分类
        if frame_count < self.config.window_length {
            warn!(
                "⚠️  [违章分析] 帧数 {} 少于窗口长度 {}，无法分析",
                frame_count, self.config.window_length
            );
            report.verdict = Verdict::InsufficientFrames;
            report.category = "분석 불가(영상 짧음)".to_string();
            return Ok(report);
        }

        let Some(classifier) = classifier else {
            warn!("⚠️  [违章分析] 分类模型未加载，跳过违章判定");
            report.verdict = Verdict::ClassifierUnavailable;
            report.category = "분석 불가(모델 없음)".to_string();
            return Ok(report);
        };

        // 3. 窗口分类
        let classify_start = Instant::now();
        let windows = build_windows(&prepared, self.config.window_length, self.config.stride);
        info!("⏳ [违章分析] 正在分类 {} 个窗口...", windows.len());
        let results = classify_windows(classifier, &windows);
        info!(
            "✅ [违章分析] 分类完成，耗时: {:.2}秒（有效窗口 {} 个）",
            classify_start.elapsed().as_secs_f64(),
            results.len()
        );
        drop(windows);
        drop(prepared);

        // 4. 判定
        let decision = self.policy.decide(&results);
        report.probability_percent = percent(decision.probability());

        let (category, segment) = match decision {
            Decision::NormalDriving { probability } => {
                info!("✅ [违章分析] 未发现违章（最大概率 {:.3}）", probability);
                return Ok(report);
            }
            Decision::Violation {
                category,
                probability,
                window_index,
                segment,
            } => {
                info!(
                    "🚨 [违章分析] 判定违章: {}（概率 {:.3}，窗口 {}，帧 {}..{}）",
                    category,
                    probability,
                    window_index,
                    segment.start_frame,
                    segment.start_frame + segment.frame_count
                );
                (category, segment)
            }
        };
        report.verdict = Verdict::Violation;
        report.category = category;
        report.segment = Some(segment);

        // 5. 违章区间车牌识别
        if let Some(recognizer) = &self.plate {
            let plate_start = Instant::now();
            info!("⏳ [违章分析] 正在识别车牌...");
            let verdict = match self.opener.open(path) {
                Ok(mut segment_source) => recognizer.process_segment(
                    segment_source.as_mut(),
                    segment.start_frame,
                    segment.frame_count,
                ),
                Err(e) => {
                    warn!("⚠️  [违章分析] 重新打开视频失败，车牌无法识别: {}", e);
                    PlateVerdict::Unidentifiable
                }
            };
            report.plate = verdict.to_string();
            info!(
                "✅ [违章分析] 车牌识别完成，耗时: {:.2}秒",
                plate_start.elapsed().as_secs_f64()
            );
        } else {
            warn!("⚠️  [违章分析] 车牌检测模型未加载，跳过车牌识别");
        }

        Ok(report)
    }
}
