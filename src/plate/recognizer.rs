use image::{imageops, RgbImage};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::deskew::deskew_plate;
use super::normalize::{normalize_plate_text, validate_plate_format, PlateValidity};
use super::ocr::{read_all, select_best, OcrEngine};
use super::preprocess::preprocess_plate;
use super::voting::{vote, PlateVerdict};
use crate::detector::{detect_or_empty, ObjectDetector};
use crate::frame::FrameSource;

/// 车牌识别参数
#[derive(Debug, Clone)]
pub struct PlateRecognizerOptions {
    /// 车牌检测置信度下限
    pub confidence_floor: f32,
    /// 检测框外扩像素
    pub pad: u32,
    /// 同一号码至少出现多少次才算确定
    pub min_votes: usize,
}

impl Default for PlateRecognizerOptions {
    fn default() -> Self {
        Self {
            confidence_floor: 0.4,
            pad: 5,
            min_votes: 2,
        }
    }
}

/// 单个车牌区域的识别结果
#[derive(Debug, Clone, PartialEq)]
pub struct PlateCandidate {
    pub normalized_text: String,
    pub validity: PlateValidity,
    pub engine: String,
    pub confidence: f32,
}

impl PlateCandidate {
    pub fn is_valid(&self) -> bool {
        self.validity.is_valid()
    }
}

/// 车牌识别：检测 → 裁剪 → 倾斜校正 → 预处理 → 多引擎 OCR → 规范化 → 校验 → 投票
pub struct PlateRecognizer {
    detector: Arc<dyn ObjectDetector>,
    engines: Vec<Box<dyn OcrEngine>>,
    options: PlateRecognizerOptions,
}

impl PlateRecognizer {
    pub fn new(
        detector: Arc<dyn ObjectDetector>,
        engines: Vec<Box<dyn OcrEngine>>,
        options: PlateRecognizerOptions,
    ) -> Self {
        Self {
            detector,
            engines,
            options,
        }
    }

    pub fn engine_count(&self) -> usize {
        self.engines.len()
    }

    /// 识别一张车牌裁剪图，所有引擎都没有输出时返回 None
    pub fn recognize_crop(&self, crop: &RgbImage) -> Option<PlateCandidate> {
        let deskewed = deskew_plate(crop);
        if let Some(angle) = deskewed.angle {
            debug!("车牌倾斜校正 {:.1}°", angle);
        }
        let prepared = preprocess_plate(&deskewed.image);

        let readings = read_all(&self.engines, &prepared);
        let best = select_best(&readings)?;

        let normalized_text = normalize_plate_text(&best.text);
        let validity = validate_plate_format(&normalized_text);
        debug!(
            "OCR [{}] '{}' -> '{}' ({:?}, 置信度 {:.2})",
            best.engine, best.text, normalized_text, validity, best.confidence
        );

        Some(PlateCandidate {
            normalized_text,
            validity,
            engine: best.engine,
            confidence: best.confidence,
        })
    }

    /// 从 `start` 开始读取最多 `count` 帧，对所有有效识别结果投票
    pub fn process_segment(
        &self,
        source: &mut dyn FrameSource,
        start: usize,
        count: usize,
    ) -> PlateVerdict {
        if let Err(e) = source.seek(start) {
            warn!("⚠️  [车牌识别] 定位到第 {} 帧失败: {}", start, e);
            return PlateVerdict::Unidentifiable;
        }

        let mut pool: Vec<String> = Vec::new();
        let mut frames_read = 0usize;
        for _ in 0..count {
            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    warn!("⚠️  [车牌识别] 读取帧失败，提前结束: {}", e);
                    break;
                }
            };
            frames_read += 1;

            let boxes = detect_or_empty(
                Some(self.detector.as_ref()),
                &frame.image,
                self.options.confidence_floor,
            );
            for detection in boxes {
                let (x, y, w, h) =
                    detection
                        .bbox
                        .padded_region(self.options.pad, frame.width(), frame.height());
                if w == 0 || h == 0 {
                    continue;
                }
                let crop = imageops::crop_imm(&frame.image, x, y, w, h).to_image();

                if let Some(candidate) = self.recognize_crop(&crop) {
                    if candidate.is_valid() {
                        pool.push(candidate.normalized_text);
                    }
                }
            }
        }

        let verdict = vote(&pool, self.options.min_votes);
        info!(
            "🔍 [车牌识别] 区间 {}..{} 读取 {} 帧，有效结果 {} 个，结论: {}",
            start,
            start + count,
            frames_read,
            pool.len(),
            verdict
        );
        verdict
    }
}
