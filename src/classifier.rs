use anyhow::Result;
use image::imageops::{self, FilterType};
use image::RgbImage;
use tracing::{debug, warn};

use crate::selection::argmax_first_by_key;

/// 连续的固定长度帧窗口
#[derive(Debug, Clone, Copy)]
pub struct FrameWindow<'a> {
    /// 窗口序号（第几个窗口）
    pub index: usize,
    /// 窗口第一帧在视频中的帧号
    pub start: usize,
    pub frames: &'a [RgbImage],
}

/// 多帧序列分类器，输出各违章类别的概率
pub trait SequenceClassifier: Send + Sync {
    /// 每帧缩放后的边长
    fn input_size(&self) -> u32;

    fn classify(&self, window: &FrameWindow<'_>) -> Result<Vec<f32>>;
}

/// 单个窗口的分类结果（取概率最大的类别）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassificationResult {
    pub window_index: usize,
    pub category_index: usize,
    pub probability: f32,
}

/// 把原始帧缩放为分类器输入
pub fn prepare_frame(frame: &RgbImage, size: u32) -> RgbImage {
    imageops::resize(frame, size, size, FilterType::Triangle)
}

/// 按长度和步长切分窗口，不足一个窗口时为空
pub fn build_windows(frames: &[RgbImage], length: usize, stride: usize) -> Vec<FrameWindow<'_>> {
    if length == 0 || stride == 0 || frames.len() < length {
        return Vec::new();
    }
    (0..=frames.len() - length)
        .step_by(stride)
        .enumerate()
        .map(|(index, start)| FrameWindow {
            index,
            start,
            frames: &frames[start..start + length],
        })
        .collect()
}

/// 逐个窗口分类，推理失败的窗口跳过
pub fn classify_windows(
    classifier: &dyn SequenceClassifier,
    windows: &[FrameWindow<'_>],
) -> Vec<ClassificationResult> {
    let mut results = Vec::with_capacity(windows.len());
    for window in windows {
        let probabilities = match classifier.classify(window) {
            Ok(p) => p,
            Err(e) => {
                warn!("⚠️  窗口 {} (起始帧 {}) 分类失败，跳过: {}", window.index, window.start, e);
                continue;
            }
        };

        if probabilities.iter().any(|p| !p.is_finite()) {
            warn!("⚠️  窗口 {} 输出包含非有限值，跳过", window.index);
            continue;
        }

        let Some(category_index) = argmax_first_by_key(&probabilities, |p| *p) else {
            warn!("⚠️  窗口 {} 分类结果为空，跳过", window.index);
            continue;
        };

        let result = ClassificationResult {
            window_index: window.index,
            category_index,
            probability: probabilities[category_index],
        };
        debug!(
            "窗口 {} (帧 {}..{}): 类别 {} 概率 {:.3}",
            window.index,
            window.start,
            window.start + window.frames.len(),
            result.category_index,
            result.probability
        );
        results.push(result);
    }
    results
}
