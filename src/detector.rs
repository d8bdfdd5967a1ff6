use anyhow::Result;
use image::RgbImage;
use std::collections::BTreeSet;
use tracing::debug;

/// 像素坐标的检测框 (x1, y1, x2, y2)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }

    /// 向外扩展 `pad` 像素并裁剪到图像范围内，返回 (x, y, w, h)
    ///
    /// 坐标先截断为整数，与检测框的整数化方式一致。
    pub fn padded_region(&self, pad: u32, width: u32, height: u32) -> (u32, u32, u32, u32) {
        let pad = pad as i64;
        let x1 = (self.x1 as i64 - pad).clamp(0, width as i64);
        let y1 = (self.y1 as i64 - pad).clamp(0, height as i64);
        let x2 = (self.x2 as i64 + pad).clamp(0, width as i64);
        let y2 = (self.y2 as i64 + pad).clamp(0, height as i64);
        (
            x1 as u32,
            y1 as u32,
            (x2 - x1).max(0) as u32,
            (y2 - y1).max(0) as u32,
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub label: String,
    pub bbox: BoundingBox,
    pub score: f32,
}

/// 单帧目标检测器
///
/// 只返回 `score >= confidence_floor` 的检测结果。
pub trait ObjectDetector: Send + Sync {
    fn name(&self) -> &str;

    fn detect(&self, frame: &RgbImage, confidence_floor: f32) -> Result<Vec<Detection>>;
}

/// 检测器缺失或者推理失败时都按"没有检测结果"处理
pub fn detect_or_empty(
    detector: Option<&dyn ObjectDetector>,
    frame: &RgbImage,
    confidence_floor: f32,
) -> Vec<Detection> {
    let Some(detector) = detector else {
        return Vec::new();
    };
    match detector.detect(frame, confidence_floor) {
        Ok(detections) => detections
            .into_iter()
            .filter(|d| d.score >= confidence_floor)
            .collect(),
        Err(e) => {
            debug!("检测器 {} 推理失败，按空结果处理: {}", detector.name(), e);
            Vec::new()
        }
    }
}

/// 按类别做非极大值抑制，输入顺序无要求
pub fn non_max_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.score.total_cmp(&a.score));
    let mut kept: Vec<Detection> = Vec::new();
    for candidate in detections {
        let suppressed = kept.iter().any(|k| {
            k.label == candidate.label && k.bbox.iou(&candidate.bbox) > iou_threshold
        });
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}

/// 整段视频出现过的目标类别（去重）
#[derive(Debug, Clone, Default)]
pub struct DetectionSet {
    labels: BTreeSet<String>,
}

impl DetectionSet {
    pub fn extend(&mut self, detections: &[Detection]) {
        self.labels
            .extend(detections.iter().map(|d| d.label.clone()));
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// 逗号连接的类别列表，没有任何检测时为 "없음"
    pub fn summary(&self) -> String {
        if self.labels.is_empty() {
            "없음".to_string()
        } else {
            self.labels.iter().cloned().collect::<Vec<_>>().join(", ")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(label: &str, x: f32, score: f32) -> Detection {
        Detection {
            label: label.to_string(),
            bbox: BoundingBox::new(x, 0.0, x + 10.0, 10.0),
            score,
        }
    }

    struct Failing;

    impl ObjectDetector for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn detect(&self, _frame: &RgbImage, _floor: f32) -> Result<Vec<Detection>> {
            anyhow::bail!("model exploded")
        }
    }

    #[test]
    fn missing_or_failing_detector_yields_empty_list() {
        let frame = RgbImage::new(8, 8);
        assert!(detect_or_empty(None, &frame, 0.4).is_empty());
        assert!(detect_or_empty(Some(&Failing), &frame, 0.4).is_empty());
    }

    #[test]
    fn padded_region_is_clamped_to_frame() {
        let bbox = BoundingBox::new(2.0, 3.0, 50.0, 20.0);
        assert_eq!(bbox.padded_region(5, 40, 30), (0, 0, 40, 25));

        let inside = BoundingBox::new(10.0, 10.0, 20.0, 15.0);
        assert_eq!(inside.padded_region(5, 100, 100), (5, 5, 20, 15));
    }

    #[test]
    fn nms_keeps_best_box_per_overlapping_cluster() {
        let kept = non_max_suppression(
            vec![det("car", 0.0, 0.6), det("car", 1.0, 0.9), det("bus", 0.0, 0.5)],
            0.45,
        );
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].score, 0.9);
        assert_eq!(kept[1].label, "bus");
    }

    #[test]
    fn detection_set_collapses_duplicates() {
        let mut set = DetectionSet::default();
        assert_eq!(set.summary(), "없음");
        set.extend(&[det("truck", 0.0, 0.5), det("car", 0.0, 0.5)]);
        set.extend(&[det("car", 5.0, 0.7)]);
        assert_eq!(set.len(), 2);
        assert_eq!(set.summary(), "car, truck");
    }
}
