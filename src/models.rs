use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use image::RgbImage;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info};
use tract_onnx::prelude::*;

use crate::classifier::{FrameWindow, SequenceClassifier};
use crate::config::ModelConfig;
use crate::detector::{non_max_suppression, BoundingBox, Detection, ObjectDetector};
use crate::selection::argmax_first_by_key;

type Plan = TypedRunnableModel<TypedModel>;

/// 检测结果 NMS 的 IoU 阈值
const NMS_IOU: f32 = 0.45;

/// 分类模型输入的通道顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
    Rgb,
    Bgr,
}

impl fmt::Display for ChannelOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelOrder::Rgb => write!(f, "rgb"),
            ChannelOrder::Bgr => write!(f, "bgr"),
        }
    }
}

impl FromStr for ChannelOrder {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "rgb" => Ok(ChannelOrder::Rgb),
            "bgr" => Ok(ChannelOrder::Bgr),
            other => Err(anyhow!("未知的通道顺序: {}", other)),
        }
    }
}

fn load_plan(path: &Path, shape: TVec<usize>) -> Result<Plan> {
    tract_onnx::onnx()
        .model_for_path(path)
        .with_context(|| format!("加载 ONNX 模型失败: {}", path.display()))?
        .with_input_fact(0, InferenceFact::dt_shape(f32::datum_type(), shape))
        .context("设置模型输入失败")?
        .into_optimized()
        .context("优化 ONNX 模型失败")?
        .into_runnable()
        .context("构建可运行模型失败")
}

/// YOLOv8 导出的 ONNX 检测模型
///
/// 输入 `[1, 3, S, S]`（RGB，/255），输出 `[1, 4 + C, N]`：
/// 前 4 行为中心点和宽高，其余为各类别分数。
pub struct TractYoloDetector {
    name: String,
    model: Plan,
    input_size: u32,
    labels: Vec<String>,
}

impl TractYoloDetector {
    pub fn load(
        name: impl Into<String>,
        model_path: &Path,
        input_size: u32,
        labels_path: Option<&Path>,
    ) -> Result<Self> {
        let size = input_size as usize;
        let model = load_plan(model_path, tvec!(1, 3, size, size))?;
        let labels = match labels_path {
            Some(path) => std::fs::read_to_string(path)
                .with_context(|| format!("读取类别文件失败: {}", path.display()))?
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect(),
            None => Vec::new(),
        };

        Ok(Self {
            name: name.into(),
            model,
            input_size,
            labels,
        })
    }

    fn label(&self, class: usize) -> String {
        self.labels
            .get(class)
            .cloned()
            .unwrap_or_else(|| format!("class_{}", class))
    }
}

impl ObjectDetector for TractYoloDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn detect(&self, frame: &RgbImage, confidence_floor: f32) -> Result<Vec<Detection>> {
        let size = self.input_size;
        let resized = imageops::resize(frame, size, size, FilterType::Triangle);
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, size as usize, size as usize),
            |(_, c, y, x)| resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0,
        );

        let outputs = self
            .model
            .run(tvec!(input.into_tensor().into()))
            .context("检测模型推理失败")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("检测模型没有输出"))?
            .to_array_view::<f32>()
            .context("检测模型输出不是 f32")?
            .into_dimensionality::<tract_ndarray::Ix3>()
            .context("检测模型输出维度不是 [1, 4+C, N]")?;

        let (rows, anchors) = (output.shape()[1], output.shape()[2]);
        if rows <= 4 {
            return Err(anyhow!("检测模型输出行数异常: {}", rows));
        }

        let scale_x = frame.width() as f32 / size as f32;
        let scale_y = frame.height() as f32 / size as f32;
        let mut detections = Vec::new();
        for i in 0..anchors {
            let scores: Vec<f32> = (4..rows).map(|r| output[[0, r, i]]).collect();
            let Some(class) = argmax_first_by_key(&scores, |s| *s) else {
                continue;
            };
            let score = scores[class];
            if score < confidence_floor {
                continue;
            }

            let (cx, cy) = (output[[0, 0, i]], output[[0, 1, i]]);
            let (w, h) = (output[[0, 2, i]], output[[0, 3, i]]);
            detections.push(Detection {
                label: self.label(class),
                bbox: BoundingBox::new(
                    (cx - w / 2.0) * scale_x,
                    (cy - h / 2.0) * scale_y,
                    (cx + w / 2.0) * scale_x,
                    (cy + h / 2.0) * scale_y,
                ),
                score,
            });
        }

        Ok(non_max_suppression(detections, NMS_IOU))
    }
}

/// 多帧序列分类模型，输入 `[1, T, S, S, 3]`，输出 `[1, C]`
pub struct TractSequenceClassifier {
    model: Plan,
    input_size: u32,
    window_length: usize,
    channel_order: ChannelOrder,
}

impl TractSequenceClassifier {
    pub fn load(
        model_path: &Path,
        input_size: u32,
        window_length: usize,
        channel_order: ChannelOrder,
    ) -> Result<Self> {
        let size = input_size as usize;
        let model = load_plan(model_path, tvec!(1, window_length, size, size, 3))?;
        Ok(Self {
            model,
            input_size,
            window_length,
            channel_order,
        })
    }
}

impl SequenceClassifier for TractSequenceClassifier {
    fn input_size(&self) -> u32 {
        self.input_size
    }

    fn classify(&self, window: &FrameWindow<'_>) -> Result<Vec<f32>> {
        if window.frames.len() != self.window_length {
            return Err(anyhow!(
                "窗口长度 {} 与模型输入 {} 不一致",
                window.frames.len(),
                self.window_length
            ));
        }
        let size = self.input_size;
        if let Some(frame) = window.frames.iter().find(|f| f.dimensions() != (size, size)) {
            return Err(anyhow!(
                "帧尺寸 {}x{} 与模型输入 {}x{} 不一致",
                frame.width(),
                frame.height(),
                size,
                size
            ));
        }

        let order = self.channel_order;
        let input = tract_ndarray::Array5::from_shape_fn(
            (1, self.window_length, size as usize, size as usize, 3),
            |(_, t, y, x, c)| {
                let channel = match order {
                    ChannelOrder::Rgb => c,
                    ChannelOrder::Bgr => 2 - c,
                };
                window.frames[t].get_pixel(x as u32, y as u32)[channel] as f32 / 255.0
            },
        );

        let outputs = self
            .model
            .run(tvec!(input.into_tensor().into()))
            .context("分类模型推理失败")?;
        let probabilities = outputs
            .first()
            .ok_or_else(|| anyhow!("分类模型没有输出"))?
            .to_array_view::<f32>()
            .context("分类模型输出不是 f32")?
            .iter()
            .copied()
            .collect();
        Ok(probabilities)
    }
}

/// 启动时加载的模型，每个模型单独加载，失败的留空
#[derive(Clone, Default)]
pub struct ModelSet {
    pub object_detector: Option<Arc<dyn ObjectDetector>>,
    pub plate_detector: Option<Arc<dyn ObjectDetector>>,
    pub classifier: Option<Arc<dyn SequenceClassifier>>,
}

impl ModelSet {
    pub fn load(config: &ModelConfig, window_length: usize) -> Self {
        let object_detector = report(
            "目标检测模型",
            TractYoloDetector::load(
                "object",
                &config.object_detector,
                config.detector_input_size,
                config.object_labels.as_deref(),
            ),
        )
        .map(|m| Arc::new(m) as Arc<dyn ObjectDetector>);

        let plate_detector = report(
            "车牌检测模型",
            TractYoloDetector::load(
                "plate",
                &config.plate_detector,
                config.detector_input_size,
                None,
            ),
        )
        .map(|m| Arc::new(m) as Arc<dyn ObjectDetector>);

        let classifier = report(
            "违章分类模型",
            TractSequenceClassifier::load(
                &config.classifier,
                config.classifier_input_size,
                window_length,
                config.classifier_channel_order,
            ),
        )
        .map(|m| Arc::new(m) as Arc<dyn SequenceClassifier>);

        Self {
            object_detector,
            plate_detector,
            classifier,
        }
    }
}

fn report<T>(what: &str, loaded: Result<T>) -> Option<T> {
    match loaded {
        Ok(model) => {
            info!("✅ {} 加载完成", what);
            Some(model)
        }
        Err(e) => {
            error!("❌ {} 加载失败: {:#}", what, e);
            None
        }
    }
}
