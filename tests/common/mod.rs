#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use image::{GrayImage, Rgb, RgbImage};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use violation_parse::config::AnalysisConfig;
use violation_parse::plate::{OcrEngine, OcrToken};
use violation_parse::{
    AssetStore, BoundingBox, Detection, DraftRequest, FrameSource, FrameSourceError,
    FrameSourceOpener, FrameWindow, IncidentPayload, ModelSet, ObjectDetector, ReportDrafter,
    ResultForwarder, SequenceClassifier, VecFrameSource, ViolationAnalyzer,
};

pub fn solid_frames(n: usize) -> Vec<RgbImage> {
    (0..n)
        .map(|_| RgbImage::from_pixel(16, 16, Rgb([128, 128, 128])))
        .collect()
}

/// 每次打开都返回同一组内存帧
pub struct MemoryOpener {
    frames: Vec<RgbImage>,
    pub opens: AtomicUsize,
}

impl MemoryOpener {
    pub fn new(frame_count: usize) -> Arc<Self> {
        Arc::new(Self {
            frames: solid_frames(frame_count),
            opens: AtomicUsize::new(0),
        })
    }
}

impl FrameSourceOpener for MemoryOpener {
    fn open(&self, _path: &Path) -> Result<Box<dyn FrameSource>, FrameSourceError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(VecFrameSource::new(self.frames.clone())))
    }
}

pub struct UnreadableOpener;

impl FrameSourceOpener for UnreadableOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn FrameSource>, FrameSourceError> {
        Err(FrameSourceError::unreadable(path, "no video stream"))
    }
}

/// 返回覆盖整帧的单个检测框，并记录调用次数
pub struct WholeFrameDetector {
    label: &'static str,
    pub calls: AtomicUsize,
}

impl WholeFrameDetector {
    pub fn new(label: &'static str) -> Arc<Self> {
        Arc::new(Self {
            label,
            calls: AtomicUsize::new(0),
        })
    }
}

impl ObjectDetector for WholeFrameDetector {
    fn name(&self) -> &str {
        self.label
    }

    fn detect(&self, frame: &RgbImage, _confidence_floor: f32) -> Result<Vec<Detection>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![Detection {
            label: self.label.to_string(),
            bbox: BoundingBox::new(0.0, 0.0, frame.width() as f32, frame.height() as f32),
            score: 0.9,
        }])
    }
}

/// 按窗口序号返回预设概率
pub struct ScriptedClassifier {
    script: Box<dyn Fn(usize) -> Vec<f32> + Send + Sync>,
    pub calls: AtomicUsize,
}

impl ScriptedClassifier {
    pub fn new(script: impl Fn(usize) -> Vec<f32> + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            script: Box::new(script),
            calls: AtomicUsize::new(0),
        })
    }
}

impl SequenceClassifier for ScriptedClassifier {
    fn input_size(&self) -> u32 {
        8
    }

    fn classify(&self, window: &FrameWindow<'_>) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(window.frames.len(), 50);
        assert!(window.frames.iter().all(|f| f.dimensions() == (8, 8)));
        Ok((self.script)(window.index))
    }
}

pub struct FixedOcr(pub &'static str);

impl OcrEngine for FixedOcr {
    fn name(&self) -> &str {
        "fixed"
    }

    fn recognize(&self, _image: &GrayImage) -> Result<Vec<OcrToken>> {
        Ok(vec![OcrToken {
            text: self.0.to_string(),
            confidence: 0.9,
        }])
    }
}

pub struct Fixture {
    pub opener: Arc<MemoryOpener>,
    pub object_detector: Arc<WholeFrameDetector>,
    pub plate_detector: Arc<WholeFrameDetector>,
    pub classifier: Arc<ScriptedClassifier>,
}

impl Fixture {
    pub fn new(
        frame_count: usize,
        script: impl Fn(usize) -> Vec<f32> + Send + Sync + 'static,
    ) -> Self {
        Self {
            opener: MemoryOpener::new(frame_count),
            object_detector: WholeFrameDetector::new("car"),
            plate_detector: WholeFrameDetector::new("plate"),
            classifier: ScriptedClassifier::new(script),
        }
    }

    pub fn models(&self) -> ModelSet {
        ModelSet {
            object_detector: Some(self.object_detector.clone() as Arc<dyn ObjectDetector>),
            plate_detector: Some(self.plate_detector.clone() as Arc<dyn ObjectDetector>),
            classifier: Some(self.classifier.clone() as Arc<dyn SequenceClassifier>),
        }
    }

    pub fn analyzer(&self) -> ViolationAnalyzer {
        self.analyzer_with(self.models())
    }

    pub fn analyzer_with(&self, models: ModelSet) -> ViolationAnalyzer {
        ViolationAnalyzer::new(
            self.opener.clone(),
            models,
            vec![Box::new(FixedOcr("12가 3456")) as Box<dyn OcrEngine>],
            AnalysisConfig::default(),
        )
    }

    pub fn plate_calls(&self) -> usize {
        self.plate_detector.calls.load(Ordering::SeqCst)
    }
}

/// 第 `window` 个窗口给出 `category` 高概率，其余窗口都很低
pub fn violation_at(window: usize, category: usize) -> impl Fn(usize) -> Vec<f32> + Send + Sync {
    move |index| {
        let mut p = vec![0.1, 0.1, 0.1];
        if index == window {
            p[category] = 0.9;
        }
        p
    }
}

/// 内存对象存储：下载时写入占位字节
pub struct MemoryStore {
    pub delay: Duration,
    pub fail_download: bool,
    pub fail_presign: bool,
    pub downloaded: Mutex<Vec<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            delay: Duration::from_millis(0),
            fail_download: false,
            fail_presign: false,
            downloaded: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl AssetStore for MemoryStore {
    async fn download(&self, key: &str, destination: &Path) -> Result<()> {
        tokio::time::sleep(self.delay).await;
        if self.fail_download {
            anyhow::bail!("NoSuchKey: {}", key);
        }
        self.downloaded.lock().unwrap().push(key.to_string());
        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(destination, b"not really a video")?;
        Ok(())
    }

    fn presigned_url(&self, key: &str, _expires_in: Duration) -> Result<String> {
        if self.fail_presign {
            anyhow::bail!("signing failed");
        }
        Ok(format!("https://store.example/{}?sig=1", key))
    }
}

#[derive(Default)]
pub struct RecordingForwarder {
    pub payloads: Mutex<Vec<IncidentPayload>>,
}

#[async_trait]
impl ResultForwarder for RecordingForwarder {
    async fn forward(&self, payload: &IncidentPayload) -> Result<()> {
        self.payloads.lock().unwrap().push(payload.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingDrafter {
    pub requests: Mutex<Vec<DraftRequest>>,
}

#[async_trait]
impl ReportDrafter for RecordingDrafter {
    async fn draft(&self, request: &DraftRequest) -> String {
        self.requests.lock().unwrap().push(request.clone());
        format!("{} 신고 초안", request.violation)
    }
}
