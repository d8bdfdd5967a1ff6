pub mod classifier;
pub mod config;
pub mod decision;
pub mod detector;
pub mod error;
pub mod forwarder;
pub mod frame;
pub mod handler;
pub mod models;
pub mod payload;
pub mod plate;
pub mod processor;
pub mod registry;
pub mod report;
pub mod s3_event;
pub mod selection;
pub mod service;
pub mod storage;
pub mod video_processor;

pub use classifier::{ClassificationResult, FrameWindow, SequenceClassifier};
pub use config::{CliOverrides, ConfigLoader, ServiceConfig};
pub use decision::{Decision, DecisionPolicy, Segment};
pub use detector::{BoundingBox, Detection, DetectionSet, ObjectDetector};
pub use error::FrameSourceError;
pub use forwarder::{HttpResultForwarder, ResultForwarder};
pub use frame::{Frame, FrameSource, FrameSourceOpener, VecFrameSource};
pub use models::ModelSet;
pub use payload::IncidentPayload;
pub use plate::{PlateRecognizer, PlateVerdict};
pub use processor::{AnalysisReport, Verdict, ViolationAnalyzer};
pub use registry::{ProcessingRegistry, RegistryClaim};
pub use report::{ChatReportDrafter, DraftRequest, ReportDrafter};
pub use s3_event::S3Event;
pub use service::{ProcessOutcome, ViolationService};
pub use storage::{AssetStore, S3Client};
pub use video_processor::{FfmpegOpener, VideoProcessor};
