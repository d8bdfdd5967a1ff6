//! 车牌识别流水线

pub mod deskew;
pub mod normalize;
pub mod ocr;
pub mod preprocess;
pub mod recognizer;
pub mod voting;

pub use normalize::{normalize_plate_text, validate_plate_format, PlateValidity};
pub use ocr::{connect_remote_engines, EngineReading, OcrEngine, OcrToken, RemoteOcrEngine};
pub use recognizer::{PlateCandidate, PlateRecognizer, PlateRecognizerOptions};
pub use voting::{vote, PlateVerdict};
