use image::RgbImage;
use std::path::Path;

use crate::error::FrameSourceError;

/// 解码后的一帧（索引从 0 开始）
#[derive(Debug, Clone)]
pub struct Frame {
    pub index: usize,
    pub image: RgbImage,
}

impl Frame {
    pub fn new(index: usize, image: RgbImage) -> Self {
        Self { index, image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// 顺序帧源
///
/// `next_frame` 返回 `Ok(None)` 表示流结束（不是错误）。
/// `seek` 之后的下一次 `next_frame` 返回的就是目标帧。
/// 句柄在 drop 时释放。
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, FrameSourceError>;

    fn seek(&mut self, frame_index: usize) -> Result<(), FrameSourceError>;
}

/// 根据本地路径打开帧源
pub trait FrameSourceOpener: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn FrameSource>, FrameSourceError>;
}

/// 内存帧源，主要用于已解码好的帧序列
pub struct VecFrameSource {
    frames: Vec<RgbImage>,
    position: usize,
}

impl VecFrameSource {
    pub fn new(frames: Vec<RgbImage>) -> Self {
        Self { frames, position: 0 }
    }
}

impl FrameSource for VecFrameSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, FrameSourceError> {
        let Some(image) = self.frames.get(self.position) else {
            return Ok(None);
        };
        let frame = Frame::new(self.position, image.clone());
        self.position += 1;
        Ok(Some(frame))
    }

    fn seek(&mut self, frame_index: usize) -> Result<(), FrameSourceError> {
        if frame_index >= self.frames.len() {
            return Err(FrameSourceError::SeekOutOfRange {
                requested: frame_index,
                available: self.frames.len(),
            });
        }
        self.position = frame_index;
        Ok(())
    }
}
