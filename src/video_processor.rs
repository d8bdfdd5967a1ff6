use ffmpeg_next as ffmpeg;
use image::RgbImage;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::FrameSourceError;
use crate::frame::{Frame, FrameSource, FrameSourceOpener};

/// 基于 FFmpeg 的帧源打开器
pub struct FfmpegOpener;

impl FfmpegOpener {
    pub fn new() -> anyhow::Result<Self> {
        ffmpeg::init().map_err(|e| anyhow::anyhow!("初始化 FFmpeg 失败: {}", e))?;

        // 只输出错误级别日志，抑制解码警告
        ffmpeg::util::log::set_level(ffmpeg::util::log::Level::Error);

        Ok(Self)
    }
}

impl FrameSourceOpener for FfmpegOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn FrameSource>, FrameSourceError> {
        Ok(Box::new(VideoProcessor::open(path)?))
    }
}

/// 视频处理器，负责顺序解码视频帧（RGB24）
pub struct VideoProcessor {
    path: PathBuf,
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    /// 下一次 next_frame 返回的帧索引
    next_index: usize,
    /// seek 时预读的目标帧
    pending: Option<RgbImage>,
    eof_sent: bool,
}

impl VideoProcessor {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, FrameSourceError> {
        let path = path.as_ref().to_path_buf();

        let input = ffmpeg::format::input(&path)
            .map_err(|e| FrameSourceError::unreadable(&path, e))?;

        let video_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| FrameSourceError::unreadable(&path, "未找到视频流"))?;
        let stream_index = video_stream.index();

        let decoder_context =
            ffmpeg::codec::context::Context::from_parameters(video_stream.parameters())
                .map_err(|e| FrameSourceError::unreadable(&path, format!("无法创建解码器上下文: {}", e)))?;

        let decoder = decoder_context
            .decoder()
            .video()
            .map_err(|e| FrameSourceError::unreadable(&path, format!("无法创建视频解码器: {}", e)))?;

        let scaler = ffmpeg::software::scaling::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::format::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::Flags::BILINEAR,
        )
        .map_err(|e| FrameSourceError::unreadable(&path, format!("无法创建缩放器: {}", e)))?;

        debug!(
            "打开视频: {} ({}x{})",
            path.display(),
            decoder.width(),
            decoder.height()
        );

        Ok(Self {
            path,
            input,
            stream_index,
            decoder,
            scaler,
            next_index: 0,
            pending: None,
            eof_sent: false,
        })
    }

    /// 解码下一帧，流结束时返回 None
    fn decode_next(&mut self) -> Result<Option<RgbImage>, FrameSourceError> {
        let mut decoded = ffmpeg::frame::Video::empty();
        loop {
            if self.decoder.receive_frame(&mut decoded).is_ok() {
                let mut rgb_frame = ffmpeg::frame::Video::empty();
                self.scaler
                    .run(&decoded, &mut rgb_frame)
                    .map_err(|e| FrameSourceError::Decode(format!("RGB 转换失败: {}", e)))?;
                return frame_to_image(&rgb_frame).map(Some);
            }

            if self.eof_sent {
                return Ok(None);
            }

            let next = self
                .input
                .packets()
                .next()
                .map(|(stream, packet)| (stream.index(), packet));

            match next {
                Some((index, packet)) => {
                    if index != self.stream_index {
                        continue;
                    }
                    // 损坏的数据包直接跳过
                    if let Err(e) = self.decoder.send_packet(&packet) {
                        debug!("发送数据包失败，跳过: {}", e);
                    }
                }
                None => {
                    self.decoder
                        .send_eof()
                        .map_err(|e| FrameSourceError::Decode(format!("刷新解码器失败: {}", e)))?;
                    self.eof_sent = true;
                }
            }
        }
    }

    /// 重新打开文件，回到第 0 帧
    fn rewind(&mut self) -> Result<(), FrameSourceError> {
        *self = Self::open(&self.path)?;
        Ok(())
    }
}

impl FrameSource for VideoProcessor {
    fn next_frame(&mut self) -> Result<Option<Frame>, FrameSourceError> {
        let image = match self.pending.take() {
            Some(image) => Some(image),
            None => self.decode_next()?,
        };

        Ok(image.map(|image| {
            let frame = Frame::new(self.next_index, image);
            self.next_index += 1;
            frame
        }))
    }

    /// 精确到帧的 seek：向前解码并丢弃，向后则从头重新打开
    fn seek(&mut self, frame_index: usize) -> Result<(), FrameSourceError> {
        if frame_index < self.next_index {
            self.rewind()?;
        }

        if self.pending.is_some() {
            if frame_index == self.next_index {
                return Ok(());
            }
            self.pending = None;
            self.next_index += 1;
        }

        loop {
            let Some(image) = self.decode_next()? else {
                warn!(
                    "seek 超出范围: {} 请求第 {} 帧，实际只有 {} 帧",
                    self.path.display(),
                    frame_index,
                    self.next_index
                );
                return Err(FrameSourceError::SeekOutOfRange {
                    requested: frame_index,
                    available: self.next_index,
                });
            };

            if self.next_index == frame_index {
                self.pending = Some(image);
                return Ok(());
            }
            self.next_index += 1;
        }
    }
}

/// 将 FFmpeg RGB24 帧转换为 RgbImage（按行拷贝，处理 stride 填充）
fn frame_to_image(frame: &ffmpeg::frame::Video) -> Result<RgbImage, FrameSourceError> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = width as usize * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let line = data
            .get(start..start + row_bytes)
            .ok_or_else(|| FrameSourceError::Decode("帧数据行越界".to_string()))?;
        pixels.extend_from_slice(line);
    }

    RgbImage::from_raw(width, height, pixels)
        .ok_or_else(|| FrameSourceError::Decode("帧数据长度不匹配".to_string()))
}
