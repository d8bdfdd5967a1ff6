use std::path::PathBuf;
use thiserror::Error;

/// 帧源错误
#[derive(Error, Debug)]
pub enum FrameSourceError {
    /// 视频容器无法打开，或者没有视频流
    #[error("无法打开视频文件 {path}: {reason}")]
    AssetUnreadable { path: PathBuf, reason: String },

    /// seek 目标超出视频帧数
    #[error("seek 超出范围: 请求第 {requested} 帧，视频只有 {available} 帧")]
    SeekOutOfRange { requested: usize, available: usize },

    #[error("解码失败: {0}")]
    Decode(String),
}

impl FrameSourceError {
    pub fn unreadable(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::AssetUnreadable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
