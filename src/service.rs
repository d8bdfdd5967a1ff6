use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::config::StorageConfig;
use crate::forwarder::ResultForwarder;
use crate::payload::IncidentPayload;
use crate::processor::{Verdict, ViolationAnalyzer};
use crate::registry::ProcessingRegistry;
use crate::report::{DraftRequest, ReportDrafter, NO_VIOLATION_DRAFT};
use crate::s3_event::{decode_object_key, file_name_of};
use crate::storage::AssetStore;

/// 单个远端视频的处理结果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProcessOutcome {
    Completed {
        verdict: Verdict,
        payload: IncidentPayload,
    },
    /// 同名文件正在处理中
    Skipped,
    Failed {
        reason: String,
    },
}

/// 任务结束时删除本地临时目录
struct WorkDir(PathBuf);

impl Drop for WorkDir {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.0) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("⚠️  清理临时目录失败: {}: {}", self.0.display(), e);
            }
        } else {
            debug!("已清理临时目录: {}", self.0.display());
        }
    }
}

/// 远端视频处理：去重 → 下载 → 分析 → 预签名 → 草稿 → 转发 → 清理
pub struct ViolationService {
    analyzer: Arc<ViolationAnalyzer>,
    store: Arc<dyn AssetStore>,
    drafter: Arc<dyn ReportDrafter>,
    forwarder: Option<Arc<dyn ResultForwarder>>,
    registry: ProcessingRegistry,
    temp_root: PathBuf,
    presign_expiry: Duration,
}

impl ViolationService {
    pub fn new(
        analyzer: Arc<ViolationAnalyzer>,
        store: Arc<dyn AssetStore>,
        drafter: Arc<dyn ReportDrafter>,
        forwarder: Option<Arc<dyn ResultForwarder>>,
        registry: ProcessingRegistry,
        storage: &StorageConfig,
    ) -> Self {
        Self {
            analyzer,
            store,
            drafter,
            forwarder,
            registry,
            temp_root: storage.temp_dir.clone(),
            presign_expiry: Duration::from_secs(storage.presign_expires_secs),
        }
    }

    pub fn analyzer(&self) -> &Arc<ViolationAnalyzer> {
        &self.analyzer
    }

    pub fn registry(&self) -> &ProcessingRegistry {
        &self.registry
    }

    /// 处理一个远端视频
    ///
    /// 同名文件正在处理时直接跳过；本地文件和登记项在任何出口都会被清理。
    pub async fn process(&self, remote_key: &str) -> ProcessOutcome {
        let key = decode_object_key(remote_key);
        let filename = file_name_of(&key).to_string();
        if filename.is_empty() {
            error!("❌ [任务] 无效的对象键: {}", remote_key);
            return ProcessOutcome::Failed {
                reason: format!("无效的对象键: {}", remote_key),
            };
        }

        let Some(_claim) = self.registry.try_claim(&filename) else {
            info!("🚫 [任务] {} 正在处理中，跳过", filename);
            return ProcessOutcome::Skipped;
        };

        let total_start = Instant::now();
        info!("🔔 [任务] 开始处理: {}", key);

        let work_dir = WorkDir(self.temp_root.join(uuid::Uuid::new_v4().to_string()));
        let local_path = work_dir.0.join(&filename);

        // 1. 下载
        let download_start = Instant::now();
        if let Err(e) = self.store.download(&key, &local_path).await {
            error!("❌ [任务] 下载失败: {:#}", e);
            return ProcessOutcome::Failed {
                reason: format!("下载失败: {}", e),
            };
        }
        info!(
            "✅ [任务] 下载完成，耗时: {:.2}秒",
            download_start.elapsed().as_secs_f64()
        );

        // 2. 分析（阻塞线程）
        let analyzer = self.analyzer.clone();
        let analysis_path = local_path.clone();
        let report = match tokio::task::spawn_blocking(move || analyzer.analyze(&analysis_path)).await {
            Ok(report) => report,
            Err(e) => {
                error!("❌ [任务] 分析任务异常退出: {}", e);
                return ProcessOutcome::Failed {
                    reason: format!("分析任务异常退出: {}", e),
                };
            }
        };

        // 3. 预签名链接
        let video_url = match self.store.presigned_url(&key, self.presign_expiry) {
            Ok(url) => url,
            Err(e) => {
                warn!("⚠️  [任务] 生成预签名链接失败: {:#}", e);
                String::new()
            }
        };

        // 4. 举报草稿（只针对违章）
        let ai_draft = if report.is_violation() {
            self.drafter
                .draft(&DraftRequest {
                    datetime: report.timestamp.clone(),
                    location: report.location.clone(),
                    violation: report.category.clone(),
                    plate: report.plate.clone(),
                })
                .await
        } else {
            NO_VIOLATION_DRAFT.to_string()
        };

        let payload = IncidentPayload::from_report(&report, serial_no(&filename), video_url, ai_draft);

        // 5. 转发
        if let Some(forwarder) = &self.forwarder {
            if let Err(e) = forwarder.forward(&payload).await {
                warn!("⚠️  [任务] 转发失败（不重试）: {:#}", e);
            }
        }

        info!(
            "🎉 [任务] {} 处理完成: {}，总耗时: {:.2}秒",
            filename,
            report.category,
            total_start.elapsed().as_secs_f64()
        );

        ProcessOutcome::Completed {
            verdict: report.verdict,
            payload,
        }
    }
}

/// 流水号：文件名去掉扩展名
fn serial_no(filename: &str) -> String {
    Path::new(filename)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| filename.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_number_drops_extension() {
        assert_eq!(serial_no("cam01_20240305.mp4"), "cam01_20240305");
        assert_eq!(serial_no("archive.tar.mp4"), "archive.tar");
        assert_eq!(serial_no("noext"), "noext");
    }

    #[test]
    fn work_dir_is_removed_on_drop() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("job");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("v.mp4"), b"x").unwrap();
        drop(WorkDir(dir.clone()));
        assert!(!dir.exists());
    }
}
