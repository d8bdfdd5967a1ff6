use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

/// 正在处理的文件名集合（进程内共享）
///
/// 同一个文件名同时只允许一个任务处理，重复提交直接跳过。
#[derive(Debug, Clone, Default)]
pub struct ProcessingRegistry {
    inner: Arc<Mutex<HashSet<String>>>,
}

impl ProcessingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 原子地检查并登记，已在处理中返回 None
    ///
    /// 返回的 claim 被 drop 时（包括 panic 展开）自动注销。
    pub fn try_claim(&self, filename: &str) -> Option<RegistryClaim> {
        if self.lock().insert(filename.to_string()) {
            Some(RegistryClaim {
                registry: self.clone(),
                filename: filename.to_string(),
            })
        } else {
            None
        }
    }

    pub fn contains(&self, filename: &str) -> bool {
        self.lock().contains(filename)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // 持锁期间不会 panic，锁中毒时照常使用里面的数据
    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// 处理权，drop 时从登记表移除
#[derive(Debug)]
pub struct RegistryClaim {
    registry: ProcessingRegistry,
    filename: String,
}

impl RegistryClaim {
    pub fn filename(&self) -> &str {
        &self.filename
    }
}

impl Drop for RegistryClaim {
    fn drop(&mut self) {
        self.registry.lock().remove(&self.filename);
    }
}
