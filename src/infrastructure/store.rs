//! 键值存储 - 基础设施层
//!
//! 缓存与批次统计都通过 [`KeyValueStore`] 持久化。生产环境使用 [`FileStore`]，
//! 测试使用 [`MemoryStore`] 替身。

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::{AppError, AppResult};

/// 键值存储
///
/// 职责：
/// - 按字符串键保存序列化后的值
/// - 可被多个并发批次同时调用（后写覆盖先写）
/// - 不关心值的结构
pub trait KeyValueStore: Send + Sync {
    /// 读取键对应的值，不存在时返回 `None`
    fn get(&self, key: &str) -> AppResult<Option<String>>;

    /// 写入键值（覆盖）
    fn set(&self, key: &str, value: &str) -> AppResult<()>;
}

impl dyn KeyValueStore {
    /// 读取并反序列化为指定类型
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> AppResult<Option<T>> {
        match self.get(key)? {
            Some(raw) => {
                let value =
                    serde_json::from_str(&raw).map_err(|e| AppError::store_corrupted(key, e))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// 序列化后写入
    pub fn set_as<T: Serialize>(&self, key: &str, value: &T) -> AppResult<()> {
        let raw = serde_json::to_string(value).map_err(|e| AppError::store_corrupted(key, e))?;
        self.set(key, &raw)
    }
}

/// 按版本号顺序落盘的快照写入器
///
/// 调用方在自己的锁内序列化快照并领取递增的版本号，释放锁之后再交给写入器；
/// 比已落盘版本旧的快照直接丢弃，磁盘内容不会倒退。
pub struct SnapshotWriter {
    store: Arc<dyn KeyValueStore>,
    key: &'static str,
    written: Mutex<u64>,
}

impl SnapshotWriter {
    pub fn new(store: Arc<dyn KeyValueStore>, key: &'static str) -> Self {
        Self {
            store,
            key,
            written: Mutex::new(0),
        }
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    /// 写入第 `version` 版快照，返回是否真正写入
    pub fn write(&self, version: u64, raw: &str) -> AppResult<bool> {
        let mut written = self.written.lock();
        if version <= *written {
            debug!("跳过过期快照 {} v{} (已写入 v{})", self.key, version, *written);
            return Ok(false);
        }

        self.store.set(self.key, raw)?;
        *written = version;
        Ok(true)
    }
}

/// 内存存储，进程退出即丢失
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> AppResult<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> AppResult<()> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// 文件存储
///
/// 每个键对应目录下的一个 `<key>.json` 文件。写入先落到临时文件再重命名，
/// 读取方不会看到写了一半的内容。
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    // 同一进程内串行化写入，避免临时文件互相覆盖
    write_lock: Mutex<()>,
}

impl FileStore {
    /// 创建文件存储，目录在第一次写入时创建
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// 存储目录
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> AppResult<Option<String>> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::store_read_failed(key, e)),
        }
    }

    fn set(&self, key: &str, value: &str) -> AppResult<()> {
        let _guard = self.write_lock.lock();

        fs::create_dir_all(&self.dir).map_err(|e| AppError::store_write_failed(key, e))?;

        let path = self.path_for(key);
        let tmp_path = self.dir.join(format!("{}.json.tmp", key));
        fs::write(&tmp_path, value).map_err(|e| AppError::store_write_failed(key, e))?;
        fs::rename(&tmp_path, &path).map_err(|e| AppError::store_write_failed(key, e))?;

        debug!("已写入 {} ({} 字节)", path.display(), value.len());
        Ok(())
    }
}
