//! 评分缓存 - 基础设施层
//!
//! 以 (参考答案, 学生回答) 的内容哈希为键，值为原始评分 JSON。
//! 键只依赖内容，重新评分时 uid 变化也能命中。

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::error::{AppError, AppResult};
use crate::utils::hash::generate_hash;

/// 缓存键：两段内容各自 JSON 编码后拼接，再取 SHA-256
///
/// JSON 编码带引号和转义，`("ab", "c")` 与 `("a", "bc")` 不会得到相同的键。
pub fn generate_cache_key(reference: &str, response: &str) -> String {
    let encoded = format!(
        "{}{}",
        JsonValue::String(reference.to_string()),
        JsonValue::String(response.to_string())
    );
    generate_hash(&encoded)
}

/// 评分缓存能力
///
/// 并发写入同一个键时写入的是同样的内容，后写覆盖先写不会造成错误结果。
pub trait AssessmentCache: Send + Sync {
    /// 读取未过期的条目
    fn get(&self, key: &str) -> Option<JsonValue>;

    /// 写入条目，过期时间由缓存自身的 TTL 决定
    fn put(&self, key: &str, value: JsonValue);

    /// 把尚未持久化的条目写出，评分引擎每处理完一批调用一次
    fn flush(&self) {}
}

/// 进程内缓存
#[derive(Debug)]
pub struct MemoryCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, (JsonValue, Instant)>>,
}

impl MemoryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AssessmentCache for MemoryCache {
    fn get(&self, key: &str) -> Option<JsonValue> {
        let mut entries = self.entries.lock().ok()?;
        match entries.get(key) {
            Some((value, expires_at)) if Instant::now() < *expires_at => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn put(&self, key: &str, value: JsonValue) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.to_string(), (value, Instant::now() + self.ttl));
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FileCacheEntry {
    value: JsonValue,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct FileCacheState {
    entries: HashMap<String, FileCacheEntry>,
    /// 上次写出之后是否有新条目
    dirty: bool,
}

/// JSON 文件缓存，进程重启后依然有效
///
/// `put` 只修改内存，`flush` 或 drop 时整体写出：先写临时文件再重命名，
/// 读取方不会看到写了一半的文件。
#[derive(Debug)]
pub struct FileCache {
    path: PathBuf,
    ttl: chrono::Duration,
    state: Mutex<FileCacheState>,
}

impl FileCache {
    /// 打开缓存文件，文件不存在时从空缓存开始，已过期的条目在加载时丢弃
    pub fn open(path: impl AsRef<Path>, ttl: Duration) -> AppResult<Self> {
        let path = path.as_ref().to_path_buf();
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| AppError::Other(format!("缓存 TTL 超出范围: {}", e)))?;

        let mut entries: HashMap<String, FileCacheEntry> = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .map_err(|e| AppError::file(path.display().to_string(), e))?;
            match serde_json::from_str(&content) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("⚠️ 缓存文件 {} 无法解析，忽略旧内容: {}", path.display(), e);
                    HashMap::new()
                }
            }
        } else {
            HashMap::new()
        };

        let now = Utc::now();
        entries.retain(|_, entry| entry.expires_at > now);
        debug!("从 {} 加载了 {} 条缓存", path.display(), entries.len());

        Ok(Self {
            path,
            ttl,
            state: Mutex::new(FileCacheState {
                entries,
                dirty: false,
            }),
        })
    }

    fn persist(&self, entries: &HashMap<String, FileCacheEntry>) -> AppResult<()> {
        let content = serde_json::to_string_pretty(entries)?;
        let mut tmp_name = self.path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".tmp");
        let tmp_path = self.path.with_file_name(tmp_name);

        std::fs::write(&tmp_path, content)
            .map_err(|e| AppError::file(tmp_path.display().to_string(), e))?;
        std::fs::rename(&tmp_path, &self.path)
            .map_err(|e| AppError::file(self.path.display().to_string(), e))
    }
}

impl AssessmentCache for FileCache {
    fn get(&self, key: &str) -> Option<JsonValue> {
        let state = self.state.lock().ok()?;
        state
            .entries
            .get(key)
            .filter(|entry| entry.expires_at > Utc::now())
            .map(|entry| entry.value.clone())
    }

    fn put(&self, key: &str, value: JsonValue) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        state.entries.insert(
            key.to_string(),
            FileCacheEntry {
                value,
                expires_at: Utc::now() + self.ttl,
            },
        );
        state.dirty = true;
    }

    fn flush(&self) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        if !state.dirty {
            return;
        }
        match self.persist(&state.entries) {
            Ok(()) => {
                state.dirty = false;
                debug!("已写出 {} 条缓存到 {}", state.entries.len(), self.path.display());
            }
            Err(e) => warn!("⚠️ 写入缓存文件失败: {}", e),
        }
    }
}

impl Drop for FileCache {
    fn drop(&mut self) {
        self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cache_key_depends_on_both_parts() {
        let key = generate_cache_key("The answer is 42.", "42");
        assert_eq!(key, generate_cache_key("The answer is 42.", "42"));
        assert_ne!(key, generate_cache_key("The answer is 42.", "43"));
        assert_ne!(generate_cache_key("ab", "c"), generate_cache_key("a", "bc"));
        assert_eq!(key.len(), 64);
    }

    #[test]
    fn test_memory_cache_expires() {
        let cache = MemoryCache::new(Duration::from_millis(0));
        cache.put("k", json!({"a": 1}));
        assert!(cache.get("k").is_none());

        let cache = MemoryCache::new(Duration::from_secs(60));
        cache.put("k", json!({"a": 1}));
        assert_eq!(cache.get("k"), Some(json!({"a": 1})));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_file_cache_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");

        let cache = FileCache::open(&path, Duration::from_secs(3600)).unwrap();
        cache.put("k", json!({"spag": {"score": 4, "reasoning": "ok"}}));
        drop(cache);

        let reopened = FileCache::open(&path, Duration::from_secs(3600)).unwrap();
        assert_eq!(reopened.get("k").unwrap()["spag"]["score"], 4);
        assert!(reopened.get("missing").is_none());
    }

    #[test]
    fn test_file_cache_writes_only_on_flush() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");

        let cache = FileCache::open(&path, Duration::from_secs(3600)).unwrap();
        cache.put("a", json!({"accuracy": {"score": 5, "reasoning": "ok"}}));
        cache.put("b", json!({"accuracy": {"score": 3, "reasoning": "meh"}}));
        assert!(!path.exists());
        assert_eq!(cache.get("b").unwrap()["accuracy"]["score"], 3);

        cache.flush();
        assert!(path.exists());
        assert!(!dir.path().join("cache.json.tmp").exists());
        let on_disk: HashMap<String, JsonValue> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk.len(), 2);

        let reopened = FileCache::open(&path, Duration::from_secs(3600)).unwrap();
        assert_eq!(reopened.get("a").unwrap()["accuracy"]["score"], 5);
    }

    #[test]
    fn test_file_cache_ignores_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, "not json").unwrap();

        let cache = FileCache::open(&path, Duration::from_secs(60)).unwrap();
        assert!(cache.get("k").is_none());
    }
}
