//! 运行锁 - 基础设施层
//!
//! 同一份文档同一时间只允许一次评分运行。锁是锁目录下的一个文件，
//! 通过 `create_new` 原子创建，守卫释放时删除。
//!
//! 锁文件内容是获取时间（RFC 3339）。进程被杀死时守卫不会释放，
//! 超过 `stale_after` 的锁视为上次运行遗留，直接回收。

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::{AppResult, LockError};

/// 轮询锁文件的间隔
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// 持有期间锁有效，drop 时释放
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    /// 获取文档的运行锁，最多等待 `wait`
    ///
    /// 已存在且早于 `stale_after` 的锁文件会被删除后重新获取。
    pub async fn acquire(
        lock_dir: &Path,
        document_id: &str,
        wait: Duration,
        stale_after: Duration,
    ) -> AppResult<Self> {
        fs::create_dir_all(lock_dir)
            .await
            .map_err(|source| LockError::Io {
                path: lock_dir.display().to_string(),
                source,
            })?;

        let path = lock_dir.join(format!("{}.lock", sanitize(document_id)));
        let started = Instant::now();

        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path).await {
                Ok(mut file) => {
                    let stamp = Utc::now().to_rfc3339();
                    let written = match file.write_all(format!("{}\n", stamp).as_bytes()).await {
                        Ok(()) => file.flush().await,
                        Err(e) => Err(e),
                    };
                    if let Err(e) = written {
                        warn!("写入锁文件 {} 失败: {}", path.display(), e);
                    }
                    info!("🔒 已获取文档 {} 的运行锁", document_id);
                    return Ok(Self { path });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if let Some(age) = lock_age(&path).await.filter(|age| *age >= stale_after) {
                        warn!(
                            "♻️ 运行锁 {} 已存在 {} 秒，视为异常退出的运行遗留，回收",
                            path.display(),
                            age.as_secs()
                        );
                        match fs::remove_file(&path).await {
                            Ok(()) => continue,
                            Err(e) if e.kind() == ErrorKind::NotFound => continue,
                            Err(source) => {
                                return Err(LockError::Io {
                                    path: path.display().to_string(),
                                    source,
                                }
                                .into())
                            }
                        }
                    }
                    if started.elapsed() >= wait {
                        return Err(LockError::Contended {
                            document_id: document_id.to_string(),
                            waited_ms: wait.as_millis() as u64,
                        }
                        .into());
                    }
                    debug!("运行锁被占用，等待中...");
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
                Err(source) => {
                    return Err(LockError::Io {
                        path: path.display().to_string(),
                        source,
                    }
                    .into())
                }
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("🔓 已释放运行锁 {}", self.path.display()),
            Err(e) => warn!("释放运行锁 {} 失败: {}", self.path.display(), e),
        }
    }
}

/// 锁已存在的时长
///
/// 优先使用文件中的时间戳；时间戳缺失或无法解析时（写入前进程退出）使用文件修改时间。
/// 锁文件已被删除时返回 `None`。
async fn lock_age(path: &Path) -> Option<Duration> {
    let content = fs::read_to_string(path).await.ok()?;
    match DateTime::parse_from_rfc3339(content.trim()) {
        Ok(stamp) => Some(
            (Utc::now() - stamp.with_timezone(&Utc))
                .to_std()
                .unwrap_or(Duration::ZERO),
        ),
        Err(_) => fs::metadata(path)
            .await
            .ok()?
            .modified()
            .ok()?
            .elapsed()
            .ok(),
    }
}

/// 文档 id 中只保留适合做文件名的字符
fn sanitize(document_id: &str) -> String {
    document_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
