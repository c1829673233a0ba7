//! 提示消息 - 基础设施层
//!
//! 只负责"提示用户"能力：写日志、追加到提示文件，并在内存中保留本次运行的全部提示，
//! 运行结束后汇总到运行结果中。

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

/// 提示级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// 一条提示
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub message: String,
}

/// 提示服务
#[derive(Debug)]
pub struct Notifier {
    notices_file: Option<PathBuf>,
    notices: Mutex<Vec<Notice>>,
}

impl Notifier {
    /// 创建不写文件的提示服务
    pub fn new() -> Self {
        Self {
            notices_file: None,
            notices: Mutex::new(Vec::new()),
        }
    }

    /// 使用自定义文件路径创建
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            notices_file: Some(path.into()),
            notices: Mutex::new(Vec::new()),
        }
    }

    /// 普通提示
    pub fn toast(&self, message: impl Into<String>, title: impl Into<String>) {
        self.push(NoticeLevel::Info, title.into(), message.into());
    }

    pub fn warn(&self, message: impl Into<String>, title: impl Into<String>) {
        self.push(NoticeLevel::Warning, title.into(), message.into());
    }

    pub fn error(&self, message: impl Into<String>, title: impl Into<String>) {
        self.push(NoticeLevel::Error, title.into(), message.into());
    }

    /// 本次运行到目前为止的全部提示
    pub fn notices(&self) -> Vec<Notice> {
        self.notices
            .lock()
            .map(|notices| notices.clone())
            .unwrap_or_default()
    }

    fn push(&self, level: NoticeLevel, title: String, message: String) {
        match level {
            NoticeLevel::Info => info!("💬 [{}] {}", title, message),
            NoticeLevel::Warning => warn!("⚠️ [{}] {}", title, message),
            NoticeLevel::Error => error!("❌ [{}] {}", title, message),
        }

        if let Some(path) = &self.notices_file {
            let line = format!(
                "{} | {:?} | {} | {}\n",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                level,
                title,
                message
            );
            let written = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .and_then(|mut file| file.write_all(line.as_bytes()));
            if let Err(e) = written {
                warn!("写入提示文件 {} 失败: {}", path.display(), e);
            }
        }

        if let Ok(mut notices) = self.notices.lock() {
            notices.push(Notice {
                level,
                title,
                message,
            });
        }
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notices_are_accumulated_and_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notices.txt");
        let notifier = Notifier::with_path(&path);

        notifier.toast("AI backend warmed up", "Warm-Up");
        notifier.error("Failed to process assessment for UID: u1", "Error");

        let notices = notifier.notices();
        assert_eq!(notices.len(), 2);
        assert_eq!(notices[1].level, NoticeLevel::Error);

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.contains("UID: u1"));
    }
}
