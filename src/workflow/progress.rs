//! 运行进度
//!
//! 记录当前步骤和提示信息，出错时保留出错前的步骤编号。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

/// 进度快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressStatus {
    pub step: u32,
    pub message: String,
    pub completed: bool,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Default for ProgressStatus {
    fn default() -> Self {
        Self {
            step: 0,
            message: "No progress data found.".to_string(),
            completed: false,
            error: None,
            timestamp: Utc::now(),
        }
    }
}

/// 进度跟踪
#[derive(Debug, Default)]
pub struct ProgressTracker {
    status: ProgressStatus,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 开始跟踪，步骤归零
    pub fn start(&mut self) {
        self.status = ProgressStatus {
            step: 0,
            message: "Starting the assessment. This may take up to a minute...".to_string(),
            ..ProgressStatus::default()
        };
        info!("进度跟踪开始");
    }

    /// 更新进度，`step` 为 `None` 时保持当前步骤
    pub fn update(&mut self, step: Option<u32>, message: impl Into<String>) {
        self.status = ProgressStatus {
            step: step.unwrap_or(self.status.step),
            message: message.into(),
            completed: false,
            error: None,
            timestamp: Utc::now(),
        };
        info!("⏳ 步骤 {} - {}", self.status.step, self.status.message);
    }

    /// 进入下一步
    pub fn next_step(&mut self, message: impl Into<String>) {
        let step = self.status.step + 1;
        self.update(Some(step), message);
    }

    pub fn complete(&mut self) {
        self.status.completed = true;
        self.status.message = "Task completed successfully.".to_string();
        self.status.timestamp = Utc::now();
        info!("✅ 进度跟踪完成");
    }

    pub fn log_error(&mut self, error_message: impl Into<String>) {
        let error_message = error_message.into();
        error!("步骤 {} 出错: {}", self.status.step, error_message);
        self.status.error = Some(error_message);
        self.status.message = "An error occurred.".to_string();
        self.status.timestamp = Utc::now();
    }

    pub fn status(&self) -> &ProgressStatus {
        &self.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steps_and_error_keep_step_number() {
        let mut tracker = ProgressTracker::new();
        tracker.start();
        tracker.next_step("Fetching all students.");
        tracker.update(None, "3 students fetched.");
        tracker.next_step("Getting the tasks from the reference slides.");
        assert_eq!(tracker.status().step, 2);
        assert_eq!(tracker.status().message, "Getting the tasks from the reference slides.");

        tracker.log_error("boom");
        assert_eq!(tracker.status().step, 2);
        assert_eq!(tracker.status().error.as_deref(), Some("boom"));
        assert!(!tracker.status().completed);
    }

    #[test]
    fn test_complete() {
        let mut tracker = ProgressTracker::new();
        tracker.start();
        tracker.next_step("Assessment run starting.");
        tracker.complete();
        assert!(tracker.status().completed);
        assert_eq!(tracker.status().step, 1);
    }
}
