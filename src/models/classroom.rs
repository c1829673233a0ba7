//! 课堂数据模型：作业、名册和学生提交

use serde::{Deserialize, Serialize};

/// Google Slides 演示文稿的 MIME 类型
pub const SLIDES_MIME_TYPE: &str = "application/vnd.google-apps.presentation";

/// 提交中的一个附件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Drive 文件，链接等非文件附件为 `None`
    #[serde(default)]
    pub drive_file_id: Option<String>,
}

/// 一名学生对某个作业的提交
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub user_id: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl Submission {
    pub fn drive_file_ids(&self) -> impl Iterator<Item = &str> {
        self.attachments
            .iter()
            .filter_map(|attachment| attachment.drive_file_id.as_deref())
    }
}
