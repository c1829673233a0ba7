use std::fmt;

use serde::{Deserialize, Serialize};

/// 任务类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskType {
    /// 文本框
    Text,
    /// 表格（内容为 Markdown）
    Table,
    /// 整页幻灯片图片
    Image,
}

impl TaskType {
    /// 评分端点路径中的类型名（如 `textAssessment`）
    pub fn endpoint_slug(self) -> &'static str {
        match self {
            TaskType::Text => "text",
            TaskType::Table => "table",
            TaskType::Image => "image",
        }
    }

    /// 该类型的回答是否为纯文本内容
    pub fn is_textual(self) -> bool {
        matches!(self, TaskType::Text | TaskType::Table)
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskType::Text => "Text",
            TaskType::Table => "Table",
            TaskType::Image => "Image",
        };
        f.write_str(name)
    }
}

/// 提取时内容写入的目标字段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    /// 写入 `reference_content`
    Reference,
    /// 写入 `empty_content`
    Empty,
}

/// 一个可评分的任务
///
/// `key` 来自幻灯片元素描述中的标签，在同一个作业内唯一。
/// 图片任务的内容是幻灯片导出地址，图片处理完成后替换为持久地址。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub key: String,
    pub task_type: TaskType,
    /// 任务所在的幻灯片（来自提取它的那个文档）
    pub slide_id: String,
    /// 教师的参考答案
    pub reference_content: Option<String>,
    /// 空白模板内容，空字符串也是合法值
    pub empty_content: Option<String>,
    /// 额外的评分说明
    pub notes: Option<String>,
}

impl Task {
    /// 根据提取目标创建任务，内容写入对应字段
    pub fn from_extracted(
        key: impl Into<String>,
        task_type: TaskType,
        slide_id: impl Into<String>,
        content: String,
        content_type: ContentType,
    ) -> Self {
        let (reference_content, empty_content) = match content_type {
            ContentType::Reference => (Some(content), None),
            ContentType::Empty => (None, Some(content)),
        };
        Self {
            key: key.into(),
            task_type,
            slide_id: slide_id.into(),
            reference_content,
            empty_content,
            notes: None,
        }
    }

    /// 按提取目标取出内容
    pub fn content(&self, content_type: ContentType) -> Option<&str> {
        match content_type {
            ContentType::Reference => self.reference_content.as_deref(),
            ContentType::Empty => self.empty_content.as_deref(),
        }
    }

    /// 非空白的评分说明
    pub fn non_blank_notes(&self) -> Option<&str> {
        self.notes
            .as_deref()
            .filter(|notes| !notes.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_extracted_routes_content() {
        let reference = Task::from_extracted(
            "Q1",
            TaskType::Text,
            "s1",
            "answer".into(),
            ContentType::Reference,
        );
        assert_eq!(reference.reference_content.as_deref(), Some("answer"));
        assert!(reference.empty_content.is_none());

        let empty = Task::from_extracted("Q1", TaskType::Text, "s1", String::new(), ContentType::Empty);
        assert_eq!(empty.content(ContentType::Empty), Some(""));
        assert!(empty.reference_content.is_none());
    }

    #[test]
    fn test_blank_notes_are_ignored() {
        let mut task =
            Task::from_extracted("Q1", TaskType::Text, "s1", "a".into(), ContentType::Reference);
        task.notes = Some("   ".to_string());
        assert!(task.non_blank_notes().is_none());
        task.notes = Some("award spelling".to_string());
        assert_eq!(task.non_blank_notes(), Some("award spelling"));
    }
}
