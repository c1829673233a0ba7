//! 幻灯片内容提取 - 业务能力层
//!
//! 按页面元素描述的首字符识别任务：
//! - `#` 任务标题：文本框提取为 Text，表格转换为 Markdown 后作为 Table
//! - `~` 或 `|` 整页图片任务：内容为该页的导出地址
//! - `^` 评分说明：附加到本次提取中最近一个任务
//!
//! 其他标签只记录日志，不影响提取。

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::AppResult;
use crate::models::{ContentType, PageElement, PageElementKind, Task, TaskType};
use crate::services::classroom::SlideSource;

/// 幻灯片整页导出为 PNG 的地址
pub fn slide_export_url(document_id: &str, slide_id: &str) -> String {
    format!(
        "https://docs.google.com/presentation/d/{doc}/export/png?id={doc}&pageid={slide}",
        doc = document_id,
        slide = slide_id
    )
}

/// 将表格转换为 Markdown
///
/// 第一行作为表头，随后是每列一个 `---` 的分隔行。单元格去掉首尾空白，
/// 其中的 `|` 转义为 `\|`。没有任何单元格的表格返回空字符串。
pub fn table_to_markdown(rows: &[Vec<String>]) -> String {
    let Some(header) = rows.first().filter(|header| !header.is_empty()) else {
        return String::new();
    };

    let render_row = |row: &[String]| -> String {
        let cells: Vec<String> = row
            .iter()
            .map(|cell| cell.trim().replace('|', "\\|"))
            .collect();
        format!("| {} |\n", cells.join(" | "))
    };

    let mut markdown = render_row(header);
    let separator = vec!["---".to_string(); header.len()];
    markdown.push_str(&format!("| {} |\n", separator.join(" | ")));
    for row in &rows[1..] {
        markdown.push_str(&render_row(row));
    }
    markdown
}

/// 元素描述的标签
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Title,
    SlideImage,
    Note,
    Unknown(char),
}

impl Tag {
    fn parse(first: char) -> Self {
        match first {
            '#' => Tag::Title,
            '~' | '|' => Tag::SlideImage,
            '^' => Tag::Note,
            other => Tag::Unknown(other),
        }
    }
}

/// 幻灯片内容提取服务
#[derive(Clone)]
pub struct ContentExtractor {
    slides: Arc<dyn SlideSource>,
}

impl ContentExtractor {
    pub fn new(slides: Arc<dyn SlideSource>) -> Self {
        Self { slides }
    }

    /// 从演示文稿中提取任务
    ///
    /// 提取出的内容按 `content_type` 写入 `reference_content` 或 `empty_content`。
    /// 返回顺序与元素在文档中的顺序一致。
    pub fn extract_tasks(&self, document_id: &str, content_type: ContentType) -> AppResult<Vec<Task>> {
        let presentation = self.slides.open_presentation(document_id)?;
        let mut tasks: Vec<Task> = Vec::new();
        // 评分说明依赖元素的遍历顺序：它总是附加到此前最后一个解析出的任务上
        let mut current_task: Option<usize> = None;

        for slide in &presentation.slides {
            for element in &slide.page_elements {
                let Some(description) = element.description.as_deref() else {
                    continue;
                };
                let mut chars = description.chars();
                let Some(first) = chars.next() else {
                    continue;
                };
                let key = chars.as_str().trim();

                match Tag::parse(first) {
                    Tag::Title => {
                        let (task_type, content) = match &element.kind {
                            PageElementKind::Shape { text } => (TaskType::Text, text.trim().to_string()),
                            PageElementKind::Table { rows } => (TaskType::Table, table_to_markdown(rows)),
                            other => {
                                warn!(
                                    "任务标题 {} 所在元素类型 {} 不受支持，已跳过",
                                    key,
                                    other.type_name()
                                );
                                continue;
                            }
                        };
                        if key.is_empty() {
                            warn!("幻灯片 {} 中有未命名的任务标题，已跳过", slide.object_id);
                            continue;
                        }
                        tasks.push(Task::from_extracted(
                            key,
                            task_type,
                            slide.object_id.clone(),
                            content,
                            content_type,
                        ));
                        current_task = Some(tasks.len() - 1);
                    }
                    Tag::SlideImage => {
                        if key.is_empty() {
                            warn!("幻灯片 {} 中有未命名的图片任务，已跳过", slide.object_id);
                            continue;
                        }
                        tasks.push(Task::from_extracted(
                            key,
                            TaskType::Image,
                            slide.object_id.clone(),
                            slide_export_url(document_id, &slide.object_id),
                            content_type,
                        ));
                        current_task = Some(tasks.len() - 1);
                    }
                    Tag::Note => match current_task {
                        Some(index) => tasks[index].notes = Some(note_text(element)),
                        None => warn!("评分说明没有对应的任务，已丢弃: {}", description),
                    },
                    Tag::Unknown(tag) => {
                        debug!("不支持的标签 \"{}\": {}", tag, description);
                    }
                }
            }
        }

        info!(
            "从文档 {} 中提取到 {} 个任务",
            document_id,
            tasks.len()
        );
        Ok(tasks)
    }
}

/// 评分说明的文本：文本框取文字，表格取 Markdown，图片取替代文字
fn note_text(element: &PageElement) -> String {
    match &element.kind {
        PageElementKind::Shape { text } => text.trim().to_string(),
        PageElementKind::Table { rows } => table_to_markdown(rows),
        PageElementKind::Image { alt_text } => {
            alt_text.as_deref().map(str::trim).unwrap_or_default().to_string()
        }
        other => {
            debug!("评分说明所在元素类型 {} 不受支持", other.type_name());
            String::new()
        }
    }
}
