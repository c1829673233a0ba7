//! 演示文稿文档模型
//!
//! 只保留提取任务需要的部分：幻灯片、页面元素及其描述（alt text）。

use serde::{Deserialize, Serialize};

/// 一份演示文稿
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Presentation {
    pub id: String,
    #[serde(default)]
    pub slides: Vec<Slide>,
}

/// 一页幻灯片
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slide {
    pub object_id: String,
    #[serde(default)]
    pub page_elements: Vec<PageElement>,
}

/// 页面元素
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageElement {
    #[serde(default)]
    pub object_id: String,
    /// 元素描述，首字符是任务标签
    #[serde(default)]
    pub description: Option<String>,
    #[serde(flatten)]
    pub kind: PageElementKind,
}

/// 页面元素的类型和内容
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PageElementKind {
    Shape {
        #[serde(default)]
        text: String,
    },
    Table {
        #[serde(default)]
        rows: Vec<Vec<String>>,
    },
    Image {
        #[serde(default)]
        alt_text: Option<String>,
    },
    Line,
    Video,
    Group,
}

impl PageElementKind {
    /// 类型名，用于日志
    pub fn type_name(&self) -> &'static str {
        match self {
            PageElementKind::Shape { .. } => "SHAPE",
            PageElementKind::Table { .. } => "TABLE",
            PageElementKind::Image { .. } => "IMAGE",
            PageElementKind::Line => "LINE",
            PageElementKind::Video => "VIDEO",
            PageElementKind::Group => "GROUP",
        }
    }
}
