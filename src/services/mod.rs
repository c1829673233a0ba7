//! 业务能力层（Services Layer）
//!
//! 每个服务描述"我能做什么"，不关心调用顺序。

pub mod assessment_engine;
pub mod classroom;
pub mod content_extractor;
pub mod image_pipeline;

pub use assessment_engine::{AssessmentEngine, AssessmentReport, AssessmentRequest, RequestPlan};
pub use classroom::{ClassroomApi, SlideSource};
pub use content_extractor::{table_to_markdown, ContentExtractor};
pub use image_pipeline::{ImagePipeline, ImageReport};
