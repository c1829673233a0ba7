//! # Slides Assessor
//!
//! 对 Google Slides 学生作业进行自动评分的 Rust 应用程序
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源（HTTP 客户端、缓存、锁文件），只暴露能力
//! - `Dispatcher` - 分批并发发送请求，传输失败时指数退避重试
//! - `AssessmentCache` - 以参考答案和学生回答为键的评分缓存
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"
//! - `ContentExtractor` - 从带标签的幻灯片中提取任务
//! - `ImagePipeline` - 下载幻灯片图片并上传到图片服务
//! - `AssessmentEngine` - 生成评分请求、校验响应、写回评分
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个作业"的完整评分流程
//! - `AssignmentFlow` - 填充任务 → 查找提交 → 提取回答 → 图片 → 评分
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/app` - 运行锁、进度跟踪、结果输出
//!
//! ## 模块结构

pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult};
pub use infrastructure::{Dispatcher, FileCache, MemoryCache, Notifier};
pub use models::{Assignment, Task, TaskType};
pub use orchestrator::{App, RunRequest, RunStatus, RunSummary};
pub use workflow::AssignmentFlow;
