//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责一次评分运行的调度，是整个系统的"指挥中心"。
//!
//! ### `app` - 评分运行
//! - 管理应用生命周期（初始化、运行、输出）
//! - 持有运行锁，防止同一份参考文档被并发评分
//! - 按固定顺序调用 `AssignmentFlow` 并记录进度
//! - 输出全局统计信息和评分结果文件
//!
//! ## 层次关系
//!
//! ```text
//! app (处理一次运行)
//!     ↓
//! workflow::AssignmentFlow (处理一个 Assignment)
//!     ↓
//! services (能力层：extract / images / assess)
//!     ↓
//! infrastructure (基础设施：Dispatcher / Cache / RunLock)
//! ```

pub mod app;

pub use app::{App, RunRequest, RunStatus, RunSummary};
