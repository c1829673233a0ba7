//! 基础设施层（Infrastructure Layer）
//!
//! 持有稀缺资源（HTTP 客户端、缓存文件、锁文件），只向上暴露能力，不包含评分逻辑。

pub mod cache;
pub mod dispatcher;
pub mod fixture_workspace;
pub mod notifier;
pub mod run_lock;

pub use cache::{generate_cache_key, AssessmentCache, FileCache, MemoryCache};
pub use dispatcher::{Dispatcher, HttpResponse, RequestBody, RequestDescriptor};
pub use fixture_workspace::FixtureWorkspace;
pub use notifier::{Notice, NoticeLevel, Notifier};
pub use run_lock::RunLock;
