pub mod assignment_flow;
pub mod progress;

pub use assignment_flow::AssignmentFlow;
pub use progress::{ProgressStatus, ProgressTracker};
