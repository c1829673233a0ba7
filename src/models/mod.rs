pub mod assessment;
pub mod assignment;
pub mod classroom;
pub mod loaders;
pub mod slides;
pub mod student;
pub mod task;

pub use assessment::{validate_assessment_data, Assessment, Assessments};
pub use assignment::Assignment;
pub use classroom::{Attachment, Submission, SLIDES_MIME_TYPE};
pub use loaders::{load_workspace, WorkspaceData};
pub use slides::{PageElement, PageElementKind, Presentation, Slide};
pub use student::{Student, StudentTask, TaskResponse};
pub use task::{ContentType, Task, TaskType};
