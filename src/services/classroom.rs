//! 外部协作方接口 - 业务能力层
//!
//! 课堂、Drive 和幻灯片服务只通过这两个 trait 进入评分流程。

use crate::error::AppResult;
use crate::models::{Presentation, Student, Submission};

/// 读取演示文稿内容
pub trait SlideSource: Send + Sync {
    fn open_presentation(&self, document_id: &str) -> AppResult<Presentation>;
}

/// 课堂与 Drive 查询
pub trait ClassroomApi: Send + Sync {
    /// 作业标题
    fn course_work_title(&self, course_id: &str, assignment_id: &str) -> AppResult<String>;

    /// 课程名册
    fn list_students(&self, course_id: &str) -> AppResult<Vec<Student>>;

    /// 某个作业的全部学生提交
    fn list_submissions(&self, course_id: &str, assignment_id: &str) -> AppResult<Vec<Submission>>;

    /// Drive 文件的 MIME 类型
    fn mime_type(&self, file_id: &str) -> AppResult<String>;
}
