//! 作业流程 - 流程层
//!
//! 定义"一个作业"的评分步骤，必须按顺序执行：
//! 填充任务 → 查找学生提交 → 提取学生回答 → 处理图片 → 评分。
//!
//! 每一步只操作传入的 [`Assignment`]，不持有它。

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::AppResult;
use crate::models::{Assignment, ContentType, Student, SLIDES_MIME_TYPE};
use crate::services::{
    AssessmentEngine, AssessmentReport, ClassroomApi, ContentExtractor, ImagePipeline, ImageReport,
};

/// 作业评分流程
pub struct AssignmentFlow {
    classroom: Arc<dyn ClassroomApi>,
    extractor: ContentExtractor,
    images: ImagePipeline,
    engine: AssessmentEngine,
}

impl AssignmentFlow {
    pub fn new(
        classroom: Arc<dyn ClassroomApi>,
        extractor: ContentExtractor,
        images: ImagePipeline,
        engine: AssessmentEngine,
    ) -> Self {
        Self {
            classroom,
            extractor,
            images,
            engine,
        }
    }

    /// 获取课程名册，失败时返回空名册
    pub fn fetch_students(&self, course_id: &str) -> Vec<Student> {
        match self.classroom.list_students(course_id) {
            Ok(students) => students,
            Err(e) => {
                warn!("⚠️ 获取课程 {} 的学生名册失败: {}", course_id, e);
                Vec::new()
            }
        }
    }

    /// 从参考文档和空白文档填充任务
    ///
    /// 作业标题查询失败时使用默认名称，不中断流程；两份文档任何一份无法读取都是致命错误。
    pub fn populate_tasks_from_slides(&self, assignment: &mut Assignment) -> AppResult<()> {
        assignment.assignment_name = match self
            .classroom
            .course_work_title(&assignment.course_id, &assignment.assignment_id)
        {
            Ok(title) => title,
            Err(e) => {
                warn!("⚠️ 获取作业标题失败，使用默认名称: {}", e);
                Assignment::fallback_name(&assignment.assignment_id)
            }
        };

        let reference_tasks = self
            .extractor
            .extract_tasks(&assignment.reference_document_id, ContentType::Reference)?;
        let empty_tasks = self
            .extractor
            .extract_tasks(&assignment.empty_document_id, ContentType::Empty)?;
        assignment.merge_tasks(reference_tasks, empty_tasks);
        Ok(())
    }

    /// 为每名学生找到提交的演示文稿
    ///
    /// 只接受 MIME 类型为演示文稿的附件；没有合格附件的学生 `document_id` 保持为空。
    pub fn fetch_submitted_slides(&self, assignment: &mut Assignment) -> AppResult<()> {
        let submissions = self
            .classroom
            .list_submissions(&assignment.course_id, &assignment.assignment_id)?;

        for submission in &submissions {
            let Some(student_task) = assignment.student_task_mut(&submission.user_id) else {
                warn!("提交者 {} 不在学生名册中，忽略", submission.user_id);
                continue;
            };

            for file_id in submission.drive_file_ids() {
                match self.classroom.mime_type(file_id) {
                    Ok(mime) if mime == SLIDES_MIME_TYPE => {
                        student_task.document_id = Some(file_id.to_string());
                        break;
                    }
                    Ok(mime) => info!(
                        "学生 {} 的附件 {} 不是演示文稿 ({})，忽略",
                        student_task.student.name, file_id, mime
                    ),
                    Err(e) => warn!("⚠️ 无法获取附件 {} 的类型: {}", file_id, e),
                }
            }
        }

        let found = assignment
            .student_tasks
            .iter()
            .filter(|student_task| student_task.document_id.is_some())
            .count();
        info!(
            "✓ {}/{} 名学生提交了演示文稿",
            found,
            assignment.student_tasks.len()
        );
        Ok(())
    }

    /// 提取每名学生的回答
    ///
    /// 每个任务都会有一条回答记录；没有提交或提取失败的学生所有回答为空。
    pub fn process_all_submissions(&self, assignment: &mut Assignment) {
        let tasks = &assignment.tasks;
        for student_task in assignment.student_tasks.iter_mut() {
            let submitted = match student_task.document_id.as_deref() {
                Some(document_id) => {
                    match self.extractor.extract_tasks(document_id, ContentType::Reference) {
                        Ok(submitted) => submitted,
                        Err(e) => {
                            warn!(
                                "⚠️ 提取学生 {} 的提交失败: {}",
                                student_task.student.name, e
                            );
                            Vec::new()
                        }
                    }
                }
                None => Vec::new(),
            };
            student_task.extract_and_assign_responses(&submitted, tasks.values());
        }
    }

    /// 处理图片
    pub async fn process_images(&self, assignment: &mut Assignment) -> AppResult<ImageReport> {
        self.images.process_images(assignment).await
    }

    /// 评分
    pub async fn assess_responses(&self, assignment: &mut Assignment) -> AppResult<AssessmentReport> {
        self.engine.assess_responses(assignment).await
    }
}
