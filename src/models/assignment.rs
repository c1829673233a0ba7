use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::models::assessment::Assessments;
use crate::models::student::{Student, StudentTask};
use crate::models::task::Task;

/// 一次评分运行的聚合根
///
/// `tasks` 必须在提取学生提交、生成评分请求之前由参考文档和空白文档两次提取完整填充。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub course_id: String,
    pub assignment_id: String,
    pub assignment_name: String,
    pub reference_document_id: String,
    pub empty_document_id: String,
    /// 任务 key → 任务
    pub tasks: BTreeMap<String, Task>,
    pub student_tasks: Vec<StudentTask>,
}

impl Assignment {
    pub fn new(
        course_id: impl Into<String>,
        assignment_id: impl Into<String>,
        reference_document_id: impl Into<String>,
        empty_document_id: impl Into<String>,
    ) -> Self {
        let assignment_id = assignment_id.into();
        Self {
            course_id: course_id.into(),
            assignment_name: Self::fallback_name(&assignment_id),
            assignment_id,
            reference_document_id: reference_document_id.into(),
            empty_document_id: empty_document_id.into(),
            tasks: BTreeMap::new(),
            student_tasks: Vec::new(),
        }
    }

    /// 查询作业标题失败时使用的名称
    pub fn fallback_name(assignment_id: &str) -> String {
        format!("Assignment {}", assignment_id)
    }

    /// 合并参考文档和空白文档的提取结果
    ///
    /// 以参考文档为准建立任务表；空白文档中同 key 的任务补充 `empty_content`
    /// （参考任务没有评分说明时也补充说明），找不到对应参考任务的空白任务记录后丢弃。
    ///
    /// 参考文档中同一个 key 出现多次时合并到第一次出现的任务上：
    /// 后出现的内容覆盖 `reference_content`，评分说明只在后者非空时覆盖。
    pub fn merge_tasks(&mut self, reference_tasks: Vec<Task>, empty_tasks: Vec<Task>) {
        let mut tasks: BTreeMap<String, Task> = BTreeMap::new();
        for task in reference_tasks {
            match tasks.get_mut(&task.key) {
                Some(existing) => {
                    warn!("参考文档中任务 {} 重复出现，合并到已有任务", task.key);
                    existing.reference_content = task.reference_content;
                    if task.notes.is_some() {
                        existing.notes = task.notes;
                    }
                }
                None => {
                    tasks.insert(task.key.clone(), task);
                }
            }
        }

        for empty_task in empty_tasks {
            match tasks.get_mut(&empty_task.key) {
                Some(task) => {
                    task.empty_content = empty_task.empty_content;
                    if task.notes.is_none() {
                        task.notes = empty_task.notes;
                    }
                }
                None => warn!("空白任务 {} 没有对应的参考任务", empty_task.key),
            }
        }

        self.tasks = tasks;
        info!("✓ 从幻灯片中提取到 {} 个任务", self.tasks.len());
    }

    /// 添加学生，提交文档稍后查找
    pub fn add_student(&mut self, student: Student) {
        let student_task = StudentTask::new(student, self.assignment_id.clone());
        self.student_tasks.push(student_task);
    }

    pub fn student_task_mut(&mut self, student_id: &str) -> Option<&mut StudentTask> {
        self.student_tasks
            .iter_mut()
            .find(|student_task| student_task.student.id == student_id)
    }

    /// 按 uid 查找回答，返回 (学生提交序号, 任务 key)
    pub fn locate_uid(&self, uid: &str) -> Option<(usize, String)> {
        self.student_tasks
            .iter()
            .enumerate()
            .find_map(|(index, student_task)| {
                student_task
                    .task_key_for_uid(uid)
                    .map(|key| (index, key.to_string()))
            })
    }

    /// 把评分写入 uid 对应的回答
    ///
    /// 返回是否找到了对应的回答。
    pub fn assign_assessments(&mut self, uid: &str, assessments: &Assessments) -> bool {
        match self.locate_uid(uid) {
            Some((index, key)) => {
                let student_task = &mut self.student_tasks[index];
                for (criterion, assessment) in assessments {
                    student_task.add_assessment(&key, criterion, assessment.clone());
                }
                true
            }
            None => {
                warn!("没有找到 uid {} 对应的学生回答", uid);
                false
            }
        }
    }
}
