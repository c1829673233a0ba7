use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::assessment::{Assessment, Assessments};
use crate::models::task::Task;
use crate::utils::hash::{generate_hash, generate_uid};

/// 学生身份信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: String,
    pub name: String,
    pub email: String,
}

impl Student {
    pub fn new(id: impl Into<String>, name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: email.into(),
        }
    }
}

/// 学生对某个任务的回答
///
/// 学生没有作答时 `uid` 与 `response` 都为 `None`，这类记录不会被送去评分，
/// 但依然保留，下游渲染为空白。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResponse {
    /// 请求与响应之间的关联键，派发前生成，同一次运行内不重复
    pub uid: Option<String>,
    /// 学生文档中的幻灯片
    pub slide_id: Option<String>,
    /// 文本/表格为字符串，图片任务为幻灯片图片地址
    pub response: Option<String>,
    /// 文本/表格回答的内容哈希
    pub content_hash: Option<String>,
    /// 评分完成前为 `None`
    pub assessments: Option<Assessments>,
}

impl TaskResponse {
    /// 没有作答的占位记录
    pub fn absent() -> Self {
        Self {
            uid: None,
            slide_id: None,
            response: None,
            content_hash: None,
            assessments: None,
        }
    }

    /// 回答内容去掉首尾空白后是否为空
    pub fn is_blank(&self) -> bool {
        self.response
            .as_deref()
            .map_or(true, |response| response.trim().is_empty())
    }
}

/// 一名学生针对一个作业的提交
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentTask {
    pub student: Student,
    pub assignment_id: String,
    /// 提交的演示文稿，找到之前为 `None`
    pub document_id: Option<String>,
    /// 任务 key → 回答
    pub responses: BTreeMap<String, TaskResponse>,
}

impl StudentTask {
    pub fn new(student: Student, assignment_id: impl Into<String>) -> Self {
        Self {
            student,
            assignment_id: assignment_id.into(),
            document_id: None,
            responses: BTreeMap::new(),
        }
    }

    /// 写入某个任务的回答
    pub fn add_response(&mut self, task_key: impl Into<String>, response: TaskResponse) {
        self.responses.insert(task_key.into(), response);
    }

    pub fn response(&self, task_key: &str) -> Option<&TaskResponse> {
        self.responses.get(task_key)
    }

    /// 给某个任务的回答追加一个维度的评分
    pub fn add_assessment(&mut self, task_key: &str, criterion: &str, assessment: Assessment) {
        match self.responses.get_mut(task_key) {
            Some(response) => {
                response
                    .assessments
                    .get_or_insert_with(Assessments::new)
                    .insert(criterion.to_string(), assessment);
            }
            None => warn!("未找到任务 {} 的回答，忽略评分", task_key),
        }
    }

    pub fn assessments(&self, task_key: &str) -> Option<&Assessments> {
        self.responses
            .get(task_key)
            .and_then(|response| response.assessments.as_ref())
    }

    /// 按 uid 查找任务 key
    pub fn task_key_for_uid(&self, uid: &str) -> Option<&str> {
        self.responses
            .iter()
            .find(|(_, response)| response.uid.as_deref() == Some(uid))
            .map(|(key, _)| key.as_str())
    }

    /// 把学生文档中提取出的内容绑定到作业的每个任务上
    ///
    /// 按标题匹配而不是按顺序，学生可能调整了幻灯片顺序。
    /// 学生文档里找不到的任务写入空回答（`uid = None`）。
    pub fn extract_and_assign_responses<'a>(
        &mut self,
        submitted: &[Task],
        tasks: impl IntoIterator<Item = &'a Task>,
    ) {
        let submission_map: BTreeMap<&str, &Task> = submitted
            .iter()
            .map(|task| (task.key.as_str(), task))
            .collect();

        for task in tasks {
            let response = match submission_map.get(task.key.as_str()) {
                Some(found) => {
                    let content = found.reference_content.clone();
                    let content_hash = if task.task_type.is_textual() {
                        content.as_deref().map(generate_hash)
                    } else {
                        None
                    };
                    TaskResponse {
                        uid: Some(generate_uid(&found.slide_id)),
                        slide_id: Some(found.slide_id.clone()),
                        response: content,
                        content_hash,
                        assessments: None,
                    }
                }
                None => TaskResponse::absent(),
            };
            self.add_response(task.key.clone(), response);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::task::{ContentType, TaskType};

    fn reference(key: &str, task_type: TaskType) -> Task {
        Task::from_extracted(key, task_type, "ref-slide", "ref".into(), ContentType::Reference)
    }

    fn submitted(key: &str, slide: &str, content: &str) -> Task {
        Task::from_extracted(key, TaskType::Text, slide, content.into(), ContentType::Reference)
    }

    #[test]
    fn test_responses_match_by_title_not_order() {
        let tasks = vec![reference("Q1", TaskType::Text), reference("Q2", TaskType::Table)];
        let submission = vec![submitted("Q2", "s2", "| a |"), submitted("Q1", "s1", "42")];

        let mut student_task = StudentTask::new(Student::new("1", "Ada", "ada@example.com"), "a-1");
        student_task.extract_and_assign_responses(&submission, &tasks);

        let q1 = student_task.response("Q1").unwrap();
        assert_eq!(q1.response.as_deref(), Some("42"));
        assert_eq!(q1.slide_id.as_deref(), Some("s1"));
        assert_eq!(q1.content_hash.as_deref(), Some(generate_hash("42").as_str()));
        assert!(q1.uid.is_some());

        let q2 = student_task.response("Q2").unwrap();
        assert_eq!(q2.response.as_deref(), Some("| a |"));
        assert_ne!(q1.uid, q2.uid);
    }

    #[test]
    fn test_missing_task_gets_explicit_empty_response() {
        let tasks = vec![reference("Q1", TaskType::Text), reference("Q3", TaskType::Image)];
        let submission = vec![submitted("Q1", "s1", "42")];

        let mut student_task = StudentTask::new(Student::new("1", "Ada", "ada@example.com"), "a-1");
        student_task.extract_and_assign_responses(&submission, &tasks);

        assert_eq!(student_task.responses.len(), 2);
        assert_eq!(student_task.response("Q3"), Some(&TaskResponse::absent()));
        assert!(student_task.response("Q3").unwrap().is_blank());
    }

    #[test]
    fn test_add_assessment_initialises_map() {
        let mut student_task = StudentTask::new(Student::new("1", "Ada", "ada@example.com"), "a-1");
        student_task.add_response("Q1", TaskResponse::absent());
        student_task.add_assessment("Q1", "accuracy", Assessment::new(3.0, "ok"));
        student_task.add_assessment("Q9", "accuracy", Assessment::new(3.0, "ok"));

        assert_eq!(student_task.assessments("Q1").unwrap().len(), 1);
        assert!(student_task.assessments("Q9").is_none());
    }
}
