//! 文件工作区 - 基础设施层
//!
//! 用一个 TOML 文件充当课堂、Drive 和幻灯片服务，供命令行运行和集成测试使用。

use std::collections::HashMap;
use std::path::Path;

use crate::error::{AppResult, ExtractError};
use crate::models::loaders::{load_workspace, WorkspaceData};
use crate::models::{Presentation, Student, Submission};
use crate::services::classroom::{ClassroomApi, SlideSource};

/// 基于 [`WorkspaceData`] 的协作方实现
#[derive(Debug, Clone, Default)]
pub struct FixtureWorkspace {
    data: WorkspaceData,
    presentations: HashMap<String, Presentation>,
}

impl FixtureWorkspace {
    pub fn new(data: WorkspaceData) -> Self {
        let presentations = data
            .presentations
            .iter()
            .map(|deck| (deck.id.clone(), deck.clone()))
            .collect();
        Self {
            data,
            presentations,
        }
    }

    /// 从 TOML 文件加载
    pub async fn load(path: &Path) -> AppResult<Self> {
        Ok(Self::new(load_workspace(path).await?))
    }
}

impl SlideSource for FixtureWorkspace {
    fn open_presentation(&self, document_id: &str) -> AppResult<Presentation> {
        self.presentations.get(document_id).cloned().ok_or_else(|| {
            ExtractError::DocumentNotFound {
                document_id: document_id.to_string(),
            }
            .into()
        })
    }
}

impl ClassroomApi for FixtureWorkspace {
    fn course_work_title(&self, course_id: &str, assignment_id: &str) -> AppResult<String> {
        self.data
            .course_work
            .iter()
            .find(|entry| entry.course_id == course_id && entry.assignment_id == assignment_id)
            .map(|entry| entry.title.clone())
            .ok_or_else(|| {
                ExtractError::ClassroomLookup(format!(
                    "课程 {} 中没有作业 {}",
                    course_id, assignment_id
                ))
                .into()
            })
    }

    fn list_students(&self, course_id: &str) -> AppResult<Vec<Student>> {
        Ok(self
            .data
            .students
            .iter()
            .filter(|entry| entry.course_id == course_id)
            .map(|entry| entry.student.clone())
            .collect())
    }

    fn list_submissions(&self, course_id: &str, assignment_id: &str) -> AppResult<Vec<Submission>> {
        Ok(self
            .data
            .submissions
            .iter()
            .filter(|entry| entry.course_id == course_id && entry.assignment_id == assignment_id)
            .map(|entry| entry.submission.clone())
            .collect())
    }

    fn mime_type(&self, file_id: &str) -> AppResult<String> {
        self.data
            .drive_files
            .iter()
            .find(|file| file.id == file_id)
            .map(|file| file.mime_type.clone())
            .ok_or_else(|| ExtractError::ClassroomLookup(format!("找不到 Drive 文件 {}", file_id)).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::models::loaders::parse_workspace;

    fn workspace() -> FixtureWorkspace {
        let data = parse_workspace(
            r#"
            [[course_work]]
            course_id = "c1"
            assignment_id = "a1"
            title = "Forces"

            [[students]]
            course_id = "c1"
            id = "s1"
            name = "Ada"
            email = "ada@example.com"

            [[students]]
            course_id = "c2"
            id = "s9"
            name = "Other"
            email = "other@example.com"

            [[presentations]]
            id = "deck-1"
            "#,
            Path::new("inline.toml"),
        )
        .unwrap();
        FixtureWorkspace::new(data)
    }

    #[test]
    fn test_lookups_are_scoped_to_course() {
        let workspace = workspace();
        assert_eq!(workspace.course_work_title("c1", "a1").unwrap(), "Forces");
        assert!(workspace.course_work_title("c1", "a2").is_err());
        assert_eq!(workspace.list_students("c1").unwrap().len(), 1);
        assert!(workspace.list_submissions("c1", "a1").unwrap().is_empty());
    }

    #[test]
    fn test_unknown_presentation_is_not_found() {
        let workspace = workspace();
        assert!(workspace.open_presentation("deck-1").is_ok());
        assert!(matches!(
            workspace.open_presentation("deck-404"),
            Err(AppError::Extract(ExtractError::DocumentNotFound { .. }))
        ));
    }
}
