use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::{AppError, AppResult, ConfigError};
use crate::models::classroom::Submission;
use crate::models::slides::Presentation;
use crate::models::student::Student;

/// 课堂工作区数据
///
/// 一个 TOML 文件同时描述作业标题、名册、学生提交、Drive 文件类型和演示文稿内容。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceData {
    #[serde(default)]
    pub course_work: Vec<CourseWorkEntry>,
    #[serde(default)]
    pub students: Vec<RosterEntry>,
    #[serde(default)]
    pub submissions: Vec<SubmissionEntry>,
    #[serde(default)]
    pub drive_files: Vec<DriveFileEntry>,
    #[serde(default)]
    pub presentations: Vec<Presentation>,
}

/// 作业标题
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseWorkEntry {
    pub course_id: String,
    pub assignment_id: String,
    pub title: String,
}

/// 名册中的一名学生
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub course_id: String,
    #[serde(flatten)]
    pub student: Student,
}

/// 一条提交记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionEntry {
    pub course_id: String,
    pub assignment_id: String,
    #[serde(flatten)]
    pub submission: Submission,
}

/// Drive 文件及其 MIME 类型
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriveFileEntry {
    pub id: String,
    pub mime_type: String,
}

/// 从 TOML 文件加载工作区数据
pub async fn load_workspace(toml_file_path: &Path) -> AppResult<WorkspaceData> {
    let content = fs::read_to_string(toml_file_path)
        .await
        .map_err(|e| AppError::file(toml_file_path.display().to_string(), e))?;

    let workspace = parse_workspace(&content, toml_file_path)?;

    tracing::info!(
        "成功加载工作区 {}: {} 个作业, {} 名学生, {} 份演示文稿",
        toml_file_path.display(),
        workspace.course_work.len(),
        workspace.students.len(),
        workspace.presentations.len()
    );
    Ok(workspace)
}

/// 解析工作区 TOML 文本
pub fn parse_workspace(content: &str, source: &Path) -> AppResult<WorkspaceData> {
    toml::from_str(content).map_err(|source_err| {
        ConfigError::TomlParseFailed {
            path: source.display().to_string(),
            source: source_err,
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORKSPACE: &str = r##"
        [[course_work]]
        course_id = "c1"
        assignment_id = "a1"
        title = "Forces homework"

        [[students]]
        course_id = "c1"
        id = "s1"
        name = "Ada"
        email = "ada@example.com"

        [[submissions]]
        course_id = "c1"
        assignment_id = "a1"
        user_id = "s1"
        attachments = [{ drive_file_id = "deck-s1" }, {}]

        [[drive_files]]
        id = "deck-s1"
        mime_type = "application/vnd.google-apps.presentation"

        [[presentations]]
        id = "deck-s1"

        [[presentations.slides]]
        object_id = "p1"

        [[presentations.slides.page_elements]]
        type = "shape"
        description = "#Q1"
        text = "42"
    "##;

    #[tokio::test]
    async fn test_load_workspace_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("workspace.toml");
        std::fs::write(&path, WORKSPACE).unwrap();

        let workspace = load_workspace(&path).await.unwrap();
        assert_eq!(workspace.course_work[0].title, "Forces homework");
        assert_eq!(workspace.students[0].student.name, "Ada");
        let submission = &workspace.submissions[0].submission;
        assert_eq!(submission.drive_file_ids().collect::<Vec<_>>(), vec!["deck-s1"]);
        assert_eq!(workspace.presentations[0].slides[0].page_elements.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_file_is_file_error() {
        let result = load_workspace(Path::new("/nonexistent/workspace.toml")).await;
        assert!(matches!(result, Err(AppError::File { .. })));
    }

    #[test]
    fn test_parse_error_names_source() {
        let err = parse_workspace("course_work = 3", Path::new("bad.toml")).unwrap_err();
        assert!(err.to_string().contains("bad.toml"));
    }
}
