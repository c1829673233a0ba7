//! 评分运行 - 编排层
//!
//! ## 职责
//!
//! 1. **应用初始化**：校验配置、初始化日志文件、加载工作区和缓存
//! 2. **运行锁**：同一份参考文档同时只允许一次运行，获取失败时不修改任何状态
//! 3. **步骤调度**：按顺序调用 [`AssignmentFlow`] 的每一步并更新进度
//! 4. **结果输出**：把评分后的作业写成 JSON，交给下游表格生成
//! 5. **全局统计**：汇总本次运行的结果和全部提示

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{error, info};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::infrastructure::{
    AssessmentCache, Dispatcher, FileCache, FixtureWorkspace, Notice, Notifier, RunLock,
};
use crate::models::Assignment;
use crate::services::{
    AssessmentEngine, AssessmentReport, ClassroomApi, ContentExtractor, ImagePipeline, ImageReport,
    SlideSource,
};
use crate::utils::logging::{init_log_file, log_startup, print_final_stats};
use crate::workflow::{AssignmentFlow, ProgressStatus, ProgressTracker};

/// 一次运行的参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub course_id: String,
    pub assignment_id: String,
    pub reference_document_id: String,
    pub empty_document_id: String,
}

impl RunRequest {
    /// 从环境变量读取运行参数
    pub fn from_env() -> AppResult<Self> {
        Ok(Self {
            course_id: required_env("COURSE_ID")?,
            assignment_id: required_env("ASSIGNMENT_ID")?,
            reference_document_id: required_env("REFERENCE_DOCUMENT_ID")?,
            empty_document_id: required_env("EMPTY_DOCUMENT_ID")?,
        })
    }
}

fn required_env(key: &str) -> AppResult<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| AppError::missing_config(key))
}

/// 运行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunStatus {
    Completed,
    Failed,
}

/// 运行结果
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub status: RunStatus,
    pub assignment_name: String,
    pub students: usize,
    pub submissions: usize,
    pub tasks: usize,
    pub images: ImageReport,
    pub assessment: AssessmentReport,
    /// 评分结果文件
    pub output_file: Option<PathBuf>,
    pub error: Option<String>,
    pub progress: ProgressStatus,
    pub notices: Vec<Notice>,
}

/// 应用主结构
pub struct App {
    config: Arc<Config>,
    classroom: Arc<dyn ClassroomApi>,
    slides: Arc<dyn SlideSource>,
    cache: Arc<dyn AssessmentCache>,
}

impl App {
    /// 初始化应用
    ///
    /// 工作区从 `workspace_file` 加载，缓存使用 `cache_file`。
    pub async fn initialize(config: Config) -> AppResult<Self> {
        config.validate()?;
        init_log_file(&config.output_log_file)?;

        let workspace = Arc::new(FixtureWorkspace::load(Path::new(&config.workspace_file)).await?);
        let cache = Arc::new(FileCache::open(
            &config.cache_file,
            Duration::from_secs(config.cache_ttl_secs),
        )?);

        Ok(Self::with_collaborators(
            config,
            workspace.clone(),
            workspace,
            cache,
        ))
    }

    /// 使用指定的协作方创建应用
    pub fn with_collaborators(
        config: Config,
        classroom: Arc<dyn ClassroomApi>,
        slides: Arc<dyn SlideSource>,
        cache: Arc<dyn AssessmentCache>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            classroom,
            slides,
            cache,
        }
    }

    /// 执行一次评分运行
    ///
    /// 获取运行锁失败时直接返回错误；之后的任何错误都记录在结果中，状态为 `Failed`。
    pub async fn run(&self, request: &RunRequest) -> AppResult<RunSummary> {
        let notifier = Arc::new(Notifier::with_path(&self.config.notices_file));

        let _lock = match RunLock::acquire(
            Path::new(&self.config.lock_dir),
            &request.reference_document_id,
            Duration::from_millis(self.config.lock_wait_ms),
            Duration::from_secs(self.config.lock_stale_secs),
        )
        .await
        {
            Ok(lock) => lock,
            Err(e) => {
                notifier.error(
                    "Another assessment run is already in progress. Please try again shortly.",
                    "Assessment Locked",
                );
                return Err(e);
            }
        };

        log_startup(&request.assignment_id, self.config.batch_size);
        let flow = self.build_flow(notifier.clone());
        let mut progress = ProgressTracker::new();
        let mut assignment = Assignment::new(
            request.course_id.clone(),
            request.assignment_id.clone(),
            request.reference_document_id.clone(),
            request.empty_document_id.clone(),
        );

        progress.start();
        let outcome = self
            .run_steps(&flow, &mut assignment, &mut progress)
            .await;

        let mut summary = RunSummary {
            status: RunStatus::Completed,
            assignment_name: assignment.assignment_name.clone(),
            students: assignment.student_tasks.len(),
            submissions: assignment
                .student_tasks
                .iter()
                .filter(|student_task| student_task.document_id.is_some())
                .count(),
            tasks: assignment.tasks.len(),
            images: ImageReport::default(),
            assessment: AssessmentReport::default(),
            output_file: None,
            error: None,
            progress: progress.status().clone(),
            notices: Vec::new(),
        };

        match outcome {
            Ok((images, assessment, output_file)) => {
                summary.images = images;
                summary.assessment = assessment;
                summary.output_file = Some(output_file);
                progress.update(None, "Assessment run completed successfully.");
                progress.complete();
            }
            Err(e) => {
                error!("❌ 评分运行失败: {}", e);
                progress.log_error(e.to_string());
                notifier.error(e.to_string(), "Error");
                summary.status = RunStatus::Failed;
                summary.error = Some(e.to_string());
            }
        }

        summary.progress = progress.status().clone();
        summary.notices = notifier.notices();
        print_final_stats(
            summary.assessment.assessed + summary.assessment.cached,
            summary.assessment.failed_uids.len(),
            summary.students,
            &self.config.output_log_file,
        );
        Ok(summary)
    }

    async fn run_steps(
        &self,
        flow: &AssignmentFlow,
        assignment: &mut Assignment,
        progress: &mut ProgressTracker,
    ) -> AppResult<(ImageReport, AssessmentReport, PathBuf)> {
        progress.next_step("Assessment run starting.");
        progress.next_step(format!("Course ID retrieved: {}", assignment.course_id));

        progress.next_step("Fetching all students.");
        let students = flow.fetch_students(&assignment.course_id);
        progress.update(None, format!("{} students fetched.", students.len()));

        progress.next_step("Adding students to the assignment.");
        for student in students {
            assignment.add_student(student);
        }

        progress.next_step("Getting the tasks from the reference slides.");
        flow.populate_tasks_from_slides(assignment)?;
        progress.update(None, "Tasks populated from reference slides.");

        progress.next_step("Fetching submitted slides from students.");
        flow.fetch_submitted_slides(assignment)?;

        progress.next_step("Extracting student work from slides.");
        flow.process_all_submissions(assignment);

        progress.next_step("Processing Images");
        let images = flow.process_images(assignment).await?;
        progress.update(None, "Images uploaded.");

        progress.next_step("Assessing student responses");
        let assessment = flow.assess_responses(assignment).await?;
        progress.update(None, "Responses assessed.");

        progress.next_step("Writing assessment results.");
        let output_file = self.write_results(assignment).await?;

        Ok((images, assessment, output_file))
    }

    fn build_flow(&self, notifier: Arc<Notifier>) -> AssignmentFlow {
        let dispatcher = Dispatcher::new(&self.config);
        AssignmentFlow::new(
            self.classroom.clone(),
            ContentExtractor::new(self.slides.clone()),
            ImagePipeline::new(self.config.clone(), dispatcher.clone()),
            AssessmentEngine::new(
                self.config.clone(),
                dispatcher,
                self.cache.clone(),
                notifier,
            ),
        )
    }

    /// 把评分后的作业写成 `<assignment_id>.assessment.json`
    async fn write_results(&self, assignment: &Assignment) -> AppResult<PathBuf> {
        let dir = Path::new(&self.config.output_dir);
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| AppError::file(dir.display().to_string(), e))?;

        let path = dir.join(format!("{}.assessment.json", assignment.assignment_id));
        let content = serde_json::to_string_pretty(assignment)?;
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| AppError::file(path.display().to_string(), e))?;
        info!("💾 评分结果已保存至: {}", path.display());
        Ok(path)
    }
}
