//! 图片处理 - 业务能力层
//!
//! 把图片任务和学生的图片回答从需要授权的幻灯片导出地址替换为图片服务上的持久地址：
//! 收集地址 → 分波次下载 → 分批上传 → 回写到作业。
//!
//! 任何一张图片下载或上传失败都只记录警告，原地址保持不变。

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::infrastructure::dispatcher::{Dispatcher, RequestDescriptor};
use crate::models::{Assignment, TaskType};
use crate::utils::hash::generate_hash;

const UPLOAD_FIELD: &str = "file";
const UPLOAD_FILE_NAME: &str = "uploaded_image.png";
const UPLOAD_MIME: &str = "image/png";

/// 一张待处理的幻灯片图片
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlideUrlMapping {
    /// 图片所在的文档，用于限制对同一文档的并发导出
    pub document_id: String,
    pub slide_url: String,
    pub uid: String,
}

/// 下载得到的图片
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBlob {
    pub uid: String,
    pub bytes: Vec<u8>,
}

/// uid → 持久地址
pub type UrlMappings = HashMap<String, String>;

/// 图片处理统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImageReport {
    pub collected: usize,
    pub fetched: usize,
    pub uploaded: usize,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    file_path: String,
}

/// 参考图片的 uid
pub fn reference_uid(task_key: &str) -> String {
    format!("{}-reference", task_key)
}

/// 空白模板图片的 uid
pub fn empty_uid(task_key: &str) -> String {
    format!("{}-empty", task_key)
}

/// 图片处理服务
pub struct ImagePipeline {
    config: Arc<Config>,
    dispatcher: Dispatcher,
}

impl ImagePipeline {
    pub fn new(config: Arc<Config>, dispatcher: Dispatcher) -> Self {
        Self { config, dispatcher }
    }

    /// 收集作业中所有需要处理的幻灯片图片地址
    pub fn collect_all_slide_urls(&self, assignment: &Assignment) -> Vec<SlideUrlMapping> {
        let mut mappings = Vec::new();

        for task in assignment.tasks.values() {
            if task.task_type != TaskType::Image {
                continue;
            }
            let sources = [
                (
                    reference_uid(&task.key),
                    &assignment.reference_document_id,
                    task.reference_content.as_deref(),
                ),
                (
                    empty_uid(&task.key),
                    &assignment.empty_document_id,
                    task.empty_content.as_deref(),
                ),
            ];
            for (uid, document_id, url) in sources {
                if let Some(url) = url.filter(|url| !url.is_empty()) {
                    mappings.push(SlideUrlMapping {
                        document_id: document_id.clone(),
                        slide_url: url.to_string(),
                        uid,
                    });
                }
            }
        }

        for student_task in &assignment.student_tasks {
            let Some(document_id) = student_task.document_id.as_deref() else {
                continue;
            };
            for (task_key, response) in &student_task.responses {
                let is_image = assignment
                    .tasks
                    .get(task_key)
                    .map_or(false, |task| task.task_type == TaskType::Image);
                if !is_image {
                    continue;
                }
                if let (Some(uid), Some(url)) = (&response.uid, &response.response) {
                    mappings.push(SlideUrlMapping {
                        document_id: document_id.to_string(),
                        slide_url: url.clone(),
                        uid: uid.clone(),
                    });
                }
            }
        }

        mappings
    }

    /// 分波次下载图片
    ///
    /// 每一波中同一个文档最多只有一个请求，直到所有地址都发送完。
    /// 非 200 的响应记录警告，对应 uid 不出现在结果中。
    pub async fn batch_fetch_images(&self, slide_urls: &[SlideUrlMapping]) -> AppResult<Vec<ImageBlob>> {
        let waves = round_robin_waves(slide_urls);
        let mut blobs = Vec::with_capacity(slide_urls.len());

        for (index, wave) in waves.iter().enumerate() {
            info!("🖼️ 下载第 {}/{} 波图片 ({} 张)", index + 1, waves.len(), wave.len());
            let requests: Vec<RequestDescriptor> = wave
                .iter()
                .map(|mapping| {
                    RequestDescriptor::get(mapping.slide_url.clone())
                        .with_uid(mapping.uid.clone())
                        .bearer_auth(&self.config.google_access_token)
                })
                .collect();

            let responses = self.dispatcher.send_requests_in_batches(&requests).await?;
            for (mapping, response) in wave.iter().zip(responses) {
                if response.status == 200 {
                    blobs.push(ImageBlob {
                        uid: mapping.uid.clone(),
                        bytes: response.body,
                    });
                } else {
                    warn!(
                        "⚠️ 下载图片失败 {} (状态码 {})",
                        mapping.slide_url, response.status
                    );
                }
            }
        }

        Ok(blobs)
    }

    /// 分批上传图片，返回 uid → 持久地址
    ///
    /// 上传失败或响应无法解析的图片不出现在结果中。
    pub async fn batch_upload_images(&self, image_blobs: &[ImageBlob]) -> AppResult<UrlMappings> {
        if image_blobs.is_empty() {
            return Ok(UrlMappings::new());
        }
        if self.config.image_upload_url.trim().is_empty() {
            return Err(AppError::missing_config("IMAGE_UPLOAD_URL"));
        }

        let requests: Vec<RequestDescriptor> = image_blobs
            .iter()
            .map(|blob| {
                RequestDescriptor::post_multipart(
                    self.config.image_upload_url.clone(),
                    UPLOAD_FIELD,
                    UPLOAD_FILE_NAME,
                    UPLOAD_MIME,
                    blob.bytes.clone(),
                )
                .with_uid(blob.uid.clone())
                .with_header("accept", "application/json")
                .with_header("x-api-key", self.config.image_uploader_api_key.clone())
            })
            .collect();

        let responses = self.dispatcher.send_requests_in_batches(&requests).await?;
        let mut mappings = UrlMappings::new();
        for (blob, response) in image_blobs.iter().zip(responses) {
            if !response.is_success() {
                warn!("⚠️ 上传图片 {} 失败 (状态码 {})", blob.uid, response.status);
                continue;
            }
            match response.json::<UploadResponse>() {
                Ok(uploaded) => {
                    mappings.insert(blob.uid.clone(), uploaded.file_path);
                }
                Err(e) => warn!("⚠️ 图片服务对 {} 的响应无法解析: {}", blob.uid, e),
            }
        }
        Ok(mappings)
    }

    /// 把持久地址回写到任务和学生回答
    ///
    /// 没有映射的图片保留原地址并记录警告。
    pub fn update_assignment_with_image_urls(&self, assignment: &mut Assignment, url_mappings: &UrlMappings) {
        for task in assignment.tasks.values_mut() {
            if task.task_type != TaskType::Image {
                continue;
            }
            for (uid, content) in [
                (reference_uid(&task.key), &mut task.reference_content),
                (empty_uid(&task.key), &mut task.empty_content),
            ] {
                if content.as_deref().map_or(true, str::is_empty) {
                    continue;
                }
                match url_mappings.get(&uid) {
                    Some(url) => *content = Some(url.clone()),
                    None => warn!("⚠️ 图片 {} 没有上传地址，保留原地址", uid),
                }
            }
        }

        for student_task in &mut assignment.student_tasks {
            for (task_key, response) in student_task.responses.iter_mut() {
                let is_image = assignment
                    .tasks
                    .get(task_key)
                    .map_or(false, |task| task.task_type == TaskType::Image);
                let Some(uid) = response.uid.as_deref().filter(|_| is_image) else {
                    continue;
                };
                match url_mappings.get(uid) {
                    Some(url) => {
                        response.response = Some(url.clone());
                        response.content_hash = Some(generate_hash(url));
                    }
                    None => warn!(
                        "⚠️ 学生 {} 的任务 {} 没有上传地址，保留原地址",
                        student_task.student.name, task_key
                    ),
                }
            }
        }
    }

    /// 完整的图片处理流程
    pub async fn process_images(&self, assignment: &mut Assignment) -> AppResult<ImageReport> {
        let slide_urls = self.collect_all_slide_urls(assignment);
        info!("收集到 {} 个幻灯片图片地址", slide_urls.len());
        if slide_urls.is_empty() {
            return Ok(ImageReport::default());
        }

        let blobs = self.batch_fetch_images(&slide_urls).await?;
        info!("下载了 {} 张图片", blobs.len());

        let url_mappings = self.batch_upload_images(&blobs).await?;
        info!("上传了 {} 张图片", url_mappings.len());

        self.update_assignment_with_image_urls(assignment, &url_mappings);
        Ok(ImageReport {
            collected: slide_urls.len(),
            fetched: blobs.len(),
            uploaded: url_mappings.len(),
        })
    }
}

/// 按文档轮转分波：每一波从每个文档各取一个地址
fn round_robin_waves(slide_urls: &[SlideUrlMapping]) -> Vec<Vec<SlideUrlMapping>> {
    let mut queues: Vec<(String, VecDeque<SlideUrlMapping>)> = Vec::new();
    for mapping in slide_urls {
        match queues
            .iter_mut()
            .find(|(document_id, _)| *document_id == mapping.document_id)
        {
            Some((_, queue)) => queue.push_back(mapping.clone()),
            None => queues.push((
                mapping.document_id.clone(),
                VecDeque::from([mapping.clone()]),
            )),
        }
    }

    let mut waves = Vec::new();
    loop {
        let wave: Vec<SlideUrlMapping> = queues
            .iter_mut()
            .filter_map(|(_, queue)| queue.pop_front())
            .collect();
        if wave.is_empty() {
            break;
        }
        waves.push(wave);
    }
    waves
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;
    use crate::models::{ContentType, Student, Task, TaskResponse};
    use std::time::Duration;

    fn mapping(document_id: &str, uid: &str) -> SlideUrlMapping {
        SlideUrlMapping {
            document_id: document_id.to_string(),
            slide_url: format!("https://slides/{}/{}", document_id, uid),
            uid: uid.to_string(),
        }
    }

    fn pipeline(config: Config) -> ImagePipeline {
        let dispatcher = Dispatcher::with_settings(config.batch_size, 0, Duration::from_millis(1));
        ImagePipeline::new(Arc::new(config), dispatcher)
    }

    fn image_assignment() -> Assignment {
        let mut assignment = Assignment::new("c1", "a1", "ref-doc", "empty-doc");
        let mut task = Task::from_extracted(
            "Q3",
            TaskType::Image,
            "p3",
            "https://export/ref".to_string(),
            ContentType::Reference,
        );
        task.empty_content = Some("https://export/empty".to_string());
        assignment.tasks.insert("Q3".to_string(), task);
        assignment.tasks.insert(
            "Q1".to_string(),
            Task::from_extracted("Q1", TaskType::Text, "p1", "42".into(), ContentType::Reference),
        );

        assignment.add_student(Student::new("s1", "Ada", "ada@example.com"));
        let student_task = assignment.student_task_mut("s1").unwrap();
        student_task.document_id = Some("student-doc".to_string());
        student_task.add_response(
            "Q3",
            TaskResponse {
                uid: Some("uid-img".to_string()),
                slide_id: Some("p3".to_string()),
                response: Some("https://export/student".to_string()),
                ..TaskResponse::absent()
            },
        );
        student_task.add_response(
            "Q1",
            TaskResponse {
                uid: Some("uid-text".to_string()),
                response: Some("42".to_string()),
                ..TaskResponse::absent()
            },
        );
        assignment
    }

    #[test]
    fn test_waves_never_repeat_a_document() {
        let urls = vec![
            mapping("d1", "a"),
            mapping("d1", "b"),
            mapping("d2", "c"),
            mapping("d1", "d"),
            mapping("d3", "e"),
        ];
        let waves = round_robin_waves(&urls);

        let uids: Vec<Vec<&str>> = waves
            .iter()
            .map(|wave| wave.iter().map(|m| m.uid.as_str()).collect())
            .collect();
        assert_eq!(uids, vec![vec!["a", "c", "e"], vec!["b"], vec!["d"]]);
    }

    #[test]
    fn test_collect_only_image_content() {
        let pipeline = pipeline(Config::default());
        let urls = pipeline.collect_all_slide_urls(&image_assignment());

        let uids: Vec<&str> = urls.iter().map(|m| m.uid.as_str()).collect();
        assert_eq!(uids, vec!["Q3-reference", "Q3-empty", "uid-img"]);
        assert_eq!(urls[0].document_id, "ref-doc");
        assert_eq!(urls[1].document_id, "empty-doc");
        assert_eq!(urls[2].document_id, "student-doc");
    }

    #[test]
    fn test_update_rewrites_mapped_and_keeps_missing() {
        let pipeline = pipeline(Config::default());
        let mut assignment = image_assignment();
        let mut mappings = UrlMappings::new();
        mappings.insert("Q3-reference".to_string(), "https://img/ref.png".to_string());
        mappings.insert("uid-img".to_string(), "https://img/student.png".to_string());

        pipeline.update_assignment_with_image_urls(&mut assignment, &mappings);

        let task = &assignment.tasks["Q3"];
        assert_eq!(task.reference_content.as_deref(), Some("https://img/ref.png"));
        assert_eq!(task.empty_content.as_deref(), Some("https://export/empty"));
        let response = assignment.student_tasks[0].response("Q3").unwrap();
        assert_eq!(response.response.as_deref(), Some("https://img/student.png"));
        assert!(response.content_hash.is_some());
        let text = assignment.student_tasks[0].response("Q1").unwrap();
        assert_eq!(text.response.as_deref(), Some("42"));
    }

    fn blob(uid: &str) -> ImageBlob {
        ImageBlob {
            uid: uid.to_string(),
            bytes: b"fake-png".to_vec(),
        }
    }

    #[tokio::test]
    async fn test_upload_without_url_is_fatal() {
        let pipeline = pipeline(Config::default());

        let err = pipeline.batch_upload_images(&[blob("uid-img")]).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Config(ConfigError::Missing { ref key }) if key == "IMAGE_UPLOAD_URL"
        ));

        // 没有图片时不需要上传地址
        let mappings = pipeline.batch_upload_images(&[]).await.unwrap();
        assert!(mappings.is_empty());
    }

    #[tokio::test]
    async fn test_failed_uploads_keep_original_urls() {
        let mut server = mockito::Server::new_async().await;
        let _rejected = server
            .mock("POST", "/upload")
            .match_header("x-api-key", "bad-status")
            .with_status(500)
            .create_async()
            .await;
        let _garbled = server
            .mock("POST", "/upload")
            .match_header("x-api-key", "bad-body")
            .with_status(201)
            .with_body("<html>oops</html>")
            .create_async()
            .await;

        let mut assignment = image_assignment();
        for api_key in ["bad-status", "bad-body"] {
            let pipeline = pipeline(Config {
                image_upload_url: format!("{}/upload", server.url()),
                image_uploader_api_key: api_key.to_string(),
                ..Config::default()
            });
            let mappings = pipeline
                .batch_upload_images(&[blob("Q3-reference"), blob("uid-img")])
                .await
                .unwrap();
            assert!(mappings.is_empty(), "{} should not yield mappings", api_key);

            pipeline.update_assignment_with_image_urls(&mut assignment, &mappings);
        }

        assert_eq!(
            assignment.tasks["Q3"].reference_content.as_deref(),
            Some("https://export/ref")
        );
        let response = assignment.student_tasks[0].response("Q3").unwrap();
        assert_eq!(response.response.as_deref(), Some("https://export/student"));
        assert!(response.content_hash.is_none());
    }

    #[tokio::test]
    async fn test_process_images_end_to_end() {
        let mut server = mockito::Server::new_async().await;
        let export = server
            .mock("GET", mockito::Matcher::Regex("^/export/(ref|student)$".to_string()))
            .match_header("authorization", "Bearer token-1")
            .with_status(200)
            .with_body("png-bytes")
            .expect(2)
            .create_async()
            .await;
        let _missing = server
            .mock("GET", "/export/empty")
            .with_status(404)
            .create_async()
            .await;
        let upload = server
            .mock("POST", "/upload")
            .match_header("x-api-key", "upload-key")
            .with_status(200)
            .with_body(r#"{"file_path":"https://img/stored.png"}"#)
            .expect(2)
            .create_async()
            .await;

        let mut assignment = image_assignment();
        let task = assignment.tasks.get_mut("Q3").unwrap();
        task.reference_content = Some(format!("{}/export/ref", server.url()));
        task.empty_content = Some(format!("{}/export/empty", server.url()));
        assignment.student_tasks[0].responses.get_mut("Q3").unwrap().response =
            Some(format!("{}/export/student", server.url()));

        let pipeline = pipeline(Config {
            google_access_token: "token-1".to_string(),
            image_upload_url: format!("{}/upload", server.url()),
            image_uploader_api_key: "upload-key".to_string(),
            ..Config::default()
        });
        let report = pipeline.process_images(&mut assignment).await.unwrap();

        assert_eq!(
            report,
            ImageReport {
                collected: 3,
                fetched: 2,
                uploaded: 2
            }
        );
        let task = &assignment.tasks["Q3"];
        assert_eq!(task.reference_content.as_deref(), Some("https://img/stored.png"));
        assert!(task.empty_content.as_deref().unwrap().ends_with("/export/empty"));
        export.assert_async().await;
        upload.assert_async().await;
    }
}
