//! 评分引擎 - 业务能力层
//!
//! 每条学生回答（以 uid 标识）的状态流转：
//!
//! ```text
//! 待评分 ──缓存命中──────────────────────────────→ 已评分
//!    └──发送请求──→ 合法响应 ─────────────────────→ 已评分
//!                   └─非法响应/非 2xx/解析失败──→ 重试（最多 max_validation_retries 次）
//!                                                  ├─→ 已评分
//!                                                  └─→ 失败（评分保持为空）
//! ```
//!
//! uid 是把响应对应回学生回答的唯一依据。

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{AppResult, AssessmentError};
use crate::infrastructure::cache::{generate_cache_key, AssessmentCache};
use crate::infrastructure::dispatcher::{Dispatcher, HttpResponse, RequestDescriptor};
use crate::infrastructure::notifier::Notifier;
use crate::models::assessment::{assessments_from_data, normalise_keys_to_lowercase};
use crate::models::{Assessments, Assignment};
use crate::utils::logging::truncate_text;

/// 一个评分请求
#[derive(Debug, Clone, PartialEq)]
pub struct AssessmentRequest {
    pub uid: String,
    pub task_key: String,
    /// 参考答案，写缓存时作为键的一部分
    pub reference: String,
    /// 学生回答，写缓存时作为键的一部分
    pub response: String,
    pub descriptor: RequestDescriptor,
}

/// 生成请求的结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestPlan {
    pub requests: Vec<AssessmentRequest>,
    /// 命中缓存、已直接写入评分的回答数
    pub cache_hits: usize,
    /// 因为回答为空而跳过的回答数
    pub skipped_blank: usize,
}

/// 评分统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AssessmentReport {
    /// 发送到评分端点的回答数
    pub requested: usize,
    /// 由评分端点给出评分的回答数
    pub assessed: usize,
    /// 由缓存给出评分的回答数
    pub cached: usize,
    /// 重试耗尽、评分保持为空的回答
    pub failed_uids: Vec<String>,
    /// 校验失败后的重发次数
    pub retry_attempts: usize,
}

// ========== 评分响应外层结构 ==========

#[derive(Debug, Deserialize)]
struct FlowEnvelope {
    #[serde(default)]
    outputs: Vec<FlowRun>,
}

#[derive(Debug, Deserialize)]
struct FlowRun {
    #[serde(default)]
    outputs: Vec<FlowResult>,
}

#[derive(Debug, Deserialize)]
struct FlowResult {
    #[serde(default)]
    messages: Vec<FlowMessage>,
}

#[derive(Debug, Deserialize)]
struct FlowMessage {
    message: String,
}

/// 解析评分端点的响应体
///
/// 评分数据是 `outputs[0].outputs[0].messages[0].message` 中的 JSON 字符串。
/// 返回键已转为小写的评分数据，以及由它构建的评分集合。
pub fn decode_assessment_envelope(body: &[u8]) -> Result<(JsonValue, Assessments), AssessmentError> {
    let envelope: FlowEnvelope = serde_json::from_slice(body)
        .map_err(|e| AssessmentError::EnvelopeParseFailed(e.to_string()))?;

    let message = envelope
        .outputs
        .into_iter()
        .next()
        .ok_or_else(|| segment_missing("outputs[0]"))?
        .outputs
        .into_iter()
        .next()
        .ok_or_else(|| segment_missing("outputs[0].outputs[0]"))?
        .messages
        .into_iter()
        .next()
        .ok_or_else(|| segment_missing("outputs[0].outputs[0].messages[0]"))?
        .message;

    let data: JsonValue = serde_json::from_str(&message)
        .map_err(|e| AssessmentError::EnvelopeParseFailed(format!("message 不是 JSON: {}", e)))?;
    let data = normalise_keys_to_lowercase(data);
    let assessments = assessments_from_data(&data)?;
    Ok((data, assessments))
}

fn segment_missing(segment: &str) -> AssessmentError {
    AssessmentError::EnvelopeSegmentMissing {
        segment: segment.to_string(),
    }
}

/// 评分引擎
pub struct AssessmentEngine {
    config: Arc<Config>,
    dispatcher: Dispatcher,
    cache: Arc<dyn AssessmentCache>,
    notifier: Arc<Notifier>,
}

impl AssessmentEngine {
    pub fn new(
        config: Arc<Config>,
        dispatcher: Dispatcher,
        cache: Arc<dyn AssessmentCache>,
        notifier: Arc<Notifier>,
    ) -> Self {
        Self {
            config,
            dispatcher,
            cache,
            notifier,
        }
    }

    /// 预热评分服务
    ///
    /// 失败只提示，不影响后续评分。返回是否预热成功。
    pub async fn warm_up_llm(&self) -> bool {
        if self.config.langflow_url.trim().is_empty() {
            warn!("未配置 LANGFLOW_URL，跳过预热");
            return false;
        }

        let request = RequestDescriptor::post_json(
            self.config.warm_up_url(),
            json!({ "input_value": "Wake Up!" }),
        )
        .with_header("x-api-key", self.config.langflow_api_key.clone());

        match self
            .dispatcher
            .send_request_with_retries(&request, self.dispatcher.max_retries())
            .await
        {
            Ok(response) if response.is_success() => {
                self.notifier
                    .toast("AI backend warmed up and ready to go...", "Warm-Up");
                true
            }
            Ok(response) => {
                error!("预热请求返回状态码 {}", response.status);
                self.notifier.warn("Failed to warm up AI backend.", "Error");
                false
            }
            Err(e) => {
                error!("预热请求失败: {}", e);
                self.notifier.warn("Failed to warm up AI backend.", "Error");
                false
            }
        }
    }

    /// 为每条学生回答生成评分请求
    ///
    /// 缓存命中的回答直接写入评分，不生成请求；空回答跳过。
    /// 任务缺少参考内容或空白内容、或者某种任务类型缺少评分配置时返回错误，
    /// 此时作业不会被修改。
    pub fn generate_request_objects(&self, assignment: &mut Assignment) -> AppResult<RequestPlan> {
        let mut plan = RequestPlan::default();
        let mut cache_hits: Vec<(String, Assessments)> = Vec::new();

        for student_task in &assignment.student_tasks {
            for (task_key, response) in &student_task.responses {
                let Some(task) = assignment.tasks.get(task_key) else {
                    warn!("任务 {} 不存在，跳过该回答", task_key);
                    continue;
                };

                let Some(reference) = task.reference_content.as_deref() else {
                    let err = AssessmentError::MissingReferenceContent {
                        task_key: task_key.clone(),
                        assignment_id: assignment.assignment_id.clone(),
                    };
                    self.notifier.error(err.to_string(), "Task Reference Error");
                    return Err(err.into());
                };
                let Some(empty) = task.empty_content.as_deref() else {
                    let err = AssessmentError::MissingEmptyContent {
                        task_key: task_key.clone(),
                        assignment_id: assignment.assignment_id.clone(),
                    };
                    self.notifier.error(err.to_string(), "Empty Task Error");
                    return Err(err.into());
                };

                let (Some(uid), false) = (response.uid.as_deref(), response.is_blank()) else {
                    debug!(
                        "学生 {} 的任务 {} 没有作答，跳过",
                        student_task.student.name, task_key
                    );
                    plan.skipped_blank += 1;
                    continue;
                };
                let student_response = response.response.as_deref().unwrap_or_default();

                if let Some(assessments) = self.cached_assessments(reference, student_response) {
                    debug!("uid {} 命中缓存", uid);
                    cache_hits.push((uid.to_string(), assessments));
                    continue;
                }

                let endpoint = self.config.scoring_endpoint(task.task_type)?;
                debug!(
                    "uid {} 的学生回答: {}",
                    uid,
                    truncate_text(student_response, 80)
                );

                let mut tweak = json!({
                    "referenceTask": reference,
                    "emptyTask": empty,
                    "studentTask": student_response,
                });
                if let Some(notes) = task.non_blank_notes() {
                    tweak["notes"] = JsonValue::String(notes.to_string());
                }
                let mut tweaks = serde_json::Map::new();
                tweaks.insert(endpoint.tweak_id, tweak);
                let payload = json!({
                    "input_value": ".",
                    "tweaks": tweaks,
                });

                let descriptor = RequestDescriptor::post_json(endpoint.url, payload)
                    .with_uid(uid)
                    .with_header("x-api-key", self.config.langflow_api_key.clone());

                plan.requests.push(AssessmentRequest {
                    uid: uid.to_string(),
                    task_key: task_key.clone(),
                    reference: reference.to_string(),
                    response: student_response.to_string(),
                    descriptor,
                });
            }
        }

        plan.cache_hits = cache_hits.len();
        for (uid, assessments) in &cache_hits {
            assignment.assign_assessments(uid, assessments);
        }

        info!(
            "生成了 {} 个评分请求，{} 个回答命中缓存",
            plan.requests.len(),
            plan.cache_hits
        );
        Ok(plan)
    }

    /// 处理一批响应，`responses[i]` 对应 `requests[i]`
    ///
    /// 合法的评分写入对应 uid 的回答并写入缓存，其余交给 [`Self::handle_validation_failure`]。
    pub async fn process_responses(
        &self,
        responses: Vec<HttpResponse>,
        requests: &[AssessmentRequest],
        assignment: &mut Assignment,
        report: &mut AssessmentReport,
    ) {
        for (response, request) in responses.into_iter().zip(requests) {
            match self.accept_response(&response, request, assignment) {
                Ok(()) => report.assessed += 1,
                Err(e) => {
                    warn!("uid {} 的评分响应无效: {}", request.uid, e);
                    if self
                        .handle_validation_failure(request, assignment, report)
                        .await
                    {
                        report.assessed += 1;
                    }
                }
            }
        }
    }

    /// 对单个请求进行有限次数的重发
    ///
    /// 最多重发 `max_validation_retries` 次；全部失败后提示用户，该回答的评分保持为空。
    /// 返回是否最终得到了合法评分。
    pub async fn handle_validation_failure(
        &self,
        request: &AssessmentRequest,
        assignment: &mut Assignment,
        report: &mut AssessmentReport,
    ) -> bool {
        let max_attempts = self.config.max_validation_retries;

        for attempt in 1..=max_attempts {
            report.retry_attempts += 1;
            info!("🔄 重发 uid {} 的评分请求 ({}/{})", request.uid, attempt, max_attempts);

            match self
                .dispatcher
                .send_request_with_retries(&request.descriptor, self.dispatcher.max_retries())
                .await
            {
                Ok(response) => match self.accept_response(&response, request, assignment) {
                    Ok(()) => {
                        info!("✓ uid {} 重发后评分成功", request.uid);
                        return true;
                    }
                    Err(e) => warn!("uid {} 重发后响应依然无效: {}", request.uid, e),
                },
                Err(e) => warn!("uid {} 重发失败: {}", request.uid, e),
            }
        }

        self.notifier.error(
            format!("Failed to process assessment for UID: {}", request.uid),
            "Error",
        );
        report.failed_uids.push(request.uid.clone());
        false
    }

    /// 完整的评分流程：生成请求 → 预热 → 分批发送 → 处理响应
    ///
    /// 每一批的响应全部处理完后才发送下一批。
    pub async fn assess_responses(&self, assignment: &mut Assignment) -> AppResult<AssessmentReport> {
        let plan = self.generate_request_objects(assignment)?;
        let mut report = AssessmentReport {
            requested: plan.requests.len(),
            cached: plan.cache_hits,
            ..AssessmentReport::default()
        };

        if plan.requests.is_empty() {
            info!("没有需要发送的评分请求");
            return Ok(report);
        }

        self.warm_up_llm().await;

        let batch_size = self.dispatcher.batch_size();
        let total_batches = plan.requests.len().div_ceil(batch_size);
        for (index, chunk) in plan.requests.chunks(batch_size).enumerate() {
            info!("📝 评分第 {}/{} 批 ({} 个回答)", index + 1, total_batches, chunk.len());
            let descriptors: Vec<RequestDescriptor> =
                chunk.iter().map(|request| request.descriptor.clone()).collect();
            let responses = self.dispatcher.send_requests_in_batches(&descriptors).await?;
            self.process_responses(responses, chunk, assignment, &mut report)
                .await;
            self.cache.flush();
        }

        info!(
            "评分完成: 评分端点 {} 个, 缓存 {} 个, 失败 {} 个",
            report.assessed,
            report.cached,
            report.failed_uids.len()
        );
        Ok(report)
    }

    /// 校验响应，合法时写入作业和缓存
    fn accept_response(
        &self,
        response: &HttpResponse,
        request: &AssessmentRequest,
        assignment: &mut Assignment,
    ) -> Result<(), AssessmentError> {
        if !response.is_success() {
            debug!("响应内容: {}", truncate_text(&response.text(), 200));
            return Err(AssessmentError::BadStatus {
                status: response.status,
            });
        }

        let (data, assessments) = decode_assessment_envelope(&response.body)?;
        if assignment.assign_assessments(&request.uid, &assessments) {
            self.cache
                .put(&generate_cache_key(&request.reference, &request.response), data);
            debug!("已缓存 uid {} 的评分", request.uid);
        }
        Ok(())
    }

    fn cached_assessments(&self, reference: &str, response: &str) -> Option<Assessments> {
        let cached = self.cache.get(&generate_cache_key(reference, response))?;
        match assessments_from_data(&normalise_keys_to_lowercase(cached)) {
            Ok(assessments) => Some(assessments),
            Err(e) => {
                warn!("缓存中的评分数据无效，重新评分: {}", e);
                None
            }
        }
    }
}
