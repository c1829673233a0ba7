//! HTTP 派发器 - 基础设施层
//!
//! 图片导出、图片上传和评分请求共用的批量发送能力：
//! - 按批次大小切分请求，每批并发发送，批与批之间严格串行
//! - 单个请求在传输层失败时按指数退避重试
//! - HTTP 错误状态码原样返回，由调用方自行判断

use std::time::Duration;

use futures::future::join_all;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tracing::{debug, error, warn};

use crate::config::Config;
use crate::error::{ApiError, AppResult};
use crate::utils::logging::{log_batch_complete, log_batch_start};

/// 请求体
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(JsonValue),
    /// 单文件的 multipart/form-data
    Multipart {
        field: String,
        file_name: String,
        mime: String,
        bytes: Vec<u8>,
    },
}

/// 一个待发送的 HTTP 请求
///
/// 请求描述可以被多次发送（重试），所以这里只保存构造请求所需的数据。
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    /// 关联键，派发器本身不使用
    pub uid: Option<String>,
    pub url: String,
    pub method: Method,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
}

impl RequestDescriptor {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            uid: None,
            url: url.into(),
            method: Method::GET,
            headers: Vec::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn post_json(url: impl Into<String>, payload: JsonValue) -> Self {
        Self {
            uid: None,
            url: url.into(),
            method: Method::POST,
            headers: Vec::new(),
            body: RequestBody::Json(payload),
        }
    }

    pub fn post_multipart(
        url: impl Into<String>,
        field: impl Into<String>,
        file_name: impl Into<String>,
        mime: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            uid: None,
            url: url.into(),
            method: Method::POST,
            headers: Vec::new(),
            body: RequestBody::Multipart {
                field: field.into(),
                file_name: file_name.into(),
                mime: mime.into(),
                bytes,
            },
        }
    }

    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = Some(uid.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn bearer_auth(self, token: &str) -> Self {
        self.with_header("Authorization", format!("Bearer {}", token))
    }
}

/// 收到的 HTTP 响应
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// 200 或 201
    pub fn is_success(&self) -> bool {
        matches!(self.status, 200 | 201)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// HTTP 派发器
#[derive(Clone, Debug)]
pub struct Dispatcher {
    client: Client,
    batch_size: usize,
    max_retries: usize,
    base_delay: Duration,
}

impl Dispatcher {
    /// 使用配置中的批次大小和重试策略创建派发器
    pub fn new(config: &Config) -> Self {
        Self::with_settings(
            config.batch_size,
            config.max_retries,
            Duration::from_millis(config.retry_base_delay_ms),
        )
    }

    pub fn with_settings(batch_size: usize, max_retries: usize, base_delay: Duration) -> Self {
        Self {
            client: Client::new(),
            batch_size: batch_size.max(1),
            max_retries,
            base_delay,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    /// 分批发送请求
    ///
    /// 返回的响应与输入一一对应（`responses[i]` 对应 `requests[i]`）。
    /// 任意请求在重试耗尽后仍然传输失败时，整个调用返回错误。
    pub async fn send_requests_in_batches(
        &self,
        requests: &[RequestDescriptor],
    ) -> AppResult<Vec<HttpResponse>> {
        let total = requests.len();
        let total_batches = total.div_ceil(self.batch_size);
        let mut responses = Vec::with_capacity(total);

        for (index, chunk) in requests.chunks(self.batch_size).enumerate() {
            let batch_num = index + 1;
            let start = index * self.batch_size;
            log_batch_start(batch_num, total_batches, start + 1, start + chunk.len(), total);

            let results = join_all(
                chunk
                    .iter()
                    .map(|request| self.send_request_with_retries(request, self.max_retries)),
            )
            .await;

            for result in results {
                responses.push(result?);
            }
            log_batch_complete(batch_num, chunk.len(), chunk.len());
        }

        Ok(responses)
    }

    /// 发送单个请求，传输层失败时指数退避重试
    ///
    /// 最多尝试 `max_retries + 1` 次，第 n 次失败后等待 `base_delay * 2^n`。
    /// 只要收到了响应（无论状态码）就直接返回。
    pub async fn send_request_with_retries(
        &self,
        request: &RequestDescriptor,
        max_retries: usize,
    ) -> AppResult<HttpResponse> {
        let attempts = max_retries + 1;
        let mut last_error = String::new();

        for attempt in 0..attempts {
            match self.send_once(request).await {
                Ok(response) => {
                    if !response.is_success() {
                        debug!("请求 {} 返回状态码 {}", request.url, response.status);
                    }
                    return Ok(response);
                }
                Err(e) => {
                    warn!(
                        "请求 {} 失败: {} (第 {}/{} 次尝试)",
                        request.url,
                        e,
                        attempt + 1,
                        attempts
                    );
                    last_error = e.to_string();
                }
            }

            if attempt + 1 < attempts {
                let delay = self.base_delay * 2u32.saturating_pow(attempt as u32);
                debug!("等待 {:?} 后重试", delay);
                tokio::time::sleep(delay).await;
            }
        }

        error!("❌ 请求 {} 的 {} 次尝试全部失败", request.url, attempts);
        Err(ApiError::RetriesExhausted {
            url: request.url.clone(),
            attempts,
            message: last_error,
        }
        .into())
    }

    async fn send_once(&self, request: &RequestDescriptor) -> Result<HttpResponse, ApiError> {
        let mut builder = self.client.request(request.method.clone(), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(payload) => builder.json(payload),
            RequestBody::Multipart {
                field,
                file_name,
                mime,
                bytes,
            } => {
                // Form 不能复用，每次尝试重新构造
                let part = Part::bytes(bytes.clone())
                    .file_name(file_name.clone())
                    .mime_str(mime)
                    .map_err(|e| ApiError::InvalidRequest {
                        url: request.url.clone(),
                        message: e.to_string(),
                    })?;
                builder.multipart(Form::new().part(field.clone(), part))
            }
        };

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();
        Ok(HttpResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fast_dispatcher(batch_size: usize) -> Dispatcher {
        Dispatcher::with_settings(batch_size, 2, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_batches_preserve_input_order() {
        let mut server = mockito::Server::new_async().await;
        let mut mocks = Vec::new();
        for i in 0..5 {
            mocks.push(
                server
                    .mock("GET", format!("/item/{}", i).as_str())
                    .with_status(200)
                    .with_body(format!("body-{}", i))
                    .create_async()
                    .await,
            );
        }

        let requests: Vec<_> = (0..5)
            .map(|i| RequestDescriptor::get(format!("{}/item/{}", server.url(), i)))
            .collect();
        let responses = fast_dispatcher(2)
            .send_requests_in_batches(&requests)
            .await
            .unwrap();

        assert_eq!(responses.len(), 5);
        for (i, response) in responses.iter().enumerate() {
            assert_eq!(response.text(), format!("body-{}", i));
        }
        for mock in mocks {
            mock.assert_async().await;
        }
    }

    #[tokio::test]
    async fn test_http_error_status_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/score")
            .with_status(500)
            .with_body("boom")
            .expect(1)
            .create_async()
            .await;

        let request = RequestDescriptor::post_json(format!("{}/score", server.url()), json!({}));
        let response = fast_dispatcher(1)
            .send_request_with_retries(&request, 3)
            .await
            .unwrap();

        assert_eq!(response.status, 500);
        assert!(!response.is_success());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_transport_failure_exhausts_retries() {
        let request = RequestDescriptor::get("http://127.0.0.1:1/unreachable");
        let err = fast_dispatcher(1)
            .send_request_with_retries(&request, 2)
            .await
            .unwrap_err();

        match err {
            crate::error::AppError::Api(ApiError::RetriesExhausted { attempts, .. }) => {
                assert_eq!(attempts, 3)
            }
            other => panic!("意外的错误: {}", other),
        }
    }

    #[tokio::test]
    async fn test_batch_fails_when_any_request_exhausts_retries() {
        let mut server = mockito::Server::new_async().await;
        let _ok = server
            .mock("GET", "/ok")
            .with_status(200)
            .create_async()
            .await;

        let requests = vec![
            RequestDescriptor::get(format!("{}/ok", server.url())),
            RequestDescriptor::get("http://127.0.0.1:1/unreachable"),
        ];
        let result = fast_dispatcher(2).send_requests_in_batches(&requests).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_multipart_and_headers_are_sent() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/upload")
            .match_header("x-api-key", "secret")
            .match_header(
                "content-type",
                mockito::Matcher::Regex("multipart/form-data".to_string()),
            )
            .match_body(mockito::Matcher::Regex(
                r#"name="file"; filename="uploaded_image.png""#.to_string(),
            ))
            .with_status(201)
            .with_body(r#"{"file_path":"https://img/1.png"}"#)
            .create_async()
            .await;

        let request = RequestDescriptor::post_multipart(
            format!("{}/upload", server.url()),
            "file",
            "uploaded_image.png",
            "image/png",
            b"fake-png".to_vec(),
        )
        .with_header("x-api-key", "secret");

        let response = fast_dispatcher(1)
            .send_request_with_retries(&request, 0)
            .await
            .unwrap();
        let body: JsonValue = response.json().unwrap();
        assert_eq!(body["file_path"], "https://img/1.png");
        mock.assert_async().await;
    }
}
