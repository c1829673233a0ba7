use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 配置错误（致命，终止本次运行）
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// HTTP 调用错误
    #[error("API错误: {0}")]
    Api(#[from] ApiError),
    /// 幻灯片内容提取错误
    #[error("提取错误: {0}")]
    Extract(#[from] ExtractError),
    /// 评分流程错误
    #[error("评分错误: {0}")]
    Assessment(#[from] AssessmentError),
    /// 运行锁错误
    #[error("运行锁错误: {0}")]
    Lock(#[from] LockError),
    /// 文件操作错误
    #[error("文件错误 ({path}): {source}")]
    File {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 其他错误（用于包装第三方库错误）
    #[error("错误: {0}")]
    Other(String),
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    /// 必填配置缺失
    #[error("缺少必填配置: {key}")]
    Missing { key: String },
    /// 配置值不合法
    #[error("配置 {key} 的值不合法: {reason}")]
    Invalid { key: String, reason: String },
    /// 某种任务类型缺少评分端点或 tweak id
    #[error("任务类型 {task_type} 缺少评分配置: {key}")]
    MissingScoringEndpoint { task_type: String, key: String },
    /// TOML 解析失败
    #[error("TOML解析失败 ({path}): {source}")]
    TomlParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// HTTP 调用错误
#[derive(Debug, Error)]
pub enum ApiError {
    /// 传输层失败且重试耗尽
    #[error("请求 {url} 在 {attempts} 次尝试后仍然失败: {message}")]
    RetriesExhausted {
        url: String,
        attempts: usize,
        message: String,
    },
    /// 构造请求失败
    #[error("无法构造请求 ({url}): {message}")]
    InvalidRequest { url: String, message: String },
    /// JSON 解析失败
    #[error("JSON解析失败: {0}")]
    JsonParseFailed(#[from] serde_json::Error),
    /// HTTP 客户端错误
    #[error("HTTP客户端错误: {0}")]
    Client(#[from] reqwest::Error),
}

/// 幻灯片内容提取错误
#[derive(Debug, Error)]
pub enum ExtractError {
    /// 文档不存在
    #[error("找不到演示文稿: {document_id}")]
    DocumentNotFound { document_id: String },
    /// 课堂数据查询失败
    #[error("课堂数据查询失败: {0}")]
    ClassroomLookup(String),
}

/// 评分流程错误
#[derive(Debug, Error)]
pub enum AssessmentError {
    /// 任务缺少参考答案
    #[error("任务 {task_key} 缺少参考内容 (作业: {assignment_id})")]
    MissingReferenceContent {
        task_key: String,
        assignment_id: String,
    },
    /// 任务缺少空白模板内容
    #[error("任务 {task_key} 缺少空白模板内容 (作业: {assignment_id})")]
    MissingEmptyContent {
        task_key: String,
        assignment_id: String,
    },
    /// 评分响应外层信封缺少字段
    #[error("评分响应缺少字段: {segment}")]
    EnvelopeSegmentMissing { segment: String },
    /// 评分响应 JSON 无法解析
    #[error("评分响应无法解析: {0}")]
    EnvelopeParseFailed(String),
    /// 评分数据结构不合法
    #[error("评分数据结构不合法: {0}")]
    InvalidAssessmentData(String),
    /// 非 2xx 状态码
    #[error("评分端点返回状态码 {status}")]
    BadStatus { status: u16 },
}

/// 运行锁错误
#[derive(Debug, Error)]
pub enum LockError {
    /// 已有评分任务在运行
    #[error("文档 {document_id} 的评分任务正在运行，等待 {waited_ms}ms 后仍无法获取锁")]
    Contended { document_id: String, waited_ms: u64 },
    /// 锁文件操作失败
    #[error("锁文件操作失败 ({path}): {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

// ========== 从常见错误类型转换 ==========

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Api(ApiError::JsonParseFailed(err))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Api(ApiError::Client(err))
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        AppError::Config(ConfigError::TomlParseFailed {
            path: String::new(),
            source: err,
        })
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::File {
            path: String::new(),
            source: err,
        }
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建带路径的文件错误
    pub fn file(path: impl Into<String>, source: std::io::Error) -> Self {
        AppError::File {
            path: path.into(),
            source,
        }
    }

    /// 创建缺失配置错误
    pub fn missing_config(key: impl Into<String>) -> Self {
        AppError::Config(ConfigError::Missing { key: key.into() })
    }

    /// 是否为致命的配置/准备阶段错误
    pub fn is_fatal_setup(&self) -> bool {
        matches!(
            self,
            AppError::Config(_)
                | AppError::Assessment(AssessmentError::MissingReferenceContent { .. })
                | AppError::Assessment(AssessmentError::MissingEmptyContent { .. })
        )
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_content_is_fatal_setup() {
        let err = AppError::from(AssessmentError::MissingEmptyContent {
            task_key: "Q1".to_string(),
            assignment_id: "a-1".to_string(),
        });
        assert!(err.is_fatal_setup());
        assert!(err.to_string().contains("Q1"));
    }

    #[test]
    fn test_bad_status_is_not_fatal() {
        let err = AppError::from(AssessmentError::BadStatus { status: 500 });
        assert!(!err.is_fatal_setup());
    }
}
