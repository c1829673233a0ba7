use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;

use crate::error::{AppError, AppResult, ConfigError};
use crate::models::task::TaskType;

/// 程序配置
///
/// 运行开始时读取一次，之后以引用或 `Arc` 的方式传给各个组件，运行期间不再修改。
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 每批并发发送的请求数量
    pub batch_size: usize,
    // --- Langflow 评分服务 ---
    pub langflow_url: String,
    pub langflow_api_key: String,
    pub text_assessment_tweak_id: String,
    pub table_assessment_tweak_id: String,
    pub image_assessment_tweak_id: String,
    // --- 图片上传服务 ---
    pub image_upload_url: String,
    pub image_uploader_api_key: String,
    /// 导出幻灯片图片时使用的 OAuth token
    pub google_access_token: String,
    // --- 重试策略 ---
    /// 传输层失败的最大重试次数
    pub max_retries: usize,
    /// 指数退避的基础间隔（毫秒）
    pub retry_base_delay_ms: u64,
    /// 评分响应不合法时的最大重试次数
    pub max_validation_retries: usize,
    // --- 缓存 ---
    pub cache_ttl_secs: u64,
    pub cache_file: String,
    // --- 运行环境 ---
    /// 课堂/幻灯片数据文件
    pub workspace_file: String,
    /// 运行锁目录
    pub lock_dir: String,
    /// 获取运行锁的最长等待时间（毫秒）
    pub lock_wait_ms: u64,
    /// 锁文件存在超过该时长（秒）视为异常退出的运行遗留
    pub lock_stale_secs: u64,
    /// 评分结果 JSON 的输出目录
    pub output_dir: String,
    /// 输出日志文件
    pub output_log_file: String,
    /// 提示消息持久化文件
    pub notices_file: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
}

/// 某种任务类型对应的评分端点
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScoringEndpoint {
    pub url: String,
    pub tweak_id: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            batch_size: 20,
            langflow_url: String::new(),
            langflow_api_key: String::new(),
            text_assessment_tweak_id: String::new(),
            table_assessment_tweak_id: String::new(),
            image_assessment_tweak_id: String::new(),
            image_upload_url: String::new(),
            image_uploader_api_key: String::new(),
            google_access_token: String::new(),
            max_retries: 3,
            retry_base_delay_ms: 5000,
            max_validation_retries: 3,
            cache_ttl_secs: 6 * 60 * 60,
            cache_file: "assessment_cache.json".to_string(),
            workspace_file: "workspace.toml".to_string(),
            lock_dir: std::env::temp_dir()
                .join("slides_assessor_locks")
                .to_string_lossy()
                .to_string(),
            lock_wait_ms: 5000,
            lock_stale_secs: 30 * 60,
            output_dir: ".".to_string(),
            output_log_file: "output.txt".to_string(),
            notices_file: "notices.txt".to_string(),
            verbose_logging: false,
        }
    }
}

impl Config {
    /// 从环境变量加载配置
    ///
    /// 如果设置了 `ASSESSOR_CONFIG`，先读取该 TOML 文件作为基础，环境变量优先。
    pub fn from_env() -> AppResult<Self> {
        let base = match std::env::var("ASSESSOR_CONFIG") {
            Ok(path) => Self::from_toml_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        Self::overlay_env(base)
    }

    /// 从 TOML 文件加载配置，缺失的字段使用默认值
    pub fn from_toml_file(path: &Path) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::file(path.display().to_string(), e))?;
        toml::from_str(&content).map_err(|source| {
            ConfigError::TomlParseFailed {
                path: path.display().to_string(),
                source,
            }
            .into()
        })
    }

    fn overlay_env(base: Self) -> AppResult<Self> {
        Ok(Self {
            batch_size: env_parse("BATCH_SIZE", base.batch_size)?,
            langflow_url: env_string("LANGFLOW_URL", base.langflow_url),
            langflow_api_key: env_string("LANGFLOW_API_KEY", base.langflow_api_key),
            text_assessment_tweak_id: env_string(
                "TEXT_ASSESSMENT_TWEAK_ID",
                base.text_assessment_tweak_id,
            ),
            table_assessment_tweak_id: env_string(
                "TABLE_ASSESSMENT_TWEAK_ID",
                base.table_assessment_tweak_id,
            ),
            image_assessment_tweak_id: env_string(
                "IMAGE_ASSESSMENT_TWEAK_ID",
                base.image_assessment_tweak_id,
            ),
            image_upload_url: env_string("IMAGE_UPLOAD_URL", base.image_upload_url),
            image_uploader_api_key: env_string(
                "IMAGE_UPLOADER_API_KEY",
                base.image_uploader_api_key,
            ),
            google_access_token: env_string("GOOGLE_ACCESS_TOKEN", base.google_access_token),
            max_retries: env_parse("MAX_RETRIES", base.max_retries)?,
            retry_base_delay_ms: env_parse("RETRY_BASE_DELAY_MS", base.retry_base_delay_ms)?,
            max_validation_retries: env_parse(
                "MAX_VALIDATION_RETRIES",
                base.max_validation_retries,
            )?,
            cache_ttl_secs: env_parse("CACHE_TTL_SECS", base.cache_ttl_secs)?,
            cache_file: env_string("CACHE_FILE", base.cache_file),
            workspace_file: env_string("WORKSPACE_FILE", base.workspace_file),
            lock_dir: env_string("LOCK_DIR", base.lock_dir),
            lock_wait_ms: env_parse("LOCK_WAIT_MS", base.lock_wait_ms)?,
            lock_stale_secs: env_parse("LOCK_STALE_SECS", base.lock_stale_secs)?,
            output_dir: env_string("OUTPUT_DIR", base.output_dir),
            output_log_file: env_string("OUTPUT_LOG_FILE", base.output_log_file),
            notices_file: env_string("NOTICES_FILE", base.notices_file),
            verbose_logging: env_parse("VERBOSE_LOGGING", base.verbose_logging)?,
        })
    }

    /// 校验与任务类型无关的配置项
    ///
    /// 评分端点只在实际用到对应任务类型时校验，见 [`Config::scoring_endpoint`]。
    pub fn validate(&self) -> AppResult<()> {
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid {
                key: "BATCH_SIZE".to_string(),
                reason: "必须是正整数".to_string(),
            }
            .into());
        }
        for (key, value) in [
            ("LANGFLOW_URL", &self.langflow_url),
            ("IMAGE_UPLOAD_URL", &self.image_upload_url),
        ] {
            if !value.is_empty() && !is_valid_url(value) {
                return Err(ConfigError::Invalid {
                    key: key.to_string(),
                    reason: format!("'{}' 不是合法的 URL", value),
                }
                .into());
            }
        }
        Ok(())
    }

    /// 获取某种任务类型的评分端点
    ///
    /// 缺少 Langflow 地址或该类型的 tweak id 时返回致命的配置错误。
    pub fn scoring_endpoint(&self, task_type: TaskType) -> AppResult<ScoringEndpoint> {
        let (tweak_key, tweak_id) = match task_type {
            TaskType::Text => ("TEXT_ASSESSMENT_TWEAK_ID", &self.text_assessment_tweak_id),
            TaskType::Table => ("TABLE_ASSESSMENT_TWEAK_ID", &self.table_assessment_tweak_id),
            TaskType::Image => ("IMAGE_ASSESSMENT_TWEAK_ID", &self.image_assessment_tweak_id),
        };
        if self.langflow_url.trim().is_empty() {
            return Err(ConfigError::MissingScoringEndpoint {
                task_type: task_type.to_string(),
                key: "LANGFLOW_URL".to_string(),
            }
            .into());
        }
        if tweak_id.trim().is_empty() {
            return Err(ConfigError::MissingScoringEndpoint {
                task_type: task_type.to_string(),
                key: tweak_key.to_string(),
            }
            .into());
        }
        Ok(ScoringEndpoint {
            url: format!(
                "{}/api/v1/run/{}Assessment?stream=false",
                self.langflow_base(),
                task_type.endpoint_slug()
            ),
            tweak_id: tweak_id.clone(),
        })
    }

    /// 预热端点
    pub fn warm_up_url(&self) -> String {
        format!("{}/api/v1/run/warmUp?stream=false", self.langflow_base())
    }

    fn langflow_base(&self) -> &str {
        self.langflow_url.trim_end_matches('/')
    }
}

fn env_string(var_name: &str, default: String) -> String {
    std::env::var(var_name).unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(var_name: &str, default: T) -> AppResult<T> {
    match std::env::var(var_name) {
        Ok(value) => value.trim().parse().map_err(|_| {
            ConfigError::EnvVarParseFailed {
                var_name: var_name.to_string(),
                value,
                expected_type: std::any::type_name::<T>().to_string(),
            }
            .into()
        }),
        Err(_) => Ok(default),
    }
}

/// 判断字符串是否为 http/https URL
pub fn is_valid_url(url: &str) -> bool {
    static URL_PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = URL_PATTERN.get_or_init(|| {
        Regex::new(r"^https?://[A-Za-z0-9.\-]+(:\d+)?(/[^\s]*)?$").expect("URL 正则表达式无效")
    });
    pattern.is_match(url)
}
