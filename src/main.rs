use anyhow::{bail, Result};
use slides_assessor::utils::logging;
use slides_assessor::{App, Config, RunRequest, RunStatus};

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置
    let config = Config::from_env()?;

    // 初始化日志
    logging::init(config.verbose_logging);

    let request = RunRequest::from_env()?;

    // 初始化并运行应用
    let summary = App::initialize(config).await?.run(&request).await?;

    if summary.status == RunStatus::Failed {
        bail!(
            "评分运行失败: {}",
            summary.error.unwrap_or_else(|| "未知错误".to_string())
        );
    }

    Ok(())
}
