use anyhow::Result;
use pdf_quiz_pipeline::utils::logging;
use pdf_quiz_pipeline::{App, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // .env 不存在时忽略
    dotenv::dotenv().ok();

    // 加载配置
    let config = Config::from_env()?;

    // 初始化日志
    logging::init_log_file(&config.output_log_file)?;
    logging::init(&config.output_log_file, config.verbose_logging)?;

    // 初始化并运行应用
    App::initialize(config).await?.run().await?;

    Ok(())
}
