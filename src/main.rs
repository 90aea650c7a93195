use anyhow::Result;
use sica_client::utils::logging;
use sica_client::{App, Config};
use tracing::{error, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置
    let config = Config::load()?;

    // 初始化日志
    logging::init(config.verbose_logging)?;

    // 初始化并运行应用
    let code = match App::initialize(config)?.run().await {
        Ok(_) => 0,
        Err(e) if e.is_cancelled() => {
            warn!("⚠️ 用户取消");
            130
        }
        Err(e) => {
            error!("❌ {:#}", anyhow::Error::from(e));
            1
        }
    };

    // 输入提示可能仍阻塞在后台线程里，直接退出而不等待它
    std::process::exit(code);
}
