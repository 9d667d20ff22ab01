use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use term_explainer::models::load_term_list;
use term_explainer::{logging, Config, FileStore, LlmService, Scheduler};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置
    let config = Config::from_env();

    // 初始化日志
    logging::init(config.verbose_logging);

    let path: PathBuf = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .context("用法: term_explainer <terms.toml>")?;

    // 加载术语列表
    let term_list = load_term_list(&path).await?;

    let scheduler = Scheduler::from_config(
        &config,
        Arc::new(LlmService::new(&config)),
        Arc::new(FileStore::new(&config.store_dir)),
    )?;

    let mut run = scheduler.run(term_list.terms.clone(), term_list.context())?;
    while let Some(event) = run.next_event().await {
        info!(
            "🔔 进度 {}%，已就绪 {} 条解释",
            event.progress.percentage,
            event.explanations.len()
        );
    }
    let explanations = run.finish().await?;

    let output = serde_json::to_string_pretty(&explanations).context("序列化结果失败")?;
    println!("{}", output);

    Ok(())
}
