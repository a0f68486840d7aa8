use anyhow::{Context, Result};
use gotohui_shot::{Browser, ExitHook, OutputLayout, RunConfig, workflow};
use log::{debug, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let hook = ExitHook::new();
    if let Err(e) = hook.register() {
        warn!("Ctrl+C handler not installed: {}", e);
    }

    let cwd = std::env::current_dir().context("Failed to read the current directory")?;
    let config = RunConfig::default().with_output_parent(cwd);
    let layout = OutputLayout::create(&config.output_parent).context("Failed to create the output folder")?;

    let browser = Browser::new().await.context("Failed to launch the browser")?;
    let result = workflow::run(&browser, &config, &layout, &hook).await;

    if let Err(e) = browser.close().await {
        warn!("Browser did not close cleanly: {:#}", e);
    }

    let summary = result?;
    for failed in &summary.failed {
        debug!("Not captured: {} {}", failed.city, failed.data_type);
    }
    info!(
        "Screenshots saved under {} ({}/{} pairs)",
        layout.root().display(),
        summary.captured.len(),
        summary.attempted()
    );
    Ok(())
}
