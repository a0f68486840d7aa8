use anyhow::Result;
use gotohui_shot::{Browser, PageStitcher, StitchOptions};
use std::path::Path;

#[tokio::main]
async fn main() -> Result<()> {
    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "https://population.gotohui.com/".to_string());

    let browser = Browser::builder().headless(true).build().await?;
    let tab = browser.new_tab().await?;
    tab.goto(&url).await?;

    let stitcher = PageStitcher::new(StitchOptions::new().with_trim_overlap(true));
    let report = stitcher
        .stitch_full_page(&tab, Path::new("screenshots/full_page.png"))
        .await?;
    println!(
        "Saved {}x{} from {} captures to screenshots/full_page.png",
        report.width,
        report.height,
        report.captures()
    );

    browser.close().await?;
    Ok(())
}
