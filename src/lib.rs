/*!
Searches [population.gotohui.com](https://population.gotohui.com/) for city
population statistics and saves each matching detail page as one stitched,
full-page PNG, driving Chrome over the Chrome DevTools Protocol (CDP).

The building blocks are usable on their own:

- [`Browser`], [`Tab`] and [`Element`] drive a Chrome instance over CDP.
- [`PageStitcher`] scrolls any [`ScrollablePage`] one viewport at a time and
  stacks the captures into a single image.
- [`is_matching_link`] picks the wanted statistics link out of search results.
- [`OutputLayout`] lays screenshots out as `{timestamp}/{city}/{data type}_full_page_screenshot.png`.
- [`workflow::run`] ties them together for every configured (city, data type) pair.

```no_run
use gotohui_shot::{Browser, ExitHook, OutputLayout, RunConfig, workflow};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = RunConfig::default();
    let layout = OutputLayout::create(&config.output_parent)?;
    let browser = Browser::new().await?;

    let summary = workflow::run(&browser, &config, &layout, &ExitHook::new()).await?;
    println!("{} captured, {} failed", summary.captured.len(), summary.failed.len());

    browser.close().await?;
    Ok(())
}
```
*/

mod browser;
mod element;
mod exit_hook;
mod tab;
mod transport;
mod types;
mod utils;

pub mod config;
pub mod error;
pub mod matcher;
pub mod output;
pub mod stitch;
pub mod workflow;

pub use browser::{Browser, BrowserBuilder};
pub use config::RunConfig;
pub use element::Element;
pub use error::{Error, Result};
pub use exit_hook::ExitHook;
pub use matcher::{DataType, is_matching_link, target_text};
pub use output::{OutputLayout, create_city_folder};
pub use stitch::{
    Capture, PageStitcher, ScrollablePage, StitchOptions, StitchReport, compose, plan_offsets, stitch_full_page,
    trim_overlap,
};
pub use tab::Tab;
pub use types::{Key, PageMetrics, ScrollState, TargetInfo, WaitOptions};
pub use workflow::{RunSummary, Session};
