//! The search-and-capture loop over every (city, data type) pair.
//!
//! Each pair runs start to finish before the next one begins: load the search
//! page, search, click the first matching result, follow it into the window it
//! opens, and stitch that page to disk. A failed pair is logged and recorded;
//! it never stops the run.

use std::collections::HashSet;
use std::path::PathBuf;

use log::{debug, error, info, warn};

use crate::browser::Browser;
use crate::config::RunConfig;
use crate::error::{Error, Result};
use crate::exit_hook::ExitHook;
use crate::matcher::{self, DataType};
use crate::output::OutputLayout;
use crate::stitch::PageStitcher;
use crate::tab::Tab;
use crate::types::{Key, TargetInfo, WaitOptions};
use crate::utils::wait_until;

const SEARCH_INPUT: &str = "#searchkey";
const RESULT_ROWS: &str = ".ntable tbody tr";

/// A successfully captured pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Captured {
    pub city: String,
    pub data_type: DataType,
    pub path: PathBuf,
}

/// A pair that failed, with the rendered error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failed {
    pub city: String,
    pub data_type: DataType,
    pub reason: String,
}

/// What a run produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub captured: Vec<Captured>,
    pub failed: Vec<Failed>,
    /// Set when the run stopped early on Ctrl+C.
    pub interrupted: bool,
}

impl RunSummary {
    pub fn record(&mut self, city: &str, data_type: DataType, outcome: &Result<PathBuf>) {
        match outcome {
            Ok(path) => self.captured.push(Captured {
                city: city.to_string(),
                data_type,
                path: path.clone(),
            }),
            Err(e) => self.failed.push(Failed {
                city: city.to_string(),
                data_type,
                reason: e.to_string(),
            }),
        }
    }

    pub fn attempted(&self) -> usize {
        self.captured.len() + self.failed.len()
    }
}

/// Page targets present in `now` but not in `before`, i.e. windows opened in between.
pub fn opened_pages<'a>(before: &[TargetInfo], now: &'a [TargetInfo]) -> Vec<&'a TargetInfo> {
    let known: HashSet<&str> = before.iter().map(|t| t.target_id.as_str()).collect();
    now.iter()
        .filter(|t| t.is_page() && !known.contains(t.target_id.as_str()))
        .collect()
}

/// One browser tab walking through the configured pairs.
pub struct Session<'a> {
    browser: &'a Browser,
    config: &'a RunConfig,
    layout: &'a OutputLayout,
    stitcher: PageStitcher,
    tab: Tab,
}

impl<'a> Session<'a> {
    /// Opens the working tab and closes the window the browser started with.
    pub async fn start(browser: &'a Browser, config: &'a RunConfig, layout: &'a OutputLayout) -> Result<Self> {
        let tab = browser.new_tab().await?;
        if let Err(e) = browser.close_other_pages(&tab).await {
            warn!("Failed to close startup pages: {:#}", e);
        }

        Ok(Self {
            browser,
            config,
            layout,
            stitcher: PageStitcher::new(config.stitch),
            tab,
        })
    }

    /// The tab currently in use; it changes whenever a result opens a new window.
    pub fn tab(&self) -> &Tab {
        &self.tab
    }

    fn wait(&self) -> &WaitOptions {
        &self.config.wait
    }

    /// Runs every pair in order and returns what happened.
    pub async fn run(&mut self, hook: &ExitHook) -> RunSummary {
        let config = self.config;
        let mut summary = RunSummary::default();

        for (city, data_type) in config.pairs() {
            if hook.is_interrupted() {
                warn!("Stopping before {} {}: interrupted", city, data_type);
                summary.interrupted = true;
                break;
            }

            let outcome = self.capture_pair(city, data_type).await;
            match &outcome {
                Ok(path) => info!("{} {}: full-page screenshot done ({})", city, data_type, path.display()),
                Err(e) => error!("{} {}: full-page screenshot failed: {}", city, data_type, e),
            }
            summary.record(city, data_type, &outcome);
        }

        info!(
            "Finished: {} captured, {} failed{}",
            summary.captured.len(),
            summary.failed.len(),
            if summary.interrupted { " (interrupted)" } else { "" }
        );
        summary
    }

    /// Searches for one pair and saves its stitched detail page.
    pub async fn capture_pair(&mut self, city: &str, data_type: DataType) -> Result<PathBuf> {
        let base_url = self.config.base_url.clone();
        self.tab
            .goto(&base_url)
            .await
            .map_err(|e| Error::navigation(&base_url, e))?;

        info!("Searching {} {}...", city, data_type);
        self.search(city, data_type).await?;

        info!("Locating the {} {} link...", city, data_type);
        let results_url = self.tab.url().await?;
        let before = self.browser.pages().await?;
        let href = self.click_matching_link(city, data_type).await?;

        info!("Switching to the detail page...");
        self.follow_to_detail_page(&before, &results_url, &href).await?;

        info!("Capturing full-page screenshot...");
        let path = self.layout.screenshot_path(city, data_type)?;
        self.stitcher.stitch_full_page(&self.tab, &path).await?;
        Ok(path)
    }

    async fn search(&self, city: &str, data_type: DataType) -> Result<()> {
        let input = self
            .tab
            .wait_for_selector(SEARCH_INPUT, self.wait())
            .await
            .map_err(|e| {
                debug!("{:#}", e);
                Error::ElementNotFound {
                    selector: SEARCH_INPUT.to_string(),
                }
            })?;

        let before = self.tab.url().await?;
        input.clear().await?;
        input.type_text(&matcher::search_query(city, data_type)).await?;
        input.press(Key::Enter).await?;

        // Results replace the page; wait for that so stale rows are never read.
        let tab = &self.tab;
        let before = before.as_str();
        let left = wait_until(self.wait(), || async move {
            Ok::<_, anyhow::Error>((tab.url().await? != before).then_some(()))
        })
        .await;
        if left.is_err() {
            debug!("URL did not change after searching; assuming results render in place");
        }
        Ok(())
    }

    /// Clicks the first result link accepted by the matcher and returns its URL.
    async fn click_matching_link(&self, city: &str, data_type: DataType) -> Result<String> {
        let target = matcher::target_text(city, data_type);
        let rows = self
            .tab
            .wait_for_all(RESULT_ROWS, self.wait())
            .await
            .map_err(|e| {
                debug!("{:#}", e);
                Error::ElementNotFound {
                    selector: RESULT_ROWS.to_string(),
                }
            })?;
        debug!("{} result rows", rows.len());

        let mut links = Vec::with_capacity(rows.len());
        for row in &rows {
            let cells = row.query_selector_all("td").await?;
            let Some(cell) = cells.get(1) else {
                continue;
            };
            if let Some(link) = cell.query_selector("a").await? {
                let text = link.text().await?;
                links.push((link, text));
            }
        }

        let Some(index) = matcher::first_match(links.iter().map(|(_, text)| text.as_str()), &target) else {
            return Err(Error::LinkNotFound { target });
        };
        let (link, text) = &links[index];

        let href = link.attribute("href").await?.unwrap_or_default();
        info!("Found link {:?}: {}", text.trim(), href);
        link.click().await?;
        Ok(href)
    }

    /// Moves to the window the click opened and closes the old one, or stays
    /// put if the link navigated in place.
    async fn follow_to_detail_page(&mut self, before: &[TargetInfo], results_url: &str, href: &str) -> Result<()> {
        let browser = self.browser;
        let opened = wait_until(self.wait(), || async move {
            let now = browser.pages().await?;
            Ok::<_, anyhow::Error>(opened_pages(before, &now).first().map(|t| t.target_id.clone()))
        })
        .await;

        match opened {
            Ok(target_id) => {
                let new_tab = self.browser.attach(&target_id).await?;
                let old = std::mem::replace(&mut self.tab, new_tab);
                if let Err(e) = old.close().await {
                    warn!("Failed to close the search window: {:#}", e);
                }
                debug!("Now on window {}", target_id);
            }
            Err(_) => {
                let current = self.tab.url().await?;
                if current == results_url {
                    return Err(Error::Navigation {
                        url: href.to_string(),
                        reason: "clicking the result opened no page".into(),
                    });
                }
                debug!("Result opened in the same window: {}", current);
            }
        }

        self.wait_loaded().await?;
        match self.tab.title().await {
            Ok(title) => info!("Detail page: {}", title),
            Err(e) => debug!("Could not read the detail page title: {:#}", e),
        }
        Ok(())
    }

    async fn wait_loaded(&self) -> Result<()> {
        let tab = &self.tab;
        wait_until(self.wait(), || async move {
            let state = tab.evaluate_as_string("document.readyState").await?;
            Ok::<_, anyhow::Error>((state == "complete").then_some(()))
        })
        .await
        .map_err(|_| Error::Timeout {
            what: "detail page to finish loading".into(),
            after: self.wait().timeout,
        })
    }
}

/// Opens a session on `browser` and processes every pair in `config`.
pub async fn run(browser: &Browser, config: &RunConfig, layout: &OutputLayout, hook: &ExitHook) -> Result<RunSummary> {
    let mut session = Session::start(browser, config, layout).await?;
    Ok(session.run(hook).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(id: &str) -> TargetInfo {
        TargetInfo {
            target_id: id.into(),
            kind: "page".into(),
            title: String::new(),
            url: String::new(),
            browser_context_id: None,
        }
    }

    #[test]
    fn opened_pages_reports_only_new_page_targets() {
        let before = vec![page("A")];
        let mut worker = page("W");
        worker.kind = "service_worker".into();
        let now = vec![page("A"), worker, page("B")];

        let opened = opened_pages(&before, &now);
        assert_eq!(opened.len(), 1);
        assert_eq!(opened[0].target_id, "B");
    }

    #[test]
    fn opened_pages_is_empty_when_nothing_changed() {
        let before = vec![page("A"), page("B")];
        assert!(opened_pages(&before, &before).is_empty());
    }

    #[test]
    fn summary_records_both_outcomes() {
        let mut summary = RunSummary::default();
        summary.record("石家庄市", DataType::BirthPopulation, &Ok(PathBuf::from("a.png")));
        summary.record(
            "唐山市",
            DataType::DeathPopulation,
            &Err(Error::LinkNotFound {
                target: "唐山市死亡人数".into(),
            }),
        );

        assert_eq!(summary.attempted(), 2);
        assert_eq!(summary.captured[0].path, PathBuf::from("a.png"));
        assert_eq!(summary.failed[0].city, "唐山市");
        assert!(summary.failed[0].reason.contains("唐山市死亡人数"));
    }
}
