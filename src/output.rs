//! Where screenshots go on disk.
//!
//! ```text
//! {parent}/{YYYY-MM-DD_HH-MM-SS}/{city}/{data type}_full_page_screenshot.png
//! ```
//!
//! The run folder is stamped with Beijing time (UTC+8) regardless of the host
//! time zone.

use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset, Utc};
use log::info;

use crate::error::{Error, Result};
use crate::matcher::DataType;

const BEIJING_OFFSET_SECS: i32 = 8 * 3600;
const FOLDER_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// The current time at UTC+8.
pub fn beijing_now() -> Result<DateTime<FixedOffset>> {
    let tz = FixedOffset::east_opt(BEIJING_OFFSET_SECS).ok_or(Error::TimeZone(BEIJING_OFFSET_SECS))?;
    Ok(Utc::now().with_timezone(&tz))
}

/// Folder name for a run started at `at`, e.g. `2024-03-01_09-05-07`.
pub fn run_folder_name<Tz: chrono::TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    at.format(FOLDER_FORMAT).to_string()
}

/// Creates `{parent}/{city}` and returns it. Calling it again is a no-op.
pub fn create_city_folder(parent: &Path, city: &str) -> Result<PathBuf> {
    let folder = parent.join(city);
    std::fs::create_dir_all(&folder)?;
    Ok(folder)
}

/// The output root of one run, created once at start and passed to every pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    /// Creates `{parent}/{timestamp}` for a run started now.
    pub fn create(parent: &Path) -> Result<Self> {
        Self::create_at(parent, &beijing_now()?)
    }

    pub fn create_at<Tz: chrono::TimeZone>(parent: &Path, at: &DateTime<Tz>) -> Result<Self>
    where
        Tz::Offset: std::fmt::Display,
    {
        let root = parent.join(run_folder_name(at));
        std::fs::create_dir_all(&root)?;
        info!("Created output folder {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates the city's folder and returns the screenshot path inside it.
    pub fn screenshot_path(&self, city: &str, data_type: DataType) -> Result<PathBuf> {
        let folder = create_city_folder(&self.root, city)?;
        Ok(folder.join(screenshot_file_name(data_type)))
    }
}

pub fn screenshot_file_name(data_type: DataType) -> String {
    format!("{}_full_page_screenshot.png", data_type.label())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn folder_name_uses_beijing_wall_clock() {
        let utc = Utc.with_ymd_and_hms(2024, 3, 1, 20, 5, 7).unwrap();
        let tz = FixedOffset::east_opt(BEIJING_OFFSET_SECS).unwrap();
        assert_eq!(run_folder_name(&utc.with_timezone(&tz)), "2024-03-02_04-05-07");
    }

    #[test]
    fn beijing_now_is_utc_plus_eight() {
        assert_eq!(beijing_now().unwrap().offset().local_minus_utc(), BEIJING_OFFSET_SECS);
    }

    #[test]
    fn create_stamps_the_run_folder_with_beijing_time() {
        let dir = tempfile::tempdir().unwrap();
        let layout = OutputLayout::create(dir.path()).unwrap();
        assert!(layout.root().is_dir());

        let name = layout.root().file_name().unwrap().to_str().unwrap();
        assert!(chrono::NaiveDateTime::parse_from_str(name, FOLDER_FORMAT).is_ok(), "{}", name);
    }

    #[test]
    fn city_folder_creation_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let first = create_city_folder(dir.path(), "唐山市").unwrap();
        let second = create_city_folder(dir.path(), "唐山市").unwrap();
        assert_eq!(first, second);
        assert!(first.is_dir());

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn layout_places_screenshots_per_city() {
        let dir = tempfile::tempdir().unwrap();
        let at = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let layout = OutputLayout::create_at(dir.path(), &at).unwrap();
        assert_eq!(layout.root(), dir.path().join("2024-01-02_03-04-05"));

        let path = layout.screenshot_path("邯郸市", DataType::DeathPopulation).unwrap();
        assert_eq!(
            path,
            dir.path()
                .join("2024-01-02_03-04-05")
                .join("邯郸市")
                .join("死亡人口_full_page_screenshot.png")
        );
        assert!(path.parent().unwrap().is_dir());
    }
}
