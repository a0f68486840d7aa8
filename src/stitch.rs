//! Full-page screenshots by scrolling one viewport at a time and stacking the captures.
//!
//! The page is scrolled to `0, V, 2V, ...` while the offset is below the total
//! scroll height `H`, giving `ceil(H / V)` captures. They are pasted top to
//! bottom at `x = 0` on a canvas as wide as the widest capture.
//!
//! When `H` is not a multiple of `V` the browser clamps the last scroll to
//! `H - V`, so the last capture repeats rows already captured. Those rows are
//! kept unless [`StitchOptions::trim_overlap`] is set.

use std::io::{BufWriter, Write};
use std::path::Path;

use image::{ImageFormat, Rgba, RgbaImage, imageops};
use log::{debug, info};
use tempfile::NamedTempFile;

use crate::error::{Error, Result};
use crate::tab::Tab;
use crate::types::WaitOptions;
use crate::utils::{WaitError, wait_until};

/// What the stitcher needs from a page.
#[allow(async_fn_in_trait)]
pub trait ScrollablePage {
    /// Total scrollable height, in CSS pixels.
    async fn total_scroll_height(&self) -> Result<u32>;
    /// Visible viewport height, in CSS pixels.
    async fn viewport_height(&self) -> Result<u32>;
    async fn scroll_to(&self, offset: u32) -> Result<()>;
    /// Whether content at `offset` is rendered and safe to capture.
    async fn is_settled(&self, offset: u32) -> Result<bool>;
    async fn capture_viewport(&self) -> Result<RgbaImage>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StitchOptions {
    /// Bounds the wait for each scroll position to settle.
    pub wait: WaitOptions,
    /// Crop the rows the last capture repeats, so the output matches the page height.
    pub trim_overlap: bool,
}

impl StitchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_wait(mut self, wait: WaitOptions) -> Self {
        self.wait = wait;
        self
    }

    pub fn with_trim_overlap(mut self, trim: bool) -> Self {
        self.trim_overlap = trim;
        self
    }
}

/// One viewport screenshot and the offset it was requested at.
#[derive(Debug, Clone)]
pub struct Capture {
    pub offset: u32,
    pub image: RgbaImage,
}

/// Summary of a finished stitch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StitchReport {
    /// Scroll offsets, one per capture, in capture order.
    pub offsets: Vec<u32>,
    pub width: u32,
    pub height: u32,
}

impl StitchReport {
    pub fn captures(&self) -> usize {
        self.offsets.len()
    }
}

/// Scroll offsets `0, V, 2V, ...` strictly below `total_height`.
pub fn plan_offsets(total_height: u32, viewport_height: u32) -> Result<Vec<u32>> {
    if viewport_height == 0 {
        return Err(Error::InvalidPage("viewport height is 0".into()));
    }
    Ok((0..total_height).step_by(viewport_height as usize).collect())
}

/// Stacks captures vertically in order, left-aligned.
///
/// The canvas is as wide as the widest capture and as tall as all of them
/// together; any area a narrower capture leaves uncovered is black.
pub fn compose(captures: &[Capture]) -> Result<RgbaImage> {
    let width = captures
        .iter()
        .map(|c| c.image.width())
        .max()
        .ok_or_else(|| Error::InvalidPage("nothing to stitch".into()))?;
    let height = captures
        .iter()
        .try_fold(0u32, |acc, c| acc.checked_add(c.image.height()))
        .ok_or_else(|| Error::InvalidPage("stitched height overflows".into()))?;
    if width == 0 || height == 0 {
        return Err(Error::InvalidPage(format!("empty canvas {}x{}", width, height)));
    }

    let mut canvas = RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 255]));
    let mut y = 0i64;
    for capture in captures {
        imageops::replace(&mut canvas, &capture.image, 0, y);
        y += i64::from(capture.image.height());
    }
    Ok(canvas)
}

/// Crops what the last capture shares with earlier ones (or, for a page
/// shorter than the viewport, the blank area below it).
///
/// Capture pixels may be scaled relative to CSS pixels (device pixel ratio);
/// the ratio is taken from the capture height over `viewport_height`.
pub fn trim_overlap(captures: &mut [Capture], total_height: u32, viewport_height: u32) {
    let count = captures.len();
    let Some(last) = captures.last_mut() else {
        return;
    };
    if viewport_height == 0 || last.image.height() == 0 {
        return;
    }
    let (w, h) = last.image.dimensions();
    let scale = f64::from(h) / f64::from(viewport_height);
    let to_px = |css: u32| ((f64::from(css) * scale).round() as u32).min(h);

    if count == 1 {
        let keep = to_px(total_height);
        if keep > 0 && keep < h {
            last.image = imageops::crop_imm(&last.image, 0, 0, w, keep).to_image();
        }
        return;
    }

    let covered = last.offset.saturating_add(viewport_height);
    let overlap = covered.saturating_sub(total_height);
    let cut = to_px(overlap);
    if cut > 0 && cut < h {
        last.image = imageops::crop_imm(&last.image, 0, cut, w, h - cut).to_image();
    }
}

/// Scrolls, captures and stitches a page into one image.
#[derive(Debug, Clone, Default)]
pub struct PageStitcher {
    options: StitchOptions,
}

impl PageStitcher {
    pub fn new(options: StitchOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &StitchOptions {
        &self.options
    }

    /// Takes one capture per planned offset, top to bottom.
    ///
    /// Page dimensions are read once up front; the page is assumed not to
    /// grow while it is being captured.
    pub async fn capture_all<P: ScrollablePage>(&self, page: &P) -> Result<(Vec<Capture>, u32, u32)> {
        let total_height = page.total_scroll_height().await?;
        let viewport_height = page.viewport_height().await?;
        let offsets = plan_offsets(total_height, viewport_height)?;
        debug!(
            "Page height {}px, viewport {}px: {} captures",
            total_height,
            viewport_height,
            offsets.len()
        );

        let mut captures = Vec::with_capacity(offsets.len());
        for offset in offsets {
            page.scroll_to(offset).await?;
            self.wait_settled(page, offset).await?;
            let image = page.capture_viewport().await?;
            debug!("Captured {}x{} at offset {}", image.width(), image.height(), offset);
            captures.push(Capture { offset, image });
        }
        Ok((captures, total_height, viewport_height))
    }

    async fn wait_settled<P: ScrollablePage>(&self, page: &P, offset: u32) -> Result<()> {
        wait_until(&self.options.wait, || async move {
            Ok::<_, anyhow::Error>(page.is_settled(offset).await?.then_some(()))
        })
        .await
        .map_err(|WaitError::TimedOut(last)| {
            if let Some(e) = last {
                debug!("Last settle probe error at offset {}: {:#}", offset, e);
            }
            Error::Timeout {
                what: format!("page to settle at scroll offset {}", offset),
                after: self.options.wait.timeout,
            }
        })
    }

    /// Captures the whole page and returns the stitched image with its report.
    pub async fn stitch<P: ScrollablePage>(&self, page: &P) -> Result<(RgbaImage, StitchReport)> {
        let (mut captures, total_height, viewport_height) = self.capture_all(page).await?;
        if self.options.trim_overlap {
            trim_overlap(&mut captures, total_height, viewport_height);
        }

        let image = compose(&captures)?;
        let report = StitchReport {
            offsets: captures.iter().map(|c| c.offset).collect(),
            width: image.width(),
            height: image.height(),
        };
        Ok((image, report))
    }

    /// Captures the whole page and writes it as PNG to `destination`.
    ///
    /// The file is written next to `destination` and renamed into place, so a
    /// failure never leaves a partial image behind.
    pub async fn stitch_full_page<P: ScrollablePage>(
        &self,
        page: &P,
        destination: &Path,
    ) -> Result<StitchReport> {
        let (image, report) = self.stitch(page).await?;
        save_png(&image, destination)?;
        info!(
            "Saved {}x{} full-page screenshot ({} captures) to {}",
            report.width,
            report.height,
            report.captures(),
            destination.display()
        );
        Ok(report)
    }
}

/// Stitches `page` with default options and writes it to `destination`.
pub async fn stitch_full_page<P: ScrollablePage>(page: &P, destination: &Path) -> Result<StitchReport> {
    PageStitcher::default().stitch_full_page(page, destination).await
}

fn save_png(image: &RgbaImage, destination: &Path) -> Result<()> {
    let dir = match destination.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        image.write_to(&mut writer, ImageFormat::Png)?;
        writer.flush()?;
    }
    tmp.persist(destination).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

impl ScrollablePage for Tab {
    async fn total_scroll_height(&self) -> Result<u32> {
        Ok(self.metrics().await.map_err(Error::capture)?.scroll_height)
    }

    async fn viewport_height(&self) -> Result<u32> {
        Ok(self.metrics().await.map_err(Error::capture)?.viewport_height)
    }

    async fn scroll_to(&self, offset: u32) -> Result<()> {
        Tab::scroll_to(self, offset).await.map_err(Error::capture)?;
        Ok(())
    }

    async fn is_settled(&self, offset: u32) -> Result<bool> {
        self.scroll_settled(offset).await.map_err(Error::capture)
    }

    async fn capture_viewport(&self) -> Result<RgbaImage> {
        let png = Tab::capture_viewport(self).await.map_err(Error::capture)?;
        Ok(image::load_from_memory_with_format(&png, ImageFormat::Png)?.to_rgba8())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, shade: u8) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Rgba([shade, shade, shade, 255]))
    }

    fn capture(offset: u32, width: u32, height: u32, shade: u8) -> Capture {
        Capture {
            offset,
            image: solid(width, height, shade),
        }
    }

    #[test]
    fn offsets_step_by_viewport_height() {
        assert_eq!(plan_offsets(2500, 1000).unwrap(), vec![0, 1000, 2000]);
        assert_eq!(plan_offsets(3000, 1000).unwrap(), vec![0, 1000, 2000]);
        assert_eq!(plan_offsets(1, 1000).unwrap(), vec![0]);
        assert!(plan_offsets(0, 1000).unwrap().is_empty());
    }

    #[test]
    fn offsets_count_is_ceiling_division() {
        for (h, v) in [(1u32, 7u32), (7, 7), (8, 7), (100, 33), (1999, 1000), (2001, 1000)] {
            assert_eq!(plan_offsets(h, v).unwrap().len() as u32, h.div_ceil(v), "H={} V={}", h, v);
        }
    }

    #[test]
    fn zero_viewport_is_rejected() {
        assert!(matches!(plan_offsets(100, 0), Err(Error::InvalidPage(_))));
    }

    #[test]
    fn compose_uses_max_width_and_summed_height() {
        let captures = vec![capture(0, 80, 10, 10), capture(10, 100, 10, 20), capture(20, 90, 5, 30)];
        let out = compose(&captures).unwrap();
        assert_eq!(out.dimensions(), (100, 25));

        assert_eq!(out.get_pixel(0, 0), &Rgba([10, 10, 10, 255]));
        assert_eq!(out.get_pixel(99, 0), &Rgba([0, 0, 0, 255]));
        assert_eq!(out.get_pixel(99, 10), &Rgba([20, 20, 20, 255]));
        assert_eq!(out.get_pixel(0, 24), &Rgba([30, 30, 30, 255]));
    }

    #[test]
    fn compose_without_captures_fails() {
        assert!(matches!(compose(&[]), Err(Error::InvalidPage(_))));
    }

    #[test]
    fn trim_crops_top_of_last_capture() {
        let mut captures = vec![capture(0, 10, 1000, 1), capture(1000, 10, 1000, 2), capture(2000, 10, 1000, 3)];
        trim_overlap(&mut captures, 2500, 1000);
        assert_eq!(captures[2].image.height(), 500);
        assert_eq!(compose(&captures).unwrap().height(), 2500);
    }

    #[test]
    fn trim_scales_with_device_pixel_ratio() {
        let mut captures = vec![capture(0, 10, 2000, 1), capture(1000, 10, 2000, 2)];
        trim_overlap(&mut captures, 1600, 1000);
        assert_eq!(captures[1].image.height(), 1200);
    }

    #[test]
    fn trim_keeps_exact_multiples_untouched() {
        let mut captures = vec![capture(0, 10, 1000, 1), capture(1000, 10, 1000, 2)];
        trim_overlap(&mut captures, 2000, 1000);
        assert_eq!(captures[1].image.height(), 1000);
    }

    #[test]
    fn trim_cuts_blank_area_below_short_page() {
        let mut captures = vec![capture(0, 10, 1000, 1)];
        trim_overlap(&mut captures, 400, 1000);
        assert_eq!(captures[0].image.height(), 400);
    }

    #[test]
    fn save_png_creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("a").join("b").join("out.png");
        save_png(&solid(4, 3, 200), &dest).unwrap();

        let back = image::open(&dest).unwrap().to_rgba8();
        assert_eq!(back.dimensions(), (4, 3));
        assert_eq!(back.get_pixel(0, 0), &Rgba([200, 200, 200, 255]));
    }
}
