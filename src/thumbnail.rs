use eframe::egui::ColorImage;
use image::{DynamicImage, imageops::FilterType};
use tracing::debug;

/// Bounding box of the thumbnails shown next to each download row
pub const THUMB_WIDTH: u32 = 96;
pub const THUMB_HEIGHT: u32 = 54;

/// Downloads the thumbnail at `url` and decodes it for egui.
/// Blocking; run it off the UI thread. Any failure yields `None`.
pub fn fetch_thumbnail(url: &str) -> Option<ColorImage> {
    let resp = match reqwest::blocking::get(url).and_then(|r| r.error_for_status()) {
        Ok(resp) => resp,
        Err(err) => {
            debug!(%url, error = %err, "thumbnail request failed");
            return None;
        }
    };
    let bytes = resp.bytes().ok()?;
    let img = image::load_from_memory(&bytes).ok()?;
    Some(to_color_image(&img))
}

/// Scales the image into the thumbnail box, keeping its aspect ratio.
pub fn to_color_image(img: &DynamicImage) -> ColorImage {
    let small = img
        .resize(THUMB_WIDTH, THUMB_HEIGHT, FilterType::Triangle)
        .to_rgba8();
    let size = [small.width() as usize, small.height() as usize];
    ColorImage::from_rgba_unmultiplied(size, &small)
}
