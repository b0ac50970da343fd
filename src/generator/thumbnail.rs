use crate::error::Result;
use image::ImageFormat;
use std::io::Cursor;
use std::path::Path;

/// Decodes the image at `path`, shrinks it to fit `max_side` square and re-encodes it as PNG.
pub async fn prepare_image(path: &Path, max_side: u32) -> Result<Vec<u8>> {
    let bytes = tokio::fs::read(path).await?;
    let decoded = image::load_from_memory(&bytes)?;
    let fitted = if decoded.width() > max_side || decoded.height() > max_side {
        decoded.thumbnail(max_side, max_side)
    } else {
        decoded
    };
    let rgb = image::DynamicImage::ImageRgb8(fitted.to_rgb8());

    let mut png = Cursor::new(Vec::new());
    rgb.write_to(&mut png, ImageFormat::Png)?;
    Ok(png.into_inner())
}
