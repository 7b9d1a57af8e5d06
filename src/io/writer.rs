use crate::core::reconstruct::Mosaic;
use crate::types::{MosaicError, MosaicResult};
use image::RgbaImage;
use std::path::Path;

/// Encode a mosaic as an 8-bit RGBA PNG, creating the parent directory if needed
pub fn save_png<P: AsRef<Path>>(mosaic: &Mosaic, output_path: P) -> MosaicResult<()> {
    let output_path = output_path.as_ref();
    log::info!("Saving mosaic as PNG: {}", output_path.display());

    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let image = to_rgba_image(mosaic)?;
    image
        .save_with_format(output_path, image::ImageFormat::Png)
        .map_err(|e| MosaicError::Encoding(format!("Failed to write {}: {}", output_path.display(), e)))?;

    log::info!("PNG saved ({}x{})", mosaic.width(), mosaic.height());
    Ok(())
}

/// Convert a mosaic to an in-memory RGBA image
pub fn to_rgba_image(mosaic: &Mosaic) -> MosaicResult<RgbaImage> {
    let width = u32::try_from(mosaic.width())
        .map_err(|_| MosaicError::Encoding(format!("Width {} exceeds PNG limits", mosaic.width())))?;
    let height = u32::try_from(mosaic.height())
        .map_err(|_| MosaicError::Encoding(format!("Height {} exceeds PNG limits", mosaic.height())))?;

    RgbaImage::from_raw(width, height, mosaic.to_rgba8())
        .ok_or_else(|| MosaicError::Encoding("RGBA buffer does not match image size".to_string()))
}
