use {
    anyhow::{Context, Result},
    gallery_shared::{image_filename, thumbnail_filename},
    image::{codecs::jpeg::JpegEncoder, ColorType, DynamicImage, GenericImageView},
    std::path::{Path, PathBuf},
    tokio::{fs, task},
};

pub const FULL_QUALITY: u8 = 90;

pub const THUMBNAIL_QUALITY: u8 = 85;

/// Square region from which a thumbnail is cut
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Crop {
    pub x: u32,
    pub y: u32,
    pub side: u32,
}

/// The largest centered square within a `width` x `height` image, with the origin rounded down.
pub fn thumbnail_crop(width: u32, height: u32) -> Crop {
    let side = width.min(height);

    Crop {
        x: (width - side) / 2,
        y: (height - side) / 2,
        side,
    }
}

/// Encode `image` as a JPEG at the specified quality (1-100).
pub fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    let rgb = image.to_rgb8();

    let mut buffer = Vec::new();

    JpegEncoder::new_with_quality(&mut buffer, quality).encode(
        rgb.as_raw(),
        rgb.width(),
        rgb.height(),
        ColorType::Rgb8,
    )?;

    Ok(buffer)
}

/// Derivative files written for one record
#[derive(Debug)]
pub struct Derivatives {
    pub full: PathBuf,
    pub thumbnail: PathBuf,

    /// Encoded content of `full`
    pub full_jpeg: Vec<u8>,
}

/// Write the full-size and thumbnail renditions of the upright `image` for record `id` to `dir`.
pub async fn write(dir: &Path, id: u32, image: &DynamicImage) -> Result<Derivatives> {
    let (full_jpeg, thumbnail_jpeg) = task::block_in_place(|| {
        let (width, height) = image.dimensions();
        let crop = thumbnail_crop(width, height);

        Ok::<_, anyhow::Error>((
            encode_jpeg(image, FULL_QUALITY)?,
            encode_jpeg(
                &image.crop_imm(crop.x, crop.y, crop.side, crop.side),
                THUMBNAIL_QUALITY,
            )?,
        ))
    })?;

    let full = dir.join(image_filename(id));
    let thumbnail = dir.join(thumbnail_filename(id));

    fs::write(&full, &full_jpeg)
        .await
        .with_context(|| format!("unable to write {}", full.display()))?;

    fs::write(&thumbnail, &thumbnail_jpeg)
        .await
        .with_context(|| format!("unable to write {}", thumbnail.display()))?;

    Ok(Derivatives {
        full,
        thumbnail,
        full_jpeg,
    })
}
