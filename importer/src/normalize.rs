use {
    crate::{error::ImportError, metadata, native::NativeMetadata},
    anyhow::{Context, Result},
    exif::{In, Tag},
    image::{DynamicImage, GenericImageView, ImageFormat},
    std::path::Path,
    tempfile::NamedTempFile,
    tokio::{fs, task},
};

/// Source encodings the importer accepts
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SourceFormat {
    Jpeg,

    /// HEIC/HEIF, which can only be read via the platform converter
    Heic,
}

impl SourceFormat {
    /// Identify the format of `path` by its (case-insensitive) extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_lowercase();

        match extension.as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "heic" | "heif" => Some(Self::Heic),
            _ => None,
        }
    }
}

/// EXIF orientation, i.e. the transform which makes the stored pixels upright
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Orientation {
    Normal,
    MirrorHorizontal,
    Rotate180,
    MirrorVertical,
    MirrorHorizontalRotate270,
    Rotate90,
    MirrorHorizontalRotate90,
    Rotate270,
}

impl From<u32> for Orientation {
    fn from(value: u32) -> Self {
        match value {
            2 => Self::MirrorHorizontal,
            3 => Self::Rotate180,
            4 => Self::MirrorVertical,
            5 => Self::MirrorHorizontalRotate270,
            6 => Self::Rotate90,
            7 => Self::MirrorHorizontalRotate90,
            8 => Self::Rotate270,
            _ => Self::Normal,
        }
    }
}

impl Orientation {
    /// Whether applying this orientation swaps width and height
    pub fn is_orthogonal(self) -> bool {
        matches!(
            self,
            Self::MirrorHorizontalRotate270
                | Self::Rotate90
                | Self::MirrorHorizontalRotate90
                | Self::Rotate270
        )
    }

    pub fn apply(self, image: DynamicImage) -> DynamicImage {
        match self {
            Self::Normal => image,
            Self::MirrorHorizontal => image.fliph(),
            Self::Rotate180 => image.rotate180(),
            Self::MirrorVertical => image.flipv(),
            Self::MirrorHorizontalRotate270 => image.fliph().rotate270(),
            Self::Rotate90 => image.rotate90(),
            Self::MirrorHorizontalRotate90 => image.fliph().rotate90(),
            Self::Rotate270 => image.rotate270(),
        }
    }
}

/// A temporary file which is deleted when dropped, on success and failure paths alike
pub struct TempFile(Option<NamedTempFile>);

impl TempFile {
    fn new(suffix: &str) -> Result<Self> {
        Ok(Self(Some(task::block_in_place(|| {
            tempfile::Builder::new()
                .prefix("gallery-")
                .suffix(suffix)
                .tempfile()
        })?)))
    }

    pub fn path(&self) -> Option<&Path> {
        self.0.as_ref().map(NamedTempFile::path)
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        task::block_in_place(|| drop(self.0.take()))
    }
}

/// Working copy of a source image
pub struct Normalized {
    pub format: SourceFormat,

    /// JPEG bytes: the source file itself, or the converted copy of a HEIC source
    pub bytes: Vec<u8>,

    /// Decoded, upright image
    pub image: DynamicImage,

    pub orientation: Orientation,

    /// Dimensions of the decoded image before `orientation` was applied
    pub container_dimensions: (u32, u32),

    /// Converted copy of a HEIC source, kept until this value is dropped
    pub converted: Option<TempFile>,
}

/// Decode the image at `source` and apply its EXIF orientation.
///
/// HEIC sources are first converted to a temporary JPEG using the platform converter, failing with
/// [ImportError::ConverterUnavailable] if there is none.
pub async fn normalize(
    native: NativeMetadata,
    source: &Path,
    format: SourceFormat,
) -> Result<Normalized> {
    let (bytes, converted) = match format {
        SourceFormat::Jpeg => (
            fs::read(source)
                .await
                .with_context(|| format!("unable to read {}", source.display()))?,
            None,
        ),

        SourceFormat::Heic => {
            if native == NativeMetadata::Unavailable {
                return Err(ImportError::ConverterUnavailable(source.to_owned()).into());
            }

            let converted = TempFile::new(".jpg")?;

            let path = converted
                .path()
                .context("temporary file already removed")?
                .to_owned();

            native.convert_to_jpeg(source, &path).await?;

            (fs::read(&path).await?, Some(converted))
        }
    };

    task::block_in_place(|| {
        let original = image::load_from_memory_with_format(&bytes, ImageFormat::Jpeg)
            .with_context(|| format!("unable to decode {}", source.display()))?;

        let orientation = metadata::read_exif(&bytes)?
            .and_then(|exif| {
                exif.get_field(Tag::Orientation, In::PRIMARY)
                    .and_then(|field| field.value.get_uint(0))
            })
            .map(Orientation::from)
            .unwrap_or(Orientation::Normal);

        let container_dimensions = original.dimensions();

        Ok(Normalized {
            format,
            image: orientation.apply(original),
            bytes,
            orientation,
            container_dimensions,
            converted,
        })
    })
}
