//! This module provides [extract], which determines when and where a photo was taken by reconciling several
//! unreliable sources of metadata.
//!
//! Each source yields a [Candidate] in which any field may be missing.  Candidates are merged field by field in
//! priority order (see [reconcile]): the platform metadata query first (HEIC only), then the embedded EXIF data.
//! If neither source has a capture time, the file modification time is used as a last resort.  There is no
//! fallback for location; a photo without one cannot be imported.

use {
    crate::{
        error::ImportError,
        native::NativeMetadata,
        normalize::{Normalized, Orientation, SourceFormat},
    },
    anyhow::{Context, Result},
    chrono::{DateTime, Utc},
    exif::{Exif, Field, In, Tag, Value},
    gallery_shared::Location,
    lazy_static::lazy_static,
    regex::Regex,
    std::{io::Cursor, ops::Neg, path::Path},
    tokio::{fs, task},
    tracing::warn,
};

/// Coordinates are rounded to this many decimal places (roughly a millimeter)
const DECIMAL_SF: f64 = 100_000_000.0;

const LAT_MAX: f64 = 90.0;

const LNG_MAX: f64 = 180.0;

/// Embedded timestamp tags, in priority order, each paired with the tag holding its UTC offset
const DATE_TIME_TAGS: &[(Tag, Tag)] = &[
    (Tag::DateTimeOriginal, Tag::OffsetTimeOriginal),
    (Tag::DateTimeDigitized, Tag::OffsetTimeDigitized),
];

/// Possibly incomplete metadata reported by one source
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Candidate {
    pub taken_at: Option<DateTime<Utc>>,
    pub location: Option<Location>,

    /// Upright (i.e. orientation-corrected) width and height
    pub dimensions: Option<(u32, u32)>,
}

/// Where the capture time of a photo came from
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TimeSource {
    /// The platform metadata query or embedded EXIF data
    Embedded,

    /// The file modification time, which may have nothing to do with when the photo was taken
    FileModified,
}

/// Reconciled metadata for one photo
#[derive(Debug, Clone, PartialEq)]
pub struct Metadata {
    pub taken_at: DateTime<Utc>,
    pub time_source: TimeSource,
    pub location: Location,
    pub dimensions: Option<(u32, u32)>,
}

/// Build a [Location], clamping each coordinate to its valid range and rounding to [DECIMAL_SF].
pub fn location(lat: f64, lng: f64) -> Location {
    fn format(value: f64, max: f64) -> f64 {
        (value.clamp(max.neg(), max) * DECIMAL_SF).round() / DECIMAL_SF
    }

    Location {
        lat: format(lat, LAT_MAX),
        lng: format(lng, LNG_MAX),
    }
}

/// Parse a textual coordinate, either decimal ("37.8043") or comma-separated degrees, minutes, and seconds
/// ("37,48,17.44").
///
/// A leading minus sign negates the whole value.  Returns `None` if `value` matches neither form.
pub fn dms_to_decimal(value: &str) -> Option<f64> {
    let value = value.trim();

    let (negative, value) = match value.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, value),
    };

    let parts = value
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .ok()?;

    let degrees = match parts.as_slice() {
        [decimal] => *decimal,
        [degrees, minutes, seconds] => degrees + minutes / 60.0 + seconds / 3600.0,
        _ => return None,
    };

    if degrees.is_finite() {
        Some(if negative { degrees.neg() } else { degrees })
    } else {
        None
    }
}

/// Merge candidates field by field, taking the first value present for each field.
pub fn reconcile(candidates: impl IntoIterator<Item = Candidate>) -> Candidate {
    candidates
        .into_iter()
        .fold(Candidate::default(), |merged, candidate| Candidate {
            taken_at: merged.taken_at.or(candidate.taken_at),
            location: merged.location.or(candidate.location),
            dimensions: merged.dimensions.or(candidate.dimensions),
        })
}

/// Parse the EXIF data embedded in `bytes`, if any.
///
/// Missing or empty EXIF data yields `Ok(None)`; malformed EXIF data is an error.
pub fn read_exif(bytes: &[u8]) -> Result<Option<Exif>> {
    match exif::Reader::new().read_from_container(&mut Cursor::new(bytes)) {
        Ok(exif) => Ok(Some(exif)),
        Err(
            exif::Error::NotFound(_) | exif::Error::NotSupported(_) | exif::Error::BlankValue(_),
        ) => Ok(None),
        Err(e) => Err(e).context("unable to parse EXIF data"),
    }
}

fn ascii(field: &Field) -> Option<&str> {
    if let Value::Ascii(values) = &field.value {
        values
            .first()
            .and_then(|value| std::str::from_utf8(value).ok())
            .map(|value| value.trim_end_matches('\0').trim())
    } else {
        None
    }
}

fn tag_string(exif: &Exif, tag: Tag) -> Option<&str> {
    exif.get_field(tag, In::PRIMARY).and_then(ascii)
}

fn parse_date_time(datetime: &str, offset: Option<&str>) -> Option<DateTime<Utc>> {
    lazy_static! {
        static ref DATE_TIME_PATTERN: Regex =
            Regex::new(r"(\d{4}):(\d{2}):(\d{2}) (\d{2}):(\d{2}):(\d{2})").unwrap();
        static ref OFFSET_PATTERN: Regex = Regex::new(r"^[+-]\d{2}:\d{2}$").unwrap();
    };

    let offset = offset
        .filter(|offset| OFFSET_PATTERN.is_match(offset))
        .unwrap_or("Z");

    DATE_TIME_PATTERN
        .captures(datetime)
        .map(|c| {
            format!(
                "{}-{}-{}T{}:{}:{}{}",
                &c[1], &c[2], &c[3], &c[4], &c[5], &c[6], offset
            )
        })
        .and_then(|datetime| datetime.parse().ok())
}

/// Capture time from the first populated timestamp tag.
///
/// A timestamp without an offset tag is taken to be UTC.
fn exif_date_time(exif: &Exif) -> Option<DateTime<Utc>> {
    DATE_TIME_TAGS.iter().find_map(|&(tag, offset_tag)| {
        tag_string(exif, tag).and_then(|datetime| {
            parse_date_time(
                datetime,
                tag_string(exif, offset_tag).or_else(|| tag_string(exif, Tag::OffsetTime)),
            )
        })
    })
}

fn exif_coordinate(exif: &Exif, tag: Tag, reference: Tag, negative: &str) -> Option<f64> {
    let degrees = match &exif.get_field(tag, In::PRIMARY)?.value {
        Value::Rational(parts) if parts.len() >= 3 => {
            parts[0].to_f64() + parts[1].to_f64() / 60.0 + parts[2].to_f64() / 3600.0
        }
        Value::Rational(parts) if parts.len() == 1 => parts[0].to_f64(),
        _ => return None,
    };

    if !degrees.is_finite() {
        return None;
    }

    Some(
        if tag_string(exif, reference).map_or(false, |r| r.eq_ignore_ascii_case(negative)) {
            degrees.neg()
        } else {
            degrees
        },
    )
}

fn exif_location(exif: &Exif) -> Option<Location> {
    let lat = exif_coordinate(exif, Tag::GPSLatitude, Tag::GPSLatitudeRef, "S")?;
    let lng = exif_coordinate(exif, Tag::GPSLongitude, Tag::GPSLongitudeRef, "W")?;

    Some(location(lat, lng))
}

fn exif_dimensions(exif: &Exif) -> Option<(u32, u32)> {
    let width = exif.get_field(Tag::PixelXDimension, In::PRIMARY)?;
    let height = exif.get_field(Tag::PixelYDimension, In::PRIMARY)?;

    width
        .value
        .get_uint(0)
        .zip(height.value.get_uint(0))
        .filter(|&(width, height)| width > 0 && height > 0)
}

/// Metadata embedded in the EXIF data of `normalized`.
///
/// EXIF-reported dimensions take precedence over the dimensions of the decoded image, and both are swapped for
/// orientations which rotate the image a quarter turn.
pub fn exif_candidate(normalized: &Normalized) -> Result<Candidate> {
    let exif = read_exif(&normalized.bytes)?;

    let (width, height) = exif
        .as_ref()
        .and_then(exif_dimensions)
        .unwrap_or(normalized.container_dimensions);

    Ok(Candidate {
        taken_at: exif.as_ref().and_then(exif_date_time),
        location: exif.as_ref().and_then(exif_location),
        dimensions: Some(upright(width, height, normalized.orientation)),
    })
}

fn upright(width: u32, height: u32, orientation: Orientation) -> (u32, u32) {
    if orientation.is_orthogonal() {
        (height, width)
    } else {
        (width, height)
    }
}

async fn file_modified(path: &Path) -> Result<DateTime<Utc>> {
    Ok(fs::metadata(path)
        .await
        .with_context(|| format!("unable to stat {}", path.display()))?
        .modified()?
        .into())
}

/// Determine when and where the photo at `source` was taken, and its dimensions.
///
/// `normalized` is the working copy of `source` produced by [crate::normalize::normalize], whose bytes are what
/// the EXIF parser reads (for HEIC sources, these are the bytes of the converted JPEG).
pub async fn extract(
    native: NativeMetadata,
    source: &Path,
    normalized: &Normalized,
) -> Result<Metadata> {
    let mut candidates = Vec::new();

    if normalized.format == SourceFormat::Heic {
        match native.query(source).await {
            Ok(Some(candidate)) => candidates.push(candidate),
            Ok(None) => (),
            Err(e) => warn!(
                "platform metadata query failed for {}: {:#}",
                source.display(),
                e
            ),
        }
    }

    candidates.push(task::block_in_place(|| exif_candidate(normalized))?);

    let merged = reconcile(candidates);

    let location = merged
        .location
        .ok_or_else(|| ImportError::MissingLocation(source.to_owned()))?;

    let (taken_at, time_source) = if let Some(taken_at) = merged.taken_at {
        (taken_at, TimeSource::Embedded)
    } else {
        let taken_at = file_modified(source).await?;

        warn!(
            "no capture time found in {}; falling back to file modification time {}",
            source.display(),
            taken_at
        );

        (taken_at, TimeSource::FileModified)
    };

    Ok(Metadata {
        taken_at,
        time_source,
        location,
        dimensions: merged.dimensions,
    })
}
