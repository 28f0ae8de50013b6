//! Fixtures shared by the unit tests: JPEG files with hand-built EXIF data, and a stub alt text client.

use {
    crate::alt_text::AltTextClient,
    anyhow::{anyhow, Result},
    exif::{experimental::Writer, Field, In, Rational, Tag, Value},
    futures::future::{BoxFuture, FutureExt},
    image::{DynamicImage, ImageBuffer, Rgb},
    std::{
        io::Cursor,
        path::Path,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Once,
        },
    },
};

pub fn init_logging() {
    static ONCE: Once = Once::new();

    ONCE.call_once(pretty_env_logger::init_timed);
}

/// EXIF fields to embed in a generated JPEG; `None` fields are omitted.
#[derive(Default, Clone)]
pub struct ExifFields {
    /// DateTimeOriginal, e.g. "2026:01:03 19:19:31"
    pub taken_at: Option<&'static str>,

    /// DateTimeDigitized
    pub digitized_at: Option<&'static str>,

    /// OffsetTime, e.g. "+09:00"
    pub offset: Option<&'static str>,

    /// OffsetTimeOriginal
    pub offset_original: Option<&'static str>,

    /// Latitude and longitude in decimal degrees
    pub location: Option<(f64, f64)>,

    pub orientation: Option<u32>,

    /// PixelXDimension and PixelYDimension, which need not match the encoded image
    pub pixel_dimensions: Option<(u32, u32)>,
}

fn ascii(tag: Tag, value: &str) -> Field {
    Field {
        tag,
        ifd_num: In::PRIMARY,
        value: Value::Ascii(vec![value.as_bytes().to_vec()]),
    }
}

/// Degrees, minutes, and hundredths of seconds
fn dms(value: f64) -> Vec<Rational> {
    let value = value.abs();
    let degrees = value.floor();
    let minutes = ((value - degrees) * 60.0).floor();
    let centiseconds = ((value - degrees - minutes / 60.0) * 360_000.0).round();

    vec![
        Rational::from((degrees as u32, 1)),
        Rational::from((minutes as u32, 1)),
        Rational::from((centiseconds as u32, 100)),
    ]
}

fn exif_fields(fields: &ExifFields) -> Vec<Field> {
    let mut result = Vec::new();

    if let Some(taken_at) = fields.taken_at {
        result.push(ascii(Tag::DateTimeOriginal, taken_at));
    }

    if let Some(digitized_at) = fields.digitized_at {
        result.push(ascii(Tag::DateTimeDigitized, digitized_at));
    }

    if let Some(offset) = fields.offset {
        result.push(ascii(Tag::OffsetTime, offset));
    }

    if let Some(offset) = fields.offset_original {
        result.push(ascii(Tag::OffsetTimeOriginal, offset));
    }

    if let Some((lat, lng)) = fields.location {
        result.push(ascii(Tag::GPSLatitudeRef, if lat < 0.0 { "S" } else { "N" }));
        result.push(Field {
            tag: Tag::GPSLatitude,
            ifd_num: In::PRIMARY,
            value: Value::Rational(dms(lat)),
        });
        result.push(ascii(Tag::GPSLongitudeRef, if lng < 0.0 { "W" } else { "E" }));
        result.push(Field {
            tag: Tag::GPSLongitude,
            ifd_num: In::PRIMARY,
            value: Value::Rational(dms(lng)),
        });
    }

    if let Some(orientation) = fields.orientation {
        result.push(Field {
            tag: Tag::Orientation,
            ifd_num: In::PRIMARY,
            value: Value::Short(vec![orientation as u16]),
        });
    }

    if let Some((width, height)) = fields.pixel_dimensions {
        for (tag, value) in [
            (Tag::PixelXDimension, width),
            (Tag::PixelYDimension, height),
        ] {
            result.push(Field {
                tag,
                ifd_num: In::PRIMARY,
                value: Value::Long(vec![value]),
            });
        }
    }

    result
}

/// Insert `tiff` (a TIFF-structured EXIF blob) as an APP1 segment directly after the SOI marker of `jpeg`.
fn splice_exif(jpeg: &[u8], tiff: &[u8]) -> Result<Vec<u8>> {
    if jpeg.len() < 2 || jpeg[..2] != [0xFF, 0xD8] {
        return Err(anyhow!("not a JPEG"));
    }

    let length = u16::try_from(tiff.len() + 8)?;

    let mut result = Vec::with_capacity(jpeg.len() + tiff.len() + 10);
    result.extend_from_slice(&jpeg[..2]);
    result.extend_from_slice(&[0xFF, 0xE1]);
    result.extend_from_slice(&length.to_be_bytes());
    result.extend_from_slice(b"Exif\0\0");
    result.extend_from_slice(tiff);
    result.extend_from_slice(&jpeg[2..]);

    Ok(result)
}

/// Encode a solid `width` x `height` image of the specified color as a JPEG with the specified EXIF fields.
pub fn jpeg(width: u32, height: u32, color: Rgb<u8>, fields: &ExifFields) -> Result<Vec<u8>> {
    let image = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(width, height, color));
    let jpeg = crate::derivatives::encode_jpeg(&image, 95)?;

    let fields = exif_fields(fields);

    if fields.is_empty() {
        return Ok(jpeg);
    }

    let mut writer = Writer::new();

    for field in &fields {
        writer.push_field(field);
    }

    let mut tiff = Cursor::new(Vec::new());
    writer.write(&mut tiff, false)?;

    splice_exif(&jpeg, &tiff.into_inner())
}

pub fn write_jpeg(
    path: &Path,
    width: u32,
    height: u32,
    color: Rgb<u8>,
    fields: &ExifFields,
) -> Result<()> {
    std::fs::write(path, jpeg(width, height, color, fields)?)?;

    Ok(())
}

/// [AltTextClient] which counts its calls and either replies with fixed text or fails
pub struct StubClient {
    reply: Option<String>,
    calls: AtomicUsize,
}

impl StubClient {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_owned()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl AltTextClient for StubClient {
    fn describe<'a>(&'a self, _jpeg: &'a [u8]) -> BoxFuture<'a, Result<String>> {
        async move {
            self.calls.fetch_add(1, Ordering::SeqCst);

            self.reply
                .clone()
                .ok_or_else(|| anyhow!("service unavailable"))
        }
        .boxed()
    }
}

#[cfg(test)]
mod test {
    use {super::*, crate::metadata};

    #[test]
    fn fixture_round_trip() -> Result<()> {
        let bytes = jpeg(
            16,
            16,
            Rgb([0, 0, 0]),
            &ExifFields {
                taken_at: Some("2026:01:03 19:19:31"),
                location: Some((37.7749, -122.4194)),
                orientation: Some(6),
                ..ExifFields::default()
            },
        )?;

        let exif = metadata::read_exif(&bytes)?.ok_or_else(|| anyhow!("no EXIF data"))?;

        assert!(exif.get_field(Tag::DateTimeOriginal, In::PRIMARY).is_some());
        assert!(exif.get_field(Tag::GPSLatitude, In::PRIMARY).is_some());
        assert_eq!(
            Some(6),
            exif.get_field(Tag::Orientation, In::PRIMARY)
                .and_then(|field| field.value.get_uint(0))
        );

        image::load_from_memory(&bytes)?;

        Ok(())
    }
}
