//! This module provides the [NativeMetadata] capability, which wraps the platform tools used for HEIC files: a
//! Spotlight metadata query (`mdls`) and an image converter (`sips`).  Both are only present on macOS; elsewhere
//! the importer runs with [NativeMetadata::Unavailable] and relies on the embedded EXIF parser alone.

use {
    crate::{
        error::ImportError,
        metadata::{self, Candidate},
    },
    anyhow::{anyhow, Error, Result},
    chrono::{DateTime, Utc},
    std::{path::Path, process::Output, str::FromStr},
    tokio::process::Command,
};

/// Spotlight attributes requested from `mdls`
const MDLS_ATTRIBUTES: &[&str] = &[
    "kMDItemContentCreationDate",
    "kMDItemLatitude",
    "kMDItemLongitude",
];

/// Format of date attributes in `mdls` output, e.g. "2026-01-03 19:19:31 +0000"
const MDLS_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S %z";

/// Whether the platform metadata tools may be used
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum NativeMetadata {
    /// `mdls` and `sips` are available
    NativeQuery,

    /// Only the portable EXIF parser and the filesystem fallback are available
    Unavailable,
}

/// Command line selection of [NativeMetadata]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum NativeMode {
    /// Use the platform tools if running on macOS
    Auto,
    On,
    Off,
}

impl FromStr for NativeMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "auto" => Ok(Self::Auto),
            "on" => Ok(Self::On),
            "off" => Ok(Self::Off),
            _ => Err(anyhow!(
                "unrecognized native metadata mode: {} (expected auto, on, or off)",
                s
            )),
        }
    }
}

impl NativeMode {
    pub fn resolve(self) -> NativeMetadata {
        match self {
            Self::Auto if cfg!(target_os = "macos") => NativeMetadata::NativeQuery,
            Self::Auto | Self::Off => NativeMetadata::Unavailable,
            Self::On => NativeMetadata::NativeQuery,
        }
    }
}

impl NativeMetadata {
    /// Query the capture time and location of the file at `path`.
    ///
    /// Returns `Ok(None)` if the platform tools are unavailable.
    pub async fn query(&self, path: &Path) -> Result<Option<Candidate>> {
        match self {
            Self::Unavailable => Ok(None),

            Self::NativeQuery => {
                let mut command = Command::new("mdls");

                for attribute in MDLS_ATTRIBUTES {
                    command.arg("-name").arg(attribute);
                }

                let output = run("mdls", command.arg(path)).await?;

                Ok(Some(parse_mdls(&String::from_utf8_lossy(&output.stdout))))
            }
        }
    }

    /// Convert the file at `source` to a JPEG at `destination`, preserving embedded metadata.
    pub async fn convert_to_jpeg(&self, source: &Path, destination: &Path) -> Result<()> {
        match self {
            Self::Unavailable => Err(ImportError::ConverterUnavailable(source.to_owned()).into()),

            Self::NativeQuery => {
                run(
                    "sips",
                    Command::new("sips")
                        .arg("-s")
                        .arg("format")
                        .arg("jpeg")
                        .arg(source)
                        .arg("--out")
                        .arg(destination),
                )
                .await?;

                Ok(())
            }
        }
    }
}

async fn run(tool: &'static str, command: &mut Command) -> Result<Output> {
    let output = command.output().await.map_err(|e| ImportError::NativeTool {
        tool,
        message: e.to_string(),
    })?;

    if output.status.success() {
        Ok(output)
    } else {
        Err(ImportError::NativeTool {
            tool,
            message: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        }
        .into())
    }
}

/// Parse `mdls` output of the form "kMDItemLatitude = 37.7749", one attribute per line.
///
/// Attributes `mdls` could not find are reported as "(null)" and left empty in the result.
pub fn parse_mdls(output: &str) -> Candidate {
    let mut taken_at = None;
    let mut lat = None;
    let mut lng = None;

    for line in output.lines() {
        if let Some((name, value)) = line.split_once('=') {
            let value = value.trim().trim_matches('"');

            if value == "(null)" {
                continue;
            }

            match name.trim() {
                "kMDItemContentCreationDate" => {
                    taken_at = DateTime::parse_from_str(value, MDLS_DATE_FORMAT)
                        .ok()
                        .map(|datetime| datetime.with_timezone(&Utc))
                }
                "kMDItemLatitude" => lat = metadata::dms_to_decimal(value),
                "kMDItemLongitude" => lng = metadata::dms_to_decimal(value),
                _ => (),
            }
        }
    }

    Candidate {
        taken_at,
        location: lat
            .zip(lng)
            .map(|(lat, lng)| metadata::location(lat, lng)),
        dimensions: None,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn mdls_output() {
        let candidate = parse_mdls(
            "kMDItemContentCreationDate = 2026-01-03 19:19:31 +0000\n\
             kMDItemLatitude            = 37.7749\n\
             kMDItemLongitude           = -122.4194\n",
        );

        assert_eq!(
            Some("2026-01-03T19:19:31Z".parse().unwrap()),
            candidate.taken_at
        );

        let location = candidate.location.unwrap();
        assert_eq!(37.7749, location.lat);
        assert_eq!(-122.4194, location.lng);
        assert_eq!(None, candidate.dimensions);
    }

    #[test]
    fn mdls_missing_attributes() {
        let candidate = parse_mdls(
            "kMDItemContentCreationDate = 2024-06-01 08:00:00 +0200\n\
             kMDItemLatitude            = (null)\n\
             kMDItemLongitude           = (null)\n",
        );

        assert_eq!(
            Some("2024-06-01T06:00:00Z".parse().unwrap()),
            candidate.taken_at
        );
        assert_eq!(None, candidate.location);
    }

    #[test]
    fn mdls_sexagesimal_coordinates() {
        let location = parse_mdls(
            "kMDItemLatitude = 37,48,17.44\n\
             kMDItemLongitude = -122,25,9.84\n",
        )
        .location
        .unwrap();

        assert!((location.lat - 37.80484444).abs() < 1e-6);
        assert!((location.lng + 122.4194).abs() < 1e-6);
    }

    #[test]
    fn modes() {
        assert_eq!(NativeMode::On, "on".parse().unwrap());
        assert_eq!(NativeMetadata::NativeQuery, NativeMode::On.resolve());
        assert_eq!(NativeMetadata::Unavailable, NativeMode::Off.resolve());
        assert!("sometimes".parse::<NativeMode>().is_err());
    }

    #[tokio::test]
    async fn unavailable() -> Result<()> {
        let path = Path::new("IMG_0001.heic");

        assert_eq!(None, NativeMetadata::Unavailable.query(path).await?);

        let error = NativeMetadata::Unavailable
            .convert_to_jpeg(path, Path::new("out.jpg"))
            .await
            .unwrap_err();

        assert!(matches!(
            error.downcast_ref::<ImportError>(),
            Some(ImportError::ConverterUnavailable(_))
        ));

        Ok(())
    }
}
