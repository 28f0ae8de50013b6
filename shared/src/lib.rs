//! Gallery shared (e.g. manifest) code
//!
//! This crate contains the types shared between the gallery importer and anything which reads its output (e.g. the
//! static site generator and RSS feed).  Currently, it consists of the [serde](https://crates.io/crates/serde)-enabled
//! structs which define the manifest document, plus the naming rules for derivative image files.
//!
//! Consumers should treat the manifest as read-only: every field here is derived once at import time, with the
//! exception of [ImageRecord::description] and [ImageRecord::tags], which the site owner may edit by hand.

#![deny(warnings)]

use {
    chrono::{DateTime, Utc},
    serde_derive::{Deserialize, Serialize},
    std::collections::HashSet,
};

/// File extension used for both derivative images of a record
pub const DERIVATIVE_EXTENSION: &str = "jpg";

/// Number of digits to which record ids are zero-padded in derivative file names
pub const ID_WIDTH: usize = 5;

/// Name of the full-size derivative for the record with the specified `id`, e.g. "00042.jpg"
pub fn image_filename(id: u32) -> String {
    format!("{:0width$}.{}", id, DERIVATIVE_EXTENSION, width = ID_WIDTH)
}

/// Name of the square thumbnail derivative for the record with the specified `id`, e.g. "00042_thumb.jpg"
pub fn thumbnail_filename(id: u32) -> String {
    format!(
        "{:0width$}_thumb.{}",
        id,
        DERIVATIVE_EXTENSION,
        width = ID_WIDTH
    )
}

/// A point on the globe in decimal degrees
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
pub struct Location {
    /// Latitude, positive north of the equator
    pub lat: f64,

    /// Longitude, positive east of Greenwich
    pub lng: f64,
}

/// Metadata for one imported photo
///
/// Records are created by the importer and never modified by it afterward.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImageRecord {
    /// Unique, monotonically assigned identifier; never reused, even after a record is removed by hand
    pub id: u32,

    /// Name of the full-size derivative (see [image_filename])
    pub filename: String,

    /// Name of the square thumbnail derivative (see [thumbnail_filename])
    pub thumbnail_filename: String,

    /// Base name of the archived source file
    pub original_path: String,

    /// Content digest of the source file, e.g. "sha256:0f36..."
    pub original_hash: String,

    /// When the photo was taken
    pub taken_at: DateTime<Utc>,

    /// When the photo was imported
    pub imported_at: DateTime<Utc>,

    /// Width of the upright full-size image
    pub width: u32,

    /// Height of the upright full-size image
    pub height: u32,

    /// Where the photo was taken
    pub location: Location,

    /// IANA time zone at `location`, e.g. "America/Los_Angeles"
    pub timezone: String,

    /// Short accessibility description
    pub alt_text: String,

    /// Free-form description (edited by hand)
    #[serde(default)]
    pub description: String,

    /// Free-form tags (edited by hand)
    #[serde(default)]
    pub tags: Vec<String>,
}

/// The manifest document: every imported photo, newest first
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    pub images: Vec<ImageRecord>,
}

impl Manifest {
    /// Sort records by capture time, newest first.
    ///
    /// The sort is stable, so records sharing a timestamp keep their relative order.
    pub fn sort(&mut self) {
        self.images.sort_by(|a, b| b.taken_at.cmp(&a.taken_at));
    }

    /// The id the next imported record should receive: one more than the largest id present, or 1 if empty.
    pub fn next_id(&self) -> u32 {
        self.images.iter().map(|image| image.id).max().unwrap_or(0) + 1
    }

    /// Content digests of every record in the manifest
    pub fn hashes(&self) -> HashSet<String> {
        self.images
            .iter()
            .map(|image| image.original_hash.clone())
            .collect()
    }

    /// Whether the records are in non-increasing `taken_at` order
    pub fn is_sorted(&self) -> bool {
        self.images
            .windows(2)
            .all(|pair| pair[0].taken_at >= pair[1].taken_at)
    }
}

#[cfg(test)]
mod test {
    use {super::*, maplit::hashset};

    fn record(id: u32, taken_at: &str) -> ImageRecord {
        ImageRecord {
            id,
            filename: image_filename(id),
            thumbnail_filename: thumbnail_filename(id),
            original_path: format!("IMG_{:04}.jpg", id),
            original_hash: format!("sha256:{:064x}", id),
            taken_at: taken_at.parse().unwrap(),
            imported_at: "2026-02-01T00:00:00Z".parse().unwrap(),
            width: 640,
            height: 480,
            location: Location {
                lat: 37.7749,
                lng: -122.4194,
            },
            timezone: "America/Los_Angeles".into(),
            alt_text: "A foggy bridge".into(),
            description: String::new(),
            tags: Vec::new(),
        }
    }

    #[test]
    fn filenames() {
        assert_eq!("00001.jpg", image_filename(1));
        assert_eq!("00042_thumb.jpg", thumbnail_filename(42));
        assert_eq!("123456.jpg", image_filename(123456));
    }

    #[test]
    fn next_id_skips_gaps() {
        assert_eq!(1, Manifest::default().next_id());

        let manifest = Manifest {
            images: vec![
                record(7, "2026-01-01T00:00:00Z"),
                record(2, "2026-01-02T00:00:00Z"),
            ],
        };

        assert_eq!(8, manifest.next_id());
        assert_eq!(
            hashset![format!("sha256:{:064x}", 7), format!("sha256:{:064x}", 2)],
            manifest.hashes()
        );
    }

    #[test]
    fn sort_newest_first() {
        let mut manifest = Manifest {
            images: vec![
                record(1, "2024-05-01T10:00:00Z"),
                record(2, "2026-01-03T19:19:31Z"),
                record(3, "2025-07-04T00:00:00Z"),
            ],
        };

        assert!(!manifest.is_sorted());

        manifest.sort();

        assert!(manifest.is_sorted());
        assert_eq!(
            vec![2, 3, 1],
            manifest.images.iter().map(|i| i.id).collect::<Vec<_>>()
        );
    }

    #[test]
    fn camel_case_document() {
        let manifest = Manifest {
            images: vec![record(1, "2026-01-03T19:19:31Z")],
        };

        let json = serde_json::to_value(&manifest).unwrap();
        let image = &json["images"][0];

        assert_eq!("00001_thumb.jpg", image["thumbnailFilename"]);
        assert_eq!("2026-01-03T19:19:31Z", image["takenAt"]);
        assert_eq!("America/Los_Angeles", image["timezone"]);
        assert_eq!(37.7749, image["location"]["lat"]);
    }

    #[test]
    fn editable_fields_default_to_empty() {
        let mut json = serde_json::to_value(record(1, "2026-01-03T19:19:31Z")).unwrap();

        let object = json.as_object_mut().unwrap();
        object.remove("description");
        object.remove("tags");

        let image = serde_json::from_value::<ImageRecord>(json).unwrap();

        assert_eq!("", image.description);
        assert!(image.tags.is_empty());
    }
}
