use {
    crate::{manifest::ManifestStore, timezone, Layout},
    anyhow::Result,
    gallery_shared::{image_filename, thumbnail_filename},
    std::{
        collections::HashMap,
        path::{Path, PathBuf},
    },
    tokio::fs,
};

/// A manifest invariant which does not hold, typically after a hand edit
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Violation {
    #[error("hash {hash} appears in records {first} and {second}")]
    DuplicateHash { hash: String, first: u32, second: u32 },

    #[error("id {0} appears more than once")]
    DuplicateId(u32),

    #[error("record {0} is out of order: it was taken after the record before it")]
    Unsorted(u32),

    #[error("record {id} refers to missing file {path}")]
    MissingFile { id: u32, path: PathBuf },

    #[error("record {id} has time zone {actual}, but its location resolves to {expected}")]
    TimezoneMismatch {
        id: u32,
        actual: String,
        expected: String,
    },

    #[error("record {id} has file name {actual}; expected {expected}")]
    FilenameMismatch {
        id: u32,
        actual: String,
        expected: String,
    },
}

async fn exists(path: &Path) -> bool {
    fs::metadata(path).await.is_ok()
}

/// Check the manifest and the files it refers to, returning every violation found.
pub async fn verify(layout: &Layout) -> Result<Vec<Violation>> {
    let manifest = ManifestStore::new(&layout.manifest).load().await?;

    let mut violations = Vec::new();
    let mut hashes = HashMap::new();
    let mut ids = HashMap::new();

    for (index, image) in manifest.images.iter().enumerate() {
        if let Some(&first) = hashes.get(&image.original_hash) {
            violations.push(Violation::DuplicateHash {
                hash: image.original_hash.clone(),
                first,
                second: image.id,
            });
        } else {
            hashes.insert(image.original_hash.clone(), image.id);
        }

        let count = ids.entry(image.id).or_insert(0);
        *count += 1;
        if *count == 2 {
            violations.push(Violation::DuplicateId(image.id));
        }

        if index > 0 && manifest.images[index - 1].taken_at < image.taken_at {
            violations.push(Violation::Unsorted(image.id));
        }

        for (actual, expected) in [
            (&image.filename, image_filename(image.id)),
            (&image.thumbnail_filename, thumbnail_filename(image.id)),
        ] {
            if *actual != expected {
                violations.push(Violation::FilenameMismatch {
                    id: image.id,
                    actual: actual.clone(),
                    expected,
                });
            }
        }

        for path in [
            layout.public_image_dir.join(&image.filename),
            layout.public_image_dir.join(&image.thumbnail_filename),
            layout.originals_dir.join(&image.original_path),
        ] {
            if !exists(&path).await {
                violations.push(Violation::MissingFile { id: image.id, path });
            }
        }

        let candidates = timezone::candidates(&image.location);

        if !candidates.contains(&image.timezone) {
            violations.push(Violation::TimezoneMismatch {
                id: image.id,
                actual: image.timezone.clone(),
                expected: candidates
                    .into_iter()
                    .next()
                    .unwrap_or_else(|| "nothing".into()),
            });
        }
    }

    Ok(violations)
}
