//! This module provides the [Importer], which brings new photos from a source directory into the gallery.
//!
//! Each file passes through the following stages, any of which (after hashing) may fail.  A failure aborts only
//! that file; the batch always runs to completion and the manifest is rewritten exactly once at the end.
//!
//! 1. hash the file, skipping it if the digest is already in the manifest (including earlier in this batch)
//! 2. normalize it into an upright working image
//! 3. extract its capture time, location, and dimensions, and resolve the location's time zone
//! 4. write the full-size and thumbnail derivatives
//! 5. generate (or recall) its alt text
//! 6. archive the original and append a record to the manifest

use {
    crate::{
        alt_text::AltTextGenerator,
        derivatives::{self, Derivatives},
        error::ImportError,
        hash,
        manifest::ManifestStore,
        metadata,
        native::NativeMetadata,
        normalize::{self, SourceFormat},
        timezone, Layout,
    },
    anyhow::{Context, Result},
    chrono::Utc,
    gallery_shared::{image_filename, thumbnail_filename, ImageRecord},
    image::GenericImageView,
    std::{
        collections::HashSet,
        fmt::{self, Display},
        path::{Path, PathBuf},
        time::Instant,
    },
    tokio::fs,
    tracing::{info, warn},
};

/// Stage at which an import failed, reported along with the underlying error
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Stage {
    Hashing,
    Archiving,
    Normalizing,
    ExtractingMetadata,
    ResolvingTimezone,
    WritingDerivatives,
}

impl Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Hashing => "hashing",
            Self::Archiving => "archiving original",
            Self::Normalizing => "normalizing",
            Self::ExtractingMetadata => "extracting metadata",
            Self::ResolvingTimezone => "resolving time zone",
            Self::WritingDerivatives => "writing derivatives",
        })
    }
}

enum Outcome {
    Imported(Box<ImageRecord>),
    Duplicate(String),
}

/// Counts reported at the end of a batch
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct Summary {
    pub imported: usize,

    /// Files whose content was already in the gallery
    pub skipped: usize,

    pub failed: usize,

    /// Number of records in the manifest after the batch
    pub total: usize,
}

impl Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "imported {}; skipped {}; failed {}; manifest now holds {} images",
            self.imported, self.skipped, self.failed, self.total
        )
    }
}

/// List the importable files directly inside `dir`, sorted by name.
pub async fn scan(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir)
        .await
        .with_context(|| format!("unable to read {}", dir.display()))?;

    let mut result = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();

        if entry.file_type().await?.is_file() && SourceFormat::from_path(&path).is_some() {
            result.push(path);
        }
    }

    result.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    Ok(result)
}

pub struct Importer {
    layout: Layout,
    native: NativeMetadata,
    alt_text: AltTextGenerator,
}

impl Importer {
    pub fn new(layout: Layout, native: NativeMetadata, alt_text: AltTextGenerator) -> Self {
        Self {
            layout,
            native,
            alt_text,
        }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Import every new photo in `source_dir`, then rewrite the manifest.
    ///
    /// Fails without touching anything if `source_dir` is not a directory.  Failures of individual files are
    /// logged and counted in the returned [Summary] rather than returned.
    pub async fn import(&self, source_dir: &Path) -> Result<Summary> {
        if !fs::metadata(source_dir)
            .await
            .map(|metadata| metadata.is_dir())
            .unwrap_or(false)
        {
            return Err(ImportError::SourceDirectory(source_dir.to_owned()).into());
        }

        info!("starting import from {}", source_dir.display());

        let then = Instant::now();

        self.layout.create_dirs().await?;

        let store = ManifestStore::new(&self.layout.manifest);
        let mut manifest = store.load().await?;
        let mut hashes = manifest.hashes();
        let mut next_id = manifest.next_id();

        let files = scan(source_dir).await?;
        let count = files.len();

        let mut summary = Summary::default();

        for (index, path) in files.iter().enumerate() {
            info!("({} of {}) importing {}", index + 1, count, path.display());

            match self.import_file(path, &hashes, next_id).await {
                Ok(Outcome::Imported(record)) => {
                    info!(
                        "({} of {}) imported {} as {} (taken {} in {})",
                        index + 1,
                        count,
                        path.display(),
                        record.filename,
                        record.taken_at,
                        record.timezone
                    );

                    hashes.insert(record.original_hash.clone());
                    next_id += 1;
                    manifest.images.push(*record);
                    summary.imported += 1;
                }

                Ok(Outcome::Duplicate(digest)) => {
                    info!(
                        "({} of {}) skipping {}: already imported (hash {})",
                        index + 1,
                        count,
                        path.display(),
                        digest
                    );

                    summary.skipped += 1;
                }

                Err(e) => {
                    warn!(
                        "({} of {}) failed to import {}: {:#}",
                        index + 1,
                        count,
                        path.display(),
                        e
                    );

                    summary.failed += 1;
                }
            }
        }

        store.save(&mut manifest).await?;

        summary.total = manifest.images.len();

        info!("import took {:?} ({})", then.elapsed(), summary);

        Ok(summary)
    }

    async fn import_file(
        &self,
        path: &Path,
        hashes: &HashSet<String>,
        id: u32,
    ) -> Result<Outcome> {
        let digest = hash::hash_file(path).await.context(Stage::Hashing)?;

        if hashes.contains(&digest) {
            return Ok(Outcome::Duplicate(digest));
        }

        let format = SourceFormat::from_path(path)
            .ok_or_else(|| ImportError::UnsupportedFormat(path.into()))?;

        let (original_path, archive) = self
            .archive_destination(path, &digest)
            .await
            .context(Stage::Archiving)?;

        // Holds the converted copy of a HEIC source, if any, until this function returns.
        let normalized = normalize::normalize(self.native, path, format)
            .await
            .context(Stage::Normalizing)?;

        let metadata = metadata::extract(self.native, path, &normalized)
            .await
            .context(Stage::ExtractingMetadata)?;

        let timezone = timezone::resolve(&metadata.location).context(Stage::ResolvingTimezone)?;

        let (width, height) = normalized.image.dimensions();

        if let Some(dimensions) = metadata.dimensions {
            if dimensions != (width, height) {
                warn!(
                    "{} reports dimensions {:?} but decodes to {:?}; using the latter",
                    path.display(),
                    dimensions,
                    (width, height)
                );
            }
        }

        let derivatives = derivatives::write(&self.layout.public_image_dir, id, &normalized.image)
            .await
            .context(Stage::WritingDerivatives)?;

        let alt_text = self.alt_text.generate(&derivatives.full_jpeg, &digest).await;

        if let Some(archive) = archive {
            archive_original(path, &archive, &derivatives)
                .await
                .context(Stage::Archiving)?;
        }

        Ok(Outcome::Imported(Box::new(ImageRecord {
            id,
            filename: image_filename(id),
            thumbnail_filename: thumbnail_filename(id),
            original_path,
            original_hash: digest,
            taken_at: metadata.taken_at,
            imported_at: Utc::now(),
            width,
            height,
            location: metadata.location,
            timezone,
            alt_text,
            description: String::new(),
            tags: Vec::new(),
        })))
    }

    /// Determine the base name under which `path` is archived and where to copy it, if anywhere.
    ///
    /// No copy is needed if `path` already lives in the originals folder or an identical copy is already there.  A
    /// different file of the same name in the originals folder is an [ImportError::ArchiveConflict].
    async fn archive_destination(
        &self,
        path: &Path,
        digest: &str,
    ) -> Result<(String, Option<PathBuf>)> {
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .with_context(|| format!("file name of {} is not valid UTF-8", path.display()))?
            .to_owned();

        let originals = fs::canonicalize(&self.layout.originals_dir).await?;

        if let Some(parent) = path.parent() {
            let parent = if parent.as_os_str().is_empty() {
                Path::new(".")
            } else {
                parent
            };

            if fs::canonicalize(parent).await? == originals {
                return Ok((name, None));
            }
        }

        let destination = originals.join(&name);

        if fs::metadata(&destination).await.is_ok() {
            if hash::hash_file(&destination).await? == digest {
                Ok((name, None))
            } else {
                Err(ImportError::ArchiveConflict(name).into())
            }
        } else {
            Ok((name, Some(destination)))
        }
    }
}

/// Copy `source` to `archive`.
///
/// On failure, the already written `derivatives` and any partial copy are removed, since no record will refer to
/// them.
async fn archive_original(
    source: &Path,
    archive: &Path,
    derivatives: &Derivatives,
) -> Result<()> {
    if let Err(e) = fs::copy(source, archive).await {
        for path in [&derivatives.full, &derivatives.thumbnail] {
            if let Err(e) = fs::remove_file(path).await {
                warn!("unable to remove {}: {}", path.display(), e);
            }
        }

        let _ = fs::remove_file(archive).await;

        return Err(e).with_context(|| format!("unable to copy to {}", archive.display()));
    }

    Ok(())
}
