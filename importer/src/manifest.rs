use {
    anyhow::{Context, Result},
    gallery_shared::Manifest,
    std::{
        fs::Permissions,
        io::{ErrorKind, Write},
        path::{Path, PathBuf},
    },
    tempfile::NamedTempFile,
    tokio::{fs, task},
};

/// Mode given to newly created documents, which other users (e.g. a web server) must be able to read
#[cfg(unix)]
const DEFAULT_MODE: u32 = 0o644;

/// Permissions of the existing file at `path`, or the default for a new document if there is none.
#[cfg(unix)]
fn permissions(path: &Path) -> Option<Permissions> {
    use std::os::unix::fs::PermissionsExt;

    Some(
        std::fs::metadata(path)
            .map(|metadata| metadata.permissions())
            .unwrap_or_else(|_| Permissions::from_mode(DEFAULT_MODE)),
    )
}

#[cfg(not(unix))]
fn permissions(path: &Path) -> Option<Permissions> {
    std::fs::metadata(path)
        .ok()
        .map(|metadata| metadata.permissions())
}

/// Replace the file at `path` with `content` such that readers see either the old content or the new content in
/// full, never a partial write.
///
/// The content is written to a temporary file in the same directory and renamed over `path`.  The replacement keeps
/// the permissions of the file it replaces.  This blocks, so async callers should use `task::block_in_place`.
pub fn write_atomically(path: &Path, content: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_owned(),
        _ => PathBuf::from("."),
    };

    std::fs::create_dir_all(&dir)?;

    let mut file = NamedTempFile::new_in(&dir)?;

    file.write_all(content)?;

    if let Some(permissions) = permissions(path) {
        file.as_file().set_permissions(permissions)?;
    }

    file.as_file().sync_all()?;

    file.persist(path).map_err(|e| e.error)?;

    Ok(())
}

/// Reads and atomically rewrites the manifest document
#[derive(Debug, Clone)]
pub struct ManifestStore {
    path: PathBuf,
}

impl ManifestStore {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_owned(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the manifest, or return an empty one if it does not exist yet.
    pub async fn load(&self) -> Result<Manifest> {
        match fs::read(&self.path).await {
            Ok(content) => serde_json::from_slice(&content)
                .with_context(|| format!("unable to parse {}", self.path.display())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Manifest::default()),
            Err(e) => {
                Err(e).with_context(|| format!("unable to read {}", self.path.display()))
            }
        }
    }

    /// Sort `manifest` newest first and replace the document with it.
    ///
    /// See [write_atomically] for the guarantees readers get.
    pub async fn save(&self, manifest: &mut Manifest) -> Result<()> {
        manifest.sort();

        let mut content = serde_json::to_vec_pretty(manifest)?;
        content.push(b'\n');

        task::block_in_place(|| write_atomically(&self.path, &content))
            .with_context(|| format!("unable to write {}", self.path.display()))
    }
}
