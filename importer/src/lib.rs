#![deny(warnings)]

use {
    anyhow::Result,
    std::{
        path::{Path, PathBuf},
        sync::Arc,
        time::Duration,
    },
    structopt::StructOpt,
    tokio::fs,
    tracing::warn,
};

pub use {
    alt_text::{
        AltTextClient, AltTextGenerator, AltTextStore, DisabledClient, FileStore, MemoryStore,
        OpenAiClient, FALLBACK_ALT_TEXT,
    },
    error::ImportError,
    import::{Importer, Summary},
    manifest::ManifestStore,
    native::{NativeMetadata, NativeMode},
    verify::{verify, Violation},
};

pub mod alt_text;
pub mod derivatives;
mod error;
pub mod hash;
pub mod import;
pub mod manifest;
pub mod metadata;
pub mod native;
pub mod normalize;
pub mod timezone;
mod verify;

#[cfg(test)]
mod test_util;

const BUFFER_SIZE: usize = 16 * 1024;

/// Gallery paths, relative to the gallery root
const MANIFEST_PATH: &str = "data/images.json";
const PUBLIC_IMAGE_DIR: &str = "public/images";
const ORIGINALS_DIR: &str = "originals";
const ALT_TEXT_CACHE_DIR: &str = ".cache/alt-text";

#[derive(StructOpt, Debug)]
pub struct Options {
    /// Gallery root directory, containing the manifest, public images, originals, and caches
    #[structopt(long, default_value = ".", parse(from_os_str))]
    pub root: PathBuf,

    /// Whether to use the platform metadata query and converter for HEIC files: auto, on, or off
    #[structopt(long, default_value = "auto")]
    pub native_metadata: NativeMode,

    /// API key for the alt text service.  If not specified, every image receives the fallback alt text.
    #[structopt(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Vision model used to generate alt text
    #[structopt(long, default_value = "gpt-4o-mini")]
    pub model: String,

    /// Base URL of the OpenAI-compatible alt text service
    #[structopt(long, default_value = "https://api.openai.com/v1")]
    pub endpoint: String,

    /// Maximum number of seconds to wait for the alt text service to respond
    #[structopt(long, default_value = "60")]
    pub timeout_secs: u64,
}

impl Options {
    /// Build an [Importer] for the gallery described by these options.
    pub fn importer(&self) -> Result<Importer> {
        let layout = Layout::new(&self.root);

        let client: Arc<dyn AltTextClient> = if let Some(api_key) = &self.api_key {
            Arc::new(OpenAiClient::new(
                &self.endpoint,
                &self.model,
                api_key,
                Duration::from_secs(self.timeout_secs),
            )?)
        } else {
            warn!("no API key configured; every image will receive fallback alt text");

            Arc::new(DisabledClient)
        };

        let store = Arc::new(FileStore::new(&layout.alt_text_cache_dir));

        Ok(Importer::new(
            layout,
            self.native_metadata.resolve(),
            AltTextGenerator::new(client, store),
        ))
    }
}

/// Locations of everything the importer reads and writes
#[derive(Debug, Clone)]
pub struct Layout {
    /// The manifest document
    pub manifest: PathBuf,

    /// Directory to which derivative images are written
    pub public_image_dir: PathBuf,

    /// Directory holding byte-identical copies of imported source files
    pub originals_dir: PathBuf,

    /// Directory holding one cached alt text file per content digest
    pub alt_text_cache_dir: PathBuf,
}

impl Layout {
    pub fn new(root: &Path) -> Self {
        Self {
            manifest: root.join(MANIFEST_PATH),
            public_image_dir: root.join(PUBLIC_IMAGE_DIR),
            originals_dir: root.join(ORIGINALS_DIR),
            alt_text_cache_dir: root.join(ALT_TEXT_CACHE_DIR),
        }
    }

    /// Create any output directories which do not yet exist.
    pub async fn create_dirs(&self) -> Result<()> {
        if let Some(parent) = self.manifest.parent() {
            fs::create_dir_all(parent).await?;
        }

        fs::create_dir_all(&self.public_image_dir).await?;
        fs::create_dir_all(&self.originals_dir).await?;
        fs::create_dir_all(&self.alt_text_cache_dir).await?;

        Ok(())
    }
}
