//! This module provides the [AltTextGenerator], which produces a short accessibility description for each imported
//! photo by asking a remote vision model, caching the result by content digest so that each photo is described at
//! most once no matter how often it is renamed or re-imported.
//!
//! Alt text is never worth failing an import over: any error from the model or its transport is logged and
//! replaced with [FALLBACK_ALT_TEXT].

use {
    crate::manifest,
    anyhow::{anyhow, Context, Result},
    futures::future::{BoxFuture, FutureExt},
    serde_derive::Deserialize,
    serde_json::json,
    std::{
        collections::HashMap,
        io::ErrorKind,
        path::{Path, PathBuf},
        sync::{Arc, Mutex},
        time::Duration,
    },
    tokio::{fs, task},
    tracing::{info, warn},
};

/// Description used whenever the model cannot provide one
pub const FALLBACK_ALT_TEXT: &str = "A photograph from the gallery.";

/// Instruction sent to the model along with each image
pub const PROMPT: &str = "Write alt text for this photograph for someone using a screen reader. \
                          Describe the subject and setting in one short sentence of at most 20 words, \
                          without starting with \"A photo of\" or \"An image of\". \
                          Respond with a JSON object of the form {\"alt_text\": \"...\"} and nothing else.";

const MAX_TOKENS: u32 = 300;

/// Something able to describe a JPEG image
pub trait AltTextClient: Send + Sync {
    fn describe<'a>(&'a self, jpeg: &'a [u8]) -> BoxFuture<'a, Result<String>>;
}

/// Client used when no API key is configured; it never describes anything.
pub struct DisabledClient;

impl AltTextClient for DisabledClient {
    fn describe<'a>(&'a self, _jpeg: &'a [u8]) -> BoxFuture<'a, Result<String>> {
        async move { Err(anyhow!("alt text service disabled (no API key)")) }.boxed()
    }
}

/// Client for an OpenAI-compatible chat completions endpoint with image input
pub struct OpenAiClient {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: String,
}

impl OpenAiClient {
    pub fn new(endpoint: &str, model: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            url: format!("{}/chat/completions", endpoint.trim_end_matches('/')),
            model: model.to_owned(),
            api_key: api_key.to_owned(),
        })
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Description {
    alt_text: String,
}

impl AltTextClient for OpenAiClient {
    fn describe<'a>(&'a self, jpeg: &'a [u8]) -> BoxFuture<'a, Result<String>> {
        async move {
            let body = json!({
                "model": self.model,
                "max_tokens": MAX_TOKENS,
                "response_format": { "type": "json_object" },
                "messages": [{
                    "role": "user",
                    "content": [
                        { "type": "text", "text": PROMPT },
                        {
                            "type": "image_url",
                            "image_url": {
                                "url": format!("data:image/jpeg;base64,{}", base64::encode(jpeg))
                            }
                        }
                    ]
                }]
            });

            let response = self
                .client
                .post(&self.url)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await?
                .error_for_status()?
                .json::<ChatResponse>()
                .await?;

            let content = response
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.message.content)
                .ok_or_else(|| anyhow!("response contained no message content"))?;

            parse_reply(&content)
        }
        .boxed()
    }
}

/// Extract the description from a model reply of the form `{"alt_text": "..."}`.
///
/// Models sometimes wrap JSON in a Markdown code fence despite being asked not to, so that is tolerated.
pub fn parse_reply(content: &str) -> Result<String> {
    let content = content.trim();

    let content = content
        .strip_prefix("```json")
        .or_else(|| content.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(content);

    let description = serde_json::from_str::<Description>(content.trim())
        .with_context(|| format!("unable to parse reply: {}", content))?;

    let alt_text = description.alt_text.trim();

    if alt_text.is_empty() {
        Err(anyhow!("reply contained empty alt text"))
    } else {
        Ok(alt_text.to_owned())
    }
}

/// Key-value store mapping content digests to previously generated alt text
pub trait AltTextStore: Send + Sync {
    fn get<'a>(&'a self, digest: &'a str) -> BoxFuture<'a, Result<Option<String>>>;

    fn put<'a>(&'a self, digest: &'a str, alt_text: &'a str) -> BoxFuture<'a, Result<()>>;
}

/// [AltTextStore] backed by one text file per digest
///
/// Entries are replaced atomically.  An empty entry (e.g. one truncated by a crash) counts as missing.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_owned(),
        }
    }

    /// Path of the cache file for `digest`, e.g. "sha256_2cf24dba....txt"
    pub fn path(&self, digest: &str) -> PathBuf {
        self.dir.join(format!("{}.txt", digest.replace(':', "_")))
    }
}

impl AltTextStore for FileStore {
    fn get<'a>(&'a self, digest: &'a str) -> BoxFuture<'a, Result<Option<String>>> {
        async move {
            match fs::read_to_string(self.path(digest)).await {
                Ok(alt_text) if alt_text.trim().is_empty() => Ok(None),
                Ok(alt_text) => Ok(Some(alt_text)),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
                Err(e) => Err(e.into()),
            }
        }
        .boxed()
    }

    fn put<'a>(&'a self, digest: &'a str, alt_text: &'a str) -> BoxFuture<'a, Result<()>> {
        async move {
            let path = self.path(digest);

            task::block_in_place(|| manifest::write_atomically(&path, alt_text.as_bytes()))
                .with_context(|| format!("unable to write {}", path.display()))
        }
        .boxed()
    }
}

/// In-memory [AltTextStore]
#[derive(Default)]
pub struct MemoryStore(Mutex<HashMap<String, String>>);

impl MemoryStore {
    pub fn len(&self) -> usize {
        self.0.lock().map(|map| map.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AltTextStore for MemoryStore {
    fn get<'a>(&'a self, digest: &'a str) -> BoxFuture<'a, Result<Option<String>>> {
        async move {
            Ok(self
                .0
                .lock()
                .map_err(|_| anyhow!("poisoned lock"))?
                .get(digest)
                .cloned())
        }
        .boxed()
    }

    fn put<'a>(&'a self, digest: &'a str, alt_text: &'a str) -> BoxFuture<'a, Result<()>> {
        async move {
            self.0
                .lock()
                .map_err(|_| anyhow!("poisoned lock"))?
                .insert(digest.to_owned(), alt_text.to_owned());

            Ok(())
        }
        .boxed()
    }
}

/// Read-through, write-through cache in front of an [AltTextClient]
#[derive(Clone)]
pub struct AltTextGenerator {
    client: Arc<dyn AltTextClient>,
    store: Arc<dyn AltTextStore>,
}

impl AltTextGenerator {
    pub fn new(client: Arc<dyn AltTextClient>, store: Arc<dyn AltTextStore>) -> Self {
        Self { client, store }
    }

    /// Describe the image `jpeg` whose source file has the specified `digest`.
    ///
    /// This never fails; see the module documentation.
    pub async fn generate(&self, jpeg: &[u8], digest: &str) -> String {
        match self.store.get(digest).await {
            Ok(Some(alt_text)) => {
                info!("using cached alt text for {}", digest);

                return alt_text;
            }
            Ok(None) => (),
            Err(e) => warn!("unable to read cached alt text for {}: {:#}", digest, e),
        }

        match self.client.describe(jpeg).await {
            Ok(alt_text) => {
                if let Err(e) = self.store.put(digest, &alt_text).await {
                    warn!("unable to cache alt text for {}: {:#}", digest, e);
                }

                alt_text
            }

            Err(e) => {
                warn!(
                    "unable to generate alt text for {}; using fallback: {:#}",
                    digest, e
                );

                FALLBACK_ALT_TEXT.to_owned()
            }
        }
    }
}
