//! Content digests used both to deduplicate imports and to key the alt text cache.

use {
    anyhow::{Context, Result},
    sha2::{Digest, Sha256},
    std::path::Path,
    tokio::{
        fs::File,
        io::{AsyncRead, AsyncReadExt},
    },
};

/// Prefix identifying the digest algorithm in every digest string
pub const ALGORITHM: &str = "sha256";

/// Compute the digest of everything readable from `input`, e.g. "sha256:2cf24dba...".
pub async fn hash(input: &mut (dyn AsyncRead + Unpin + Send)) -> Result<String> {
    let mut hasher = Sha256::default();

    let mut buffer = vec![0; crate::BUFFER_SIZE];

    loop {
        let count = input.read(&mut buffer[..]).await?;
        if count == 0 {
            break;
        } else {
            hasher.update(&buffer[0..count]);
        }
    }

    Ok(format!("{}:{}", ALGORITHM, hex::encode(hasher.finalize())))
}

/// Compute the digest of the contents of the file at `path`.
pub async fn hash_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)
        .await
        .with_context(|| format!("unable to open {}", path.display()))?;

    hash(&mut file).await
}

#[cfg(test)]
mod test {
    use {super::*, tempfile::TempDir, tokio::fs};

    #[tokio::test]
    async fn known_digest() -> Result<()> {
        assert_eq!(
            "sha256:2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824",
            hash(&mut &b"hello"[..]).await?
        );

        Ok(())
    }

    #[tokio::test]
    async fn stable_across_renames() -> Result<()> {
        let dir = TempDir::new()?;
        let before = dir.path().join("IMG_0001.jpg");
        let after = dir.path().join("renamed.jpg");

        // Larger than one buffer so the digest spans several reads.
        let content = (0..crate::BUFFER_SIZE * 3 + 17)
            .map(|i| (i % 251) as u8)
            .collect::<Vec<_>>();

        fs::write(&before, &content).await?;

        let first = hash_file(&before).await?;
        assert_eq!(first, hash_file(&before).await?);
        assert_eq!(first, hash(&mut &content[..]).await?);

        fs::rename(&before, &after).await?;
        assert_eq!(first, hash_file(&after).await?);

        Ok(())
    }

    #[tokio::test]
    async fn unreadable_file() {
        assert!(hash_file(Path::new("does-not-exist-6c1e0a3a.jpg"))
            .await
            .is_err());
    }
}
