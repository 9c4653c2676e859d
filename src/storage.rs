// src/storage.rs
use crate::errors::{RelayError, Result};
use futures::{Stream, StreamExt};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tokio::io::AsyncWriteExt;

static UNSAFE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9._-]").expect("valid regex"));

/// A video persisted to the upload directory.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedFile {
    /// The filename as sent by the client.
    pub original_name: String,
    /// The sanitized name the file was written under.
    pub file_name: String,
    pub path: PathBuf,
}

/// Reduce a client-supplied filename to a single safe path component.
///
/// Directory parts are dropped (both separators count) and anything outside
/// `[A-Za-z0-9._-]` becomes `_`.
pub fn sanitize_filename(raw: &str) -> Result<String> {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    let cleaned = UNSAFE_CHARS.replace_all(base, "_").into_owned();

    match cleaned.as_str() {
        "" | "." | ".." => Err(RelayError::InvalidFilename(raw.to_string())),
        _ => Ok(cleaned),
    }
}

/// Stream `chunks` to `dir` under the sanitized form of `original_name`.
///
/// The body goes to a temporary file first and is renamed into place once the
/// stream ends, so an existing file with the same name is replaced only by a
/// complete upload. A failed stream leaves nothing behind.
pub async fn store_upload<S, B, E>(dir: &Path, original_name: &str, chunks: S) -> Result<UploadedFile>
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    RelayError: From<E>,
{
    let file_name = sanitize_filename(original_name)?;
    tokio::fs::create_dir_all(dir).await?;

    let path = dir.join(&file_name);
    let partial = dir.join(format!(".{}.{}.part", file_name, uuid::Uuid::new_v4()));

    let written = match write_chunks(&partial, chunks).await {
        Ok(written) => written,
        Err(e) => {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e);
        }
    };
    if let Err(e) = tokio::fs::rename(&partial, &path).await {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(e.into());
    }
    log::info!("Stored upload {} ({} bytes)", path.display(), written);

    Ok(UploadedFile {
        original_name: original_name.to_string(),
        file_name,
        path,
    })
}

async fn write_chunks<S, B, E>(path: &Path, chunks: S) -> Result<u64>
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    RelayError: From<E>,
{
    let mut file = tokio::fs::File::create(path).await?;
    let mut written = 0u64;

    tokio::pin!(chunks);
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk?;
        file.write_all(chunk.as_ref()).await?;
        written += chunk.as_ref().len() as u64;
    }
    file.flush().await?;
    Ok(written)
}
