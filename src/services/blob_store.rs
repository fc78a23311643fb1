//! Local-filesystem blob store.
//!
//! A container is a directory under the configured root and a blob name is
//! the `/`-separated path of a file relative to that directory.

use super::{BlobLister, DocumentCracker, ListResult};
use crate::constants::PAGE_SEPARATOR;
use crate::error::{IndexerError, Result};
use crate::models::{BlobReference, Document};
use async_trait::async_trait;
use percent_encoding::percent_decode_str;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

const SERVICE: &str = "blob_store";

/// Lists files in lexicographic name order.
///
/// The continuation token is the last name served; the next segment starts
/// strictly after it.
#[derive(Debug, Clone)]
pub struct FsBlobLister {
    root: PathBuf,
    account: String,
}

impl FsBlobLister {
    pub fn new(root: impl Into<PathBuf>, account: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            account: account.into(),
        }
    }
}

#[async_trait]
impl BlobLister for FsBlobLister {
    async fn list(
        &self,
        container: &str,
        prefix: &str,
        continuation_token: Option<&str>,
        page_size: usize,
    ) -> Result<ListResult> {
        if page_size == 0 {
            return Err(IndexerError::configuration("page size must be at least 1"));
        }

        let container_dir = resolve(&self.root, container)?;
        let names = tokio::task::spawn_blocking(move || collect_names(&container_dir))
            .await
            .map_err(|e| IndexerError::service(SERVICE, format!("listing task failed: {e}")))?
            .map_err(|e| io_error("list", e))?;

        let mut matching = names
            .into_iter()
            .filter(|name| name.starts_with(prefix))
            .filter(|name| continuation_token.map_or(true, |token| name.as_str() > token));

        let selected: Vec<String> = matching.by_ref().take(page_size).collect();
        let has_more = matching.next().is_some();
        let next_token = if has_more { selected.last().cloned() } else { None };

        debug!(
            container = %container,
            prefix = %prefix,
            returned = selected.len(),
            has_more = has_more,
            "Listed blob segment"
        );

        Ok(ListResult {
            blobs: selected
                .into_iter()
                .map(|name| BlobReference::new(&self.account, container, name))
                .collect(),
            next_token,
        })
    }
}

/// Reads a UTF-8 text blob; pages are separated by form feeds
#[derive(Debug, Clone)]
pub struct TextFileCracker {
    root: PathBuf,
}

impl TextFileCracker {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl DocumentCracker for TextFileCracker {
    async fn crack(&self, blob: &BlobReference) -> Result<Document> {
        let path = resolve(&resolve(&self.root, &blob.container)?, &blob.name)?;
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| io_error("read", e))?;
        let absolute = tokio::fs::canonicalize(&path)
            .await
            .map_err(|e| io_error("resolve", e))?;
        let url = url::Url::from_file_path(&absolute)
            .map_err(|_| {
                IndexerError::service(SERVICE, format!("no file URL for {}", absolute.display()))
            })?
            .to_string();

        let pages = content.split(PAGE_SEPARATOR).map(str::to_string).collect();

        Ok(Document {
            pages,
            url,
            filename: display_filename(&blob.name),
            blob_ref: blob.clone(),
        })
    }
}

/// Percent-decoded last segment of a blob name
pub fn display_filename(blob_name: &str) -> String {
    let last = blob_name.rsplit('/').next().unwrap_or(blob_name);
    percent_decode_str(last).decode_utf8_lossy().into_owned()
}

fn resolve(base: &Path, relative: &str) -> Result<PathBuf> {
    let relative = Path::new(relative);
    let escapes = relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(IndexerError::service(
            SERVICE,
            format!("invalid blob path: {}", relative.display()),
        ));
    }
    Ok(base.join(relative))
}

fn collect_names(container_dir: &Path) -> io::Result<Vec<String>> {
    let mut names = Vec::new();
    let mut pending = vec![container_dir.to_path_buf()];

    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                pending.push(path);
                continue;
            }
            if let Ok(relative) = path.strip_prefix(container_dir) {
                let name = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                names.push(name);
            }
        }
    }

    names.sort();
    Ok(names)
}

fn io_error(action: &str, err: io::Error) -> IndexerError {
    match err.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock => {
            IndexerError::transient(SERVICE, format!("{action}: {err}"))
        }
        _ => IndexerError::service(SERVICE, format!("{action}: {err}")),
    }
}
