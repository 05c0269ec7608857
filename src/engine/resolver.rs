//! Resolves a URL into one item or a collection using the engine's metadata mode

use crate::error::ResolveError;
use crate::types::ItemDescriptor;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use super::Engine;
use super::args::metadata_args;
use super::classify::classify_error;

/// A single media item with full metadata
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResolvedItem {
    /// Platform identifier
    pub id: Option<String>,
    /// Title
    pub title: String,
    /// Page URL to hand back to the engine
    pub url: String,
    /// Thumbnail URL
    pub thumbnail: Option<String>,
    /// Duration in seconds
    pub duration: Option<f64>,
    /// Uploader or channel name
    pub uploader: Option<String>,
}

impl ResolvedItem {
    /// Descriptor used to enqueue this item
    pub fn descriptor(&self) -> ItemDescriptor {
        ItemDescriptor {
            source_url: self.url.clone(),
            title: self.title.clone(),
            thumbnail: self.thumbnail.clone(),
            external_id: self.id.clone(),
        }
    }
}

/// An ordered set of lightweight entries (a playlist)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResolvedCollection {
    /// Playlist title
    pub title: String,
    /// Entries in playlist order
    pub entries: Vec<ItemDescriptor>,
}

/// Result of resolving a URL
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resolution {
    /// Exactly one item
    Item(ResolvedItem),
    /// A playlist of entries
    Collection(ResolvedCollection),
}

impl Resolution {
    /// Descriptors to enqueue, in order
    pub fn descriptors(&self) -> Vec<ItemDescriptor> {
        match self {
            Resolution::Item(item) => vec![item.descriptor()],
            Resolution::Collection(collection) => collection.entries.clone(),
        }
    }

    /// Number of items that would be enqueued
    pub fn len(&self) -> usize {
        match self {
            Resolution::Item(_) => 1,
            Resolution::Collection(collection) => collection.entries.len(),
        }
    }

    /// True for a collection without entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawEntry {
    #[serde(rename = "_type")]
    kind: Option<String>,
    id: Option<String>,
    title: Option<String>,
    url: Option<String>,
    webpage_url: Option<String>,
    original_url: Option<String>,
    thumbnail: Option<String>,
    thumbnails: Vec<RawThumbnail>,
    duration: Option<f64>,
    uploader: Option<String>,
    channel: Option<String>,
    playlist_title: Option<String>,
    playlist: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawThumbnail {
    url: Option<String>,
}

impl RawEntry {
    fn is_reference(&self) -> bool {
        matches!(self.kind.as_deref(), Some("url") | Some("playlist"))
    }

    fn best_thumbnail(&self) -> Option<String> {
        self.thumbnail
            .clone()
            .or_else(|| self.thumbnails.iter().rev().find_map(|t| t.url.clone()))
    }

    fn title_or_default(&self) -> String {
        self.title.clone().unwrap_or_else(|| "Unknown".to_string())
    }
}

/// Runs the engine in metadata mode
#[derive(Clone, Debug)]
pub struct Resolver {
    engine: Engine,
}

impl Resolver {
    /// Create a resolver for the given engine
    pub fn new(engine: Engine) -> Self {
        Self { engine }
    }

    /// Resolve `url` into an item or a collection
    pub async fn resolve(
        &self,
        url: &str,
        credential: Option<&Path>,
    ) -> Result<Resolution, ResolveError> {
        let binary = self.engine.binary();
        let args = metadata_args(self.engine.settings(), url, credential);
        let timeout = self.engine.config().resolve_timeout;

        tracing::debug!(url, binary = %binary.display(), "resolving metadata");

        let output = tokio::time::timeout(
            timeout,
            Command::new(&binary)
                .args(&args)
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| {
            ResolveError::Engine(format!("metadata lookup timed out after {:?}", timeout))
        })?
        .map_err(|e| ResolveError::Engine(format!("failed to start {}: {}", binary.display(), e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        let result = interpret_output(
            url,
            &stdout,
            &stderr,
            &self.engine.config().fallback_url_prefix,
        );
        match &result {
            Ok(resolution) => {
                tracing::info!(url, items = resolution.len(), "resolved URL");
            }
            Err(e) => {
                tracing::warn!(url, error = %e, "failed to resolve URL");
            }
        }
        result
    }
}

/// Turn metadata-mode output into a [`Resolution`]
pub fn interpret_output(
    url: &str,
    stdout: &str,
    stderr: &str,
    fallback_url_prefix: &str,
) -> Result<Resolution, ResolveError> {
    let entries: Vec<RawEntry> = stdout
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with('{'))
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect();

    if entries.is_empty() {
        let diagnostic = stderr
            .lines()
            .filter(|line| line.contains("ERROR"))
            .collect::<Vec<_>>()
            .join("\n");
        let diagnostic = if diagnostic.is_empty() {
            stderr.trim()
        } else {
            diagnostic.trim()
        };
        return if diagnostic.is_empty() {
            Err(ResolveError::NoMetadata)
        } else {
            Err(classify_error(diagnostic))
        };
    }

    if let [single] = entries.as_slice()
        && !single.is_reference()
    {
        return Ok(Resolution::Item(ResolvedItem {
            id: single.id.clone(),
            title: single.title_or_default(),
            url: single
                .webpage_url
                .clone()
                .or_else(|| single.original_url.clone())
                .or_else(|| single.url.clone())
                .unwrap_or_else(|| url.to_string()),
            thumbnail: single.best_thumbnail(),
            duration: single.duration,
            uploader: single.uploader.clone().or_else(|| single.channel.clone()),
        }));
    }

    let title = entries
        .first()
        .and_then(|e| e.playlist_title.clone().or_else(|| e.playlist.clone()))
        .unwrap_or_else(|| "Playlist".to_string());

    let entries = entries
        .iter()
        .filter_map(|entry| {
            let source_url = entry
                .url
                .clone()
                .or_else(|| entry.webpage_url.clone())
                .or_else(|| entry.id.as_ref().map(|id| format!("{fallback_url_prefix}{id}")));
            match source_url {
                Some(source_url) => Some(ItemDescriptor {
                    source_url,
                    title: entry.title_or_default(),
                    thumbnail: entry.best_thumbnail(),
                    external_id: entry.id.clone(),
                }),
                None => {
                    tracing::warn!(title = ?entry.title, "skipping collection entry without URL or id");
                    None
                }
            }
        })
        .collect();

    Ok(Resolution::Collection(ResolvedCollection { title, entries }))
}
