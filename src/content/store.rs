use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::config::ContentConfig;

#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    #[error("{0} file not found")]
    NotFound(String),
    #[error("{file} is not valid: {reason}")]
    Malformed { file: String, reason: String },
    #[error("reading {file} failed: {reason}")]
    Io { file: String, reason: String },
}

/// News items grouped by category, in document order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewsDocument {
    categories: Vec<(String, Vec<Value>)>,
}

impl NewsDocument {
    /// Accepts `{ "<category>": [item, ...], ... }`.
    pub fn from_value(value: Value, file: &str) -> Result<Self, ContentError> {
        let Value::Object(map) = value else {
            return Err(ContentError::Malformed {
                file: file.to_string(),
                reason: "top level must be an object of category arrays".into(),
            });
        };
        let mut categories = Vec::with_capacity(map.len());
        for (name, items) in map {
            match items {
                Value::Array(items) => categories.push((name, items)),
                _ => {
                    return Err(ContentError::Malformed {
                        file: file.to_string(),
                        reason: format!("category {name:?} is not an array"),
                    })
                }
            }
        }
        Ok(Self { categories })
    }

    /// `all` flattens every category in order; an unknown category is empty.
    pub fn select(&self, category: &str) -> Vec<Value> {
        if category == "all" {
            return self
                .categories
                .iter()
                .flat_map(|(_, items)| items.iter().cloned())
                .collect();
        }
        self.categories
            .iter()
            .find(|(name, _)| name == category)
            .map(|(_, items)| items.clone())
            .unwrap_or_default()
    }

    pub fn category_names(&self) -> impl Iterator<Item = &str> {
        self.categories.iter().map(|(name, _)| name.as_str())
    }
}

/// Read-only source of the pre-built news and market documents.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn news(&self) -> Result<NewsDocument, ContentError>;
    async fn market_summary(&self) -> Result<Value, ContentError>;
}

/// Reads the documents from disk on every call; they are regenerated out of band.
#[derive(Debug, Clone)]
pub struct FsContentStore {
    dir: PathBuf,
    news_file: String,
    market_summary_file: String,
}

impl FsContentStore {
    pub fn new(cfg: &ContentConfig) -> Self {
        Self {
            dir: cfg.dir.clone(),
            news_file: cfg.news_file.clone(),
            market_summary_file: cfg.market_summary_file.clone(),
        }
    }

    async fn read_json(&self, file: &str) -> Result<Value, ContentError> {
        let path = self.dir.join(file);
        let raw = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ContentError::NotFound(file.to_string()),
            _ => ContentError::Io {
                file: file.to_string(),
                reason: e.to_string(),
            },
        })?;
        debug!(path = %path.display(), bytes = raw.len(), "content file read");
        serde_json::from_slice(&raw).map_err(|e| ContentError::Malformed {
            file: file.to_string(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl ContentStore for FsContentStore {
    async fn news(&self) -> Result<NewsDocument, ContentError> {
        let value = self.read_json(&self.news_file).await?;
        NewsDocument::from_value(value, &self.news_file)
    }

    async fn market_summary(&self) -> Result<Value, ContentError> {
        self.read_json(&self.market_summary_file).await
    }
}
