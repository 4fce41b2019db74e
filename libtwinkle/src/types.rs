//! Core types for Twinklecast

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// A lockable, exportable product entry in the catalog.
///
/// `locked` is a one-way transition: once an entry is locked it can no
/// longer be edited, only exported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub product_code: String,
    pub ring_name: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    pub image_path: String,
    #[serde(default)]
    pub locked: bool,
}

impl CatalogEntry {
    pub fn new(product_code: impl Into<String>, ring_name: impl Into<String>, image_path: impl Into<String>) -> Self {
        Self {
            product_code: product_code.into(),
            ring_name: ring_name.into(),
            attributes: BTreeMap::new(),
            image_path: image_path.into(),
            locked: false,
        }
    }

    /// Directory-safe export name: ring name with whitespace replaced.
    pub fn export_name(&self) -> String {
        self.ring_name.split_whitespace().collect::<Vec<_>>().join("_")
    }
}

/// A promotional offer merged into a post's text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deal {
    pub product: String,
    pub price: String,
    pub discount: String,
    pub link: String,
}

impl Deal {
    /// Hashtag derived from the product name, whitespace stripped.
    pub fn hashtag(&self) -> String {
        let name: String = self.product.split_whitespace().collect();
        format!("#{}", name)
    }
}

/// Snapshot of all reusable content, in insertion order.
///
/// Selection rounds operate on a snapshot so that concurrent appends
/// never affect an in-flight round.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FragmentSet {
    pub quotes: Vec<String>,
    pub texts: Vec<String>,
    pub symbols: Vec<String>,
    pub deals: Vec<Deal>,
    pub pictures: Vec<String>,
}

impl FragmentSet {
    /// True when no text fragment of any kind is available.
    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty() && self.texts.is_empty() && self.symbols.is_empty()
    }
}

/// A fully composed post, immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComposedPost {
    pub body: String,
    pub deal: Option<Deal>,
    pub picture: Option<String>,
    pub created_at: i64,
}

/// Status of a scheduled job.
///
/// Legal transitions are Pending -> Running -> {Succeeded, Pending, Failed};
/// Succeeded and Failed are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Succeeded => write!(f, "succeeded"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One scheduled unit of future publishing work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub id: String,
    pub post: ComposedPost,
    pub due_at: i64,
    pub status: JobStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    /// Collaborator-assigned post id, set on success.
    pub published_id: Option<String>,
}

impl ScheduledJob {
    pub fn new(post: ComposedPost, due_at: i64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            post,
            due_at,
            status: JobStatus::Pending,
            attempts: 0,
            last_error: None,
            published_id: None,
        }
    }
}

/// Check whether a filename looks like a supported picture.
pub fn is_picture_file(name: &str) -> bool {
    match name.rsplit_once('.') {
        Some((_, ext)) => matches!(ext.to_lowercase().as_str(), "jpg" | "jpeg" | "png"),
        None => false,
    }
}
