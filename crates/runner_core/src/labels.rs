//! ImageNet class labels.
//!
//! Labels only make the output readable, so loading them never fails: any
//! problem with the source is logged and replaced by synthetic
//! `class_<index>` names.

use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::{debug, warn};

/// Newline-delimited list of the 1000 ImageNet class names.
pub const IMAGENET_CLASSES_URL: &str =
    "https://raw.githubusercontent.com/pytorch/hub/master/imagenet_classes.txt";

pub const IMAGENET_CLASS_COUNT: usize = 1000;

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Label used for any class without a known name.
pub fn synthetic_label(class_id: usize) -> String {
    format!("class_{class_id}")
}

/// Where to get label names from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelSource {
    Url { url: String, timeout: Duration },
    File(PathBuf),
    Synthetic,
}

impl Default for LabelSource {
    fn default() -> Self {
        Self::Url {
            url: IMAGENET_CLASSES_URL.to_string(),
            timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }
}

/// Ordered class names indexed by class id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelTable {
    labels: Vec<String>,
}

impl LabelTable {
    pub fn from_labels(labels: Vec<String>) -> Self {
        Self { labels }
    }

    /// `class_0` .. `class_{count - 1}`.
    pub fn synthetic(count: usize) -> Self {
        Self {
            labels: (0..count).map(synthetic_label).collect(),
        }
    }

    /// One label per line, trimmed. Line `i` names class `i`, so a blank
    /// line keeps its slot and resolves to the synthetic label.
    pub fn parse(text: &str) -> Result<Self> {
        let labels: Vec<String> = text.lines().map(|line| line.trim().to_string()).collect();
        if labels.iter().all(String::is_empty) {
            bail!("label list is empty");
        }
        Ok(Self { labels })
    }

    /// Download a label list, giving up after `timeout`.
    pub fn fetch(url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        let body = client
            .get(url)
            .send()
            .and_then(|response| response.error_for_status())
            .and_then(|response| response.bytes())
            .with_context(|| format!("failed to fetch labels from {url}"))?;
        let text = std::str::from_utf8(&body).context("label list is not valid UTF-8")?;
        Self::parse(text)
    }

    pub fn read(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read labels from {}", path.display()))?;
        Self::parse(&text)
    }

    /// Load from `source`, falling back to the synthetic ImageNet table on
    /// any error.
    pub fn load(source: &LabelSource) -> Self {
        let fallback = || Self::synthetic(IMAGENET_CLASS_COUNT);
        let table = match source {
            LabelSource::Synthetic => fallback(),
            LabelSource::Url { url, timeout } => {
                best_effort(url, || Self::fetch(url, *timeout), fallback)
            }
            LabelSource::File(path) => {
                best_effort(&path.display(), || Self::read(path), fallback)
            }
        };
        if table.len() != IMAGENET_CLASS_COUNT {
            warn!(
                count = table.len(),
                expected = IMAGENET_CLASS_COUNT,
                "label table size differs from the ImageNet class count"
            );
        }
        table
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Name of `class_id`; `None` when out of range or blank.
    pub fn get(&self, class_id: usize) -> Option<&str> {
        self.labels
            .get(class_id)
            .map(String::as_str)
            .filter(|label| !label.is_empty())
    }

    /// Name of `class_id`, or its synthetic label when unknown.
    pub fn label(&self, class_id: usize) -> String {
        self.get(class_id)
            .map(str::to_string)
            .unwrap_or_else(|| synthetic_label(class_id))
    }
}

/// Try `acquire`; on failure log the error and return `fallback()` instead.
/// The failure never reaches the caller.
pub fn best_effort<T, E, A, F>(resource: &dyn Display, acquire: A, fallback: F) -> T
where
    E: Display,
    A: FnOnce() -> std::result::Result<T, E>,
    F: FnOnce() -> T,
{
    match acquire() {
        Ok(value) => {
            debug!(%resource, "loaded");
            value
        }
        Err(err) => {
            warn!(%resource, error = %err, "using fallback");
            fallback()
        }
    }
}

/// Lazily loaded label table, immutable once set.
///
/// Owned by whoever needs it instead of living in a static, so each test
/// can start from an empty cache.
#[derive(Debug, Default)]
pub struct LabelCache {
    table: OnceLock<LabelTable>,
}

impl LabelCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached table, loading it from `source` on first use.
    /// Later calls ignore `source`.
    pub fn get_or_load(&self, source: &LabelSource) -> &LabelTable {
        self.table.get_or_init(|| LabelTable::load(source))
    }

    pub fn get(&self) -> Option<&LabelTable> {
        self.table.get()
    }
}
