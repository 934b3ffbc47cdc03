//! Two-segment identifiers for tasks and analyses.
//!
//! Every task and analysis lives in `<root>/<day>/<name>/`. The id is the
//! relative path `day/name`; over HTTP it travels as two path segments so
//! that no handler ever has to accept a raw path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{ModelError, ModelResult};
use crate::utils::slugify;

const MAX_SEGMENT_LEN: usize = 128;

/// Longest slug kept in a generated task name. Leaves room for
/// `-<unix>` and a collision suffix inside `MAX_SEGMENT_LEN`.
const MAX_SLUG_LEN: usize = 96;

/// Identifier of a labeling task or an analysis (`YYYY-MM-DD/<name>`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId {
    day: String,
    name: String,
}

impl EntityId {
    /// Build an id from two path segments, rejecting anything that could
    /// escape the data root.
    pub fn new(day: impl Into<String>, name: impl Into<String>) -> ModelResult<Self> {
        let day = day.into();
        let name = name.into();
        validate_segment(&day)?;
        validate_segment(&name)?;
        Ok(Self { day, name })
    }

    /// Id for a new labeling task: `<day>/<slug>-<unix>` (slug defaults to `task`).
    pub fn for_task(task_name: Option<&str>, now: DateTime<Utc>) -> Self {
        let slug = task_name
            .map(|n| slugify(n, "task"))
            .unwrap_or_else(|| "task".to_string());
        Self::generated(now, truncate_slug(&slug))
    }

    /// Id for a new analysis: `<day>/analysis-<unix>`.
    pub fn for_analysis(now: DateTime<Utc>) -> Self {
        Self::generated(now, "analysis")
    }

    fn generated(now: DateTime<Utc>, prefix: &str) -> Self {
        Self {
            day: now.format("%Y-%m-%d").to_string(),
            name: format!("{}-{}", prefix, now.timestamp()),
        }
    }

    /// Same day, name suffixed with a counter. Used to resolve collisions.
    pub fn with_suffix(&self, n: u32) -> Self {
        Self {
            day: self.day.clone(),
            name: format!("{}-{}", self.name, n),
        }
    }

    pub fn day(&self) -> &str {
        &self.day
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directory of this entity below `root`.
    pub fn dir_in(&self, root: &Path) -> PathBuf {
        root.join(&self.day).join(&self.name)
    }

    /// Flat form used in download file names (`day-name`).
    pub fn flat(&self) -> String {
        format!("{}-{}", self.day, self.name)
    }
}

/// Slugs are ASCII, so byte truncation stays on a char boundary.
fn truncate_slug(slug: &str) -> &str {
    if slug.len() <= MAX_SLUG_LEN {
        return slug;
    }
    let cut = slug[..MAX_SLUG_LEN].trim_end_matches(&['-', '.'][..]);
    if cut.is_empty() {
        "task"
    } else {
        cut
    }
}

/// Check a single path segment: ASCII alphanumerics plus `.`, `_`, `-`,
/// not starting with a dot.
pub fn validate_segment(segment: &str) -> ModelResult<()> {
    if segment.is_empty() || segment.len() > MAX_SEGMENT_LEN {
        return Err(ModelError::InvalidId(format!(
            "segment length must be 1..={}",
            MAX_SEGMENT_LEN
        )));
    }
    if segment.starts_with('.') {
        return Err(ModelError::InvalidId(format!(
            "segment must not start with '.': {}",
            segment
        )));
    }
    if !segment
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        return Err(ModelError::InvalidId(format!(
            "segment contains invalid characters: {}",
            segment
        )));
    }
    Ok(())
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.day, self.name)
    }
}

impl FromStr for EntityId {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (day, name) = s
            .split_once('/')
            .ok_or_else(|| ModelError::InvalidId(format!("expected day/name, got {}", s)))?;
        Self::new(day, name)
    }
}

impl TryFrom<String> for EntityId {
    type Error = ModelError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> Self {
        id.to_string()
    }
}
