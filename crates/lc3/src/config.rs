use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror;

use crate::issue::{self, IssueKind, IssueLevel, IssuePackage};
use crate::limits::ExecutionLimits;
use crate::search::SearcherKind;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Issue(#[from] issue::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// What the pruning searcher does once only postponed states remain.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reactivation {
    /// Reactivate postponed states while some loop segment is uncovered.
    #[default]
    Continue,

    /// End the run instead.
    Stop,
}

/// Default limit on loop segments before falling back to a plain searcher.
pub const DEFAULT_MAX_SEGMENTS: usize = 1000;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub searcher: SearcherKind,
    pub reactivation: Reactivation,

    /// Loop analysis gives up past this many segments.
    pub max_segments: Option<usize>,

    /// Cache the possible values of symbolic addresses that have at most this many values under
    /// the initial constraints.
    pub cache_threshold: Option<usize>,

    pub limits: ExecutionLimits,

    /// Stop the run after this many seconds.
    pub time_limit_secs: Option<u64>,

    /// Seconds between progress reports.
    pub progress_interval_secs: Option<u64>,

    /// Seed of the random searchers.
    pub seed: u64,

    /// Drop completed states that neither raised a new issue nor covered a new segment.
    pub release_completed: bool,

    /// Overrides of the default issue levels.
    pub issue_levels: BTreeMap<IssueKind, IssueLevel>,

    /// Report each issue kind once per location.
    pub aggressive_filter: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            searcher: SearcherKind::default(),
            reactivation: Reactivation::default(),
            max_segments: Some(DEFAULT_MAX_SEGMENTS),
            cache_threshold: None,
            limits: ExecutionLimits::default(),
            time_limit_secs: None,
            progress_interval_secs: None,
            seed: 0,
            release_completed: false,
            issue_levels: BTreeMap::new(),
            aggressive_filter: true,
        }
    }
}

impl Config {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject issue levels that would let a broken state keep running.
    pub fn validate(&self) -> Result<()> {
        self.issue_package().map(|_| ())
    }

    /// An empty issue package with the configured levels.
    pub fn issue_package(&self) -> Result<IssuePackage> {
        let mut issues = IssuePackage::new(self.aggressive_filter);
        for (kind, level) in &self.issue_levels {
            issues.set_level(*kind, *level)?;
        }
        Ok(issues)
    }
}
