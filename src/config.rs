//! Loading planner configuration from YAML and the environment.
//!
//! ```yaml
//! scale_down: 1
//! max_batches: 20
//! tiers:
//!   - { max_items: 100, batch_count: 1 }
//!   - { max_items: 500, batch_count: 4 }
//! ```
//!
//! Every key is optional; missing keys keep their defaults. Environment
//! variables win over the file:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `BATCHPROC_CONFIG` | YAML file read by [`PlannerConfig::load`] when none is given |
//! | `BATCHPROC_SCALE_DOWN` | `scale_down` |
//! | `BATCHPROC_MAX_BATCHES` | `max_batches` (at most 20) |

use crate::batch::PlannerConfig;
use crate::{Error, ErrorContext, Result};
use std::env;
use std::path::Path;
use tracing::{debug, warn};

pub const CONFIG_PATH_ENV: &str = "BATCHPROC_CONFIG";
pub const SCALE_DOWN_ENV: &str = "BATCHPROC_SCALE_DOWN";
pub const MAX_BATCHES_ENV: &str = "BATCHPROC_MAX_BATCHES";

impl PlannerConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: PlannerConfig = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::configuration_with_context(
                format!("cannot read planner config: {}", e),
                ErrorContext::new()
                    .with_details(path.display().to_string())
                    .with_source("config"),
            )
        })?;
        debug!(path = %path.display(), "loaded planner config");
        Self::from_yaml_str(&content)
    }

    /// Apply `BATCHPROC_SCALE_DOWN` and `BATCHPROC_MAX_BATCHES` when set.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|key| env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(v) = parse_override(&lookup, SCALE_DOWN_ENV)? {
            self.scale_down = v;
        }
        if let Some(v) = parse_override(&lookup, MAX_BATCHES_ENV)? {
            self.max_batches = v;
        }
        Ok(self)
    }

    /// File (explicit path, else `BATCHPROC_CONFIG`, else defaults), then
    /// environment overrides, then validation.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let from_env = env::var(CONFIG_PATH_ENV).ok();
        let base = match path.map(Path::to_path_buf).or_else(|| from_env.map(Into::into)) {
            Some(p) => Self::from_path(p)?,
            None => Self::default(),
        };
        let config = base.with_env_overrides()?;
        config.validate()?;
        Ok(config)
    }
}

fn parse_override(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<usize>> {
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    match raw.trim().parse::<usize>() {
        Ok(v) => Ok(Some(v)),
        Err(e) => {
            warn!(key, value = %raw, "rejecting unparsable override");
            Err(Error::configuration_with_context(
                format!("{} must be a non-negative integer", key),
                ErrorContext::new()
                    .with_field_path(key)
                    .with_details(format!("{:?}: {}", raw, e))
                    .with_source("config"),
            ))
        }
    }
}
