//! Scenario configuration via TOML
//!
//! A scenario is described by the resources it declares, one lock order per
//! session, the pacing between lock acquisitions, an optional retry policy,
//! and the lock-wait bound of the in-memory store. Files are parsed with
//! `toml` and validated eagerly, so a bad file fails before any session runs.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::error::{HarnessError, HarnessResult};
use crate::types::{LockOrder, ResourceId};

/// Config file name used by `lockprobe init-config` when no path is given.
pub const CONFIG_FILE_NAME: &str = "lockprobe.toml";

/// Minimum number of sessions needed to provoke a conflict
pub const MIN_SESSIONS: usize = 2;

/// Retry policy for sessions aborted by a store-signaled conflict
///
/// Sessions that failed for any other reason are never retried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of additional runs per conflicted session (0 = no retries)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    /// Delay before each retry round in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_max_attempts() -> usize {
    3
}

fn default_retry_delay_ms() -> u64 {
    100
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl RetryPolicy {
    /// Create a RetryPolicy with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a RetryPolicy with no retries
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 0,
            ..Default::default()
        }
    }

    /// Set maximum number of additional runs
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set delay before each retry round
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Delay before each retry round
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Settings for the bundled in-memory store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Upper bound on a single lock wait in milliseconds
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

fn default_lock_timeout_ms() -> u64 {
    5000
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

impl StoreConfig {
    /// Upper bound on a single lock wait
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

/// Scenario configuration loaded from `lockprobe.toml`.
///
/// # Example
///
/// ```toml
/// resources = ["R1", "R2"]
/// sessions = [["R1", "R2"], ["R2", "R1"]]
/// inter_lock_delay_ms = 500
///
/// [retry]
/// max_attempts = 3
/// retry_delay_ms = 100
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    /// Resources the scenario declares; each lock order may only use these
    pub resources: Vec<ResourceId>,
    /// One lock order per session, in reporting order
    pub sessions: Vec<LockOrder>,
    /// Pause between successive lock acquisitions in milliseconds
    #[serde(default)]
    pub inter_lock_delay_ms: u64,
    /// Optional retry policy for conflicted sessions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryPolicy>,
    /// In-memory store settings
    #[serde(default)]
    pub store: StoreConfig,
}

/// On-disk shape of a scenario; lock orders are checked after parsing
#[derive(Debug, Deserialize)]
struct RawScenario {
    resources: Vec<ResourceId>,
    sessions: Vec<Vec<ResourceId>>,
    #[serde(default)]
    inter_lock_delay_ms: u64,
    #[serde(default)]
    retry: Option<RetryPolicy>,
    #[serde(default)]
    store: StoreConfig,
}

impl ScenarioConfig {
    /// The canonical two-session deadlock: (R1, R2) against (R2, R1)
    pub fn canonical(inter_lock_delay: Duration) -> Self {
        let resources = vec![ResourceId::new("R1"), ResourceId::new("R2")];
        let forward = LockOrder::new_unchecked(resources.clone());
        let backward = forward.reversed();
        Self {
            resources,
            sessions: vec![forward, backward],
            inter_lock_delay_ms: inter_lock_delay.as_millis() as u64,
            retry: None,
            store: StoreConfig::default(),
        }
    }

    /// Pause between successive lock acquisitions
    pub fn inter_lock_delay(&self) -> Duration {
        Duration::from_millis(self.inter_lock_delay_ms)
    }

    /// Check the scenario shape
    ///
    /// # Errors
    ///
    /// Returns `HarnessError::InvalidScenario` if fewer than two sessions are
    /// configured, a resource is declared twice, or a lock order references a
    /// resource that is not declared.
    pub fn validate(&self) -> HarnessResult<()> {
        validate_scenario(&self.resources, &self.sessions)
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# lockprobe scenario configuration
#
# Resources are the lockable rows the scenario declares.
resources = ["R1", "R2"]

# One lock order per session. Reversed orders provoke a deadlock.
sessions = [["R1", "R2"], ["R2", "R1"]]

# Pause between lock acquisitions (widens the contention window).
inter_lock_delay_ms = 500

# Retry sessions aborted by a conflict (optional).
# [retry]
# max_attempts = 3
# retry_delay_ms = 100

[store]
# Upper bound on a single lock wait in the in-memory store.
lock_timeout_ms = 5000
"#
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file cannot be read, `Parse` if it is not a valid
    /// scenario document, `InvalidLockOrder` if a session's list is empty or
    /// repeats a resource, and `InvalidScenario` if validation fails.
    pub fn from_file(path: &Path) -> HarnessResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| HarnessError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let raw: RawScenario = toml::from_str(&content).map_err(|e| HarnessError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let config = ScenarioConfig {
            sessions: parse_lock_orders(raw.sessions)?,
            resources: raw.resources,
            inter_lock_delay_ms: raw.inter_lock_delay_ms,
            retry: raw.retry,
            store: raw.store,
        };
        config.validate()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    ///
    /// Returns `Ok(())` whether the file was created or already existed.
    pub fn write_default_if_missing(path: &Path) -> HarnessResult<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|source| HarnessError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        }
        Ok(())
    }
}

/// Build lock orders from raw resource lists, one per session
///
/// # Errors
///
/// Returns `HarnessError::InvalidLockOrder` naming the first session whose
/// list is empty or repeats a resource.
pub fn parse_lock_orders<I, O, R>(raw: I) -> HarnessResult<Vec<LockOrder>>
where
    I: IntoIterator<Item = O>,
    O: IntoIterator<Item = R>,
    R: Into<ResourceId>,
{
    raw.into_iter()
        .enumerate()
        .map(|(session, resources)| {
            LockOrder::new(resources)
                .map_err(|source| HarnessError::InvalidLockOrder { session, source })
        })
        .collect()
}

/// Validate a scenario given as declared resources plus lock orders
///
/// Lock orders are already duplicate-free by construction; this checks the
/// cross-session constraints.
pub fn validate_scenario(resources: &[ResourceId], sessions: &[LockOrder]) -> HarnessResult<()> {
    if sessions.len() < MIN_SESSIONS {
        return Err(HarnessError::invalid_scenario(format!(
            "need at least {} sessions, got {}",
            MIN_SESSIONS,
            sessions.len()
        )));
    }

    let mut declared = HashSet::with_capacity(resources.len());
    for resource in resources {
        if !declared.insert(resource) {
            return Err(HarnessError::invalid_scenario(format!(
                "resource '{}' declared more than once",
                resource
            )));
        }
    }

    for (index, order) in sessions.iter().enumerate() {
        if let Some(unknown) = order.iter().find(|r| !declared.contains(r)) {
            return Err(HarnessError::invalid_scenario(format!(
                "session {} locks undeclared resource '{}'",
                index, unknown
            )));
        }
    }

    Ok(())
}
