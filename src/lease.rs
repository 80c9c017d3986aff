//! Lease actions for containers and blobs.
//!
//! The client only shapes requests and reads results; the service owns the
//! lease state. [`LeaseState::allows`] mirrors the service's transition
//! rules so callers (and test doubles) can reason about them.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{StorageError, StorageResult};
use crate::models::LeaseState;
use crate::request::StorageRequest;
use crate::response::RawResponse;

/// Shortest fixed lease, in seconds.
pub const MIN_LEASE_DURATION: u32 = 15;

/// Longest fixed lease, in seconds.
pub const MAX_LEASE_DURATION: u32 = 60;

/// Longest break period, in seconds.
pub const MAX_BREAK_PERIOD: u32 = 60;

/// Requested lease duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseDuration {
    Fixed(u32),
    Infinite,
}

impl LeaseDuration {
    /// Parses the wire form: `-1` or a number of seconds.
    pub fn from_seconds(seconds: i32) -> StorageResult<Self> {
        let duration = match seconds {
            -1 => LeaseDuration::Infinite,
            s if s >= 0 => LeaseDuration::Fixed(s as u32),
            s => {
                return Err(StorageError::invalid_argument(format!(
                    "invalid lease duration {}",
                    s
                )))
            }
        };
        duration.validate()?;
        Ok(duration)
    }

    pub fn validate(&self) -> StorageResult<()> {
        match self {
            LeaseDuration::Infinite => Ok(()),
            LeaseDuration::Fixed(s) if (MIN_LEASE_DURATION..=MAX_LEASE_DURATION).contains(s) => {
                Ok(())
            }
            LeaseDuration::Fixed(s) => Err(StorageError::invalid_argument(format!(
                "lease duration must be between {} and {} seconds or infinite, got {}",
                MIN_LEASE_DURATION, MAX_LEASE_DURATION, s
            ))),
        }
    }

    pub fn header_value(&self) -> String {
        match self {
            LeaseDuration::Infinite => "-1".to_string(),
            LeaseDuration::Fixed(s) => s.to_string(),
        }
    }
}

/// A lease request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaseAction {
    Acquire {
        proposed_id: Option<String>,
        duration: LeaseDuration,
    },
    Renew {
        lease_id: String,
    },
    Change {
        lease_id: String,
        proposed_id: String,
    },
    Release {
        lease_id: String,
    },
    /// Without a period the service uses the remaining lease time.
    Break {
        period: Option<u32>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseActionKind {
    Acquire,
    Renew,
    Change,
    Release,
    Break,
}

impl LeaseActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeaseActionKind::Acquire => "acquire",
            LeaseActionKind::Renew => "renew",
            LeaseActionKind::Change => "change",
            LeaseActionKind::Release => "release",
            LeaseActionKind::Break => "break",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "acquire" => Some(LeaseActionKind::Acquire),
            "renew" => Some(LeaseActionKind::Renew),
            "change" => Some(LeaseActionKind::Change),
            "release" => Some(LeaseActionKind::Release),
            "break" => Some(LeaseActionKind::Break),
            _ => None,
        }
    }
}

impl LeaseAction {
    pub fn kind(&self) -> LeaseActionKind {
        match self {
            LeaseAction::Acquire { .. } => LeaseActionKind::Acquire,
            LeaseAction::Renew { .. } => LeaseActionKind::Renew,
            LeaseAction::Change { .. } => LeaseActionKind::Change,
            LeaseAction::Release { .. } => LeaseActionKind::Release,
            LeaseAction::Break { .. } => LeaseActionKind::Break,
        }
    }

    /// Checks durations, break periods and lease ids.
    pub fn validate(&self) -> StorageResult<()> {
        match self {
            LeaseAction::Acquire {
                proposed_id,
                duration,
            } => {
                duration.validate()?;
                if let Some(id) = proposed_id {
                    validate_lease_id(id)?;
                }
            }
            LeaseAction::Renew { lease_id } | LeaseAction::Release { lease_id } => {
                validate_lease_id(lease_id)?;
            }
            LeaseAction::Change {
                lease_id,
                proposed_id,
            } => {
                validate_lease_id(lease_id)?;
                validate_lease_id(proposed_id)?;
            }
            LeaseAction::Break { period } => {
                if let Some(p) = period {
                    if *p > MAX_BREAK_PERIOD {
                        return Err(StorageError::invalid_argument(format!(
                            "break period must be between 0 and {} seconds, got {}",
                            MAX_BREAK_PERIOD, p
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Adds the `x-ms-lease-*` headers for this action.
    pub(crate) fn apply(&self, request: StorageRequest) -> StorageResult<StorageRequest> {
        self.validate()?;
        let request = request.with_header("x-ms-lease-action", self.kind().as_str())?;
        match self {
            LeaseAction::Acquire {
                proposed_id,
                duration,
            } => request
                .with_header("x-ms-lease-duration", duration.header_value())?
                .with_optional_header("x-ms-proposed-lease-id", proposed_id.as_deref()),
            LeaseAction::Renew { lease_id } | LeaseAction::Release { lease_id } => {
                request.with_header("x-ms-lease-id", lease_id)
            }
            LeaseAction::Change {
                lease_id,
                proposed_id,
            } => request
                .with_header("x-ms-lease-id", lease_id)?
                .with_header("x-ms-proposed-lease-id", proposed_id),
            LeaseAction::Break { period } => request.with_optional_header(
                "x-ms-lease-break-period",
                period.map(|p| p.to_string()),
            ),
        }
    }
}

impl LeaseState {
    /// Whether the service accepts `action` on a resource in this state.
    ///
    /// Acquire and Renew on a held lease only succeed with the holder's id,
    /// and a break in progress can only be released or broken again.
    pub fn allows(&self, action: LeaseActionKind) -> bool {
        use LeaseActionKind::*;
        use LeaseState::*;
        match (self, action) {
            (Breaking, Acquire) => false,
            (_, Acquire) => true,
            (Leased | Expired, Renew) => true,
            (_, Renew) => false,
            (Leased, Change) => true,
            (_, Change) => false,
            (Available, Release) => false,
            (_, Release) => true,
            (Leased | Breaking | Broken, Break) => true,
            (Available | Expired, Break) => false,
        }
    }
}

/// Generates a fresh lease id.
pub fn new_lease_id() -> String {
    Uuid::new_v4().to_string()
}

fn validate_lease_id(lease_id: &str) -> StorageResult<()> {
    if lease_id.trim().is_empty() {
        return Err(StorageError::invalid_argument("lease id must not be empty"));
    }
    Ok(())
}

/// Result of acquire, renew, change and release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseInfo {
    pub etag: String,
    pub last_modified: DateTime<Utc>,
    /// Absent after a release.
    pub lease_id: Option<String>,
}

impl LeaseInfo {
    pub(crate) fn from_response(raw: &RawResponse) -> StorageResult<Self> {
        Ok(Self {
            etag: raw.etag()?,
            last_modified: raw.last_modified()?,
            lease_id: raw.header("x-ms-lease-id").map(str::to_string),
        })
    }
}

/// Result of a break.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokenLease {
    pub etag: String,
    pub last_modified: DateTime<Utc>,
    /// Seconds until the lease is fully broken.
    pub lease_time: u32,
}

impl BrokenLease {
    pub(crate) fn from_response(raw: &RawResponse) -> StorageResult<Self> {
        let lease_time = raw.required_header("x-ms-lease-time")?;
        let lease_time = lease_time.parse().map_err(|e| {
            StorageError::deserialize(format!("invalid x-ms-lease-time '{}'", lease_time), e)
        })?;
        Ok(Self {
            etag: raw.etag()?,
            last_modified: raw.last_modified()?,
            lease_time,
        })
    }
}
