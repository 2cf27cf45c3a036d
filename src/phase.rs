// ABOUTME: Lifecycle phases reported and accepted by the migration coordinator
// ABOUTME: Names only; transition legality is decided by the coordinator

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MigrationPhase {
    Unknown,
    None,
    Quiesce,
    Import,
    ProcessRelations,
    Validation,
    Success,
    LogTransfer,
    Reap,
    ReapFailed,
    Done,
    Abort,
    AbortDone,
}

const ALL_PHASES: [MigrationPhase; 13] = [
    MigrationPhase::Unknown,
    MigrationPhase::None,
    MigrationPhase::Quiesce,
    MigrationPhase::Import,
    MigrationPhase::ProcessRelations,
    MigrationPhase::Validation,
    MigrationPhase::Success,
    MigrationPhase::LogTransfer,
    MigrationPhase::Reap,
    MigrationPhase::ReapFailed,
    MigrationPhase::Done,
    MigrationPhase::Abort,
    MigrationPhase::AbortDone,
];

impl MigrationPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationPhase::Unknown => "UNKNOWN",
            MigrationPhase::None => "NONE",
            MigrationPhase::Quiesce => "QUIESCE",
            MigrationPhase::Import => "IMPORT",
            MigrationPhase::ProcessRelations => "PROCESSRELATIONS",
            MigrationPhase::Validation => "VALIDATION",
            MigrationPhase::Success => "SUCCESS",
            MigrationPhase::LogTransfer => "LOGTRANSFER",
            MigrationPhase::Reap => "REAP",
            MigrationPhase::ReapFailed => "REAPFAILED",
            MigrationPhase::Done => "DONE",
            MigrationPhase::Abort => "ABORT",
            MigrationPhase::AbortDone => "ABORTDONE",
        }
    }

    /// No further transitions happen once a migration reaches one of these.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MigrationPhase::ReapFailed | MigrationPhase::Done | MigrationPhase::AbortDone
        )
    }

    pub fn is_running(&self) -> bool {
        !self.is_terminal() && !matches!(self, MigrationPhase::Unknown | MigrationPhase::None)
    }
}

impl fmt::Display for MigrationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown migration phase {0:?}")]
pub struct UnknownPhase(pub String);

impl FromStr for MigrationPhase {
    type Err = UnknownPhase;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALL_PHASES
            .iter()
            .copied()
            .find(|phase| phase.as_str() == s)
            .ok_or_else(|| UnknownPhase(s.to_string()))
    }
}

impl Serialize for MigrationPhase {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MigrationPhase {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
