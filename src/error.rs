// ABOUTME: Error taxonomy for the migration driver
// ABOUTME: Every variant is terminal; causes are kept as sources for the diagnostic chain

use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::macaroon::MacaroonError;
use crate::names::TagError;
use crate::phase::MigrationPhase;
use crate::remote::ApiError;
use crate::store::StoreError;

/// Positional arguments, in the order they are expected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentField {
    Model,
    TargetController,
    MachineTag,
    MachinePassword,
    MachineNonce,
}

impl ArgumentField {
    pub const ORDER: [ArgumentField; 5] = [
        ArgumentField::Model,
        ArgumentField::TargetController,
        ArgumentField::MachineTag,
        ArgumentField::MachinePassword,
        ArgumentField::MachineNonce,
    ];
}

impl fmt::Display for ArgumentField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ArgumentField::Model => "model",
            ArgumentField::TargetController => "target controller",
            ArgumentField::MachineTag => "machine tag",
            ArgumentField::MachinePassword => "machine password",
            ArgumentField::MachineNonce => "machine nonce",
        })
    }
}

/// How a phase change failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The coordinator answered and refused the transition.
    Refused,
    /// The request never got an answer.
    Unreachable,
}

#[derive(Debug, Error)]
pub enum MigrateError {
    #[error("{0} not specified")]
    MissingArgument(ArgumentField),

    #[error("too many arguments specified")]
    TooManyArguments,

    #[error("invalid machine identity")]
    InvalidIdentity(#[source] TagError),

    #[error("failed to resolve migration spec")]
    SpecResolutionFailed(#[source] StoreError),

    #[error("unmarshalling macaroon")]
    TokenDecodeFailed(#[source] MacaroonError),

    #[error("failed to initiate migration")]
    InitiateFailed(#[source] ApiError),

    #[error("failed to connect to migration coordinator")]
    CoordinatorConnectFailed(#[source] ApiError),

    #[error("migration coordinator did not report migration {migration_id:?} within {waited:?}")]
    CoordinatorNotReady {
        migration_id: String,
        waited: Duration,
        #[source]
        last_error: Option<ApiError>,
    },

    #[error("failed to set phase to {phase}")]
    PhaseTransitionRejected {
        phase: MigrationPhase,
        #[source]
        source: ApiError,
    },
}

impl MigrateError {
    pub(crate) fn phase_rejected(phase: MigrationPhase, source: ApiError) -> Self {
        MigrateError::PhaseTransitionRejected { phase, source }
    }

    /// For a phase failure, whether the coordinator refused it or was never reached.
    pub fn rejection(&self) -> Option<Rejection> {
        match self {
            MigrateError::PhaseTransitionRejected { source, .. } => Some(if source.is_remote() {
                Rejection::Refused
            } else {
                Rejection::Unreachable
            }),
            _ => None,
        }
    }
}
