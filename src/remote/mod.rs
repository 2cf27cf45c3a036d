// ABOUTME: Interfaces to the control-plane: initiating migrations and driving the coordinator
// ABOUTME: Traits for the sequencer plus the HTTP gateway implementation

mod client;
mod models;

pub use client::{ApiConnection, HttpControlPlane, HttpCoordinator};
pub use models::InitiateMigrationArgs;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

use crate::args::MachineIdentity;
use crate::macaroon::{stored_slices, MacaroonError, MacaroonSlice};
use crate::names::{AuthTag, ModelTag, UserTag};
use crate::phase::MigrationPhase;
use crate::spec::MigrationRequest;
use crate::store::{AccountDetails, ControllerDetails};

/// Error code the control-plane uses when credentials are refused.
pub const CODE_UNAUTHORIZED: &str = "unauthorized access";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("no API addresses to connect to")]
    NoAddresses,
    #[error("invalid API address {addr:?}")]
    InvalidAddress {
        addr: String,
        #[source]
        source: url::ParseError,
    },
    #[error("invalid CA certificate")]
    InvalidCaCert(#[source] reqwest::Error),
    #[error("failed to create HTTP client")]
    Client(#[source] reqwest::Error),
    #[error("request to {url} failed")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("unable to connect to any of {attempted} API addresses")]
    AllAddressesFailed {
        attempted: usize,
        #[source]
        last: Box<ApiError>,
    },
    #[error("API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("{message}")]
    Remote {
        message: String,
        code: Option<String>,
    },
    #[error("failed to encode request")]
    Encode(#[source] serde_json::Error),
    #[error("failed to parse API response")]
    Decode(#[source] serde_json::Error),
    #[error("expected 1 result, got {0}")]
    ResultCount(usize),
}

impl ApiError {
    /// The API answered and refused; as opposed to never being reached.
    pub fn is_remote(&self) -> bool {
        matches!(self, ApiError::Remote { .. } | ApiError::Status { .. })
    }

    pub fn is_unauthorized(&self) -> bool {
        match self {
            ApiError::Remote { code, .. } => code.as_deref() == Some(CODE_UNAUTHORIZED),
            ApiError::Status { status, .. } => *status == 401,
            _ => false,
        }
    }
}

/// Per-request transport settings.
#[derive(Debug, Clone)]
pub struct DialOptions {
    pub request_timeout: Duration,
}

impl Default for DialOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// How to reach and log in to a controller (or one of its models).
#[derive(Clone)]
pub struct ApiInfo {
    pub addrs: Vec<String>,
    pub ca_cert: String,
    /// Set for model-scoped connections.
    pub model_tag: Option<ModelTag>,
    pub tag: AuthTag,
    pub password: Option<String>,
    pub nonce: Option<String>,
    pub macaroons: Vec<MacaroonSlice>,
}

impl ApiInfo {
    /// Controller-level login with a stored user account.
    pub fn for_account(
        controller: &ControllerDetails,
        account: &AccountDetails,
    ) -> Result<Self, MacaroonError> {
        let macaroons = stored_slices(account.macaroon.as_deref())?;
        Ok(Self {
            addrs: controller.api_endpoints.clone(),
            ca_cert: controller.ca_cert.clone(),
            model_tag: None,
            tag: AuthTag::User(UserTag::new(account.user.clone())),
            password: account.password.clone(),
            nonce: None,
            macaroons,
        })
    }

    /// Model-scoped login as a machine agent.
    pub fn for_machine(
        controller: &ControllerDetails,
        model_uuid: &str,
        identity: &MachineIdentity,
    ) -> Self {
        Self {
            addrs: controller.api_endpoints.clone(),
            ca_cert: controller.ca_cert.clone(),
            model_tag: Some(ModelTag::new(model_uuid)),
            tag: AuthTag::Machine(identity.tag.clone()),
            password: Some(identity.password.clone()),
            nonce: Some(identity.nonce.clone()),
            macaroons: Vec::new(),
        }
    }
}

impl std::fmt::Debug for ApiInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiInfo")
            .field("addrs", &self.addrs)
            .field("model_tag", &self.model_tag)
            .field("tag", &self.tag)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("nonce", &self.nonce)
            .field("macaroons", &self.macaroons.len())
            .finish()
    }
}

/// What the coordinator reports about the migration it is running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    pub migration_id: String,
    pub phase: MigrationPhase,
    pub phase_changed_time: Option<DateTime<Utc>>,
}

/// The control-plane, as seen by the migration driver.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    type Coordinator: MigrationCoordinator;

    /// Ask the source controller (reached via `controller`) to start the
    /// migration described by `request`. Returns the migration ID.
    async fn initiate_migration(
        &self,
        controller: &ApiInfo,
        request: &MigrationRequest,
    ) -> Result<String, ApiError>;

    /// Open a session with the source-side migration coordinator.
    async fn connect_coordinator(&self, info: &ApiInfo) -> Result<Self::Coordinator, ApiError>;
}

/// A session with the coordinator driving one model's migration.
#[async_trait]
pub trait MigrationCoordinator: Send + Sync {
    async fn migration_status(&self) -> Result<MigrationStatus, ApiError>;

    /// Request a transition to `phase`. The coordinator decides whether it is legal.
    async fn set_phase(&self, phase: MigrationPhase) -> Result<(), ApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> ControllerDetails {
        ControllerDetails {
            uuid: "a0a0a0a0-0000-4000-8000-000000000000".to_string(),
            api_endpoints: vec!["10.0.0.1:17070".to_string()],
            ca_cert: "CERT".to_string(),
        }
    }

    #[test]
    fn test_api_info_for_account() {
        let account = AccountDetails {
            user: "admin".to_string(),
            password: Some("hunter2".to_string()),
            macaroon: None,
        };
        let info = ApiInfo::for_account(&controller(), &account).unwrap();
        assert_eq!(info.tag.to_string(), "user-admin");
        assert!(info.model_tag.is_none());
        assert!(info.macaroons.is_empty());
        assert!(!format!("{info:?}").contains("hunter2"));

        let blank = AccountDetails {
            macaroon: Some("  ".to_string()),
            ..account.clone()
        };
        assert!(ApiInfo::for_account(&controller(), &blank)
            .unwrap()
            .macaroons
            .is_empty());

        let bad = AccountDetails {
            macaroon: Some("{}".to_string()),
            ..account
        };
        assert!(ApiInfo::for_account(&controller(), &bad).is_err());
    }

    #[test]
    fn test_api_info_for_machine() {
        let identity = MachineIdentity {
            tag: "machine-0".parse().unwrap(),
            password: "pw".to_string(),
            nonce: "user-admin:bootstrap".to_string(),
        };
        let model = "9a3b1c2d-7e8f-4a5b-9c6d-0e1f2a3b4c5d";
        let info = ApiInfo::for_machine(&controller(), model, &identity);

        assert_eq!(info.tag.to_string(), "machine-0");
        assert_eq!(info.model_tag, Some(ModelTag::new(model)));
        assert_eq!(info.nonce.as_deref(), Some("user-admin:bootstrap"));
        assert_eq!(info.addrs, vec!["10.0.0.1:17070".to_string()]);
    }

    #[test]
    fn test_error_classification() {
        let refused = ApiError::Remote {
            message: "invalid entity name or password".to_string(),
            code: Some(CODE_UNAUTHORIZED.to_string()),
        };
        assert!(refused.is_remote());
        assert!(refused.is_unauthorized());

        let status = ApiError::Status {
            status: 401,
            body: String::new(),
        };
        assert!(status.is_unauthorized());

        assert!(!ApiError::NoAddresses.is_remote());
        assert!(!ApiError::ResultCount(0).is_unauthorized());
    }
}
