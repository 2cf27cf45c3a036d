// ABOUTME: Read-only view of the local controller/account/model store
// ABOUTME: Resolves controller endpoints, stored credentials and model UUIDs by name

mod file;

pub use file::{FileStore, STORE_DIR_ENV};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no current controller set; pass --controller")]
    NoCurrentController,
    #[error("controller {0:?} not found")]
    ControllerNotFound(String),
    #[error("no stored account for controller {0:?}")]
    AccountNotFound(String),
    #[error("model {model:?} not found on controller {controller:?}")]
    ModelNotFound { controller: String, model: String },
    #[error("no uuid stored for {0}")]
    MissingId(String),
    #[error("failed to read {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Where and how to reach a controller's API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerDetails {
    pub uuid: String,
    pub api_endpoints: Vec<String>,
    pub ca_cert: String,
}

/// Credentials stored for the account used on a controller.
#[derive(Clone, PartialEq, Eq)]
pub struct AccountDetails {
    pub user: String,
    pub password: Option<String>,
    /// Serialized delegated-authorization macaroon, if one was stored.
    pub macaroon: Option<String>,
}

impl std::fmt::Debug for AccountDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountDetails")
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("macaroon", &self.macaroon.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Lookups the migration driver needs from the local store.
pub trait ClientStore {
    /// Name of the controller commands talk to when none is given.
    fn current_controller(&self) -> Result<String, StoreError>;

    fn controller_by_name(&self, name: &str) -> Result<ControllerDetails, StoreError>;

    fn account_details(&self, controller: &str) -> Result<AccountDetails, StoreError>;

    /// Resolve a model name on `controller` to its UUID.
    ///
    /// Unqualified names are tried as given and then qualified with the
    /// controller account's user (`<user>/<model>`).
    fn model_uuid(&self, controller: &str, model: &str) -> Result<String, StoreError>;
}
