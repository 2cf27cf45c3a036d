// ABOUTME: JSON-file backed client store under ~/.ext-migrate (or EXT_MIGRATE_STORE_DIR)
// ABOUTME: controllers.json, accounts.json and models.json; missing files read as empty

use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::{AccountDetails, ClientStore, ControllerDetails, StoreError};

/// Environment variable overriding the store directory.
pub const STORE_DIR_ENV: &str = "EXT_MIGRATE_STORE_DIR";
const STORE_DIR_NAME: &str = ".ext-migrate";

const CONTROLLERS_FILE: &str = "controllers.json";
const ACCOUNTS_FILE: &str = "accounts.json";
const MODELS_FILE: &str = "models.json";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ControllersFile {
    #[serde(default)]
    current_controller: Option<String>,
    #[serde(default)]
    controllers: HashMap<String, ControllerEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ControllerEntry {
    uuid: String,
    #[serde(default)]
    api_endpoints: Vec<String>,
    #[serde(default)]
    ca_cert: String,
}

#[derive(Debug, Default, Deserialize)]
struct AccountsFile {
    #[serde(default)]
    controllers: HashMap<String, AccountEntry>,
}

#[derive(Debug, Deserialize)]
struct AccountEntry {
    user: String,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    macaroon: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ModelsFile {
    #[serde(default)]
    controllers: HashMap<String, ControllerModels>,
}

#[derive(Debug, Default, Deserialize)]
struct ControllerModels {
    #[serde(default)]
    models: HashMap<String, ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    uuid: String,
}

/// Client store reading JSON files from a directory.
///
/// Files are read on every lookup; the store is never written.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store in `$EXT_MIGRATE_STORE_DIR`, falling back to `~/.ext-migrate`.
    pub fn default_location() -> anyhow::Result<Self> {
        if let Ok(custom) = std::env::var(STORE_DIR_ENV) {
            return Ok(Self::new(custom));
        }
        let home_dir =
            dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Could not find home directory"))?;
        Ok(Self::new(home_dir.join(STORE_DIR_NAME)))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn load<T: DeserializeOwned + Default>(&self, file: &str) -> Result<T, StoreError> {
        let path = self.dir.join(file);
        if !path.exists() {
            tracing::debug!("{} does not exist, treating as empty", path.display());
            return Ok(T::default());
        }
        let content = std::fs::read_to_string(&path).map_err(|source| StoreError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| StoreError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}

/// Ids are opaque to this tool; only a blank one is refused.
fn stored_id(entry: String, value: String) -> Result<String, StoreError> {
    if value.trim().is_empty() {
        return Err(StoreError::MissingId(entry));
    }
    Ok(value)
}

impl ClientStore for FileStore {
    fn current_controller(&self) -> Result<String, StoreError> {
        let controllers: ControllersFile = self.load(CONTROLLERS_FILE)?;
        controllers
            .current_controller
            .filter(|name| !name.is_empty())
            .ok_or(StoreError::NoCurrentController)
    }

    fn controller_by_name(&self, name: &str) -> Result<ControllerDetails, StoreError> {
        let mut controllers: ControllersFile = self.load(CONTROLLERS_FILE)?;
        let entry = controllers
            .controllers
            .remove(name)
            .ok_or_else(|| StoreError::ControllerNotFound(name.to_string()))?;

        Ok(ControllerDetails {
            uuid: stored_id(format!("controller {name:?}"), entry.uuid)?,
            api_endpoints: entry.api_endpoints,
            ca_cert: entry.ca_cert,
        })
    }

    fn account_details(&self, controller: &str) -> Result<AccountDetails, StoreError> {
        let mut accounts: AccountsFile = self.load(ACCOUNTS_FILE)?;
        let entry = accounts
            .controllers
            .remove(controller)
            .ok_or_else(|| StoreError::AccountNotFound(controller.to_string()))?;

        Ok(AccountDetails {
            user: entry.user,
            password: entry.password.filter(|p| !p.is_empty()),
            macaroon: entry.macaroon.filter(|m| !m.trim().is_empty()),
        })
    }

    fn model_uuid(&self, controller: &str, model: &str) -> Result<String, StoreError> {
        let mut models: ModelsFile = self.load(MODELS_FILE)?;
        let controller_models = models.controllers.remove(controller).unwrap_or_default();

        let mut candidates = vec![model.to_string()];
        if !model.contains('/') {
            match self.account_details(controller) {
                Ok(account) => candidates.push(format!("{}/{}", account.user, model)),
                Err(StoreError::AccountNotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        let mut by_name = controller_models.models;
        for name in &candidates {
            if let Some(entry) = by_name.remove(name) {
                tracing::debug!("Resolved model {} on {} as {}", name, controller, entry.uuid);
                return stored_id(format!("model {name:?}"), entry.uuid);
            }
        }

        Err(StoreError::ModelNotFound {
            controller: controller.to_string(),
            model: model.to_string(),
        })
    }
}
