// ABOUTME: Builds the immutable request handed to the source controller's InitiateMigration
// ABOUTME: Resolves model UUID, target endpoints and target credentials from the client store

use crate::error::MigrateError;
use crate::macaroon::{stored_slices, MacaroonSlice};
use crate::store::{ClientStore, ControllerDetails};

/// Everything the source controller needs to start moving a model.
///
/// Always externally controlled: the coordinator waits for an outside
/// operator to drive phases instead of running them itself.
#[derive(Clone, PartialEq, Eq)]
pub struct MigrationRequest {
    model_uuid: String,
    target_controller_uuid: String,
    target_addrs: Vec<String>,
    target_ca_cert: String,
    target_user: String,
    target_password: Option<String>,
    target_macaroons: Vec<MacaroonSlice>,
}

impl MigrationRequest {
    pub fn new(
        model_uuid: String,
        target: ControllerDetails,
        target_user: String,
        target_password: Option<String>,
        target_macaroons: Vec<MacaroonSlice>,
    ) -> Self {
        Self {
            model_uuid,
            target_controller_uuid: target.uuid,
            target_addrs: target.api_endpoints,
            target_ca_cert: target.ca_cert,
            target_user,
            target_password,
            target_macaroons,
        }
    }

    pub fn external_control(&self) -> bool {
        true
    }

    pub fn model_uuid(&self) -> &str {
        &self.model_uuid
    }

    pub fn target_controller_uuid(&self) -> &str {
        &self.target_controller_uuid
    }

    pub fn target_addrs(&self) -> &[String] {
        &self.target_addrs
    }

    pub fn target_ca_cert(&self) -> &str {
        &self.target_ca_cert
    }

    pub fn target_user(&self) -> &str {
        &self.target_user
    }

    pub fn target_password(&self) -> Option<&str> {
        self.target_password.as_deref()
    }

    pub fn target_macaroons(&self) -> &[MacaroonSlice] {
        &self.target_macaroons
    }
}

impl std::fmt::Debug for MigrationRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationRequest")
            .field("external_control", &self.external_control())
            .field("model_uuid", &self.model_uuid)
            .field("target_controller_uuid", &self.target_controller_uuid)
            .field("target_addrs", &self.target_addrs)
            .field("target_user", &self.target_user)
            .field("target_password", &self.target_password.as_ref().map(|_| "***"))
            .field("target_macaroons", &self.target_macaroons.len())
            .finish()
    }
}

/// Resolve everything needed to migrate `model` (hosted on `source_controller`)
/// to `target_controller`.
pub fn build_migration_request<S: ClientStore + ?Sized>(
    store: &S,
    source_controller: &str,
    model: &str,
    target_controller: &str,
) -> Result<MigrationRequest, MigrateError> {
    let model_uuid = store
        .model_uuid(source_controller, model)
        .map_err(MigrateError::SpecResolutionFailed)?;

    let target = store
        .controller_by_name(target_controller)
        .map_err(MigrateError::SpecResolutionFailed)?;

    let account = store
        .account_details(target_controller)
        .map_err(MigrateError::SpecResolutionFailed)?;

    let macaroons =
        stored_slices(account.macaroon.as_deref()).map_err(MigrateError::TokenDecodeFailed)?;

    tracing::debug!(
        "Built migration request for model {} to controller {} ({} endpoints)",
        model_uuid,
        target.uuid,
        target.api_endpoints.len()
    );

    Ok(MigrationRequest::new(
        model_uuid,
        target,
        account.user,
        account.password,
        macaroons,
    ))
}


#[cfg(test)]
mod tests {
    use super::testing::MemoryStore;
    use super::*;
    use crate::store::{AccountDetails, StoreError};

    const SIG_HEX: &str = "e3d9e02908526c4c0039ae15114115d97fdd68bf2ba379b342aaf0f617d0552f";

    const U1: &str = "U1";
    const CTRLID: &str = "CTRLID";

    fn store_with_token(token: Option<&str>) -> MemoryStore {
        let mut store = MemoryStore::default();
        store
            .models
            .insert(("src".to_string(), "model-a".to_string()), U1.to_string());
        store.controllers.insert(
            "ctrl-b".to_string(),
            ControllerDetails {
                uuid: CTRLID.to_string(),
                api_endpoints: vec!["h:1".to_string()],
                ca_cert: "C".to_string(),
            },
        );
        store.accounts.insert(
            "ctrl-b".to_string(),
            AccountDetails {
                user: "u".to_string(),
                password: Some("p".to_string()),
                macaroon: token.map(str::to_string),
            },
        );
        store
    }

    #[test]
    fn test_builds_request_without_token() {
        let store = store_with_token(None);
        let request = build_migration_request(&store, "src", "model-a", "ctrl-b").unwrap();

        assert!(request.external_control());
        assert_eq!(request.model_uuid(), U1);
        assert_eq!(request.target_controller_uuid(), CTRLID);
        assert_eq!(request.target_addrs().to_vec(), vec!["h:1".to_string()]);
        assert_eq!(request.target_ca_cert(), "C");
        assert_eq!(request.target_user(), "u");
        assert_eq!(request.target_password(), Some("p"));
        assert!(request.target_macaroons().is_empty());
    }

    #[test]
    fn test_empty_token_field_means_no_macaroons() {
        let store = store_with_token(Some(""));
        let request = build_migration_request(&store, "src", "model-a", "ctrl-b").unwrap();
        assert!(request.target_macaroons().is_empty());
    }

    #[test]
    fn test_stored_token_becomes_single_slice() {
        let token = format!(
            r#"{{"caveats":[],"location":"ctrl-b","identifier":"id-1","signature":"{SIG_HEX}"}}"#
        );
        let store = store_with_token(Some(&token));
        let request = build_migration_request(&store, "src", "model-a", "ctrl-b").unwrap();

        let macaroons = request.target_macaroons();
        assert_eq!(macaroons.len(), 1);
        assert_eq!(macaroons[0].len(), 1);
        assert_eq!(macaroons[0][0].identifier(), b"id-1");
    }

    #[test]
    fn test_undecodable_token() {
        let store = store_with_token(Some("{\"identifier\": 7}"));
        assert!(matches!(
            build_migration_request(&store, "src", "model-a", "ctrl-b"),
            Err(MigrateError::TokenDecodeFailed(_))
        ));
    }

    #[test]
    fn test_lookup_failures_are_resolution_errors() {
        let store = store_with_token(None);

        assert!(matches!(
            build_migration_request(&store, "src", "model-a", "nowhere"),
            Err(MigrateError::SpecResolutionFailed(StoreError::ControllerNotFound(_)))
        ));
        assert!(matches!(
            build_migration_request(&store, "src", "model-z", "ctrl-b"),
            Err(MigrateError::SpecResolutionFailed(StoreError::ModelNotFound { .. }))
        ));

        let mut no_account = store_with_token(None);
        no_account.accounts.clear();
        assert!(matches!(
            build_migration_request(&no_account, "src", "model-a", "ctrl-b"),
            Err(MigrateError::SpecResolutionFailed(StoreError::AccountNotFound(_)))
        ));
    }
}
