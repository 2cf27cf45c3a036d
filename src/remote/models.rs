// ABOUTME: Wire structures for the control-plane RPC envelope and facade calls
// ABOUTME: These are serialized to JSON with kebab-case field names

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::macaroon::MacaroonSlice;
use crate::names::{ControllerTag, ModelTag, UserTag};
use crate::phase::MigrationPhase;
use crate::spec::MigrationRequest;

#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct RpcRequest<'a, P> {
    pub request_id: u64,
    #[serde(rename = "type")]
    pub facade: &'a str,
    pub version: u32,
    pub request: &'a str,
    pub params: &'a P,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RpcResponse {
    #[serde(default)]
    pub response: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_code: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct LoginRequest {
    pub auth_tag: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub macaroons: Vec<MacaroonSlice>,
    pub client_version: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LoginResult {
    pub session_token: String,
    #[serde(default)]
    pub server_version: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct MigrationTargetInfo {
    pub controller_tag: String,
    pub addrs: Vec<String>,
    pub ca_cert: String,
    pub auth_tag: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// JSON-encoded list of macaroon slices.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub macaroons: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct MigrationSpecWire {
    pub model_tag: String,
    pub target_info: MigrationTargetInfo,
    pub external_control: bool,
}

#[derive(Debug, Serialize)]
pub struct InitiateMigrationArgs {
    pub specs: Vec<MigrationSpecWire>,
}

impl InitiateMigrationArgs {
    pub fn new(request: &MigrationRequest) -> Result<Self, serde_json::Error> {
        let macaroons = if request.target_macaroons().is_empty() {
            None
        } else {
            Some(serde_json::to_string(request.target_macaroons())?)
        };

        Ok(Self {
            specs: vec![MigrationSpecWire {
                model_tag: ModelTag::new(request.model_uuid()).to_string(),
                target_info: MigrationTargetInfo {
                    controller_tag: ControllerTag::new(request.target_controller_uuid())
                        .to_string(),
                    addrs: request.target_addrs().to_vec(),
                    ca_cert: request.target_ca_cert().to_string(),
                    auth_tag: UserTag::new(request.target_user()).to_string(),
                    password: request.target_password().map(str::to_string),
                    macaroons,
                },
                external_control: request.external_control(),
            }],
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResult {
    pub message: String,
    #[serde(default)]
    pub code: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct InitiateMigrationResult {
    #[serde(default)]
    pub migration_id: String,
    #[serde(default)]
    pub error: Option<ErrorResult>,
}

#[derive(Debug, Deserialize)]
pub struct InitiateMigrationResults {
    #[serde(default)]
    pub results: Vec<InitiateMigrationResult>,
}

#[derive(Debug, Serialize)]
pub struct SetMigrationPhaseArgs {
    pub phase: MigrationPhase,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct MasterMigrationStatus {
    pub migration_id: String,
    pub phase: MigrationPhase,
    #[serde(default)]
    pub phase_changed_time: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ControllerDetails;

    fn request(macaroons: Vec<MacaroonSlice>) -> MigrationRequest {
        MigrationRequest::new(
            "11111111-1111-4111-8111-111111111111".to_string(),
            ControllerDetails {
                uuid: "c7c7c7c7-0000-4000-8000-000000000001".to_string(),
                api_endpoints: vec!["h:1".to_string()],
                ca_cert: "C".to_string(),
            },
            "u".to_string(),
            Some("p".to_string()),
            macaroons,
        )
    }

    #[test]
    fn test_initiate_args_serialization() {
        let args = InitiateMigrationArgs::new(&request(Vec::new())).unwrap();
        let value = serde_json::to_value(&args).unwrap();
        let spec = &value["specs"][0];

        assert_eq!(spec["model-tag"], "model-11111111-1111-4111-8111-111111111111");
        assert_eq!(spec["external-control"], true);
        assert_eq!(
            spec["target-info"]["controller-tag"],
            "controller-c7c7c7c7-0000-4000-8000-000000000001"
        );
        assert_eq!(spec["target-info"]["addrs"], serde_json::json!(["h:1"]));
        assert_eq!(spec["target-info"]["ca-cert"], "C");
        assert_eq!(spec["target-info"]["auth-tag"], "user-u");
        assert_eq!(spec["target-info"]["password"], "p");
        assert!(spec["target-info"].get("macaroons").is_none());
    }

    #[test]
    fn test_macaroons_sent_as_json_string() {
        let mac = crate::macaroon::Macaroon::decode(
            r#"{"location":"loc","identifier":"id","signature":"e3d9e02908526c4c0039ae15114115d97fdd68bf2ba379b342aaf0f617d0552f"}"#,
        )
        .unwrap();
        let args = InitiateMigrationArgs::new(&request(vec![vec![mac]])).unwrap();
        let encoded = args.specs[0].target_info.macaroons.as_deref().unwrap();

        let decoded: serde_json::Value = serde_json::from_str(encoded).unwrap();
        assert_eq!(decoded[0][0]["i"], "id");
        assert_eq!(decoded[0][0]["l"], "loc");
    }

    #[test]
    fn test_rpc_envelope() {
        let params = SetMigrationPhaseArgs {
            phase: MigrationPhase::Abort,
        };
        let request = RpcRequest {
            request_id: 7,
            facade: "MigrationMaster",
            version: 1,
            request: "SetPhase",
            params: &params,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "request-id": 7,
                "type": "MigrationMaster",
                "version": 1,
                "request": "SetPhase",
                "params": {"phase": "ABORT"}
            })
        );

        let response: RpcResponse = serde_json::from_str(
            r#"{"request-id":7,"error":"illegal phase transition","error-code":"bad request"}"#,
        )
        .unwrap();
        assert_eq!(response.error.as_deref(), Some("illegal phase transition"));
        assert_eq!(response.error_code.as_deref(), Some("bad request"));
        assert!(response.response.is_none());
    }

    #[test]
    fn test_master_status_parsing() {
        let status: MasterMigrationStatus = serde_json::from_str(
            r#"{"migration-id":"abc:0","phase":"QUIESCE","phase-changed-time":"2026-10-18T09:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(status.migration_id, "abc:0");
        assert_eq!(status.phase, MigrationPhase::Quiesce);
        assert!(status.phase_changed_time.is_some());
    }
}
