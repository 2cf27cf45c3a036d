// ABOUTME: HTTP client for the control-plane RPC gateway
// ABOUTME: Handles login, address fallback, CA pinning, request timeouts and error mapping

use async_trait::async_trait;
use reqwest::Client;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use url::Url;

use super::models::{
    InitiateMigrationArgs, InitiateMigrationResults, LoginRequest, LoginResult,
    MasterMigrationStatus, RpcRequest, RpcResponse, SetMigrationPhaseArgs,
};
use super::{
    ApiError, ApiInfo, ControlPlane, DialOptions, MigrationCoordinator, MigrationStatus,
};
use crate::phase::MigrationPhase;
use crate::spec::MigrationRequest;

const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

const ADMIN_FACADE: (&str, u32) = ("Admin", 3);
const CONTROLLER_FACADE: (&str, u32) = ("Controller", 11);
const MIGRATION_MASTER_FACADE: (&str, u32) = ("MigrationMaster", 3);

#[derive(Serialize)]
struct NoParams {}

/// Build a URL for `path` on `addr`. Bare `host:port` addresses get `https://`.
fn endpoint_url(addr: &str, path: &str) -> Result<Url, ApiError> {
    let invalid = |source| ApiError::InvalidAddress {
        addr: addr.to_string(),
        source,
    };
    let mut base = if addr.contains("://") {
        Url::parse(addr).map_err(invalid)?
    } else {
        Url::parse(&format!("https://{}", addr)).map_err(invalid)?
    };
    if !base.path().ends_with('/') {
        let with_slash = format!("{}/", base.path());
        base.set_path(&with_slash);
    }
    base.join(path).map_err(invalid)
}

fn build_client(ca_cert: &str, opts: &DialOptions) -> Result<Client, ApiError> {
    let mut builder = Client::builder().timeout(opts.request_timeout);

    // The controller's own CA is the only trust root.
    if !ca_cert.trim().is_empty() {
        let cert =
            reqwest::Certificate::from_pem(ca_cert.as_bytes()).map_err(ApiError::InvalidCaCert)?;
        builder = builder
            .tls_built_in_root_certs(false)
            .add_root_certificate(cert);
    }

    builder.build().map_err(ApiError::Client)
}

async fn post<P, R>(
    client: &Client,
    endpoint: &Url,
    token: Option<&str>,
    body: &RpcRequest<'_, P>,
) -> Result<R, ApiError>
where
    P: Serialize,
    R: DeserializeOwned,
{
    let payload = serde_json::to_vec(body).map_err(ApiError::Encode)?;
    let mut request = client
        .post(endpoint.clone())
        .header("Content-Type", "application/json")
        .body(payload);
    if let Some(token) = token {
        request = request.bearer_auth(token);
    }

    let response = request.send().await.map_err(|source| ApiError::Transport {
        url: endpoint.to_string(),
        source,
    })?;

    let status = response.status();
    let text = response.text().await.map_err(|source| ApiError::Transport {
        url: endpoint.to_string(),
        source,
    })?;

    if !status.is_success() {
        return Err(ApiError::Status {
            status: status.as_u16(),
            body: text,
        });
    }

    let envelope: RpcResponse = serde_json::from_str(&text).map_err(ApiError::Decode)?;
    if let Some(message) = envelope.error {
        return Err(ApiError::Remote {
            message,
            code: envelope.error_code.filter(|c| !c.is_empty()),
        });
    }

    serde_json::from_value(envelope.response.unwrap_or(serde_json::Value::Null))
        .map_err(ApiError::Decode)
}

/// A logged-in session with one API endpoint.
pub struct ApiConnection {
    client: Client,
    endpoint: Url,
    token: String,
    next_id: AtomicU64,
}

impl ApiConnection {
    /// Log in at the first address that answers.
    ///
    /// Addresses that cannot be reached are skipped. If an address answers
    /// and refuses the login, the refusal is returned straight away.
    pub async fn open(info: &ApiInfo, opts: &DialOptions) -> Result<Self, ApiError> {
        if info.addrs.is_empty() {
            return Err(ApiError::NoAddresses);
        }
        let client = build_client(&info.ca_cert, opts)?;
        let path = match &info.model_tag {
            Some(tag) => format!("model/{}/api", tag.id()),
            None => "api".to_string(),
        };

        let mut last_error = None;
        for addr in &info.addrs {
            let endpoint = endpoint_url(addr, &path)?;
            match Self::login(client.clone(), endpoint, info).await {
                Ok(conn) => return Ok(conn),
                Err(e) if e.is_remote() => return Err(e),
                Err(e) => {
                    tracing::warn!("Failed to connect to {}: {}", addr, e);
                    last_error = Some(e);
                }
            }
        }

        Err(ApiError::AllAddressesFailed {
            attempted: info.addrs.len(),
            last: Box::new(last_error.unwrap_or(ApiError::NoAddresses)),
        })
    }

    async fn login(client: Client, endpoint: Url, info: &ApiInfo) -> Result<Self, ApiError> {
        let params = LoginRequest {
            auth_tag: info.tag.to_string(),
            credentials: info.password.clone(),
            nonce: info.nonce.clone(),
            macaroons: info.macaroons.clone(),
            client_version: CLIENT_VERSION.to_string(),
        };
        let (facade, version) = ADMIN_FACADE;
        let request = RpcRequest {
            request_id: 0,
            facade,
            version,
            request: "Login",
            params: &params,
        };

        let result: LoginResult = post(&client, &endpoint, None, &request).await?;
        tracing::debug!(
            "Logged in to {} as {} (server version {})",
            endpoint,
            info.tag,
            result.server_version.as_deref().unwrap_or("unknown")
        );

        Ok(Self {
            client,
            endpoint,
            token: result.session_token,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Make one facade call on this connection.
    pub async fn call<P, R>(
        &self,
        (facade, version): (&str, u32),
        request: &str,
        params: &P,
    ) -> Result<R, ApiError>
    where
        P: Serialize + Sync,
        R: DeserializeOwned,
    {
        let request_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("-> {}.{} (request {})", facade, request, request_id);
        let body = RpcRequest {
            request_id,
            facade,
            version,
            request,
            params,
        };
        post(&self.client, &self.endpoint, Some(&self.token), &body).await
    }
}

/// Control-plane reached through its HTTP RPC gateway.
#[derive(Debug, Clone, Default)]
pub struct HttpControlPlane {
    opts: DialOptions,
}

impl HttpControlPlane {
    pub fn new(opts: DialOptions) -> Self {
        Self { opts }
    }
}

#[async_trait]
impl ControlPlane for HttpControlPlane {
    type Coordinator = HttpCoordinator;

    async fn initiate_migration(
        &self,
        controller: &ApiInfo,
        request: &MigrationRequest,
    ) -> Result<String, ApiError> {
        let conn = ApiConnection::open(controller, &self.opts).await?;
        let args = InitiateMigrationArgs::new(request).map_err(ApiError::Encode)?;

        let results: InitiateMigrationResults = conn
            .call(CONTROLLER_FACADE, "InitiateMigration", &args)
            .await?;
        if results.results.len() != 1 {
            return Err(ApiError::ResultCount(results.results.len()));
        }
        let result = results
            .results
            .into_iter()
            .next()
            .ok_or(ApiError::ResultCount(0))?;

        if let Some(error) = result.error {
            return Err(ApiError::Remote {
                message: error.message,
                code: error.code,
            });
        }
        Ok(result.migration_id)
    }

    async fn connect_coordinator(&self, info: &ApiInfo) -> Result<HttpCoordinator, ApiError> {
        let conn = ApiConnection::open(info, &self.opts).await?;
        tracing::debug!("Connected to migration coordinator at {}", conn.endpoint());
        Ok(HttpCoordinator { conn })
    }
}

/// Migration coordinator session over a model-scoped connection.
pub struct HttpCoordinator {
    conn: ApiConnection,
}

#[async_trait]
impl MigrationCoordinator for HttpCoordinator {
    async fn migration_status(&self) -> Result<MigrationStatus, ApiError> {
        let status: MasterMigrationStatus = self
            .conn
            .call(MIGRATION_MASTER_FACADE, "MigrationStatus", &NoParams {})
            .await?;
        Ok(MigrationStatus {
            migration_id: status.migration_id,
            phase: status.phase,
            phase_changed_time: status.phase_changed_time,
        })
    }

    async fn set_phase(&self, phase: MigrationPhase) -> Result<(), ApiError> {
        let _: IgnoredAny = self
            .conn
            .call(
                MIGRATION_MASTER_FACADE,
                "SetPhase",
                &SetMigrationPhaseArgs { phase },
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_url_defaults_to_https() {
        let url = endpoint_url("10.0.0.1:17070", "api").unwrap();
        assert_eq!(url.as_str(), "https://10.0.0.1:17070/api");

        let url = endpoint_url("[::1]:17070", "model/abc/api").unwrap();
        assert_eq!(url.as_str(), "https://[::1]:17070/model/abc/api");
    }

    #[test]
    fn test_endpoint_url_keeps_explicit_scheme_and_prefix() {
        let url = endpoint_url("http://127.0.0.1:8080", "api").unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:8080/api");

        let url = endpoint_url("https://gateway.example.com/ctrl", "api").unwrap();
        assert_eq!(url.as_str(), "https://gateway.example.com/ctrl/api");
    }

    #[test]
    fn test_endpoint_url_rejects_garbage() {
        assert!(matches!(
            endpoint_url("http://", "api"),
            Err(ApiError::InvalidAddress { .. })
        ));
    }

    #[test]
    fn test_client_creation() {
        assert!(build_client("", &DialOptions::default()).is_ok());
    }

    #[test]
    fn test_client_rejects_bad_ca_cert() {
        assert!(matches!(
            build_client("not a certificate", &DialOptions::default()),
            Err(ApiError::InvalidCaCert(_))
        ));
    }

    #[tokio::test]
    async fn test_open_without_addresses() {
        let info = ApiInfo {
            addrs: Vec::new(),
            ca_cert: String::new(),
            model_tag: None,
            tag: crate::names::AuthTag::User(crate::names::UserTag::new("admin")),
            password: None,
            nonce: None,
            macaroons: Vec::new(),
        };
        assert!(matches!(
            ApiConnection::open(&info, &DialOptions::default()).await,
            Err(ApiError::NoAddresses)
        ));
    }
}
