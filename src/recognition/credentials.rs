//! Credential resolution for the Google Speech API.
//!
//! Credentials are resolved once at startup, before the recognition client
//! is built. Service-account keys are exchanged for short-lived OAuth
//! bearer tokens using a signed JWT assertion; user credentials written by
//! `gcloud auth application-default login` are exchanged using their
//! refresh token.

use crate::config::RecognitionSettings;
use crate::error::{Result, StemmeError};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Environment variable that may carry a whole credentials document.
pub const CREDENTIALS_JSON_VAR: &str = "GOOGLE_CREDENTIALS_JSON";

/// Environment variable that relocates the gcloud configuration directory.
pub const GCLOUD_CONFIG_VAR: &str = "CLOUDSDK_CONFIG";

/// File gcloud writes application default credentials to.
const ADC_FILENAME: &str = "application_default_credentials.json";

const OAUTH_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const REFRESH_TOKEN_GRANT: &str = "refresh_token";

/// Assertions are valid for one hour, the maximum Google accepts.
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Refresh tokens this long before the service says they expire.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

/// Service-account key as downloaded from the Google Cloud console.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub project_id: Option<String>,
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .field("project_id", &self.project_id)
            .finish_non_exhaustive()
    }
}

impl ServiceAccountKey {
    /// Parse a service-account JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| StemmeError::Credentials(format!("Invalid service account JSON: {}", e)))
    }
}

/// End-user OAuth client credentials with a long-lived refresh token.
#[derive(Clone, Deserialize)]
pub struct AuthorizedUser {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub quota_project_id: Option<String>,
}

impl std::fmt::Debug for AuthorizedUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizedUser")
            .field("client_id", &self.client_id)
            .field("token_uri", &self.token_uri)
            .field("quota_project_id", &self.quota_project_id)
            .finish_non_exhaustive()
    }
}

impl AuthorizedUser {
    /// Parse an `authorized_user` JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| StemmeError::Credentials(format!("Invalid user credentials JSON: {}", e)))
    }
}

#[derive(Deserialize)]
struct CredentialsKind {
    #[serde(rename = "type", default)]
    kind: Option<String>,
}

/// Where recognition requests get their authorization from.
#[derive(Debug, Clone)]
pub enum CredentialSource {
    /// No credentials; requests are sent unauthenticated.
    None,
    /// Google API key, appended as the `key` query parameter.
    ApiKey(String),
    /// Service account, exchanged for OAuth bearer tokens.
    ServiceAccount(ServiceAccountKey),
    /// User credentials, refreshed into OAuth bearer tokens.
    AuthorizedUser(AuthorizedUser),
}

impl CredentialSource {
    /// Resolve credentials from settings and the process environment.
    pub fn resolve(settings: &RecognitionSettings) -> Result<Self> {
        Self::resolve_with(settings, |key| std::env::var(key).ok())
    }

    /// Resolve credentials using an arbitrary variable lookup.
    ///
    /// Precedence: API key, injected credentials JSON, credentials file,
    /// gcloud application default credentials, nothing.
    pub fn resolve_with<F>(settings: &RecognitionSettings, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = settings.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
            return Ok(CredentialSource::ApiKey(key.trim().to_string()));
        }

        if let Some(json) = lookup(CREDENTIALS_JSON_VAR).filter(|j| !j.trim().is_empty()) {
            let source = Self::from_json(&json)?;
            debug!("Using {} from {}", source.describe(), CREDENTIALS_JSON_VAR);
            return Ok(source);
        }

        if let Some(path) = settings.credentials_path() {
            let source = Self::from_file(&path)?;
            debug!("Using {} from {:?}", source.describe(), path);
            return Ok(source);
        }

        if let Some(path) = application_default_path(&lookup).filter(|p| p.is_file()) {
            let source = Self::from_file(&path)?;
            debug!("Using {} from {:?}", source.describe(), path);
            return Ok(source);
        }

        Ok(CredentialSource::None)
    }

    /// Parse a credentials document, dispatching on its `type` field.
    ///
    /// Documents without a `type` are read as service-account keys.
    pub fn from_json(json: &str) -> Result<Self> {
        let kind: CredentialsKind = serde_json::from_str(json)
            .map_err(|e| StemmeError::Credentials(format!("Invalid credentials JSON: {}", e)))?;

        match kind.kind.as_deref() {
            None | Some("service_account") => {
                ServiceAccountKey::from_json(json).map(CredentialSource::ServiceAccount)
            }
            Some("authorized_user") => {
                AuthorizedUser::from_json(json).map(CredentialSource::AuthorizedUser)
            }
            Some(other) => Err(StemmeError::Credentials(format!(
                "Unsupported credential type: {}",
                other
            ))),
        }
    }

    /// Read and parse a credentials file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            StemmeError::Credentials(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    /// Short human-readable description, safe to log.
    pub fn describe(&self) -> String {
        match self {
            CredentialSource::None => "none".to_string(),
            CredentialSource::ApiKey(_) => "API key".to_string(),
            CredentialSource::ServiceAccount(key) => {
                format!("service account {}", key.client_email)
            }
            CredentialSource::AuthorizedUser(user) => {
                format!("user credentials for client {}", user.client_id)
            }
        }
    }
}

/// Location of gcloud's application default credentials file.
///
/// gcloud keeps its configuration under `%APPDATA%\gcloud` on Windows and
/// `~/.config/gcloud` elsewhere, unless `CLOUDSDK_CONFIG` points somewhere
/// else.
fn application_default_path<F>(lookup: &F) -> Option<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    let config_dir = match lookup(GCLOUD_CONFIG_VAR).filter(|d| !d.trim().is_empty()) {
        Some(dir) => PathBuf::from(dir),
        None if cfg!(windows) => dirs::config_dir()?.join("gcloud"),
        None => dirs::home_dir()?.join(".config").join("gcloud"),
    };
    Some(config_dir.join(ADC_FILENAME))
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// How a fresh access token is obtained.
enum Grant {
    ServiceAccount {
        key: ServiceAccountKey,
        encoding_key: EncodingKey,
    },
    AuthorizedUser(AuthorizedUser),
}

/// Mints and caches OAuth access tokens.
pub struct TokenProvider {
    grant: Grant,
    client: reqwest::Client,
    cached: Mutex<Option<CachedToken>>,
}

impl std::fmt::Debug for TokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenProvider")
            .field("account", &self.account())
            .field("token_uri", &self.token_uri())
            .finish_non_exhaustive()
    }
}

impl TokenProvider {
    /// Create a token provider for a service account, validating the
    /// private key up front.
    pub fn new(key: ServiceAccountKey, client: reqwest::Client) -> Result<Self> {
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| StemmeError::Credentials(format!("Invalid private key: {}", e)))?;

        Ok(Self::with_grant(Grant::ServiceAccount { key, encoding_key }, client))
    }

    /// Create a token provider that refreshes user credentials.
    pub fn for_user(user: AuthorizedUser, client: reqwest::Client) -> Self {
        Self::with_grant(Grant::AuthorizedUser(user), client)
    }

    fn with_grant(grant: Grant, client: reqwest::Client) -> Self {
        Self {
            grant,
            client,
            cached: Mutex::new(None),
        }
    }

    fn account(&self) -> &str {
        match &self.grant {
            Grant::ServiceAccount { key, .. } => &key.client_email,
            Grant::AuthorizedUser(user) => &user.client_id,
        }
    }

    fn token_uri(&self) -> &str {
        match &self.grant {
            Grant::ServiceAccount { key, .. } => &key.token_uri,
            Grant::AuthorizedUser(user) => &user.token_uri,
        }
    }

    /// Return a valid access token, exchanging the grant if needed.
    pub async fn access_token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;

        if let Some(ref token) = *cached {
            if Instant::now() < token.expires_at {
                return Ok(token.token.clone());
            }
        }

        let response = self.exchange().await?;
        let lifetime = Duration::from_secs(response.expires_in).saturating_sub(REFRESH_MARGIN);
        *cached = Some(CachedToken {
            token: response.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });

        info!(
            account = %self.account(),
            expires_in = response.expires_in,
            "Obtained access token"
        );
        Ok(response.access_token)
    }

    fn sign_assertion(key: &ServiceAccountKey, encoding_key: &EncodingKey) -> Result<String> {
        let now = chrono::Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: &key.client_email,
            scope: OAUTH_SCOPE,
            aud: &key.token_uri,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };

        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, encoding_key)
            .map_err(|e| StemmeError::Credentials(format!("JWT signing failed: {}", e)))
    }

    async fn exchange(&self) -> Result<TokenResponse> {
        let request = match &self.grant {
            Grant::ServiceAccount { key, encoding_key } => {
                let assertion = Self::sign_assertion(key, encoding_key)?;
                self.client
                    .post(&key.token_uri)
                    .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            }
            Grant::AuthorizedUser(user) => self.client.post(&user.token_uri).form(&[
                ("grant_type", REFRESH_TOKEN_GRANT),
                ("client_id", user.client_id.as_str()),
                ("client_secret", user.client_secret.as_str()),
                ("refresh_token", user.refresh_token.as_str()),
            ]),
        };

        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StemmeError::Credentials(format!(
                "Token exchange failed ({}): {}",
                status, body
            )));
        }

        Ok(response.json::<TokenResponse>().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SERVICE_ACCOUNT: &str = include_str!("../../tests/fixtures/service_account.json");
    const AUTHORIZED_USER: &str = include_str!("../../tests/fixtures/authorized_user.json");

    fn no_env(_: &str) -> Option<String> {
        None
    }

    /// Lookup that points gcloud's configuration at `dir` and sets nothing else.
    fn gcloud_config(dir: &Path) -> impl Fn(&str) -> Option<String> {
        let dir = dir.to_string_lossy().into_owned();
        move |key: &str| (key == GCLOUD_CONFIG_VAR).then(|| dir.clone())
    }

    #[test]
    fn test_api_key_takes_precedence() {
        let settings = RecognitionSettings {
            api_key: Some("AIza-test".to_string()),
            credentials_file: Some("/does/not/exist.json".to_string()),
            ..Default::default()
        };

        let source = CredentialSource::resolve_with(&settings, |key| {
            (key == CREDENTIALS_JSON_VAR).then(|| SERVICE_ACCOUNT.to_string())
        })
        .unwrap();

        assert!(matches!(source, CredentialSource::ApiKey(ref k) if k == "AIza-test"));
    }

    #[test]
    fn test_injected_json_before_file() {
        let settings = RecognitionSettings {
            credentials_file: Some("/does/not/exist.json".to_string()),
            ..Default::default()
        };

        let source = CredentialSource::resolve_with(&settings, |key| {
            (key == CREDENTIALS_JSON_VAR).then(|| SERVICE_ACCOUNT.to_string())
        })
        .unwrap();

        match source {
            CredentialSource::ServiceAccount(key) => {
                assert_eq!(key.client_email, "stemme-test@stemme-test.iam.gserviceaccount.com");
                assert_eq!(key.project_id.as_deref(), Some("stemme-test"));
            }
            other => panic!("unexpected source: {:?}", other),
        }
    }

    #[test]
    fn test_credentials_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("sa.json");
        std::fs::write(&file, SERVICE_ACCOUNT).unwrap();

        let settings = RecognitionSettings {
            credentials_file: Some(file.to_string_lossy().into_owned()),
            ..Default::default()
        };

        let source = CredentialSource::resolve_with(&settings, no_env).unwrap();
        assert!(matches!(source, CredentialSource::ServiceAccount(_)));
        assert!(source.describe().contains("stemme-test@"));
    }

    #[test]
    fn test_missing_credentials_file_is_an_error() {
        let settings = RecognitionSettings {
            credentials_file: Some("/does/not/exist.json".to_string()),
            ..Default::default()
        };

        let err = CredentialSource::resolve_with(&settings, no_env).unwrap_err();
        assert!(matches!(err, StemmeError::Credentials(_)));
    }

    #[test]
    fn test_nothing_configured() {
        let dir = tempfile::tempdir().unwrap();
        let source =
            CredentialSource::resolve_with(&RecognitionSettings::default(), gcloud_config(dir.path()))
                .unwrap();
        assert!(matches!(source, CredentialSource::None));
        assert_eq!(source.describe(), "none");
    }

    #[test]
    fn test_application_default_user_credentials() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(ADC_FILENAME), AUTHORIZED_USER).unwrap();

        let source =
            CredentialSource::resolve_with(&RecognitionSettings::default(), gcloud_config(dir.path()))
                .unwrap();

        match source {
            CredentialSource::AuthorizedUser(user) => {
                assert_eq!(user.client_id, "stemme-test.apps.googleusercontent.com");
                assert_eq!(user.refresh_token, "stemme-test-refresh-token");
                assert_eq!(user.token_uri, "https://oauth2.googleapis.com/token");
            }
            other => panic!("unexpected source: {:?}", other),
        }
    }

    #[test]
    fn test_application_default_service_account() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(ADC_FILENAME), SERVICE_ACCOUNT).unwrap();

        let source =
            CredentialSource::resolve_with(&RecognitionSettings::default(), gcloud_config(dir.path()))
                .unwrap();
        assert!(matches!(source, CredentialSource::ServiceAccount(_)));
    }

    #[test]
    fn test_credentials_file_before_application_default() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(ADC_FILENAME), AUTHORIZED_USER).unwrap();
        let file = dir.path().join("sa.json");
        std::fs::write(&file, SERVICE_ACCOUNT).unwrap();

        let settings = RecognitionSettings {
            credentials_file: Some(file.to_string_lossy().into_owned()),
            ..Default::default()
        };

        let source = CredentialSource::resolve_with(&settings, gcloud_config(dir.path())).unwrap();
        assert!(matches!(source, CredentialSource::ServiceAccount(_)));
    }

    #[test]
    fn test_unsupported_credential_type() {
        let err = CredentialSource::from_json(r#"{"type": "external_account"}"#).unwrap_err();
        assert!(err.to_string().contains("external_account"));
    }

    #[test]
    fn test_debug_hides_user_secrets() {
        let rendered = format!("{:?}", CredentialSource::from_json(AUTHORIZED_USER).unwrap());
        assert!(rendered.contains("stemme-test.apps.googleusercontent.com"));
        assert!(!rendered.contains("stemme-test-client-secret"));
        assert!(!rendered.contains("stemme-test-refresh-token"));
    }

    #[test]
    fn test_debug_hides_private_key() {
        let key = ServiceAccountKey::from_json(SERVICE_ACCOUNT).unwrap();
        let rendered = format!("{:?}", key);
        assert!(!rendered.contains("PRIVATE KEY"));
    }

    #[test]
    fn test_invalid_private_key_rejected() {
        let mut key = ServiceAccountKey::from_json(SERVICE_ACCOUNT).unwrap();
        key.private_key = "not a pem".to_string();
        let err = TokenProvider::new(key, reqwest::Client::new()).unwrap_err();
        assert!(matches!(err, StemmeError::Credentials(_)));
    }

    #[tokio::test]
    async fn test_token_exchange_is_cached() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Ajwt-bearer"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.test-token",
                "expires_in": 3599,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut key = ServiceAccountKey::from_json(SERVICE_ACCOUNT).unwrap();
        key.token_uri = format!("{}/token", server.uri());

        let provider = TokenProvider::new(key, reqwest::Client::new()).unwrap();
        assert_eq!(provider.access_token().await.unwrap(), "ya29.test-token");
        assert_eq!(provider.access_token().await.unwrap(), "ya29.test-token");
    }

    #[tokio::test]
    async fn test_token_exchange_failure() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant"
            })))
            .mount(&server)
            .await;

        let mut key = ServiceAccountKey::from_json(SERVICE_ACCOUNT).unwrap();
        key.token_uri = format!("{}/token", server.uri());

        let provider = TokenProvider::new(key, reqwest::Client::new()).unwrap();
        let err = provider.access_token().await.unwrap_err();
        assert!(err.to_string().contains("invalid_grant"));
    }

    #[tokio::test]
    async fn test_refresh_token_exchange_is_cached() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=stemme-test-refresh-token"))
            .and(body_string_contains("client_secret=stemme-test-client-secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.user-token",
                "expires_in": 3599,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut user = AuthorizedUser::from_json(AUTHORIZED_USER).unwrap();
        user.token_uri = format!("{}/token", server.uri());

        let provider = TokenProvider::for_user(user, reqwest::Client::new());
        assert_eq!(provider.access_token().await.unwrap(), "ya29.user-token");
        assert_eq!(provider.access_token().await.unwrap(), "ya29.user-token");
    }
}
