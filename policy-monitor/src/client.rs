use jsonwebtoken::{Algorithm, EncodingKey, Header};
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::RsaPrivateKey;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::{DEFAULT_AUTH_CONNECT_TIMEOUT_SECS, DEFAULT_AUTH_REQUEST_TIMEOUT_SECS};

/// Default OAuth2 token endpoint path.
const DEFAULT_TOKEN_PATH: &str = "/services/oauth2/token";

/// Grant type of the OAuth2 JWT bearer flow.
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Lifetime (in seconds) of the signed assertion sent to the token endpoint.
const ASSERTION_LIFETIME_SECS: u64 = 300;

/// Buffer time (in seconds) before token expiry to trigger a new exchange.
/// Tokens are replaced 5 minutes before they expire to avoid race conditions.
const TOKEN_REFRESH_BUFFER_SECONDS: u64 = 300;

/// Assumed session lifetime (in seconds). The JWT bearer grant does not
/// return `expires_in`; 2 hours is the Salesforce org default.
const DEFAULT_SESSION_LIFETIME_SECS: u64 = 7200;

/// Token endpoint success response.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub(crate) access_token: String,
    pub(crate) instance_url: String,
    #[serde(default)]
    pub(crate) token_type: Option<String>,
    #[serde(default)]
    pub(crate) scope: Option<String>,
}

/// Token endpoint error response.
#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// Claims of the JWT bearer assertion.
#[derive(Debug, Serialize)]
struct Claims<'a> {
    /// Consumer key of the Connected App.
    iss: &'a str,
    /// Username the assertion is issued for.
    sub: &'a str,
    /// The OAuth login URL.
    aud: &'a str,
    /// Unix timestamp (seconds) when the assertion expires.
    exp: u64,
}

/// Internal state for managing token lifecycle.
#[derive(Debug, Clone)]
pub(crate) struct TokenState {
    /// The current access token.
    access_token: String,
    /// Instance URL returned alongside the token.
    instance_url: String,
    /// Unix timestamp (seconds) when the token expires.
    expires_at: u64,
}

impl TokenState {
    /// Creates a new token state from a token endpoint response.
    pub(crate) fn new(response: TokenResponse) -> Result<Self, Error> {
        let now = unix_now()?;
        let expires_at = now
            .checked_add(DEFAULT_SESSION_LIFETIME_SECS)
            .ok_or(Error::TokenExpiryOverflow)?;

        Ok(Self {
            access_token: response.access_token,
            instance_url: response.instance_url,
            expires_at,
        })
    }

    /// Returns true if the token is expired or will expire within the buffer time.
    fn is_expired(&self, buffer_seconds: u64) -> Result<bool, Error> {
        let now = unix_now()?;
        let threshold = now
            .checked_add(buffer_seconds)
            .ok_or(Error::TimeThresholdOverflow)?;

        Ok(threshold >= self.expires_at)
    }
}

fn unix_now() -> Result<u64, Error> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|source| Error::SystemTimeError { source })?
        .as_secs())
}

/// Errors that can occur during client operations.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Failed to read credentials file from disk.
    #[error("Failed to read credentials file at {path}: {source}")]
    ReadCredentials {
        /// Path to the credentials file that failed to read.
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Failed to parse credentials JSON.
    #[error("Failed to parse credentials JSON: {source}")]
    ParseCredentials {
        #[source]
        source: serde_json::Error,
    },
    /// Failed to read the private key file from disk.
    #[error("Failed to read private key at {path}: {source}")]
    ReadPrivateKey {
        /// Path to the private key that failed to read.
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Failed to decrypt a passphrase-protected private key.
    #[error("Failed to decrypt private key: {source}")]
    DecryptPrivateKey {
        #[source]
        source: rsa::pkcs8::Error,
    },
    /// Failed to re-encode the decrypted private key for signing.
    #[error("Failed to re-encode private key: {source}")]
    EncodePrivateKey {
        #[source]
        source: rsa::pkcs1::Error,
    },
    /// The private key is not a usable RSA PEM key.
    #[error("Invalid RSA private key: {source}")]
    InvalidPrivateKey {
        #[source]
        source: jsonwebtoken::errors::Error,
    },
    /// Failed to sign the JWT bearer assertion.
    #[error("Failed to sign JWT assertion: {source}")]
    SignAssertion {
        #[source]
        source: jsonwebtoken::errors::Error,
    },
    /// The HTTP request to the token endpoint failed.
    #[error("Token request failed: {source}")]
    TokenRequest {
        #[source]
        source: reqwest::Error,
    },
    /// The token endpoint rejected the assertion.
    #[error("Token endpoint rejected the assertion ({status}): {description}")]
    TokenExchange {
        /// HTTP status returned by the token endpoint.
        status: reqwest::StatusCode,
        /// The endpoint's `error_description`, when one was returned.
        description: String,
    },
    /// Required builder parameter was not provided.
    #[error("Missing required attribute: {}", _0)]
    MissingRequiredAttribute(String),
    /// Invalid credentials for the JWT bearer flow.
    #[error("Invalid credentials: {message}")]
    InvalidCredentials {
        /// Description of what's missing or invalid.
        message: String,
    },
    /// Failed to get current system time.
    #[error("Failed to get current system time: {source}")]
    SystemTimeError {
        #[source]
        source: std::time::SystemTimeError,
    },
    /// Token expiry time calculation resulted in arithmetic overflow.
    #[error("Token expiry time calculation overflow")]
    TokenExpiryOverflow,
    /// Time threshold calculation resulted in arithmetic overflow.
    #[error("Time threshold calculation overflow")]
    TimeThresholdOverflow,
    /// Failed to acquire lock on token state.
    #[error("Failed to acquire lock on token state")]
    LockError,
    /// The client has not performed a token exchange yet.
    #[error("Client is not connected")]
    NotConnected,
}

/// Salesforce JWT bearer credentials.
///
/// Obtained from a Salesforce Connected App with a certificate uploaded for
/// digital signatures. The private key matching that certificate signs the
/// assertion.
///
/// # Examples
///
/// ```
/// use policy_monitor::client::Credentials;
/// use std::path::PathBuf;
///
/// let creds = Credentials {
///     consumer_key: "your_consumer_key".to_string(),
///     username: "user@example.com".to_string(),
///     login_url: "https://login.salesforce.com".to_string(),
///     tenant_id: "your_org_id".to_string(),
///     private_key_path: PathBuf::from("server.key"),
///     private_key_passphrase: None,
/// };
/// ```
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Credentials {
    /// Consumer Key of the Connected App (the JWT issuer).
    pub consumer_key: String,
    /// Username the assertion is issued for.
    pub username: String,
    /// OAuth login URL.
    ///
    /// For production orgs, use `https://login.salesforce.com`.
    /// For sandbox orgs, use `https://test.salesforce.com`.
    pub login_url: String,
    /// Organization ID (15 or 18 character Salesforce Org ID).
    pub tenant_id: String,
    /// Path to the RS256 private key in PEM form.
    pub private_key_path: PathBuf,
    /// Passphrase of a PKCS#8-encrypted private key. Leave unset for an
    /// unencrypted key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_key_passphrase: Option<String>,
}

/// Source for loading credentials.
#[derive(Debug, Clone)]
pub enum CredentialsFrom {
    /// Load credentials from a JSON file.
    Path(PathBuf),
    /// Use credentials provided directly.
    Value(Credentials),
}

/// OAuth2 client performing the JWT bearer flow.
///
/// Use [`Builder`] to construct a client instance. The JWT bearer grant
/// issues no refresh token; the client re-signs and re-exchanges an
/// assertion whenever the current token nears expiry.
///
/// # Examples
///
/// ```no_run
/// use policy_monitor::client;
/// use std::path::PathBuf;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let client = client::Builder::new()
///     .credentials_path(PathBuf::from("credentials.json"))
///     .build()?
///     .connect()
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Client {
    /// Source of credentials (file path or direct value).
    credentials_from: CredentialsFrom,
    /// Thread-safe token state.
    pub(crate) token_state: Option<Arc<RwLock<TokenState>>>,
    /// Organization ID.
    pub tenant_id: Option<String>,
}

impl Client {
    /// Loads credentials from the configured source.
    fn load_credentials(&self) -> Result<Credentials, Error> {
        match &self.credentials_from {
            CredentialsFrom::Value(creds) => Ok(creds.clone()),
            CredentialsFrom::Path(path) => {
                let credentials_string =
                    fs::read_to_string(path).map_err(|e| Error::ReadCredentials {
                        path: path.clone(),
                        source: e,
                    })?;
                serde_json::from_str(&credentials_string)
                    .map_err(|e| Error::ParseCredentials { source: e })
            }
        }
    }

    /// Validates that required credential fields are present.
    fn validate_credentials(credentials: &Credentials) -> Result<(), Error> {
        for (field, value) in [
            ("consumer_key", &credentials.consumer_key),
            ("username", &credentials.username),
            ("login_url", &credentials.login_url),
            ("tenant_id", &credentials.tenant_id),
        ] {
            if value.is_empty() {
                return Err(Error::InvalidCredentials {
                    message: format!("{field} is required"),
                });
            }
        }
        Ok(())
    }

    /// Connects to Salesforce and exchanges a signed assertion for an
    /// access token.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Credentials cannot be read or parsed ([`Error::ReadCredentials`],
    ///   [`Error::ParseCredentials`])
    /// - Required fields are missing ([`Error::InvalidCredentials`])
    /// - The private key cannot be read, decrypted or used for signing
    ///   ([`Error::ReadPrivateKey`], [`Error::DecryptPrivateKey`],
    ///   [`Error::InvalidPrivateKey`])
    /// - The token endpoint is unreachable or rejects the assertion
    ///   ([`Error::TokenRequest`], [`Error::TokenExchange`])
    pub async fn connect(mut self) -> Result<Self, Error> {
        let credentials = self.load_credentials()?;
        Self::validate_credentials(&credentials)?;

        let token_state = Self::exchange(&credentials).await?;
        self.token_state = Some(Arc::new(RwLock::new(token_state)));
        self.tenant_id = Some(credentials.tenant_id);

        Ok(self)
    }

    /// Signs an assertion and posts it to the token endpoint.
    async fn exchange(credentials: &Credentials) -> Result<TokenState, Error> {
        let key = load_encoding_key(
            &credentials.private_key_path,
            credentials.private_key_passphrase.as_deref(),
        )?;
        let assertion = sign_assertion(credentials, &key)?;

        let http_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(DEFAULT_AUTH_CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(DEFAULT_AUTH_REQUEST_TIMEOUT_SECS))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| Error::TokenRequest { source: e })?;

        let response = http_client
            .post(format!("{}{}", credentials.login_url, DEFAULT_TOKEN_PATH))
            .form(&[
                ("grant_type", JWT_BEARER_GRANT),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await
            .map_err(|e| Error::TokenRequest { source: e })?;

        let status = response.status();
        if !status.is_success() {
            let description = response
                .json::<TokenErrorResponse>()
                .await
                .ok()
                .and_then(|body| body.error_description.or(body.error))
                .unwrap_or_else(|| "No error description".to_string());
            return Err(Error::TokenExchange {
                status,
                description,
            });
        }

        let token_response = response
            .json::<TokenResponse>()
            .await
            .map_err(|e| Error::TokenRequest { source: e })?;

        TokenState::new(token_response)
    }

    /// Returns the current access token without exchanging a new assertion.
    ///
    /// Use [`access_token`](Self::access_token) for automatic renewal.
    ///
    /// # Errors
    ///
    /// Returns an error if the client is not connected
    /// ([`Error::NotConnected`]) or the token state lock is poisoned
    /// ([`Error::LockError`]).
    pub fn current_access_token(&self) -> Result<String, Error> {
        let token_state_arc = self.token_state.as_ref().ok_or(Error::NotConnected)?;
        let state = token_state_arc.read().map_err(|_| Error::LockError)?;

        Ok(state.access_token.clone())
    }

    /// Returns the instance URL the token endpoint reported.
    ///
    /// # Errors
    ///
    /// Returns an error if the client is not connected
    /// ([`Error::NotConnected`]) or the token state lock is poisoned
    /// ([`Error::LockError`]).
    pub fn instance_url(&self) -> Result<String, Error> {
        let token_state_arc = self.token_state.as_ref().ok_or(Error::NotConnected)?;
        let state = token_state_arc.read().map_err(|_| Error::LockError)?;

        Ok(state.instance_url.clone())
    }

    /// Returns a valid access token, exchanging a fresh assertion if the
    /// current token is expired or about to expire (within 5 minutes).
    ///
    /// # Errors
    ///
    /// Returns an error if the client is not connected
    /// ([`Error::NotConnected`]) or a needed exchange fails.
    pub async fn access_token(&self) -> Result<String, Error> {
        let token_state_arc = self.token_state.as_ref().ok_or(Error::NotConnected)?;

        let needs_refresh = {
            let state = token_state_arc.read().map_err(|_| Error::LockError)?;
            state.is_expired(TOKEN_REFRESH_BUFFER_SECONDS)?
        };

        if needs_refresh {
            let credentials = self.load_credentials()?;
            let new_state = Self::exchange(&credentials).await?;
            let mut state = token_state_arc.write().map_err(|_| Error::LockError)?;
            *state = new_state;
        }

        let state = token_state_arc.read().map_err(|_| Error::LockError)?;
        Ok(state.access_token.clone())
    }

    /// Forces a new token by exchanging a fresh assertion regardless of
    /// whether the current token is expired. Use this when Salesforce
    /// reports INVALID_SESSION_ID, which indicates the session was revoked.
    ///
    /// # Errors
    ///
    /// Returns an error if the client is not connected
    /// ([`Error::NotConnected`]) or the exchange fails.
    pub async fn reconnect(&mut self) -> Result<(), Error> {
        let token_state_arc = self.token_state.as_ref().ok_or(Error::NotConnected)?;

        let credentials = self.load_credentials()?;
        Self::validate_credentials(&credentials)?;

        let new_state = Self::exchange(&credentials).await?;
        let mut state = token_state_arc.write().map_err(|_| Error::LockError)?;
        *state = new_state;

        Ok(())
    }
}

/// Reads the PEM private key, decrypting it when a passphrase is given.
fn load_encoding_key(path: &Path, passphrase: Option<&str>) -> Result<EncodingKey, Error> {
    let pem = fs::read(path).map_err(|source| Error::ReadPrivateKey {
        path: path.to_path_buf(),
        source,
    })?;

    match passphrase {
        Some(passphrase) if !passphrase.is_empty() => {
            let pem = String::from_utf8_lossy(&pem);
            let key = RsaPrivateKey::from_pkcs8_encrypted_pem(&pem, passphrase)
                .map_err(|source| Error::DecryptPrivateKey { source })?;
            let der = key
                .to_pkcs1_der()
                .map_err(|source| Error::EncodePrivateKey { source })?;
            Ok(EncodingKey::from_rsa_der(der.as_bytes()))
        }
        _ => EncodingKey::from_rsa_pem(&pem).map_err(|source| Error::InvalidPrivateKey { source }),
    }
}

/// Builds and signs the RS256 assertion for the token endpoint.
fn sign_assertion(credentials: &Credentials, key: &EncodingKey) -> Result<String, Error> {
    let now = unix_now()?;
    let exp = now
        .checked_add(ASSERTION_LIFETIME_SECS)
        .ok_or(Error::TokenExpiryOverflow)?;
    let claims = Claims {
        iss: &credentials.consumer_key,
        sub: &credentials.username,
        aud: &credentials.login_url,
        exp,
    };

    jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, key)
        .map_err(|source| Error::SignAssertion { source })
}

/// Builder for constructing a [`Client`].
///
/// # Examples
///
/// ```no_run
/// use policy_monitor::client;
/// use std::path::PathBuf;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let client = client::Builder::new()
///     .credentials_path(PathBuf::from("credentials.json"))
///     .build()?
///     .connect()
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct Builder {
    credentials_from: Option<CredentialsFrom>,
}

impl Builder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets credentials to load from a JSON file.
    ///
    /// The file should contain a JSON object such as:
    ///
    /// ```json
    /// {
    ///   "consumer_key": "your_consumer_key",
    ///   "username": "user@example.com",
    ///   "login_url": "https://login.salesforce.com",
    ///   "tenant_id": "your_org_id",
    ///   "private_key_path": "server.key"
    /// }
    /// ```
    ///
    /// Add `private_key_passphrase` for an encrypted key.
    pub fn credentials_path(mut self, path: PathBuf) -> Self {
        self.credentials_from = Some(CredentialsFrom::Path(path));
        self
    }

    /// Sets credentials directly.
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials_from = Some(CredentialsFrom::Value(credentials));
        self
    }

    /// Builds the client.
    ///
    /// # Errors
    ///
    /// Returns an error if credentials were not provided via either
    /// [`credentials_path`](Self::credentials_path) or
    /// [`credentials`](Self::credentials).
    pub fn build(self) -> Result<Client, Error> {
        Ok(Client {
            credentials_from: self.credentials_from.ok_or_else(|| {
                Error::MissingRequiredAttribute("credentials or credentials_path".to_string())
            })?,
            token_state: None,
            tenant_id: None,
        })
    }
}

#[cfg(test)]
mod tests {

    use std::env;

    use super::*;

    fn test_credentials() -> Credentials {
        Credentials {
            consumer_key: "test_consumer_key".to_string(),
            username: "user@example.com".to_string(),
            login_url: "https://test.salesforce.com".to_string(),
            tenant_id: "00Dxx0000001gPL".to_string(),
            private_key_path: PathBuf::from("/tmp/test.key"),
            private_key_passphrase: None,
        }
    }

    pub(crate) fn test_token_state() -> TokenState {
        TokenState::new(TokenResponse {
            access_token: "test_token".to_string(),
            instance_url: "https://mydomain.salesforce.com".to_string(),
            token_type: Some("Bearer".to_string()),
            scope: None,
        })
        .unwrap()
    }

    #[test]
    fn test_build_without_credentials() {
        let client = Builder::new().build();
        assert!(matches!(
            client,
            Err(Error::MissingRequiredAttribute(attr)) if attr == "credentials or credentials_path"
        ));
    }

    #[test]
    fn test_build_with_credentials() {
        let mut path = env::temp_dir();
        path.push(format!("credentials_{}.json", std::process::id()));
        let client = Builder::new().credentials_path(path).build();
        assert!(client.is_ok());
    }

    #[tokio::test]
    async fn test_connect_with_invalid_credentials_json() {
        let creds: &str = r#"{"consumer_key":"key"}"#;
        let mut path = env::temp_dir();
        path.push(format!("invalid_credentials_{}.json", std::process::id()));
        let _ = fs::write(path.clone(), creds);
        let client = Builder::new()
            .credentials_path(path.clone())
            .build()
            .unwrap();
        let result = client.connect().await;
        let _ = fs::remove_file(path);
        assert!(matches!(result, Err(Error::ParseCredentials { .. })));
    }

    #[tokio::test]
    async fn test_connect_with_missing_file() {
        let mut path = env::temp_dir();
        path.push(format!("nonexistent_{}.json", std::process::id()));
        let client = Builder::new().credentials_path(path).build().unwrap();
        let result = client.connect().await;
        assert!(matches!(result, Err(Error::ReadCredentials { .. })));
    }

    #[tokio::test]
    async fn test_connect_with_missing_private_key() {
        let mut creds = test_credentials();
        let mut path = env::temp_dir();
        path.push(format!("missing_key_{}.pem", std::process::id()));
        creds.private_key_path = path;
        let client = Builder::new().credentials(creds).build().unwrap();
        // The key is loaded before any network traffic happens.
        let result = client.connect().await;
        assert!(matches!(result, Err(Error::ReadPrivateKey { .. })));
    }

    #[tokio::test]
    async fn test_connect_with_empty_consumer_key() {
        let mut creds = test_credentials();
        creds.consumer_key = String::new();
        let client = Builder::new().credentials(creds).build().unwrap();
        let result = client.connect().await;
        assert!(matches!(
            result,
            Err(Error::InvalidCredentials { message }) if message == "consumer_key is required"
        ));
    }

    #[tokio::test]
    async fn test_connect_with_empty_username() {
        let mut creds = test_credentials();
        creds.username = String::new();
        let client = Builder::new().credentials(creds).build().unwrap();
        let result = client.connect().await;
        assert!(matches!(result, Err(Error::InvalidCredentials { .. })));
    }

    #[test]
    fn test_load_encoding_key_rejects_garbage_pem() {
        let mut path = env::temp_dir();
        path.push(format!("garbage_key_{}.pem", std::process::id()));
        let _ = fs::write(path.clone(), "not a pem file");
        let result = load_encoding_key(&path, None);
        let _ = fs::remove_file(path);
        assert!(matches!(result, Err(Error::InvalidPrivateKey { .. })));
    }

    #[test]
    fn test_load_encoding_key_rejects_garbage_encrypted_pem() {
        let mut path = env::temp_dir();
        path.push(format!("garbage_enc_key_{}.pem", std::process::id()));
        let _ = fs::write(path.clone(), "not a pem file");
        let result = load_encoding_key(&path, Some("passphrase"));
        let _ = fs::remove_file(path);
        assert!(matches!(result, Err(Error::DecryptPrivateKey { .. })));
    }

    #[test]
    fn test_load_encoding_key_empty_passphrase_means_unencrypted() {
        let mut path = env::temp_dir();
        path.push(format!("empty_pass_key_{}.pem", std::process::id()));
        let _ = fs::write(path.clone(), "not a pem file");
        // An empty passphrase must not take the decryption path.
        let result = load_encoding_key(&path, Some(""));
        let _ = fs::remove_file(path);
        assert!(matches!(result, Err(Error::InvalidPrivateKey { .. })));
    }

    #[test]
    fn test_token_state_not_expired_when_fresh() {
        let state = test_token_state();
        let is_expired = state.is_expired(TOKEN_REFRESH_BUFFER_SECONDS);
        assert!(is_expired.is_ok());
        assert!(!is_expired.unwrap());
    }

    #[test]
    fn test_token_state_expired_with_large_buffer() {
        let state = test_token_state();
        // A buffer longer than the assumed session lifetime forces expiry.
        let is_expired = state.is_expired(DEFAULT_SESSION_LIFETIME_SECS + 60);
        assert!(is_expired.is_ok());
        assert!(is_expired.unwrap());
    }

    #[test]
    fn test_token_response_deserialization() {
        let json = r#"
            {
                "access_token": "00Dxx!token",
                "instance_url": "https://mydomain.salesforce.com",
                "scope": "api",
                "id": "https://test.salesforce.com/id/00Dxx/005xx",
                "token_type": "Bearer"
            }"#;
        let response: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.access_token, "00Dxx!token");
        assert_eq!(response.instance_url, "https://mydomain.salesforce.com");
        assert_eq!(response.token_type.as_deref(), Some("Bearer"));
        assert_eq!(response.scope.as_deref(), Some("api"));
    }

    #[test]
    fn test_token_error_response_deserialization() {
        let json = r#"{"error":"invalid_grant","error_description":"user hasn't approved this consumer"}"#;
        let response: TokenErrorResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.error.as_deref(), Some("invalid_grant"));
        assert_eq!(
            response.error_description.as_deref(),
            Some("user hasn't approved this consumer")
        );
    }

    #[test]
    fn test_claims_serialization() {
        let claims = Claims {
            iss: "consumer_key",
            sub: "user@example.com",
            aud: "https://login.salesforce.com",
            exp: 1_700_000_000,
        };
        let json = serde_json::to_value(&claims).unwrap();
        assert_eq!(json["iss"], "consumer_key");
        assert_eq!(json["sub"], "user@example.com");
        assert_eq!(json["aud"], "https://login.salesforce.com");
        assert_eq!(json["exp"], 1_700_000_000);
    }

    #[test]
    fn test_current_access_token_without_connection() {
        let client = Builder::new()
            .credentials(test_credentials())
            .build()
            .unwrap();
        let result = client.current_access_token();
        assert!(matches!(result, Err(Error::NotConnected)));
    }

    #[tokio::test]
    async fn test_access_token_without_connection() {
        let client = Builder::new()
            .credentials(test_credentials())
            .build()
            .unwrap();
        let result = client.access_token().await;
        assert!(matches!(result, Err(Error::NotConnected)));
    }

    #[test]
    fn test_instance_url_without_connection() {
        let client = Builder::new()
            .credentials(test_credentials())
            .build()
            .unwrap();
        let result = client.instance_url();
        assert!(matches!(result, Err(Error::NotConnected)));
    }

    #[tokio::test]
    async fn test_reconnect_without_connection() {
        let mut client = Builder::new()
            .credentials(test_credentials())
            .build()
            .unwrap();
        let result = client.reconnect().await;
        assert!(matches!(result, Err(Error::NotConnected)));
    }

    #[test]
    fn test_access_token_with_stub_state() {
        let mut client = Builder::new()
            .credentials(test_credentials())
            .build()
            .unwrap();
        client.token_state = Some(Arc::new(RwLock::new(test_token_state())));
        assert_eq!(client.current_access_token().unwrap(), "test_token");
        assert_eq!(
            client.instance_url().unwrap(),
            "https://mydomain.salesforce.com"
        );
    }

    #[test]
    fn test_credentials_serde_skips_absent_passphrase() {
        let creds = test_credentials();
        let json = serde_json::to_string(&creds).unwrap();
        assert!(!json.contains("private_key_passphrase"));

        let mut creds = test_credentials();
        creds.private_key_passphrase = Some("secret".to_string());
        let json = serde_json::to_string(&creds).unwrap();
        assert!(json.contains("private_key_passphrase"));
    }

    #[test]
    fn test_credentials_roundtrip() {
        let creds = test_credentials();
        let json = serde_json::to_string(&creds).unwrap();
        let deserialized: Credentials = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.consumer_key, creds.consumer_key);
        assert_eq!(deserialized.username, creds.username);
        assert_eq!(deserialized.private_key_path, creds.private_key_path);
    }

    #[test]
    fn test_builder_credentials_path() {
        let path = PathBuf::from("/tmp/test.json");
        let builder = Builder::new().credentials_path(path);
        assert!(matches!(
            builder.credentials_from,
            Some(CredentialsFrom::Path(_))
        ));
    }

    #[test]
    fn test_builder_credentials_value() {
        let builder = Builder::new().credentials(test_credentials());
        assert!(matches!(
            builder.credentials_from,
            Some(CredentialsFrom::Value(_))
        ));
    }

    #[test]
    fn test_client_clone() {
        let client = Builder::new()
            .credentials(test_credentials())
            .build()
            .unwrap();
        let cloned = client.clone();
        assert!(matches!(
            (&client.credentials_from, &cloned.credentials_from),
            (CredentialsFrom::Value(_), CredentialsFrom::Value(_))
        ));
    }

    #[test]
    fn test_error_display_messages() {
        let error = Error::MissingRequiredAttribute("test_field".to_string());
        assert_eq!(error.to_string(), "Missing required attribute: test_field");

        let error = Error::TokenExpiryOverflow;
        assert_eq!(error.to_string(), "Token expiry time calculation overflow");

        let error = Error::NotConnected;
        assert_eq!(error.to_string(), "Client is not connected");

        let error = Error::LockError;
        assert_eq!(error.to_string(), "Failed to acquire lock on token state");
    }

    #[test]
    fn test_error_source() {
        use std::error::Error as StdError;

        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let error = Error::ReadCredentials {
            path: PathBuf::from("/tmp/test.json"),
            source: io_error,
        };
        assert!(error.source().is_some());
    }

    #[test]
    fn test_default_token_path() {
        assert_eq!(DEFAULT_TOKEN_PATH, "/services/oauth2/token");
    }

    #[test]
    fn test_jwt_bearer_grant_type() {
        assert_eq!(JWT_BEARER_GRANT, "urn:ietf:params:oauth:grant-type:jwt-bearer");
    }
}
