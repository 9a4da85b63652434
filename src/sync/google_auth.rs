use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

#[cfg(test)]
use mockall::automock;

use crate::storage::config::GoogleConfig;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Failed to read token file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse token: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("No refresh token available")]
    NoRefreshToken,
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("OAuth error: {0}")]
    OAuthError(String),
    #[error("No cached token and interactive sign-in is not allowed")]
    InteractionRequired,
    #[error("Sign-in was declined")]
    ConsentDeclined,
    #[error("Sign-in was interrupted: {0}")]
    Interrupted(String),
}

/// Supplies bearer tokens for the calendar service.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Returns a usable access token. Only an `interactive` request may show
    /// the consent step, so it must come from a direct user action.
    async fn get_token(&self, interactive: bool) -> Result<String, AuthError>;

    /// Drops `token` from the cache so the next request has to obtain a new one.
    async fn remove_cached_token(&self, token: &str) -> Result<(), AuthError>;
}

/// Shows the consent URL to the user and returns the authorization code they
/// paste back, or `None` when they give up.
pub trait AuthorizationCodeSource: Send + Sync {
    fn request_code(&self, auth_url: &str) -> Option<String>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenInfo {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub token_type: String,
}

pub struct TokenStorage {
    path: PathBuf,
}

impl TokenStorage {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn save_token(&self, token: &TokenInfo) -> Result<(), AuthError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(token)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }

    pub fn load_token(&self) -> Result<TokenInfo, AuthError> {
        let content = std::fs::read_to_string(&self.path)?;
        let token: TokenInfo = serde_json::from_str(&content)?;
        Ok(token)
    }

    pub fn clear(&self) -> Result<(), AuthError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn needs_refresh(&self, token: &TokenInfo) -> bool {
        let buffer = chrono::Duration::minutes(5);
        token.expires_at <= Utc::now() + buffer
    }
}

impl TokenInfo {
    pub fn new(access_token: String, expires_in_seconds: i64) -> Self {
        Self {
            access_token,
            refresh_token: None,
            expires_at: Utc::now() + chrono::Duration::seconds(expires_in_seconds),
            token_type: "Bearer".to_string(),
        }
    }

    pub fn with_refresh_token(mut self, refresh_token: String) -> Self {
        self.refresh_token = Some(refresh_token);
        self
    }

    pub fn is_valid(&self) -> bool {
        self.expires_at > Utc::now()
    }
}

pub struct GoogleAuthenticator {
    config: GoogleConfig,
    storage: TokenStorage,
    client: reqwest::Client,
    code_source: Option<Arc<dyn AuthorizationCodeSource>>,
    refresh_lock: Mutex<()>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
    refresh_token: Option<String>,
    #[allow(dead_code)]
    token_type: String,
}

impl GoogleAuthenticator {
    pub fn new(config: GoogleConfig) -> Self {
        let storage = TokenStorage::new(config.token_cache.clone());
        let client = reqwest::Client::new();

        Self {
            config,
            storage,
            client,
            code_source: None,
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn with_code_source(mut self, source: Arc<dyn AuthorizationCodeSource>) -> Self {
        self.code_source = Some(source);
        self
    }

    fn load_cached(&self) -> Option<TokenInfo> {
        match self.storage.load_token() {
            Ok(token) => Some(token),
            Err(AuthError::ReadError(e)) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                tracing::warn!("Ignoring unreadable token cache: {}", e);
                None
            }
        }
    }

    /// Cached token, refreshed if it is about to expire. `None` when the user
    /// has to sign in again. Concurrent callers share a single refresh.
    async fn cached_token(&self) -> Option<TokenInfo> {
        let token = self.load_cached()?;
        if !self.storage.needs_refresh(&token) {
            return Some(token);
        }

        let _guard = self.refresh_lock.lock().await;

        // Another caller may have refreshed while we waited.
        let token = self.load_cached()?;
        if !self.storage.needs_refresh(&token) {
            return Some(token);
        }

        if token.refresh_token.is_some() {
            match self.refresh_token(&token).await {
                Ok(refreshed) => return Some(refreshed),
                Err(e) => tracing::warn!("Token refresh failed: {}", e),
            }
        }

        token.is_valid().then_some(token)
    }

    pub async fn refresh_token(&self, token: &TokenInfo) -> Result<TokenInfo, AuthError> {
        let refresh_token = token.refresh_token.as_ref()
            .ok_or(AuthError::NoRefreshToken)?;

        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("refresh_token", refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ];

        tracing::info!("Refreshing access token");

        let response = self.client
            .post(&self.config.token_url)
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(AuthError::OAuthError(error_text));
        }

        let token_response: TokenResponse = response.json().await?;

        let new_token = TokenInfo::new(token_response.access_token, token_response.expires_in)
            .with_refresh_token(
                token_response.refresh_token.unwrap_or_else(|| refresh_token.clone())
            );

        self.storage.save_token(&new_token)?;

        Ok(new_token)
    }

    pub fn get_auth_url(&self) -> String {
        let scope = "https://www.googleapis.com/auth/calendar";

        format!(
            "https://accounts.google.com/o/oauth2/v2/auth?client_id={}&redirect_uri={}&response_type=code&scope={}&access_type=offline&prompt=consent",
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(&self.config.redirect_uri),
            urlencoding::encode(scope)
        )
    }

    pub async fn exchange_code_for_token(&self, code: &str) -> Result<TokenInfo, AuthError> {
        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
        ];

        let response = self.client
            .post(&self.config.token_url)
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(AuthError::OAuthError(error_text));
        }

        let token_response: TokenResponse = response.json().await?;

        let new_token = TokenInfo::new(token_response.access_token, token_response.expires_in)
            .with_refresh_token(
                token_response.refresh_token
                    .ok_or(AuthError::NoRefreshToken)?
            );

        self.storage.save_token(&new_token)?;

        Ok(new_token)
    }

    async fn authorize_interactively(&self) -> Result<TokenInfo, AuthError> {
        let source = self.code_source.clone().ok_or(AuthError::InteractionRequired)?;
        let auth_url = self.get_auth_url();

        let code = tokio::task::spawn_blocking(move || source.request_code(&auth_url))
            .await
            .map_err(|e| AuthError::Interrupted(e.to_string()))?;

        match code.as_deref().map(str::trim) {
            Some(code) if !code.is_empty() => self.exchange_code_for_token(code).await,
            _ => Err(AuthError::ConsentDeclined),
        }
    }
}

#[async_trait]
impl TokenProvider for GoogleAuthenticator {
    async fn get_token(&self, interactive: bool) -> Result<String, AuthError> {
        if let Some(token) = self.cached_token().await {
            return Ok(token.access_token);
        }

        if !interactive {
            return Err(AuthError::InteractionRequired);
        }

        tracing::info!("No usable cached token, requesting consent");
        let token = self.authorize_interactively().await?;
        Ok(token.access_token)
    }

    async fn remove_cached_token(&self, token: &str) -> Result<(), AuthError> {
        match self.storage.load_token() {
            Ok(cached) if cached.access_token == token => {
                tracing::info!("Removing rejected token from cache");
                self.storage.clear()
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct FixedCode(Option<&'static str>);

    impl AuthorizationCodeSource for FixedCode {
        fn request_code(&self, _auth_url: &str) -> Option<String> {
            self.0.map(str::to_string)
        }
    }

    fn create_test_token() -> TokenInfo {
        TokenInfo::new("test_access_token".to_string(), 3600)
    }

    fn create_expired_token() -> TokenInfo {
        TokenInfo {
            access_token: "expired_token".to_string(),
            refresh_token: Some("refresh_token".to_string()),
            expires_at: Utc::now() - chrono::Duration::hours(1),
            token_type: "Bearer".to_string(),
        }
    }

    fn google_config(dir: &TempDir, token_url: String) -> GoogleConfig {
        GoogleConfig {
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            token_cache: dir.path().join("token.json"),
            token_url,
            redirect_uri: "http://localhost:8080".to_string(),
        }
    }

    #[test]
    fn new_token_is_valid() {
        let token = create_test_token();
        assert!(token.is_valid());
    }

    #[test]
    fn expired_token_is_not_valid() {
        let token = create_expired_token();
        assert!(!token.is_valid());
    }

    #[test]
    fn load_token_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let token_path = temp_dir.path().join("token.json");
        let storage = TokenStorage::new(token_path.clone());
        let original_token = create_test_token()
            .with_refresh_token("refresh".to_string());

        storage.save_token(&original_token).unwrap();
        let loaded_token = storage.load_token().unwrap();

        assert_eq!(loaded_token.access_token, original_token.access_token);
        assert_eq!(loaded_token.refresh_token, original_token.refresh_token);
        assert_eq!(loaded_token.token_type, "Bearer");
    }

    #[test]
    fn clear_removes_token_file_and_tolerates_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let token_path = temp_dir.path().join("token.json");
        let storage = TokenStorage::new(token_path.clone());
        storage.save_token(&create_test_token()).unwrap();

        storage.clear().unwrap();
        storage.clear().unwrap();

        assert!(!token_path.exists());
    }

    #[test]
    fn needs_refresh_detects_soon_to_expire_token() {
        let storage = TokenStorage::new(PathBuf::from("/tmp/token.json"));
        let token = TokenInfo {
            access_token: "token".to_string(),
            refresh_token: Some("refresh".to_string()),
            expires_at: Utc::now() + chrono::Duration::minutes(3),
            token_type: "Bearer".to_string(),
        };

        assert!(storage.needs_refresh(&token));
    }

    #[test]
    fn auth_url_carries_client_and_redirect() {
        let temp_dir = TempDir::new().unwrap();
        let auth = GoogleAuthenticator::new(google_config(&temp_dir, String::new()));

        let url = auth.get_auth_url();

        assert!(url.contains("client_id=client"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A8080"));
    }

    #[tokio::test]
    async fn cached_valid_token_is_returned_without_prompting() {
        let temp_dir = TempDir::new().unwrap();
        let config = google_config(&temp_dir, "http://127.0.0.1:9/token".to_string());
        TokenStorage::new(config.token_cache.clone())
            .save_token(&create_test_token())
            .unwrap();
        let auth = GoogleAuthenticator::new(config);

        assert_eq!(auth.get_token(false).await.unwrap(), "test_access_token");
    }

    #[tokio::test]
    async fn silent_request_without_cache_requires_interaction() {
        let temp_dir = TempDir::new().unwrap();
        let auth = GoogleAuthenticator::new(google_config(&temp_dir, String::new()))
            .with_code_source(Arc::new(FixedCode(Some("never-used"))));

        let result = auth.get_token(false).await;

        assert!(matches!(result, Err(AuthError::InteractionRequired)));
    }

    #[tokio::test]
    async fn expired_token_is_refreshed_and_cached() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "fresh",
                "expires_in": 3600,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;
        let temp_dir = TempDir::new().unwrap();
        let config = google_config(&temp_dir, format!("{}/token", server.uri()));
        let storage = TokenStorage::new(config.token_cache.clone());
        storage.save_token(&create_expired_token()).unwrap();
        let auth = GoogleAuthenticator::new(config);

        let token = auth.get_token(false).await.unwrap();

        assert_eq!(token, "fresh");
        let cached = storage.load_token().unwrap();
        assert_eq!(cached.access_token, "fresh");
        assert_eq!(cached.refresh_token.as_deref(), Some("refresh_token"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_requests_share_one_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "fresh",
                "expires_in": 3600,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;
        let temp_dir = TempDir::new().unwrap();
        let config = google_config(&temp_dir, format!("{}/token", server.uri()));
        TokenStorage::new(config.token_cache.clone())
            .save_token(&create_expired_token())
            .unwrap();
        let auth = Arc::new(GoogleAuthenticator::new(config));

        let mut requests = tokio::task::JoinSet::new();
        for _ in 0..5 {
            let auth = Arc::clone(&auth);
            requests.spawn(async move { auth.get_token(false).await });
        }

        while let Some(joined) = requests.join_next().await {
            assert_eq!(joined.unwrap().unwrap(), "fresh");
        }
    }

    #[tokio::test]
    async fn interactive_request_exchanges_pasted_code() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("code=pasted-code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "new-token",
                "expires_in": 3600,
                "refresh_token": "new-refresh",
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;
        let temp_dir = TempDir::new().unwrap();
        let config = google_config(&temp_dir, format!("{}/token", server.uri()));
        let auth = GoogleAuthenticator::new(config.clone())
            .with_code_source(Arc::new(FixedCode(Some("pasted-code\n"))));

        let token = auth.get_token(true).await.unwrap();

        assert_eq!(token, "new-token");
        assert!(config.token_cache.exists());
    }

    #[tokio::test]
    async fn interactive_request_without_code_is_declined() {
        let temp_dir = TempDir::new().unwrap();
        let auth = GoogleAuthenticator::new(google_config(&temp_dir, String::new()))
            .with_code_source(Arc::new(FixedCode(None)));

        let result = auth.get_token(true).await;

        assert!(matches!(result, Err(AuthError::ConsentDeclined)));
    }

    #[tokio::test]
    async fn remove_cached_token_only_clears_matching_token() {
        let temp_dir = TempDir::new().unwrap();
        let config = google_config(&temp_dir, String::new());
        let storage = TokenStorage::new(config.token_cache.clone());
        storage.save_token(&create_test_token()).unwrap();
        let auth = GoogleAuthenticator::new(config.clone());

        auth.remove_cached_token("some_other_token").await.unwrap();
        assert!(config.token_cache.exists());

        auth.remove_cached_token("test_access_token").await.unwrap();
        assert!(!config.token_cache.exists());
    }
}
