//! Verification of Google ID tokens.
//!
//! A client signs in with Google, receives an ID token and posts it to the
//! API. The token is only trusted when its RS256 signature matches one of
//! Google's published keys, its `aud` is our OAuth client id and its `iss`
//! is Google.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::GoogleConfig;
use crate::context::{ContextError, RequestContext};

const ISSUERS: &[&str] = &["accounts.google.com", "https://accounts.google.com"];

/// Unknown key ids trigger a refetch at most this often.
const REFETCH_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum GoogleError {
    #[error("Google sign-in is not configured")]
    NotConfigured,

    #[error("Invalid Google ID token")]
    InvalidToken,

    #[error("Request aborted: {0}")]
    Cancelled(#[from] ContextError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for GoogleError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Claims of a verified ID token.
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleIdentity {
    pub sub: String,
    pub email: String,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default)]
    pub name: Option<String>,
}

/// Where Google's signing keys come from.
#[async_trait]
pub trait GoogleKeySource: Send + Sync {
    async fn fetch(&self) -> anyhow::Result<JwkSet>;
}

pub struct HttpKeySource {
    client: reqwest::Client,
    url: String,
}

impl HttpKeySource {
    pub fn new(url: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(concat!("url-shortener/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build Google HTTP client: {e}"))?;

        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl GoogleKeySource for HttpKeySource {
    async fn fetch(&self) -> anyhow::Result<JwkSet> {
        let keys = self
            .client
            .get(&self.url)
            .send()
            .await
            .context("Failed to fetch Google signing keys")?
            .error_for_status()
            .context("Google signing keys request failed")?
            .json::<JwkSet>()
            .await
            .context("Failed to parse Google signing keys")?;

        info!(count = keys.keys.len(), "Google signing keys refreshed");
        Ok(keys)
    }
}

#[async_trait]
pub trait GoogleVerifier: Send + Sync {
    /// # Errors
    ///
    /// Returns [`GoogleError::InvalidToken`] for anything Google did not issue
    /// to this client, and [`GoogleError::NotConfigured`] when no client id is set.
    async fn verify(
        &self,
        ctx: &RequestContext,
        id_token: &str,
    ) -> Result<GoogleIdentity, GoogleError>;
}

struct KeyCache {
    keys: JwkSet,
    fetched_at: Option<Instant>,
}

pub struct GoogleIdTokenVerifier {
    client_id: Option<String>,
    source: Arc<dyn GoogleKeySource>,
    cache: RwLock<KeyCache>,
}

impl GoogleIdTokenVerifier {
    #[must_use]
    pub fn new(client_id: Option<String>, source: Arc<dyn GoogleKeySource>) -> Self {
        Self {
            client_id: client_id.filter(|id| !id.trim().is_empty()),
            source,
            cache: RwLock::new(KeyCache {
                keys: JwkSet { keys: Vec::new() },
                fetched_at: None,
            }),
        }
    }

    pub fn from_config(config: &GoogleConfig) -> anyhow::Result<Self> {
        if config.client_id.is_none() {
            info!("Google sign-in disabled: no client id configured");
        }
        Ok(Self::new(
            config.client_id.clone(),
            Arc::new(HttpKeySource::new(&config.certs_url)?),
        ))
    }

    async fn decoding_key(
        &self,
        ctx: &RequestContext,
        kid: &str,
    ) -> Result<DecodingKey, GoogleError> {
        {
            let cache = self.cache.read().await;
            if let Some(key) = find_key(&cache.keys, kid)? {
                return Ok(key);
            }
            if cache
                .fetched_at
                .is_some_and(|at| at.elapsed() < REFETCH_INTERVAL)
            {
                debug!(kid, "google id token signed with unknown key");
                return Err(GoogleError::InvalidToken);
            }
        }

        // Google rotates its keys, so an unknown kid means our copy may be stale.
        let keys = match ctx.run(self.source.fetch()).await? {
            Ok(keys) => keys,
            Err(e) => {
                error!(error = %e, "Could not load Google signing keys");
                return Err(e.into());
            }
        };

        let key = find_key(&keys, kid)?;
        *self.cache.write().await = KeyCache {
            keys,
            fetched_at: Some(Instant::now()),
        };

        key.ok_or_else(|| {
            debug!(kid, "google id token signed with unknown key");
            GoogleError::InvalidToken
        })
    }
}

fn find_key(keys: &JwkSet, kid: &str) -> Result<Option<DecodingKey>, GoogleError> {
    keys.find(kid)
        .map(|jwk| {
            DecodingKey::from_jwk(jwk)
                .map_err(|e| GoogleError::Internal(format!("unusable Google key {kid}: {e}")))
        })
        .transpose()
}

#[async_trait]
impl GoogleVerifier for GoogleIdTokenVerifier {
    async fn verify(
        &self,
        ctx: &RequestContext,
        id_token: &str,
    ) -> Result<GoogleIdentity, GoogleError> {
        let Some(client_id) = self.client_id.as_deref() else {
            warn!("Google sign-in attempted but no client id is configured");
            return Err(GoogleError::NotConfigured);
        };

        let header = decode_header(id_token).map_err(|e| {
            debug!(error = %e, "google id token rejected");
            GoogleError::InvalidToken
        })?;
        if header.alg != Algorithm::RS256 {
            debug!(alg = ?header.alg, "google id token has unexpected algorithm");
            return Err(GoogleError::InvalidToken);
        }
        let Some(kid) = header.kid else {
            debug!("google id token has no key id");
            return Err(GoogleError::InvalidToken);
        };

        let key = self.decoding_key(ctx, &kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[client_id]);
        validation.set_issuer(ISSUERS);
        validation.set_required_spec_claims(&["exp", "aud", "iss", "sub"]);

        let data = decode::<GoogleIdentity>(id_token, &key, &validation).map_err(|e| {
            debug!(error = %e, "google id token rejected");
            GoogleError::InvalidToken
        })?;
        Ok(data.claims)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Utc;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde_json::{Value, json};
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub(crate) const CLIENT_ID: &str = "test-client.apps.googleusercontent.com";
    const KID: &str = "test-key";
    const PRIVATE_KEY: &str = include_str!("testdata/google_rs256.pem");
    const MODULUS: &str = "pQejaySyBHf105fHYLvTk4SKMoOEu5ZhoWsSDdCuDV1iVBVdVIVe3lVaic4YwHTyAt7lM0eWQvqP-1sLo4ItJb2W2f0naHBIBLl0Z8zJPFGv14WJdwryWyPOXWm0u0qvBRaaNvcd47nNxg2lD0cYB6kCng_lV_EqmvSorirz109A4KNglQFhG8-Qs7EhFfstEs_O98Mg1u7-aBsH2J9OnluRfn0BGP73ZsPHVikKDSg4KyFzuUgBKdTkdOlzIGGorhFVVyoeZXaNew6-EbCzp9HTfjOJcsNo0seV05rStwJ0Cv-s0EY9G2JF4x4_q2e1zQzCrX7GXaMzCfvwkjintQ";

    pub(crate) struct StaticKeys {
        keys: JwkSet,
        pub(crate) fetches: AtomicUsize,
    }

    impl StaticKeys {
        pub(crate) fn new() -> Self {
            let keys = serde_json::from_value(json!({
                "keys": [{
                    "kty": "RSA",
                    "kid": KID,
                    "alg": "RS256",
                    "use": "sig",
                    "n": MODULUS,
                    "e": "AQAB",
                }]
            }))
            .unwrap();
            Self {
                keys,
                fetches: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl GoogleKeySource for StaticKeys {
        async fn fetch(&self) -> anyhow::Result<JwkSet> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(self.keys.clone())
        }
    }

    pub(crate) fn verifier() -> GoogleIdTokenVerifier {
        GoogleIdTokenVerifier::new(Some(CLIENT_ID.to_string()), Arc::new(StaticKeys::new()))
    }

    pub(crate) fn claims(email: &str, email_verified: bool) -> Value {
        let now = Utc::now().timestamp();
        json!({
            "iss": "https://accounts.google.com",
            "aud": CLIENT_ID,
            "sub": "110169484474386276334",
            "email": email,
            "email_verified": email_verified,
            "name": "Google User",
            "iat": now,
            "exp": now + 3600,
        })
    }

    pub(crate) fn sign_with_kid(claims: &Value, kid: &str) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(kid.to_string());
        let key = EncodingKey::from_rsa_pem(PRIVATE_KEY.as_bytes()).unwrap();
        encode(&header, claims, &key).unwrap()
    }

    pub(crate) fn sign(claims: &Value) -> String {
        sign_with_kid(claims, KID)
    }

    fn bg() -> RequestContext {
        RequestContext::background()
    }

    #[tokio::test]
    async fn accepts_token_issued_for_our_client() {
        let identity = verifier()
            .verify(&bg(), &sign(&claims("g@example.com", true)))
            .await
            .unwrap();
        assert_eq!(identity.email, "g@example.com");
        assert!(identity.email_verified);
        assert_eq!(identity.name.as_deref(), Some("Google User"));
    }

    #[tokio::test]
    async fn rejects_other_audience_issuer_or_expired() {
        let verifier = verifier();

        let mut other_client = claims("g@example.com", true);
        other_client["aud"] = json!("someone-else.apps.googleusercontent.com");

        let mut other_issuer = claims("g@example.com", true);
        other_issuer["iss"] = json!("https://evil.example.com");

        let mut expired = claims("g@example.com", true);
        expired["exp"] = json!(Utc::now().timestamp() - 3600);

        let mut no_audience = claims("g@example.com", true);
        no_audience.as_object_mut().unwrap().remove("aud");

        for token in [other_client, other_issuer, expired, no_audience] {
            assert!(matches!(
                verifier.verify(&bg(), &sign(&token)).await,
                Err(GoogleError::InvalidToken)
            ));
        }
    }

    #[tokio::test]
    async fn self_signed_tokens_never_reach_the_key_source() {
        let source = Arc::new(StaticKeys::new());
        let verifier = GoogleIdTokenVerifier::new(Some(CLIENT_ID.to_string()), source.clone());

        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some(KID.to_string());
        let forged = encode(
            &header,
            &claims("admin@example.com", true),
            &EncodingKey::from_secret(b"attacker"),
        )
        .unwrap();

        for token in [forged.as_str(), "not-a-jwt"] {
            assert!(matches!(
                verifier.verify(&bg(), token).await,
                Err(GoogleError::InvalidToken)
            ));
        }
        assert_eq!(source.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_key_ids_refetch_at_most_once_per_interval() {
        let source = Arc::new(StaticKeys::new());
        let verifier = GoogleIdTokenVerifier::new(Some(CLIENT_ID.to_string()), source.clone());

        verifier
            .verify(&bg(), &sign(&claims("g@example.com", true)))
            .await
            .unwrap();
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);

        let rotated = sign_with_kid(&claims("g@example.com", true), "rotated");
        for _ in 0..3 {
            assert!(matches!(
                verifier.verify(&bg(), &rotated).await,
                Err(GoogleError::InvalidToken)
            ));
        }
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_client_id_disables_sign_in() {
        let verifier = GoogleIdTokenVerifier::new(Some("  ".to_string()), Arc::new(StaticKeys::new()));
        assert!(matches!(
            verifier
                .verify(&bg(), &sign(&claims("g@example.com", true)))
                .await,
            Err(GoogleError::NotConfigured)
        ));
    }
}
