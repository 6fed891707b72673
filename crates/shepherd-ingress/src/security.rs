use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::extract::{FromRef, FromRequestParts, Path};
use axum::http::{StatusCode, header::AUTHORIZATION, request::Parts};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::Secret;
use kube::Api;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::config::IngressConfig;
use crate::error::AppError;
use crate::state::AppState;

const TOKEN_HASH_KEY: &str = "token-hash";

/// Proves the caller holds the plaintext bearer token for the task named in
/// the request path: read `{taskID}-token`'s `token-hash`, hash
/// the presented token, compare in constant time. A missing Secret and a
/// wrong token both reject with 401 so no oracle distinguishes them.
pub struct TaskAuth {
    pub task_id: String,
}

impl<S> FromRequestParts<S> for TaskAuth
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> impl Future<Output = Result<Self, Self::Rejection>> + Send {
        let state = AppState::from_ref(state);
        let header = parts.headers.get(AUTHORIZATION).cloned();
        async move {
            let task_id = Path::<String>::from_request_parts(parts, &state)
                .await
                .map_err(|_| AppError::bad_request("missing task id in path"))?
                .0;
            let header = header.ok_or_else(|| AppError::unauthorized("missing Authorization header"))?;
            let text = header
                .to_str()
                .map_err(|_| AppError::unauthorized("invalid Authorization header"))?;
            let presented = text
                .strip_prefix("Bearer ")
                .ok_or_else(|| AppError::unauthorized("invalid Authorization header"))?;

            verify_task_bearer(&state, &task_id, presented).await?;
            Ok(Self { task_id })
        }
    }
}

async fn verify_task_bearer(state: &AppState, task_id: &str, presented: &str) -> Result<(), AppError> {
    let secrets: Api<Secret> = Api::namespaced(state.client.clone(), &state.config.namespace);
    let secret_name = format!("{task_id}-token");
    let secret = secrets
        .get_opt(&secret_name)
        .await?
        .ok_or_else(|| AppError::unauthorized("invalid bearer token"))?;

    let stored_hash = secret
        .data
        .as_ref()
        .and_then(|data| data.get(TOKEN_HASH_KEY))
        .map(|ByteString(bytes)| bytes.clone())
        .ok_or_else(|| AppError::unauthorized("invalid bearer token"))?;

    let presented_hash = hex::encode(Sha256::digest(presented.as_bytes()));
    if presented_hash.as_bytes().ct_eq(&stored_hash).unwrap_u8() == 1 {
        Ok(())
    } else {
        Err(AppError::unauthorized("invalid bearer token"))
    }
}

#[derive(Serialize)]
struct AppJwtClaims {
    iat: usize,
    exp: usize,
    iss: String,
}

#[derive(Deserialize)]
struct InstallationTokenResponse {
    token: String,
    expires_at: String,
}

/// Mints short-lived, repository-scoped GitHub App installation tokens for
/// the credential-mint endpoint. The App's RSA private key signs a JWT
/// (per GitHub's App-auth flow); that JWT is exchanged for an installation
/// access token scoped narrowly to the task's repository.
pub struct CredentialIssuer {
    http: reqwest::Client,
    app_id: String,
    installation_id: String,
    private_key_path: std::path::PathBuf,
}

impl CredentialIssuer {
    pub fn new(config: &IngressConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            app_id: config.github_app_id.clone(),
            installation_id: config.github_app_installation_id.clone(),
            private_key_path: config.github_app_private_key_path.clone(),
        }
    }

    fn app_jwt(&self) -> Result<String, AppError> {
        let key_pem = std::fs::read(&self.private_key_path).map_err(|_| {
            AppError::bad_request("github app private key unreadable")
        })?;
        let encoding_key = EncodingKey::from_rsa_pem(&key_pem)?;
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO).as_secs() as usize;
        let claims = AppJwtClaims {
            iat: now.saturating_sub(60),
            exp: now + 9 * 60,
            iss: self.app_id.clone(),
        };
        let token = jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &encoding_key)?;
        Ok(token)
    }

    /// Mints a ~1 hour installation token scoped to `repository` (an
    /// `owner/name` slug).
    pub async fn mint(&self, repository: &str) -> Result<(String, String), AppError> {
        let app_jwt = self.app_jwt()?;
        let url = format!(
            "https://api.github.com/app/installations/{}/access_tokens",
            self.installation_id
        );
        let response = self
            .http
            .post(&url)
            .bearer_auth(app_jwt)
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", "shepherd-ingress")
            .json(&serde_json::json!({ "repositories": [repository] }))
            .send()
            .await?;
        if response.status() != StatusCode::CREATED && !response.status().is_success() {
            return Err(AppError::bad_request(format!(
                "github installation token request failed with {}",
                response.status()
            )));
        }
        let parsed: InstallationTokenResponse = response.json().await?;
        Ok((parsed.token, parsed.expires_at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sha2::{Digest, Sha256};

    #[test]
    fn constant_time_compare_accepts_matching_hash() {
        let presented = "a".repeat(64);
        let hash = hex::encode(Sha256::digest(presented.as_bytes()));
        assert_eq!(
            hash.as_bytes().ct_eq(hash.as_bytes()).unwrap_u8(),
            1,
            "identical digests must compare equal"
        );
    }
}
