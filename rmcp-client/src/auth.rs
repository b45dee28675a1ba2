//! Auth header construction and OAuth device-flow login for SSE and
//! streamable-HTTP transports (spec.md §4.1, §3's `auth` config block).

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Context;
use anyhow::Result;
use anyhow::bail;
use oauth2::AuthUrl;
use oauth2::ClientId;
use oauth2::DeviceAuthorizationUrl;
use oauth2::Scope;
use oauth2::TokenUrl;
use oauth2::basic::BasicClient;
use oauth2::devicecode::StandardDeviceAuthorizationResponse;

use crate::token_store::StoredToken;
use crate::token_store::TokenStore;

/// Mirrors the `auth` block of an MCP server's config (spec.md §3).
#[derive(Debug, Clone)]
pub enum AuthConfig {
    None,
    Bearer {
        token: String,
    },
    ApiKey {
        header_name: String,
        key: String,
    },
    Basic {
        username: String,
        password: String,
    },
    OAuth {
        server_name: String,
        client_id: String,
        auth_url: String,
        token_url: String,
        device_auth_url: String,
        scopes: Vec<String>,
    },
}

/// Builds the header map a transport attaches to every outgoing request.
///
/// For `OAuth`, this fetches the stored token if it's still valid, or drives
/// the device-flow login (and persists the result) otherwise — spec.md §4.1:
/// "fetch or refresh via stored token; otherwise launch device-flow and
/// persist".
pub async fn build_auth_headers(auth: &AuthConfig) -> Result<HashMap<String, String>> {
    let mut headers = HashMap::new();
    match auth {
        AuthConfig::None => {}
        AuthConfig::Bearer { token } => {
            headers.insert("Authorization".to_string(), format!("Bearer {token}"));
        }
        AuthConfig::ApiKey { header_name, key } => {
            headers.insert(header_name.clone(), key.clone());
        }
        AuthConfig::Basic { username, password } => {
            let raw = format!("{username}:{password}");
            let encoded = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, raw);
            headers.insert("Authorization".to_string(), format!("Basic {encoded}"));
        }
        AuthConfig::OAuth { .. } => {
            let token = ensure_oauth_token(auth).await.context("obtaining OAuth token")?;
            headers.insert(
                "Authorization".to_string(),
                format!("Bearer {}", token.access_token),
            );
        }
    }
    Ok(headers)
}

/// Runs the OAuth 2.0 device authorization flow end to end: requests a
/// device code, opens the verification URL in the user's browser, polls the
/// token endpoint, and persists the resulting token in the keyring.
pub async fn ensure_oauth_token(auth: &AuthConfig) -> Result<StoredToken> {
    let AuthConfig::OAuth {
        server_name,
        client_id,
        auth_url,
        token_url,
        device_auth_url,
        scopes,
    } = auth
    else {
        bail!("ensure_oauth_token called with a non-OAuth auth config");
    };

    let store = TokenStore::new(server_name);
    if let Some(existing) = store.load().context("loading OAuth token")? {
        let now = current_unix_time();
        if !existing.is_expired(now) {
            return Ok(existing);
        }
    }

    let client = BasicClient::new(ClientId::new(client_id.clone()))
        .set_auth_uri(AuthUrl::new(auth_url.clone()).context("invalid OAuth auth_url")?)
        .set_token_uri(TokenUrl::new(token_url.clone()).context("invalid OAuth token_url")?)
        .set_device_authorization_url(
            DeviceAuthorizationUrl::new(device_auth_url.clone())
                .context("invalid OAuth device_auth_url")?,
        );

    let http_client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .context("building OAuth HTTP client")?;

    let details: StandardDeviceAuthorizationResponse = client
        .exchange_device_code()
        .add_scopes(scopes.iter().cloned().map(Scope::new))
        .request_async(&http_client)
        .await
        .context("requesting device authorization")?;

    let verification_uri = details.verification_uri().to_string();
    tracing::info!(
        server = %server_name,
        url = %verification_uri,
        user_code = %details.user_code().secret(),
        "opening browser for MCP server OAuth login"
    );
    let _ = webbrowser::open(&verification_uri);

    let token = client
        .exchange_device_access_token(&details)
        .request_async(&http_client, tokio::time::sleep, None)
        .await
        .context("polling for device access token")?;

    let stored = StoredToken {
        access_token: oauth2::TokenResponse::access_token(&token).secret().clone(),
        refresh_token: oauth2::TokenResponse::refresh_token(&token)
            .map(|t| t.secret().clone()),
        expires_at: oauth2::TokenResponse::expires_in(&token)
            .map(|dur| current_unix_time() + dur.as_secs() as i64),
    };
    store.store(&stored).context("persisting OAuth token")?;
    Ok(stored)
}

fn current_unix_time() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[tokio::test]
    async fn bearer_header_is_well_formed() {
        let auth = AuthConfig::Bearer {
            token: "abc123".to_string(),
        };
        let headers = build_auth_headers(&auth).await.expect("headers");
        assert_eq!(headers.get("Authorization").unwrap(), "Bearer abc123");
    }

    #[tokio::test]
    async fn api_key_uses_configured_header_name() {
        let auth = AuthConfig::ApiKey {
            header_name: "X-Api-Key".to_string(),
            key: "secret".to_string(),
        };
        let headers = build_auth_headers(&auth).await.expect("headers");
        assert_eq!(headers.get("X-Api-Key").unwrap(), "secret");
    }

    #[tokio::test]
    async fn basic_header_is_base64_encoded() {
        let auth = AuthConfig::Basic {
            username: "user".to_string(),
            password: "pass".to_string(),
        };
        let headers = build_auth_headers(&auth).await.expect("headers");
        let value = headers.get("Authorization").unwrap();
        assert!(value.starts_with("Basic "));
    }
}
