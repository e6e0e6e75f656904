// Forward-auth verification: validates the session cookie for the reverse
// proxy, redirecting to the login page when the token is missing or bad.

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use base64::Engine;
use hmac::{Hmac, Mac};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use sha2::Sha256;

use crate::api::state::SharedState;

const SESSION_COOKIE: &str = "kg_access_token";
const LOGIN_URL: &str = "/login";

/// Derive the access-token signing key. Must match the admin app's
/// derivation: base64(HMAC-SHA256(secret, "access")).
pub fn derive_access_key(secret: &str) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(b"access");
    base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
}

/// Verify an HS256 session token against the derived key.
pub fn verify_session_token(token: &str, secret: &str) -> bool {
    if secret.is_empty() {
        return false;
    }
    let key = derive_access_key(secret);
    jsonwebtoken::decode::<serde_json::Value>(
        token,
        &DecodingKey::from_secret(key.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .is_ok()
}

/// Forward-auth endpoint: 200 with `{status: ok}` when the session cookie
/// verifies, 302 to the login page with the original URI otherwise.
pub async fn verify_auth(State(state): State<SharedState>, headers: HeaderMap) -> Response {
    match cookie_value(&headers, SESSION_COOKIE) {
        Some(token) if verify_session_token(&token, &state.settings.jwt_secret) => {
            Json(serde_json::json!({ "status": "ok" })).into_response()
        }
        _ => login_redirect(&headers),
    }
}

fn login_redirect(headers: &HeaderMap) -> Response {
    // X-Forwarded-Uri is set by the reverse proxy's forward_auth.
    let original_uri = headers
        .get("x-forwarded-uri")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("/");
    let redirect_target = urlencoding::encode(original_uri);
    let location = format!("{LOGIN_URL}?redirect={redirect_target}");

    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(header::COOKIE)?
        .to_str()
        .ok()?
        .split(';')
        .filter_map(|part| part.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    fn mint_token(secret: &str, exp_offset: i64) -> String {
        let key = derive_access_key(secret);
        let claims = json!({
            "sub": "user-1",
            "exp": chrono::Utc::now().timestamp() + exp_offset,
        });
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(key.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn valid_token_verifies() {
        let token = mint_token("top-secret", 3600);
        assert!(verify_session_token(&token, "top-secret"));
    }

    #[test]
    fn wrong_secret_fails() {
        let token = mint_token("top-secret", 3600);
        assert!(!verify_session_token(&token, "other-secret"));
    }

    #[test]
    fn expired_token_fails() {
        let token = mint_token("top-secret", -3600);
        assert!(!verify_session_token(&token, "top-secret"));
    }

    #[test]
    fn unconfigured_secret_rejects_everything() {
        let token = mint_token("top-secret", 3600);
        assert!(!verify_session_token(&token, ""));
    }

    #[test]
    fn derived_key_is_stable_and_secret_dependent() {
        assert_eq!(derive_access_key("abc"), derive_access_key("abc"));
        assert_ne!(derive_access_key("abc"), derive_access_key("abd"));
    }

    #[test]
    fn cookie_parsing_finds_the_session_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("other=1; kg_access_token=tok-123; theme=dark"),
        );
        assert_eq!(
            cookie_value(&headers, SESSION_COOKIE).as_deref(),
            Some("tok-123")
        );
        assert!(cookie_value(&headers, "missing").is_none());
    }
}
