use super::error::SessionError;
use super::settings::{join_segments, ProtocolVersion, SessionSettings};
use crate::error::{FireboltError, ServerError};
use crate::transport::{HttpRequest, RequestBody, Transport};

use serde::Deserialize;
use tokio_util::sync::CancellationToken;


const AUDIENCE: &str = "https://api.firebolt.io";


#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

fn login_request(settings: &SessionSettings) -> Result<HttpRequest, SessionError> {
    match settings.protocol_version() {
        ProtocolVersion::V2 => {
            let url = join_segments(&settings.identity_url()?, &["oauth", "token"])?;
            let form = vec![
                ("client_id".to_string(), settings.principal.clone()),
                ("client_secret".to_string(), settings.secret.clone()),
                ("grant_type".to_string(), "client_credentials".to_string()),
                ("audience".to_string(), AUDIENCE.to_string()),
            ];
            Ok(HttpRequest::post(url, RequestBody::Form(form)))
        },
        ProtocolVersion::V1 => {
            let url = join_segments(&settings.api_url()?, &["auth", "v1", "login"])?;
            let body = serde_json::json!({
                "username": settings.principal,
                "password": settings.secret,
            });
            Ok(HttpRequest::post(url, RequestBody::Json(body)))
        },
    }
}

/// Log in and return the bearer token for subsequent requests.
pub(crate) async fn authenticate(
    transport: &dyn Transport,
    settings: &SessionSettings,
    cancel: &CancellationToken,
) -> Result<String, FireboltError> {
    let version = settings.protocol_version();
    let request = login_request(settings)?;

    tracing::debug!("Authenticating '{}' with protocol {}", settings.principal, version.number());
    let response = transport
        .send(request, cancel)
        .await
        .map_err(SessionError::from)?;
    let status = response.status;
    let success = response.is_success();
    let body = response.into_bytes().await.map_err(SessionError::from)?;

    if !success {
        let message = ServerError::from_body(status, &body).message;
        return Err(SessionError::Authentication { status, message }.into());
    }

    let token: TokenResponse = serde_json::from_slice(&body)?;
    tracing::debug!("Authenticated '{}' (expires_in={:?})", settings.principal, token.expires_in);
    Ok(token.access_token)
}
