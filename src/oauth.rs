use chrono::{Duration, Utc};
use oauth2::basic::{BasicClient, BasicErrorResponse, BasicTokenResponse, BasicTokenType};
use oauth2::{
    AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet,
    EndpointSet, HttpClientError, RedirectUrl, RefreshToken, RequestTokenError, Scope,
    TokenResponse, TokenUrl,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::auth::{AuthError, StoredToken};
use crate::output::Formatter;

pub const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";
pub const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const REDIRECT_URI: &str = "http://localhost:8085";
const LISTEN_ADDR: &str = "127.0.0.1:8085";
const MAX_REQUEST_HEAD: usize = 8 * 1024;

/// Chat scopes available to a regular user through the consent screen.
pub const SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/chat.spaces",
    "https://www.googleapis.com/auth/chat.spaces.readonly",
    "https://www.googleapis.com/auth/chat.spaces.create",
    "https://www.googleapis.com/auth/chat.messages",
    "https://www.googleapis.com/auth/chat.messages.readonly",
    "https://www.googleapis.com/auth/chat.messages.create",
    "https://www.googleapis.com/auth/chat.messages.reactions",
    "https://www.googleapis.com/auth/chat.messages.reactions.readonly",
    "https://www.googleapis.com/auth/chat.messages.reactions.create",
    "https://www.googleapis.com/auth/chat.memberships",
    "https://www.googleapis.com/auth/chat.memberships.readonly",
    "https://www.googleapis.com/auth/chat.customemojis",
    "https://www.googleapis.com/auth/chat.customemojis.readonly",
    "https://www.googleapis.com/auth/chat.users.readstate",
    "https://www.googleapis.com/auth/chat.users.readstate.readonly",
    "https://www.googleapis.com/auth/chat.users.spacesettings",
];

const SUCCESS_PAGE: &str = "<html><body><h1>Authentication successful!</h1>\
<p>You may close this window and return to the terminal.</p></body></html>";

type GoogleClient = BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;
type TokenError = RequestTokenError<HttpClientError<reqwest::Error>, BasicErrorResponse>;

pub struct OAuthClient {
    client: GoogleClient,
    http: reqwest::Client,
}

impl OAuthClient {
    pub fn new(client_id: String, client_secret: String) -> Result<Self, AuthError> {
        if client_id.trim().is_empty() || client_secret.trim().is_empty() {
            return Err(AuthError::MissingClientCredentials);
        }
        let client = BasicClient::new(ClientId::new(client_id))
            .set_client_secret(ClientSecret::new(client_secret))
            .set_auth_uri(AuthUrl::new(AUTH_URL.to_string())?)
            .set_token_uri(TokenUrl::new(TOKEN_URL.to_string())?)
            .set_redirect_uri(RedirectUrl::new(REDIRECT_URI.to_string())?)
            .set_auth_type(AuthType::RequestBody);

        // The token endpoint must not be followed through redirects.
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { client, http })
    }

    #[cfg(test)]
    pub fn with_token_url(mut self, token_url: String) -> Self {
        self.client = self
            .client
            .set_token_uri(TokenUrl::new(token_url).expect("token url"));
        self
    }

    /// Builds the consent URL along with the CSRF state it carries.
    pub fn authorization_url(&self) -> (Url, CsrfToken) {
        self.client
            .authorize_url(CsrfToken::new_random)
            .add_scopes(SCOPES.iter().map(|scope| Scope::new(scope.to_string())))
            .add_extra_param("access_type", "offline")
            .url()
    }

    pub async fn exchange_code(&self, code: &str) -> Result<StoredToken, AuthError> {
        debug!(">> POST {}", self.client.token_uri().url());
        let response = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(&self.http)
            .await
            .map_err(token_error)?;
        Ok(stored_token(&response, None))
    }

    /// Trades the refresh token for a new access token. The refresh token is
    /// carried over when the endpoint does not rotate it.
    pub async fn refresh(&self, token: &StoredToken) -> Result<StoredToken, AuthError> {
        let Some(refresh_token) = token.refresh_token.as_deref().filter(|t| !t.is_empty()) else {
            return Err(AuthError::NotLoggedIn);
        };
        debug!(">> POST {}", self.client.token_uri().url());
        let response = self
            .client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(&self.http)
            .await
            .map_err(token_error)?;
        Ok(stored_token(&response, token.refresh_token.clone()))
    }
}

fn stored_token(response: &BasicTokenResponse, previous_refresh: Option<String>) -> StoredToken {
    let token_type = match response.token_type() {
        BasicTokenType::Bearer => "Bearer".to_string(),
        BasicTokenType::Mac => "MAC".to_string(),
        BasicTokenType::Extension(other) => other.clone(),
    };
    StoredToken {
        access_token: response.access_token().secret().clone(),
        token_type,
        refresh_token: response
            .refresh_token()
            .map(|refresh| refresh.secret().clone())
            .or(previous_refresh),
        expiry: response
            .expires_in()
            .and_then(|lifetime| Duration::from_std(lifetime).ok())
            .filter(|lifetime| *lifetime > Duration::zero())
            .map(|lifetime| Utc::now() + lifetime),
    }
}

fn token_error(err: TokenError) -> AuthError {
    match err {
        RequestTokenError::ServerResponse(response) => {
            let kind = response.error().as_ref().to_string();
            let detail = match response.error_description() {
                Some(description) if !description.is_empty() => format!("{kind}: {description}"),
                _ => kind,
            };
            AuthError::TokenEndpoint(detail)
        }
        other => AuthError::TokenEndpoint(other.to_string()),
    }
}

/// Extracts the authorization code from the request line of the redirect,
/// e.g. `GET /?state=abc&code=4/xyz HTTP/1.1`.
pub fn parse_callback(request_line: &str, expected_state: &str) -> Result<String, AuthError> {
    let target = request_line
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| AuthError::Callback("malformed callback request".to_string()))?;
    let url = Url::parse(REDIRECT_URI)?.join(target)?;

    let mut code = None;
    let mut error = None;
    let mut state = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            _ => {}
        }
    }

    match code.filter(|code| !code.is_empty()) {
        Some(code) => {
            if state.as_deref() != Some(expected_state) {
                return Err(AuthError::Callback("state mismatch".to_string()));
            }
            Ok(code)
        }
        None => Err(AuthError::Callback(
            error
                .filter(|error| !error.is_empty())
                .unwrap_or_else(|| "no authorization code received".to_string()),
        )),
    }
}

/// Serves exactly one redirect request on `listener`.
pub async fn wait_for_callback(
    listener: &TcpListener,
    expected_state: &str,
    cancel: &CancellationToken,
) -> Result<String, AuthError> {
    let (mut stream, peer) = tokio::select! {
        biased;
        () = cancel.cancelled() => return Err(AuthError::Cancelled),
        accepted = listener.accept() => accepted?,
    };
    debug!("oauth callback connection from {peer}");

    let head = read_request_head(&mut stream).await?;
    let request_line = head.lines().next().unwrap_or_default();
    let outcome = parse_callback(request_line, expected_state);

    let response = match &outcome {
        Ok(_) => http_response("200 OK", "text/html; charset=utf-8", SUCCESS_PAGE),
        Err(err) => http_response(
            "400 Bad Request",
            "text/plain; charset=utf-8",
            &format!("Authentication failed: {err}"),
        ),
    };
    if let Err(err) = stream.write_all(response.as_bytes()).await {
        warn!("failed to answer oauth callback: {err}");
    }
    let _ = stream.shutdown().await;
    outcome
}

async fn read_request_head(stream: &mut TcpStream) -> Result<String, AuthError> {
    let mut buffer = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    loop {
        let read = stream.read(&mut chunk).await?;
        if read == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..read]);
        if buffer.windows(4).any(|window| window == b"\r\n\r\n") || buffer.len() >= MAX_REQUEST_HEAD {
            break;
        }
    }
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

fn http_response(status: &str, content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
}

/// Runs the interactive authorization-code flow and returns the new token.
pub async fn login(
    oauth: &OAuthClient,
    formatter: &Formatter,
    cancel: &CancellationToken,
    launch_browser: bool,
) -> Result<StoredToken, AuthError> {
    let (auth_url, state) = oauth.authorization_url();

    // Bind before opening the browser so the redirect cannot race us.
    let listener = TcpListener::bind(LISTEN_ADDR).await?;

    formatter.message("Opening browser for authentication...");
    formatter.message(&format!(
        "If the browser does not open automatically, visit:\n{auth_url}"
    ));
    if launch_browser {
        if let Err(err) = open::that(auth_url.as_str()) {
            formatter.message(&format!("Warning: could not open browser automatically: {err}"));
        }
    }

    let code = wait_for_callback(&listener, state.secret(), cancel).await?;
    oauth.exchange_code(&code).await
}
