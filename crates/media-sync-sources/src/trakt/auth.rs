//! Device-authorization handshake.
//!
//! Trakt's device flow normally needs a human to type the user code into a
//! browser. The sync drives those browser steps itself over a cookie-carrying
//! HTTP session: sign in, open the activation page, submit the user code and
//! approve the app, then exchange the device code for an access token.

use crate::error::{Result, SourceError};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::trakt::api::{
    api_headers, DeviceCodeRequest, DeviceCodeResponse, DeviceTokenRequest, DeviceTokenResponse,
    API_URL, WEB_URL,
};
use crate::trakt::executor::RequestExecutor;
use scraper::{Html, Selector};
use std::fmt;
use tracing::{debug, info};

const SIGNIN_TOKEN_SELECTOR: &str = r#"form[action="/auth/signin"] input[name="authenticity_token"]"#;
const ACTIVATE_TOKEN_SELECTOR: &str = r#"form[action="/activate"] input[name="authenticity_token"]"#;
const AUTHORIZE_TOKEN_SELECTOR: &str = r#"form[action="/activate/authorize"] input[name="authenticity_token"]"#;
const PROFILE_LINK_SELECTOR: &str = r#"a[href^="/users/"]"#;

#[derive(Debug, Clone)]
pub struct TraktCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub email: String,
    pub password: String,
}

/// Result of a completed handshake. Built once per run and read-only
/// afterwards.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub device_code: String,
    pub user_code: String,
    pub access_token: String,
    pub username: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStep {
    RequestDeviceCode,
    BrowseSignInPage,
    SubmitCredentials,
    BrowseActivationPage,
    SubmitActivationCode,
    AuthorizeApp,
    ExchangeToken,
}

impl fmt::Display for AuthStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AuthStep::RequestDeviceCode => "request device code",
            AuthStep::BrowseSignInPage => "browse sign-in page",
            AuthStep::SubmitCredentials => "submit credentials",
            AuthStep::BrowseActivationPage => "browse activation page",
            AuthStep::SubmitActivationCode => "submit activation code",
            AuthStep::AuthorizeApp => "authorize app",
            AuthStep::ExchangeToken => "exchange token",
        };
        f.write_str(s)
    }
}

/// Run the full handshake. Any missing page element aborts the run.
pub async fn authenticate(executor: &RequestExecutor, credentials: &TraktCredentials) -> Result<AuthSession> {
    let DeviceCodeResponse {
        device_code,
        user_code,
        ..
    } = request_device_code(executor, credentials).await?;

    step(AuthStep::BrowseSignInPage);
    let page = send_page(executor, HttpRequest::new(HttpMethod::Get, format!("{}/auth/signin", WEB_URL))).await?;
    let token = scrape_attribute(&page.body, SIGNIN_TOKEN_SELECTOR, "value", "/auth/signin")?;

    step(AuthStep::SubmitCredentials);
    send_page(
        executor,
        HttpRequest::new(HttpMethod::Post, format!("{}/auth/signin", WEB_URL)).form([
            ("authenticity_token", token.as_str()),
            ("user[login]", credentials.email.as_str()),
            ("user[password]", credentials.password.as_str()),
            ("user[remember_me]", "1"),
        ]),
    )
    .await?;

    step(AuthStep::BrowseActivationPage);
    let page = send_page(executor, HttpRequest::new(HttpMethod::Get, format!("{}/activate", WEB_URL))).await?;
    let token = scrape_attribute(&page.body, ACTIVATE_TOKEN_SELECTOR, "value", "/activate")?;

    step(AuthStep::SubmitActivationCode);
    let page = send_page(
        executor,
        HttpRequest::new(HttpMethod::Post, format!("{}/activate", WEB_URL)).form([
            ("authenticity_token", token.as_str()),
            ("code", user_code.as_str()),
            ("commit", "Continue"),
        ]),
    )
    .await?;
    let token = scrape_attribute(&page.body, AUTHORIZE_TOKEN_SELECTOR, "value", "/activate")?;

    step(AuthStep::AuthorizeApp);
    let page = send_page(
        executor,
        HttpRequest::new(HttpMethod::Post, format!("{}/activate/authorize", WEB_URL)).form([
            ("authenticity_token", token.as_str()),
            ("commit", "Yes"),
        ]),
    )
    .await?;
    let profile = scrape_attribute(&page.body, PROFILE_LINK_SELECTOR, "href", "/activate/authorize")?;
    let username = username_from_profile_link(&profile)
        .ok_or_else(|| SourceError::scrape(PROFILE_LINK_SELECTOR, "/activate/authorize"))?;

    step(AuthStep::ExchangeToken);
    let body = serde_json::to_value(DeviceTokenRequest {
        code: &device_code,
        client_id: &credentials.client_id,
        client_secret: &credentials.client_secret,
    })?;
    let response = send_page(
        executor,
        HttpRequest::new(HttpMethod::Post, format!("{}/oauth/device/token", API_URL))
            .headers(api_headers(&credentials.client_id, None))
            .json(body),
    )
    .await?;
    let token: DeviceTokenResponse = response.json()?;

    info!(username = %username, "Authenticated to Trakt");
    Ok(AuthSession {
        device_code,
        user_code,
        access_token: token.access_token,
        username,
    })
}

async fn request_device_code(executor: &RequestExecutor, credentials: &TraktCredentials) -> Result<DeviceCodeResponse> {
    step(AuthStep::RequestDeviceCode);
    let body = serde_json::to_value(DeviceCodeRequest {
        client_id: &credentials.client_id,
    })?;
    let response = send_page(
        executor,
        HttpRequest::new(HttpMethod::Post, format!("{}/oauth/device/code", API_URL))
            .headers(api_headers(&credentials.client_id, None))
            .json(body),
    )
    .await?;
    response.json()
}

fn step(step: AuthStep) {
    debug!(step = %step, "Trakt device authorization");
}

/// Every handshake step needs a 2xx; a 404 here means the flow broke.
async fn send_page(executor: &RequestExecutor, request: HttpRequest) -> Result<HttpResponse> {
    let method = request.method.to_string();
    let url = request.url.clone();
    let response = executor.execute(request).await?;
    if !response.is_success() {
        return Err(SourceError::Api {
            method,
            url,
            status: response.status,
        });
    }
    Ok(response)
}

/// First non-empty `attribute` of the elements matching `selector`
fn scrape_attribute(body: &str, selector: &str, attribute: &str, page: &str) -> Result<String> {
    let document = Html::parse_document(body);
    let parsed = Selector::parse(selector).map_err(|_| SourceError::scrape(selector, page))?;
    document
        .select(&parsed)
        .filter_map(|element| element.value().attr(attribute))
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or_else(|| SourceError::scrape(selector, page))
}

fn username_from_profile_link(href: &str) -> Option<String> {
    href.strip_prefix("/users/")
        .and_then(|rest| rest.split(['/', '?', '#']).next())
        .filter(|slug| !slug.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::testing::ScriptedTransport;
    use crate::http::RequestBody;
    use crate::retry::testing::RecordingSleeper;
    use crate::retry::RetryPolicy;
    use std::sync::Arc;

    const SIGNIN_PAGE: &str = r#"<html><body>
        <form action="/auth/signin" method="post">
          <input type="hidden" name="authenticity_token" value="signin-token">
          <input name="user[login]"><input name="user[password]" type="password">
        </form></body></html>"#;
    const ACTIVATE_PAGE: &str = r#"<html><body>
        <form action="/activate" method="post">
          <input type="hidden" name="authenticity_token" value="activate-token">
          <input name="code">
        </form></body></html>"#;
    const AUTHORIZE_PAGE: &str = r#"<html><body>
        <form action="/activate/authorize" method="post">
          <input type="hidden" name="authenticity_token" value="authorize-token">
          <input type="submit" name="commit" value="Yes">
        </form></body></html>"#;
    const AUTHORIZED_PAGE: &str = r#"<html><body>
        <nav><a href="/users/movie-buff/lists">Lists</a></nav>
        <p>Woohoo! Your device is now connected.</p></body></html>"#;

    fn credentials() -> TraktCredentials {
        TraktCredentials {
            client_id: "client-id".into(),
            client_secret: "client-secret".into(),
            email: "someone@example.com".into(),
            password: "hunter2".into(),
        }
    }

    fn happy_path() -> Vec<HttpResponse> {
        vec![
            HttpResponse::new(200, r#"{"device_code":"dev-123","user_code":"ABCD1234","verification_url":"https://trakt.tv/activate","expires_in":600,"interval":5}"#),
            HttpResponse::new(200, SIGNIN_PAGE),
            HttpResponse::new(200, "<html>dashboard</html>"),
            HttpResponse::new(200, ACTIVATE_PAGE),
            HttpResponse::new(200, AUTHORIZE_PAGE),
            HttpResponse::new(200, AUTHORIZED_PAGE),
            HttpResponse::new(200, r#"{"access_token":"access-xyz","refresh_token":"refresh","expires_in":7776000}"#),
        ]
    }

    fn executor(transport: Arc<ScriptedTransport>) -> RequestExecutor {
        RequestExecutor::new(transport, RetryPolicy::default(), Arc::new(RecordingSleeper::default()))
    }

    fn form_value(request: &HttpRequest, key: &str) -> Option<String> {
        match &request.body {
            Some(RequestBody::Form(fields)) => fields.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone()),
            _ => None,
        }
    }

    #[tokio::test]
    async fn test_full_handshake_yields_session() {
        let transport = Arc::new(ScriptedTransport::new(happy_path()));
        let session = authenticate(&executor(transport.clone()), &credentials()).await.unwrap();

        assert_eq!(session.device_code, "dev-123");
        assert_eq!(session.user_code, "ABCD1234");
        assert_eq!(session.access_token, "access-xyz");
        assert_eq!(session.username, "movie-buff");

        let requests = transport.requests();
        assert_eq!(requests.len(), 7);
        assert_eq!(requests[0].url, "https://api.trakt.tv/oauth/device/code");
        assert_eq!(form_value(&requests[2], "authenticity_token").as_deref(), Some("signin-token"));
        assert_eq!(form_value(&requests[2], "user[login]").as_deref(), Some("someone@example.com"));
        assert_eq!(form_value(&requests[4], "code").as_deref(), Some("ABCD1234"));
        assert_eq!(form_value(&requests[4], "authenticity_token").as_deref(), Some("activate-token"));
        assert_eq!(form_value(&requests[5], "authenticity_token").as_deref(), Some("authorize-token"));
        assert_eq!(form_value(&requests[5], "commit").as_deref(), Some("Yes"));
        match &requests[6].body {
            Some(RequestBody::Json(body)) => assert_eq!(body["code"], "dev-123"),
            other => panic!("unexpected body: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_signin_token_is_fatal() {
        let mut responses = happy_path();
        responses[1] = HttpResponse::new(200, "<html><body>maintenance</body></html>");
        let transport = Arc::new(ScriptedTransport::new(responses));

        let err = authenticate(&executor(transport.clone()), &credentials()).await.unwrap_err();

        assert!(matches!(err, SourceError::Scrape { ref page, .. } if page == "/auth/signin"));
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_username_is_fatal() {
        let mut responses = happy_path();
        responses[5] = HttpResponse::new(200, "<html><body>no profile link</body></html>");
        let transport = Arc::new(ScriptedTransport::new(responses));

        let err = authenticate(&executor(transport), &credentials()).await.unwrap_err();
        assert!(matches!(err, SourceError::Scrape { .. }));
    }

    #[tokio::test]
    async fn test_rejected_device_code_request_is_api_error() {
        let transport = Arc::new(ScriptedTransport::new(vec![HttpResponse::new(404, "")]));
        let err = authenticate(&executor(transport), &credentials()).await.unwrap_err();
        assert!(matches!(err, SourceError::Api { status: 404, .. }));
    }

    #[test]
    fn test_username_from_profile_link() {
        assert_eq!(username_from_profile_link("/users/movie-buff").as_deref(), Some("movie-buff"));
        assert_eq!(username_from_profile_link("/users/movie-buff/lists?page=2").as_deref(), Some("movie-buff"));
        assert_eq!(username_from_profile_link("/users/"), None);
        assert_eq!(username_from_profile_link("/movies/alien"), None);
    }
}
