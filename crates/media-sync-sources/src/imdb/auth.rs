use crate::error::{Result, SourceError};
use crate::imdb::page::PageDriver;
use crate::retry::Sleeper;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const HOMEPAGE_URL: &str = "https://www.imdb.com/";
pub const SIGNIN_URL: &str = "https://www.imdb.com/registration/signin/?subPageType=sign_in";
pub const PROFILE_URL: &str = "https://www.imdb.com/profile";
pub const WATCHLIST_URL: &str = "https://www.imdb.com/list/watchlist";

pub const LOGOUT_SELECTOR: &str = r#"a[href*="/registration/logout"]"#;
pub const SIGNIN_OPTION_SELECTOR: &str = r#"a[data-testid="sign_in_option_IMDB"]"#;
pub const EMAIL_SELECTOR: &str = r#"input[type="email"]"#;
pub const PASSWORD_SELECTOR: &str = r#"input[type="password"]"#;
pub const SUBMIT_SELECTOR: &str = r#"input[type="submit"]"#;
pub const SIGNIN_SUCCESS_SELECTOR: &str = ".nav__userMenu";
pub const SIGNIN_ERROR_SELECTOR: &str = "#auth-error-message-box";
pub const CAPTCHA_SELECTOR: &str = r#"img[alt="captcha"], #auth-captcha-image, iframe[src*="captcha"]"#;
pub const USERNAME_SELECTOR: &str = ".navbar__user-name";
pub const PAGE_ID_SELECTOR: &str = r#"meta[property="pageId"]"#;

const SIGNIN_RESULT_CHECKS: u32 = 30;
const SIGNIN_RESULT_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImdbAuth {
    Cookies { at_main: String, ubid_main: String },
    Credentials { email: String, password: String },
    /// Public-only mode: every export-dependent read is a no-op
    None,
}

/// Account addressing discovered after sign-in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub username: String,
    pub watchlist_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SigninOutcome {
    Success,
    Rejected,
    Captcha,
}

/// Sign in with the configured mode. Returns `false` for [`ImdbAuth::None`].
pub async fn authenticate(page: &dyn PageDriver, auth: &ImdbAuth, sleeper: &dyn Sleeper) -> Result<bool> {
    match auth {
        ImdbAuth::None => {
            info!("IMDb authentication disabled, exports will be skipped");
            Ok(false)
        }
        ImdbAuth::Cookies { at_main, ubid_main } => {
            page.set_cookies(&[
                ("at-main".to_string(), at_main.clone()),
                ("ubid-main".to_string(), ubid_main.clone()),
            ])
            .await?;
            page.navigate(HOMEPAGE_URL).await?;
            if !page.exists(LOGOUT_SELECTOR).await? {
                return Err(SourceError::Authentication(
                    "IMDb rejected the session cookies (no logout control after loading the homepage); \
                     copy fresh at-main and ubid-main values from a signed-in browser"
                        .to_string(),
                ));
            }
            info!("Signed in to IMDb with session cookies");
            Ok(true)
        }
        ImdbAuth::Credentials { email, password } => {
            sign_in_with_credentials(page, email, password, sleeper).await?;
            info!("Signed in to IMDb with credentials");
            Ok(true)
        }
    }
}

async fn sign_in_with_credentials(page: &dyn PageDriver, email: &str, password: &str, sleeper: &dyn Sleeper) -> Result<()> {
    page.navigate(SIGNIN_URL).await?;
    if page.exists(SIGNIN_OPTION_SELECTOR).await? {
        page.click(SIGNIN_OPTION_SELECTOR).await?;
    }
    page.fill(EMAIL_SELECTOR, email).await?;
    page.fill(PASSWORD_SELECTOR, password).await?;
    page.click(SUBMIT_SELECTOR).await?;
    debug!("Submitted IMDb sign-in form");

    match race_signin_outcome(page, sleeper).await? {
        SigninOutcome::Success => Ok(()),
        SigninOutcome::Captcha => Err(SourceError::Captcha),
        SigninOutcome::Rejected => {
            let message = page
                .text(SIGNIN_ERROR_SELECTOR)
                .await?
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| "IMDb rejected the email/password".to_string());
            Err(SourceError::Authentication(message))
        }
    }
}

/// First of success/error/captcha indicators to appear wins
async fn race_signin_outcome(page: &dyn PageDriver, sleeper: &dyn Sleeper) -> Result<SigninOutcome> {
    for check in 1..=SIGNIN_RESULT_CHECKS {
        if page.exists(SIGNIN_SUCCESS_SELECTOR).await? {
            return Ok(SigninOutcome::Success);
        }
        if page.exists(CAPTCHA_SELECTOR).await? {
            warn!("IMDb presented a captcha");
            return Ok(SigninOutcome::Captcha);
        }
        if page.exists(SIGNIN_ERROR_SELECTOR).await? {
            return Ok(SigninOutcome::Rejected);
        }
        debug!(check, "Waiting for IMDb sign-in result");
        sleeper.sleep(SIGNIN_RESULT_INTERVAL).await;
    }
    Err(SourceError::Authentication(format!(
        "no sign-in result after {} checks",
        SIGNIN_RESULT_CHECKS
    )))
}

/// Discover user id, username and watchlist id. Every later page address
/// depends on them, so any missing element is fatal.
pub async fn hydrate(page: &dyn PageDriver) -> Result<Identity> {
    page.navigate(PROFILE_URL).await?;
    let user_id = page
        .attribute(PAGE_ID_SELECTOR, "content")
        .await?
        .filter(|id| id.starts_with("ur"))
        .ok_or_else(|| SourceError::scrape(PAGE_ID_SELECTOR, PROFILE_URL))?;
    let username = page
        .text(USERNAME_SELECTOR)
        .await?
        .filter(|name| !name.is_empty())
        .ok_or_else(|| SourceError::scrape(USERNAME_SELECTOR, PROFILE_URL))?;

    page.navigate(WATCHLIST_URL).await?;
    let watchlist_id = page
        .attribute(PAGE_ID_SELECTOR, "content")
        .await?
        .filter(|id| id.starts_with("ls"))
        .ok_or_else(|| SourceError::scrape(PAGE_ID_SELECTOR, WATCHLIST_URL))?;

    info!(user_id = %user_id, username = %username, watchlist_id = %watchlist_id, "Hydrated IMDb identity");
    Ok(Identity {
        user_id,
        username,
        watchlist_id,
    })
}
