use crate::error::{Result, SourceError};
use crate::http::{HttpRequest, HttpResponse, HttpTransport};
use crate::retry::{RetryPolicy, Sleeper};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Trakt answers with this code when a non-VIP account hits a hard quota
/// (number of lists, items per list, ...)
pub const STATUS_ACCOUNT_LIMIT_EXCEEDED: u16 = 420;
pub const STATUS_TOO_MANY_REQUESTS: u16 = 429;

/// Sends requests and classifies the responses.
///
/// 200/201/204/404 are handed back to the caller, 429 is retried after the
/// server's `Retry-After` until the policy budget runs out, 420 and every
/// other status fail immediately.
#[derive(Clone)]
pub struct RequestExecutor {
    transport: Arc<dyn HttpTransport>,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl RequestExecutor {
    pub fn new(transport: Arc<dyn HttpTransport>, policy: RetryPolicy, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            transport,
            policy,
            sleeper,
        }
    }

    pub async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        let method = request.method.to_string();
        let url = request.url.clone();
        let max_attempts = self.policy.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            let response = self.transport.send(request.clone()).await?;
            match response.status {
                200 | 201 | 204 | 404 => {
                    debug!(method = %method, url = %url, status = response.status, attempt, "Trakt request completed");
                    return Ok(response);
                }
                STATUS_TOO_MANY_REQUESTS => {
                    let wait = self.retry_after(&response);
                    warn!(
                        method = %method,
                        url = %url,
                        attempt,
                        max_attempts,
                        retry_after_secs = wait.as_secs(),
                        "Trakt rate limit hit"
                    );
                    if attempt < max_attempts {
                        self.sleeper.sleep(wait).await;
                    }
                }
                STATUS_ACCOUNT_LIMIT_EXCEEDED => {
                    return Err(SourceError::AccountLimit(format!(
                        "{} {} was rejected because the Trakt account limit was reached. \
                         Free accounts can hold a limited number of lists and list items; \
                         delete unused lists or upgrade to Trakt VIP, then run the sync again",
                        method, url
                    )));
                }
                status => {
                    return Err(SourceError::Api { method, url, status });
                }
            }
        }

        Err(SourceError::MaxRetries {
            method,
            url,
            attempts: max_attempts,
        })
    }

    fn retry_after(&self, response: &HttpResponse) -> Duration {
        response
            .header("Retry-After")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(self.policy.default_retry_after)
    }
}
