//! Rate-limited retrying transport.

use crate::config::RetryConfig;
use crate::error::{EngineError, EngineResult};
use crate::http::{HttpClient, HttpRequest, HttpResponse};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Status codes retried with backoff.
const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

fn is_retryable_status(status: u16) -> bool {
    RETRYABLE_STATUSES.contains(&status)
}

/// Computes the wait before the next attempt, `attempt` being the number
/// of attempts already made.
///
/// Server guidance wins: an `X-RateLimit-RetryAfter` header is honored as
/// a lower bound on the wait, and a thinning `X-RateLimit-Remaining` /
/// `X-RateLimit-Limit` budget stretches the default delay. Without
/// guidance the wait follows the configured exponential schedule, which
/// never decreases across attempts.
pub fn compute_backoff(
    retry: &RetryConfig,
    attempt: u32,
    response: Option<&HttpResponse>,
) -> Duration {
    let fallback = retry.delay_for_attempt(attempt);
    let Some(response) = response else {
        return fallback;
    };

    if let Some(retry_after) = parse_header_f64(response, "x-ratelimit-retryafter") {
        if retry_after >= 0.0 {
            return fallback.max(Duration::from_secs_f64(retry_after));
        }
    }

    let remaining = parse_header_f64(response, "x-ratelimit-remaining");
    let limit = parse_header_f64(response, "x-ratelimit-limit");
    if let (Some(remaining), Some(limit)) = (remaining, limit) {
        if limit > 0.0 {
            let pressure = 1.0 + ((limit - remaining).max(0.0) / limit);
            let stretched = Duration::from_secs_f64(fallback.as_secs_f64() * pressure);
            return stretched.min(retry.max_delay.max(fallback));
        }
    }

    fallback
}

fn parse_header_f64(response: &HttpResponse, name: &str) -> Option<f64> {
    response.header(name)?.trim().parse().ok()
}

/// Issues requests through an [`HttpClient`], retrying transient failures
/// with computed backoff.
///
/// Retry waits block only the calling thread; the transport holds no
/// shared state across attempts, so requests from other callers proceed
/// unaffected.
pub struct RateLimitedTransport<C: HttpClient> {
    client: C,
    retry: RetryConfig,
    authorization: Option<String>,
}

impl<C: HttpClient> RateLimitedTransport<C> {
    /// Creates a transport over the given client.
    pub fn new(client: C, retry: RetryConfig) -> Self {
        Self {
            client,
            retry,
            authorization: None,
        }
    }

    /// Sets the bearer credential attached to every request.
    pub fn with_authorization(mut self, token: impl Into<String>) -> Self {
        self.authorization = Some(token.into());
        self
    }

    /// Returns the underlying HTTP client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Executes a request, retrying transient responses.
    ///
    /// - 2xx returns the response
    /// - 403 fails immediately with [`EngineError::Forbidden`]
    /// - 429 and retryable 5xx statuses retry up to the attempt budget,
    ///   then fail with [`EngineError::RetriesExhausted`]
    /// - other statuses fail with [`EngineError::Api`]
    pub fn execute(&self, request: HttpRequest) -> EngineResult<HttpResponse> {
        let request = self.prepare(request);
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let transient = match self.client.execute(&request) {
                Ok(response) if response.is_success() => return Ok(response),
                Ok(response) if response.status == 403 => {
                    return Err(EngineError::Forbidden {
                        url: request.url.clone(),
                    });
                }
                Ok(response) if is_retryable_status(response.status) => {
                    warn!(
                        url = %request.url,
                        status = response.status,
                        attempts,
                        "transient API response"
                    );
                    Some(response)
                }
                Ok(response) => {
                    return Err(EngineError::Api {
                        url: request.url.clone(),
                        status: response.status,
                    });
                }
                Err(message) => {
                    warn!(url = %request.url, %message, attempts, "request failed");
                    None
                }
            };

            if attempts >= self.retry.max_attempts {
                return Err(EngineError::RetriesExhausted { attempts });
            }

            let delay = compute_backoff(&self.retry, attempts, transient.as_ref());
            debug!(url = %request.url, ?delay, "waiting before retry");
            std::thread::sleep(delay);
        }
    }

    /// POSTs a JSON payload and parses the JSON response.
    pub fn post_json<Req, Res>(&self, url: &str, body: &Req) -> EngineResult<Res>
    where
        Req: Serialize,
        Res: DeserializeOwned,
    {
        let request = HttpRequest::post(url)
            .with_header("content-type", "application/json")
            .with_body(serde_json::to_vec(body)?);

        let response = self.execute(request)?;
        if response.body.is_empty() {
            Ok(serde_json::from_slice(b"null")?)
        } else {
            Ok(serde_json::from_slice(&response.body)?)
        }
    }

    fn prepare(&self, mut request: HttpRequest) -> HttpRequest {
        if !has_header(&request, "accept") {
            request = request.with_header("accept", "application/json");
        }
        if let Some(token) = &self.authorization {
            if !has_header(&request, "authorization") {
                request = request.with_header("authorization", format!("Bearer {token}"));
            }
        }
        request
    }
}

fn has_header(request: &HttpRequest, name: &str) -> bool {
    request
        .headers
        .iter()
        .any(|(n, _)| n.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Replays a scripted sequence of responses, repeating the last one.
    struct SequenceClient {
        responses: Mutex<VecDeque<Result<HttpResponse, String>>>,
        last: Mutex<Option<Result<HttpResponse, String>>>,
        attempts: AtomicU32,
        seen_headers: Mutex<Vec<(String, String)>>,
    }

    impl SequenceClient {
        fn new(responses: Vec<Result<HttpResponse, String>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                last: Mutex::new(None),
                attempts: AtomicU32::new(0),
                seen_headers: Mutex::new(Vec::new()),
            }
        }

        fn attempts(&self) -> u32 {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    impl HttpClient for SequenceClient {
        fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, String> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            *self.seen_headers.lock() = request.headers.clone();
            match self.responses.lock().pop_front() {
                Some(response) => {
                    *self.last.lock() = Some(response.clone());
                    response
                }
                None => self
                    .last
                    .lock()
                    .clone()
                    .unwrap_or_else(|| Err("no scripted response".into())),
            }
        }
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig::new(5)
            .with_initial_delay(Duration::from_millis(1))
            .with_max_delay(Duration::from_millis(4))
    }

    fn transport_over(
        responses: Vec<Result<HttpResponse, String>>,
    ) -> RateLimitedTransport<SequenceClient> {
        RateLimitedTransport::new(SequenceClient::new(responses), fast_retry())
    }

    #[test]
    fn success_returns_response() {
        let transport = transport_over(vec![Ok(HttpResponse::new(200, b"{\"ok\":true}".to_vec()))]);
        let response = transport
            .execute(HttpRequest::get("http://localhost/ping"))
            .unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(transport.client.attempts(), 1);
    }

    #[test]
    fn rate_limit_without_headers_exhausts_five_attempts() {
        let transport = transport_over(vec![Ok(HttpResponse::new(429, Vec::new()))]);
        let err = transport
            .execute(HttpRequest::get("http://localhost/limited"))
            .unwrap_err();

        assert_eq!(transport.client.attempts(), 5);
        assert!(matches!(err, EngineError::RetriesExhausted { attempts: 5 }));
        assert!(err.to_string().contains("5 attempts"));
    }

    #[test]
    fn rate_limit_with_headers_still_exhausts_five_attempts() {
        let response = HttpResponse::new(429, Vec::new())
            .with_header("X-RateLimit-Remaining", "7")
            .with_header("X-RateLimit-Limit", "10")
            .with_header("X-RateLimit-RetryAfter", "0");
        let transport = transport_over(vec![Ok(response)]);

        let err = transport
            .execute(HttpRequest::get("http://localhost/limited"))
            .unwrap_err();
        assert_eq!(transport.client.attempts(), 5);
        assert!(err.to_string().contains("5 attempts"));
    }

    #[test]
    fn forbidden_fails_after_one_attempt() {
        let transport = transport_over(vec![Ok(HttpResponse::new(403, Vec::new()))]);
        let err = transport
            .execute(HttpRequest::get("http://localhost/secret"))
            .unwrap_err();

        assert_eq!(transport.client.attempts(), 1);
        assert!(matches!(err, EngineError::Forbidden { .. }));
        assert!(err.to_string().contains("403 Forbidden"));
    }

    #[test]
    fn non_retryable_status_fails_after_one_attempt() {
        let transport = transport_over(vec![Ok(HttpResponse::new(400, Vec::new()))]);
        let err = transport
            .execute(HttpRequest::get("http://localhost/bad"))
            .unwrap_err();

        assert_eq!(transport.client.attempts(), 1);
        assert!(matches!(err, EngineError::Api { status: 400, .. }));
    }

    #[test]
    fn recovers_after_transient_responses() {
        let transport = transport_over(vec![
            Ok(HttpResponse::new(429, Vec::new())),
            Ok(HttpResponse::new(503, Vec::new())),
            Ok(HttpResponse::new(200, b"{}".to_vec())),
        ]);

        let response = transport
            .execute(HttpRequest::get("http://localhost/flaky"))
            .unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(transport.client.attempts(), 3);
    }

    #[test]
    fn network_errors_are_retried() {
        let transport = transport_over(vec![
            Err("connection reset".into()),
            Ok(HttpResponse::new(200, b"{}".to_vec())),
        ]);

        let response = transport
            .execute(HttpRequest::get("http://localhost/ping"))
            .unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(transport.client.attempts(), 2);
    }

    #[test]
    fn standard_headers_are_attached() {
        let transport = transport_over(vec![Ok(HttpResponse::new(200, b"{}".to_vec()))])
            .with_authorization("test-token");
        transport
            .execute(HttpRequest::get("http://localhost/ping"))
            .unwrap();

        let headers = transport.client.seen_headers.lock().clone();
        assert!(headers
            .iter()
            .any(|(n, v)| n == "accept" && v == "application/json"));
        assert!(headers
            .iter()
            .any(|(n, v)| n == "authorization" && v == "Bearer test-token"));
    }

    #[test]
    fn backoff_honors_retry_after() {
        let retry = fast_retry();
        let response = HttpResponse::new(429, Vec::new()).with_header("X-RateLimit-RetryAfter", "3");

        let delay = compute_backoff(&retry, 1, Some(&response));
        assert!(delay >= Duration::from_secs(3));
    }

    #[test]
    fn backoff_without_guidance_follows_schedule() {
        let retry = RetryConfig::new(5)
            .with_initial_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_secs(30));

        let response = HttpResponse::new(429, Vec::new());
        assert_eq!(
            compute_backoff(&retry, 1, Some(&response)),
            Duration::from_millis(100)
        );
        assert_eq!(compute_backoff(&retry, 2, None), Duration::from_millis(200));
    }

    #[test]
    fn backoff_stretches_under_rate_pressure() {
        let retry = RetryConfig::new(5)
            .with_initial_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_secs(30));

        let response = HttpResponse::new(429, Vec::new())
            .with_header("X-RateLimit-Remaining", "1")
            .with_header("X-RateLimit-Limit", "10");

        let delay = compute_backoff(&retry, 1, Some(&response));
        assert!(delay > Duration::from_millis(100));
        assert!(delay <= Duration::from_millis(200));
    }

    #[test]
    fn backoff_is_monotone_across_attempts() {
        let retry = RetryConfig::new(5)
            .with_initial_delay(Duration::from_millis(50))
            .with_max_delay(Duration::from_secs(30));
        let response = HttpResponse::new(429, Vec::new())
            .with_header("X-RateLimit-Remaining", "2")
            .with_header("X-RateLimit-Limit", "10");

        let mut previous = Duration::ZERO;
        for attempt in 1..5 {
            let delay = compute_backoff(&retry, attempt, Some(&response));
            assert!(delay >= previous);
            previous = delay;
        }
    }
}
