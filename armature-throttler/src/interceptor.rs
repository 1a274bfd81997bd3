//! Throttling interceptor for Armature routes
//!
//! The interceptor runs the decision stage before the handler and the
//! settlement stage after it. Rejections short-circuit with a 429 response;
//! the handler never runs.

use crate::error::{ThrottleError, ThrottleResult};
use crate::extractor::RequestInfo;
use crate::route::RouteId;
use crate::{Decision, Throttler};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{trace, warn};

/// Handler continuation passed to the interceptor
pub type Next<E> = BoxFuture<'static, Result<HttpResponse, E>>;

/// Minimal HTTP response as seen by interceptors
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code
    pub status: u16,
    /// Response headers
    pub headers: HashMap<String, String>,
    /// Response body
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Create an empty response with a status code
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    /// 200 OK
    pub fn ok() -> Self {
        Self::new(200)
    }

    /// Add a header
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Set the body
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Get a header value by name (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Execution context passed to the interceptor
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Identity of the matched route
    pub route: RouteId,
    /// Caller metadata
    pub request: RequestInfo,
}

impl ExecutionContext {
    /// Create a new execution context
    pub fn new(route: RouteId, request: RequestInfo) -> Self {
        Self { route, request }
    }
}

/// Errors surfaced by [`ThrottlerInterceptor::intercept`]
#[derive(Debug, Error)]
pub enum InterceptError<E> {
    /// The throttler could not reach a decision (store failure)
    #[error(transparent)]
    Throttle(#[from] ThrottleError),

    /// The handler itself failed; the request is not counted
    #[error("{0}")]
    Handler(E),
}

/// Interceptor applying a [`Throttler`] to routes
#[derive(Debug, Clone)]
pub struct ThrottlerInterceptor {
    throttler: Arc<Throttler>,
}

impl ThrottlerInterceptor {
    /// Create a new interceptor
    pub fn new(throttler: Arc<Throttler>) -> Self {
        Self { throttler }
    }

    /// Get the underlying throttler
    pub fn throttler(&self) -> &Arc<Throttler> {
        &self.throttler
    }

    /// Decision stage only
    ///
    /// Returns the decision, or the 429 response to send if the caller is
    /// over the limit.
    pub async fn check(
        &self,
        context: &ExecutionContext,
    ) -> ThrottleResult<Result<Decision, HttpResponse>> {
        match self.throttler.decide(&context.route, &context.request).await {
            Ok(decision) => Ok(Ok(decision)),
            Err(e) if e.is_limit_exceeded() => Ok(Err(e.into_response())),
            Err(e) => {
                warn!(route = %context.route, error = %e, "Throttle check failed");
                Err(e)
            }
        }
    }

    /// Run `next` under throttling
    ///
    /// Successful responses get the rate limit headers. In success-only mode
    /// the settlement is spawned after the response is produced and is not
    /// awaited.
    pub async fn intercept<E>(
        &self,
        context: ExecutionContext,
        next: Next<E>,
    ) -> Result<HttpResponse, InterceptError<E>> {
        let decision = match self.check(&context).await? {
            Ok(decision) => decision,
            Err(limited) => return Ok(limited),
        };

        let result = next.await;

        let (headers, binding) = match decision {
            Decision::Bypassed => (None, None),
            Decision::Allowed { headers, binding } => (headers, Some(binding)),
        };

        match result {
            Ok(mut response) => {
                if let Some(h) = headers {
                    h.apply(&mut response);
                }

                if let Some(binding) = binding.filter(|b| !b.policy.count_all_requests) {
                    self.throttler.spawn_settlement(binding, response.status);
                }

                Ok(response)
            }
            Err(e) => {
                trace!(route = %context.route, "Handler failed, request not counted");
                Err(InterceptError::Handler(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::PolicyOverride;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::atomic::{AtomicBool, Ordering};

    async fn interceptor(limit: u64, count_all: bool) -> ThrottlerInterceptor {
        let throttler = Throttler::builder()
            .window_seconds(10)
            .limit(limit)
            .count_all_requests(count_all)
            .skip_route(RouteId::new("HealthController", "check"))
            .build()
            .await
            .unwrap();
        ThrottlerInterceptor::new(Arc::new(throttler))
    }

    fn context(handler: &str) -> ExecutionContext {
        ExecutionContext::new(
            RouteId::new("UsersController", handler),
            RequestInfo::new().with_ip(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))),
        )
    }

    fn respond(status: u16) -> Next<String> {
        Box::pin(async move { Ok::<_, String>(HttpResponse::new(status)) })
    }

    /// Let detached settlement tasks run
    async fn drain_settlements() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_allowed_response_headers() {
        let interceptor = interceptor(2, true).await;

        let response = interceptor.intercept(context("list"), respond(200)).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.header("x-ratelimit-limit"), Some("2"));
        assert_eq!(response.header("x-ratelimit-remaining"), Some("1"));
        assert_eq!(response.header("x-ratelimit-reset"), Some("10"));
        assert_eq!(response.header("retry-after"), None);
    }

    #[tokio::test]
    async fn test_limited_short_circuits() {
        let interceptor = interceptor(1, true).await;

        interceptor.intercept(context("list"), respond(200)).await.unwrap();

        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        let next: Next<String> = Box::pin(async move {
            flag.store(true, Ordering::SeqCst);
            Ok::<_, String>(HttpResponse::ok())
        });
        let response = interceptor.intercept(context("list"), next).await.unwrap();

        assert!(!ran.load(Ordering::SeqCst), "handler must not run");
        assert_eq!(response.status, 429);
        assert_eq!(response.header("retry-after"), Some("10"));
        assert_eq!(response.header("x-ratelimit-remaining"), None);

        let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(body["message"], "Too Many Requests");
    }

    #[tokio::test]
    async fn test_success_only_counts_after_response() {
        let interceptor = interceptor(2, false).await;

        for _ in 0..2 {
            let response = interceptor.intercept(context("list"), respond(200)).await.unwrap();
            assert_eq!(response.status, 200);
            drain_settlements().await;
        }

        let response = interceptor.intercept(context("list"), respond(200)).await.unwrap();
        assert_eq!(response.status, 429);
    }

    #[tokio::test]
    async fn test_error_statuses_never_count() {
        let interceptor = interceptor(1, false).await;

        for _ in 0..5 {
            let response = interceptor.intercept(context("list"), respond(500)).await.unwrap();
            assert_eq!(response.status, 500);
            drain_settlements().await;
        }

        let response = interceptor.intercept(context("list"), respond(200)).await.unwrap();
        assert_eq!(response.status, 200);
    }

    #[tokio::test]
    async fn test_handler_error_is_passed_through() {
        let interceptor = interceptor(1, false).await;

        let failing: Next<String> =
            Box::pin(async { Err::<HttpResponse, _>("database down".to_string()) });
        let err = interceptor.intercept(context("list"), failing).await.unwrap_err();
        assert!(matches!(err, InterceptError::Handler(ref m) if m == "database down"));
        drain_settlements().await;

        let response = interceptor.intercept(context("list"), respond(200)).await.unwrap();
        assert_eq!(response.status, 200);
    }

    #[tokio::test]
    async fn test_bypassed_route_has_no_headers() {
        let interceptor = interceptor(1, true).await;
        let health = ExecutionContext::new(
            RouteId::new("HealthController", "check"),
            RequestInfo::new(),
        );

        for _ in 0..3 {
            let response = interceptor.intercept(health.clone(), respond(200)).await.unwrap();
            assert_eq!(response.status, 200);
            assert!(response.headers.is_empty());
        }
    }

    #[tokio::test]
    async fn test_route_policy_applies_per_handler() {
        let throttler = Throttler::builder()
            .limit(100)
            .route(
                RouteId::new("UsersController", "create"),
                PolicyOverride::new().limit(1).count_all_requests(true),
            )
            .build()
            .await
            .unwrap();
        let interceptor = ThrottlerInterceptor::new(Arc::new(throttler));

        interceptor.intercept(context("create"), respond(201)).await.unwrap();
        let limited = interceptor.intercept(context("create"), respond(201)).await.unwrap();
        assert_eq!(limited.status, 429);

        let other = interceptor.intercept(context("list"), respond(200)).await.unwrap();
        assert_eq!(other.header("x-ratelimit-limit"), Some("100"));
    }
}
