//! axum middleware that throttles requests per client and route.

use axum::body::Body;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{StatusCode, Version};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use hyper::ext::ReasonPhrase;
use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use crate::context::Context;
use crate::error::ThrottlerError;
use crate::hasher::KeySpec;
use crate::options::ThrottleOptions;
use crate::throttler::Throttle;

/// Fields of the request context used when no key is configured. Pass
/// `client_ip` to `use_key` to throttle per address instead.
pub const DEFAULT_HTTP_KEY: [&str; 3] = ["session", "method", "path"];

/// Session identity of a request, set as an extension by an upstream layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionId(pub String);

pub type DenyHandler = Arc<dyn Fn(&Request) -> Response + Send + Sync>;

/// How a throttled request is answered.
#[derive(Clone)]
pub enum DenyPolicy {
    /// Respond with `code` and a `"<code> <message>"` body.
    Status { code: StatusCode, message: String },
    /// Build the response yourself.
    Handler(DenyHandler),
}

impl Default for DenyPolicy {
    fn default() -> Self {
        DenyPolicy::status(StatusCode::TOO_MANY_REQUESTS)
    }
}

impl DenyPolicy {
    /// Status policy with the canonical reason phrase as message.
    pub fn status(code: StatusCode) -> Self {
        DenyPolicy::Status {
            code,
            message: code.canonical_reason().unwrap_or_default().to_string(),
        }
    }

    pub fn handler<F>(handler: F) -> Self
    where
        F: Fn(&Request) -> Response + Send + Sync + 'static,
    {
        DenyPolicy::Handler(Arc::new(handler))
    }

    fn respond(&self, request: &Request) -> Response {
        match self {
            DenyPolicy::Status { code, message } => {
                let mut response = (*code, format!("{} {}", code.as_u16(), message)).into_response();
                // HTTP/2 has no reason phrase
                if request.version() < Version::HTTP_2 {
                    if let Ok(reason) = ReasonPhrase::try_from(message.as_bytes().to_vec()) {
                        response.extensions_mut().insert(reason);
                    }
                }
                response
            }
            DenyPolicy::Handler(handler) => handler(request),
        }
    }
}

impl fmt::Debug for DenyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenyPolicy::Status { code, message } => f
                .debug_struct("Status")
                .field("code", code)
                .field("message", message)
                .finish(),
            DenyPolicy::Handler(_) => f.write_str("Handler"),
        }
    }
}

/// Builds per-route throttling middleware from one set of options.
#[derive(Debug, Clone)]
pub struct HttpThrottle {
    throttle: Throttle,
    deny: DenyPolicy,
}

impl HttpThrottle {
    pub fn new(mut options: ThrottleOptions, deny: DenyPolicy) -> Self {
        if options.use_key.is_none() {
            options.use_key = Some(KeySpec::from(DEFAULT_HTTP_KEY));
        }
        Self {
            throttle: Throttle::new(options),
            deny,
        }
    }

    pub fn throttle(&self) -> &Throttle {
        &self.throttle
    }

    /// Middleware state for one route. `None` uses the default duration.
    ///
    /// ```ignore
    /// let limited = http.route(Some(30));
    /// Router::new()
    ///     .route("/slow", get(handler))
    ///     .route_layer(axum::middleware::from_fn_with_state(limited, throttle_middleware));
    /// ```
    pub fn route(&self, duration: Option<u64>) -> RouteThrottle {
        RouteThrottle {
            throttle: self.throttle.clone(),
            deny: self.deny.clone(),
            duration: duration.unwrap_or_else(|| self.throttle.default_duration()),
        }
    }
}

/// State for [`throttle_middleware`].
#[derive(Debug, Clone)]
pub struct RouteThrottle {
    throttle: Throttle,
    deny: DenyPolicy,
    duration: u64,
}

impl RouteThrottle {
    pub fn duration(&self) -> u64 {
        self.duration
    }
}

/// Admit the request or answer with the deny policy. Storage failures are
/// returned as errors rather than treated as a decision.
pub async fn throttle_middleware(
    State(route): State<RouteThrottle>,
    request: Request,
    next: Next,
) -> Result<Response, ThrottlerError> {
    let context = request_context(&request);

    if route.throttle.throttle_for(&context, route.duration).await? {
        return Ok(next.run(request).await);
    }

    info!(
        target: "keyed_throttle::middleware",
        method = %request.method(),
        uri = %request.uri(),
        duration_secs = route.duration,
        "Request throttled"
    );
    Ok(route.deny.respond(&request))
}

/// Context a request is throttled on: `method`, `path` (with query),
/// `client_ip`, and `session` when a [`SessionId`] extension is present.
pub fn request_context(request: &Request<Body>) -> Context {
    let mut fields = BTreeMap::new();
    fields.insert(
        "method".to_string(),
        Context::from(request.method().as_str()),
    );
    let path = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| request.uri().path());
    fields.insert("path".to_string(), Context::from(path));
    fields.insert("client_ip".to_string(), Context::from(get_client_ip(request)));
    if let Some(SessionId(session)) = request.extensions().get::<SessionId>() {
        fields.insert("session".to_string(), Context::from(session.as_str()));
    }
    Context::Composite(fields)
}

fn get_client_ip(request: &Request) -> String {
    if let Some(forwarded) = request.headers().get("x-forwarded-for") {
        if let Ok(forwarded_str) = forwarded.to_str() {
            if let Some(first_ip) = forwarded_str.split(',').next() {
                return first_ip.trim().to_string();
            }
        }
    }

    if let Some(real_ip) = request.headers().get("x-real-ip") {
        if let Ok(ip_str) = real_ip.to_str() {
            return ip_str.to_string();
        }
    }

    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        addr.ip().to_string()
    } else {
        "unknown".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{self, HeaderValue};

    #[test]
    fn test_get_client_ip_with_forwarded_header() {
        let mut request = Request::new(Body::empty());
        request.headers_mut().insert(
            "x-forwarded-for",
            HeaderValue::from_static("192.168.1.1, 10.0.0.1"),
        );

        assert_eq!(get_client_ip(&request), "192.168.1.1");
    }

    #[test]
    fn test_get_client_ip_with_real_ip_header() {
        let mut request = Request::new(Body::empty());
        request
            .headers_mut()
            .insert("x-real-ip", HeaderValue::from_static("203.0.113.1"));

        assert_eq!(get_client_ip(&request), "203.0.113.1");
    }

    #[test]
    fn test_get_client_ip_from_connect_info() {
        let mut request = Request::new(Body::empty());
        let addr: SocketAddr = "10.1.2.3:4567".parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(addr));

        assert_eq!(get_client_ip(&request), "10.1.2.3");
    }

    #[test]
    fn test_get_client_ip_fallback() {
        let request = Request::new(Body::empty());
        assert_eq!(get_client_ip(&request), "unknown");
    }

    #[test]
    fn test_request_context_fields() {
        let mut request = http::Request::builder()
            .method("POST")
            .uri("/items?page=2")
            .body(Body::empty())
            .unwrap();
        request
            .extensions_mut()
            .insert(SessionId("sess-1".to_string()));

        let ctx = request_context(&request);
        assert_eq!(ctx.field("method").and_then(Context::render).as_deref(), Some("POST"));
        assert_eq!(ctx.field("path").and_then(Context::render).as_deref(), Some("/items?page=2"));
        assert_eq!(ctx.field("session").and_then(Context::render).as_deref(), Some("sess-1"));
        assert_eq!(ctx.field("client_ip").and_then(Context::render).as_deref(), Some("unknown"));
    }

    #[test]
    fn test_request_context_without_session() {
        let request = Request::new(Body::empty());
        assert!(request_context(&request).field("session").is_none());
    }

    #[test]
    fn test_default_deny_policy() {
        match DenyPolicy::default() {
            DenyPolicy::Status { code, message } => {
                assert_eq!(code, StatusCode::TOO_MANY_REQUESTS);
                assert_eq!(message, "Too Many Requests");
            }
            DenyPolicy::Handler(_) => panic!("expected status policy"),
        }
    }

    #[test]
    fn test_status_policy_sets_reason_for_http1_only() {
        let policy = DenyPolicy::default();

        let http1 = http::Request::builder()
            .version(Version::HTTP_11)
            .body(Body::empty())
            .unwrap();
        let response = policy.respond(&http1);
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let reason = response.extensions().get::<ReasonPhrase>().unwrap();
        assert_eq!(reason.as_bytes(), b"Too Many Requests");

        let http2 = http::Request::builder()
            .version(Version::HTTP_2)
            .body(Body::empty())
            .unwrap();
        let response = policy.respond(&http2);
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.extensions().get::<ReasonPhrase>().is_none());
    }

    #[tokio::test]
    async fn test_http_throttle_defaults_key_and_duration() {
        let http = HttpThrottle::new(ThrottleOptions::new().duration(7).gc_interval(0), DenyPolicy::default());
        assert_eq!(http.route(None).duration(), 7);
        assert_eq!(http.route(Some(1)).duration(), 1);

        let get = Context::composite([("method", "GET"), ("path", "/a"), ("client_ip", "1.1.1.1")]);
        let other_ip = Context::composite([("method", "GET"), ("path", "/a"), ("client_ip", "2.2.2.2")]);
        assert_eq!(http.throttle().identify(&get), http.throttle().identify(&other_ip));
    }

    #[tokio::test]
    async fn test_client_ip_selectable_as_key() {
        let http = HttpThrottle::new(
            ThrottleOptions::new().gc_interval(0).use_key("client_ip"),
            DenyPolicy::default(),
        );

        let mut first = Request::new(Body::empty());
        first
            .headers_mut()
            .insert("x-real-ip", HeaderValue::from_static("203.0.113.1"));
        let mut second = Request::new(Body::empty());
        second
            .headers_mut()
            .insert("x-real-ip", HeaderValue::from_static("203.0.113.2"));

        let throttle = http.throttle();
        assert_eq!(throttle.identify(&request_context(&first)), "203.0.113.1");
        assert!(throttle.throttle(&request_context(&first)).await.unwrap());
        assert!(throttle.throttle(&request_context(&second)).await.unwrap());
        assert!(!throttle.throttle(&request_context(&first)).await.unwrap());
    }
}
