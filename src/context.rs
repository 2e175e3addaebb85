//! Per-request HTTP context.
//!
//! One context lives for the duration of a single HTTP exchange. It wraps the
//! inbound hyper request, accumulates the outbound response, and carries the
//! request's span plus any tags added along the routing path. `finish` runs
//! the registered completion callbacks exactly once and yields the stat
//! record the collectors consume.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use hyper::header::{HeaderName, HeaderValue, HOST, LOCATION};
use hyper::{Body, HeaderMap, Request, Response, StatusCode};
use tracing::debug;
use uuid::Uuid;

use crate::stats::StatRecord;
use crate::trace::Span;

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const X_REAL_IP: &str = "x-real-ip";

pub struct HttpContext {
    id: Uuid,
    request: Request<Body>,
    // The routable path; starts as the request URI's path and is replaced by
    // rewrite targets before the backend call.
    path: String,
    real_ip: String,

    status: StatusCode,
    response_headers: HeaderMap,
    body: Option<Body>,

    tags: Vec<String>,
    span: Span,
    on_finish: Vec<Box<dyn FnOnce() + Send>>,
    started_at: Instant,
    duration: Option<Duration>,
}

impl HttpContext {
    pub fn new(request: Request<Body>, remote_addr: SocketAddr, span: Span) -> Self {
        let path = request.uri().path().to_string();
        let real_ip = derive_real_ip(&request, remote_addr);

        HttpContext {
            id: Uuid::new_v4(),
            request,
            path,
            real_ip,
            status: StatusCode::OK,
            response_headers: HeaderMap::new(),
            body: None,
            tags: Vec::new(),
            span,
            on_finish: Vec::new(),
            started_at: Instant::now(),
            duration: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The request host, port included when the client sent one.
    pub fn host(&self) -> &str {
        if let Some(host) = self.request.headers().get(HOST).and_then(|v| v.to_str().ok()) {
            return host;
        }
        self.request
            .uri()
            .authority()
            .map(|a| a.as_str())
            .unwrap_or("")
    }

    pub fn method(&self) -> &str {
        self.request.method().as_str()
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn set_path(&mut self, path: String) {
        self.path = path;
    }

    pub fn query(&self) -> &str {
        self.request.uri().query().unwrap_or("")
    }

    pub fn uri(&self) -> &hyper::Uri {
        self.request.uri()
    }

    /// First value of the named request header, or the empty string.
    pub fn header(&self, key: &str) -> &str {
        self.request
            .headers()
            .get(key)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
    }

    pub fn request_headers_mut(&mut self) -> &mut HeaderMap {
        self.request.headers_mut()
    }

    /// The client IP as derived at context construction.
    pub fn real_ip(&self) -> &str {
        &self.real_ip
    }

    pub fn status_code(&self) -> StatusCode {
        self.status
    }

    pub fn set_status_code(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub fn response_headers(&self) -> &HeaderMap {
        &self.response_headers
    }

    pub fn response_headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.response_headers
    }

    pub fn set_location(&mut self, location: &str) {
        match HeaderValue::from_str(location) {
            Ok(value) => {
                self.response_headers.insert(LOCATION, value);
            }
            Err(_) => {
                debug!(request = %self.id, location, "dropping unencodable location header");
            }
        }
    }

    pub fn set_body(&mut self, body: Body) {
        self.body = Some(body);
    }

    pub fn add_tag(&mut self, tag: String) {
        self.tags.push(tag);
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Register a callback to run when the exchange completes. Callbacks run
    /// at most once, in registration order.
    pub fn on_finish(&mut self, f: Box<dyn FnOnce() + Send>) {
        self.on_finish.push(f);
    }

    /// Finalize the exchange: run completion callbacks, finish the span, and
    /// produce the stat record. Safe to call more than once; later calls
    /// return the same totals without re-running callbacks.
    pub fn finish(&mut self) -> StatRecord {
        let duration = match self.duration {
            Some(duration) => duration,
            None => {
                for f in self.on_finish.drain(..) {
                    f();
                }
                self.span.finish();
                let duration = self.started_at.elapsed();
                self.duration = Some(duration);
                duration
            }
        };

        StatRecord {
            host: self.host().to_string(),
            method: self.method().to_string(),
            path: self.path.clone(),
            status: self.status,
            duration,
        }
    }

    /// Consume the context into the hyper response.
    pub fn into_response(self) -> Response<Body> {
        let mut response = Response::new(self.body.unwrap_or_else(Body::empty));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.response_headers;
        response
    }
}

/// Derive the client IP: first `X-Forwarded-For` hop, then `X-Real-Ip`, then
/// the peer address.
fn derive_real_ip(request: &Request<Body>, remote_addr: SocketAddr) -> String {
    if let Some(forwarded) = request
        .headers()
        .get(X_FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }

    if let Some(real_ip) = request
        .headers()
        .get(X_REAL_IP)
        .and_then(|v| v.to_str().ok())
    {
        let real_ip = real_ip.trim();
        if !real_ip.is_empty() {
            return real_ip.to_string();
        }
    }

    remote_addr.ip().to_string()
}

/// Append the real IP to the request's `X-Forwarded-For` header.
///
/// Appending is idempotent: an IP already present in the value is left alone.
pub fn append_x_forwarded_for(ctx: &mut HttpContext) {
    let ip = ctx.real_ip().to_string();
    let current = ctx.header(X_FORWARDED_FOR).to_string();

    let name = HeaderName::from_static(X_FORWARDED_FOR);
    if current.is_empty() {
        if let Ok(value) = HeaderValue::from_str(&ip) {
            ctx.request_headers_mut().insert(name, value);
        }
        return;
    }

    if !current.contains(&ip) {
        if let Ok(value) = HeaderValue::from_str(&format!("{},{}", current, ip)) {
            ctx.request_headers_mut().insert(name, value);
        }
    }
}
