//! Plain HTTP forwarding for absolute-form requests.

use std::convert::Infallible;
use std::sync::{Arc, Mutex, PoisonError};

use audit_log::{AuditEntry, AuditEventType, AuditSink, AuditSource};
use bytes::Bytes;
use host_policy::{HostPolicy, Verdict};
use http::{HeaderMap, Method, Request, Response, StatusCode, Uri};
use http_body_util::{combinators::BoxBody, BodyExt, Empty, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioIo};
use relay_engine::MeteredStream;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::context::{ConnectionContext, Outcome};

type ProxyBody = BoxBody<Bytes, hyper::Error>;

/// Headers that describe one hop and are never passed on.
const HOP_BY_HOP: [&str; 7] = [
    "connection",
    "proxy-connection",
    "keep-alive",
    "proxy-authorization",
    "te",
    "trailer",
    "upgrade",
];

/// Re-issues client requests against their origin.
///
/// Cheap to clone; clones share the blocklist and the connection pool.
#[derive(Clone)]
pub struct Forwarder {
    client: Client<HttpConnector, Incoming>,
    policy: Arc<HostPolicy>,
}

impl Forwarder {
    pub fn new(policy: Arc<HostPolicy>) -> Self {
        let client = Client::builder(TokioExecutor::new()).build_http();
        Self { client, policy }
    }
}

struct RequestScope {
    forwarder: Forwarder,
    source: AuditSource,
    audit: AuditSink,
    /// Outcome of the connection so far; `None` until a request is answered.
    outcome: Mutex<Option<Outcome>>,
}

impl RequestScope {
    /// Record how one request ended. Once a request has been forwarded the
    /// connection stays `Forwarded`.
    fn record(&self, outcome: Outcome) {
        let mut current = self.outcome.lock().unwrap_or_else(PoisonError::into_inner);
        if *current != Some(Outcome::Forwarded) {
            *current = Some(outcome);
        }
    }

    fn outcome(&self) -> Outcome {
        self.outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .unwrap_or(Outcome::Rejected)
    }
}

/// Serve HTTP/1.1 on `client` until it closes, forwarding every request.
///
/// `client` must replay the request head that was already read off the
/// socket. Byte totals cover everything exchanged with the client across all
/// requests on the connection. The connection ends as `Forwarded` if any
/// request reached its origin, otherwise as the last failed request did.
pub async fn serve<S>(client: S, forwarder: Forwarder, ctx: &mut ConnectionContext)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let client = MeteredStream::new(client);
    let meter = client.meter();
    let scope = Arc::new(RequestScope {
        forwarder,
        source: ctx.source(),
        audit: ctx.audit().clone(),
        outcome: Mutex::new(None),
    });
    let service_scope = Arc::clone(&scope);
    let service = service_fn(move |req| forward(req, Arc::clone(&service_scope)));

    if let Err(err) = http1::Builder::new()
        .preserve_header_case(true)
        .title_case_headers(true)
        .serve_connection(TokioIo::new(client), service)
        .await
    {
        tracing::debug!(connection_id = %ctx.id, %err, "forward connection ended with error");
    }

    ctx.completed(scope.outcome(), meter.bytes_read(), meter.bytes_written())
        .await;
}

async fn forward(
    mut req: Request<Incoming>,
    scope: Arc<RequestScope>,
) -> Result<Response<ProxyBody>, Infallible> {
    let connection_id = scope.source.connection_id.as_deref().unwrap_or("-");
    let method = req.method().clone();
    let uri = req.uri().to_string();

    let Some(authority) = policy_candidate(req.uri()) else {
        tracing::info!(connection_id, %method, %uri, "request target is not absolute");
        scope.record(Outcome::Rejected);
        return Ok(text_response(
            StatusCode::BAD_REQUEST,
            "proxy requests must use an absolute URI\n",
        ));
    };
    if method == Method::CONNECT {
        tracing::info!(connection_id, %uri, "CONNECT after a forwarded request");
        scope.record(Outcome::Rejected);
        return Ok(text_response(
            StatusCode::METHOD_NOT_ALLOWED,
            "CONNECT must be the first request on a connection\n",
        ));
    }

    let mut source = scope.source.clone();
    source.target = Some(authority.clone());

    if let Verdict::Block { entry } = scope.forwarder.policy.check(&authority) {
        tracing::warn!(connection_id, destination = %authority, %entry, "blocked host");
        scope
            .audit
            .log(AuditEntry::new(
                AuditEventType::HostBlocked,
                source,
                serde_json::json!({ "entry": &entry, "method": method.as_str(), "uri": uri }),
            ))
            .await;
        scope.record(Outcome::Blocked { entry });
        let mut resp = Response::new(empty());
        *resp.status_mut() = StatusCode::IM_A_TEAPOT;
        return Ok(resp);
    }

    strip_hop_by_hop(req.headers_mut());

    match scope.forwarder.client.request(req).await {
        Ok(resp) => {
            let status = resp.status();
            tracing::info!(connection_id, %method, %uri, status = status.as_u16(), "request forwarded");
            scope
                .audit
                .log(AuditEntry::new(
                    AuditEventType::RequestForwarded,
                    source,
                    serde_json::json!({
                        "method": method.as_str(),
                        "uri": uri,
                        "status": status.as_u16(),
                    }),
                ))
                .await;
            scope.record(Outcome::Forwarded);

            let (mut parts, body) = resp.into_parts();
            strip_hop_by_hop(&mut parts.headers);
            Ok(Response::from_parts(parts, body.boxed()))
        }
        Err(err) => {
            let message = error_chain(&err);
            tracing::warn!(connection_id, %method, %uri, error = %message, "origin request failed");
            scope
                .audit
                .log(AuditEntry::new(
                    AuditEventType::DialFailed,
                    source,
                    serde_json::json!({ "method": method.as_str(), "uri": uri, "error": message }),
                ))
                .await;
            scope.record(Outcome::DialFailed);
            Ok(text_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("{message}\n"),
            ))
        }
    }
}

/// The blocklist candidate for an absolute-form URI: host, plus `:port` when
/// the URI names one. Userinfo never takes part in matching.
fn policy_candidate(uri: &Uri) -> Option<String> {
    let authority = uri.authority()?;
    let host = authority.host();
    Some(match authority.port_u16() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

/// Remove hop-by-hop headers, including any named by `Connection`.
fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<String> = headers
        .get_all(http::header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|token| token.trim().to_ascii_lowercase())
        .filter(|token| !token.is_empty())
        .collect();

    for name in HOP_BY_HOP {
        headers.remove(name);
    }
    for name in &listed {
        headers.remove(name.as_str());
    }
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

fn text_response(status: StatusCode, body: impl Into<Bytes>) -> Response<ProxyBody> {
    let mut resp = Response::new(full(body));
    *resp.status_mut() = status;
    resp
}

fn empty() -> ProxyBody {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed()
}

fn full<T: Into<Bytes>>(chunk: T) -> ProxyBody {
    Full::new(chunk.into())
        .map_err(|never| match never {})
        .boxed()
}
