use std::convert::Infallible;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderName, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use opentelemetry::trace::TraceContextExt;
use prometheus::IntGauge;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::pin;
use tracing::{debug, error, info, instrument, Span};
use tracing_opentelemetry::OpenTelemetrySpanExt;

use crate::command::server::error::Error;
use crate::command::server::ServerContext;
use crate::identity::{Identity, PeerCertificates};
use crate::metrics_provider::{IN_FLIGHT_REQUESTS, METRICS_PROVIDER};

pub const REMOTE_USER_HEADER: HeaderName = HeaderName::from_static("x-remote-user");
pub const REMOTE_GROUP_HEADER: HeaderName = HeaderName::from_static("x-remote-group");

pub async fn serve_request<S>(
    stream: TokioIo<S>,
    context: Arc<ServerContext>,
    peer_certificates: Option<PeerCertificates>,
    timeouts: Arc<[Duration; 2]>,
    remote_address: std::net::SocketAddr,
) where
    S: Unpin + AsyncWrite + AsyncRead + Send + Debug + 'static,
{
    let conn = http1::Builder::new().serve_connection(
        stream,
        service_fn(move |mut request| {
            if let Some(ref peer_certificates) = peer_certificates {
                request.extensions_mut().insert(peer_certificates.clone());
            }
            request.extensions_mut().insert(remote_address);
            handle_request(Arc::clone(&context), request)
        }),
    );
    pin!(conn);

    for (iter, sleep_duration) in timeouts.iter().enumerate() {
        debug!("iter = {iter} sleep_duration = {sleep_duration:?}");
        tokio::select! {
            res = conn.as_mut() => {
                match res {
                    Ok(()) => debug!("after polling conn, no error"),
                    Err(error) =>  debug!("error serving connection: {error}"),
                }
                break;
            }
            () = tokio::time::sleep(*sleep_duration) => {
                debug!("iter = {iter} got timeout_interval, calling conn.graceful_shutdown");
                conn.as_mut().graceful_shutdown();
            }
        }
    }
}

/// Counts one request as in flight until dropped, including when the connection goes away first.
struct InFlightRequest<'a> {
    counter: &'a AtomicU64,
    gauge: &'a IntGauge,
}

impl<'a> InFlightRequest<'a> {
    fn enter(counter: &'a AtomicU64, gauge: &'a IntGauge) -> Self {
        let in_flight = counter.fetch_add(1, Ordering::Relaxed) + 1;
        gauge.set(i64::try_from(in_flight).unwrap_or(i64::MAX));
        Self { counter, gauge }
    }
}

impl Drop for InFlightRequest<'_> {
    fn drop(&mut self) {
        let in_flight = self.counter.fetch_sub(1, Ordering::Relaxed) - 1;
        self.gauge.set(i64::try_from(in_flight).unwrap_or(i64::MAX));
    }
}

#[instrument(skip(context, request))]
async fn handle_request<B>(
    context: Arc<ServerContext>,
    request: Request<B>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let _in_flight = InFlightRequest::enter(
        &IN_FLIGHT_REQUESTS,
        &METRICS_PROVIDER.metric_http_request_in_flight,
    );
    let start_time = Instant::now();
    let method = request.method().to_owned();
    let path = request.uri().path().to_owned();

    let trace_id = {
        let context = Span::current().context();
        let span = context.span();
        let span_context = span.span_context();
        if span_context.is_valid() {
            Some(span_context.trace_id().to_string())
        } else {
            None
        }
    };

    let response = match router(&context, request).await {
        Ok(response) => response,
        Err(error) => error_to_response(&error, trace_id.as_ref()),
    };

    #[allow(clippy::cast_precision_loss)]
    let elapsed = start_time.elapsed().as_millis() as f64;
    let status = response.status();

    METRICS_PROVIDER.metric_http_request_total.inc();
    METRICS_PROVIDER
        .metric_http_request_duration
        .observe(elapsed);

    let log = if let Some(trace_id) = trace_id {
        format!("{trace_id} {elapsed:?} - {status} {method} {path}")
    } else {
        format!("{elapsed:?} - {status} {method} {path}")
    };

    if status.is_server_error() {
        error!("{log}");
    } else {
        info!("{log}");
    }

    Ok(response)
}

/// `GET /metrics` exposes the registry, every other request is a forward-auth check.
async fn router<B>(context: &ServerContext, request: Request<B>) -> Result<Response<Full<Bytes>>, Error> {
    if request.method() == Method::GET && request.uri().path() == "/metrics" {
        return handle_metrics();
    }

    let (parts, _) = request.into_parts();
    let request_context = context.request_context();
    let identity = context.resolver.resolve(&request_context, &parts).await?;

    identity_to_response(&identity)
}

fn identity_to_response(identity: &Identity) -> Result<Response<Full<Bytes>>, Error> {
    let body = serde_json::to_vec(identity)
        .map_err(|e| Error::Internal(format!("Failed to serialize identity: {e}")))?;

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, "application/json")
        .header(REMOTE_USER_HEADER, identity.username());
    for group in identity.groups() {
        builder = builder.header(REMOTE_GROUP_HEADER, group.as_str());
    }

    Ok(builder.body(Full::new(Bytes::from(body)))?)
}

fn handle_metrics() -> Result<Response<Full<Bytes>>, Error> {
    let (content_type, metrics) = METRICS_PROVIDER.gather()?;
    let response = Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, content_type)
        .body(Full::new(Bytes::from(metrics)));

    match response {
        Ok(resp) => Ok(resp),
        Err(e) => {
            let msg = format!("Failed to build metrics response: {e}");
            Err(Error::Internal(msg))
        }
    }
}

pub fn error_to_response(error: &Error, request_id: Option<&String>) -> Response<Full<Bytes>> {
    let body = Bytes::from(error.as_json(request_id).to_string());

    let mut response = Response::new(Full::new(body));
    *response.status_mut() = error.status_code();
    response.headers_mut().insert(
        CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json"),
    );
    response
}
