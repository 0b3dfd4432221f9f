use crate::RedirectServerError;
use crate::metrics_defs::{REQUEST_DURATION, REQUESTS_INFLIGHT};
use http_body_util::combinators::BoxBody;
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderValue, InvalidHeaderValue, LOCATION, SERVER};
use hyper::service::Service;
use hyper::{Request, Response, StatusCode};
use percent_encoding::percent_decode_str;
use resolver::redirects::{RedirectError, Redirects};
use shared::http::make_text_response;
use shared::{gauge, histogram};
use std::future::Future;
use std::pin::Pin;
use std::time::Instant;

type RedirectResponse = Response<BoxBody<Bytes, RedirectServerError>>;

/// Redirects `/<key>` to the newest release asset of the project configured for `key`.
pub struct RedirectService {
    redirects: Redirects,
    server_name: HeaderValue,
}

impl RedirectService {
    pub fn new(redirects: Redirects, server_name: &str) -> Result<Self, InvalidHeaderValue> {
        Ok(Self {
            redirects,
            server_name: HeaderValue::from_str(server_name)?,
        })
    }
}

impl Service<Request<Incoming>> for RedirectService {
    type Response = RedirectResponse;
    type Error = RedirectServerError;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let redirects = self.redirects.clone();
        let server_name = self.server_name.clone();
        let key = file_key(req.uri().path());

        Box::pin(async move { Ok(handle(&redirects, key, server_name).await) })
    }
}

/// Decodes the request path into a file key. `None` if it is not valid UTF-8.
fn file_key(path: &str) -> Option<String> {
    let path = path.strip_prefix('/').unwrap_or(path);
    percent_decode_str(path)
        .decode_utf8()
        .ok()
        .map(|key| key.into_owned())
}

/// Counts a request in `requests.inflight` until it is dropped, whether it
/// completed or the client went away.
struct InflightGuard;

impl InflightGuard {
    fn new() -> Self {
        gauge!(REQUESTS_INFLIGHT).increment(1.0);
        InflightGuard
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        gauge!(REQUESTS_INFLIGHT).decrement(1.0);
    }
}

async fn handle(
    redirects: &Redirects,
    key: Option<String>,
    server_name: HeaderValue,
) -> RedirectResponse {
    let start = Instant::now();
    let _inflight = InflightGuard::new();

    let mut response = match key {
        Some(key) => respond(redirects, &key).await,
        None => not_found(),
    };
    response.headers_mut().insert(SERVER, server_name);

    histogram!(REQUEST_DURATION, "status" => response.status().as_u16().to_string())
        .record(start.elapsed().as_secs_f64());

    response
}

fn not_found() -> RedirectResponse {
    make_text_response(StatusCode::NOT_FOUND, "File not found\n")
}

async fn respond(redirects: &Redirects, key: &str) -> RedirectResponse {
    match redirects.resolve(key).await {
        Ok(url) => match HeaderValue::from_str(&url) {
            Ok(location) => {
                let mut response = make_text_response(StatusCode::FOUND, "");
                response.headers_mut().insert(LOCATION, location);
                response
            }
            Err(_) => {
                tracing::error!(key, %url, "Resolved download URL is not a valid header value");
                make_text_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Invalid download URL\n",
                )
            }
        },
        Err(RedirectError::UnknownKey(_)) => not_found(),
        Err(RedirectError::Resolve(e)) => {
            tracing::error!(key, kind = e.kind(), error = %e, "Failed to resolve download URL");
            make_text_response(StatusCode::INTERNAL_SERVER_ERROR, format!("{e}\n"))
        }
    }
}
