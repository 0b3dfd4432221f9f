use crate::types::{ProjectId, ResolveError};
use crate::upstream::{MAX_BODY_BYTES, UpstreamResolver};
use async_trait::async_trait;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::{Body, Bytes, Frame, Incoming};
use hyper::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;

/// Scripted upstream that counts how often each project is fetched.
#[derive(Default)]
pub struct FakeUpstream {
    responses: Mutex<HashMap<ProjectId, Result<String, ResolveError>>>,
    calls: Mutex<HashMap<ProjectId, usize>>,
    gates: Mutex<HashMap<ProjectId, Arc<Semaphore>>>,
    delay: Duration,
}

impl FakeUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every fetch sleeps for `delay` before answering.
    pub fn with_delay(delay: Duration) -> Self {
        FakeUpstream {
            delay,
            ..Default::default()
        }
    }

    pub fn set(&self, project: &ProjectId, response: Result<String, ResolveError>) {
        self.responses.lock().insert(project.clone(), response);
    }

    /// Fetches for `project` hang until `release` is called.
    pub fn block(&self, project: &ProjectId) {
        self.gates
            .lock()
            .insert(project.clone(), Arc::new(Semaphore::new(0)));
    }

    pub fn release(&self, project: &ProjectId) {
        if let Some(gate) = self.gates.lock().get(project) {
            gate.add_permits(1);
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().values().sum()
    }

    pub fn calls_for(&self, project: &ProjectId) -> usize {
        self.calls.lock().get(project).copied().unwrap_or(0)
    }
}

#[async_trait]
impl UpstreamResolver for FakeUpstream {
    async fn fetch_latest_asset_url(&self, project: &ProjectId) -> Result<String, ResolveError> {
        *self.calls.lock().entry(project.clone()).or_default() += 1;

        let gate = self.gates.lock().get(project).cloned();
        if let Some(gate) = gate {
            let _permit = gate.acquire().await.unwrap();
        }

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.responses
            .lock()
            .get(project)
            .cloned()
            .unwrap_or_else(|| Err(ResolveError::UpstreamUnavailable("unknown project".into())))
    }
}

type TestBody = BoxBody<Bytes, Infallible>;

/// Body of `remaining` spaces sent in chunks without a Content-Length.
struct ChunkedBody {
    remaining: usize,
}

impl Body for ChunkedBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, Infallible>>> {
        if self.remaining == 0 {
            return Poll::Ready(None);
        }
        let len = self.remaining.min(64 * 1024);
        self.remaining -= len;
        Poll::Ready(Some(Ok(Frame::data(Bytes::from(vec![b' '; len])))))
    }
}

fn json_response(status: StatusCode, body: impl Into<Bytes>) -> Response<TestBody> {
    let mut response = Response::new(Full::new(body.into()).boxed());
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, "application/json".parse().unwrap());
    response
}

async fn release_handler(req: Request<Incoming>) -> Result<Response<TestBody>, Infallible> {
    let headers_ok = req
        .headers()
        .get(ACCEPT)
        .is_some_and(|v| v == "application/vnd.github.v3+json")
        && req
            .headers()
            .get(USER_AGENT)
            .is_some_and(|v| v == "GitHub-Redirector/0.1");

    if !headers_ok {
        return Ok(json_response(
            StatusCode::BAD_REQUEST,
            r#"{"message": "Missing headers"}"#,
        ));
    }

    let response = match req.uri().path() {
        "/repos/acme/tool/releases/latest" => json_response(
            StatusCode::OK,
            r#"{"tag_name": "v2.0", "assets": [
                {"name": "tool-v2.0.bin", "browser_download_url": "https://cdn.example/tool-v2.0.bin"},
                {"name": "tool-v2.0.sha256", "browser_download_url": "https://cdn.example/tool-v2.0.sha256"}
            ]}"#,
        ),
        "/repos/acme/empty/releases/latest" => {
            json_response(StatusCode::OK, r#"{"tag_name": "v0.1", "assets": []}"#)
        }
        "/repos/acme/garbage/releases/latest" => json_response(StatusCode::OK, "not json"),
        "/repos/acme/huge/releases/latest" => {
            json_response(StatusCode::OK, vec![b' '; MAX_BODY_BYTES + 1])
        }
        "/repos/acme/endless/releases/latest" => Response::new(
            ChunkedBody {
                remaining: MAX_BODY_BYTES + 64 * 1024,
            }
            .boxed(),
        ),
        _ => json_response(StatusCode::NOT_FOUND, r#"{"message": "Not Found"}"#),
    };

    Ok(response)
}

/// Starts a stand-in for the releases API on an ephemeral port.
pub async fn start_release_server() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind to address");

    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            let io = TokioIo::new(stream);

            tokio::spawn(async move {
                if let Err(err) = hyper_util::server::conn::auto::Builder::new(TokioExecutor::new())
                    .serve_connection(io, service_fn(release_handler))
                    .await
                {
                    eprintln!("Error serving connection: {:?}", err);
                }
            });
        }
    });

    port
}
