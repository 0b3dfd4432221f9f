use crate::config::Listener;
use http::StatusCode;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::service::Service;
use hyper::{Request, Response};
use hyper_util::rt::TokioExecutor;
use hyper_util::rt::TokioIo;
use hyper_util::server::conn::auto::Builder;
use std::fs::{self, Permissions};
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;
use tokio::net::{TcpListener, UnixListener};

pub async fn run_http_service<S, E>(listener: &Listener, service: S) -> Result<(), E>
where
    S: Service<Request<Incoming>, Response = Response<BoxBody<Bytes, E>>, Error = E>
        + Send
        + Sync
        + 'static,
    S::Future: Send + 'static,
    E: From<std::io::Error> + std::error::Error + Send + Sync + 'static,
{
    let service_arc = Arc::new(service);

    match listener {
        Listener::Tcp { host, port } => {
            let listener = TcpListener::bind(format!("{host}:{port}")).await?;
            tracing::info!("Listening on {host}:{port}");

            loop {
                let (stream, _peer_addr) = listener.accept().await?;
                let _ = stream.set_nodelay(true);
                let io = TokioIo::new(stream);
                let svc = service_arc.clone();

                // Hand the connection to hyper; auto-detect h1/h2 on this socket
                tokio::spawn(async move {
                    let _ = Builder::new(TokioExecutor::new())
                        .serve_connection(io, svc)
                        .await;
                });
            }
        }
        Listener::Unix { path } => {
            let listener = bind_unix(path)?;
            tracing::info!("Listening on unix:{}", path.display());

            loop {
                let (stream, _peer_addr) = listener.accept().await?;
                let io = TokioIo::new(stream);
                let svc = service_arc.clone();

                tokio::spawn(async move {
                    let _ = Builder::new(TokioExecutor::new())
                        .serve_connection(io, svc)
                        .await;
                });
            }
        }
    }
}

// A socket file left behind by a previous process would make bind fail.
fn bind_unix(path: &Path) -> io::Result<UnixListener> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e),
        _ => {}
    }

    let listener = UnixListener::bind(path)?;
    fs::set_permissions(path, Permissions::from_mode(0o777))?;
    Ok(listener)
}

/// Builds a response with the given status whose body is the status' canonical reason.
pub fn make_boxed_error_response<E: 'static>(
    status_code: StatusCode,
) -> Response<BoxBody<Bytes, E>> {
    let message = status_code
        .canonical_reason()
        .unwrap_or("an error occurred");

    make_text_response(status_code, format!("{message}\n"))
}

pub fn make_text_response<E, T>(status_code: StatusCode, text: T) -> Response<BoxBody<Bytes, E>>
where
    E: 'static,
    T: Into<Bytes>,
{
    let mut response = Response::new(Full::new(text.into()).map_err(|e| match e {}).boxed());
    *response.status_mut() = status_code;
    response
}
