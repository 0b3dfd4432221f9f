pub mod config;
pub mod metrics_defs;
mod service;

pub use service::RedirectService;

use hyper::header::InvalidHeaderValue;
use resolver::redirects::Redirects;
use shared::admin_service::AdminService;
use shared::http::run_http_service;
use std::io;

#[derive(thiserror::Error, Debug)]
pub enum RedirectServerError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid server name: {0}")]
    InvalidServerName(#[from] InvalidHeaderValue),
}

/// Serves redirects and the admin endpoints until either listener fails.
pub async fn run(
    config: &config::Config,
    redirects: Redirects,
    server_name: &str,
) -> Result<(), RedirectServerError> {
    let redirect_service = RedirectService::new(redirects, server_name)?;
    let admin_service = AdminService::<_, RedirectServerError>::new(|| true);

    tracing::info!(
        listener = %config.listener,
        admin_listener = %config.admin_listener,
        "Starting redirect service"
    );

    let redirect_task = run_http_service(&config.listener, redirect_service);
    let admin_task = run_http_service(&config.admin_listener, admin_service);

    tokio::try_join!(redirect_task, admin_task)?;
    Ok(())
}
