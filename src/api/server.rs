use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::balance::BalanceService;
use crate::plans::PlanCache;
use crate::producer::AcceptedProducer;
use crate::status::AnalyticsStore;

use super::handlers;
use super::idempotency::IdempotencyGuard;

/// Everything the request handlers need, cloned per request.
#[derive(Clone)]
pub struct ApiState {
    pub plans: Arc<PlanCache>,
    pub balance: Arc<BalanceService>,
    pub producer: Arc<AcceptedProducer>,
    pub analytics: Arc<AnalyticsStore>,
    pub idempotency: Arc<IdempotencyGuard>,
    pub accepted_topic: String,
}

/// Build the ingress router.
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/v1/sms/send", post(handlers::send_sms))
        .route("/v1/sms/log", get(handlers::list_sms_log))
        .route("/v1/sms/:id", get(handlers::view_timeline))
        .with_state(state)
}

/// Serve the API until the root token cancels; in-flight requests finish
/// before this returns.
pub async fn serve(state: ApiState, port: u16, cancel: CancellationToken) -> anyhow::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;

    info!(port, "http server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await?;

    info!("http server stopped");
    Ok(())
}
