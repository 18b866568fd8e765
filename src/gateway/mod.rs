//! HTTP surface of the booking engine.
//!
//! Callers are identified by the `x-user-id` / `x-user-type` headers set by
//! the authentication proxy. Failures are answered with
//! `{"status": "fail" | "error", "message": ...}`.

mod error;
mod extract;
mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use crate::config::RoleConfig;
use crate::engine::LifecycleEngine;
use crate::notify::Notifier;

pub struct AppState<N> {
    pub engine: Arc<LifecycleEngine<N>>,
    pub roles: Arc<RoleConfig>,
}

impl<N> Clone for AppState<N> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            roles: Arc::clone(&self.roles),
        }
    }
}

impl<N: Notifier> AppState<N> {
    pub fn new(engine: Arc<LifecycleEngine<N>>, roles: RoleConfig) -> Self {
        Self {
            engine,
            roles: Arc::new(roles),
        }
    }
}

pub fn router<N: Notifier>(state: AppState<N>) -> Router {
    use handlers::*;

    Router::new()
        .route("/health", get(health))
        .route("/api/bookings", get(list_jobs::<N>).post(create_job::<N>))
        .route("/api/bookings/history", get(history::<N>))
        .route(
            "/api/bookings/{id}",
            get(job_details::<N>).put(update_job::<N>),
        )
        .route("/api/jobs/email", post(store_job_email::<N>))
        .route("/api/jobs/accept", post(accept_job::<N>))
        .route("/api/jobs/{id}/accept", post(accept_job_with_id::<N>))
        .route("/api/jobs/start", post(start_job::<N>))
        .route("/api/jobs/cancel", post(cancel_job::<N>))
        .route("/api/jobs/end", post(end_job::<N>))
        .route("/api/jobs/customer-not-call", post(customer_not_call::<N>))
        .route("/api/jobs/potential", get(potential_jobs::<N>))
        .route("/api/jobs/reopen", post(reopen::<N>))
        .route("/api/distance-feed", post(distance_feed::<N>))
        .route("/api/notifications/resend", post(resend_notifications::<N>))
        .route("/api/notifications/resend-sms", post(resend_sms::<N>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
