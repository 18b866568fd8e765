use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use serde::{Deserialize, Serialize};

use super::AppState;
use super::error::ApiError;
use crate::auth::Caller;
use crate::engine::{
    Acceptance, BookingChanges, DistanceFeedRequest, FeedOutcome, HistoryPage, JobDetails,
    JobEmail, JobListing, ListFilter, NewBooking, ResendOutcome,
};
use crate::error::BookingError;
use crate::notify::{ChannelSelector, Notifier};
use crate::state_machine::{Job, JobId, JobStatus, UserId};

type ApiResult<T> = Result<Json<T>, ApiError>;

/// `user_id` lists one user's open jobs; the rest narrow an admin's full listing.
#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub user_id: Option<UserId>,
    pub status: Option<JobStatus>,
    pub language: Option<String>,
    pub flagged: Option<bool>,
    pub customer_id: Option<UserId>,
    pub translator_id: Option<UserId>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub user_id: Option<UserId>,
    pub page: Option<usize>,
}

/// `{"job_id": 42}`; older clients send `jobid`.
#[derive(Debug, Deserialize)]
pub struct JobRef {
    #[serde(alias = "jobid")]
    pub job_id: JobId,
}

#[derive(Debug, Deserialize)]
pub struct ResendRequest {
    #[serde(alias = "jobid")]
    pub job_id: JobId,
    /// `*` for every channel, or `push`, `sms`, `email`.
    #[serde(default)]
    pub channel: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Updated {
    pub success: bool,
    pub data: Job,
}

#[derive(Debug, Serialize)]
pub struct Stored {
    pub status: &'static str,
    pub data: Job,
}

pub async fn health() -> &'static str {
    "ok"
}

pub async fn list_jobs<N: Notifier>(
    State(state): State<AppState<N>>,
    caller: Caller,
    params: Result<Query<ListParams>, QueryRejection>,
) -> ApiResult<JobListing> {
    let Query(params) = params?;
    let filter = ListFilter {
        status: params.status,
        language: params.language,
        flagged: params.flagged,
        customer_id: params.customer_id,
        translator_id: params.translator_id,
    };
    Ok(Json(state.engine.list_jobs(&caller, params.user_id, filter)?))
}

pub async fn history<N: Notifier>(
    State(state): State<AppState<N>>,
    caller: Caller,
    params: Result<Query<HistoryParams>, QueryRejection>,
) -> ApiResult<HistoryPage> {
    let Query(params) = params?;
    Ok(Json(state.engine.history(&caller, params.user_id, params.page)?))
}

pub async fn job_details<N: Notifier>(
    State(state): State<AppState<N>>,
    caller: Caller,
    id: Result<Path<JobId>, PathRejection>,
) -> ApiResult<JobDetails> {
    let Path(id) = id?;
    Ok(Json(state.engine.job_details(&caller, id)?))
}

pub async fn create_job<N: Notifier>(
    State(state): State<AppState<N>>,
    caller: Caller,
    body: Result<Json<NewBooking>, JsonRejection>,
) -> ApiResult<Job> {
    let Json(booking) = body?;
    Ok(Json(state.engine.create_job(&caller, booking).await?))
}

pub async fn update_job<N: Notifier>(
    State(state): State<AppState<N>>,
    caller: Caller,
    id: Result<Path<JobId>, PathRejection>,
    body: Result<Json<BookingChanges>, JsonRejection>,
) -> ApiResult<Updated> {
    let Path(id) = id?;
    let Json(changes) = body?;
    let data = state.engine.update_job(&caller, id, changes).await?;
    Ok(Json(Updated {
        success: true,
        data,
    }))
}

pub async fn store_job_email<N: Notifier>(
    State(state): State<AppState<N>>,
    caller: Caller,
    body: Result<Json<JobEmail>, JsonRejection>,
) -> ApiResult<Stored> {
    let Json(request) = body?;
    let data = state.engine.store_job_email(&caller, request).await?;
    Ok(Json(Stored {
        status: "success",
        data,
    }))
}

pub async fn accept_job<N: Notifier>(
    State(state): State<AppState<N>>,
    caller: Caller,
    body: Result<Json<JobRef>, JsonRejection>,
) -> ApiResult<Job> {
    let Json(job) = body?;
    Ok(Json(state.engine.accept_job(&caller, job.job_id).await?))
}

pub async fn accept_job_with_id<N: Notifier>(
    State(state): State<AppState<N>>,
    caller: Caller,
    id: Result<Path<JobId>, PathRejection>,
) -> ApiResult<Acceptance> {
    let Path(id) = id?;
    Ok(Json(state.engine.accept_job_with_id(&caller, id).await?))
}

pub async fn start_job<N: Notifier>(
    State(state): State<AppState<N>>,
    caller: Caller,
    body: Result<Json<JobRef>, JsonRejection>,
) -> ApiResult<Job> {
    let Json(job) = body?;
    Ok(Json(state.engine.start_job(&caller, job.job_id).await?))
}

pub async fn cancel_job<N: Notifier>(
    State(state): State<AppState<N>>,
    caller: Caller,
    body: Result<Json<JobRef>, JsonRejection>,
) -> ApiResult<Job> {
    let Json(job) = body?;
    Ok(Json(state.engine.cancel_job(&caller, job.job_id).await?))
}

pub async fn end_job<N: Notifier>(
    State(state): State<AppState<N>>,
    caller: Caller,
    body: Result<Json<JobRef>, JsonRejection>,
) -> ApiResult<Job> {
    let Json(job) = body?;
    Ok(Json(state.engine.end_job(&caller, job.job_id).await?))
}

pub async fn customer_not_call<N: Notifier>(
    State(state): State<AppState<N>>,
    caller: Caller,
    body: Result<Json<JobRef>, JsonRejection>,
) -> ApiResult<Job> {
    let Json(job) = body?;
    Ok(Json(state.engine.customer_not_call(&caller, job.job_id).await?))
}

pub async fn potential_jobs<N: Notifier>(
    State(state): State<AppState<N>>,
    caller: Caller,
) -> ApiResult<Vec<Job>> {
    Ok(Json(state.engine.potential_jobs(&caller)?))
}

pub async fn reopen<N: Notifier>(
    State(state): State<AppState<N>>,
    caller: Caller,
    body: Result<Json<JobRef>, JsonRejection>,
) -> ApiResult<Job> {
    let Json(job) = body?;
    Ok(Json(state.engine.reopen(&caller, job.job_id).await?))
}

pub async fn distance_feed<N: Notifier>(
    State(state): State<AppState<N>>,
    caller: Caller,
    body: Result<Json<DistanceFeedRequest>, JsonRejection>,
) -> ApiResult<FeedOutcome> {
    let Json(request) = body?;
    Ok(Json(state.engine.distance_feed(&caller, request).await?))
}

pub async fn resend_notifications<N: Notifier>(
    State(state): State<AppState<N>>,
    caller: Caller,
    body: Result<Json<ResendRequest>, JsonRejection>,
) -> ApiResult<ResendOutcome> {
    let Json(request) = body?;
    let selector = match request.channel.as_deref() {
        None => ChannelSelector::All,
        Some(raw) => raw
            .parse::<ChannelSelector>()
            .map_err(BookingError::Validation)?,
    };
    Ok(Json(state.engine.resend_notifications(
        &caller,
        request.job_id,
        selector,
    )?))
}

pub async fn resend_sms<N: Notifier>(
    State(state): State<AppState<N>>,
    caller: Caller,
    body: Result<Json<JobRef>, JsonRejection>,
) -> ApiResult<ResendOutcome> {
    let Json(job) = body?;
    Ok(Json(state.engine.resend_sms(&caller, job.job_id).await?))
}
