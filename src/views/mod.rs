use std::sync::Arc;

use poem::{error::ResponseError, get, post, web::Json, Endpoint, EndpointExt, IntoResponse, Route};
use serde_json::json;

use crate::error::ReviewError;
use crate::service::ReviewService;

pub mod analyze;
pub mod tasks;

pub fn app(service: Arc<ReviewService>) -> impl Endpoint {
    Route::new()
        .at("/analyze-pr", post(analyze::analyze_pr))
        .at("/status/:task_id", get(tasks::status))
        .at("/results/:task_id", get(tasks::results))
        .data(service)
        .inspect_all_err(|err| {
            tracing::error!("{:?}", err);
        })
        .catch_error(|err: ReviewError| async move {
            let status = err.status();
            Json(json!({ "detail": err.to_string() })).with_status(status)
        })
}
