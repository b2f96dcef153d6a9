use std::sync::Arc;

use poem::{
    handler,
    web::{Data, Json, Path},
    Result,
};

use crate::models::{TaskResultsResponse, TaskStatusResponse};
use crate::service::ReviewService;

#[handler]
pub async fn status(
    Path(task_id): Path<String>,
    service: Data<&Arc<ReviewService>>,
) -> Result<Json<TaskStatusResponse>> {
    Ok(Json(service.status(&task_id).await?))
}

#[handler]
pub async fn results(
    Path(task_id): Path<String>,
    service: Data<&Arc<ReviewService>>,
) -> Result<Json<TaskResultsResponse>> {
    Ok(Json(service.results(&task_id).await?))
}
