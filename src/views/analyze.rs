use std::sync::Arc;

use poem::{
    handler,
    web::{Data, Json},
    Result,
};

use crate::models::{AnalyzeRequest, AnalyzeResponse};
use crate::service::ReviewService;

#[handler]
pub async fn analyze_pr(
    Json(request): Json<AnalyzeRequest>,
    service: Data<&Arc<ReviewService>>,
) -> Result<Json<AnalyzeResponse>> {
    Ok(Json(service.analyze(request).await?))
}
