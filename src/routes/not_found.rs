use actix_web::HttpResponse;

use crate::errors::ApiError;

#[allow(clippy::unused_async)]
pub async fn not_found() -> Result<HttpResponse, ApiError> {
    Err(ApiError::NotFound)
}
