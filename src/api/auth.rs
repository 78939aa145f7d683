use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use super::error::ApiError;
use super::server::ApiState;

/// Authenticated request context: the customer and the priority of the plan
/// behind the presented API key.
#[derive(Debug, Clone, Copy)]
pub struct Caller {
    pub customer_id: i64,
    pub priority: i32,
}

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
}

#[async_trait]
impl FromRequestParts<ApiState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ApiState,
    ) -> Result<Self, Self::Rejection> {
        let api_key =
            header(parts, "X-Api-Key").ok_or(ApiError::Unauthenticated("api key is empty"))?;

        // Snapshot read; unknown keys are rejected until the next refresh
        // publishes them.
        let priority = state
            .plans
            .priority(api_key)
            .ok_or(ApiError::Unauthenticated("api key not found"))?;

        let customer_id = header(parts, "X-Auth-User-Id")
            .and_then(|value| value.parse::<i64>().ok())
            .ok_or(ApiError::Unauthenticated("user is not authorized"))?;

        Ok(Caller {
            customer_id,
            priority,
        })
    }
}
