//! Caller identity for customer-scoped routes.
//!
//! Customers may only act on their own cart and orders. The caller is
//! identified by the `x-customer-id` header, which must match the
//! customer id in the path.

use axum::http::HeaderMap;
use common::CustomerId;
use uuid::Uuid;

use crate::error::ApiError;

pub const CUSTOMER_HEADER: &str = "x-customer-id";

/// Parses a customer id from a path segment.
pub fn parse_customer_id(raw: &str) -> Result<CustomerId, ApiError> {
    Uuid::parse_str(raw)
        .map(CustomerId::from_uuid)
        .map_err(|e| ApiError::BadRequest(format!("Invalid customer id: {e}")))
}

/// Returns the path customer if the caller is that customer.
///
/// 401 when the header is missing or malformed, 403 when it names someone
/// else.
pub fn authorize(headers: &HeaderMap, path_id: &str) -> Result<CustomerId, ApiError> {
    let caller = headers
        .get(CUSTOMER_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Uuid::parse_str(value.trim()).ok())
        .map(CustomerId::from_uuid)
        .ok_or_else(|| ApiError::Unauthorized("Missing or invalid x-customer-id".to_string()))?;

    let target = parse_customer_id(path_id)?;
    if caller != target {
        tracing::warn!(caller = %caller, target = %target, "customer identity mismatch");
        return Err(ApiError::Forbidden(
            "Cannot access another customer's data".to_string(),
        ));
    }
    Ok(target)
}
