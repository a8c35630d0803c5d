use crate::models::ErrorResponse;
use axum::{http::StatusCode, Json};

const ADMIN_PRPL: &str = "r/CodeRoom-Admin";

pub fn is_admin(prpls: &[String]) -> bool {
    prpls.iter().any(|p| p == ADMIN_PRPL)
}

pub fn ensure_admin(prpls: &[String]) -> Result<String, (StatusCode, Json<ErrorResponse>)> {
    if is_admin(prpls) {
        return Ok(ADMIN_PRPL.to_string());
    }

    Err(ErrorResponse::of(
        StatusCode::FORBIDDEN,
        "Admin access required",
    ))
}

pub fn ensure_service(
    prpls: &[String],
    service_name: &str,
) -> Result<String, (StatusCode, Json<ErrorResponse>)> {
    let service_prpl = format!("s/{}", service_name);
    if prpls.iter().any(|p| p == &service_prpl) {
        return Ok(service_prpl);
    }

    if is_admin(prpls) {
        return Ok(ADMIN_PRPL.to_string());
    }

    Err(ErrorResponse::of(
        StatusCode::FORBIDDEN,
        format!("Service '{}' access denied", service_name),
    ))
}
