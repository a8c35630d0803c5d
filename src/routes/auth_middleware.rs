use axum::{extract::Request, http::StatusCode, middleware::Next, response::Response};
use tracing::{debug, error};

use crate::config;
use crate::services::auth_service::{get_auth_token, prpls_from_claims, validate_jwt};

pub async fn auth_middleware(mut req: Request, next: Next) -> Result<Response, StatusCode> {
    // 1. Get the auth token from the request
    let token = match get_auth_token(&req) {
        Ok(token) => token,
        Err(_) => return Err(StatusCode::UNAUTHORIZED),
    };

    // 2. Validate Token
    let config = config::get_config();
    let secret = match &config.auth_jwt_secret {
        Some(secret) => secret,
        None => {
            error!("Auth JWT secret not configured");
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };
    let token_data = match validate_jwt(&token, secret) {
        Ok(token_data) => token_data,
        Err(e) => {
            error!("JWT validation failed: {}", e);
            return Err(StatusCode::UNAUTHORIZED);
        }
    };

    // 3. Determine the type of token (user/service)
    let token_type = token_data
        .claims
        .get("type")
        .and_then(|v| v.as_str())
        .unwrap_or("user");

    // 4A. User tokens: the subject is the caller's identity
    if token_type == "user" {
        let user_uid = if let Some(sub) = token_data.claims.get("sub").and_then(|v| v.as_str()) {
            sub.to_string()
        } else {
            error!("JWT token does not contain 'sub' claim");
            return Err(StatusCode::UNAUTHORIZED);
        };
        debug!("User token validated for {}", user_uid);

        // 5A. Principals (subject + roles) and identity for downstream handlers
        let prpls = prpls_from_claims(&token_data.claims);
        {
            let extensions = req.extensions_mut();
            extensions.insert(prpls);
            extensions.insert(user_uid);
        }
    }
    // 4B. Service tokens: just the service name as principal
    else if token_type == "service" {
        let service_name =
            if let Some(sub) = token_data.claims.get("sub").and_then(|v| v.as_str()) {
                sub.to_string()
            } else {
                error!("JWT token does not contain 'sub' claim");
                return Err(StatusCode::UNAUTHORIZED);
            };
        debug!("Service token validated for {}", service_name);

        let prpls = vec!["s/".to_string() + &service_name];
        {
            let extensions = req.extensions_mut();
            extensions.insert(prpls);
            // No user identity to insert
        }
    } else {
        error!("Invalid token type: {}", token_type);
        return Err(StatusCode::UNAUTHORIZED);
    }

    // Token is valid, proceed to next middleware/handler
    Ok(next.run(req).await)
}
