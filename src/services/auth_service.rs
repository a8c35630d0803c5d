use axum::http::{self};
use jsonwebtoken::{decode, Algorithm, DecodingKey, TokenData, Validation};

// Get the auth token from a request
pub fn get_auth_token<B>(req: &http::Request<B>) -> Result<String, String> {
    // 1. Try to get token from Authorization header
    if let Some(auth_header) = req.headers().get(http::header::AUTHORIZATION) {
        let auth_str = auth_header
            .to_str()
            .map_err(|_| "Invalid Authorization header".to_string())?;
        Ok(auth_str
            .strip_prefix("Bearer ")
            .unwrap_or(auth_str)
            .to_string())
    }
    // 2. Try to get token from cookies
    else {
        let cookie_header = req
            .headers()
            .get(http::header::COOKIE)
            .ok_or_else(|| "Missing Authorization header or Cookie".to_string())?
            .to_str()
            .map_err(|_| "Invalid Cookie header".to_string())?;

        for cookie in cookie::Cookie::split_parse(cookie_header) {
            if let Ok(c) = cookie {
                if c.name() == "auth_token" {
                    return Ok(c.value().to_string());
                }
            }
        }
        Err("auth_token cookie not found".to_string())
    }
}

// Validate a JWT token and return the token data
pub fn validate_jwt(
    token: &str,
    secret: &str,
) -> Result<TokenData<serde_json::Value>, jsonwebtoken::errors::Error> {
    let validation = Validation::new(Algorithm::HS256);
    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    decode::<serde_json::Value>(token, &decoding_key, &validation)
}

/// Principals carried by a validated token: the subject plus any roles.
pub fn prpls_from_claims(claims: &serde_json::Value) -> Vec<String> {
    let mut prpls = Vec::new();
    if let Some(sub) = claims.get("sub").and_then(|v| v.as_str()) {
        prpls.push(format!("u/{}", sub));
    }
    if let Some(roles) = claims.get("roles").and_then(|v| v.as_array()) {
        for role in roles.iter().filter_map(|r| r.as_str()) {
            let role_prpl = format!("r/{}", role);
            if !prpls.contains(&role_prpl) {
                prpls.push(role_prpl);
            }
        }
    }
    prpls
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_prpls_include_subject_and_roles() {
        let claims = json!({ "sub": "user-1", "roles": ["CodeRoom-Admin", "Editor"] });
        let prpls = prpls_from_claims(&claims);
        assert_eq!(
            prpls,
            vec!["u/user-1", "r/CodeRoom-Admin", "r/Editor"]
        );
    }

    #[test]
    fn test_duplicate_roles_collapse() {
        let claims = json!({ "sub": "user-1", "roles": ["Editor", "Editor"] });
        assert_eq!(prpls_from_claims(&claims), vec!["u/user-1", "r/Editor"]);
    }

    #[test]
    fn test_token_from_bearer_header() {
        let req = http::Request::builder()
            .header(http::header::AUTHORIZATION, "Bearer abc.def.ghi")
            .body(())
            .unwrap();
        assert_eq!(get_auth_token(&req).unwrap(), "abc.def.ghi");
    }

    #[test]
    fn test_token_from_cookie() {
        let req = http::Request::builder()
            .header(http::header::COOKIE, "theme=dark; auth_token=abc.def.ghi")
            .body(())
            .unwrap();
        assert_eq!(get_auth_token(&req).unwrap(), "abc.def.ghi");
    }

    #[test]
    fn test_missing_token_is_an_error() {
        let req = http::Request::builder().body(()).unwrap();
        assert!(get_auth_token(&req).is_err());
    }
}
