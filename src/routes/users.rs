/// User Session Routes
///
/// Signup, login, token refresh, current user and logout. Handlers only
/// extract request data and delegate to `SessionService`.

use actix_web::{http::header, web, HttpRequest, HttpResponse};
use serde::Deserialize;

use crate::domain::Profile;
use crate::error::{ErrorContext, RequestError};
use crate::session::{Credentials, SessionService, SignupRequest};

/// Refresh or logout request body
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshGrant {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

fn user_agent(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get(header::USER_AGENT)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|ua| !ua.is_empty())
        .map(str::to_string)
}

/// POST /users/signup
///
/// # Errors
/// - 400: Validation errors (invalid email, short password, bad name)
/// - 409: Email already registered
pub async fn signup(
    form: web::Json<SignupRequest>,
    sessions: web::Data<SessionService>,
) -> Result<HttpResponse, RequestError> {
    let context = ErrorContext::new("user_signup");

    let user = sessions
        .signup(form.into_inner())
        .await
        .map_err(|e| context.fail(e))?;

    tracing::info!(
        request_id = %context.request_id,
        user_id = %user.id,
        "User registered successfully"
    );

    Ok(HttpResponse::Ok().json(user))
}

/// POST /users/login
///
/// The request's `User-Agent` scopes the refresh token to a device, so
/// repeated logins from one client share a session.
///
/// # Errors
/// - 401: Invalid credentials (unknown email and wrong password look alike)
pub async fn login(
    req: HttpRequest,
    form: web::Json<Credentials>,
    sessions: web::Data<SessionService>,
) -> Result<HttpResponse, RequestError> {
    let context = ErrorContext::new("user_login");
    let agent = user_agent(&req);

    let tokens = sessions
        .login(&form, agent.as_deref())
        .await
        .map_err(|e| context.fail(e))?;

    Ok(HttpResponse::Ok().json(tokens))
}

/// POST /users/refresh
///
/// # Errors
/// - 401: Missing, invalid, expired or revoked refresh token
pub async fn refresh(
    form: web::Json<RefreshGrant>,
    sessions: web::Data<SessionService>,
) -> Result<HttpResponse, RequestError> {
    let context = ErrorContext::new("token_refresh");
    let token = form.refresh_token.as_deref().unwrap_or_default();

    let response = sessions
        .refresh(token)
        .await
        .map_err(|e| context.fail(e))?;

    Ok(HttpResponse::Ok().json(response))
}

/// GET /users/me (authenticated)
pub async fn me(
    profile: web::ReqData<Profile>,
    sessions: web::Data<SessionService>,
) -> Result<HttpResponse, RequestError> {
    let context = ErrorContext::new("current_user").with_user_id(profile.id.to_string());

    let user = sessions.me(&profile).await.map_err(|e| context.fail(e))?;

    Ok(HttpResponse::Ok().json(user))
}

/// POST /users/logout (authenticated)
///
/// Revokes the given refresh token, or every session of the calling device
/// when no token is sent. The body is optional.
pub async fn logout(
    req: HttpRequest,
    profile: web::ReqData<Profile>,
    form: Option<web::Json<RefreshGrant>>,
    sessions: web::Data<SessionService>,
) -> Result<HttpResponse, RequestError> {
    let context = ErrorContext::new("user_logout").with_user_id(profile.id.to_string());
    let grant = form.map(web::Json::into_inner).unwrap_or_default();
    let agent = user_agent(&req);

    sessions
        .logout(&profile, grant.refresh_token.as_deref(), agent.as_deref())
        .await
        .map_err(|e| context.fail(e))?;

    Ok(HttpResponse::NoContent().finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn test_user_agent_is_read_from_header() {
        let req = TestRequest::default()
            .insert_header((header::USER_AGENT, "mobile-app/1.0"))
            .to_http_request();
        assert_eq!(user_agent(&req).as_deref(), Some("mobile-app/1.0"));
    }

    #[test]
    fn test_blank_user_agent_counts_as_absent() {
        let req = TestRequest::default()
            .insert_header((header::USER_AGENT, "  "))
            .to_http_request();
        assert_eq!(user_agent(&req), None);

        let req = TestRequest::default().to_http_request();
        assert_eq!(user_agent(&req), None);
    }

    #[test]
    fn test_refresh_grant_accepts_camel_case() {
        let grant: RefreshGrant =
            serde_json::from_str(r#"{"refreshToken":"abc"}"#).unwrap();
        assert_eq!(grant.refresh_token.as_deref(), Some("abc"));

        let empty: RefreshGrant = serde_json::from_str("{}").unwrap();
        assert!(empty.refresh_token.is_none());
    }
}
