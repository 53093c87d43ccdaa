/// JWT Authentication Middleware
///
/// Validates the bearer access token and injects the caller's `Profile`
/// into request extensions for use by route handlers.

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header,
    Error, HttpMessage, ResponseError,
};
use futures::future::LocalBoxFuture;
use std::rc::Rc;
use std::sync::Arc;

use crate::auth::AccessTokenIssuer;
use crate::error::{AppError, AuthError};

/// JWT middleware for protecting routes
///
/// Must be applied to scopes that require authentication.
pub struct JwtMiddleware {
    access_tokens: Arc<dyn AccessTokenIssuer>,
}

impl JwtMiddleware {
    pub fn new(access_tokens: Arc<dyn AccessTokenIssuer>) -> Self {
        Self { access_tokens }
    }
}

impl<S, B> Transform<S, ServiceRequest> for JwtMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = JwtMiddlewareService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(JwtMiddlewareService {
            service: Rc::new(service),
            access_tokens: self.access_tokens.clone(),
        }))
    }
}

pub struct JwtMiddlewareService<S> {
    service: Rc<S>,
    access_tokens: Arc<dyn AccessTokenIssuer>,
}

fn bearer_token(req: &ServiceRequest) -> Option<String> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

fn reject(error: AppError) -> Error {
    let response = error.error_response();
    actix_web::error::InternalError::from_response(error, response).into()
}

impl<S, B> Service<ServiceRequest> for JwtMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let token = match bearer_token(&req) {
            Some(token) => token,
            None => {
                tracing::warn!(path = %req.path(), "Missing or invalid Authorization header");
                let error = reject(AuthError::MissingAuthorization.into());
                return Box::pin(async move { Err(error) });
            }
        };

        match self.access_tokens.verify(&token) {
            Ok(profile) => {
                tracing::debug!(user_id = %profile.id, "Access token validated");
                req.extensions_mut().insert(profile);

                let service = self.service.clone();
                Box::pin(async move { service.call(req).await })
            }
            Err(e) => {
                let error = reject(e);
                Box::pin(async move { Err(error) })
            }
        }
    }
}
