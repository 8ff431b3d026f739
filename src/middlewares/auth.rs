use crate::error::AppError;
use crate::utils::JwtService;
use actix_web::http::Method;
use actix_web::{
    Error, HttpMessage,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
};
use futures_util::future::LocalBoxFuture;
use std::future::{Ready, ready};

/// Identity attached to the request when a valid access token was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub id: i64,
    pub is_admin: bool,
}

// 必须登录的路径前缀；其余路径允许匿名访问
struct ProtectedPaths {
    prefix_paths: Vec<&'static str>,
}

impl ProtectedPaths {
    fn new() -> Self {
        Self {
            prefix_paths: vec!["/api/v1/orders", "/api/v1/admin/"],
        }
    }

    fn requires_login(&self, path: &str) -> bool {
        self.prefix_paths
            .iter()
            .any(|&prefix| path.starts_with(prefix))
    }
}

fn bearer_token(req: &ServiceRequest) -> Option<&str> {
    req.headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Optional bearer authentication. A valid token adds an
/// [`AuthenticatedUser`] to the request extensions; a bad token is rejected
/// everywhere; no token is fine outside the protected prefixes.
pub struct AuthMiddleware {
    jwt_service: JwtService,
}

impl AuthMiddleware {
    pub fn new(jwt_service: JwtService) -> Self {
        Self { jwt_service }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = AuthMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthMiddlewareService {
            service,
            jwt_service: self.jwt_service.clone(),
            protected_paths: ProtectedPaths::new(),
        }))
    }
}

pub struct AuthMiddlewareService<S> {
    service: S,
    jwt_service: JwtService,
    protected_paths: ProtectedPaths,
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        // 放行所有 CORS 预检请求
        if req.method() == Method::OPTIONS {
            return Box::pin(self.service.call(req));
        }

        let verified = bearer_token(&req).map(|token| {
            self.jwt_service
                .verify_access_token(token)
                .and_then(|claims| {
                    Ok(AuthenticatedUser {
                        id: claims.user_id()?,
                        is_admin: claims.admin,
                    })
                })
        });

        match verified {
            Some(Ok(user)) => {
                req.extensions_mut().insert(user);
                Box::pin(self.service.call(req))
            }
            Some(Err(_)) => {
                let error = AppError::AuthError("Invalid access token".to_string());
                Box::pin(async move { Err(error.into()) })
            }
            None if self.protected_paths.requires_login(req.path()) => {
                let error = AppError::AuthError("Missing access token".to_string());
                Box::pin(async move { Err(error.into()) })
            }
            None => Box::pin(self.service.call(req)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, HttpRequest, HttpResponse, test, web};
    use crate::utils::jwt::issue_access_token;

    const SECRET: &str = "test-secret";

    async fn whoami(req: HttpRequest) -> HttpResponse {
        match req.extensions().get::<AuthenticatedUser>() {
            Some(user) => HttpResponse::Ok().body(user.id.to_string()),
            None => HttpResponse::Ok().body("anonymous"),
        }
    }

    fn app_routes(cfg: &mut web::ServiceConfig) {
        cfg.route("/api/v1/checkout/order", web::get().to(whoami))
            .route("/api/v1/orders", web::get().to(whoami));
    }

    #[actix_web::test]
    async fn anonymous_allowed_on_checkout() {
        let app = test::init_service(
            App::new()
                .wrap(AuthMiddleware::new(JwtService::new(SECRET)))
                .configure(app_routes),
        )
        .await;
        let req = test::TestRequest::get().uri("/api/v1/checkout/order").to_request();
        let body = test::call_and_read_body(&app, req).await;
        assert_eq!(body, "anonymous");
    }

    #[actix_web::test]
    async fn valid_token_attaches_user() {
        let jwt = JwtService::new(SECRET);
        let token = issue_access_token(SECRET, 42, false, 3600);
        let app = test::init_service(
            App::new()
                .wrap(AuthMiddleware::new(jwt))
                .configure(app_routes),
        )
        .await;
        let req = test::TestRequest::get()
            .uri("/api/v1/orders")
            .insert_header(("Authorization", format!("Bearer {token}")))
            .to_request();
        let body = test::call_and_read_body(&app, req).await;
        assert_eq!(body, "42");
    }

    #[actix_web::test]
    async fn protected_paths_need_a_token() {
        let app = test::init_service(
            App::new()
                .wrap(AuthMiddleware::new(JwtService::new(SECRET)))
                .configure(app_routes),
        )
        .await;
        let req = test::TestRequest::get().uri("/api/v1/orders").to_request();
        let err = test::try_call_service(&app, req).await.unwrap_err();
        assert_eq!(err.as_response_error().status_code(), 401);
    }

    #[actix_web::test]
    async fn bad_token_is_rejected() {
        let app = test::init_service(
            App::new()
                .wrap(AuthMiddleware::new(JwtService::new(SECRET)))
                .configure(app_routes),
        )
        .await;
        let req = test::TestRequest::get()
            .uri("/api/v1/checkout/order")
            .insert_header(("Authorization", "Bearer not-a-token"))
            .to_request();
        assert!(test::try_call_service(&app, req).await.is_err());
    }
}
