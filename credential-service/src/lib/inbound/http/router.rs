use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::Request;
use axum::http::Response;
use axum::middleware;
use axum::routing::get;
use axum::routing::post;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::Span;

use super::handlers::change_password::change_password;
use super::handlers::forgot_password::forgot_password;
use super::handlers::health::health;
use super::handlers::login::login;
use super::handlers::me::me;
use super::handlers::refresh::refresh;
use super::handlers::reset_password::reset_password;
use super::handlers::signup::signup;
use super::middleware::authenticate as auth_middleware;
use crate::domain::credential::ports::CredentialServicePort;

#[derive(Clone)]
pub struct AppState {
    pub credential_service: Arc<dyn CredentialServicePort>,
}

pub fn create_router(credential_service: Arc<dyn CredentialServicePort>) -> Router {
    let state = AppState { credential_service };

    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/api/auth/signup", post(signup))
        .route("/api/auth/login", post(login))
        .route("/api/auth/forgot-password", post(forgot_password))
        .route("/api/auth/reset-password", post(reset_password));

    let protected_routes = Router::new()
        .route("/api/auth/refresh", post(refresh))
        .route("/api/auth/change-password", post(change_password))
        .route("/api/auth/me", get(me))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // Headers are left out of the span: they carry bearer tokens
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &Request<Body>| {
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
                version = ?request.version(),
            )
        })
        .on_request(|request: &Request<Body>, _span: &Span| {
            tracing::info!(
                method = %request.method(),
                uri = %request.uri(),
                "Request started"
            );
        })
        .on_response(
            |response: &Response<Body>, latency: Duration, _span: &Span| {
                tracing::info!(
                    status = response.status().as_u16(),
                    latency_ms = latency.as_millis(),
                    "Request completed"
                );
            },
        );

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(trace_layer)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use auth::AccessToken;
    use axum::http::header;
    use axum::http::StatusCode;
    use chrono::Utc;
    use mockall::mock;
    use tower::ServiceExt;

    use super::*;
    use crate::domain::credential::errors::CredentialError;
    use crate::domain::credential::models::ChangePasswordCommand;
    use crate::domain::credential::models::EmailAddress;
    use crate::domain::credential::models::Password;
    use crate::domain::credential::models::PasswordHash;
    use crate::domain::credential::models::SignupCommand;
    use crate::domain::credential::models::User;
    use crate::domain::credential::models::UserId;

    mock! {
        pub TestCredentialService {}

        #[async_trait]
        impl CredentialServicePort for TestCredentialService {
            async fn signup(&self, command: SignupCommand) -> Result<User, CredentialError>;
            async fn login(&self, email: &str, password: &str) -> Result<AccessToken, CredentialError>;
            async fn refresh_access_token(&self, token: &str) -> Result<AccessToken, CredentialError>;
            async fn reissue_access_token(&self, user: &User) -> Result<AccessToken, CredentialError>;
            async fn authenticate(&self, token: &str) -> Result<User, CredentialError>;
            async fn change_password(&self, user_id: &UserId, command: ChangePasswordCommand) -> Result<(), CredentialError>;
            async fn request_password_reset(&self, email: &EmailAddress) -> Result<(), CredentialError>;
            async fn confirm_password_reset(&self, opaque_id: &str, new_password: Password) -> Result<(), CredentialError>;
            async fn purge_reset_tokens(&self) -> Result<u64, CredentialError>;
        }
    }

    fn request(method: &str, uri: &str) -> axum::http::request::Builder {
        Request::builder().method(method).uri(uri)
    }

    #[tokio::test]
    async fn test_health_is_public() {
        let router = create_router(Arc::new(MockTestCredentialService::new()));

        let response = router
            .oneshot(request("GET", "/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_protected_route_without_bearer_skips_service() {
        let mut service = MockTestCredentialService::new();
        service.expect_authenticate().times(0);

        let router = create_router(Arc::new(service));

        let response = router
            .oneshot(request("GET", "/api/auth/me").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_protected_route_with_bearer() {
        let mut service = MockTestCredentialService::new();
        service
            .expect_authenticate()
            .withf(|token| token == "opaque.jwt.value")
            .times(1)
            .returning(|_| {
                let now = Utc::now();
                Ok(User {
                    id: UserId::new(),
                    email: EmailAddress::new("alice@example.com".to_string()).unwrap(),
                    password_hash: PasswordHash::new("$argon2id$stub".to_string()),
                    created_at: now,
                    updated_at: now,
                })
            });

        let router = create_router(Arc::new(service));

        let response = router
            .oneshot(
                request("GET", "/api/auth/me")
                    .header(header::AUTHORIZATION, "Bearer opaque.jwt.value")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_refresh_reuses_the_authenticated_user() {
        let mut service = MockTestCredentialService::new();
        let alice = User {
            id: UserId::new(),
            email: EmailAddress::new("alice@example.com".to_string()).unwrap(),
            password_hash: PasswordHash::new("$argon2id$stub".to_string()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let alice_id = alice.id;

        let resolved = alice.clone();
        service
            .expect_authenticate()
            .times(1)
            .returning(move |_| Ok(resolved.clone()));
        service.expect_refresh_access_token().times(0);
        service
            .expect_reissue_access_token()
            .withf(move |user| user.id == alice_id)
            .times(1)
            .returning(|user| {
                let now = Utc::now();
                Ok(AccessToken {
                    token: "fresh.jwt.value".to_string(),
                    subject: user.id.to_string(),
                    issued_at: now,
                    expires_at: now + chrono::Duration::minutes(30),
                })
            });

        let router = create_router(Arc::new(service));

        let response = router
            .oneshot(
                request("POST", "/api/auth/refresh")
                    .header(header::AUTHORIZATION, "Bearer opaque.jwt.value")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unavailable_maps_to_503() {
        let mut service = MockTestCredentialService::new();
        service
            .expect_login()
            .times(1)
            .returning(|_, _| Err(CredentialError::Unavailable("store timed out".to_string())));

        let router = create_router(Arc::new(service));

        let response = router
            .oneshot(
                request("POST", "/api/auth/login")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        r#"{"email":"alice@example.com","password":"S3cret!"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
