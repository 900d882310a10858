#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Shared integration-test scaffolding.
//!
//! These tests drive the REAL router and REAL `AppState` against a live
//! Postgres + Redis (see `docker-compose.yml`), the same way the kernel's
//! own test suite does it. `DATABASE_URL` / `REDIS_URL` must point at a
//! disposable database before running `cargo test`.

#![allow(dead_code)]

use axum::Router;
use axum::body::Body;
use axum::http::{Request, header};
use axum::response::Response;
use http_body_util::BodyExt;
use serde_json::Value;
use sqlx::PgPool;
use tower::ServiceExt;
use uuid::Uuid;
use wardenio_kernel::config::Config;
use wardenio_kernel::crypto;
use wardenio_kernel::state::AppState;

pub struct TestApp {
    router: Router,
    pub db: PgPool,
    pub state: AppState,
}

impl TestApp {
    pub async fn new() -> Self {
        dotenvy::dotenv().ok();

        let config = Config::from_env().expect("failed to load config");
        let state = AppState::new(config).await.expect("failed to init AppState");
        let db = state.db().clone();

        let router = Router::new()
            .merge(wardenio_kernel::routes::oidc::router(state.clone()))
            .merge(wardenio_kernel::routes::broker::router())
            .merge(wardenio_kernel::routes::admin::router(state.clone()))
            .merge(wardenio_kernel::routes::health::router())
            .with_state(state.clone());

        Self { router, db, state }
    }

    pub async fn request(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.expect("request failed")
    }

    /// Create a realm with default lifespans/policy, returning its id.
    pub async fn seed_realm(&self, name: &str) -> Uuid {
        let id = Uuid::now_v7();
        sqlx::query(
            r#"
            INSERT INTO realms (
                id, name, display_name, enabled, access_token_lifespan,
                refresh_token_lifespan, offline_token_lifespan, password_min_length,
                password_require_uppercase, password_require_lowercase,
                password_require_digits, password_require_special,
                password_history_count, password_max_age_days, brute_force_enabled,
                max_login_failures, lockout_duration, failure_reset_time,
                permanent_lockout_after, mfa_required
            )
            VALUES (
                $1, $2, $2, true, 300,
                1800, 2592000, 8,
                false, false, false, false,
                3, 0, true,
                5, 60, 900,
                30, false
            )
            "#,
        )
        .bind(id)
        .bind(name)
        .execute(&self.db)
        .await
        .expect("failed to seed realm");
        id
    }

    /// Create a confidential client with the given grant types and scopes.
    pub async fn seed_confidential_client(
        &self,
        realm_id: Uuid,
        client_id: &str,
        secret: &str,
        grant_types: &[&str],
        redirect_uris: &[&str],
    ) -> Uuid {
        let id = Uuid::now_v7();
        let secret_hash = crypto::hash_password(secret).expect("failed to hash client secret");
        let grant_types: Vec<String> = grant_types.iter().map(|s| s.to_string()).collect();
        let redirect_uris: Vec<String> = redirect_uris.iter().map(|s| s.to_string()).collect();
        sqlx::query(
            r#"
            INSERT INTO clients (
                id, realm_id, client_id, client_type, client_secret_hash, enabled,
                grant_types, redirect_uris, web_origins, default_scopes, optional_scopes
            )
            VALUES ($1, $2, $3, 'CONFIDENTIAL', $4, true, $5, $6, '{}', ARRAY['openid'], '{}')
            "#,
        )
        .bind(id)
        .bind(realm_id)
        .bind(client_id)
        .bind(secret_hash)
        .bind(&grant_types)
        .bind(&redirect_uris)
        .execute(&self.db)
        .await
        .expect("failed to seed client");
        id
    }

    /// Create a public client (PKCE-only, no secret).
    pub async fn seed_public_client(
        &self,
        realm_id: Uuid,
        client_id: &str,
        grant_types: &[&str],
        redirect_uris: &[&str],
    ) -> Uuid {
        let id = Uuid::now_v7();
        let grant_types: Vec<String> = grant_types.iter().map(|s| s.to_string()).collect();
        let redirect_uris: Vec<String> = redirect_uris.iter().map(|s| s.to_string()).collect();
        sqlx::query(
            r#"
            INSERT INTO clients (
                id, realm_id, client_id, client_type, client_secret_hash, enabled,
                grant_types, redirect_uris, web_origins, default_scopes, optional_scopes
            )
            VALUES ($1, $2, $3, 'PUBLIC', NULL, true, $4, $5, '{}', ARRAY['openid'], '{}')
            "#,
        )
        .bind(id)
        .bind(realm_id)
        .bind(client_id)
        .bind(&grant_types)
        .bind(&redirect_uris)
        .execute(&self.db)
        .await
        .expect("failed to seed client");
        id
    }

    pub async fn seed_user(&self, realm_id: Uuid, username: &str, password: &str) -> Uuid {
        let id = Uuid::now_v7();
        let hash = crypto::hash_password(password).expect("failed to hash password");
        sqlx::query(
            r#"
            INSERT INTO users (
                id, realm_id, username, email, email_verified, enabled,
                password_hash, password_changed_at
            )
            VALUES ($1, $2, $3, $4, true, true, $5, NOW())
            "#,
        )
        .bind(id)
        .bind(realm_id)
        .bind(username)
        .bind(format!("{username}@example.com"))
        .bind(hash)
        .execute(&self.db)
        .await
        .expect("failed to seed user");
        id
    }
}

pub fn form_request(path: &str, form: &[(&str, &str)]) -> Request<Body> {
    let body = form
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");

    Request::post(path)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body))
        .expect("failed to build form request")
}

pub async fn response_json(response: Response) -> Value {
    let body = response.into_body().collect().await.expect("failed to read body").to_bytes();
    serde_json::from_slice(&body).unwrap_or_else(|_| {
        let text = String::from_utf8_lossy(&body);
        panic!("response body was not JSON: {text}");
    })
}
