// tests/router_tests.rs

//! Router checks driven in-process with `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use chrono::Utc;
use qcm_backend::{
    config::Config,
    create_router,
    notify::LogNotifier,
    state::AppState,
    store::MemoryStore,
    utils::{
        clock::ManualClock,
        jwt::{ROLE_CANDIDATE, sign_jwt},
    },
};
use tower::ServiceExt;

const SECRET: &str = "router_test_secret";

fn app() -> axum::Router {
    create_router(AppState {
        store: Arc::new(MemoryStore::new()),
        clock: Arc::new(ManualClock::new(Utc::now())),
        notifier: Arc::new(LogNotifier),
        config: Config::for_tests(SECRET),
    })
}

#[tokio::test]
async fn health_answers_without_a_token() {
    let res = app()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn candidate_routes_reject_a_forged_token() {
    let forged = sign_jwt(3, ROLE_CANDIDATE, "not_the_secret", 600).unwrap();
    let res = app()
        .oneshot(
            Request::builder()
                .uri("/api/qcm/sessions")
                .header(header::AUTHORIZATION, format!("Bearer {}", forged))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn token_subject_must_be_a_candidate_id() {
    // Valid signature, but `sub` is not numeric.
    let claims = qcm_backend::utils::jwt::Claims {
        sub: "alice".to_string(),
        role: ROLE_CANDIDATE.to_string(),
        exp: (Utc::now().timestamp() + 600) as usize,
    };
    let token = jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap();

    let res = app()
        .oneshot(
            Request::builder()
                .uri("/api/qcm/results")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn empty_bank_lists_no_sessions() {
    let token = sign_jwt(3, ROLE_CANDIDATE, SECRET, 600).unwrap();
    let res = app()
        .oneshot(
            Request::builder()
                .uri("/api/qcm/sessions")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn unknown_roles_cannot_take_sessions() {
    let token = sign_jwt(3, "guest", SECRET, 600).unwrap();
    let res = app()
        .oneshot(
            Request::builder()
                .uri("/api/qcm/sessions")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn categories_are_listed_for_any_signed_in_user() {
    let token = sign_jwt(3, ROLE_CANDIDATE, SECRET, 600).unwrap();
    let res = app()
        .oneshot(
            Request::builder()
                .uri("/api/qcm/categories")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}
