use axum::{
    Router,
    body::Body,
    extract::FromRequestParts,
    http::{Method, Request, StatusCode, Uri, header, request::Parts},
    middleware,
    routing::get,
};
use clinic_actions::{
    ApiError, AppState, InMemoryRepository,
    auth::{
        Claims, LOCAL_ACTOR_HEADER, authenticate_doctor, authenticate_patient,
        authenticate_receptionist,
    },
    config::{AppConfig, Env},
    models::{Actor, Role},
};
use jsonwebtoken::{EncodingKey, Header, encode};
use std::{sync::Arc, time::SystemTime};
use tower::ServiceExt;

// --- Helper Functions ---

const TEST_JWT_SECRET: &str = "test-secret-value-1234567890";

fn now() -> i64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
}

fn create_token(actor_id: &str, exp_offset: i64, secret: &str) -> String {
    let now = now();
    let claims = Claims {
        sub: actor_id.to_string(),
        iat: now as usize,
        exp: (now + exp_offset) as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

fn create_app_state(env: Env) -> AppState {
    let mut config = AppConfig::default();
    config.env = env;
    config.jwt_secret = TEST_JWT_SECRET.to_string();

    let repo = InMemoryRepository::with_actors([
        Actor::new("patient-1", "Pat", Role::Patient),
        Actor::new("doctor-1", "Doc", Role::Doctor),
        Actor::new("receptionist-1", "Rita", Role::Receptionist),
    ]);

    AppState {
        repo: Arc::new(repo),
        config,
    }
}

fn get_request_parts(method: Method, uri: Uri) -> Parts {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    let (parts, _) = request.into_parts();
    parts
}

fn with_bearer(parts: &mut Parts, token: &str) {
    parts.headers.insert(
        header::AUTHORIZATION,
        header::HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
    );
}

fn assert_unauthorized(result: Result<Actor, ApiError>) {
    match result {
        Err(err) => assert_eq!(err.status(), StatusCode::UNAUTHORIZED),
        Ok(actor) => panic!("expected rejection, got {actor:?}"),
    }
}

// --- Actor extractor ---

#[tokio::test]
async fn valid_token_resolves_the_stored_actor() {
    let state = create_app_state(Env::Production);
    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    with_bearer(&mut parts, &create_token("doctor-1", 3600, TEST_JWT_SECRET));

    let actor = Actor::from_request_parts(&mut parts, &state).await.unwrap();
    assert_eq!(actor.id, "doctor-1");
    assert_eq!(actor.role, Role::Doctor);
}

#[tokio::test]
async fn missing_header_is_rejected() {
    let state = create_app_state(Env::Production);
    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());

    assert_unauthorized(Actor::from_request_parts(&mut parts, &state).await);
}

#[tokio::test]
async fn non_bearer_scheme_is_rejected() {
    let state = create_app_state(Env::Production);
    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    parts.headers.insert(
        header::AUTHORIZATION,
        header::HeaderValue::from_static("Basic ZG9jdG9yOnB3"),
    );

    assert_unauthorized(Actor::from_request_parts(&mut parts, &state).await);
}

#[tokio::test]
async fn expired_token_is_rejected() {
    let state = create_app_state(Env::Production);
    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    // Well past the default 60s leeway.
    with_bearer(&mut parts, &create_token("doctor-1", -3600, TEST_JWT_SECRET));

    assert_unauthorized(Actor::from_request_parts(&mut parts, &state).await);
}

#[tokio::test]
async fn token_signed_with_another_secret_is_rejected() {
    let state = create_app_state(Env::Production);
    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    with_bearer(&mut parts, &create_token("doctor-1", 3600, "someone-elses-secret"));

    assert_unauthorized(Actor::from_request_parts(&mut parts, &state).await);
}

#[tokio::test]
async fn token_for_a_deleted_actor_is_rejected() {
    let state = create_app_state(Env::Production);
    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    with_bearer(&mut parts, &create_token("former-patient", 3600, TEST_JWT_SECRET));

    assert_unauthorized(Actor::from_request_parts(&mut parts, &state).await);
}

#[tokio::test]
async fn local_bypass_success() {
    let state = create_app_state(Env::Local);
    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    parts.headers.insert(
        header::HeaderName::from_static(LOCAL_ACTOR_HEADER),
        header::HeaderValue::from_static("receptionist-1"),
    );

    let actor = Actor::from_request_parts(&mut parts, &state).await.unwrap();
    assert_eq!(actor.role, Role::Receptionist);
}

#[tokio::test]
async fn local_bypass_disabled_in_prod() {
    let state = create_app_state(Env::Production);
    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    parts.headers.insert(
        header::HeaderName::from_static(LOCAL_ACTOR_HEADER),
        header::HeaderValue::from_static("doctor-1"),
    );

    assert_unauthorized(Actor::from_request_parts(&mut parts, &state).await);
}

#[tokio::test]
async fn actor_in_extensions_short_circuits_resolution() {
    let state = create_app_state(Env::Production);
    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    parts
        .extensions
        .insert(Actor::new("patient-1", "Pat", Role::Patient));

    let actor = Actor::from_request_parts(&mut parts, &state).await.unwrap();
    assert_eq!(actor.id, "patient-1");
}

// --- Single-role guards ---

fn guarded_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/patient",
            get(|actor: Actor| async move { actor.id })
                .route_layer(middleware::from_fn_with_state(state.clone(), authenticate_patient)),
        )
        .route(
            "/doctor",
            get(|actor: Actor| async move { actor.id })
                .route_layer(middleware::from_fn_with_state(state.clone(), authenticate_doctor)),
        )
        .route(
            "/receptionist",
            get(|actor: Actor| async move { actor.id }).route_layer(
                middleware::from_fn_with_state(state.clone(), authenticate_receptionist),
            ),
        )
        .with_state(state)
}

#[tokio::test]
async fn single_role_guards_admit_only_their_role() {
    let state = create_app_state(Env::Production);
    let router = guarded_router(state);

    let expectations = [
        ("/patient", "patient-1", StatusCode::OK),
        ("/patient", "doctor-1", StatusCode::FORBIDDEN),
        ("/doctor", "doctor-1", StatusCode::OK),
        ("/doctor", "receptionist-1", StatusCode::FORBIDDEN),
        ("/receptionist", "receptionist-1", StatusCode::OK),
        ("/receptionist", "patient-1", StatusCode::FORBIDDEN),
    ];

    for (path, actor_id, expected) in expectations {
        let request = Request::builder()
            .uri(path)
            .header(
                header::AUTHORIZATION,
                format!("Bearer {}", create_token(actor_id, 3600, TEST_JWT_SECRET)),
            )
            .body(Body::empty())
            .unwrap();
        let response = router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), expected, "{actor_id} on {path}");
    }
}
