// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{answer, auth, course, quiz, stats},
    state::AppState,
    utils::jwt::auth_middleware,
};

/// Assembles the main application router.
///
/// * Auth routes are public, everything else sits behind `auth_middleware`.
/// * Applies global middleware (Trace, CORS).
/// * Injects global state (pool, config, quiz generator).
pub fn create_router(state: AppState) -> Router {
    let origins = [
        HeaderValue::from_static("http://localhost:3000"),
        HeaderValue::from_static("http://127.0.0.1:3000"),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let auth_layer = middleware::from_fn_with_state(state.clone(), auth_middleware);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .merge(
            Router::new()
                .route("/me", get(auth::me))
                .layer(auth_layer.clone()),
        );

    let course_routes = Router::new()
        .route("/", get(course::list_my_courses).post(course::create_course))
        .route("/join", post(course::join_course))
        .route("/{id}", get(course::get_course))
        .route("/{id}/members", get(course::list_members))
        .route("/{id}/speakers", post(course::add_speaker))
        .route(
            "/{id}/quizzes",
            get(quiz::list_course_quizzes).post(quiz::create_quiz),
        )
        .route("/{id}/quizzes/generate", post(quiz::generate_questions))
        .layer(auth_layer.clone());

    let quiz_routes = Router::new()
        .route("/{id}", get(quiz::get_quiz))
        .route("/{id}/start", post(quiz::start_quiz))
        .route("/{id}/stop", post(quiz::stop_quiz))
        .route(
            "/{id}/answers",
            get(answer::list_my_answers).post(answer::submit_answer),
        )
        .route("/{id}/ranking", get(stats::get_ranking))
        .route("/{id}/ranking/me", get(stats::get_my_ranking))
        .route("/{id}/statistics", get(stats::get_statistics))
        .layer(auth_layer);

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/courses", course_routes)
        .nest("/api/quizzes", quiz_routes)
        // Global Middleware (outermost first)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
