use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, patch, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn availability_routes(state: Arc<AppConfig>) -> Router {
    // Patients browse a doctor's schedule without authenticating
    let public_routes = Router::new().route(
        "/doctors/{doctor_id}",
        get(handlers::get_doctor_availability),
    );

    let protected_routes = Router::new()
        .route("/", post(handlers::create_availability))
        .route("/slots/{slot_id}", patch(handlers::update_slot))
        .route("/slots/{slot_id}", delete(handlers::delete_slot))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
