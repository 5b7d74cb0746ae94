//! API routes

pub mod admin;
pub mod auth;
pub mod cron;
pub mod payment;
pub mod sites;
pub mod user;
pub mod webhooks;

use axum::{
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use crate::auth::{require_admin, require_auth, require_cron, AdminState, AuthState, CronAuth};
use crate::state::AppState;

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub fn create_router(state: AppState) -> Router {
    let auth_state = AuthState {
        jwt_manager: state.jwt_manager.clone(),
    };
    let admin_state = AdminState {
        admin_secret: state.config.admin_secret.clone(),
    };
    let cron_auth: CronAuth = state.cron_auth.clone();

    let public = Router::new()
        .route("/health", get(health))
        .route("/api/auth/sign-up", post(auth::sign_up))
        .route("/api/auth/sign-in", post(auth::sign_in))
        .route("/api/soloboard/track/{site_id}", post(sites::track_visit))
        .route(
            "/api/webhooks/creem",
            post(webhooks::creem_webhook).get(webhooks::webhook_info),
        )
        .route("/api/payment/notify/creem", post(webhooks::creem_webhook));

    let protected = Router::new()
        .route("/api/user/me", get(user::me))
        .route(
            "/api/soloboard/sites",
            get(sites::list_sites).post(sites::add_site),
        )
        .route("/api/soloboard/dashboard", get(sites::dashboard))
        .route("/api/payment/checkout", post(payment::create_checkout))
        .layer(middleware::from_fn_with_state(auth_state, require_auth));

    let cron_routes = Router::new()
        .route("/api/cron/sync-sites", get(cron::sync_sites).post(cron::sync_sites))
        .route(
            "/api/cron/system-health-check",
            get(cron::system_health_check).post(cron::system_health_check),
        )
        .layer(middleware::from_fn_with_state(cron_auth, require_cron));

    let admin_routes = Router::new()
        .route("/api/admin/check-payment-status", get(admin::check_payment_status))
        .route("/api/admin/fix-payment", post(admin::fix_payment))
        .route("/api/admin/trigger-webhook", post(admin::trigger_webhook))
        .route("/api/admin/webhooks", get(admin::list_webhooks))
        .layer(middleware::from_fn_with_state(admin_state, require_admin));

    Router::new()
        .merge(public)
        .merge(protected)
        .merge(cron_routes)
        .merge(admin_routes)
        .with_state(state)
}
