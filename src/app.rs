use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::auth::{self, AuthService};
use crate::parking;
use crate::sites;
use crate::store::ParkingStore;

#[derive(Clone)]
pub struct AppState {
    pub store: ParkingStore,
    pub auth: AuthService,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        // Auth routes
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/admin/users", post(auth::create_user))
        // Registry routes
        .route("/entrances", get(sites::list_entrances))
        .route("/lots", get(sites::list_lots).post(sites::create_lot))
        .route(
            "/buildings",
            get(sites::list_buildings).post(sites::create_building),
        )
        .route(
            "/sites/:id",
            put(sites::update_site).delete(sites::delete_site),
        )
        // Parking routes
        .route("/park", post(parking::park))
        .route("/unpark", post(parking::unpark))
        .route("/vehicles", get(parking::list_vehicles))
        // Health check
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
