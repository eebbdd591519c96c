pub mod health;
pub mod key_updates;
pub mod rooms;
pub mod signalling;

use axum::Router;

use crate::config::KeyRotationMode;
use crate::state::AppState;
use crate::ws::ws_routes;

/// Create the router with every route for the configured rotation mode
pub fn create_router(state: AppState) -> Router {
    let key_distribution = match state.config.key_rotation_mode {
        KeyRotationMode::Push => ws_routes(),
        KeyRotationMode::Poll => key_updates::key_update_routes(),
    };

    Router::new()
        .merge(rooms::room_routes())
        .merge(signalling::signalling_routes())
        .merge(key_distribution)
        .merge(health::health_routes())
        .with_state(state)
}
