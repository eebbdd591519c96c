use std::sync::Arc;

use crate::auth::TokenService;
use crate::clock::Clock;
use crate::config::Config;
use crate::media::MediaGateway;
use crate::repository::{InvitationKeyManager, RoomRepository};
use crate::rotation::RotationRegistry;
use crate::session::RoomSession;
use crate::store::KvStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub tokens: Arc<TokenService>,
    pub rooms: Arc<RoomRepository>,
    pub keys: Arc<InvitationKeyManager>,
    pub session: RoomSession,
    pub rotations: Arc<RotationRegistry>,
    pub media_gateway: Arc<MediaGateway>,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn KvStore>,
        clock: Arc<dyn Clock>,
        media_gateway: MediaGateway,
    ) -> Self {
        let tokens = Arc::new(TokenService::new(&config, clock.clone()));
        let rooms = Arc::new(RoomRepository::new(store.clone(), tokens.clone()));
        let keys = Arc::new(InvitationKeyManager::new(
            store,
            clock,
            config.invitation_key_ttl(),
        ));
        let session = RoomSession::new(tokens.clone(), rooms.clone(), keys.clone());

        Self {
            config: Arc::new(config),
            tokens,
            rooms,
            keys,
            session,
            rotations: Arc::new(RotationRegistry::new()),
            media_gateway: Arc::new(media_gateway),
        }
    }

    /// Stop every key distribution task.
    pub fn begin_shutdown(&self) {
        self.rotations.cancel_all();
    }
}
