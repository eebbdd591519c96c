use std::sync::{Arc, Weak};

use dashmap::DashMap;
use tokio::sync::Mutex;
use uuid::Uuid;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::api::setting_engine::SettingEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{
    RTCRtpCodecCapability, RTCRtpCodecParameters, RTPCodecType,
};

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::SessionAnswer;

/// Peer connections negotiated for one room, keyed by session id
#[derive(Default)]
pub struct RoomMedia {
    pub peers: DashMap<String, Arc<RTCPeerConnection>>,
}

type RoomMap = DashMap<String, Arc<RoomMedia>>;

/// Answers client offers with the `webrtc` crate
pub struct MediaGateway {
    rooms: Arc<RoomMap>,
    ice_servers: Vec<RTCIceServer>,
    api: Arc<webrtc::api::API>,
}

impl MediaGateway {
    pub fn new(config: &Config) -> Result<Self> {
        let mut media_engine = MediaEngine::default();

        // Audio (Opus)
        media_engine.register_codec(
            RTCRtpCodecParameters {
                capability: RTCRtpCodecCapability {
                    mime_type: MIME_TYPE_OPUS.to_owned(),
                    clock_rate: 48000,
                    channels: 2,
                    sdp_fmtp_line: "minptime=10;useinbandfec=1".to_owned(),
                    rtcp_feedback: vec![],
                },
                payload_type: 111,
                ..Default::default()
            },
            RTPCodecType::Audio,
        )?;

        // Video (VP8)
        media_engine.register_codec(
            RTCRtpCodecParameters {
                capability: RTCRtpCodecCapability {
                    mime_type: MIME_TYPE_VP8.to_owned(),
                    clock_rate: 90000,
                    channels: 0,
                    sdp_fmtp_line: String::new(),
                    rtcp_feedback: vec![],
                },
                payload_type: 96,
                ..Default::default()
            },
            RTPCodecType::Video,
        )?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .with_setting_engine(SettingEngine::default())
            .build();

        Ok(Self {
            rooms: Arc::new(DashMap::new()),
            ice_servers: ice_servers(config),
            api: Arc::new(api),
        })
    }

    pub fn is_healthy(&self) -> bool {
        !self.ice_servers.is_empty()
    }

    fn get_or_create_room(&self, room_id: &str) -> Arc<RoomMedia> {
        self.rooms
            .entry(room_id.to_string())
            .or_default()
            .clone()
    }

    fn create_config(&self) -> RTCConfiguration {
        RTCConfiguration {
            ice_servers: self.ice_servers.clone(),
            ..Default::default()
        }
    }

    /// Register a peer under its room. The peer removes itself once it
    /// disconnects, fails or closes; an emptied room is dropped with it.
    fn track_peer(
        &self,
        room_id: &str,
        session_id: &str,
        peer_connection: Arc<RTCPeerConnection>,
    ) {
        let rooms: Weak<RoomMap> = Arc::downgrade(&self.rooms);
        let room = room_id.to_string();
        let session = session_id.to_string();

        peer_connection.on_peer_connection_state_change(Box::new(
            move |state: RTCPeerConnectionState| {
                tracing::info!(
                    room_id = %room,
                    session_id = %session,
                    state = ?state,
                    "Peer connection state changed"
                );

                let ended = matches!(
                    state,
                    RTCPeerConnectionState::Failed
                        | RTCPeerConnectionState::Disconnected
                        | RTCPeerConnectionState::Closed
                );
                let released = match rooms.upgrade() {
                    Some(rooms) if ended => release_peer(&rooms, &room, &session),
                    _ => None,
                };

                // Closing re-enters this handler with `Closed`, so it runs apart
                if let Some(peer) = released.filter(|_| state != RTCPeerConnectionState::Closed) {
                    tokio::spawn(async move {
                        if let Err(e) = peer.close().await {
                            tracing::warn!(error = %e, "Failed to close released peer connection");
                        }
                    });
                }

                Box::pin(async {})
            },
        ));

        self.get_or_create_room(room_id)
            .peers
            .insert(session_id.to_string(), peer_connection);
    }

    /// Negotiate an answer for a client offer.
    ///
    /// Waits for ICE gathering to finish, so the returned SDP already embeds
    /// the candidates; they are also returned separately for trickle clients.
    pub async fn create_answer(&self, room_id: &str, offer_sdp: &str) -> Result<SessionAnswer> {
        let offer = RTCSessionDescription::offer(offer_sdp.to_string())?;

        let peer_connection = Arc::new(self.api.new_peer_connection(self.create_config()).await?);
        let session_id = Uuid::new_v4().to_string();

        let candidates: Arc<Mutex<Vec<RTCIceCandidateInit>>> = Arc::new(Mutex::new(Vec::new()));
        let gathered = candidates.clone();
        peer_connection.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let gathered = gathered.clone();
            Box::pin(async move {
                // `None` marks the end of gathering
                let Some(candidate) = candidate else { return };
                match candidate.to_json() {
                    Ok(init) => gathered.lock().await.push(init),
                    Err(e) => tracing::warn!(error = %e, "Failed to serialize ICE candidate"),
                }
            })
        }));

        self.track_peer(room_id, &session_id, peer_connection.clone());

        let negotiated = match self.negotiate(&peer_connection, offer).await {
            Ok(()) => peer_connection
                .local_description()
                .await
                .ok_or_else(|| AppError::WebRtcError("No local description".to_string())),
            Err(e) => Err(e),
        };
        let local_desc = match negotiated {
            Ok(desc) => desc,
            Err(e) => {
                release_peer(&self.rooms, room_id, &session_id);
                let _ = peer_connection.close().await;
                return Err(e);
            }
        };

        let candidates = candidates.lock().await.clone();
        tracing::info!(
            room_id = %room_id,
            session_id = %session_id,
            candidates = candidates.len(),
            "Answer created"
        );

        Ok(SessionAnswer {
            sdp: local_desc.sdp,
            candidates,
        })
    }

    async fn negotiate(
        &self,
        peer_connection: &RTCPeerConnection,
        offer: RTCSessionDescription,
    ) -> Result<()> {
        peer_connection.set_remote_description(offer).await?;

        let answer = peer_connection.create_answer(None).await?;
        let mut gather_complete = peer_connection.gathering_complete_promise().await;
        peer_connection.set_local_description(answer).await?;
        let _ = gather_complete.recv().await;

        Ok(())
    }

    /// Close every peer connection negotiated for a room.
    pub async fn close_room(&self, room_id: &str) {
        let Some((_, room)) = self.rooms.remove(room_id) else {
            return;
        };

        let peers: Vec<_> = room.peers.iter().map(|e| e.value().clone()).collect();
        room.peers.clear();
        for peer in peers {
            if let Err(e) = peer.close().await {
                tracing::warn!(room_id = %room_id, error = %e, "Failed to close peer connection");
            }
        }

        tracing::info!(room_id = %room_id, "Room media closed");
    }

    /// Close every room (shutdown).
    pub async fn close_all(&self) {
        let room_ids: Vec<String> = self.rooms.iter().map(|e| e.key().clone()).collect();
        for room_id in room_ids {
            self.close_room(&room_id).await;
        }
    }

    pub fn peer_count(&self, room_id: &str) -> usize {
        self.rooms
            .get(room_id)
            .map(|r| r.peers.len())
            .unwrap_or(0)
    }
}

/// Forget one peer; drop its room when no peers remain.
fn release_peer(
    rooms: &RoomMap,
    room_id: &str,
    session_id: &str,
) -> Option<Arc<RTCPeerConnection>> {
    let released = rooms
        .get(room_id)
        .and_then(|room| room.peers.remove(session_id).map(|(_, peer)| peer));
    rooms.remove_if(room_id, |_, room| room.peers.is_empty());
    released
}

fn ice_servers(config: &Config) -> Vec<RTCIceServer> {
    let mut servers = vec![RTCIceServer {
        urls: vec![config.stun_server.clone()],
        ..Default::default()
    }];

    if let Some(turn_server) = &config.turn_server {
        servers.push(RTCIceServer {
            urls: vec![turn_server.clone()],
            username: config.turn_username.clone().unwrap_or_default(),
            credential: config.turn_credential.clone().unwrap_or_default(),
            ..Default::default()
        });
    }

    servers
}
