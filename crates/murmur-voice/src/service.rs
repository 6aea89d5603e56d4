use crate::config::LiveKitConfig;
use crate::error::VoiceError;
use livekit_api::access_token::{AccessToken, VideoGrants};
use livekit_api::services::room::RoomClient;
use std::time::Duration;

/// Server-side LiveKit access for the agent worker.
///
/// Mints the join tokens agents use to enter rooms and removes agents from
/// rooms when their job ends. Media transport itself is handled by the
/// session runtime.
#[derive(Debug)]
pub struct VoiceService {
    config: LiveKitConfig,
    room_client: RoomClient,
}

impl VoiceService {
    pub fn new(config: LiveKitConfig) -> Self {
        let room_client =
            RoomClient::with_api_key(&config.url, &config.api_key, &config.api_secret);
        Self {
            config,
            room_client,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.config.url.is_empty()
    }

    pub fn get_url(&self) -> &str {
        &self.config.url
    }

    /// Mints a join token for an agent participant.
    ///
    /// Agents subscribe to room audio, publish their synthesized voice and
    /// may publish data messages (transcripts, tool status).
    pub fn generate_agent_token(
        &self,
        room_name: &str,
        agent_identity: &str,
        agent_name: &str,
    ) -> Result<String, VoiceError> {
        if room_name.trim().is_empty() {
            return Err(VoiceError::Config("room name is empty".to_string()));
        }

        let token = AccessToken::with_api_key(&self.config.api_key, &self.config.api_secret)
            .with_identity(agent_identity)
            .with_name(agent_name)
            .with_grants(VideoGrants {
                room_join: true,
                room: room_name.to_string(),
                can_publish: true,
                can_subscribe: true,
                can_publish_data: true,
                ..Default::default()
            })
            .with_ttl(Duration::from_secs(self.config.token_ttl_seconds));

        token.to_jwt().map_err(VoiceError::LiveKit)
    }

    pub async fn remove_participant(&self, room: &str, identity: &str) -> Result<(), VoiceError> {
        self.room_client
            .remove_participant(room, identity)
            .await
            .map_err(|e| VoiceError::RoomService(e.to_string()))
    }
}
