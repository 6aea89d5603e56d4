use murmur_voice::{LiveKitConfig, VoiceError, VoiceService};

const DEFAULT_URL: &str = "http://localhost:7880";
const DEFAULT_KEY: &str = "devkey";
const DEFAULT_SECRET: &str = "secret";

#[derive(serde::Deserialize)]
struct Claims {
    sub: String,
    name: String,
    video: VideoClaims,
}

#[derive(serde::Deserialize)]
struct VideoClaims {
    room: String,
    #[serde(rename = "roomJoin")]
    room_join: bool,
    #[serde(rename = "canPublish")]
    can_publish: bool,
    #[serde(rename = "canSubscribe")]
    can_subscribe: bool,
    #[serde(rename = "canPublishData")]
    can_publish_data: bool,
}

fn decode(token: &str) -> Claims {
    use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_aud = false;
    let key = DecodingKey::from_secret(DEFAULT_SECRET.as_bytes());
    decode::<Claims>(token, &key, &validation)
        .expect("Failed to decode token")
        .claims
}

#[test]
fn test_agent_token_grants() {
    let service = VoiceService::new(LiveKitConfig::new(DEFAULT_URL, DEFAULT_KEY, DEFAULT_SECRET));

    let token = service
        .generate_agent_token("support-room", "agent-support-room", "murmur")
        .expect("Failed to generate token");
    let claims = decode(&token);

    assert_eq!(claims.sub, "agent-support-room");
    assert_eq!(claims.name, "murmur");
    assert_eq!(claims.video.room, "support-room");
    assert!(claims.video.room_join, "roomJoin should be true");
    assert!(claims.video.can_publish, "agent must publish its voice");
    assert!(claims.video.can_subscribe, "agent must hear the room");
    assert!(claims.video.can_publish_data, "canPublishData should be true");
}

#[test]
fn test_agent_token_rejects_empty_room() {
    let service = VoiceService::new(LiveKitConfig::new(DEFAULT_URL, DEFAULT_KEY, DEFAULT_SECRET));

    match service.generate_agent_token(" ", "agent", "murmur") {
        Err(VoiceError::Config(_)) => {}
        other => panic!("Expected Config error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_service_enabled_by_url() {
    let service = VoiceService::new(LiveKitConfig::default());
    assert!(!service.is_enabled());

    let service = VoiceService::new(LiveKitConfig::new(DEFAULT_URL, DEFAULT_KEY, DEFAULT_SECRET));
    assert!(service.is_enabled());
    assert_eq!(service.get_url(), DEFAULT_URL);
}

#[test]
fn test_livekit_config_toml() {
    let toml_str = r#"
        url = "ws://localhost:7880"
        api_key = "key"
        api_secret = "secret"
    "#;

    let config: LiveKitConfig = toml::from_str(toml_str).expect("parse TOML");
    assert_eq!(config.url, "ws://localhost:7880");
    assert_eq!(config.token_ttl_seconds, 3600);
}
