//! Factory options and peer connection configuration.
//!
//! `ConnectionConfig` is pure data supplied by the host. It is translated once, at
//! connection-creation time, into the engine's `RTCConfiguration`.

use serde::{Deserialize, Serialize};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;

use crate::error::{Result, RtcError};

/// Options for [`create_factory_with`](crate::create_factory_with).
#[derive(Debug, Clone)]
pub struct FactoryOptions {
    /// Name of the thread that owns socket I/O
    pub network_thread_name: String,
    /// Name of the thread that delivers observer callbacks
    pub signaling_thread_name: String,
    /// Name of the thread that owns device work
    pub worker_thread_name: String,
    /// Log filter used when `RUST_LOG` is not set
    pub log_filter: Option<String>,
}

impl Default for FactoryOptions {
    fn default() -> Self {
        Self {
            network_thread_name: "rtc-network".to_string(),
            signaling_thread_name: "rtc-signaling".to_string(),
            worker_thread_name: "rtc-worker".to_string(),
            log_filter: Some("info".to_string()),
        }
    }
}

/// SDP semantics mode. Values are the FFI encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum SdpSemantics {
    PlanB = 0,
    #[default]
    UnifiedPlan = 1,
}

impl SdpSemantics {
    /// Decode the FFI value.
    pub fn from_raw(value: u32) -> Option<Self> {
        match value {
            0 => Some(SdpSemantics::PlanB),
            1 => Some(SdpSemantics::UnifiedPlan),
            _ => None,
        }
    }
}

/// One ICE (STUN/TURN) server.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IceServerDescriptor {
    pub urls: Vec<String>,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl IceServerDescriptor {
    /// Create a STUN-only server descriptor
    pub fn stun(url: &str) -> Self {
        Self {
            urls: vec![url.to_string()],
            ..Default::default()
        }
    }

    /// Create a TURN server descriptor with credentials
    pub fn turn(url: &str, username: &str, password: &str) -> Self {
        Self {
            urls: vec![url.to_string()],
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    fn to_rtc_ice_server(&self) -> RTCIceServer {
        RTCIceServer {
            urls: self.urls.clone(),
            username: self.username.clone(),
            credential: self.password.clone(),
            ..Default::default()
        }
    }
}

/// Default Google STUN servers
pub fn google_stun_servers() -> Vec<IceServerDescriptor> {
    vec![
        IceServerDescriptor::stun("stun:stun.l.google.com:19302"),
        IceServerDescriptor::stun("stun:stun1.l.google.com:19302"),
    ]
}

/// Host-side connection configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default)]
    pub sdp_semantics: SdpSemantics,
    #[serde(default)]
    pub ice_servers: Vec<IceServerDescriptor>,
}

impl ConnectionConfig {
    /// Parse a JSON document such as
    /// `{"sdp_semantics":"unified_plan","ice_servers":[{"urls":["stun:..."]}]}`.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| RtcError::InvalidArgument(format!("connection config: {}", e)))
    }
}

/// The engine-shaped configuration produced from a [`ConnectionConfig`].
#[derive(Clone, Default)]
pub struct NativeConfiguration {
    pub sdp_semantics: SdpSemantics,
    pub rtc: RTCConfiguration,
}

impl NativeConfiguration {
    /// Translate a host configuration. Every ICE server descriptor yields exactly one
    /// engine entry, in order.
    pub fn translate(config: &ConnectionConfig) -> Self {
        let mut ice_servers = Vec::with_capacity(config.ice_servers.len());
        for server in &config.ice_servers {
            ice_servers.push(server.to_rtc_ice_server());
        }

        Self {
            sdp_semantics: config.sdp_semantics,
            rtc: RTCConfiguration {
                ice_servers,
                ..Default::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translate_keeps_every_ice_server() {
        let config = ConnectionConfig {
            sdp_semantics: SdpSemantics::UnifiedPlan,
            ice_servers: vec![
                IceServerDescriptor::stun("stun:stun.l.google.com:19302"),
                IceServerDescriptor::turn("turn:turn.example.org:3478", "alice", "secret"),
                IceServerDescriptor {
                    urls: vec![
                        "turn:relay.example.org:3478?transport=udp".to_string(),
                        "turns:relay.example.org:5349".to_string(),
                    ],
                    username: "bob".to_string(),
                    password: "hunter2".to_string(),
                },
            ],
        };

        let native = NativeConfiguration::translate(&config);

        assert_eq!(native.rtc.ice_servers.len(), 3);
        for (descriptor, entry) in config.ice_servers.iter().zip(&native.rtc.ice_servers) {
            assert_eq!(entry.urls, descriptor.urls);
            assert_eq!(entry.username, descriptor.username);
            assert_eq!(entry.credential, descriptor.password);
        }
        assert_eq!(native.sdp_semantics, SdpSemantics::UnifiedPlan);
    }

    #[test]
    fn test_translate_empty_and_large_lists() {
        assert!(NativeConfiguration::translate(&ConnectionConfig::default())
            .rtc
            .ice_servers
            .is_empty());

        let config = ConnectionConfig {
            sdp_semantics: SdpSemantics::PlanB,
            ice_servers: (0..17)
                .map(|i| IceServerDescriptor::stun(&format!("stun:stun{}.example.org:3478", i)))
                .collect(),
        };
        let native = NativeConfiguration::translate(&config);
        assert_eq!(native.rtc.ice_servers.len(), 17);
        assert_eq!(native.rtc.ice_servers[16].urls[0], "stun:stun16.example.org:3478");
        assert_eq!(native.sdp_semantics, SdpSemantics::PlanB);
    }

    #[test]
    fn test_config_from_json() {
        let json = r#"{
            "sdp_semantics": "plan_b",
            "ice_servers": [
                {"urls": ["stun:stun.l.google.com:19302"]},
                {"urls": ["turn:turn.example.org:3478"], "username": "u", "password": "p"}
            ]
        }"#;
        let config = ConnectionConfig::from_json(json).unwrap();
        assert_eq!(config.sdp_semantics, SdpSemantics::PlanB);
        assert_eq!(config.ice_servers.len(), 2);
        assert_eq!(config.ice_servers[0].password, "");
        assert_eq!(
            config.ice_servers[1],
            IceServerDescriptor::turn("turn:turn.example.org:3478", "u", "p")
        );

        let defaults = ConnectionConfig::from_json("{}").unwrap();
        assert_eq!(defaults.sdp_semantics, SdpSemantics::UnifiedPlan);
        assert!(defaults.ice_servers.is_empty());

        assert!(matches!(
            ConnectionConfig::from_json("{\"ice_servers\": 3}"),
            Err(RtcError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_sdp_semantics_raw_values() {
        assert_eq!(SdpSemantics::from_raw(0), Some(SdpSemantics::PlanB));
        assert_eq!(SdpSemantics::from_raw(1), Some(SdpSemantics::UnifiedPlan));
        assert_eq!(SdpSemantics::from_raw(7), None);
        assert_eq!(SdpSemantics::UnifiedPlan as u32, 1);
    }

    #[test]
    fn test_google_stun_servers() {
        let servers = google_stun_servers();
        assert_eq!(servers.len(), 2);
        assert!(servers.iter().all(|s| s.urls[0].starts_with("stun:")));
    }
}
