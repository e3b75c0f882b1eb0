//! Environment-sourced configuration
//!
//! Every knob is a CLI flag backed by an environment variable, so container
//! deployments configure the bridge purely through the environment.
//! Validation fails fast at startup with a message naming what is missing.

use std::time::Duration;

use clap::Parser;

use meshlink_core::{BridgeOptions, ChannelFilter, MeshlinkError, RetentionPolicy};
use meshlink_matrix::MatrixConfig;
use meshlink_meshtastic::{ChannelKey, MqttConfig, RadioConfig};

/// Bridge a Meshtastic mesh network into a Matrix room
#[derive(Parser, Debug)]
#[command(name = "meshlink-bridge", version)]
pub struct Settings {
    /// Matrix homeserver URL
    #[arg(long, env = "MATRIX_HOMESERVER")]
    pub matrix_homeserver: Option<String>,

    /// Matrix user id for the bridge account
    #[arg(long, env = "MATRIX_USER")]
    pub matrix_user: Option<String>,

    /// Matrix password (a syt_ value is treated as an access token)
    #[arg(long, env = "MATRIX_PASSWORD", hide_env_values = true)]
    pub matrix_password: Option<String>,

    /// Matrix access token, used instead of a password when set
    #[arg(long, env = "MATRIX_TOKEN", hide_env_values = true)]
    pub matrix_token: Option<String>,

    /// Room id or #alias to bridge
    #[arg(long, env = "MATRIX_ROOM")]
    pub matrix_room: Option<String>,

    /// MQTT broker hostname; enables the gateway source
    #[arg(long, env = "MQTT_BROKER")]
    pub mqtt_broker: Option<String>,

    /// MQTT broker port
    #[arg(long, env = "MQTT_PORT", default_value_t = 1883)]
    pub mqtt_port: u16,

    /// MQTT username
    #[arg(long, env = "MQTT_USER")]
    pub mqtt_user: Option<String>,

    /// MQTT password
    #[arg(long, env = "MQTT_PASSWORD", hide_env_values = true)]
    pub mqtt_password: Option<String>,

    /// Root MQTT topic the gateways publish under
    #[arg(long, env = "MQTT_TOPIC", default_value = "msh")]
    pub mqtt_topic: String,

    /// Connect to the broker over TLS
    #[arg(long, env = "MQTT_TLS", default_value_t = false)]
    pub mqtt_tls: bool,

    /// Base64 channel PSK for decrypting gateway traffic
    #[arg(long, env = "MQTT_PSK", hide_env_values = true)]
    pub mqtt_psk: Option<String>,

    /// Radio hostname; enables the LAN source and Matrix→mesh sending
    #[arg(long, env = "MESHTASTIC_HOST")]
    pub meshtastic_host: Option<String>,

    /// Radio TCP port
    #[arg(long, env = "MESHTASTIC_PORT", default_value_t = 4403)]
    pub meshtastic_port: u16,

    /// Default channel index for Matrix-originated sends
    #[arg(long, env = "MESHTASTIC_CHANNEL_IDX", default_value_t = 0)]
    pub meshtastic_channel_idx: u32,

    /// Comma-separated channel allow-list (indices and/or names);
    /// empty bridges channel 0 only
    #[arg(long, env = "MESHTASTIC_CHANNELS", default_value = "")]
    pub meshtastic_channels: String,

    /// SQLite database path
    #[arg(long, env = "NODE_DB_PATH", default_value = "meshlink.db")]
    pub node_db_path: String,

    /// Maximum idle age of a message state before eviction, in seconds
    #[arg(long, env = "MESSAGE_STATE_MAX_AGE_SEC", default_value_t = 86_400)]
    pub message_state_max_age_sec: u64,

    /// Maximum number of message states kept in memory
    #[arg(long, env = "MESSAGE_STATE_MAX_SIZE", default_value_t = 10_000)]
    pub message_state_max_size: usize,

    /// Enable debug logging
    #[arg(long, short, env = "MESHLINK_VERBOSE")]
    pub verbose: bool,
}

impl Settings {
    /// Check the required/either-or constraints, returning a human-readable
    /// error when they do not hold
    pub fn validate(&self) -> Result<(), MeshlinkError> {
        let mut missing = Vec::new();
        if self.matrix_homeserver.is_none() {
            missing.push("MATRIX_HOMESERVER");
        }
        if self.matrix_user.is_none() {
            missing.push("MATRIX_USER");
        }
        if self.matrix_password.is_none() && self.matrix_token.is_none() {
            missing.push("MATRIX_PASSWORD or MATRIX_TOKEN");
        }
        if self.matrix_room.is_none() {
            missing.push("MATRIX_ROOM");
        }
        if !missing.is_empty() {
            return Err(MeshlinkError::MissingConfig(missing.join(", ")));
        }
        if self.mqtt_broker.is_none() && self.meshtastic_host.is_none() {
            return Err(MeshlinkError::InvalidConfig(
                "at least one mesh source is required: set MQTT_BROKER and/or MESHTASTIC_HOST"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Matrix collaborator settings
    pub fn matrix_config(&self) -> MatrixConfig {
        MatrixConfig {
            homeserver: self.matrix_homeserver.clone().unwrap_or_default(),
            user: self.matrix_user.clone().unwrap_or_default(),
            password: self.matrix_password.clone(),
            token: self.matrix_token.clone(),
            room: self.matrix_room.clone().unwrap_or_default(),
        }
    }

    /// MQTT source settings, when a broker is configured
    pub fn mqtt_config(&self) -> Result<Option<MqttConfig>, MeshlinkError> {
        let Some(broker) = self.mqtt_broker.clone() else {
            return Ok(None);
        };
        let psk = match &self.mqtt_psk {
            Some(psk) => Some(ChannelKey::from_base64(psk).map_err(|e| {
                MeshlinkError::InvalidConfig(format!("invalid MQTT_PSK: {}", e))
            })?),
            None => None,
        };
        Ok(Some(MqttConfig {
            broker,
            port: self.mqtt_port,
            username: self.mqtt_user.clone(),
            password: self.mqtt_password.clone(),
            topic: self.mqtt_topic.clone(),
            use_tls: self.mqtt_tls,
            psk,
        }))
    }

    /// Radio settings, when a host is configured
    pub fn radio_config(&self) -> Option<RadioConfig> {
        self.meshtastic_host.as_ref().map(|host| RadioConfig {
            host: host.clone(),
            port: self.meshtastic_port,
        })
    }

    /// Coordinator settings
    pub fn bridge_options(&self) -> BridgeOptions {
        BridgeOptions {
            channels: ChannelFilter::parse(&self.meshtastic_channels),
            outbound_channel: self.meshtastic_channel_idx,
            retention: RetentionPolicy {
                max_age: Duration::from_secs(self.message_state_max_age_sec),
                max_size: self.message_state_max_size,
                ..RetentionPolicy::default()
            },
            ..BridgeOptions::default()
        }
    }
}
