//! Transport configuration types

use serde::{Deserialize, Serialize};

use crate::crypto::ChannelKey;

/// Default TCP port a Meshtastic radio listens on
pub const DEFAULT_RADIO_PORT: u16 = 4403;

/// Maximum LoRa payload the firmware will accept
pub const LORA_MAX_PAYLOAD: usize = 237;

/// Byte budget for one outbound text packet
///
/// Conservative margin below [`LORA_MAX_PAYLOAD`] so headers and part
/// markers never push a send over the firmware limit.
pub const MAX_TEXT_PAYLOAD: usize = 200;

/// Settings for the MQTT gateway source
#[derive(Debug, Clone)]
pub struct MqttConfig {
    /// Broker hostname
    pub broker: String,
    /// Broker port
    pub port: u16,
    /// Optional username
    pub username: Option<String>,
    /// Optional password
    pub password: Option<String>,
    /// Root topic to subscribe under (normalised to end in `/#`)
    pub topic: String,
    /// Connect over TLS
    pub use_tls: bool,
    /// Channel PSK for payload decryption, when gateways publish encrypted
    pub psk: Option<ChannelKey>,
}

/// Settings for the radio TCP link
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RadioConfig {
    /// Radio hostname or address
    pub host: String,
    /// Radio TCP port
    pub port: u16,
}

impl RadioConfig {
    /// Config for a radio at `host` on the default port
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_RADIO_PORT,
        }
    }

    /// The `host:port` address to connect to
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_radio_addr() {
        assert_eq!(RadioConfig::new("10.0.0.5").addr(), "10.0.0.5:4403");
    }

    #[test]
    fn test_text_budget_fits_lora() {
        assert!(MAX_TEXT_PAYLOAD < LORA_MAX_PAYLOAD);
    }
}
