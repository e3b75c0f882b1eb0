//! Bridge configuration types
//!
//! Plain data carried from the environment into the core. Transport-specific
//! settings live with their transports; these are the knobs the coordinator
//! itself consumes.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default retention age for message states (24 hours)
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(86_400);

/// Default retention cap on the number of message states
pub const DEFAULT_MAX_SIZE: usize = 10_000;

/// Default interval between eviction sweeps
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(3_600);

/// Window within which an emoji-only packet may be correlated to the last
/// seen packet on its channel
pub const DEFAULT_CORRELATION_WINDOW: Duration = Duration::from_secs(600);

/// One entry of the channel allow-list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChannelSelector {
    /// Match by channel index
    Index(u32),
    /// Match by channel name
    Name(String),
}

/// Admission filter for inbound mesh packets
///
/// Packets whose channel index or name is not on the list produce no side
/// effects at all. An empty configuration admits channel 0 only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelFilter {
    allowed: Vec<ChannelSelector>,
}

impl ChannelFilter {
    /// Build a filter from explicit selectors; empty means channel 0 only
    pub fn new(mut allowed: Vec<ChannelSelector>) -> Self {
        if allowed.is_empty() {
            allowed.push(ChannelSelector::Index(0));
        }
        Self { allowed }
    }

    /// Parse the comma-separated form used in configuration, mixing indices
    /// and names: `"0,2,LongFast"`.
    pub fn parse(list: &str) -> Self {
        let allowed = list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| match s.parse::<u32>() {
                Ok(idx) => ChannelSelector::Index(idx),
                Err(_) => ChannelSelector::Name(s.to_string()),
            })
            .collect();
        Self::new(allowed)
    }

    /// Whether a packet on `index` (optionally with a known channel name)
    /// passes admission
    pub fn permits(&self, index: u32, name: Option<&str>) -> bool {
        self.allowed.iter().any(|sel| match sel {
            ChannelSelector::Index(i) => *i == index,
            ChannelSelector::Name(n) => name.is_some_and(|candidate| candidate == n),
        })
    }
}

impl Default for ChannelFilter {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

/// Retention policy for the message-state store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// States idle longer than this are evicted
    pub max_age: Duration,
    /// Hard cap on the number of states; oldest evicted first beyond it
    pub max_size: usize,
    /// How often the eviction sweep runs
    pub sweep_interval: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_age: DEFAULT_MAX_AGE,
            max_size: DEFAULT_MAX_SIZE,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

/// Settings consumed by the bridge coordinator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeOptions {
    /// Channel admission filter
    pub channels: ChannelFilter,
    /// Default outbound channel index for Matrix-originated sends
    pub outbound_channel: u32,
    /// Retention policy
    pub retention: RetentionPolicy,
    /// Emoji-only correlation window
    #[serde(default = "default_window")]
    pub correlation_window: Duration,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            channels: ChannelFilter::default(),
            outbound_channel: 0,
            retention: RetentionPolicy::default(),
            correlation_window: DEFAULT_CORRELATION_WINDOW,
        }
    }
}

fn default_window() -> Duration {
    DEFAULT_CORRELATION_WINDOW
}
