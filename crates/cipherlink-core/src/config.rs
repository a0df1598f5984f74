//! Protocol limits.

use std::time::Duration;

use cipherlink_crypto::FreshnessPolicy;

/// Protocol configuration
#[derive(Debug, Clone)]
pub struct ProtocolConfig {
    /// Reject messages whose embedded timestamp is older than this
    pub max_message_age: Duration,
    /// Reject messages dated further than this into the future
    pub max_future_skew: Duration,
    /// Stop sending on a session this long after it was created, and allow
    /// it to be evicted
    pub session_ttl: Duration,
    /// Accept untimestamped payloads from older clients
    pub allow_legacy_payloads: bool,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            max_message_age: Duration::from_secs(60 * 60),
            max_future_skew: Duration::from_secs(60),
            session_ttl: Duration::from_secs(24 * 60 * 60),
            allow_legacy_payloads: true,
        }
    }
}

impl ProtocolConfig {
    /// Freshness rules for the message cipher.
    pub fn freshness_policy(&self) -> FreshnessPolicy {
        FreshnessPolicy {
            max_age_ms: millis(self.max_message_age),
            max_future_skew_ms: millis(self.max_future_skew),
            allow_legacy: self.allow_legacy_payloads,
        }
    }

    /// Session lifetime in milliseconds.
    pub fn session_ttl_ms(&self) -> u64 {
        millis(self.session_ttl)
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_cipher_defaults() {
        assert_eq!(ProtocolConfig::default().freshness_policy(), FreshnessPolicy::default());
        assert_eq!(ProtocolConfig::default().session_ttl_ms(), 86_400_000);
    }

    #[test]
    fn huge_durations_saturate() {
        let config = ProtocolConfig { session_ttl: Duration::MAX, ..ProtocolConfig::default() };
        assert_eq!(config.session_ttl_ms(), u64::MAX);
    }
}
