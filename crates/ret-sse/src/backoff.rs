//! Reconnect delay with exponential backoff.

use rand::Rng;

/// Configuration for the delay between reconnect attempts.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay in milliseconds before the first reconnect (0 = reconnect immediately).
    pub initial_delay_ms: u64,
    /// Maximum delay in milliseconds between reconnects.
    pub max_delay_ms: u64,
    /// Multiplier applied to the delay after each failed attempt.
    pub backoff_factor: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1000,
            max_delay_ms: 30_000,
            backoff_factor: 2.0,
        }
    }
}

impl ReconnectConfig {
    /// Reconnect without any delay.
    pub fn immediate() -> Self {
        Self {
            initial_delay_ms: 0,
            max_delay_ms: 0,
            backoff_factor: 1.0,
        }
    }
}

/// Calculate the delay in milliseconds before the next reconnect.
///
/// `failures` counts consecutive failed connection attempts since the stream
/// was last open. If the server sent a `retry:` hint it is used directly
/// (clamped to `max_delay_ms`). Otherwise the delay is
/// `initial_delay_ms * backoff_factor^failures` with ±25% jitter, clamped to
/// `max_delay_ms`.
pub fn calculate_delay(config: &ReconnectConfig, failures: u32, retry_hint_ms: Option<u64>) -> u64 {
    if let Some(server_delay) = retry_hint_ms {
        return server_delay.min(config.max_delay_ms);
    }

    if config.initial_delay_ms == 0 {
        return 0;
    }

    let exponent = failures.min(i32::MAX as u32) as i32;
    let base = config.initial_delay_ms as f64 * config.backoff_factor.powi(exponent);
    let clamped = base.min(config.max_delay_ms as f64);

    // Apply ±25% jitter
    let jitter_factor = rand::rng().random_range(0.75..=1.25);
    let jittered = clamped * jitter_factor;

    (jittered as u64).min(config.max_delay_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = ReconnectConfig::default();
        assert_eq!(config.initial_delay_ms, 1000);
        assert_eq!(config.max_delay_ms, 30_000);
        assert!((config.backoff_factor - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn immediate_config_never_waits() {
        let config = ReconnectConfig::immediate();
        assert_eq!(calculate_delay(&config, 0, None), 0);
        assert_eq!(calculate_delay(&config, 10, None), 0);
    }

    #[test]
    fn calculate_delay_exponential() {
        let config = ReconnectConfig {
            initial_delay_ms: 1000,
            max_delay_ms: 60_000,
            backoff_factor: 2.0,
        };

        // failures 0: base 1000, ±25% → [750, 1250]
        let delay0 = calculate_delay(&config, 0, None);
        assert!((750..=1250).contains(&delay0), "delay0={delay0}");

        // failures 1: base 2000 → [1500, 2500]
        let delay1 = calculate_delay(&config, 1, None);
        assert!((1500..=2500).contains(&delay1), "delay1={delay1}");

        // failures 2: base 4000 → [3000, 5000]
        let delay2 = calculate_delay(&config, 2, None);
        assert!((3000..=5000).contains(&delay2), "delay2={delay2}");
    }

    #[test]
    fn calculate_delay_respects_retry_hint() {
        let config = ReconnectConfig::default();
        assert_eq!(calculate_delay(&config, 3, Some(5000)), 5000);
    }

    #[test]
    fn calculate_delay_retry_hint_capped() {
        let config = ReconnectConfig {
            max_delay_ms: 10_000,
            ..ReconnectConfig::default()
        };
        assert_eq!(calculate_delay(&config, 0, Some(30_000)), 10_000);
    }

    #[test]
    fn calculate_delay_capped_at_max() {
        let config = ReconnectConfig {
            initial_delay_ms: 1000,
            max_delay_ms: 5000,
            backoff_factor: 10.0,
        };
        let delay = calculate_delay(&config, 50, None);
        assert!(delay <= config.max_delay_ms, "delay={delay}");
    }
}
