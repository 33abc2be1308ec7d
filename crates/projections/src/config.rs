//! Replay configuration loaded from environment variables.

/// Replay settings with sensible defaults.
///
/// Reads from environment variables:
/// - `ES_REPLAY_RESET_READ_MODELS`: reset registered read models before
///   replaying (default: `true`)
/// - `ES_REPLAY_LOG_EVENTS`: log every replayed event (default: `true`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayConfig {
    pub reset_read_models: bool,
    pub log_events: bool,
}

impl ReplayConfig {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            reset_read_models: env_flag("ES_REPLAY_RESET_READ_MODELS")
                .unwrap_or(defaults.reset_read_models),
            log_events: env_flag("ES_REPLAY_LOG_EVENTS").unwrap_or(defaults.log_events),
        }
    }
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            reset_read_models: true,
            log_events: true,
        }
    }
}

fn env_flag(name: &str) -> Option<bool> {
    std::env::var(name).ok().and_then(|v| parse_flag(&v))
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = ReplayConfig::default();
        assert!(config.reset_read_models);
        assert!(config.log_events);
    }

    #[test]
    fn test_flag_parsing() {
        assert_eq!(parse_flag("true"), Some(true));
        assert_eq!(parse_flag(" YES "), Some(true));
        assert_eq!(parse_flag("1"), Some(true));
        assert_eq!(parse_flag("off"), Some(false));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
        assert_eq!(parse_flag(""), None);
    }

    #[test]
    fn test_unset_variable_uses_default() {
        assert_eq!(env_flag("ES_REPLAY_TEST_UNSET_VARIABLE"), None);
    }
}
