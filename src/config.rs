/// Engine configuration parsed from environment variables.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Path to the NNUE weight file, if any.
    pub net_path: Option<String>,
    /// log2 of the transposition-table entry count.
    pub tt_log2: u32,
    /// Milliseconds subtracted from every time budget to cover I/O latency.
    pub move_overhead_ms: u64,
}

impl EngineConfig {
    /// Load configuration from environment variables with defaults.
    pub fn from_env() -> Self {
        EngineConfig {
            net_path: std::env::var("QUARTZ_NET").ok(),
            tt_log2: std::env::var("QUARTZ_TT_LOG2")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(|v: u32| v.clamp(10, 28))
                .unwrap_or(22),
            move_overhead_ms: std::env::var("QUARTZ_MOVE_OVERHEAD_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(20),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            net_path: None,
            tt_log2: 22,
            move_overhead_ms: 20,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.net_path, None);
        assert_eq!(config.tt_log2, 22);
        assert_eq!(config.move_overhead_ms, 20);
    }
}
