/// Configuration for the read-only filtering stage.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Id of the server this stage runs in; used in the consumer thread name.
    pub server_id: u64,
    /// Prefix of the consumer thread name.
    pub thread_name_prefix: String,
}

impl ProcessorConfig {
    /// Name given to the consumer thread: `<prefix>:<server_id>`.
    #[must_use]
    pub fn thread_name(&self) -> String {
        format!("{}:{}", self.thread_name_prefix, self.server_id)
    }
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            server_id: 0,
            thread_name_prefix: "ReadOnlyRequestProcessor".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn processor_config_defaults() {
        let config = ProcessorConfig::default();
        assert_eq!(config.server_id, 0);
        assert_eq!(config.thread_name(), "ReadOnlyRequestProcessor:0");
    }

    #[test]
    fn thread_name_includes_server_id() {
        let config = ProcessorConfig {
            server_id: 3,
            ..ProcessorConfig::default()
        };
        assert_eq!(config.thread_name(), "ReadOnlyRequestProcessor:3");
    }
}
