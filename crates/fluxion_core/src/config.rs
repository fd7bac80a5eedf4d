use serde::{Deserialize, Serialize};

/// Configuration for executing plans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Max messages a transport delivers per scheduled run before yielding
    /// its worker back to the dispatcher.
    pub dispatcher_throughput: usize,
    /// Messages buffered per transport before producers outside the
    /// dispatcher pool block.
    pub transport_buffer_size: usize,
    /// Tables buffered per result before the producing operator blocks.
    pub result_buffer_size: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        ExecutorConfig {
            dispatcher_throughput: 64,
            transport_buffer_size: 64,
            result_buffer_size: 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_uses_defaults() {
        let conf: ExecutorConfig = serde_json::from_str(r#"{"result_buffer_size": 4}"#).unwrap();
        assert_eq!(
            ExecutorConfig {
                result_buffer_size: 4,
                ..Default::default()
            },
            conf
        );

        let s = serde_json::to_string(&ExecutorConfig::default()).unwrap();
        let back: ExecutorConfig = serde_json::from_str(&s).unwrap();
        assert_eq!(ExecutorConfig::default(), back);
    }
}
