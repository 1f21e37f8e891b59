//! Configuration for the master process.

/// Tunables for a master instance.
#[derive(Debug, Clone)]
pub struct MasterConfig {
    /// Application name, used in logs.
    pub app_name: String,
    /// Partition count used by requests that do not specify one.
    /// `None` falls back to the number of registered workers.
    pub default_partitions: Option<usize>,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            app_name: "shoal".to_string(),
            default_partitions: None,
        }
    }
}

impl MasterConfig {
    pub fn new<S: Into<String>>(app_name: S) -> Self {
        Self {
            app_name: app_name.into(),
            ..Self::default()
        }
    }

    pub fn with_default_partitions(mut self, num_partitions: usize) -> Self {
        self.default_partitions = Some(num_partitions);
        self
    }
}
