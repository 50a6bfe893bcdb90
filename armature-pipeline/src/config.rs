//! Pipeline configuration.

use serde::{Deserialize, Serialize};

/// Default byte budget per transmitted chunk (16 KiB, a typical socket high-water mark).
pub const DEFAULT_CHUNK_SIZE: usize = 16 * 1024;

/// Pipeline configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Upper bound on pending plus in-flight commands (`None` = unbounded).
    #[serde(default)]
    pub max_length: Option<usize>,
    /// Byte budget used by `transmit_pending`.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_length: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl PipelineConfig {
    /// Create a configuration with an admission bound.
    pub fn new(max_length: Option<usize>) -> Self {
        Self {
            max_length: max_length.filter(|&n| n > 0),
            ..Default::default()
        }
    }

    /// Create a builder.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::new()
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> PipelineConfigBuilder {
        let mut builder = PipelineConfigBuilder::new();

        if let Ok(max_length) = std::env::var("ARMATURE_PIPELINE_MAX_LENGTH")
            && let Ok(n) = max_length.parse() {
                builder = builder.max_length(n);
            }

        if let Ok(chunk_size) = std::env::var("ARMATURE_PIPELINE_CHUNK_SIZE")
            && let Ok(n) = chunk_size.parse() {
                builder = builder.chunk_size(n);
            }

        builder
    }
}

/// Builder for pipeline configuration.
#[derive(Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
        }
    }

    /// Bound pending plus in-flight commands. `0` removes the bound.
    pub fn max_length(mut self, max_length: usize) -> Self {
        self.config.max_length = (max_length > 0).then_some(max_length);
        self
    }

    /// Remove the admission bound.
    pub fn unbounded(mut self) -> Self {
        self.config.max_length = None;
        self
    }

    /// Set the chunk byte budget.
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.config.chunk_size = chunk_size;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> PipelineConfig {
        self.config
    }
}
