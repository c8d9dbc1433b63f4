//! Viewer configuration.

use crate::error::ConfigError;

/// Tunables for one viewer session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewerConfig {
    /// Maximum number of displayed features, 0 for unlimited
    pub feature_limit: usize,
    /// Records sampled by the column analyzer
    pub analysis_sample_size: usize,
    /// Records sampled when inferring the SQL schema
    pub schema_sample_size: usize,
    /// Rows per `INSERT` statement before any shrinking
    pub insert_batch_size: usize,
    /// Maximum length of JSON text stored for nested values
    pub max_text_length: usize,
    /// Skipped rows logged individually before only a summary is written
    pub max_logged_skips: usize,
    /// Features drawn per render chunk
    pub render_chunk_size: usize,
    /// Partitions used by the SQL engine; 1 keeps result order stable
    pub target_partitions: usize,
    /// Record batch size used by the SQL engine
    pub engine_batch_size: usize,
    /// Product name used for export file names
    pub product_name: String,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            feature_limit: 0,
            analysis_sample_size: 100,
            schema_sample_size: 1000,
            insert_batch_size: 500,
            max_text_length: 1000,
            max_logged_skips: 5,
            render_chunk_size: 2000,
            target_partitions: 1,
            engine_batch_size: 8192,
            product_name: "geolens".to_string(),
        }
    }
}

impl ViewerConfig {
    /// Create a configuration with the default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the displayed feature cap (0 for unlimited).
    #[must_use]
    pub fn with_feature_limit(mut self, limit: usize) -> Self {
        self.feature_limit = limit;
        self
    }

    /// Set the number of records sampled by the column analyzer.
    #[must_use]
    pub fn with_analysis_sample_size(mut self, size: usize) -> Self {
        self.analysis_sample_size = size;
        self
    }

    /// Set the number of records sampled for schema inference.
    #[must_use]
    pub fn with_schema_sample_size(mut self, size: usize) -> Self {
        self.schema_sample_size = size;
        self
    }

    /// Set the initial `INSERT` batch size.
    #[must_use]
    pub fn with_insert_batch_size(mut self, size: usize) -> Self {
        self.insert_batch_size = size;
        self
    }

    #[must_use]
    pub fn with_max_text_length(mut self, length: usize) -> Self {
        self.max_text_length = length;
        self
    }

    #[must_use]
    pub fn with_max_logged_skips(mut self, count: usize) -> Self {
        self.max_logged_skips = count;
        self
    }

    /// Set the number of features drawn per render chunk.
    #[must_use]
    pub fn with_render_chunk_size(mut self, size: usize) -> Self {
        self.render_chunk_size = size;
        self
    }

    #[must_use]
    pub fn with_target_partitions(mut self, partitions: usize) -> Self {
        self.target_partitions = partitions;
        self
    }

    #[must_use]
    pub fn with_engine_batch_size(mut self, size: usize) -> Self {
        self.engine_batch_size = size;
        self
    }

    /// Set the product name used in export file names.
    #[must_use]
    pub fn with_product_name(mut self, name: impl Into<String>) -> Self {
        self.product_name = name.into();
        self
    }

    /// Check that every size is usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOption`] naming the first offending option.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("analysis_sample_size", self.analysis_sample_size),
            ("schema_sample_size", self.schema_sample_size),
            ("insert_batch_size", self.insert_batch_size),
            ("max_text_length", self.max_text_length),
            ("render_chunk_size", self.render_chunk_size),
            ("target_partitions", self.target_partitions),
            ("engine_batch_size", self.engine_batch_size),
        ];
        if let Some((option, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::InvalidOption {
                option: (*option).to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        if self.product_name.trim().is_empty()
            || self
                .product_name
                .chars()
                .any(|c| c == '/' || c == '\\' || c.is_control())
        {
            return Err(ConfigError::InvalidOption {
                option: "product_name".to_string(),
                message: format!(
                    "'{}' cannot be used in a file name",
                    self.product_name
                ),
            });
        }

        Ok(())
    }
}
