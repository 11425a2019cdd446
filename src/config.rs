//! Configuration options for the document depositor.

use crate::logging::LogContext;

/// Default document size limit (1MB).
pub const DEFAULT_SIZE_LIMIT: u64 = 1024 * 1024;

/// Configuration options for opening a depositor.
#[derive(Debug, Clone)]
pub struct Options {
    /// Maximum encoded payload size of any stored document (in bytes).
    /// Default: 1MB
    pub size_limit: u64,

    /// Create the deposit root if it doesn't exist.
    /// Default: false
    pub create_if_missing: bool,

    /// Highest merge level the default grouping policy assigns.
    /// Default: 3
    pub max_merge_level: u32,

    /// Budget ratio between merge level L+1 and level L.
    /// Default: 4
    pub level_size_multiplier: u64,

    /// Logging target and scope injected into the depositor.
    pub log_context: LogContext,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            size_limit: DEFAULT_SIZE_LIMIT,
            create_if_missing: false,
            max_merge_level: 3,
            level_size_multiplier: 4,
            log_context: LogContext::default(),
        }
    }
}

impl Options {
    /// Creates a new Options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the document size limit.
    pub fn size_limit(mut self, size: u64) -> Self {
        self.size_limit = size;
        self
    }

    /// Sets whether to create the deposit root if it doesn't exist.
    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets the highest merge level.
    pub fn max_merge_level(mut self, level: u32) -> Self {
        self.max_merge_level = level;
        self
    }

    /// Sets the budget ratio between adjacent merge levels.
    pub fn level_size_multiplier(mut self, multiplier: u64) -> Self {
        self.level_size_multiplier = multiplier;
        self
    }

    /// Sets the injected logging context.
    pub fn log_context(mut self, ctx: LogContext) -> Self {
        self.log_context = ctx;
        self
    }

    /// Validates the options and returns an error if any are invalid.
    pub fn validate(&self) -> crate::Result<()> {
        if self.size_limit == 0 {
            return Err(crate::Error::invalid_argument("size_limit must be > 0"));
        }
        if self.max_merge_level == 0 {
            return Err(crate::Error::invalid_argument("max_merge_level must be > 0"));
        }
        if self.level_size_multiplier < 2 {
            return Err(crate::Error::invalid_argument("level_size_multiplier must be >= 2"));
        }
        Ok(())
    }
}
