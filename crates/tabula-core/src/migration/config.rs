//! Relational handler configuration.

/// Default storage engine for generated tables.
pub const DEFAULT_ENGINE: &str = "InnoDB";

/// Default character set for generated tables.
pub const DEFAULT_CHARSET: &str = "utf8mb4";

/// Configuration of the relational migration handler.
#[derive(Debug, Clone)]
pub struct RelationalConfig {
    /// Storage engine for generated tables.
    pub engine: String,

    /// Default character set for generated tables.
    pub charset: String,

    /// Add foreign keys from class tables to `object` and from relation
    /// attribute tables to `relation`.
    pub referential_integrity: bool,

    /// On an "already exists" failure while adding a column, drop the column
    /// and retry once instead of refusing.
    pub drop_and_retry: bool,

    /// Drop and recreate the permanent tables on construction.
    pub reset: bool,
}

impl Default for RelationalConfig {
    fn default() -> Self {
        Self {
            engine: DEFAULT_ENGINE.to_string(),
            charset: DEFAULT_CHARSET.to_string(),
            referential_integrity: true,
            drop_and_retry: false,
            reset: false,
        }
    }
}

impl RelationalConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the storage engine.
    pub fn with_engine(mut self, engine: impl Into<String>) -> Self {
        self.engine = engine.into();
        self
    }

    /// Set the character set.
    pub fn with_charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = charset.into();
        self
    }

    /// Disable foreign keys.
    pub fn without_referential_integrity(mut self) -> Self {
        self.referential_integrity = false;
        self
    }

    /// Enable drop-and-retry on duplicate columns.
    pub fn with_drop_and_retry(mut self) -> Self {
        self.drop_and_retry = true;
        self
    }

    /// Recreate the permanent tables on construction.
    pub fn with_reset(mut self) -> Self {
        self.reset = true;
        self
    }
}
