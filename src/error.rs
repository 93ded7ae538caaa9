//! Almanac error types

/// Almanac error types
#[derive(Debug, thiserror::Error)]
pub enum AlmanacError {
    // Cache errors
    /// Every resident entry is pinned or under construction, so nothing
    /// can be evicted to make room for a new key.
    #[error("cache full: all {capacity} entries are pinned")]
    CacheFull { capacity: usize },

    // Pooled object errors
    /// The construction routine of a pooled object failed. The object stays
    /// uninitialized and the next access retries from scratch.
    #[error("failed to construct {kind}: {message}")]
    Construction { kind: &'static str, message: String },

    /// A pool slot held a different type than the key promised.
    #[error("pool slot for {0} holds an unexpected type")]
    KindMismatch(&'static str),

    // Localization errors
    #[error("no translation table for language '{0}'")]
    LanguageNotFound(String),

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("idle sweeper requires a tokio runtime")]
    NoRuntime,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AlmanacError {
    /// Build a [`Construction`](Self::Construction) error for kind `T`.
    pub fn construction<T: ?Sized>(message: impl Into<String>) -> Self {
        AlmanacError::Construction {
            kind: std::any::type_name::<T>(),
            message: message.into(),
        }
    }

    /// Whether retrying the same call may succeed.
    ///
    /// `CacheFull` clears as soon as an entry is unpinned or finishes
    /// construction; a failed construction leaves no state behind.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            AlmanacError::CacheFull { .. } | AlmanacError::Construction { .. }
        )
    }
}

/// Result type alias for Almanac operations
pub type Result<T> = std::result::Result<T, AlmanacError>;
