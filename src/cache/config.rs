//! Cache configuration.

use std::num::NonZeroUsize;

const DEFAULT_MAX_SIZE: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of resources kept in memory.
    pub max_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
        }
    }
}

impl From<&crate::config::ClientSettings> for CacheConfig {
    fn from(settings: &crate::config::ClientSettings) -> Self {
        Self {
            max_size: settings.max_size.get(),
        }
    }
}

impl CacheConfig {
    pub fn with_max_size(max_size: usize) -> Self {
        Self { max_size }
    }

    /// Returns the capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn max_size_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.max_size).unwrap_or(NonZeroUsize::MIN)
    }
}
