//! Configuration constants and tunables for the page cache.

use crate::common::{Error, Result};

/// Default size of a block in bytes (4KB).
///
/// Matches the OS page size on most systems. Block stores may use any
/// non-zero size; the cache takes the size from the store it is opened on.
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// Default number of directory shards.
///
/// Each shard has its own lock, so transactions touching blocks in
/// different shards never contend on the directory.
pub const DEFAULT_SHARD_COUNT: usize = 16;

/// Tunables for a [`PageCache`](crate::PageCache).
///
/// # Example
/// ```
/// use pagetxn::PageCacheConfig;
///
/// let config = PageCacheConfig {
///     max_resident_pages: Some(128),
///     ..PageCacheConfig::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCacheConfig {
    /// Number of independently locked directory shards.
    pub shard_count: usize,

    /// Soft limit on resident directory entries.
    ///
    /// When exceeded, idle clean pages are evicted after each release.
    /// `None` disables automatic eviction.
    pub max_resident_pages: Option<usize>,
}

impl PageCacheConfig {
    /// Check the configuration for values the cache cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.shard_count == 0 {
            return Err(Error::Config("shard_count must be > 0".into()));
        }
        if self.max_resident_pages == Some(0) {
            return Err(Error::Config("max_resident_pages must be > 0".into()));
        }
        Ok(())
    }
}

impl Default for PageCacheConfig {
    fn default() -> Self {
        Self {
            shard_count: DEFAULT_SHARD_COUNT,
            max_resident_pages: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_size_is_power_of_two() {
        assert!(DEFAULT_BLOCK_SIZE.is_power_of_two());
        assert_eq!(DEFAULT_BLOCK_SIZE, 4096);
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(PageCacheConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_config() {
        let config = PageCacheConfig {
            shard_count: 0,
            ..PageCacheConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = PageCacheConfig {
            max_resident_pages: Some(0),
            ..PageCacheConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
