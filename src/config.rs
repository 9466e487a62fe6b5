use std::time::Duration;

use typed_builder::TypedBuilder;

use crate::net::error::Error;

/// Total dataset length used when none is given: 2M elements per worker
/// slot, 64 slots.
pub const DEFAULT_TOTAL_LEN: usize = 2_000_000 * 64;

/// Ranges shorter than this are sorted serially, longer ones fork.
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 32_768;

/// Session-wide settings shared by the coordinator and the peer.
///
/// Both processes must be started with the same `total_len`, otherwise the
/// sort exchange hits the length-mismatch path of the transport.
#[derive(Clone, Debug, TypedBuilder)]
pub struct Config {
    /// Length of the whole dataset; each side holds half of it.
    #[builder(default = DEFAULT_TOTAL_LEN)]
    pub total_len: usize,
    /// Size of the rayon pool used by the fast engine variants.
    #[builder(default = default_threads())]
    pub threads: usize,
    #[builder(default = DEFAULT_PARALLEL_THRESHOLD)]
    pub parallel_threshold: usize,
    /// Bytes handed to a single read or write call.
    #[builder(default = 256 * 1024)]
    pub chunk_size: usize,
    /// Consecutive transient I/O failures tolerated before giving up.
    #[builder(default = 100)]
    pub retry_budget: u32,
    #[builder(default = Duration::from_millis(10))]
    pub retry_delay: Duration,
    /// Deadline for one chunk read or write.
    #[builder(default = Duration::from_secs(30))]
    pub io_timeout: Duration,
    /// SO_SNDBUF / SO_RCVBUF applied to the session socket.
    #[builder(default = 4 * 1024 * 1024)]
    pub socket_buffer: u32,
    #[builder(default = 60)]
    pub dial_attempts: u32,
    #[builder(default = Duration::from_secs(1))]
    pub dial_interval: Duration,
}

impl Config {
    /// Checks that the dataset splits into two equal, non-empty partitions.
    pub fn validate(&self) -> Result<(), Error> {
        if self.total_len < 2 || self.total_len % 2 != 0 {
            return Err(Error::InvalidTotalLen(self.total_len));
        }
        Ok(())
    }

    /// Length of one side's partition.
    pub fn partition_len(&self) -> usize {
        self.total_len / 2
    }

    /// Global index of the coordinator's first element.
    pub fn coordinator_offset(&self) -> u64 {
        0
    }

    /// Global index of the peer's first element.
    pub fn peer_offset(&self) -> u64 {
        self.partition_len() as u64
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::builder().build()
    }
}

fn default_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partitions_split_the_dataset() {
        let config = Config::builder().total_len(10).build();
        assert_eq!(config.partition_len(), 5);
        assert_eq!(config.coordinator_offset(), 0);
        assert_eq!(config.peer_offset(), 5);
    }

    #[test]
    fn rejects_lengths_that_do_not_split_evenly() {
        for len in [0, 1, 7, 40_001] {
            let config = Config::builder().total_len(len).build();
            assert!(matches!(config.validate(), Err(Error::InvalidTotalLen(l)) if l == len));
        }
        for len in [2, 10, 40_000] {
            assert!(Config::builder().total_len(len).build().validate().is_ok());
        }
    }

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.total_len, DEFAULT_TOTAL_LEN);
        assert_eq!(config.parallel_threshold, 32_768);
        assert_eq!(config.retry_budget, 100);
        assert!(config.threads >= 1);
        assert!(config.validate().is_ok());
    }
}
