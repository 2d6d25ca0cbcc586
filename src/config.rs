use std::time::Duration;

/// Read buffer size for one transfer. Large enough to amortize syscalls on
/// multi-gigabyte media, small enough to bound per-request memory.
pub const DEFAULT_BUFFER_CAPACITY: usize = 128 * 1024;

/// The pacing signal is never sampled more often than this.
pub const MIN_PAUSE_POLL_INTERVAL: Duration = Duration::from_secs(1);

pub const DEFAULT_PAUSE_SLEEP: Duration = Duration::from_millis(20);

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Tuning for ranged transfers.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Bytes read and written per chunk, and the most held in memory at once
    pub buffer_capacity: usize,

    /// How long a sampled pacing value is reused before asking the source again
    pub pause_poll_interval: Duration,

    /// Sleep between keep-alive writes while paused
    pub pause_sleep: Duration,

    /// Content type used when the caller supplies none
    pub default_content_type: String,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            pause_poll_interval: MIN_PAUSE_POLL_INTERVAL,
            pause_sleep: DEFAULT_PAUSE_SLEEP,
            default_content_type: DEFAULT_CONTENT_TYPE.to_string(),
        }
    }
}

impl StreamConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the chunk size. Zero is raised to one byte.
    pub fn with_buffer_capacity(mut self, bytes: usize) -> Self {
        self.buffer_capacity = bytes.max(1);
        self
    }

    /// Set the pacing sample interval, never below [`MIN_PAUSE_POLL_INTERVAL`].
    pub fn with_pause_poll_interval(mut self, interval: Duration) -> Self {
        self.pause_poll_interval = interval.max(MIN_PAUSE_POLL_INTERVAL);
        self
    }

    pub fn with_pause_sleep(mut self, sleep: Duration) -> Self {
        self.pause_sleep = sleep;
        self
    }

    pub fn with_default_content_type<S: Into<String>>(mut self, content_type: S) -> Self {
        self.default_content_type = content_type.into();
        self
    }
}
