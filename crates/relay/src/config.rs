use courier_protocol::parse_bool;
use courier_storage::DEFAULT_MIN_PART_SIZE;

const MIB: u64 = 1024 * 1024;

/// Default chunk size: 20 MiB.
pub const DEFAULT_CHUNK_SIZE: u64 = 20 * MIB;

/// Default crumb size: same as the chunk size, separately configurable.
pub const DEFAULT_CRUMB_SIZE: u64 = 20 * MIB;

const DEFAULT_PAGE_LIMIT: usize = 500;

/// Immutable configuration handed to every component.
///
/// The algorithmic core never reads ambient state; everything tunable comes
/// in through this value.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub environment: String,
    /// Bytes moved per invocation of the send machine.
    pub chunk_size: u64,
    /// Upper bound on a single ranged read while assembling an outbound
    /// chunk. Inbound buffering is bounded by the transport's own chunk size
    /// plus `min_part_size`, so no crumb bound applies there.
    pub crumb_size: u64,
    /// File size at which outbound compression defaults to on.
    pub compress_threshold: u64,
    /// Globally disables outbound compression.
    pub never_compress: bool,
    /// Opt-in: fall back to the object key as the transport filename.
    /// Off by default since a key may leak a sensitive path.
    pub use_key_for_filename: bool,
    /// Prefer the sender-declared filename for inbound objects; otherwise
    /// destination names are derived from the message id.
    pub use_sender_filename: bool,
    /// Storage backend's minimum multipart part size (final part exempt).
    pub min_part_size: u64,
    /// Maximum message ids pulled per polling cycle.
    pub page_limit: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            environment: "default".to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            crumb_size: DEFAULT_CRUMB_SIZE,
            compress_threshold: DEFAULT_CHUNK_SIZE,
            never_compress: false,
            use_key_for_filename: false,
            use_sender_filename: true,
            min_part_size: DEFAULT_MIN_PART_SIZE,
            page_limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

impl RelayConfig {
    /// Reads configuration from the environment, with the same defaults and
    /// clamping as the explicit constructors.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let chunk_size = env_u64("CHUNK_SIZE", defaults.chunk_size);
        Self {
            environment: std::env::var("ENVIRONMENT")
                .unwrap_or_else(|_| defaults.environment.clone()),
            compress_threshold: env_u64("COMPRESS_THRESHOLD", chunk_size),
            never_compress: env_bool("NEVER_COMPRESS", defaults.never_compress),
            use_key_for_filename: env_bool("USE_KEY_FOR_FILENAME", defaults.use_key_for_filename),
            use_sender_filename: env_bool("USE_SENDER_FILENAME", defaults.use_sender_filename),
            min_part_size: env_u64("MIN_PART_SIZE", defaults.min_part_size),
            page_limit: env_u64("PAGE_LIMIT", defaults.page_limit as u64) as usize,
            ..defaults
        }
        .with_chunk_sizes(chunk_size, env_u64("CRUMB_SIZE", DEFAULT_CRUMB_SIZE))
    }

    /// Sets chunk and crumb sizes, clamping to sane bounds: the chunk size
    /// has a floor of 10 bytes and the crumb size is clamped to
    /// `1..=chunk_size`.
    pub fn with_chunk_sizes(mut self, chunk_size: u64, crumb_size: u64) -> Self {
        self.chunk_size = chunk_size.max(10);
        self.crumb_size = crumb_size.clamp(1, self.chunk_size);
        self
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_bool(name: &str, default: bool) -> bool {
    std::env::var(name)
        .ok()
        .and_then(|v| parse_bool(&v))
        .unwrap_or(default)
}
