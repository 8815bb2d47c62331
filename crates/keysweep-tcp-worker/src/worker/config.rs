use crate::worker::blowfish::DEFAULT_PLAINTEXT;
use clap::Parser;
use core::time::Duration;
use keysweep_tcp_core::{
    Error,
    codec::{DEFAULT_MAX_LINE_LENGTH, MIN_LINE_LENGTH},
};

/// Command-line arguments of the worker.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "keysweep-worker",
    version,
    about = "Searches key-space chunks handed out by a keysweep allocator"
)]
pub struct CliArgs {
    /// Host name or address of the allocator.
    #[arg(value_name = "HOST")]
    pub host: String,

    /// Port of the allocator.
    #[arg(value_name = "PORT")]
    pub port: u16,

    /// Number of keys requested per chunk.
    #[arg(value_name = "CHUNK_SIZE")]
    pub chunk_size: u64,

    /// Plaintext a correct key decrypts the ciphertext to.
    #[arg(long, env = "KEYSWEEP_PLAINTEXT", default_value = DEFAULT_PLAINTEXT)]
    pub plaintext: String,

    /// Connect timeout in milliseconds, also used by the liveness probe.
    #[arg(long, env = "KEYSWEEP_CONNECT_TIMEOUT_MS", default_value_t = 1500)]
    pub connect_timeout_ms: u64,

    /// How long to wait for an answer from the allocator, in milliseconds.
    #[arg(long, env = "KEYSWEEP_READ_TIMEOUT_MS", default_value_t = 5000)]
    pub read_timeout_ms: u64,

    /// Pause after a failed cycle before probing the allocator again, in
    /// milliseconds.
    #[arg(long, env = "KEYSWEEP_RETRY_DELAY_MS", default_value_t = 100)]
    pub retry_delay_ms: u64,

    /// Longest protocol line, in bytes. Must match the allocator's limit, or
    /// grants with long ciphertexts cannot be read.
    #[arg(long, env = "KEYSWEEP_MAX_LINE_LENGTH", default_value_t = DEFAULT_MAX_LINE_LENGTH)]
    pub max_line_length: usize,
}

/// Validated worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub host: String,
    pub port: u16,
    /// Keys requested per chunk.
    pub chunk_size: u64,
    /// Plaintext the Blowfish tester looks for.
    pub plaintext: String,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub retry_delay: Duration,
    /// Longest line read from the allocator.
    pub max_line_length: usize,
}

impl WorkerConfig {
    /// A configuration for the allocator at `host:port` with default
    /// timeouts.
    pub fn new(host: impl Into<String>, port: u16, chunk_size: u64) -> Self {
        Self {
            host: host.into(),
            port,
            chunk_size,
            plaintext: DEFAULT_PLAINTEXT.to_owned(),
            connect_timeout: Duration::from_millis(1500),
            read_timeout: Duration::from_secs(5),
            retry_delay: Duration::from_millis(100),
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }

    /// `host:port`, for display.
    pub fn allocator_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl TryFrom<CliArgs> for WorkerConfig {
    type Error = Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.chunk_size == 0 {
            return Err(Error::malformed("chunk size must be at least 1"));
        }
        if args.plaintext.is_empty() {
            return Err(Error::malformed("plaintext must not be empty"));
        }
        if args.connect_timeout_ms == 0 || args.read_timeout_ms == 0 {
            return Err(Error::malformed("timeouts must be at least 1 ms"));
        }
        if args.max_line_length < MIN_LINE_LENGTH {
            return Err(Error::malformed(format!(
                "max line length must be at least {MIN_LINE_LENGTH} bytes"
            )));
        }

        Ok(Self {
            plaintext: args.plaintext,
            connect_timeout: Duration::from_millis(args.connect_timeout_ms),
            read_timeout: Duration::from_millis(args.read_timeout_ms),
            retry_delay: Duration::from_millis(args.retry_delay_ms),
            max_line_length: args.max_line_length,
            ..Self::new(args.host, args.port, args.chunk_size)
        })
    }
}
