use clap::Parser;
use core::time::Duration;
use keysweep_tcp_core::{
    Error,
    codec::{DEFAULT_MAX_LINE_LENGTH, MIN_LINE_LENGTH},
    keysweep::{ChunkAllocator, KeySpace, Target},
    protocol::ChunkGrant,
};

/// Command-line arguments of the allocator.
///
/// Every option can also be supplied through the environment (or a `.env`
/// file).
#[derive(Parser, Debug, Clone)]
#[command(
    name = "keysweep-allocator",
    version,
    about = "Hands out key-space chunks to keysweep workers until the key is found"
)]
pub struct CliArgs {
    /// First key handed out to workers.
    #[arg(value_name = "INITIAL_KEY")]
    pub initial_key: u128,

    /// Key width in bytes (widths below 4 are raised to 4).
    #[arg(value_name = "KEY_SIZE")]
    pub key_width: usize,

    /// Ciphertext to broadcast to workers, passed through verbatim.
    #[arg(value_name = "CIPHERTEXT")]
    pub ciphertext: String,

    /// Address to listen on. Port 0 picks an ephemeral port.
    #[arg(long, env = "KEYSWEEP_LISTEN", default_value = "0.0.0.0:0")]
    pub listen: String,

    /// Seconds to wait for open connections to drain once the run is over.
    #[arg(long, env = "KEYSWEEP_SHUTDOWN_TIMEOUT", default_value_t = 3)]
    pub shutdown_timeout: u64,

    /// Longest protocol line, in bytes. Workers must use the same limit, and
    /// the longest possible grant line has to fit in it.
    #[arg(long, env = "KEYSWEEP_MAX_LINE_LENGTH", default_value_t = DEFAULT_MAX_LINE_LENGTH)]
    pub max_line_length: usize,
}

/// Validated allocator configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the listener to.
    pub listen: String,
    /// Cursor position of the first grant.
    pub initial_key: u128,
    /// Key-space searched by this run.
    pub key_space: KeySpace,
    /// Ciphertext broadcast with every grant.
    pub ciphertext: String,
    /// Upper bound on draining open connections at shutdown.
    pub shutdown_timeout: Duration,
    /// Longest protocol line, in either direction.
    pub max_line_length: usize,
}

impl ServerConfig {
    /// A configuration listening on an ephemeral loopback port with default
    /// limits.
    pub fn local(initial_key: u128, key_space: KeySpace, ciphertext: impl Into<String>) -> Self {
        Self {
            listen: "127.0.0.1:0".to_owned(),
            initial_key,
            key_space,
            ciphertext: ciphertext.into(),
            shutdown_timeout: Duration::from_secs(3),
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }

    /// Checks that every message of this run fits the line limit and that the
    /// ciphertext cannot break the framing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`] for an empty ciphertext, a ciphertext
    /// containing tabs or line breaks, a line limit below
    /// [`MIN_LINE_LENGTH`], or a ciphertext too long for a grant line to fit
    /// the limit. Returns [`Error::KeySpace`] if the initial key lies outside
    /// the key-space.
    pub fn validate(&self) -> Result<(), Error> {
        if self.ciphertext.is_empty() {
            return Err(Error::malformed("ciphertext must not be empty"));
        }
        if self.ciphertext.contains(['\t', '\r', '\n']) {
            return Err(Error::malformed(
                "ciphertext must not contain tabs or line breaks",
            ));
        }
        if self.max_line_length < MIN_LINE_LENGTH {
            return Err(Error::malformed(format!(
                "max line length must be at least {MIN_LINE_LENGTH} bytes"
            )));
        }

        let longest_grant =
            ChunkGrant::max_line_length(self.key_space.key_width(), &self.ciphertext);
        if longest_grant > self.max_line_length {
            return Err(Error::malformed(format!(
                "a {}-byte ciphertext makes grant lines of up to {longest_grant} bytes, \
                 over the {}-byte line limit",
                self.ciphertext.len(),
                self.max_line_length
            )));
        }

        self.allocator()?;
        Ok(())
    }

    /// Builds the allocator described by this configuration.
    ///
    /// # Errors
    ///
    /// Fails if the initial key lies outside the key-space.
    pub fn allocator(&self) -> Result<ChunkAllocator, Error> {
        let target = Target::new(self.key_space, self.ciphertext.clone());
        Ok(ChunkAllocator::new(target, self.initial_key)?)
    }
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let config = Self {
            listen: args.listen,
            initial_key: args.initial_key,
            key_space: KeySpace::new(args.key_width)?,
            ciphertext: args.ciphertext,
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout),
            max_line_length: args.max_line_length,
        };

        // Surface a bad run before binding anything.
        config.validate()?;
        Ok(config)
    }
}
