/// A result type defaulting to this crate's [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// All error variants that `keysweep` can emit.
///
/// Allocation itself is infallible; errors only arise while validating the
/// parameters of a run.
#[derive(Clone, Debug, PartialEq, Eq, Hash, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The requested key width is wider than any supported cipher key.
    #[error("key width of {width} bytes exceeds the maximum of {max} bytes")]
    KeyWidthTooLarge { width: usize, max: usize },

    /// The initial cursor lies beyond the end of the key-space.
    #[error("initial key {initial} lies outside a key-space of {total} keys")]
    InitialKeyOutOfRange { initial: u128, total: u128 },
}
