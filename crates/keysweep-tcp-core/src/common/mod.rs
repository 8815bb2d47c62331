pub mod codec;
pub mod error;
pub mod protocol;
pub mod telemetry;

pub use error::{Error, Result};
