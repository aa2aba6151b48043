pub mod capture;
pub mod config;
pub mod error;
pub mod filter;
pub mod frame;
pub mod replay;
pub mod types;

pub use capture::{record, CaptureListener, CaptureReport};
pub use config::{CaptureConfig, ConfigError, LoopCount, Mode, ReplayConfig, SessionConfig, SessionOptions};
pub use error::SessionError;
pub use filter::{filter_buffer, filter_stream, FilterError, Statistics, TypeFilter};
pub use frame::{BmpMessage, MessageIterator, MessageWalker, ParseError};
pub use replay::{play, ReplayReport};
pub use types::*;
