pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod storage;

pub use config::{ConfigError, MirrorConfig};
pub use core::{MirrorEngine, MirrorReport};
pub use error::{MirrorError, MirrorResult};
