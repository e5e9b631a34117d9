pub mod banner;
pub mod config;
pub mod consts;
pub mod engine;
pub mod error;
pub mod ffi;
pub mod import;
pub mod logging;
pub mod spinner;

pub use consts::VERSION;
pub use engine::Engine;
pub use error::{EngineError, Result};
