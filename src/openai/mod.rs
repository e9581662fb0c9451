pub mod config;
pub mod core;
pub use self::config::*;
pub use self::core::*;
