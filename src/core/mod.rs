pub mod config;
pub mod context;
pub use config::AppConfig;
pub use context::AppContext;
