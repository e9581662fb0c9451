pub mod api;
pub mod avatar;
pub mod chat;
pub mod cli;
pub mod core;
pub mod jobs;
pub mod notify;
pub mod openai;
pub mod store;
