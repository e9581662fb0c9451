//! Conversation history, the context window sent to the model and the
//! streaming of replies back to UI surfaces.
pub mod config;
pub mod history;
pub mod models;
pub mod narration;
pub mod orchestrator;
pub mod prompt;
pub mod service;
pub mod window;
