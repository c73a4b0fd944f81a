pub mod analytics;
pub mod brief;
pub mod chat;
pub mod config;
pub mod fetch;
pub mod llm;
pub mod model;
pub mod queue;
pub mod repl;
pub mod score;
pub mod session;
