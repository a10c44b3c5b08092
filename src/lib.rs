pub mod auth;
pub mod banner;
pub mod config;
pub mod consts;
pub mod cost;
pub mod engine;
pub mod events;
pub mod library;
pub mod modernizer;
pub mod narration;
pub mod prompts;
pub mod spinner;
pub mod text;
