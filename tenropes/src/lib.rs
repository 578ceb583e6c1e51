//! Terminal client for Tenropes channels.

pub mod cli;
pub mod render;
pub mod services;
pub mod settings;
