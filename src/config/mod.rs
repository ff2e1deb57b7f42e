// Configuration management module
// Server settings with TOML file loading and validation

pub mod settings;

#[cfg(test)]
mod tests;

pub use settings::{ConfigError, ServerConfig, ToolFamily};
