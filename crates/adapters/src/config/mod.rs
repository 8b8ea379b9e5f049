//! Configuration loading

mod app_config;

#[cfg(test)]
mod tests;

pub use app_config::{
    AppConfig, ConfigError, HttpSettings, PrinterSettings, QueueSettings, RendererSettings,
    ServerConfig, SpoolerSettings,
};
