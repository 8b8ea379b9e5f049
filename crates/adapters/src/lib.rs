//! labelpress-adapters: the outside-world half of the server
//!
//! Configuration loading, the headless-Chrome renderer pool, OS printer
//! discovery and the cached registry with its health loop, the external
//! spooler invoker, and the Zebra ZPL channel. Everything here implements
//! the ports defined in labelpress-core.

pub mod config;
pub mod printers;
pub mod renderer;
pub mod spooler;
pub mod zebra;

pub use config::{AppConfig, ConfigError};
pub use printers::{CimPrinterProbe, HealthLoop, PrinterProbe, PrinterRegistry};
pub use renderer::{ChromeRenderer, ChromeRendererConfig};
pub use spooler::{SpoolerConfig, SpoolerInvoker};
pub use zebra::{ZebraControl, ZebraControlConfig, MEDIA_RESET_SEQUENCE};
