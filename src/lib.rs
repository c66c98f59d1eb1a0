#![allow(clippy::uninlined_format_args)]

pub mod app;
pub mod config;
pub mod data;
pub mod dispatch;
pub mod media;
pub mod pagination;
pub mod proxy;
pub mod settings;
pub mod v2ex;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::run;
