pub mod api;
pub mod cli;
pub mod config;
pub mod confirmation;
pub mod editing;
pub mod html;
pub mod search;
pub mod session;

pub use config::{AppConfig, ConfigLoader, ConfigPaths};
