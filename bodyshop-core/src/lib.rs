pub mod config;
pub mod domain;

pub use crate::config::{read_config, Settings};
