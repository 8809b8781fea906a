pub mod core;
pub mod models;

pub use core::{load_config, load_default_config, save_config};
pub use models::DaemonOptions;
