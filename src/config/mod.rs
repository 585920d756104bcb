mod initialize;
pub use initialize::Initializer;

mod config;
pub use config::{Config, DumpConfig, MarshallerConfig};

pub mod env {
    pub const LOG_DIRECTIVE: &str = "GRIDUMP_LOG";
    pub const CONFIG_PATH: &str = "GRIDUMP_CONFIG_PATH";
    pub const ROOT_DIR: &str = "GRIDUMP_ROOT_DIR";
}
