pub mod data;
pub mod import;
pub mod io;

pub use data::Config;
pub use import::{expand_env_vars, import_providers, ImportError};
pub use io::ConfigError;
