pub mod loader;
pub mod schema;

pub use loader::{load_config, load_config_from, missing_required};
pub use schema::{
    Config, EventMode, LarkConfig, OpencodeConfig, RelayConfig, ServerConfig, StorageConfig,
};
