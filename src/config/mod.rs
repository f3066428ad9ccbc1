mod settings;

pub use settings::{CONFIG_FILE_NAME, SyncConfig};
