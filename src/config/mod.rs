// Configuration module
// Public interface for configuration loading

pub mod constants;
mod loader;
mod provider;
mod settings;

pub use loader::{config_path, load_settings, load_settings_from};
pub use provider::SourceEntry;
pub use settings::{
    AdapterConfig, CollectorConfig, ReviewerConfig, SchedulerConfig, Settings, StoreConfig,
    TrainingConfig,
};
