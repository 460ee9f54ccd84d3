//! Configuration for the Rota scheduling engine.

mod settings;

pub use settings::{CacheConfig, Config, CredentialConfig, RemoteCalendarConfig, SchedulingConfig};
