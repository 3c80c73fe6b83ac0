pub mod memory;
pub mod postgres;

pub use memory::{MemoryActivityRepository, MemoryBotSettingsRepository, MemoryStreamerRepository};
pub use postgres::{
    PostgresActivityRepository, PostgresBotSettingsRepository, PostgresStreamerRepository,
};
