//! In-memory repository implementations.
//!
//! Used by the test suite and as a no-database fallback; same contracts
//! as the Postgres backends.

pub mod activity;
pub mod bot_settings;
pub mod streamers;

pub use activity::MemoryActivityRepository;
pub use bot_settings::MemoryBotSettingsRepository;
pub use streamers::MemoryStreamerRepository;
