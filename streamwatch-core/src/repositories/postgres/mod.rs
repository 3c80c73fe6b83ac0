pub mod activity;
pub mod bot_settings;
pub mod streamers;

pub use activity::PostgresActivityRepository;
pub use bot_settings::PostgresBotSettingsRepository;
pub use streamers::PostgresStreamerRepository;
