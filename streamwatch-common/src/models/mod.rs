pub mod activity;
pub mod discord;
pub mod settings;
pub mod stream;
pub mod streamer;

pub use activity::{Activity, ActivityKind};
pub use discord::GuildMemberInfo;
pub use settings::{BotSettings, BotSettingsPatch};
pub use stream::StreamSnapshot;
pub use streamer::Streamer;
