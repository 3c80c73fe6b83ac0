pub mod discord;
pub mod twitch;
