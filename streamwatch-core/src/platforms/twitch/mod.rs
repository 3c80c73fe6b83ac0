// File: streamwatch-core/src/platforms/twitch/mod.rs

pub mod client;
pub mod stream;

pub use client::TwitchHelixClient;
