//! Discord access for RoleSync.

pub mod client;
pub mod guild;

pub use client::DiscordClient;
pub use guild::GuildPlatform;
