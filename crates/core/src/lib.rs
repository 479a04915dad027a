//! RoleSync core library.
//!
//! This crate reconciles Discord guild roles against rows kept in Google
//! Sheets: configuration, row normalization, role resolution, membership
//! matching, the two REST clients, and the run driver.

pub mod config;
pub mod discord;
pub mod errors;
pub mod matcher;
pub mod models;
pub mod normalize;
pub mod reconciler;
pub mod resolver;
pub mod sheets;

// Re-exports for convenience.
pub use config::AppConfig;
pub use discord::{DiscordClient, GuildPlatform};
pub use reconciler::{Platform, Reconciler, SheetSource};
pub use sheets::SheetsClient;
