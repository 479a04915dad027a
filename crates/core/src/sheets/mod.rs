//! Google Sheets access for RoleSync.

pub mod client;

pub use client::SheetsClient;
