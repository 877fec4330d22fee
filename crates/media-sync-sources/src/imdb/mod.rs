pub mod auth;
pub mod browser;
pub mod client;
pub mod download;
pub mod export;
pub mod page;
pub mod parser;

pub use auth::{Identity, ImdbAuth};
pub use client::{ImdbClient, ImdbSettings};
pub use export::ExportSettings;
