pub mod api;
pub mod auth;
pub mod client;
pub mod executor;

pub use api::MutationSummary;
pub use auth::{AuthSession, AuthStep, TraktCredentials};
pub use client::TraktClient;
pub use executor::RequestExecutor;
