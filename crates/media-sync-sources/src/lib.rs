pub mod error;
pub mod http;
pub mod imdb;
pub mod retry;
pub mod traits;
pub mod trakt;

pub use error::{Result, SourceError};
pub use http::{HttpTransport, ReqwestTransport};
pub use imdb::{ImdbAuth, ImdbClient, ImdbSettings};
pub use retry::{RetryPolicy, Sleeper, TokioSleeper};
pub use traits::{DestinationClient, SourceClient};
pub use trakt::{MutationSummary, TraktClient, TraktCredentials};
