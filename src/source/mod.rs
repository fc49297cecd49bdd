//! Where flashes come from.
//!
//! This module defines the [`FlashSource`] trait, the [`Flash`] type every
//! source produces, and the LibreNews HTTP implementation.
//!
//! ## For contributors: adding a new source
//!
//! 1. Create a new file in this directory.
//! 2. Define a struct and implement [`FlashSource`] for it.
//! 3. Add `mod <name>;` below and re-export the struct.
//! 4. Construct it in `main.rs` in place of [`LibreNewsSource`].
//!
//! The refresh coordinator, the store and the notifier never look at where a
//! flash came from.

mod flash;
mod librenews;

pub use flash::Flash;
pub use librenews::LibreNewsSource;

#[cfg(test)]
pub(crate) use flash::tests::make_flash;

use async_trait::async_trait;

/// One successful fetch: the server's current flashes plus its display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedBatch {
    pub items: Vec<Flash>,
    pub server_name: String,
}

/// Errors a fetch can end with.  None of them are retried at this layer.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("invalid server URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned HTTP {0}")]
    Status(reqwest::StatusCode),

    #[error("malformed server response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Trait that every flash source must implement.
///
/// The server URL is passed per call rather than stored, because the user
/// may point the app at a different server between refreshes.
#[async_trait]
pub trait FlashSource: Send + Sync {
    /// Fetch the server's current batch of flashes.
    async fn fetch(&self, server_url: &str) -> Result<FetchedBatch, FetchError>;
}
