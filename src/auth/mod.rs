//! Authentication module
//!
//! Google credentials for the BigQuery source: a ready-made access token, or
//! a service-account key whose RS256-signed JWT is exchanged for tokens.
//!
//! The `GoogleAuthenticator` caches exchanged tokens until shortly before
//! they expire.

mod authenticator;
mod types;

pub use authenticator::GoogleAuthenticator;
pub use types::{
    CachedToken, GoogleCredentials, ServiceAccountKey, BIGQUERY_SCOPE, GOOGLE_TOKEN_URI,
};

#[cfg(test)]
mod tests;
