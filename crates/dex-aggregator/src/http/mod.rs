/*
[INPUT]:  HTTP client configuration and access token
[OUTPUT]: Authenticated request builders and typed JSON responses
[POS]:    HTTP layer - REST request plumbing shared with the stream layer
[UPDATE]: When changing request headers or error mapping
*/

pub mod client;
pub mod error;

pub use error::{DexError, Result};

pub use client::{ClientConfig, DexHttpClient, USER_AGENT};
