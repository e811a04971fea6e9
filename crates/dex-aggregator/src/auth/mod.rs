/*
[INPUT]:  Access tokens supplied by the caller
[OUTPUT]: Token providers consumed by the stream transport
[POS]:    Auth layer - access token lifecycle
[UPDATE]: When adding token sources or refresh strategies
*/

pub mod token;

pub use token::{AccessTokenStore, StaticToken, TokenData, TokenProvider};
