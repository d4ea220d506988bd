//! Authentication against the Inworld web API.

mod http;
pub mod signature;

pub use http::HttpAuthClient;
