//! HTTP implementation of the Verda session API.

mod http;

pub use http::HttpSessionApi;
