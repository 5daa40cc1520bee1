//! Brokerage REST Adapter
//!
//! Wire types, the reqwest client, and the error classifier for the
//! endpoint's JSON-over-HTTPS API.

pub mod api_types;
pub mod error;
pub mod http_client;

pub use error::{ClassifiedError, ErrorKind};
pub use http_client::BrokerHttpClient;
