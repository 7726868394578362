//! queuery-client — submit SQL to the queuery service, poll until it
//! finishes, and stream the gzip CSV results, optionally typed by the
//! published schema manifest.
//!
//! ```no_run
//! use queuery_client::{ClientConfig, QueueryClient};
//!
//! # fn main() -> queuery_client::QueueryResult<()> {
//! let config = ClientConfig::new("https://queuery.example.com").with_cast(true);
//! let client = QueueryClient::new(config)?;
//! for row in &client.run("select id, title from recipes")? {
//!     println!("{:?}", row?);
//! }
//! # Ok(())
//! # }
//! ```

pub mod cast;
pub mod client;
pub mod config;
pub mod facade;
pub mod http;
pub mod poll;
pub mod response;
#[cfg(feature = "arrow")]
mod table;
pub mod types;

/// Version segment of every service API path.
pub const API_VERSION: &str = "v1";

pub use cast::{cast_row, cast_value, ColumnKind, FALSE_VALUES};
pub use client::Client;
pub use config::{ClientConfig, Credentials};
pub use facade::QueueryClient;
pub use http::{HttpRequest, HttpResponse, HttpTransport, Method, ReqwestTransport};
pub use poll::{polling_interval, Clock, ManualClock, SystemClock};
pub use response::{Materialized, RawRows, ResultStream, Rows};
pub use types::*;
