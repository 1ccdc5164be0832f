//! An async Rust client for the Solargis data-request APIs (TS and TMY).
//!
//! Both APIs follow the same flow: submit a request, poll its status until the job
//! completes, then download the result. [`Client`] runs that flow for many named
//! requests at once and yields each result as soon as it is ready.
//!
//! ## Quick start
//! - Configure authentication via environment variables (`SGAPI_TS_KEY`, `SGAPI_TMY_KEY`,
//!   optionally `SGAPI_TS_URL` / `SGAPI_TMY_URL`) or a `.sgapirc` file (supported in the
//!   current directory and in your home directory).
//! - Register requests with [`Client::add_request`] and call [`Client::retrieve_all_data`].
//!
//! ```no_run
//! use anyhow::Result;
//! use sgapi::{TimeSeriesClient, TimeSeriesRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let mut client = TimeSeriesClient::from_env("solargis-data")?;
//!     client.add_request(TimeSeriesRequest::new("Linz", 48.275231, 14.26934).time_step("PT60M"));
//!     client.add_request(TimeSeriesRequest::new("Kosice", 48.61259, 20.827079));
//!
//!     let report = client.retrieve_all_data(true).await;
//!     for (name, err) in &report.failed {
//!         eprintln!("{name}: {err}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! Use [`Client::retrieve_data`] to process each result while the others are still running.
//! The client needs a Tokio runtime with timers enabled.

#![forbid(unsafe_code)]

mod api;
mod client;
mod config;
mod error;
mod frame;
mod lifecycle;
mod product;
mod request;
mod transport;
mod util;

pub use api::{JobStatus, Payload, StatusReply, SubmitReply};
pub use client::{
    Client, Outcome, RetrievalReport, TimeSeriesClient, TmyClient, historical_timeseries, tmy,
};
pub use config::ClientConfig;
pub use error::{Phase, RequestError};
pub use frame::{DATETIME_COLUMN, TimeSeriesFrame, parse_timestamp};
pub use lifecycle::{DEFAULT_POLL_INTERVAL, RequestState};
pub use product::{Dataset, Product, TimeSeries, Tmy};
pub use request::{DEFAULT_PARAM_LIST, DataRequest, TimeSeriesRequest, TmyRequest, time_alignment};
pub use transport::{HttpTransport, Transport};
pub use util::{prettify_file_label, to_safe_file_label, to_safe_tmy_file_label};
