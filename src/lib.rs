//! maestro-upload: Upload mobile builds and test flows to Maestro, then
//! follow the run until it completes.
//!
//! # Architecture
//!
//! The main components are:
//!
//! - **Params / CI**: Validate user input and read the GitHub Actions context
//! - **Archive**: Package workspaces and app bundles into zips
//! - **Client**: Talk to the upload service (cloud or project backend)
//! - **Poller**: Follow an upload with backoff, bounded retries and a timeout
//! - **Report**: Print flow results and publish workflow outputs
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use maestro_upload::client::{ApiClient, BackendTarget};
//! use maestro_upload::model::UploadRequest;
//! use maestro_upload::poller::{PollSettings, StatusPoller};
//! use maestro_upload::report::TerminalConsole;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = ApiClient::new("key", "https://api.mobile.dev", BackendTarget::cloud())?;
//!     let job = client.upload(&UploadRequest::default(), None, None, None).await?;
//!
//!     let poller = StatusPoller::new(client, Arc::new(TerminalConsole), PollSettings::default());
//!     let outcome = poller.poll(&job).await?;
//!     std::process::exit(outcome.exit_code());
//! }
//! ```

pub mod archive;
pub mod ci;
pub mod client;
pub mod config;
pub mod model;
pub mod params;
pub mod poller;
pub mod report;
pub mod tracker;

// Re-export commonly used types
pub use client::{ApiClient, ApiError, BackendTarget, StatusSource};
pub use config::{Config, load_config};
pub use model::{Flow, FlowStatus, StatusSnapshot, UploadJob, UploadRequest};
pub use params::ValidationError;
pub use poller::{PollError, PollOutcome, PollSettings, StatusPoller};
pub use report::{Console, ResultReporter, TerminalConsole};
