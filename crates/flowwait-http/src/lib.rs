//! HTTP transport for flowwait
//!
//! This crate implements the `Transport` contract of `flowwait-core` on top of
//! `reqwest`, and a `TaskTracker` for flow / async-request status actions.
//!
//! # Wire format
//!
//! Every action is a `POST` of a JSON body to one endpoint, with the action name
//! in the `X-Action` header. Responses are wrapped in a `Response` envelope:
//!
//! ```text
//! {"Response": {"FlowId": 42, "RequestId": "..."}}
//! {"Response": {"Error": {"Code": "ResourceBusy", "Message": "..."}, "RequestId": "..."}}
//! ```
//!
//! # Example
//!
//! ```ignore
//! use flowwait_http::{FlowTracker, HttpSettings, HttpTransport};
//! use std::sync::Arc;
//!
//! let transport = Arc::new(HttpTransport::new(
//!     HttpSettings::new("https://cvm.example.com").with_region("ap-tokyo"),
//! )?);
//! let tracker = FlowTracker::new(Arc::clone(&transport));
//!
//! let report = orchestrator
//!     .await_task(&ctx, &tracker.handle(42_i64), &tracker)
//!     .await?;
//! ```

pub mod client;
pub mod error;
pub mod tracker;

pub use client::{HttpSettings, HttpTransport, decode_envelope};
pub use error::{HttpError, Result};
pub use tracker::{Diagnostic, FlowTracker};
