//! # partner-client - request-execution core for the partner service
//!
//! Every resource call against the partner-management REST service goes
//! through one [`PartnerClient`]. The client authenticates each call with a
//! bearer [`Credential`], refreshes it when it expires (one refresh at a time,
//! however many calls are waiting), retries transient failures under a
//! [`RetryPolicy`], and turns failed responses into a structured
//! [`ServiceFault`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use partner_client::{BoxError, Credential, PartnerClient, RequestContext, RequestDescriptor};
//! use http::Method;
//! use serde::Deserialize;
//! use std::time::Duration;
//!
//! #[derive(Deserialize)]
//! #[serde(rename_all = "camelCase")]
//! struct Customer {
//!     id: String,
//!     company_profile: serde_json::Value,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), partner_client::Error> {
//!     let client = PartnerClient::builder()
//!         .credential(Credential::expiring_in("initial-token", Duration::from_secs(3600))?)
//!         .refresher(|_stale: Credential, _context: RequestContext| async move {
//!             Ok::<_, BoxError>(Credential::expiring_in("renewed", Duration::from_secs(3600))?)
//!         })
//!         .build()?;
//!
//!     let request = RequestDescriptor::builder(Method::GET, "customers/{0}")
//!         .arg("cust-1")
//!         .build()?;
//!     let customer: Customer = client.execute(request).await?;
//!     println!("Customer {}", customer.id);
//!
//!     let delete = RequestDescriptor::builder(Method::DELETE, "customers/{0}")
//!         .arg("cust-1")
//!         .build()?;
//!     client.execute::<()>(delete).await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! Callers branch on [`Error`] variants. Faults the service returns keep
//! their code, description and nested faults:
//!
//! ```no_run
//! use partner_client::{Error, PartnerClient, RequestDescriptor};
//! use http::Method;
//!
//! # async fn example(client: PartnerClient) -> Result<(), Error> {
//! let request = RequestDescriptor::builder(Method::GET, "orders/{0}").arg("o-1").build()?;
//! match client.execute::<serde_json::Value>(request).await {
//!     Ok(order) => println!("Order: {order}"),
//!     Err(Error::Service(fault)) => {
//!         eprintln!("{} {:?}: {}", fault.status(), fault.code(), fault.description());
//!         for inner in fault.inner_faults() {
//!             eprintln!("  caused by {}", inner.description());
//!         }
//!     }
//!     Err(Error::Deserialization { raw_response, serde_error, status }) => {
//!         eprintln!("Unexpected body (status {}): {} ({})", status, raw_response, serde_error);
//!     }
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Blocking callers
//!
//! [`sync::run_sync`] drives a call to completion on a worker thread and
//! returns its result, errors included, unchanged.

mod client;
pub mod collection;
mod config;
mod context;
mod converter;
pub mod credential;
mod error;
mod fault;
pub mod link;
pub mod models;
pub mod rate_limit;
pub mod request;
mod response;
pub mod retry;
pub mod sync;

pub use client::{ByteStream, ClientBuilder, PartnerClient};
pub use collection::{CollectionEnumerator, ResourceCollection, ResourceLinks};
pub use config::{HeaderNames, ServiceConfig};
pub use context::RequestContext;
pub use converter::{Converter, JsonConverter};
pub use credential::{BoxError, Credential, CredentialProvider};
pub use error::{Error, Result};
pub use fault::ServiceFault;
pub use link::{Link, LinkMethod};
pub use request::{Pagination, RequestBody, RequestBuilder, RequestDescriptor};
pub use response::Response;
pub use retry::RetryPolicy;
