//! `backoffice-http` is the outbound request pipeline for the back-office
//! REST API (admin, staff, aggregator and merchant dashboards).
//!
//! Every call goes through [`HttpPipeline::send`]:
//! - queued requests are dispatched one at a time with a fixed pause,
//! - GET responses are cached for five minutes,
//! - 429s and transient failures are retried with backoff,
//! - the bearer token is attached and 401/403 responses end the session.
//!
//! Grouped endpoint helpers live on the pipeline, e.g.
//! [`HttpPipeline::merchants`] or [`HttpPipeline::auth`].

mod cache;
mod client;
mod endpoints;
mod error;
mod options;
mod queue;
mod request;
mod response;
mod retry;
pub mod session;
mod transport;

pub use cache::ResponseCache;
pub use client::{HttpPipeline, PipelineBuilder};
pub use endpoints::{
    AnalyticsApi, AuthApi, ContentApi, DisputesApi, FormsApi, HealthApi, MerchantsApi,
    SecurityApi, TasksApi, UploadsApi, UsersApi,
};
pub use error::{PipelineError, TransportError};
pub use options::{PipelineOptions, DEFAULT_QUIET_NOT_FOUND};
pub use request::{cache_key, FilePart, RequestBody, RequestSpec};
pub use response::ApiResponse;
pub use retry::{RetryDecision, RetryPolicy, RetryState};
pub use session::{
    LoginRedirect, MemoryTokenStore, Navigator, NoopNavigator, SessionState, TokenStore,
};
pub use transport::{ReqwestTransport, Transport, TransportRequest};

pub use reqwest::Method;

pub type Result<T> = std::result::Result<T, PipelineError>;
