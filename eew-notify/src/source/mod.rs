//! Upstream EEW source.
//!
//! [`EewClient`] polls the ExpTech HTTP API, filters and de-duplicates records,
//! and passes each new revision to a [`RevisionHandler`]. [`RevisionIntake`] is the
//! production handler: it feeds the dispatch coordinator and computes the
//! intensity estimate and map off the async runtime.

pub mod client;
pub mod http;
pub mod intake;

pub use client::{EewClient, RecordDisposition};
pub use http::{ExpTechHttp, NodeSelection};
pub use intake::RevisionIntake;

use async_trait::async_trait;

use crate::earthquake::EewRevision;

/// Consumer of accepted revisions.
#[async_trait]
pub trait RevisionHandler: Send + Sync {
    async fn accept(&self, revision: EewRevision);
}
