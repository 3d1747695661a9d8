//! helmscan Core - pure stages of a Helm release scan
//!
//! This crate provides everything that does not touch the cluster:
//! - `ReleaseQuery`: validated release name / namespace / revision input
//! - `payload`: format-tolerant decoding of the Secret `release` payload
//! - `ReleaseEnvelope`: splitting a Helm release record into manifest and metadata
//! - `manifest`: multi-document manifest parsing into `ResourceRef`s
//! - `scope`: built-in kind-to-scope table

pub mod error;
pub mod manifest;
pub mod payload;
pub mod query;
pub mod release;
pub mod resource;
pub mod scope;

pub use error::{CoreError, Result};
pub use manifest::{DocumentOutcome, ParseWarning, ParsedManifest};
pub use payload::{DecodedManifest, PayloadFormat};
pub use query::ReleaseQuery;
pub use release::{ReleaseEnvelope, ReleaseRecord, release_secret_name, revision_from_secret_name};
pub use resource::{CheckFailure, ExistenceResult, ExistenceStatus, ResourceRef, ResourceScope};
pub use scope::builtin_scope;
