//! helmscan Kube - the cluster side of a release scan
//!
//! This crate provides:
//! - **Cluster access**: the read-only [`ClusterReader`] seam, backed by kube-rs
//!   ([`KubeCluster`]) or by memory ([`MockCluster`])
//! - **Release lookup**: find the Secret holding a release revision
//! - **Existence checks**: one targeted GET per manifest resource, on a
//!   bounded worker pool with a deadline and cancellation
//! - **Scanner**: the full locate, decode, parse, resolve pipeline

pub mod cluster;
pub mod error;
pub mod locator;
pub mod resolver;
pub mod scan;

pub use cluster::{ClusterReader, KubeCluster, Lookup, MockCluster, OperationCounts, ReleaseSecret};
pub use error::{KubeError, Result};
pub use locator::{LocatedRelease, ReleaseLocator};
pub use resolver::{ExistenceResolver, ResolveOutcome, ResolverConfig};
pub use scan::{ScanReport, Scanner, StatusCounts};
