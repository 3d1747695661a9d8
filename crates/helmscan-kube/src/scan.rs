//! End-to-end release scan
//!
//! Locate the release Secret, decode its payload, extract the manifest,
//! parse it and check every resource against the cluster.

use helmscan_core::{
    ExistenceResult, ParseWarning, PayloadFormat, ReleaseEnvelope, ReleaseQuery, ReleaseRecord,
    manifest, payload,
};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::cluster::ClusterReader;
use crate::error::{KubeError, Result};
use crate::locator::ReleaseLocator;
use crate::resolver::{ExistenceResolver, ResolverConfig};

/// Everything learned about one release revision
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    pub release: String,
    pub namespace: String,
    pub revision: u32,
    /// Name of the Secret the manifest was read from
    pub secret: String,
    pub payload_format: PayloadFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<ReleaseRecord>,
    /// Existence results in manifest order
    pub results: Vec<ExistenceResult>,
    pub warnings: Vec<ParseWarning>,
    /// Resolution stopped by the caller before every check finished
    pub interrupted: bool,
    /// Resolution stopped by the deadline before every check finished
    pub timed_out: bool,
}

/// Tally of result statuses
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub exists: usize,
    pub absent: usize,
    pub errors: usize,
}

impl ScanReport {
    pub fn counts(&self) -> StatusCounts {
        self.results
            .iter()
            .fold(StatusCounts::default(), |mut counts, result| {
                if result.status.is_exists() {
                    counts.exists += 1;
                } else if result.status.is_absent() {
                    counts.absent += 1;
                } else {
                    counts.errors += 1;
                }
                counts
            })
    }

    /// Every declared resource was checked and none of them is live
    pub fn none_exist(&self) -> bool {
        !self.results.is_empty() && self.results.iter().all(|r| r.status.is_absent())
    }
}

/// Runs the whole pipeline against one cluster
pub struct Scanner<C: ClusterReader + ?Sized + 'static> {
    cluster: Arc<C>,
    resolver: ExistenceResolver<C>,
}

impl<C: ClusterReader + ?Sized + 'static> Scanner<C> {
    pub fn new(cluster: Arc<C>, config: ResolverConfig) -> Result<Self> {
        let resolver = ExistenceResolver::new(Arc::clone(&cluster), config)?;
        Ok(Self { cluster, resolver })
    }

    /// Scan a release revision
    ///
    /// If `cancel` completes before resource checks start the scan fails with
    /// [`KubeError::Cancelled`]; once they have started, the report is
    /// returned with `interrupted` set.
    #[instrument(skip(self, cancel), fields(release = %query.name(), namespace = %query.namespace()))]
    pub async fn scan(
        &self,
        query: &ReleaseQuery,
        cancel: impl Future<Output = ()>,
    ) -> Result<ScanReport> {
        tokio::pin!(cancel);

        let locator = ReleaseLocator::new(self.cluster.as_ref());
        let located = tokio::select! {
            biased;
            _ = &mut cancel => return Err(KubeError::Cancelled),
            located = locator.locate(query) => located?,
        };
        debug!(secret = %located.secret.name, revision = located.revision, "located release");

        let raw = located
            .secret
            .payload
            .as_deref()
            .ok_or_else(|| KubeError::InvalidReleaseSecret {
                secret: located.secret.name.clone(),
                reason: format!("no '{}' data key", helmscan_core::release::RELEASE_DATA_KEY),
            })?;

        let decoded = payload::decode(raw)?;
        let payload_format = decoded.format();
        let envelope = ReleaseEnvelope::from_decoded(decoded);
        let parsed = manifest::parse(envelope.manifest())?;

        let revision = envelope.recorded_revision().unwrap_or(located.revision);
        info!(
            revision,
            format = %payload_format,
            resources = parsed.resources.len(),
            warnings = parsed.warnings.len(),
            "checking release resources"
        );

        let outcome = self
            .resolver
            .resolve_all(&parsed.resources, query.namespace(), &mut cancel)
            .await;

        Ok(ScanReport {
            release: query.name().to_string(),
            namespace: query.namespace().to_string(),
            revision,
            secret: located.secret.name,
            payload_format,
            record: envelope.record().cloned(),
            results: outcome.results,
            warnings: parsed.warnings,
            interrupted: outcome.cancelled,
            timed_out: outcome.timed_out,
        })
    }
}
