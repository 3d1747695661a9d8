//! Release Secret lookup
//!
//! An explicit revision is a single GET on the conventional Secret name. The
//! latest revision takes a single label-scoped list in the release namespace
//! and picks the highest revision found.

use helmscan_core::{ReleaseQuery, release_secret_name};
use tracing::{debug, instrument, warn};

use crate::cluster::{ClusterReader, ReleaseSecret, release_selector};
use crate::error::{KubeError, Result};

/// The Secret backing one release revision
#[derive(Debug, Clone)]
pub struct LocatedRelease {
    pub secret: ReleaseSecret,
    pub revision: u32,
}

/// Finds the Secret holding a release revision
pub struct ReleaseLocator<'a, C: ClusterReader + ?Sized> {
    cluster: &'a C,
}

impl<'a, C: ClusterReader + ?Sized> ReleaseLocator<'a, C> {
    pub fn new(cluster: &'a C) -> Self {
        Self { cluster }
    }

    #[instrument(skip(self), fields(release = %query.name(), namespace = %query.namespace()))]
    pub async fn locate(&self, query: &ReleaseQuery) -> Result<LocatedRelease> {
        match query.revision() {
            Some(revision) => self.locate_revision(query, revision).await,
            None => self.locate_latest(query).await,
        }
    }

    async fn locate_revision(&self, query: &ReleaseQuery, revision: u32) -> Result<LocatedRelease> {
        let secret_name = release_secret_name(query.name(), revision);
        debug!(secret = %secret_name, "fetching release secret");

        let secret = self
            .cluster
            .get_secret(query.namespace(), &secret_name)
            .await?
            .ok_or_else(|| KubeError::RevisionNotFound {
                name: query.name().to_string(),
                namespace: query.namespace().to_string(),
                revision,
            })?;

        Ok(LocatedRelease { secret, revision })
    }

    async fn locate_latest(&self, query: &ReleaseQuery) -> Result<LocatedRelease> {
        let selector = release_selector(query.name());
        let secrets = self
            .cluster
            .list_secrets(query.namespace(), &selector)
            .await?;
        debug!(count = secrets.len(), %selector, "listed release secrets");

        let latest = secrets
            .into_iter()
            .filter_map(|secret| match secret.revision() {
                Some(revision) => Some(LocatedRelease { secret, revision }),
                None => {
                    warn!(secret = %secret.name, "ignoring release secret without a revision");
                    None
                }
            })
            .max_by_key(|located| located.revision);

        latest.ok_or_else(|| KubeError::ReleaseNotFound {
            name: query.name().to_string(),
            namespace: query.namespace().to_string(),
        })
    }
}
