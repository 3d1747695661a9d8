//! Helm release record types and storage naming conventions

use serde::{Deserialize, Serialize};

use crate::payload::DecodedManifest;

/// Name prefix of the Secrets Helm 3 writes for each revision
pub const RELEASE_SECRET_PREFIX: &str = "sh.helm.release.v1";

/// Key holding the encoded release inside the Secret's data
pub const RELEASE_DATA_KEY: &str = "release";

/// Secret name Helm uses for a given release revision
pub fn release_secret_name(release: &str, revision: u32) -> String {
    format!("{}.{}.v{}", RELEASE_SECRET_PREFIX, release, revision)
}

/// Parse the revision out of a `sh.helm.release.v1.<name>.v<N>` Secret name
pub fn revision_from_secret_name(secret_name: &str) -> Option<u32> {
    let (_, suffix) = secret_name.rsplit_once(".v")?;
    if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    suffix.parse().ok().filter(|r| *r > 0)
}

/// Metadata recovered from a Helm release record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Revision number as recorded by Helm
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,

    /// Helm status (deployed, superseded, failed, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub chart_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub chart_version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,
}

impl ReleaseRecord {
    /// `chart-1.2.3` style label, if the chart is known
    pub fn chart_display(&self) -> Option<String> {
        match (&self.chart_name, &self.chart_version) {
            (Some(name), Some(version)) => Some(format!("{}-{}", name, version)),
            (Some(name), None) => Some(name.clone()),
            _ => None,
        }
    }
}

/// Decoded payload split into the manifest and optional release metadata
#[derive(Debug, Clone)]
pub struct ReleaseEnvelope {
    manifest: String,
    record: Option<ReleaseRecord>,
}

// Only the manifest is required to recognise a release record
#[derive(Deserialize)]
struct ManifestOnly {
    manifest: String,
}

#[derive(Deserialize)]
struct HelmRelease {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    namespace: Option<String>,
    #[serde(default)]
    version: Option<u32>,
    #[serde(default)]
    info: Option<HelmInfo>,
    #[serde(default)]
    chart: Option<HelmChart>,
}

#[derive(Deserialize)]
struct HelmInfo {
    #[serde(default)]
    status: Option<String>,
}

#[derive(Deserialize)]
struct HelmChart {
    #[serde(default)]
    metadata: Option<HelmChartMetadata>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HelmChartMetadata {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    app_version: Option<String>,
}

impl ReleaseEnvelope {
    /// Split decoded text into manifest and metadata
    ///
    /// A JSON object with a string `manifest` field is a Helm release record;
    /// anything else is taken to be the manifest itself.
    pub fn from_decoded(decoded: DecodedManifest) -> Self {
        let text = decoded.into_string();
        if !text.trim_start().starts_with('{') {
            return Self::bare(text);
        }

        let Ok(ManifestOnly { manifest }) = serde_json::from_str::<ManifestOnly>(&text) else {
            return Self::bare(text);
        };

        let record = match serde_json::from_str::<HelmRelease>(&text) {
            Ok(release) => {
                let chart = release.chart.and_then(|c| c.metadata);
                ReleaseRecord {
                    name: release.name,
                    namespace: release.namespace,
                    version: release.version,
                    status: release.info.and_then(|i| i.status),
                    chart_name: chart.as_ref().and_then(|c| c.name.clone()),
                    chart_version: chart.as_ref().and_then(|c| c.version.clone()),
                    app_version: chart.and_then(|c| c.app_version),
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "release record metadata unreadable, using manifest only");
                ReleaseRecord::default()
            }
        };

        Self {
            manifest,
            record: Some(record),
        }
    }

    fn bare(manifest: String) -> Self {
        tracing::debug!("payload is a bare manifest, not a release record");
        Self {
            manifest,
            record: None,
        }
    }

    pub fn manifest(&self) -> &str {
        &self.manifest
    }

    pub fn record(&self) -> Option<&ReleaseRecord> {
        self.record.as_ref()
    }

    /// Revision recorded inside the payload, if any
    pub fn recorded_revision(&self) -> Option<u32> {
        self.record.as_ref().and_then(|r| r.version)
    }
}
