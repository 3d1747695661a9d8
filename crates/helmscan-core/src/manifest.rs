//! Multi-document manifest parsing
//!
//! A rendered release manifest is a stream of YAML documents separated by
//! `---` lines, each usually preceded by a `# Source:` comment naming the
//! template it came from. Parsing extracts a [`ResourceRef`] per document and
//! never lets one bad document hide the others:
//!
//! - blank and comment-only documents are ignored
//! - documents with neither `kind` nor `metadata.name` are not resources and
//!   are dropped silently
//! - invalid YAML or half-specified resources are dropped with a
//!   [`ParseWarning`]
//!
//! Only a manifest in which every document is unreadable is an error.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::resource::ResourceRef;

/// Comment Helm writes above each rendered template
const SOURCE_PREFIX: &str = "# Source:";

/// A document that was skipped for a reason worth reporting
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParseWarning {
    /// Position among the non-empty documents of the manifest (0-based)
    pub index: usize,
    /// Template path from the `# Source:` comment, if present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub message: String,
}

impl std::fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.source {
            Some(source) => write!(f, "document {} ({}): {}", self.index, source, self.message),
            None => write!(f, "document {}: {}", self.index, self.message),
        }
    }
}

/// Resources of a manifest in document order, plus soft warnings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedManifest {
    pub resources: Vec<ResourceRef>,
    pub warnings: Vec<ParseWarning>,
}

/// What a single document turned out to be
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentOutcome {
    Resource(ResourceRef),
    /// Not a resource (empty, comments only, notes, scalar ...)
    Skipped,
    /// Unreadable YAML
    Malformed(String),
    /// Looks like a resource but lacks an identifying field
    Incomplete(String),
}

// Only the identifying fields are decoded; everything else is ignored
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocumentHeader {
    #[serde(default)]
    api_version: Option<String>,
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    metadata: Option<MetadataHeader>,
}

#[derive(Deserialize)]
struct MetadataHeader {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    namespace: Option<String>,
}

impl DocumentHeader {
    fn into_outcome(self) -> DocumentOutcome {
        let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());

        let api_version = non_empty(self.api_version);
        let kind = non_empty(self.kind);
        let (name, namespace) = match self.metadata {
            Some(meta) => (non_empty(meta.name), non_empty(meta.namespace)),
            None => (None, None),
        };

        match (api_version, kind, name) {
            (_, None, None) => DocumentOutcome::Skipped,
            (Some(api_version), Some(kind), Some(name)) => {
                match ResourceRef::new(api_version, kind, namespace, name) {
                    Some(resource) => DocumentOutcome::Resource(resource),
                    None => DocumentOutcome::Skipped,
                }
            }
            (api_version, kind, name) => {
                let mut missing = Vec::with_capacity(3);
                if api_version.is_none() {
                    missing.push("apiVersion");
                }
                if kind.is_none() {
                    missing.push("kind");
                }
                if name.is_none() {
                    missing.push("metadata.name");
                }
                DocumentOutcome::Incomplete(format!("resource missing {}", missing.join(", ")))
            }
        }
    }
}

/// Split a manifest on `---` separator lines
///
/// A separator is a line starting with `---` followed only by whitespace or a
/// comment. The returned slices may be blank.
pub fn split_documents(manifest: &str) -> Vec<&str> {
    let mut documents = Vec::new();
    let mut start = 0;
    let mut offset = 0;

    for line in manifest.split_inclusive('\n') {
        if is_separator(line) {
            documents.push(&manifest[start..offset]);
            start = offset + line.len();
        }
        offset += line.len();
    }
    documents.push(&manifest[start..]);

    documents
}

fn is_separator(line: &str) -> bool {
    match line.strip_prefix("---") {
        Some(rest) => {
            let rest = rest.trim();
            rest.is_empty() || rest.starts_with('#')
        }
        None => false,
    }
}

/// Whether a document holds nothing but whitespace and comments
fn is_blank(doc: &str) -> bool {
    doc.lines()
        .all(|l| l.trim().is_empty() || l.trim_start().starts_with('#'))
}

/// Template path from a `# Source:` comment
fn source_of(doc: &str) -> Option<String> {
    doc.lines()
        .map(str::trim)
        .find_map(|l| l.strip_prefix(SOURCE_PREFIX))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Classify one document
pub fn parse_document(doc: &str) -> DocumentOutcome {
    if is_blank(doc) {
        return DocumentOutcome::Skipped;
    }
    let value = match serde_yaml::from_str::<serde_yaml::Value>(doc) {
        Ok(value) => value,
        Err(e) => return DocumentOutcome::Malformed(e.to_string()),
    };
    if !value.is_mapping() {
        return DocumentOutcome::Skipped;
    }
    match serde_yaml::from_value::<DocumentHeader>(value) {
        Ok(header) => header.into_outcome(),
        Err(e) => DocumentOutcome::Incomplete(format!("unreadable identifying fields: {}", e)),
    }
}

/// Parse a manifest into resource references in document order
pub fn parse(manifest: &str) -> Result<ParsedManifest> {
    let mut parsed = ParsedManifest::default();
    let mut readable = 0usize;
    let mut malformed = 0usize;
    let mut first_error = None;

    // Helm manifests open with `---`; empty segments do not count
    let documents = split_documents(manifest).into_iter().filter(|doc| !is_blank(doc));
    for (index, doc) in documents.enumerate() {
        let warning = |message: String| ParseWarning {
            index,
            source: source_of(doc),
            message,
        };

        match parse_document(doc) {
            DocumentOutcome::Resource(resource) => {
                readable += 1;
                parsed.resources.push(resource);
            }
            DocumentOutcome::Skipped => {
                readable += 1;
                tracing::debug!(index, "skipping non-resource document");
            }
            DocumentOutcome::Incomplete(message) => {
                readable += 1;
                let w = warning(message);
                tracing::warn!(warning = %w, "skipping incomplete resource");
                parsed.warnings.push(w);
            }
            DocumentOutcome::Malformed(message) => {
                malformed += 1;
                let w = warning(format!("invalid YAML: {}", message));
                tracing::warn!(warning = %w, "skipping malformed document");
                first_error.get_or_insert_with(|| w.to_string());
                parsed.warnings.push(w);
            }
        }
    }

    if readable == 0 && malformed > 0 {
        return Err(CoreError::parse(format!(
            "none of the {} document(s) could be read; first error: {}",
            malformed,
            first_error.unwrap_or_default()
        )));
    }

    tracing::debug!(
        resources = parsed.resources.len(),
        warnings = parsed.warnings.len(),
        "parsed release manifest"
    );
    Ok(parsed)
}
