// crates/witness-attestors/src/oci.rs
// ============================================================================
// Module: OCI Attestor
// Description: Image identity extracted from a saved image tarball.
// Purpose: Bind a `docker save` style archive to its image and layer IDs.
// Dependencies: tar, flate2, serde, witness-core
// ============================================================================

//! ## Overview
//! The first tar product holding a `manifest.json` is inspected. The first
//! manifest entry names the config blob, whose digest is the image ID, and
//! the layer blobs, whose uncompressed digests are the layer diff IDs.
//! Gzip layers are detected by magic bytes and decompressed while hashing.
//! Subjects are `tardigest:<sha256>`, `imageid:<sha256>`, and
//! `layerdiffidNN:<sha256>` with `NN` the zero-padded layer index.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufRead;
use std::io::BufReader;
use std::io::Read;
use std::path::Path;

use flate2::read::GzDecoder;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use witness_core::AttestationContext;
use witness_core::AttestationError;
use witness_core::Attestor;
use witness_core::AttestorOptions;
use witness_core::Capability;
use witness_core::DigestSet;
use witness_core::HashFunction;
use witness_core::RunPhase;
use witness_core::core::encoding::base64_bytes;

use crate::ingest::MAX_DOCUMENT_BYTES;
use crate::ingest::find_candidate;
use crate::mime::OCTET_STREAM_MIME;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Attestor name.
pub const NAME: &str = "oci";

/// Predicate type URI.
pub const TYPE_URI: &str = "https://witness.dev/attestations/oci/v0.1";

/// Tar archive label.
pub const TAR_MIME: &str = "application/x-tar";

/// Accepted product MIME types.
const ACCEPTED: &[&str] = &[TAR_MIME, OCTET_STREAM_MIME];

/// Declared capabilities.
const CAPABILITIES: &[Capability] = &[Capability::Subjects];

/// Archive member holding the image manifest.
const MANIFEST_NAME: &str = "manifest.json";

/// Gzip magic bytes.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

// ============================================================================
// SECTION: Types
// ============================================================================

/// One entry of a saved-image manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Config blob path inside the archive.
    #[serde(rename = "Config")]
    pub config: String,
    /// Repository tags.
    #[serde(rename = "RepoTags", default)]
    pub repo_tags: Vec<String>,
    /// Layer blob paths in application order.
    #[serde(rename = "Layers", default)]
    pub layers: Vec<String>,
}

/// OCI payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OciPredicate {
    /// Archive digest.
    pub tardigest: DigestSet,
    /// Parsed manifest.
    pub manifest: Vec<ManifestEntry>,
    /// Tags of the first manifest entry.
    pub imagetags: Vec<String>,
    /// Uncompressed layer digests in manifest order.
    pub diffids: Vec<DigestSet>,
    /// Config blob digest.
    pub imageid: DigestSet,
    /// Raw manifest bytes.
    #[serde(with = "base64_bytes")]
    pub manifestraw: Vec<u8>,
}

/// OCI attestor.
#[derive(Debug, Default)]
pub struct OciAttestor {
    /// Recorded payload.
    predicate: OciPredicate,
}

impl OciAttestor {
    /// Creates an OCI attestor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the recorded payload.
    #[must_use]
    pub const fn predicate_data(&self) -> &OciPredicate {
        &self.predicate
    }

    /// Registry factory.
    ///
    /// # Errors
    ///
    /// Never fails; the signature matches the registry factory type.
    pub fn factory(_options: &AttestorOptions) -> Result<Box<dyn Attestor>, AttestationError> {
        Ok(Box::new(Self::new()))
    }
}

impl Attestor for OciAttestor {
    fn name(&self) -> &str {
        NAME
    }

    fn type_uri(&self) -> &str {
        TYPE_URI
    }

    fn phase(&self) -> RunPhase {
        RunPhase::PostProduct
    }

    fn capabilities(&self) -> &[Capability] {
        CAPABILITIES
    }

    fn attest(&mut self, context: &AttestationContext) -> Result<(), AttestationError> {
        let hashes = context.hashes();
        let candidate = find_candidate(context, ACCEPTED, "no image tarball found", |_, path| {
            inspect_image(path, hashes).ok().flatten()
        })?;
        let mut predicate = candidate.parsed;
        predicate.tardigest = candidate.digest;
        self.predicate = predicate;
        Ok(())
    }

    fn predicate(&self) -> Result<Value, AttestationError> {
        Ok(serde_json::to_value(&self.predicate)?)
    }

    fn subjects(&self) -> BTreeMap<String, DigestSet> {
        let mut subjects = BTreeMap::new();
        if let Some(sha) = self.predicate.tardigest.get(HashFunction::Sha256) {
            subjects.insert(format!("tardigest:{sha}"), self.predicate.tardigest.clone());
        }
        if let Some(sha) = self.predicate.imageid.get(HashFunction::Sha256) {
            subjects.insert(format!("imageid:{sha}"), self.predicate.imageid.clone());
        }
        for (index, layer) in self.predicate.diffids.iter().enumerate() {
            if let Some(sha) = layer.get(HashFunction::Sha256) {
                subjects.insert(format!("layerdiffid{index:02}:{sha}"), layer.clone());
            }
        }
        subjects
    }
}

// ============================================================================
// SECTION: Archive Inspection
// ============================================================================

/// Reads the manifest, config digest, and layer diff IDs from an archive.
///
/// Returns `Ok(None)` when the archive has no usable manifest.
///
/// # Errors
///
/// Returns [`AttestationError::Io`] when the archive cannot be read and
/// [`AttestationError::Digest`] when hashing fails.
pub fn inspect_image(
    path: &Path,
    hashes: &[HashFunction],
) -> Result<Option<OciPredicate>, AttestationError> {
    let Some(raw) = read_member(path, MANIFEST_NAME)? else {
        return Ok(None);
    };
    let Ok(manifest) = serde_json::from_slice::<Vec<ManifestEntry>>(&raw) else {
        return Ok(None);
    };
    let Some(first) = manifest.first().cloned() else {
        return Ok(None);
    };

    let mut config = None;
    let mut layers: BTreeMap<String, DigestSet> = BTreeMap::new();
    let mut archive = tar::Archive::new(File::open(path)?);
    for entry in archive.entries()? {
        let mut entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let name = member_name(&entry)?;
        if name == first.config {
            config = Some(DigestSet::from_reader(&mut entry, hashes)?);
        } else if first.layers.contains(&name) {
            layers.insert(name, hash_layer(entry, hashes)?);
        }
    }

    let Some(imageid) = config else {
        return Ok(None);
    };
    let diffids = first.layers.iter().filter_map(|layer| layers.get(layer).cloned()).collect();
    Ok(Some(OciPredicate {
        tardigest: DigestSet::new(),
        imagetags: first.repo_tags.clone(),
        manifest,
        diffids,
        imageid,
        manifestraw: raw,
    }))
}

/// Returns the bytes of one archive member, bounded by the document limit.
fn read_member(path: &Path, wanted: &str) -> Result<Option<Vec<u8>>, AttestationError> {
    let mut archive = tar::Archive::new(File::open(path)?);
    for entry in archive.entries()? {
        let entry = entry?;
        if !entry.header().entry_type().is_file() || member_name(&entry)? != wanted {
            continue;
        }
        let mut bytes = Vec::new();
        entry.take(MAX_DOCUMENT_BYTES).read_to_end(&mut bytes)?;
        return Ok(Some(bytes));
    }
    Ok(None)
}

/// Returns a member path without a leading `./`.
fn member_name<R: Read>(entry: &tar::Entry<'_, R>) -> Result<String, AttestationError> {
    let path = entry.path()?;
    let name = path.to_string_lossy();
    Ok(name.strip_prefix("./").unwrap_or(&name).to_string())
}

/// Hashes a layer, decompressing gzip content first.
fn hash_layer<R: Read>(entry: R, hashes: &[HashFunction]) -> Result<DigestSet, AttestationError> {
    let mut reader = BufReader::new(entry);
    let gzipped = reader.fill_buf()?.starts_with(&GZIP_MAGIC);
    if gzipped {
        Ok(DigestSet::from_reader(&mut GzDecoder::new(reader), hashes)?)
    } else {
        Ok(DigestSet::from_reader(&mut reader, hashes)?)
    }
}

// ============================================================================
// SECTION: Schema
// ============================================================================

/// JSON schema of the OCI payload.
#[must_use]
pub fn schema() -> Value {
    let digest = crate::registry::digest_set_schema();
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "oci",
        "type": "object",
        "required": ["tardigest", "manifest", "imagetags", "diffids", "imageid", "manifestraw"],
        "properties": {
            "tardigest": digest,
            "manifest": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "Config": {"type": "string"},
                        "RepoTags": {"type": "array", "items": {"type": "string"}},
                        "Layers": {"type": "array", "items": {"type": "string"}},
                    },
                },
            },
            "imagetags": {"type": "array", "items": {"type": "string"}},
            "diffids": {"type": "array", "items": digest},
            "imageid": digest,
            "manifestraw": {"type": "string"},
        },
    })
}

#[cfg(test)]
mod tests;
