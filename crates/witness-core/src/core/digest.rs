// crates/witness-core/src/core/digest.rs
// ============================================================================
// Module: Digest Primitives
// Description: Named hash functions, digest sets, and single-pass hashing.
// Purpose: Provide the content-addressing vocabulary shared by attestors,
//          envelopes, and policy verification.
// Dependencies: sha1, sha2, hex, serde
// ============================================================================

//! ## Overview
//! A [`DigestSet`] maps hash-function identifiers to lowercase hex digests.
//! Readers are consumed exactly once; every requested hash function is fed
//! from the same buffer. Gitoid variants are computed over the git blob
//! framing (`blob <len>\0<content>`) and rendered as
//! `gitoid:blob:<alg>:<hex>`.
//!
//! Equality between digest sets is a compatibility relation: every shared
//! hash must agree and at least one hash must be shared. Use
//! [`DigestSet::equal`] for that relation; `==` compares structurally.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::fs::File;
use std::io;
use std::io::Read;
use std::path::Path;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use serde::de;
use sha1::Sha1;
use sha2::Digest;
use sha2::Sha256;
use sha2::Sha384;
use sha2::Sha512;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Read buffer size used when streaming content into hashers.
const READ_CHUNK_BYTES: usize = 64 * 1024;

/// Hash functions used when callers do not configure any.
pub const DEFAULT_HASHES: &[HashFunction] = &[HashFunction::Sha256];

// ============================================================================
// SECTION: Hash Functions
// ============================================================================

/// Closed set of supported hash functions.
///
/// # Invariants
/// - Variant order matches the lexicographic order of [`HashFunction::name`],
///   so ordered maps keyed by this type serialize with sorted digest names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HashFunction {
    /// Git object identifier over SHA-1.
    GitoidSha1,
    /// Git object identifier over SHA-256.
    GitoidSha256,
    /// SHA-1.
    Sha1,
    /// SHA-256.
    Sha256,
    /// SHA-384.
    Sha384,
    /// SHA-512.
    Sha512,
}

impl HashFunction {
    /// Every supported hash function in canonical order.
    pub const ALL: [Self; 6] = [
        Self::GitoidSha1,
        Self::GitoidSha256,
        Self::Sha1,
        Self::Sha256,
        Self::Sha384,
        Self::Sha512,
    ];

    /// Returns the wire name of the hash function.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::GitoidSha1 => "gitoid:sha1",
            Self::GitoidSha256 => "gitoid:sha256",
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
            Self::Sha384 => "sha384",
            Self::Sha512 => "sha512",
        }
    }

    /// Returns true for the gitoid content-address variants.
    #[must_use]
    pub const fn is_gitoid(self) -> bool {
        matches!(self, Self::GitoidSha1 | Self::GitoidSha256)
    }
}

impl fmt::Display for HashFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashFunction {
    type Err = DigestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|hash| hash.name() == normalized)
            .ok_or_else(|| DigestError::UnsupportedHash(value.to_string()))
    }
}

impl Serialize for HashFunction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for HashFunction {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while hashing content.
#[derive(Debug, Error)]
pub enum DigestError {
    /// Hash name is not in the supported set.
    #[error("unsupported hash function: {0}")]
    UnsupportedHash(String),
    /// No hash functions were requested.
    #[error("at least one hash function is required")]
    EmptyHashList,
    /// Target is a directory or character device.
    #[error("not a regular file: {0}")]
    NotAFile(PathBuf),
    /// Underlying I/O failure.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

// ============================================================================
// SECTION: Digest Set
// ============================================================================

/// Named digests of one piece of content.
///
/// # Invariants
/// - Values are lowercase hex (gitoid values carry their `gitoid:blob:` prefix).
/// - Keys iterate in lexicographic name order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DigestSet {
    /// Digest values keyed by hash function.
    digests: BTreeMap<HashFunction, String>,
}

impl DigestSet {
    /// Creates an empty digest set.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            digests: BTreeMap::new(),
        }
    }

    /// Inserts or replaces a digest value.
    pub fn insert(&mut self, hash: HashFunction, value: impl Into<String>) {
        self.digests.insert(hash, value.into());
    }

    /// Returns the digest for a hash function.
    #[must_use]
    pub fn get(&self, hash: HashFunction) -> Option<&str> {
        self.digests.get(&hash).map(String::as_str)
    }

    /// Returns the number of digests held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.digests.len()
    }

    /// Returns true when no digests are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }

    /// Iterates digests in canonical name order.
    pub fn iter(&self) -> impl Iterator<Item = (HashFunction, &str)> {
        self.digests.iter().map(|(hash, value)| (*hash, value.as_str()))
    }

    /// Returns true when every shared hash agrees and at least one is shared.
    #[must_use]
    pub fn equal(&self, other: &Self) -> bool {
        let mut shared = false;
        for (hash, value) in &self.digests {
            let Some(other_value) = other.digests.get(hash) else {
                continue;
            };
            if other_value != value {
                return false;
            }
            shared = true;
        }
        shared
    }

    /// Hashes a reader in a single pass with every requested function.
    ///
    /// # Errors
    ///
    /// Returns [`DigestError::EmptyHashList`] when `hashes` is empty and
    /// [`DigestError::Io`] when reading fails.
    pub fn from_reader<R: Read + ?Sized>(
        reader: &mut R,
        hashes: &[HashFunction],
    ) -> Result<Self, DigestError> {
        if hashes.is_empty() {
            return Err(DigestError::EmptyHashList);
        }
        let mut fanout = HashFanout::new(hashes);
        let mut buffer = vec![0_u8; READ_CHUNK_BYTES];
        loop {
            let read = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(read) => read,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(DigestError::Io(err)),
            };
            fanout.update(&buffer[.. read]);
        }
        Ok(fanout.finish())
    }

    /// Hashes an in-memory byte slice.
    ///
    /// # Errors
    ///
    /// Returns [`DigestError::EmptyHashList`] when `hashes` is empty.
    pub fn from_bytes(bytes: &[u8], hashes: &[HashFunction]) -> Result<Self, DigestError> {
        let mut cursor = bytes;
        Self::from_reader(&mut cursor, hashes)
    }

    /// Hashes a file, following symlinks to their regular-file target.
    ///
    /// # Errors
    ///
    /// Returns [`DigestError::NotAFile`] for directories and character devices
    /// and [`DigestError::Io`] when the file cannot be read.
    pub fn from_file(path: &Path, hashes: &[HashFunction]) -> Result<Self, DigestError> {
        let metadata = fs::metadata(path)?;
        if metadata.is_dir() || is_char_device(&metadata) {
            return Err(DigestError::NotAFile(path.to_path_buf()));
        }
        let mut file = File::open(path)?;
        Self::from_reader(&mut file, hashes)
    }
}

impl Serialize for DigestSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let named: BTreeMap<&str, &str> =
            self.digests.iter().map(|(hash, value)| (hash.name(), value.as_str())).collect();
        named.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for DigestSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<String, String>::deserialize(deserializer)?;
        let mut digests = BTreeMap::new();
        for (name, value) in raw {
            let hash: HashFunction = name.parse().map_err(de::Error::custom)?;
            digests.insert(hash, value);
        }
        Ok(Self {
            digests,
        })
    }
}

impl FromIterator<(HashFunction, String)> for DigestSet {
    fn from_iter<I: IntoIterator<Item = (HashFunction, String)>>(iter: I) -> Self {
        Self {
            digests: iter.into_iter().collect(),
        }
    }
}

// ============================================================================
// SECTION: Raw Digests
// ============================================================================

/// Returns the raw digest bytes of `bytes` under one hash function.
///
/// Gitoid variants return the digest over the git blob framing.
#[must_use]
pub fn digest_bytes(hash: HashFunction, bytes: &[u8]) -> Vec<u8> {
    let mut fanout = HashFanout::new(&[hash]);
    fanout.update(bytes);
    fanout.finish_raw().into_iter().map(|(_, raw)| raw).next().unwrap_or_default()
}

/// Returns the raw digest bytes of a reader under one hash function.
///
/// # Errors
///
/// Returns [`DigestError::Io`] when reading fails.
pub fn digest_reader<R: Read + ?Sized>(
    hash: HashFunction,
    reader: &mut R,
) -> Result<Vec<u8>, DigestError> {
    let mut content = Vec::new();
    reader.read_to_end(&mut content)?;
    Ok(digest_bytes(hash, &content))
}

/// Returns the raw digest bytes of a file under one hash function.
///
/// # Errors
///
/// Returns [`DigestError::NotAFile`] or [`DigestError::Io`] as for
/// [`DigestSet::from_file`].
pub fn digest_file(hash: HashFunction, path: &Path) -> Result<Vec<u8>, DigestError> {
    let metadata = fs::metadata(path)?;
    if metadata.is_dir() || is_char_device(&metadata) {
        return Err(DigestError::NotAFile(path.to_path_buf()));
    }
    let mut file = File::open(path)?;
    digest_reader(hash, &mut file)
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Running hasher state for one hash function.
enum HashState {
    /// SHA-1 state.
    Sha1(Sha1),
    /// SHA-256 state.
    Sha256(Sha256),
    /// SHA-384 state.
    Sha384(Sha384),
    /// SHA-512 state.
    Sha512(Sha512),
}

/// Fans one byte stream out to several hashers.
struct HashFanout {
    /// Streaming hashers for plain digests.
    states: Vec<(HashFunction, HashState)>,
    /// Requested gitoid variants.
    gitoids: Vec<HashFunction>,
    /// Content retained for gitoid framing, only when a gitoid was requested.
    retained: Vec<u8>,
}

impl HashFanout {
    /// Creates hasher state for the requested functions.
    fn new(hashes: &[HashFunction]) -> Self {
        let mut states = Vec::new();
        let mut gitoids = Vec::new();
        for hash in hashes {
            let state = match hash {
                HashFunction::Sha1 => HashState::Sha1(Sha1::new()),
                HashFunction::Sha256 => HashState::Sha256(Sha256::new()),
                HashFunction::Sha384 => HashState::Sha384(Sha384::new()),
                HashFunction::Sha512 => HashState::Sha512(Sha512::new()),
                HashFunction::GitoidSha1 | HashFunction::GitoidSha256 => {
                    if !gitoids.contains(hash) {
                        gitoids.push(*hash);
                    }
                    continue;
                }
            };
            if states.iter().all(|(existing, _)| existing != hash) {
                states.push((*hash, state));
            }
        }
        Self {
            states,
            gitoids,
            retained: Vec::new(),
        }
    }

    /// Feeds a chunk to every hasher.
    fn update(&mut self, chunk: &[u8]) {
        for (_, state) in &mut self.states {
            match state {
                HashState::Sha1(hasher) => hasher.update(chunk),
                HashState::Sha256(hasher) => hasher.update(chunk),
                HashState::Sha384(hasher) => hasher.update(chunk),
                HashState::Sha512(hasher) => hasher.update(chunk),
            }
        }
        if !self.gitoids.is_empty() {
            self.retained.extend_from_slice(chunk);
        }
    }

    /// Finalizes into raw digest bytes per hash function.
    fn finish_raw(self) -> Vec<(HashFunction, Vec<u8>)> {
        let mut out = Vec::with_capacity(self.states.len() + self.gitoids.len());
        for (hash, state) in self.states {
            let raw = match state {
                HashState::Sha1(hasher) => hasher.finalize().to_vec(),
                HashState::Sha256(hasher) => hasher.finalize().to_vec(),
                HashState::Sha384(hasher) => hasher.finalize().to_vec(),
                HashState::Sha512(hasher) => hasher.finalize().to_vec(),
            };
            out.push((hash, raw));
        }
        let header = format!("blob {}\0", self.retained.len());
        for hash in self.gitoids {
            let raw = if hash == HashFunction::GitoidSha1 {
                let mut hasher = Sha1::new();
                hasher.update(header.as_bytes());
                hasher.update(&self.retained);
                hasher.finalize().to_vec()
            } else {
                let mut hasher = Sha256::new();
                hasher.update(header.as_bytes());
                hasher.update(&self.retained);
                hasher.finalize().to_vec()
            };
            out.push((hash, raw));
        }
        out
    }

    /// Finalizes into a digest set with rendered values.
    fn finish(self) -> DigestSet {
        self.finish_raw()
            .into_iter()
            .map(|(hash, raw)| {
                let value = match hash {
                    HashFunction::GitoidSha1 => format!("gitoid:blob:sha1:{}", hex::encode(raw)),
                    HashFunction::GitoidSha256 => {
                        format!("gitoid:blob:sha256:{}", hex::encode(raw))
                    }
                    _ => hex::encode(raw),
                };
                (hash, value)
            })
            .collect()
    }
}

/// Returns true when metadata describes a character device.
#[cfg(unix)]
fn is_char_device(metadata: &fs::Metadata) -> bool {
    use std::os::unix::fs::FileTypeExt;
    metadata.file_type().is_char_device()
}

/// Returns true when metadata describes a character device.
#[cfg(not(unix))]
const fn is_char_device(_metadata: &fs::Metadata) -> bool {
    false
}
