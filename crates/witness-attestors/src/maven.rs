// crates/witness-attestors/src/maven.rs
// ============================================================================
// Module: Maven Attestor
// Description: Project coordinates and dependencies from a POM.
// Purpose: Record what a Maven build declares before it runs.
// Dependencies: quick-xml, serde, witness-core
// ============================================================================

//! ## Overview
//! The POM path defaults to `pom.xml` and resolves against the working
//! directory. Subjects are the coordinate strings
//! `project:<group>/<artifact>@<version>` and
//! `dependency:<group>/<artifact>@<version>`, each hashed over the full
//! subject string.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

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
use witness_core::RunPhase;

use crate::ingest::read_document;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Attestor name.
pub const NAME: &str = "maven";

/// Predicate type URI.
pub const TYPE_URI: &str = "https://witness.dev/attestations/maven/v0.1";

/// Option key overriding the POM path.
pub const OPTION_POM_PATH: &str = "pom-path";

/// Default POM path.
pub const DEFAULT_POM_PATH: &str = "pom.xml";

/// Declared capabilities.
const CAPABILITIES: &[Capability] = &[Capability::Subjects];

// ============================================================================
// SECTION: POM Model
// ============================================================================

/// `<project>` element.
#[derive(Debug, Default, Deserialize)]
#[serde(rename = "project", default)]
struct PomProject {
    /// `<groupId>`.
    #[serde(rename = "groupId")]
    group_id: String,
    /// `<artifactId>`.
    #[serde(rename = "artifactId")]
    artifact_id: String,
    /// `<version>`.
    version: String,
    /// `<name>`.
    name: String,
    /// `<dependencies>`.
    dependencies: PomDependencies,
}

/// `<dependencies>` element.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PomDependencies {
    /// `<dependency>` children.
    dependency: Vec<PomDependency>,
}

/// `<dependency>` element.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PomDependency {
    /// `<groupId>`.
    #[serde(rename = "groupId")]
    group_id: String,
    /// `<artifactId>`.
    #[serde(rename = "artifactId")]
    artifact_id: String,
    /// `<version>`.
    version: String,
    /// `<scope>`.
    scope: String,
}

// ============================================================================
// SECTION: Types
// ============================================================================

/// Declared dependency.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MavenDependency {
    /// Group identifier.
    pub groupid: String,
    /// Artifact identifier.
    pub artifactid: String,
    /// Version.
    pub version: String,
    /// Scope.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub scope: String,
}

/// Maven payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MavenPredicate {
    /// Group identifier.
    pub groupid: String,
    /// Artifact identifier.
    pub artifactid: String,
    /// Version.
    pub version: String,
    /// Project display name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub projectname: String,
    /// Declared dependencies.
    #[serde(default)]
    pub dependencies: Vec<MavenDependency>,
}

/// Maven attestor.
#[derive(Debug)]
pub struct MavenAttestor {
    /// POM path relative to the working directory.
    pom_path: String,
    /// Recorded payload.
    predicate: MavenPredicate,
    /// Derived subjects.
    subjects: BTreeMap<String, DigestSet>,
}

impl Default for MavenAttestor {
    fn default() -> Self {
        Self::new(DEFAULT_POM_PATH)
    }
}

impl MavenAttestor {
    /// Creates an attestor for a POM path.
    #[must_use]
    pub fn new(pom_path: impl Into<String>) -> Self {
        Self {
            pom_path: pom_path.into(),
            predicate: MavenPredicate::default(),
            subjects: BTreeMap::new(),
        }
    }

    /// Returns the recorded payload.
    #[must_use]
    pub const fn predicate_data(&self) -> &MavenPredicate {
        &self.predicate
    }

    /// Registry factory reading `pom-path`.
    ///
    /// # Errors
    ///
    /// Never fails; the signature matches the registry factory type.
    pub fn factory(options: &AttestorOptions) -> Result<Box<dyn Attestor>, AttestationError> {
        Ok(Box::new(Self::new(options.get(OPTION_POM_PATH).unwrap_or(DEFAULT_POM_PATH))))
    }
}

/// Parses POM XML into the payload.
///
/// # Errors
///
/// Returns [`AttestationError::Serialization`] for malformed XML.
pub fn parse_pom(xml: &str) -> Result<MavenPredicate, AttestationError> {
    let project: PomProject = quick_xml::de::from_str(xml)
        .map_err(|err| AttestationError::Serialization(format!("invalid pom: {err}")))?;
    Ok(MavenPredicate {
        groupid: project.group_id,
        artifactid: project.artifact_id,
        version: project.version,
        projectname: project.name,
        dependencies: project
            .dependencies
            .dependency
            .into_iter()
            .map(|dependency| MavenDependency {
                groupid: dependency.group_id,
                artifactid: dependency.artifact_id,
                version: dependency.version,
                scope: dependency.scope,
            })
            .collect(),
    })
}

impl Attestor for MavenAttestor {
    fn name(&self) -> &str {
        NAME
    }

    fn type_uri(&self) -> &str {
        TYPE_URI
    }

    fn phase(&self) -> RunPhase {
        RunPhase::PreMaterial
    }

    fn capabilities(&self) -> &[Capability] {
        CAPABILITIES
    }

    fn attest(&mut self, context: &AttestationContext) -> Result<(), AttestationError> {
        let path = context.working_dir().join(&self.pom_path);
        let bytes = read_document(&path).ok_or_else(|| {
            AttestationError::Io(format!("failed to read {}", path.display()))
        })?;
        self.predicate = parse_pom(&String::from_utf8_lossy(&bytes))?;

        let hashes = context.hashes();
        let predicate = &self.predicate;
        let mut names = vec![format!(
            "project:{}/{}@{}",
            predicate.groupid, predicate.artifactid, predicate.version
        )];
        names.extend(predicate.dependencies.iter().map(|dependency| {
            format!(
                "dependency:{}/{}@{}",
                dependency.groupid, dependency.artifactid, dependency.version
            )
        }));
        let mut subjects = BTreeMap::new();
        for name in names {
            let digest = DigestSet::from_bytes(name.as_bytes(), hashes)?;
            subjects.insert(name, digest);
        }
        self.subjects = subjects;
        Ok(())
    }

    fn predicate(&self) -> Result<Value, AttestationError> {
        Ok(serde_json::to_value(&self.predicate)?)
    }

    fn subjects(&self) -> BTreeMap<String, DigestSet> {
        self.subjects.clone()
    }
}

// ============================================================================
// SECTION: Schema
// ============================================================================

/// JSON schema of the Maven payload.
#[must_use]
pub fn schema() -> Value {
    let text = json!({"type": "string"});
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "maven",
        "type": "object",
        "required": ["groupid", "artifactid", "version", "dependencies"],
        "properties": {
            "groupid": text,
            "artifactid": text,
            "version": text,
            "projectname": text,
            "dependencies": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["groupid", "artifactid", "version"],
                    "properties": {
                        "groupid": text,
                        "artifactid": text,
                        "version": text,
                        "scope": text,
                    },
                },
            },
        },
    })
}
