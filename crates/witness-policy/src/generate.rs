// crates/witness-policy/src/generate.rs
// ============================================================================
// Module: Policy Generator
// Description: Fresh policies from per-step flag bundles.
// Purpose: Turn `step=value` flags plus key and certificate files into a
//          well-formed, unsigned policy document.
// Dependencies: hex, sha2, time, witness-core
// ============================================================================

//! ## Overview
//! Every step gets the material and product attestations plus whatever
//! `--attestation step=name` adds. Public keys become key functionaries
//! keyed by the hex SHA-256 of their canonical PEM; each root CA becomes a root
//! functionary whose unspecified constraint attributes default to `*`.
//! Intermediates for a step are attached to each of that step's roots.
//! A step without functionaries, or a flag naming an undeclared step, is an
//! error.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::path::Path;

use sha2::Digest;
use sha2::Sha256;
use time::Duration;
use time::OffsetDateTime;
use witness_core::AttestorRegistry;
use witness_core::attestation::MATERIAL_TYPE;
use witness_core::attestation::PRODUCT_TYPE;
use witness_core::crypto::PublicKey;
use witness_core::crypto::signer::read_key_file;
use witness_core::crypto::x509::is_ca;
use witness_core::crypto::x509::parse_certificate_pem;
use witness_core::crypto::x509::parse_certificates_pem;
use witness_core::crypto::x509::valid_at;

use crate::error::PolicyError;
use crate::model::AttestationRequirement;
use crate::model::CertConstraint;
use crate::model::Functionary;
use crate::model::FunctionaryKind;
use crate::model::Policy;
use crate::model::PolicyPublicKey;
use crate::model::Root;
use crate::model::Step;
use crate::model::WILDCARD;

// ============================================================================
// SECTION: Options
// ============================================================================

/// Default policy lifetime.
pub const DEFAULT_EXPIRES_IN: &str = "8760h";

/// Generator inputs. Fields other than `steps`, `tsa_cas`, and `expires_in`
/// hold `step=value` entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateOptions {
    /// Step names in declaration order.
    pub steps: Vec<String>,
    /// Public key files.
    pub public_keys: Vec<String>,
    /// Root CA certificate files.
    pub root_cas: Vec<String>,
    /// Intermediate certificate files.
    pub intermediates: Vec<String>,
    /// Timestamp authority certificate files.
    pub tsa_cas: Vec<String>,
    /// Attestor names or type URIs.
    pub attestations: Vec<String>,
    /// Common-name constraints.
    pub cert_common_names: Vec<String>,
    /// DNS-name constraints.
    pub cert_dns_names: Vec<String>,
    /// Email constraints.
    pub cert_emails: Vec<String>,
    /// Organization constraints.
    pub cert_organizations: Vec<String>,
    /// URI constraints.
    pub cert_uris: Vec<String>,
    /// Upstream step names.
    pub artifacts_from: Vec<String>,
    /// Policy lifetime as a duration string such as `8760h` or `90m`.
    pub expires_in: String,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            steps: Vec::new(),
            public_keys: Vec::new(),
            root_cas: Vec::new(),
            intermediates: Vec::new(),
            tsa_cas: Vec::new(),
            attestations: Vec::new(),
            cert_common_names: Vec::new(),
            cert_dns_names: Vec::new(),
            cert_emails: Vec::new(),
            cert_organizations: Vec::new(),
            cert_uris: Vec::new(),
            artifacts_from: Vec::new(),
            expires_in: DEFAULT_EXPIRES_IN.to_string(),
        }
    }
}

// ============================================================================
// SECTION: Flag Parsing
// ============================================================================

/// Groups `step=value` entries by step, preserving value order.
///
/// # Errors
///
/// Returns [`PolicyError::Invalid`] when an entry lacks `=` or either side
/// is empty after trimming.
pub fn parse_step_mapped(
    values: &[String],
    flag: &str,
) -> Result<BTreeMap<String, Vec<String>>, PolicyError> {
    let mut mapped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for entry in values {
        let Some((step, value)) = entry.split_once('=') else {
            return Err(PolicyError::Invalid(format!("--{flag} {entry}: expected step=value")));
        };
        let (step, value) = (step.trim(), value.trim());
        if step.is_empty() || value.is_empty() {
            return Err(PolicyError::Invalid(format!(
                "--{flag} {entry}: step and value must be non-empty"
            )));
        }
        mapped.entry(step.to_string()).or_default().push(value.to_string());
    }
    Ok(mapped)
}

/// Parses a duration such as `8760h`, `1h30m`, `45s`, or `250ms`.
///
/// # Errors
///
/// Returns [`PolicyError::Invalid`] for empty input, missing or unknown
/// units, or overflow.
pub fn parse_duration(text: &str) -> Result<Duration, PolicyError> {
    let invalid = || PolicyError::Invalid(format!("invalid duration {text}"));
    let mut rest = text.trim();
    if rest.is_empty() {
        return Err(invalid());
    }
    let mut total = Duration::ZERO;
    while !rest.is_empty() {
        let digits = rest.find(|c: char| !c.is_ascii_digit()).ok_or_else(invalid)?;
        if digits == 0 {
            return Err(invalid());
        }
        let amount: i64 = rest[.. digits].parse().map_err(|_| invalid())?;
        rest = &rest[digits ..];
        let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        let part = match &rest[.. unit_len] {
            "h" => amount.checked_mul(3600).map(Duration::seconds),
            "m" => amount.checked_mul(60).map(Duration::seconds),
            "s" => Some(Duration::seconds(amount)),
            "ms" => Some(Duration::milliseconds(amount)),
            _ => None,
        }
        .ok_or_else(invalid)?;
        total = total.checked_add(part).ok_or_else(invalid)?;
        rest = &rest[unit_len ..];
    }
    Ok(total)
}

// ============================================================================
// SECTION: Generation
// ============================================================================

/// Per-step flag groups.
struct StepFlags {
    /// Public key files by step.
    public_keys: BTreeMap<String, Vec<String>>,
    /// Root CA files by step.
    root_cas: BTreeMap<String, Vec<String>>,
    /// Intermediate files by step.
    intermediates: BTreeMap<String, Vec<String>>,
    /// Attestation names by step.
    attestations: BTreeMap<String, Vec<String>>,
    /// Common names by step.
    common_names: BTreeMap<String, Vec<String>>,
    /// DNS names by step.
    dns_names: BTreeMap<String, Vec<String>>,
    /// Emails by step.
    emails: BTreeMap<String, Vec<String>>,
    /// Organizations by step.
    organizations: BTreeMap<String, Vec<String>>,
    /// URIs by step.
    uris: BTreeMap<String, Vec<String>>,
    /// Upstream steps by step.
    artifacts_from: BTreeMap<String, Vec<String>>,
}

impl StepFlags {
    /// Parses every step-mapped flag.
    fn parse(options: &GenerateOptions) -> Result<Self, PolicyError> {
        Ok(Self {
            public_keys: parse_step_mapped(&options.public_keys, "public-key")?,
            root_cas: parse_step_mapped(&options.root_cas, "root-ca")?,
            intermediates: parse_step_mapped(&options.intermediates, "intermediate")?,
            attestations: parse_step_mapped(&options.attestations, "attestation")?,
            common_names: parse_step_mapped(&options.cert_common_names, "cert-cn")?,
            dns_names: parse_step_mapped(&options.cert_dns_names, "cert-dns")?,
            emails: parse_step_mapped(&options.cert_emails, "cert-email")?,
            organizations: parse_step_mapped(&options.cert_organizations, "cert-org")?,
            uris: parse_step_mapped(&options.cert_uris, "cert-uri")?,
            artifacts_from: parse_step_mapped(&options.artifacts_from, "artifacts-from")?,
        })
    }

    /// Rejects flags naming undeclared steps.
    fn check_steps(&self, declared: &BTreeSet<&str>) -> Result<(), PolicyError> {
        let groups = [
            ("public-key", &self.public_keys),
            ("root-ca", &self.root_cas),
            ("intermediate", &self.intermediates),
            ("attestation", &self.attestations),
            ("cert-cn", &self.common_names),
            ("cert-dns", &self.dns_names),
            ("cert-email", &self.emails),
            ("cert-org", &self.organizations),
            ("cert-uri", &self.uris),
            ("artifacts-from", &self.artifacts_from),
        ];
        for (flag, group) in groups {
            if let Some(step) = group.keys().find(|step| !declared.contains(step.as_str())) {
                return Err(PolicyError::Invalid(format!(
                    "--{flag} references undeclared step {step}"
                )));
            }
        }
        for (step, upstream) in &self.artifacts_from {
            if let Some(unknown) = upstream.iter().find(|name| !declared.contains(name.as_str())) {
                return Err(PolicyError::Invalid(format!(
                    "step {step} takes artifacts from undeclared step {unknown}"
                )));
            }
        }
        Ok(())
    }

    /// Builds the certificate constraint template for a step.
    fn constraint(&self, step: &str) -> CertConstraint {
        let pick = |group: &BTreeMap<String, Vec<String>>| {
            group
                .get(step)
                .filter(|values| !values.is_empty())
                .cloned()
                .unwrap_or_else(|| vec![WILDCARD.to_string()])
        };
        CertConstraint {
            common_name: self
                .common_names
                .get(step)
                .and_then(|values| values.first())
                .cloned()
                .unwrap_or_else(|| WILDCARD.to_string()),
            dns_names: pick(&self.dns_names),
            emails: pick(&self.emails),
            organizations: pick(&self.organizations),
            uris: pick(&self.uris),
            roots: Vec::new(),
        }
    }
}

/// Generates a policy expiring `expires_in` after `now`.
///
/// # Errors
///
/// Returns [`PolicyError::Invalid`] for malformed flags, unknown steps or
/// attestors, unreadable or invalid key and certificate files, and steps
/// without functionaries.
pub fn generate_policy(
    options: &GenerateOptions,
    registry: &AttestorRegistry,
    now: OffsetDateTime,
) -> Result<Policy, PolicyError> {
    if options.steps.is_empty() {
        return Err(PolicyError::Invalid("at least one --step is required".to_string()));
    }
    let mut declared = BTreeSet::new();
    for step in &options.steps {
        if step.trim().is_empty() || !declared.insert(step.as_str()) {
            return Err(PolicyError::Invalid(format!("duplicate or empty step name \"{step}\"")));
        }
    }
    let expires_in = parse_duration(&options.expires_in)?;
    let flags = StepFlags::parse(options)?;
    flags.check_steps(&declared)?;

    let mut policy = Policy {
        expires: now + expires_in,
        roots: BTreeMap::new(),
        public_keys: BTreeMap::new(),
        timestamp_authorities: BTreeMap::new(),
        steps: BTreeMap::new(),
    };
    for path in &options.tsa_cas {
        let (id, root) = load_root(Path::new(path), &[], now)?;
        policy.timestamp_authorities.insert(id, root);
    }

    for name in &options.steps {
        let mut step = Step {
            name: name.clone(),
            functionaries: Vec::new(),
            attestations: attestations_for(name, &flags, registry)?,
            artifacts_from: flags.artifacts_from.get(name).cloned().unwrap_or_default(),
        };
        for path in flags.public_keys.get(name).map(Vec::as_slice).unwrap_or_default() {
            let (id, key) = load_public_key(Path::new(path))?;
            policy.public_keys.insert(id.clone(), key);
            step.functionaries.push(Functionary {
                kind: FunctionaryKind::PublicKey,
                cert_constraint: CertConstraint::default(),
                public_key_id: id,
            });
        }
        let intermediates = flags.intermediates.get(name).map(Vec::as_slice).unwrap_or_default();
        for path in flags.root_cas.get(name).map(Vec::as_slice).unwrap_or_default() {
            let (id, root) = load_root(Path::new(path), intermediates, now)?;
            policy.roots.insert(id.clone(), root);
            let mut constraint = flags.constraint(name);
            constraint.roots = vec![id];
            step.functionaries.push(Functionary {
                kind: FunctionaryKind::Root,
                cert_constraint: constraint,
                public_key_id: String::new(),
            });
        }
        if step.functionaries.is_empty() {
            return Err(PolicyError::Invalid(format!(
                "step {name} has no functionaries (add --public-key or --root-ca)"
            )));
        }
        policy.steps.insert(name.clone(), step);
    }
    policy.validate()?;
    Ok(policy)
}

/// Returns the always-run attestations plus the step's extras.
fn attestations_for(
    step: &str,
    flags: &StepFlags,
    registry: &AttestorRegistry,
) -> Result<Vec<AttestationRequirement>, PolicyError> {
    let mut types = vec![MATERIAL_TYPE.to_string(), PRODUCT_TYPE.to_string()];
    for name in flags.attestations.get(step).map(Vec::as_slice).unwrap_or_default() {
        let entry = registry
            .get(name)
            .map_err(|err| PolicyError::Invalid(format!("step {step}: {err}")))?;
        if !types.iter().any(|existing| existing == entry.type_uri) {
            types.push(entry.type_uri.to_string());
        }
    }
    Ok(types
        .into_iter()
        .map(|type_uri| AttestationRequirement {
            type_uri,
            rego_policies: Vec::new(),
        })
        .collect())
}

/// Loads a public key file; the id is the hex SHA-256 of its canonical PEM.
fn load_public_key(path: &Path) -> Result<(String, PolicyPublicKey), PolicyError> {
    let bytes = read_key_file(path).map_err(|err| PolicyError::Invalid(err.to_string()))?;
    let invalid =
        |err: &dyn std::fmt::Display| PolicyError::Invalid(format!("{}: {err}", path.display()));
    let text = std::str::from_utf8(&bytes).map_err(|err| invalid(&err))?;
    let key = PublicKey::from_pem(text).map_err(|err| invalid(&err))?;
    let pem = key.to_pem().map_err(|err| invalid(&err))?;
    let id = key.key_id().map_err(|err| invalid(&err))?;
    Ok((
        id.clone(),
        PolicyPublicKey {
            key_id: id,
            key: pem.into_bytes(),
        },
    ))
}

/// Loads a CA certificate file plus intermediates; the id is the hex
/// SHA-256 of the certificate file bytes.
fn load_root(
    path: &Path,
    intermediates: &[String],
    now: OffsetDateTime,
) -> Result<(String, Root), PolicyError> {
    let bytes = read_key_file(path).map_err(|err| PolicyError::Invalid(err.to_string()))?;
    let certificate = parse_certificate_pem(&bytes)
        .map_err(|err| PolicyError::Invalid(format!("{}: {err}", path.display())))?;
    if !is_ca(&certificate) {
        return Err(PolicyError::Invalid(format!("{}: certificate is not a CA", path.display())));
    }
    if !valid_at(&certificate, now) {
        return Err(PolicyError::Invalid(format!(
            "{}: certificate is not currently valid",
            path.display()
        )));
    }
    let mut root = Root {
        certificate: bytes.clone(),
        intermediates: Vec::new(),
    };
    for intermediate in intermediates {
        let path = Path::new(intermediate);
        let pem = read_key_file(path).map_err(|err| PolicyError::Invalid(err.to_string()))?;
        parse_certificates_pem(&pem)
            .map_err(|err| PolicyError::Invalid(format!("{}: {err}", path.display())))?;
        root.intermediates.push(pem);
    }
    Ok((hex::encode(Sha256::digest(&bytes)), root))
}

#[cfg(test)]
mod tests;
