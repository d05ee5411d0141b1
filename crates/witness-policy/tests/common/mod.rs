// crates/witness-policy/tests/common/mod.rs
// ============================================================================
// Module: Policy Test Helpers
// Description: Signers, collection envelopes, and policy builders.
// Purpose: Assemble end-to-end verification fixtures without files.
// Dependencies: rcgen, ed25519-dalek, rand, time, witness-core, witness-policy
// ============================================================================

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    dead_code,
    reason = "Shared helpers are used by a subset of test binaries."
)]

use std::collections::BTreeMap;

use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use rcgen::BasicConstraints;
use rcgen::CertificateParams;
use rcgen::DistinguishedName;
use rcgen::DnType;
use rcgen::IsCa;
use rcgen::Issuer;
use rcgen::KeyPair;
use serde_json::Value;
use serde_json::json;
use time::OffsetDateTime;
use witness_core::COLLECTION_TYPE;
use witness_core::Collection;
use witness_core::DigestSet;
use witness_core::Envelope;
use witness_core::HashFunction;
use witness_core::Signer;
use witness_core::Statement;
use witness_core::attestation::MATERIAL_TYPE;
use witness_core::attestation::PRODUCT_TYPE;
use witness_core::attestation::collection::CollectionAttestation;
use witness_core::crypto::KeySigner;
use witness_core::crypto::PrivateKey;
use witness_core::crypto::X509Signer;
use witness_core::crypto::key_id_from_pem;
use witness_core::crypto::signer::load_signer_from_pem;
use witness_core::crypto::x509::parse_certificate_pem;
use witness_core::envelope;
use witness_core::envelope::INTOTO_PAYLOAD_TYPE;
use witness_policy::Policy;
use witness_policy::model::AttestationRequirement;
use witness_policy::model::CertConstraint;
use witness_policy::model::Functionary;
use witness_policy::model::FunctionaryKind;
use witness_policy::model::PolicyPublicKey;
use witness_policy::model::Root;
use witness_policy::model::Step;

// ============================================================================
// SECTION: Signers
// ============================================================================

/// Returns a fresh Ed25519 signer.
pub fn ed25519_signer() -> KeySigner {
    KeySigner::new(PrivateKey::Ed25519(SigningKey::generate(&mut OsRng)))
}

/// Generated CA plus a leaf carrying one organization.
pub struct TestPki {
    /// CA certificate PEM.
    pub ca_pem: String,
    /// Leaf certificate PEM.
    pub leaf_pem: String,
    /// Leaf private key PEM.
    pub leaf_key_pem: String,
}

/// Generates a CA and a leaf with the given common name and organization.
pub fn generate_pki(common_name: &str, organization: &str) -> TestPki {
    let ca_key = KeyPair::generate().unwrap();
    let mut ca_params = CertificateParams::default();
    ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    let mut ca_name = DistinguishedName::new();
    ca_name.push(DnType::CommonName, "Policy Test CA");
    ca_params.distinguished_name = ca_name;
    let ca_cert = ca_params.self_signed(&ca_key).unwrap();
    let issuer = Issuer::new(ca_params, ca_key);

    let leaf_key = KeyPair::generate().unwrap();
    let mut leaf_params = CertificateParams::new(vec!["builder.example.test".to_string()]).unwrap();
    let mut leaf_name = DistinguishedName::new();
    leaf_name.push(DnType::CommonName, common_name);
    leaf_name.push(DnType::OrganizationName, organization);
    leaf_params.distinguished_name = leaf_name;
    leaf_params.is_ca = IsCa::NoCa;
    let leaf_cert = leaf_params.signed_by(&leaf_key, &issuer).unwrap();

    TestPki {
        ca_pem: ca_cert.pem(),
        leaf_pem: leaf_cert.pem(),
        leaf_key_pem: leaf_key.serialize_pem(),
    }
}

/// Binds the leaf key of `pki` to its certificate.
pub fn x509_signer(pki: &TestPki) -> X509Signer {
    let inner = load_signer_from_pem(pki.leaf_key_pem.as_bytes()).unwrap();
    let leaf = parse_certificate_pem(pki.leaf_pem.as_bytes()).unwrap();
    X509Signer::new(Box::new(inner), leaf, Vec::new(), Vec::new()).unwrap()
}

// ============================================================================
// SECTION: Collections
// ============================================================================

/// Returns a SHA-256 digest set for a hex value.
pub fn sha256(hex: &str) -> DigestSet {
    let mut digest = DigestSet::new();
    digest.insert(HashFunction::Sha256, hex);
    digest
}

/// Builder for one signed collection envelope.
pub struct CollectionBuilder {
    /// Step name.
    name: String,
    /// Material digests by path.
    materials: BTreeMap<String, DigestSet>,
    /// Product digests by path.
    products: BTreeMap<String, DigestSet>,
    /// Extra attestations after material and product.
    extra: Vec<(String, Value)>,
}

impl CollectionBuilder {
    /// Starts a collection for `name`.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            materials: BTreeMap::new(),
            products: BTreeMap::new(),
            extra: Vec::new(),
        }
    }

    /// Adds a material.
    pub fn material(mut self, path: &str, hex: &str) -> Self {
        self.materials.insert(path.to_string(), sha256(hex));
        self
    }

    /// Adds a product.
    pub fn product(mut self, path: &str, hex: &str) -> Self {
        self.products.insert(path.to_string(), sha256(hex));
        self
    }

    /// Adds an arbitrary attestation payload.
    pub fn attestation(mut self, type_uri: &str, payload: Value) -> Self {
        self.extra.push((type_uri.to_string(), payload));
        self
    }

    /// Signs the collection; products become the statement subjects.
    pub fn sign(self, signer: &dyn Signer) -> Envelope {
        let now = OffsetDateTime::now_utc();
        let entry = |type_uri: &str, attestation: Value| CollectionAttestation {
            type_uri: type_uri.to_string(),
            attestation,
            starttime: now,
            endtime: now,
        };
        let products: BTreeMap<&String, Value> = self
            .products
            .iter()
            .map(|(path, digest)| {
                (path, json!({"mime_type": "application/octet-stream", "digest": digest}))
            })
            .collect();
        let mut attestations = vec![
            entry(MATERIAL_TYPE, serde_json::to_value(&self.materials).unwrap()),
            entry(PRODUCT_TYPE, serde_json::to_value(&products).unwrap()),
        ];
        for (type_uri, payload) in self.extra {
            attestations.push(entry(&type_uri, payload));
        }
        let collection = Collection {
            name: self.name,
            attestations,
        };
        let statement = Statement::new(
            COLLECTION_TYPE,
            serde_json::to_value(&collection).unwrap(),
            &self.products,
        )
        .unwrap();
        let body = serde_json::to_vec(&statement).unwrap();
        envelope::sign(INTOTO_PAYLOAD_TYPE, &body, &[signer], &[]).unwrap()
    }
}

// ============================================================================
// SECTION: Policies
// ============================================================================

/// Returns material and product requirements without rules.
pub fn base_requirements() -> Vec<AttestationRequirement> {
    [MATERIAL_TYPE, PRODUCT_TYPE]
        .into_iter()
        .map(|type_uri| AttestationRequirement {
            type_uri: type_uri.to_string(),
            rego_policies: Vec::new(),
        })
        .collect()
}

/// Builds a policy entry for a signer's public key and returns its id.
pub fn public_key_entry(signer: &KeySigner) -> (String, PolicyPublicKey) {
    let pem = signer.public_key().to_pem().unwrap();
    let id = key_id_from_pem(pem.as_bytes());
    (
        id.clone(),
        PolicyPublicKey {
            key_id: id,
            key: pem.into_bytes(),
        },
    )
}

/// Key functionary referencing `key_id`.
pub fn key_functionary(key_id: &str) -> Functionary {
    Functionary {
        kind: FunctionaryKind::PublicKey,
        cert_constraint: CertConstraint::default(),
        public_key_id: key_id.to_string(),
    }
}

/// Root functionary with wildcard attributes except organizations.
pub fn root_functionary(root_id: &str, organizations: &[&str]) -> Functionary {
    Functionary {
        kind: FunctionaryKind::Root,
        cert_constraint: CertConstraint {
            common_name: "*".to_string(),
            dns_names: vec!["*".to_string()],
            emails: vec!["*".to_string()],
            organizations: organizations.iter().map(ToString::to_string).collect(),
            uris: vec!["*".to_string()],
            roots: vec![root_id.to_string()],
        },
        public_key_id: String::new(),
    }
}

/// Builds a step.
pub fn step(name: &str, functionaries: Vec<Functionary>, artifacts_from: &[&str]) -> Step {
    Step {
        name: name.to_string(),
        functionaries,
        attestations: base_requirements(),
        artifacts_from: artifacts_from.iter().map(ToString::to_string).collect(),
    }
}

/// Builds a policy expiring at `expires` from steps and public keys.
pub fn policy(
    expires: OffsetDateTime,
    steps: Vec<Step>,
    public_keys: Vec<(String, PolicyPublicKey)>,
    roots: Vec<(String, Root)>,
) -> Policy {
    Policy {
        expires,
        roots: roots.into_iter().collect(),
        public_keys: public_keys.into_iter().collect(),
        timestamp_authorities: BTreeMap::new(),
        steps: steps.into_iter().map(|step| (step.name.clone(), step)).collect(),
    }
}

/// Trust bundle entry for a CA PEM.
pub fn root_entry(id: &str, ca_pem: &str) -> (String, Root) {
    (
        id.to_string(),
        Root {
            certificate: ca_pem.as_bytes().to_vec(),
            intermediates: Vec::new(),
        },
    )
}
