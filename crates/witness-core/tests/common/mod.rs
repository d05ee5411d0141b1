// crates/witness-core/tests/common/mod.rs
// ============================================================================
// Module: Core Test Helpers
// Description: Key and certificate fixtures shared by integration tests.
// Purpose: Generate signers and CA-rooted leaves without fixture files.
// Dependencies: rcgen, ed25519-dalek, rand, witness-core
// ============================================================================

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    dead_code,
    reason = "Shared helpers are used by a subset of test binaries."
)]

use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use rcgen::BasicConstraints;
use rcgen::CertificateParams;
use rcgen::DistinguishedName;
use rcgen::DnType;
use rcgen::IsCa;
use rcgen::Issuer;
use rcgen::KeyPair;
use witness_core::crypto::KeySigner;
use witness_core::crypto::PrivateKey;

/// Generated CA plus leaf.
pub struct TestPki {
    /// CA certificate PEM.
    pub ca_pem: String,
    /// Leaf certificate PEM.
    pub leaf_pem: String,
    /// Leaf private key PEM (PKCS#8).
    pub leaf_key_pem: String,
}

/// Returns a fresh Ed25519 signer.
pub fn ed25519_signer() -> KeySigner {
    KeySigner::new(PrivateKey::Ed25519(SigningKey::generate(&mut OsRng)))
}

/// Generates a CA and a leaf with the given common name and DNS names.
pub fn generate_pki(common_name: &str, dns_names: &[&str]) -> TestPki {
    let ca_key = KeyPair::generate().unwrap();
    let mut ca_params = CertificateParams::default();
    ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    ca_params.distinguished_name = distinguished_name("Witness Test CA");
    let ca_cert = ca_params.self_signed(&ca_key).unwrap();
    let issuer = Issuer::new(ca_params, ca_key);

    let leaf_key = KeyPair::generate().unwrap();
    let mut leaf_params =
        CertificateParams::new(dns_names.iter().map(ToString::to_string).collect::<Vec<_>>())
            .unwrap();
    leaf_params.distinguished_name = distinguished_name(common_name);
    leaf_params.is_ca = IsCa::NoCa;
    let leaf_cert = leaf_params.signed_by(&leaf_key, &issuer).unwrap();

    TestPki {
        ca_pem: ca_cert.pem(),
        leaf_pem: leaf_cert.pem(),
        leaf_key_pem: leaf_key.serialize_pem(),
    }
}

/// Builds a distinguished name with one common name.
fn distinguished_name(common_name: &str) -> DistinguishedName {
    let mut name = DistinguishedName::new();
    name.push(DnType::CommonName, common_name);
    name
}
