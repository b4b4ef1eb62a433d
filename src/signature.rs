//! XML-DSig verification over the `dom::Element` tree.
//!
//! Canonicalization here is exclusive-C14N-*shaped* rather than the full W3C
//! algorithm: attributes are sorted, the enveloped-signature transform is
//! applied by stripping `Signature` descendants before digesting, and each
//! element's namespace is declared inline. There is no support for comment
//! nodes or explicit inclusive-namespace prefix lists, since nothing in this
//! core signs or verifies documents carrying either. This is a deliberate
//! scope reduction documented alongside the rest of the design decisions.

use base64::Engine;
use ring::digest;
use ring::signature::UnparsedPublicKey;
use x509_parser::certificate::X509Certificate;
use x509_parser::prelude::FromDer;

use crate::dom::{self, Element, Node, SAML_ASSERTION_NS, XMLDSIG_NS};
use crate::error::{SamlError, SamlResult};
use crate::metadata::IdpSsoDescriptor;

const DIGEST_SHA1: &str = "http://www.w3.org/2000/09/xmldsig#sha1";
const DIGEST_SHA256: &str = "http://www.w3.org/2001/04/xmlenc#sha256";
const SIGNATURE_RSA_SHA1: &str = "http://www.w3.org/2000/09/xmldsig#rsa-sha1";
const SIGNATURE_RSA_SHA256: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256";

/// Trust roots extracted from an IdP's `KeyDescriptor` list. Built once, at
/// profile construction time, rather than lazily on first use.
#[derive(Debug, Clone)]
pub struct CertificateStore {
    /// Raw PKCS#1 `RSAPublicKey` DER bytes, one per `KeyDescriptor`.
    public_keys: Vec<Vec<u8>>,
}

impl CertificateStore {
    pub fn new(idp: &IdpSsoDescriptor) -> SamlResult<Self> {
        let mut public_keys = Vec::with_capacity(idp.key_descriptors.len());
        for kd in &idp.key_descriptors {
            let der = base64::engine::general_purpose::STANDARD
                .decode(&kd.certificate)
                .map_err(|e| SamlError::Config(format!("decoding x509 cert: {e}")))?;
            let (_, cert) = X509Certificate::from_der(&der)
                .map_err(|e| SamlError::Config(format!("parsing x509 cert: {e}")))?;
            let spki = cert.public_key();
            public_keys.push(spki.subject_public_key.data.to_vec());
        }
        Ok(CertificateStore { public_keys })
    }
}

/// Parses `xml` and validates its enclosed signature, per 4.4: first the
/// signature enclosing the whole document, falling back to a signed
/// `Assertion` only when no document-level signature is present at all.
/// Returns the validated tree on success.
pub fn validate_signed(xml: &[u8], certs: &CertificateStore) -> SamlResult<Element> {
    let root = dom::parse(xml)?;
    match try_validate(&root, certs) {
        Ok(()) => return Ok(root),
        Err(SamlError::MissingSignature) => {}
        Err(e) => return Err(e),
    }

    let mut assertions = Vec::new();
    collect_assertions(&root, &root, &mut assertions);
    if assertions.is_empty() {
        return Err(SamlError::MissingSignature);
    }
    // Reject the whole document the moment any assertion turns up somewhere
    // other than directly under root, before validating any of them — an
    // attacker can leave a forged, unsigned assertion as root's direct child
    // while the real signed one is buried elsewhere, and that forged one
    // would otherwise fail with a plain MissingSignature instead of being
    // recognized as an attack.
    if assertions.iter().any(|(_, is_direct_child)| !is_direct_child) {
        return Err(SamlError::Signature(
            "assertion with unexpected parent".to_string(),
        ));
    }
    for (assertion, _) in &assertions {
        try_validate(assertion, certs)?;
    }
    Ok(root)
}

/// Depth-first search for every `saml:Assertion` anywhere in the tree, each
/// tagged with whether its immediate parent is `root`. Searching the whole
/// tree (not just `root`'s direct children) is what defends against
/// signature-wrapping: an attacker's forged assertion can sit as a direct
/// child of `root` while the genuine, signed assertion has been relocated
/// deeper in the document. Finding that relocated assertion and rejecting it
/// is the point of this walk.
fn collect_assertions<'a>(el: &'a Element, root: &Element, out: &mut Vec<(&'a Element, bool)>) {
    for child in &el.children {
        if let Node::Element(ce) = child {
            if ce.is(SAML_ASSERTION_NS, "Assertion") {
                out.push((ce, std::ptr::eq(el, root)));
            }
            collect_assertions(ce, root, out);
        }
    }
}

fn try_validate(el: &Element, certs: &CertificateStore) -> SamlResult<()> {
    let sig = el
        .child_ns(XMLDSIG_NS, "Signature")
        .ok_or(SamlError::MissingSignature)?;
    let signed_info = sig
        .child_ns(XMLDSIG_NS, "SignedInfo")
        .ok_or_else(|| SamlError::Signature("signature missing SignedInfo".to_string()))?;
    let reference = signed_info
        .child_ns(XMLDSIG_NS, "Reference")
        .ok_or_else(|| SamlError::Signature("SignedInfo missing Reference".to_string()))?;
    let digest_method = reference
        .child_ns(XMLDSIG_NS, "DigestMethod")
        .and_then(|e| e.attr("Algorithm"))
        .ok_or_else(|| SamlError::Signature("Reference missing DigestMethod".to_string()))?;
    let digest_value = reference
        .child_ns(XMLDSIG_NS, "DigestValue")
        .map(|e| e.text())
        .ok_or_else(|| SamlError::Signature("Reference missing DigestValue".to_string()))?;
    let signature_method = signed_info
        .child_ns(XMLDSIG_NS, "SignatureMethod")
        .and_then(|e| e.attr("Algorithm"))
        .ok_or_else(|| SamlError::Signature("SignedInfo missing SignatureMethod".to_string()))?;
    let signature_value = sig
        .child_ns(XMLDSIG_NS, "SignatureValue")
        .map(|e| e.text())
        .ok_or_else(|| SamlError::Signature("Signature missing SignatureValue".to_string()))?;

    let digest_alg = digest_algorithm(digest_method)?;
    let actual_digest = digest::digest(digest_alg, &canonicalize(el));
    let expected_digest = base64::engine::general_purpose::STANDARD
        .decode(digest_value.trim())
        .map_err(|e| SamlError::Signature(format!("decoding digest value: {e}")))?;
    if actual_digest.as_ref() != expected_digest.as_slice() {
        return Err(SamlError::Signature("digest mismatch".to_string()));
    }

    let verify_alg = signature_algorithm(signature_method)?;
    let signature_bytes = base64::engine::general_purpose::STANDARD
        .decode(signature_value.trim())
        .map_err(|e| SamlError::Signature(format!("decoding signature value: {e}")))?;
    let signed_bytes = canonicalize(signed_info);

    let verified = certs.public_keys.iter().any(|key| {
        UnparsedPublicKey::new(verify_alg, key)
            .verify(&signed_bytes, &signature_bytes)
            .is_ok()
    });
    if !verified {
        return Err(SamlError::Signature(
            "signature verification failed against trusted certificates".to_string(),
        ));
    }
    Ok(())
}

fn digest_algorithm(uri: &str) -> SamlResult<&'static digest::Algorithm> {
    match uri {
        DIGEST_SHA1 => Ok(&digest::SHA1_FOR_LEGACY_USE_ONLY),
        DIGEST_SHA256 => Ok(&digest::SHA256),
        other => Err(SamlError::Signature(format!(
            "unsupported digest algorithm: {other}"
        ))),
    }
}

fn signature_algorithm(
    uri: &str,
) -> SamlResult<&'static dyn ring::signature::VerificationAlgorithm> {
    match uri {
        SIGNATURE_RSA_SHA1 => Ok(&ring::signature::RSA_PKCS1_2048_8192_SHA1_FOR_LEGACY_USE_ONLY),
        SIGNATURE_RSA_SHA256 => Ok(&ring::signature::RSA_PKCS1_2048_8192_SHA256),
        other => Err(SamlError::Signature(format!(
            "unsupported signature algorithm: {other}"
        ))),
    }
}

/// Exclusive-C14N-shaped serialization: sorted attributes, inline namespace
/// declarations, `Signature` descendants stripped (the enveloped-signature
/// transform).
fn canonicalize(el: &Element) -> Vec<u8> {
    let mut buf = Vec::new();
    write_canonical(el, &mut buf);
    buf
}

fn write_canonical(el: &Element, buf: &mut Vec<u8>) {
    if el.is(XMLDSIG_NS, "Signature") {
        return;
    }
    buf.push(b'<');
    buf.extend_from_slice(el.local_name.as_bytes());

    let mut attrs: Vec<(&str, &str)> = Vec::with_capacity(el.attributes.len() + 1);
    if let Some(ns) = &el.namespace {
        attrs.push(("xmlns", ns.as_str()));
    }
    for a in &el.attributes {
        attrs.push((a.local_name.as_str(), a.value.as_str()));
    }
    attrs.sort_by(|a, b| a.0.cmp(b.0));
    for (name, value) in attrs {
        buf.push(b' ');
        buf.extend_from_slice(name.as_bytes());
        buf.extend_from_slice(b"=\"");
        escape_into(value, buf, true);
        buf.push(b'"');
    }
    buf.push(b'>');
    for child in &el.children {
        match child {
            Node::Element(ce) => write_canonical(ce, buf),
            Node::Text(t) => escape_into(t, buf, false),
        }
    }
    buf.extend_from_slice(b"</");
    buf.extend_from_slice(el.local_name.as_bytes());
    buf.push(b'>');
}

fn escape_into(s: &str, buf: &mut Vec<u8>, is_attr: bool) {
    for c in s.chars() {
        match c {
            '&' => buf.extend_from_slice(b"&amp;"),
            '<' => buf.extend_from_slice(b"&lt;"),
            '>' => buf.extend_from_slice(b"&gt;"),
            '"' if is_attr => buf.extend_from_slice(b"&quot;"),
            _ => {
                let mut tmp = [0u8; 4];
                buf.extend_from_slice(c.encode_utf8(&mut tmp).as_bytes());
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Signs `dom::Element` subtrees with a fixed, locally generated RSA key
    //! so signature-verifier tests don't depend on binary fixtures this
    //! corpus doesn't carry. Not part of the public API.

    use super::*;
    use ring::rand::SystemRandom;
    use ring::signature::{self, RsaKeyPair};

    /// PKCS#8 DER for a 2048-bit RSA test key, generated once for this crate.
    pub const TEST_KEY_PKCS8_B64: &str = include_str!("../testdata/test_key.pkcs8.b64");
    /// Self-signed DER certificate for [`TEST_KEY_PKCS8_B64`]'s public half.
    pub const TEST_CERT_DER_B64: &str = include_str!("../testdata/test_cert.der.b64");

    pub fn test_key_pair() -> RsaKeyPair {
        let der = base64::engine::general_purpose::STANDARD
            .decode(TEST_KEY_PKCS8_B64.trim())
            .unwrap();
        RsaKeyPair::from_pkcs8(&der).unwrap()
    }

    /// Computes `SignedInfo`/`SignatureValue`/`DigestValue` for `el` (SHA-256
    /// digest, RSA-SHA256 signature) and returns a `ds:Signature` element
    /// ready to be inserted as a child of `el`.
    pub fn sign_element(el: &Element, reference_id: &str) -> Element {
        let key_pair = test_key_pair();
        let digest_value = base64::engine::general_purpose::STANDARD
            .encode(digest::digest(&digest::SHA256, &canonicalize(el)));

        let signed_info = build_signed_info(reference_id, &digest_value);
        let signed_info_bytes = canonicalize(&signed_info);

        let rng = SystemRandom::new();
        let mut signature = vec![0u8; key_pair.public().modulus_len()];
        key_pair
            .sign(
                &signature::RSA_PKCS1_SHA256,
                &rng,
                &signed_info_bytes,
                &mut signature,
            )
            .unwrap();
        let signature_value = base64::engine::general_purpose::STANDARD.encode(&signature);

        Element {
            local_name: "Signature".to_string(),
            namespace: Some(XMLDSIG_NS.to_string()),
            attributes: vec![],
            children: vec![
                Node::Element(signed_info),
                Node::Element(text_element("SignatureValue", &signature_value)),
            ],
        }
    }

    fn build_signed_info(reference_id: &str, digest_value: &str) -> Element {
        let canon_method = alg_element("CanonicalizationMethod", "http://www.w3.org/2001/10/xml-exc-c14n#");
        let sig_method = alg_element("SignatureMethod", SIGNATURE_RSA_SHA256);
        let transforms = Element {
            local_name: "Transforms".to_string(),
            namespace: Some(XMLDSIG_NS.to_string()),
            attributes: vec![],
            children: vec![
                Node::Element(alg_element("Transform", "http://www.w3.org/2000/09/xmldsig#enveloped-signature")),
                Node::Element(alg_element("Transform", "http://www.w3.org/2001/10/xml-exc-c14n#")),
            ],
        };
        let digest_method = alg_element("DigestMethod", DIGEST_SHA256);
        let digest_value_el = text_element("DigestValue", digest_value);
        let reference = Element {
            local_name: "Reference".to_string(),
            namespace: Some(XMLDSIG_NS.to_string()),
            attributes: vec![dom::Attr {
                local_name: "URI".to_string(),
                namespace: None,
                value: format!("#{reference_id}"),
            }],
            children: vec![
                Node::Element(transforms),
                Node::Element(digest_method),
                Node::Element(digest_value_el),
            ],
        };
        Element {
            local_name: "SignedInfo".to_string(),
            namespace: Some(XMLDSIG_NS.to_string()),
            attributes: vec![],
            children: vec![
                Node::Element(canon_method),
                Node::Element(sig_method),
                Node::Element(reference),
            ],
        }
    }

    fn alg_element(name: &str, algorithm: &str) -> Element {
        Element {
            local_name: name.to_string(),
            namespace: Some(XMLDSIG_NS.to_string()),
            attributes: vec![dom::Attr {
                local_name: "Algorithm".to_string(),
                namespace: None,
                value: algorithm.to_string(),
            }],
            children: vec![],
        }
    }

    fn text_element(name: &str, text: &str) -> Element {
        Element {
            local_name: name.to_string(),
            namespace: Some(XMLDSIG_NS.to_string()),
            attributes: vec![],
            children: vec![Node::Text(text.to_string())],
        }
    }
}
