//! IdP metadata: `EntityDescriptor` and its children.

use std::path::Path;
use std::time::Duration;

use base64::Engine;
use tracing::instrument;

use crate::binding::Endpoint;
use crate::dom::{self, Element, SAML_METADATA_NS};
use crate::error::{SamlError, SamlResult};

/// Root of parsed IdP metadata.
#[derive(Debug, Clone)]
pub struct EntityDescriptor {
    pub entity_id: String,
    pub idp_sso_descriptor: IdpSsoDescriptor,
}

/// Per-IdP capabilities advertised in its metadata.
#[derive(Debug, Clone, Default)]
pub struct IdpSsoDescriptor {
    pub key_descriptors: Vec<KeyDescriptor>,
    pub single_sign_on_service: Vec<SingleSignOnService>,
    pub single_logout_service: Vec<SingleLogoutService>,
    pub name_id_formats: Vec<String>,
    pub attributes: Vec<AttributeDescriptor>,
}

#[derive(Debug, Clone)]
pub struct KeyDescriptor {
    pub use_: String,
    /// Base64 DER X.509 certificate, as it appears in metadata.
    pub certificate: String,
}

#[derive(Debug, Clone)]
pub struct SingleSignOnService {
    pub binding: String,
    pub location: String,
}

impl Endpoint for SingleSignOnService {
    fn binding(&self) -> &str {
        &self.binding
    }
    fn location(&self) -> &str {
        &self.location
    }
}

#[derive(Debug, Clone)]
pub struct SingleLogoutService {
    pub binding: String,
    pub location: String,
}

impl Endpoint for SingleLogoutService {
    fn binding(&self) -> &str {
        &self.binding
    }
    fn location(&self) -> &str {
        &self.location
    }
}

#[derive(Debug, Clone)]
pub struct AttributeDescriptor {
    pub name: String,
    pub friendly_name: Option<String>,
    pub name_format: Option<String>,
}

impl EntityDescriptor {
    /// Parses an `EntityDescriptor` document. Lenient: unknown elements and
    /// attributes are ignored; a missing `SingleLogoutService` list parses
    /// as empty, not as an error.
    pub fn parse(xml: &[u8]) -> SamlResult<Self> {
        let root = dom::parse(xml)?;
        if !root.is(SAML_METADATA_NS, "EntityDescriptor") {
            return Err(SamlError::Config(
                "document root is not an EntityDescriptor".to_string(),
            ));
        }
        let entity_id = root
            .attr("entityID")
            .ok_or_else(|| SamlError::Config("EntityDescriptor missing entityID".to_string()))?
            .to_string();
        let idp_el = root
            .child_ns(SAML_METADATA_NS, "IDPSSODescriptor")
            .ok_or_else(|| SamlError::Config("EntityDescriptor missing IDPSSODescriptor".to_string()))?;

        Ok(EntityDescriptor {
            entity_id,
            idp_sso_descriptor: parse_idp_sso_descriptor(idp_el)?,
        })
    }

    /// Reads and parses metadata from a local file.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn from_file<P: AsRef<Path>>(path: P) -> SamlResult<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .map_err(|e| SamlError::Config(format!("reading metadata file: {e}")))?;
        Self::parse(&bytes)
    }

    /// Fetches and parses metadata over HTTPS, bounded by `timeout`.
    #[instrument(skip_all, fields(url = %url))]
    pub fn from_url(url: &str, timeout: Duration) -> SamlResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SamlError::Config(format!("getting metadata: building http client: {e}")))?;
        let body = client
            .get(url)
            .send()
            .map_err(|e| SamlError::Config(format!("getting metadata: {e}")))?
            .error_for_status()
            .map_err(|e| SamlError::Config(format!("getting metadata: {e}")))?
            .bytes()
            .map_err(|e| SamlError::Config(format!("getting metadata: {e}")))?;
        Self::parse(&body)
    }
}

fn parse_idp_sso_descriptor(el: &Element) -> SamlResult<IdpSsoDescriptor> {
    let mut key_descriptors = Vec::new();
    for kd in el.children_ns(SAML_METADATA_NS, "KeyDescriptor") {
        key_descriptors.push(parse_key_descriptor(kd)?);
    }

    let mut single_sign_on_service = Vec::new();
    for sso in el.children_ns(SAML_METADATA_NS, "SingleSignOnService") {
        single_sign_on_service.push(SingleSignOnService {
            binding: sso.attr("Binding").unwrap_or_default().to_string(),
            location: sso.attr("Location").unwrap_or_default().to_string(),
        });
    }

    let mut single_logout_service = Vec::new();
    for slo in el.children_ns(SAML_METADATA_NS, "SingleLogoutService") {
        single_logout_service.push(SingleLogoutService {
            binding: slo.attr("Binding").unwrap_or_default().to_string(),
            location: slo.attr("Location").unwrap_or_default().to_string(),
        });
    }

    let name_id_formats = el
        .children_ns(SAML_METADATA_NS, "NameIDFormat")
        .map(|e| e.text())
        .collect();

    let attributes = el
        .children_ns(SAML_METADATA_NS, "Attribute")
        .map(|e| AttributeDescriptor {
            name: e.attr("Name").unwrap_or_default().to_string(),
            friendly_name: e.attr("FriendlyName").map(str::to_string),
            name_format: e.attr("NameFormat").map(str::to_string),
        })
        .collect();

    Ok(IdpSsoDescriptor {
        key_descriptors,
        single_sign_on_service,
        single_logout_service,
        name_id_formats,
        attributes,
    })
}

fn parse_key_descriptor(el: &Element) -> SamlResult<KeyDescriptor> {
    let use_ = el.attr("use").unwrap_or_default().to_string();
    let key_info = el
        .child_ns(dom::XMLDSIG_NS, "KeyInfo")
        .ok_or_else(|| SamlError::Config("KeyDescriptor missing KeyInfo".to_string()))?;
    let x509_data = key_info
        .child_ns(dom::XMLDSIG_NS, "X509Data")
        .ok_or_else(|| SamlError::Config("KeyInfo missing X509Data".to_string()))?;
    let cert_el = x509_data
        .child_ns(dom::XMLDSIG_NS, "X509Certificate")
        .ok_or_else(|| SamlError::Config("X509Data missing X509Certificate".to_string()))?;
    let certificate: String = cert_el.text().split_whitespace().collect();
    // Validate now so a malformed certificate is reported at load time
    // rather than at the first signature check.
    base64::engine::general_purpose::STANDARD
        .decode(&certificate)
        .map_err(|e| SamlError::Config(format!("decoding x509 certificate: {e}")))?;
    Ok(KeyDescriptor { use_, certificate })
}
