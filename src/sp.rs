//! This service provider's own configuration.

use url::Url;

use crate::error::{SamlError, SamlResult};

/// Caller-supplied configuration of this SP: its issuer identity, the
/// `NameIDFormat`s it accepts, and where the IdP should POST the `Response`.
/// Immutable after construction; safe to share across any number of
/// concurrent requests.
#[derive(Debug, Clone)]
pub struct ServiceProvider {
    pub issuer_uri: String,
    pub name_id_formats: Vec<String>,
    pub acs_url: String,
}

impl ServiceProvider {
    /// Validates `issuer_uri` and `acs_url` eagerly, rather than failing the
    /// first time a redirect is built.
    pub fn new(
        issuer_uri: impl Into<String>,
        name_id_formats: Vec<String>,
        acs_url: impl Into<String>,
    ) -> SamlResult<Self> {
        let issuer_uri = issuer_uri.into();
        let acs_url = acs_url.into();
        if issuer_uri.trim().is_empty() {
            return Err(SamlError::Config("issuer_uri must not be empty".to_string()));
        }
        if acs_url.trim().is_empty() {
            return Err(SamlError::Config("acs_url must not be empty".to_string()));
        }
        Url::parse(&acs_url).map_err(|e| SamlError::Config(format!("parsing acs_url: {e}")))?;
        Ok(ServiceProvider {
            issuer_uri,
            name_id_formats,
            acs_url,
        })
    }
}
