//! Sign-On Profile: build the HTTP-Redirect `AuthnRequest` and validate the
//! HTTP-POST `Response` it leads to.

use chrono::{DateTime, Utc};
use tracing::{instrument, warn};
use url::Url;

use crate::binding::{self, REDIRECT_BINDING};
use crate::codec;
use crate::error::{SamlError, SamlResult};
use crate::metadata::IdpSsoDescriptor;
use crate::profile::{CallbackResponse, Identity};
use crate::schema::{self, MessageHeader, Response};
use crate::signature::{self, CertificateStore};
use crate::sp::ServiceProvider;

/// Optional parameters to [`SignOnProfile::build_redirect`].
#[derive(Debug, Clone, Default)]
pub struct RedirectOptions {
    pub relay_state: Option<String>,
}

/// Sign-on operations for one service provider / IdP pair. Holds read-only
/// references to the SP configuration and IdP metadata, plus a certificate
/// store built once at construction.
pub struct SignOnProfile<'a> {
    service_provider: &'a ServiceProvider,
    idp: &'a IdpSsoDescriptor,
    certs: CertificateStore,
}

impl<'a> SignOnProfile<'a> {
    pub fn new(service_provider: &'a ServiceProvider, idp: &'a IdpSsoDescriptor) -> SamlResult<Self> {
        Ok(SignOnProfile {
            service_provider,
            idp,
            certs: CertificateStore::new(idp)?,
        })
    }

    /// Builds the URL to redirect the browser to in order to start an
    /// authentication at the IdP.
    #[instrument(skip_all)]
    pub fn build_redirect(&self, opts: RedirectOptions) -> SamlResult<String> {
        let destination = binding::resolve(REDIRECT_BINDING, &self.idp.single_sign_on_service)?;
        let id = codec::unique_id()?;
        let header = MessageHeader {
            id: &id,
            issue_instant: &codec::format_issue_instant(Utc::now()),
            issuer: &self.service_provider.issuer_uri,
        };
        let xml = schema::build_authn_request(
            header,
            destination,
            &self.service_provider.acs_url,
            REDIRECT_BINDING,
        )?;
        let envelope = codec::deflate_base64(&xml)?;

        let mut url = Url::parse(destination)
            .map_err(|e| SamlError::Config(format!("parsing IDP URL: {e}")))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("SAMLRequest", &envelope);
            if let Some(rs) = opts.relay_state.filter(|s| !s.is_empty()) {
                query.append_pair("RelayState", &rs);
            }
        }
        Ok(url.to_string())
    }

    /// Validates a posted `SAMLResponse` and, on success, extracts the
    /// signed-in user's identity.
    #[instrument(skip_all)]
    pub fn handle_post_response(&self, saml_response: &str, now: DateTime<Utc>) -> SamlResult<CallbackResponse> {
        let decoded = codec::decode_base64(saml_response)?;
        let validated = signature::validate_signed(&decoded, &self.certs).map_err(|e| {
            warn!(stage = "validating auth response signature", error = %e);
            e
        })?;
        let response = Response::from_element(&validated)?;

        if response.status.code != schema::SUCCESS_STATUS {
            return Err(SamlError::Protocol(format!(
                "IDP Status: {}",
                response.status.code
            )));
        }

        let valid = codec::window_valid(
            &response.assertion.conditions.not_before,
            &response.assertion.conditions.not_on_or_after,
            now,
        )?;
        if !valid {
            return Err(SamlError::Timestamp(
                "response timestamp is not valid".to_string(),
            ));
        }

        Ok(CallbackResponse::Identity(Identity {
            user_id: response.assertion.subject.name_id.value,
            relay_state: "/".to_string(),
        }))
    }
}
