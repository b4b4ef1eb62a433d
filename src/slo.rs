//! Logout Profile: the only genuinely stateful dispatch in the core. The
//! same redirect endpoint carries both the IdP's reply to an SP-initiated
//! logout and a fresh IdP-initiated logout request; this module tells them
//! apart by the root element of the decoded envelope.

use chrono::Utc;
use tracing::instrument;
use url::Url;

use crate::binding::{self, REDIRECT_BINDING};
use crate::codec;
use crate::error::{SamlError, SamlResult};
use crate::metadata::IdpSsoDescriptor;
use crate::profile::CallbackResponse;
use crate::schema::{self, LogoutRequest, LogoutResponse, MessageHeader, NameId};
use crate::sp::ServiceProvider;

pub struct LogoutProfile<'a> {
    service_provider: &'a ServiceProvider,
    idp: &'a IdpSsoDescriptor,
    entity_id: &'a str,
}

impl<'a> LogoutProfile<'a> {
    pub fn new(service_provider: &'a ServiceProvider, idp: &'a IdpSsoDescriptor, entity_id: &'a str) -> Self {
        LogoutProfile {
            service_provider,
            idp,
            entity_id,
        }
    }

    /// Builds the URL to redirect the browser to in order to start an
    /// SP-initiated logout at the IdP.
    #[instrument(skip_all)]
    pub fn build_redirect(&self, user_id: &str) -> SamlResult<String> {
        let destination = binding::resolve(REDIRECT_BINDING, &self.idp.single_logout_service)?;
        let id = codec::unique_id()?;
        let header = MessageHeader {
            id: &id,
            issue_instant: &codec::format_issue_instant(Utc::now()),
            issuer: &self.service_provider.issuer_uri,
        };
        let name_id = NameId {
            format: schema::NAME_ID_EMAIL.to_string(),
            value: user_id.to_string(),
        };
        let xml = schema::build_logout_request(header, &name_id)?;
        attach_envelope(destination, &xml, "SAMLRequest")
    }

    /// Dispatches an inbound logout redirect. `saml_response`/`saml_request`
    /// are the (possibly absent) `SAMLResponse`/`SAMLRequest` query
    /// parameters the host received.
    #[instrument(skip_all)]
    pub fn handle_post_response(
        &self,
        saml_response: Option<&str>,
        saml_request: Option<&str>,
    ) -> SamlResult<CallbackResponse> {
        let envelope = saml_response
            .or(saml_request)
            .ok_or_else(|| SamlError::Protocol("invalid response".to_string()))?;
        let xml = codec::inflate_base64(envelope)?;
        let root_name = schema::root_local_name(&xml)?;

        match root_name.as_str() {
            "LogoutRequest" => self.handle_logout_request(&xml),
            "LogoutResponse" => self.handle_logout_response(&xml),
            other => Err(SamlError::Protocol(format!(
                "unexpected request type: {other}"
            ))),
        }
    }

    fn handle_logout_request(&self, xml: &[u8]) -> SamlResult<CallbackResponse> {
        let root = crate::dom::parse(xml)?;
        let request = LogoutRequest::from_element(&root)?;
        self.verify_issuer(&request.issuer)?;

        let destination = binding::resolve(REDIRECT_BINDING, &self.idp.single_logout_service)?;
        let id = codec::unique_id()?;
        let header = MessageHeader {
            id: &id,
            issue_instant: &codec::format_issue_instant(Utc::now()),
            issuer: &self.service_provider.issuer_uri,
        };
        let response_xml = schema::build_logout_response(header, &request.id, schema::SUCCESS_STATUS)?;
        // Observed source behavior: the SP's outbound LogoutResponse is
        // attached as `SAMLRequest`, not `SAMLResponse`. Preserved as-is; see
        // the design notes on this core's open questions.
        let redirect_url = attach_envelope(destination, &response_xml, "SAMLRequest")?;
        Ok(CallbackResponse::ExternallyInitiatedLogout { redirect_url })
    }

    fn handle_logout_response(&self, xml: &[u8]) -> SamlResult<CallbackResponse> {
        let root = crate::dom::parse(xml)?;
        let response = LogoutResponse::from_element(&root)?;
        self.verify_issuer(&response.issuer)?;
        if response.status.code != schema::SUCCESS_STATUS {
            return Err(SamlError::Protocol(format!(
                "logout failed: {}",
                response.status.code
            )));
        }
        Ok(CallbackResponse::SelfInitiatedLogout {
            relay_url: "/".to_string(),
        })
    }

    fn verify_issuer(&self, issuer: &str) -> SamlResult<()> {
        if issuer != self.entity_id {
            return Err(SamlError::Protocol("issuer is not correct".to_string()));
        }
        Ok(())
    }
}

fn attach_envelope(destination: &str, xml: &[u8], param: &str) -> SamlResult<String> {
    let envelope = codec::deflate_base64(xml)?;
    let mut url =
        Url::parse(destination).map_err(|e| SamlError::Config(format!("parsing IDP URL: {e}")))?;
    url.query_pairs_mut().append_pair(param, &envelope);
    Ok(url.to_string())
}
