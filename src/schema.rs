//! Protocol message types: building outbound `AuthnRequest`/`LogoutRequest`/
//! `LogoutResponse` XML, and parsing inbound `Response`/`LogoutRequest`/
//! `LogoutResponse` from a [`dom::Element`].

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::writer::Writer;

use crate::dom::{self, Element, SAML_ASSERTION_NS, SAML_PROTOCOL_NS};
use crate::error::{SamlError, SamlResult};

pub const VERSION: &str = "2.0";
pub const SUCCESS_STATUS: &str = "urn:oasis:names:tc:SAML:2.0:status:Success";
pub const NAME_ID_EMAIL: &str = "urn:oasis:names:tc:SAML:1.1:nameid-format:emailAddress";

/// `NameID`: a subject identifier, typically an email address.
#[derive(Debug, Clone)]
pub struct NameId {
    pub format: String,
    pub value: String,
}

/// `Status/StatusCode`.
#[derive(Debug, Clone)]
pub struct Status {
    pub code: String,
}

/// `Conditions`, attribute-valued RFC3339 instants.
#[derive(Debug, Clone)]
pub struct Conditions {
    pub not_before: String,
    pub not_on_or_after: String,
}

/// `Assertion/Subject`.
#[derive(Debug, Clone)]
pub struct Subject {
    pub name_id: NameId,
}

/// `Assertion`.
#[derive(Debug, Clone)]
pub struct Assertion {
    pub subject: Subject,
    pub conditions: Conditions,
}

/// Inbound `samlp:Response`.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: Status,
    pub assertion: Assertion,
}

/// Inbound or outbound `samlp:LogoutRequest`.
#[derive(Debug, Clone)]
pub struct LogoutRequest {
    pub id: String,
    pub issuer: String,
    pub name_id: Option<NameId>,
}

/// Inbound or outbound `samlp:LogoutResponse`.
#[derive(Debug, Clone)]
pub struct LogoutResponse {
    pub id: String,
    pub in_response_to: Option<String>,
    pub issuer: String,
    pub status: Status,
}

// ---------------------------------------------------------------------
// Outbound construction
// ---------------------------------------------------------------------

/// Parameters shared by every outbound protocol message.
pub struct MessageHeader<'a> {
    pub id: &'a str,
    pub issue_instant: &'a str,
    pub issuer: &'a str,
}

/// Builds an `AuthnRequest` document for the HTTP-Redirect binding.
pub fn build_authn_request(
    header: MessageHeader<'_>,
    destination: &str,
    acs_url: &str,
    protocol_binding: &str,
) -> SamlResult<Vec<u8>> {
    let mut writer = Writer::new(Vec::new());
    let mut start = BytesStart::new("samlp:AuthnRequest");
    start.push_attribute(("xmlns:samlp", SAML_PROTOCOL_NS));
    start.push_attribute(("xmlns:saml", SAML_ASSERTION_NS));
    start.push_attribute(("ID", header.id));
    start.push_attribute(("Version", VERSION));
    start.push_attribute(("IssueInstant", header.issue_instant));
    start.push_attribute(("Destination", destination));
    start.push_attribute(("ProtocolBinding", protocol_binding));
    start.push_attribute(("AssertionConsumerServiceURL", acs_url));
    write_start(&mut writer, start)?;
    write_issuer(&mut writer, header.issuer)?;
    write_end(&mut writer, "samlp:AuthnRequest")?;
    Ok(writer.into_inner())
}

/// Builds a `LogoutRequest` document for the HTTP-Redirect binding.
pub fn build_logout_request(header: MessageHeader<'_>, name_id: &NameId) -> SamlResult<Vec<u8>> {
    let mut writer = Writer::new(Vec::new());
    let mut start = BytesStart::new("samlp:LogoutRequest");
    start.push_attribute(("xmlns:samlp", SAML_PROTOCOL_NS));
    start.push_attribute(("xmlns:saml", SAML_ASSERTION_NS));
    start.push_attribute(("ID", header.id));
    start.push_attribute(("Version", VERSION));
    start.push_attribute(("IssueInstant", header.issue_instant));
    write_start(&mut writer, start)?;
    write_issuer(&mut writer, header.issuer)?;

    let mut nameid = BytesStart::new("saml:NameID");
    nameid.push_attribute(("Format", name_id.format.as_str()));
    write_start(&mut writer, nameid)?;
    write_text(&mut writer, &name_id.value)?;
    write_end(&mut writer, "saml:NameID")?;

    write_end(&mut writer, "samlp:LogoutRequest")?;
    Ok(writer.into_inner())
}

/// Builds a `LogoutResponse` document — the SP's reply to an IdP-initiated
/// `LogoutRequest`.
pub fn build_logout_response(
    header: MessageHeader<'_>,
    in_response_to: &str,
    status: &str,
) -> SamlResult<Vec<u8>> {
    let mut writer = Writer::new(Vec::new());
    let mut start = BytesStart::new("samlp:LogoutResponse");
    start.push_attribute(("xmlns:samlp", SAML_PROTOCOL_NS));
    start.push_attribute(("xmlns:saml", SAML_ASSERTION_NS));
    start.push_attribute(("ID", header.id));
    start.push_attribute(("Version", VERSION));
    start.push_attribute(("IssueInstant", header.issue_instant));
    start.push_attribute(("InResponseTo", in_response_to));
    write_start(&mut writer, start)?;
    write_issuer(&mut writer, header.issuer)?;

    write_start(&mut writer, BytesStart::new("samlp:Status"))?;
    let mut code = BytesStart::new("samlp:StatusCode");
    code.push_attribute(("Value", status));
    writer
        .write_event(Event::Empty(code))
        .map_err(|e| SamlError::Encoding(format!("encoding logout response: {e}")))?;
    write_end(&mut writer, "samlp:Status")?;

    write_end(&mut writer, "samlp:LogoutResponse")?;
    Ok(writer.into_inner())
}

fn write_issuer(writer: &mut Writer<Vec<u8>>, issuer: &str) -> SamlResult<()> {
    write_start(writer, BytesStart::new("saml:Issuer"))?;
    write_text(writer, issuer)?;
    write_end(writer, "saml:Issuer")
}

fn write_start(writer: &mut Writer<Vec<u8>>, start: BytesStart<'_>) -> SamlResult<()> {
    writer
        .write_event(Event::Start(start))
        .map_err(|e| SamlError::Encoding(format!("encoding xml: {e}")))
}

fn write_end(writer: &mut Writer<Vec<u8>>, name: &str) -> SamlResult<()> {
    writer
        .write_event(Event::End(BytesEnd::new(name.to_string())))
        .map_err(|e| SamlError::Encoding(format!("encoding xml: {e}")))
}

fn write_text(writer: &mut Writer<Vec<u8>>, text: &str) -> SamlResult<()> {
    writer
        .write_event(Event::Text(BytesText::new(text)))
        .map_err(|e| SamlError::Encoding(format!("encoding xml: {e}")))
}

// ---------------------------------------------------------------------
// Inbound parsing
// ---------------------------------------------------------------------

impl Response {
    /// Decodes a `Response` from an already signature-validated element tree.
    pub fn from_element(root: &Element) -> SamlResult<Self> {
        if !root.is(SAML_PROTOCOL_NS, "Response") {
            return Err(SamlError::Protocol(format!(
                "unexpected root element {:?}",
                root.local_name
            )));
        }
        let status_el = root
            .child_ns(SAML_PROTOCOL_NS, "Status")
            .ok_or_else(|| SamlError::Encoding("Response missing Status".to_string()))?;
        let code_el = status_el
            .child_ns(SAML_PROTOCOL_NS, "StatusCode")
            .ok_or_else(|| SamlError::Encoding("Status missing StatusCode".to_string()))?;
        let status = Status {
            code: code_el.attr("Value").unwrap_or_default().to_string(),
        };

        let assertion_el = root
            .child_ns(SAML_ASSERTION_NS, "Assertion")
            .ok_or_else(|| SamlError::Encoding("Response missing Assertion".to_string()))?;
        let subject_el = assertion_el
            .child_ns(SAML_ASSERTION_NS, "Subject")
            .ok_or_else(|| SamlError::Encoding("Assertion missing Subject".to_string()))?;
        let name_id_el = subject_el
            .child_ns(SAML_ASSERTION_NS, "NameID")
            .ok_or_else(|| SamlError::Encoding("Subject missing NameID".to_string()))?;
        let conditions_el = assertion_el
            .child_ns(SAML_ASSERTION_NS, "Conditions")
            .ok_or_else(|| SamlError::Encoding("Assertion missing Conditions".to_string()))?;

        Ok(Response {
            status,
            assertion: Assertion {
                subject: Subject {
                    name_id: NameId {
                        format: name_id_el.attr("Format").unwrap_or_default().to_string(),
                        value: name_id_el.text(),
                    },
                },
                conditions: Conditions {
                    not_before: conditions_el.attr("NotBefore").unwrap_or_default().to_string(),
                    not_on_or_after: conditions_el
                        .attr("NotOnOrAfter")
                        .unwrap_or_default()
                        .to_string(),
                },
            },
        })
    }
}

impl LogoutRequest {
    pub fn from_element(root: &Element) -> SamlResult<Self> {
        if !root.is(SAML_PROTOCOL_NS, "LogoutRequest") {
            return Err(SamlError::Protocol(format!(
                "unexpected root element {:?}",
                root.local_name
            )));
        }
        let id = root.attr("ID").unwrap_or_default().to_string();
        let issuer_el = root
            .child_ns(SAML_ASSERTION_NS, "Issuer")
            .ok_or_else(|| SamlError::Encoding("LogoutRequest missing Issuer".to_string()))?;
        let name_id = root.child_ns(SAML_ASSERTION_NS, "NameID").map(|e| NameId {
            format: e.attr("Format").unwrap_or_default().to_string(),
            value: e.text(),
        });
        Ok(LogoutRequest {
            id,
            issuer: issuer_el.text(),
            name_id,
        })
    }
}

impl LogoutResponse {
    pub fn from_element(root: &Element) -> SamlResult<Self> {
        if !root.is(SAML_PROTOCOL_NS, "LogoutResponse") {
            return Err(SamlError::Protocol(format!(
                "unexpected root element {:?}",
                root.local_name
            )));
        }
        let id = root.attr("ID").unwrap_or_default().to_string();
        let in_response_to = root.attr("InResponseTo").map(str::to_string);
        let issuer_el = root
            .child_ns(SAML_ASSERTION_NS, "Issuer")
            .ok_or_else(|| SamlError::Encoding("LogoutResponse missing Issuer".to_string()))?;
        let status_el = root
            .child_ns(SAML_PROTOCOL_NS, "Status")
            .ok_or_else(|| SamlError::Encoding("LogoutResponse missing Status".to_string()))?;
        let code_el = status_el
            .child_ns(SAML_PROTOCOL_NS, "StatusCode")
            .ok_or_else(|| SamlError::Encoding("Status missing StatusCode".to_string()))?;
        Ok(LogoutResponse {
            id,
            in_response_to,
            issuer: issuer_el.text(),
            status: Status {
                code: code_el.attr("Value").unwrap_or_default().to_string(),
            },
        })
    }
}

/// Local name of the document root, used by the Logout profile to
/// disambiguate an inbound `LogoutRequest` from a `LogoutResponse`.
pub fn root_local_name(xml: &[u8]) -> SamlResult<String> {
    Ok(dom::parse(xml)?.local_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_well_formed_authn_request() {
        let header = MessageHeader {
            id: "abc1234567",
            issue_instant: "2020-01-01T00:00:00Z",
            issuer: "uri:myserviceprovider",
        };
        let xml = build_authn_request(
            header,
            "https://idp.example.com/sso",
            "https://sp.example.com/acs",
            crate::binding::REDIRECT_BINDING,
        )
        .unwrap();
        let root = dom::parse(&xml).unwrap();
        assert!(root.is(SAML_PROTOCOL_NS, "AuthnRequest"));
        assert_eq!(root.attr("ID"), Some("abc1234567"));
        assert_eq!(root.attr("Version"), Some(VERSION));
        let issuer = root.child_ns(SAML_ASSERTION_NS, "Issuer").unwrap();
        assert_eq!(issuer.text(), "uri:myserviceprovider");
    }

    #[test]
    fn builds_logout_request_with_name_id() {
        let header = MessageHeader {
            id: "req0000001",
            issue_instant: "2020-01-01T00:00:00Z",
            issuer: "uri:myserviceprovider",
        };
        let name_id = NameId {
            format: NAME_ID_EMAIL.to_string(),
            value: "jdoe@example.com".to_string(),
        };
        let xml = build_logout_request(header, &name_id).unwrap();
        let root = dom::parse(&xml).unwrap();
        assert!(root.is(SAML_PROTOCOL_NS, "LogoutRequest"));
        let parsed = LogoutRequest::from_element(&root).unwrap();
        assert_eq!(parsed.name_id.unwrap().value, "jdoe@example.com");
    }

    #[test]
    fn round_trips_logout_response() {
        let header = MessageHeader {
            id: "resp000001",
            issue_instant: "2020-01-01T00:00:00Z",
            issuer: "uri:myserviceprovider",
        };
        let xml = build_logout_response(header, "req0000001", SUCCESS_STATUS).unwrap();
        let root = dom::parse(&xml).unwrap();
        let parsed = LogoutResponse::from_element(&root).unwrap();
        assert_eq!(parsed.in_response_to.as_deref(), Some("req0000001"));
        assert_eq!(parsed.status.code, SUCCESS_STATUS);
    }
}
