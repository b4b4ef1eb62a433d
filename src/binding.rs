//! Binding URIs and the first-match-wins endpoint resolver.

use crate::error::{SamlError, SamlResult};

/// `urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect`
pub const REDIRECT_BINDING: &str = "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect";
/// `urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST`
pub const POST_BINDING: &str = "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST";
/// `urn:oasis:names:tc:SAML:2.0:bindings:SOAP` — never selected by this
/// core; present only so resolution against it surfaces
/// [`SamlError::BindingNotSupported`] cleanly rather than a parse error.
pub const SOAP_BINDING: &str = "urn:oasis:names:tc:SAML:2.0:bindings:SOAP";

/// A service endpoint as it appears in IdP metadata: a binding URI paired
/// with the location to use for it. Shared by `SingleSignOnService` and
/// `SingleLogoutService`.
pub trait Endpoint {
    fn binding(&self) -> &str;
    fn location(&self) -> &str;
}

/// Returns the `Location` of the first endpoint whose `Binding` matches
/// `desired_binding` exactly, or [`SamlError::BindingNotSupported`].
pub fn resolve<'a, E: Endpoint>(desired_binding: &str, endpoints: &'a [E]) -> SamlResult<&'a str> {
    endpoints
        .iter()
        .find(|e| e.binding() == desired_binding)
        .map(Endpoint::location)
        .ok_or(SamlError::BindingNotSupported)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Svc {
        binding: String,
        location: String,
    }

    impl Endpoint for Svc {
        fn binding(&self) -> &str {
            &self.binding
        }
        fn location(&self) -> &str {
            &self.location
        }
    }

    fn fixture() -> Vec<Svc> {
        vec![
            Svc {
                binding: REDIRECT_BINDING.to_string(),
                location: "https://myidp.com/redirect".to_string(),
            },
            Svc {
                binding: POST_BINDING.to_string(),
                location: "https://myidp.com/post".to_string(),
            },
        ]
    }

    #[test]
    fn first_match_wins() {
        let svcs = fixture();
        assert_eq!(resolve(REDIRECT_BINDING, &svcs).unwrap(), "https://myidp.com/redirect");
        assert_eq!(resolve(POST_BINDING, &svcs).unwrap(), "https://myidp.com/post");
    }

    #[test]
    fn unsupported_binding_is_an_error() {
        let svcs = fixture();
        let err = resolve(SOAP_BINDING, &svcs).unwrap_err();
        assert!(matches!(err, SamlError::BindingNotSupported));
    }

    #[test]
    fn empty_endpoint_list_is_unsupported() {
        let svcs: Vec<Svc> = vec![];
        assert!(resolve(REDIRECT_BINDING, &svcs).is_err());
    }
}
