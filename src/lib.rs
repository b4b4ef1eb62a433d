//! SAML 2.0 Service Provider core.
//!
//! Covers IdP metadata parsing and binding resolution, outbound
//! `AuthnRequest`/`LogoutRequest` construction for the HTTP-Redirect
//! binding, inbound signed `Response` validation for HTTP-POST, and
//! Single Logout routing. Does not sign outbound messages, speak SOAP or
//! the Artifact binding, manage sessions, or implement IdP-side behavior —
//! all of that is the host application's job.

pub mod binding;
mod codec;
mod dom;
pub mod error;
pub mod metadata;
pub mod profile;
pub mod schema;
pub mod signature;
pub mod slo;
pub mod sp;
pub mod sso;

pub use error::{SamlError, SamlResult};
pub use metadata::{EntityDescriptor, IdpSsoDescriptor, KeyDescriptor, SingleLogoutService, SingleSignOnService};
pub use profile::{CallbackResponse, Identity};
pub use slo::LogoutProfile;
pub use sp::ServiceProvider;
pub use sso::{RedirectOptions, SignOnProfile};
