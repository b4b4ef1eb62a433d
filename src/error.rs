//! Error taxonomy for the SAML core.

use thiserror::Error;

/// Errors produced by the SAML core.
///
/// Every variant carries a message naming the stage that failed (decoding,
/// validating a signature, parsing a logout response, ...) so a host can
/// render or log a useful diagnostic without inspecting the variant.
#[derive(Debug, Error)]
pub enum SamlError {
    /// Metadata missing a required element, or a certificate failed to parse.
    #[error("configuration error: {0}")]
    Config(String),

    /// No endpoint in the IdP's service list matches the desired binding.
    #[error("binding not supported by IdP")]
    BindingNotSupported,

    /// XML marshal/unmarshal failure, or base64/deflate failure.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// No enclosing or assertion-level signature was found.
    ///
    /// Distinct from [`SamlError::Signature`] so the verifier can fall
    /// through from "no Response-level signature" to assertion-level
    /// checking without treating the absence as fatal prematurely.
    #[error("missing signature")]
    MissingSignature,

    /// A signature was present but did not validate: untrusted certificate,
    /// digest mismatch, malformed reference, or a wrapped-assertion attempt.
    #[error("signature error: {0}")]
    Signature(String),

    /// Issuer mismatch, non-success status, unexpected root element, or a
    /// missing envelope on an SLO callback.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A timestamp failed to parse, or fell outside `NotBefore`/`NotOnOrAfter`.
    #[error("timestamp error: {0}")]
    Timestamp(String),

    /// The cryptographic random source failed while generating a request id.
    #[error("randomness error: {0}")]
    Randomness(String),
}

/// Result type used throughout the core.
pub type SamlResult<T> = Result<T, SamlError>;
