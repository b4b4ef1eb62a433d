//! Request-id generation, the deflate+base64 envelope used by the
//! HTTP-Redirect binding, the base64 envelope used by HTTP-POST, and the
//! `NotBefore`/`NotOnOrAfter` window check.

use std::io::{Read, Write};

use base64::Engine;
use chrono::{DateTime, Utc};
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use ring::rand::{SecureRandom, SystemRandom};

use crate::error::{SamlError, SamlResult};

const ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const ID_SIZE: usize = 10;

/// Draws a fresh 10-character alphanumeric id from a cryptographic random
/// source. Every SAML protocol message needs one of these as its `ID`.
pub fn unique_id() -> SamlResult<String> {
    let rng = SystemRandom::new();
    let mut buf = [0u8; ID_SIZE];
    rng.fill(&mut buf)
        .map_err(|_| SamlError::Randomness("getting unique id".to_string()))?;
    for b in buf.iter_mut() {
        *b = ID_ALPHABET[(*b as usize) % ID_ALPHABET.len()];
    }
    // ID_ALPHABET is pure ASCII, so this can't fail.
    Ok(String::from_utf8(buf.to_vec()).expect("alphabet is ascii"))
}

/// RFC1951 deflate (no zlib wrapper) at default compression, then standard
/// base64. Used for the `SAMLRequest`/`SAMLResponse` query parameter on the
/// HTTP-Redirect binding.
pub fn deflate_base64(xml: &[u8]) -> SamlResult<String> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(xml)
        .map_err(|e| SamlError::Encoding(format!("compressing message: {e}")))?;
    let compressed = encoder
        .finish()
        .map_err(|e| SamlError::Encoding(format!("compressing message: {e}")))?;
    Ok(base64::engine::general_purpose::STANDARD.encode(compressed))
}

/// Inverse of [`deflate_base64`]: base64-decode then raw-inflate.
pub fn inflate_base64(value: &str) -> SamlResult<Vec<u8>> {
    let compressed = base64::engine::general_purpose::STANDARD
        .decode(value.trim())
        .map_err(|e| SamlError::Encoding(format!("decoding envelope: {e}")))?;
    let mut decoder = DeflateDecoder::new(compressed.as_slice());
    let mut xml = Vec::new();
    decoder
        .read_to_end(&mut xml)
        .map_err(|e| SamlError::Encoding(format!("inflating envelope: {e}")))?;
    Ok(xml)
}

/// Standard base64, no compression — the envelope used by HTTP-POST.
pub fn decode_base64(value: &str) -> SamlResult<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(value.trim())
        .map_err(|e| SamlError::Encoding(format!("decoding saml response: {e}")))
}

/// `true` iff `not_before < now < not_on_or_after`, strict on both sides.
/// A missing or malformed bound is an error, never a silent accept.
pub fn window_valid(not_before: &str, not_on_or_after: &str, now: DateTime<Utc>) -> SamlResult<bool> {
    let nb = parse_instant(not_before, "NotBefore")?;
    let noa = parse_instant(not_on_or_after, "NotOnOrAfter")?;
    Ok(nb < now && now < noa)
}

fn parse_instant(value: &str, field: &str) -> SamlResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SamlError::Timestamp(format!("parsing {field}: {e}")))
}

/// Renders an instant the way outbound messages require it:
/// `YYYY-MM-DDTHH:MM:SSZ`, UTC, second resolution, no fractional seconds.
pub fn format_issue_instant(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn unique_id_is_ten_alphanumeric_chars() {
        let mut seen = HashSet::new();
        for _ in 0..100 {
            let id = unique_id().unwrap();
            assert_eq!(id.len(), 10);
            assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
            assert!(seen.insert(id), "duplicate id generated");
        }
    }

    #[test]
    fn deflate_base64_round_trips() {
        let xml = b"<samlp:AuthnRequest ID=\"abc\"></samlp:AuthnRequest>";
        let enveloped = deflate_base64(xml).unwrap();
        let recovered = inflate_base64(&enveloped).unwrap();
        assert_eq!(xml.as_slice(), recovered.as_slice());
    }

    #[test]
    fn base64_envelope_round_trips() {
        let xml = b"<samlp:Response></samlp:Response>";
        let encoded = base64::engine::general_purpose::STANDARD.encode(xml);
        let decoded = decode_base64(&encoded).unwrap();
        assert_eq!(xml.as_slice(), decoded.as_slice());
    }

    #[test]
    fn window_valid_strict_both_sides() {
        let nb = "2017-05-29T00:00:00Z";
        let noa = "2017-05-29T00:10:00Z";
        let now = DateTime::parse_from_rfc3339("2017-05-29T00:06:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert!(window_valid(nb, noa, now).unwrap());

        let at_nb = DateTime::parse_from_rfc3339(nb).unwrap().with_timezone(&Utc);
        assert!(!window_valid(nb, noa, at_nb).unwrap());

        let at_noa = DateTime::parse_from_rfc3339(noa).unwrap().with_timezone(&Utc);
        assert!(!window_valid(nb, noa, at_noa).unwrap());
    }

    #[test]
    fn window_valid_rejects_malformed_bounds() {
        let now = Utc::now();
        assert!(window_valid("not-a-time", "2017-05-29T00:10:00Z", now).is_err());
        assert!(window_valid("2017-05-29T00:00:00Z", "", now).is_err());
    }

    #[test]
    fn issue_instant_has_no_fractional_seconds() {
        let now = DateTime::parse_from_rfc3339("2020-01-02T03:04:05.678Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(format_issue_instant(now), "2020-01-02T03:04:05Z");
    }
}
