use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

use super::{collapse_whitespace, normalize_text, Digest, ExtractedRecord, Extractor, RecordKind};
use crate::error::ExtractError;

/// How the body is prepared before hashing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    /// Bytes exactly as fetched.
    #[default]
    Raw,
    /// Lossy UTF-8, whitespace runs collapsed.
    Whitespace,
    /// Lossy UTF-8, tags stripped, entities decoded, whitespace collapsed.
    Text,
}

/// "Did the page change at all?" Deterministic: same bytes, same digest.
#[derive(Debug, Clone, Default)]
pub struct FingerprintExtractor {
    normalization: Normalization,
}

impl FingerprintExtractor {
    pub fn new(normalization: Normalization) -> Self {
        Self { normalization }
    }

    pub fn digest(&self, body: &[u8]) -> Digest {
        let mut hasher = Sha256::new();
        match self.normalization {
            Normalization::Raw => hasher.update(body),
            Normalization::Whitespace => {
                hasher.update(collapse_whitespace(&String::from_utf8_lossy(body)).as_bytes())
            }
            Normalization::Text => {
                hasher.update(normalize_text(&String::from_utf8_lossy(body)).as_bytes())
            }
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&hasher.finalize());
        Digest::from_bytes(bytes)
    }
}

impl Extractor for FingerprintExtractor {
    fn kind(&self) -> RecordKind {
        RecordKind::Fingerprint
    }

    fn extract(&self, body: &[u8]) -> Result<ExtractedRecord, ExtractError> {
        Ok(ExtractedRecord::Fingerprint {
            hash: self.digest(body),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_digest_matches_known_sha256() {
        let fx = FingerprintExtractor::default();
        // sha256("abc")
        assert_eq!(
            fx.digest(b"abc").to_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn raw_is_sensitive_to_whitespace() {
        let fx = FingerprintExtractor::new(Normalization::Raw);
        assert_ne!(fx.digest(b"<p>a  b</p>"), fx.digest(b"<p>a b</p>"));
    }

    #[test]
    fn whitespace_mode_ignores_reflow() {
        let fx = FingerprintExtractor::new(Normalization::Whitespace);
        assert_eq!(
            fx.digest(b"<p>a  b</p>\n\n"),
            fx.digest(b"  <p>a\tb</p>")
        );
        assert_ne!(fx.digest(b"<p>a b</p>"), fx.digest(b"<div>a b</div>"));
    }

    #[test]
    fn text_mode_ignores_markup() {
        let fx = FingerprintExtractor::new(Normalization::Text);
        assert_eq!(
            fx.digest(b"<p class=\"x\">Hello&nbsp;world</p>"),
            fx.digest(b"<div>Hello world</div>")
        );
        assert_ne!(fx.digest(b"<p>Hello</p>"), fx.digest(b"<p>Goodbye</p>"));
    }

    #[test]
    fn extract_never_fails() {
        let fx = FingerprintExtractor::new(Normalization::Text);
        let out = fx.extract(&[0xff, 0xfe, 0x00, b'<']).unwrap();
        assert_eq!(out.kind(), RecordKind::Fingerprint);
    }
}
