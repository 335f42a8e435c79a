use crate::error::{AdapterError, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use md5::Md5;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    /// Matches the ETag S3 returns for single-part uploads.
    Md5,
    Sha256,
}

impl DigestAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            DigestAlgorithm::Md5 => "md5",
            DigestAlgorithm::Sha256 => "sha256",
        }
    }
}

impl FromStr for DigestAlgorithm {
    type Err = AdapterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "md5" => Ok(DigestAlgorithm::Md5),
            "sha256" | "sha-256" => Ok(DigestAlgorithm::Sha256),
            other => Err(AdapterError::Config(format!(
                "unknown digest algorithm '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DigestEncoding {
    #[default]
    Hex,
    Base64,
}

impl DigestEncoding {
    pub fn encode(&self, bytes: &[u8]) -> String {
        match self {
            DigestEncoding::Hex => hex::encode(bytes),
            DigestEncoding::Base64 => BASE64.encode(bytes),
        }
    }
}

enum Hasher {
    Md5(Md5),
    Sha256(Sha256),
}

impl Hasher {
    fn new(algorithm: DigestAlgorithm) -> Self {
        match algorithm {
            DigestAlgorithm::Md5 => Hasher::Md5(Md5::new()),
            DigestAlgorithm::Sha256 => Hasher::Sha256(Sha256::new()),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Hasher::Md5(h) => h.update(data),
            Hasher::Sha256(h) => h.update(data),
        }
    }

    fn finalize(self) -> Vec<u8> {
        match self {
            Hasher::Md5(h) => h.finalize().to_vec(),
            Hasher::Sha256(h) => h.finalize().to_vec(),
        }
    }
}

/// Incremental digest over a byte stream.
///
/// Once a write is refused the accumulator stays failed: further writes and
/// `finish` are rejected so a partial digest can never be reported.
pub struct DigestAccumulator {
    hasher: Option<Hasher>,
    output: Option<Vec<u8>>,
    bytes: u64,
    limit: Option<u64>,
    failed: bool,
}

impl DigestAccumulator {
    pub fn new(algorithm: DigestAlgorithm) -> Self {
        Self {
            hasher: Some(Hasher::new(algorithm)),
            output: None,
            bytes: 0,
            limit: None,
            failed: false,
        }
    }

    /// Refuse any write that would take the total past `limit` bytes.
    pub fn with_limit(mut self, limit: Option<u64>) -> Self {
        self.limit = limit;
        self
    }

    pub fn write(&mut self, chunk: &[u8]) -> Result<()> {
        if self.failed {
            return Err(AdapterError::InvalidState(
                "digest accumulator already failed".to_string(),
            ));
        }
        let hasher = self.hasher.as_mut().ok_or_else(|| {
            AdapterError::InvalidState("write after digest was finished".to_string())
        })?;

        let next = self.bytes + chunk.len() as u64;
        if let Some(limit) = self.limit {
            if next > limit {
                self.failed = true;
                return Err(AdapterError::PayloadTooLarge { limit });
            }
        }

        hasher.update(chunk);
        self.bytes = next;
        Ok(())
    }

    pub fn finish(&mut self) -> Result<()> {
        if self.failed {
            return Err(AdapterError::InvalidState(
                "cannot finish a failed digest".to_string(),
            ));
        }
        if let Some(hasher) = self.hasher.take() {
            self.output = Some(hasher.finalize());
        }
        Ok(())
    }

    pub fn digest_bytes(&self) -> Result<&[u8]> {
        self.output.as_deref().ok_or_else(|| {
            AdapterError::InvalidState("digest requested before end of data".to_string())
        })
    }

    pub fn digest(&self, encoding: DigestEncoding) -> Result<String> {
        self.digest_bytes().map(|bytes| encoding.encode(bytes))
    }
}

pub fn calculate_hash(algorithm: DigestAlgorithm, data: &[u8]) -> String {
    let mut hasher = Hasher::new(algorithm);
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_hash() {
        let data = b"hello world";
        assert_eq!(
            calculate_hash(DigestAlgorithm::Sha256, data),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
        assert_eq!(
            calculate_hash(DigestAlgorithm::Md5, data),
            "5eb63bbbe01eeed093cb22bb8f5acdc3"
        );
    }

    #[test]
    fn test_calculate_hash_empty() {
        assert_eq!(
            calculate_hash(DigestAlgorithm::Sha256, b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            calculate_hash(DigestAlgorithm::Md5, b""),
            "d41d8cd98f00b204e9800998ecf8427e"
        );
    }

    #[test]
    fn test_chunked_writes_match_one_shot() {
        let mut acc = DigestAccumulator::new(DigestAlgorithm::Md5);
        acc.write(b"hello").unwrap();
        acc.write(b" ").unwrap();
        acc.write(b"world").unwrap();
        acc.finish().unwrap();

        assert_eq!(
            acc.digest(DigestEncoding::Hex).unwrap(),
            calculate_hash(DigestAlgorithm::Md5, b"hello world")
        );
    }

    #[test]
    fn test_digest_before_finish_is_invalid_state() {
        let mut acc = DigestAccumulator::new(DigestAlgorithm::Sha256);
        acc.write(b"data").unwrap();
        assert!(matches!(
            acc.digest(DigestEncoding::Hex),
            Err(AdapterError::InvalidState(_))
        ));
    }

    #[test]
    fn test_digest_is_stable_after_finish() {
        let mut acc = DigestAccumulator::new(DigestAlgorithm::Sha256);
        acc.write(b"abc").unwrap();
        acc.finish().unwrap();
        let first = acc.digest(DigestEncoding::Hex).unwrap();
        acc.finish().unwrap();
        assert_eq!(first, acc.digest(DigestEncoding::Hex).unwrap());
        assert!(acc.write(b"more").is_err());
    }

    #[test]
    fn test_base64_encoding() {
        let mut acc = DigestAccumulator::new(DigestAlgorithm::Md5);
        acc.finish().unwrap();
        // md5("") as base64, the form S3 expects in Content-MD5
        assert_eq!(
            acc.digest(DigestEncoding::Base64).unwrap(),
            "1B2M2Y8AsgTpgAmY7PhCfg=="
        );
    }

    #[test]
    fn test_limit_refuses_and_stays_failed() {
        let mut acc = DigestAccumulator::new(DigestAlgorithm::Md5).with_limit(Some(4));
        acc.write(b"abcd").unwrap();
        assert!(matches!(
            acc.write(b"e"),
            Err(AdapterError::PayloadTooLarge { limit: 4 })
        ));
        assert!(matches!(acc.write(b""), Err(AdapterError::InvalidState(_))));
        assert!(acc.finish().is_err());
        assert!(acc.digest(DigestEncoding::Hex).is_err());
    }

    #[test]
    fn test_parse_algorithm() {
        assert_eq!("MD5".parse::<DigestAlgorithm>().unwrap(), DigestAlgorithm::Md5);
        assert_eq!(
            "sha-256".parse::<DigestAlgorithm>().unwrap(),
            DigestAlgorithm::Sha256
        );
        assert!("crc32".parse::<DigestAlgorithm>().is_err());
    }
}
