use crate::cores::catalog::Resource;
use anyhow::{Context, Result};
use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

/// Digest algorithms accepted in `ALGO:hex` checksum strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Sha256,
    Sha1,
    Md5,
}

/// A parsed `ALGO:hex` checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checksum {
    pub algorithm: Algorithm,
    pub expected: String,
}

impl Checksum {
    /// `Ok(None)` when the index did not declare a checksum.
    pub fn parse(raw: &str) -> Result<Option<Self>> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        let (algo, digest) = raw
            .split_once(':')
            .with_context(|| format!("invalid checksum format: {}", raw))?;
        let algorithm = match algo.to_ascii_uppercase().as_str() {
            "SHA-256" => Algorithm::Sha256,
            "SHA-1" => Algorithm::Sha1,
            "MD5" => Algorithm::Md5,
            other => anyhow::bail!("unsupported hash algorithm: {}", other),
        };
        let bytes = hex::decode(digest)
            .with_context(|| format!("invalid hash '{}'", digest))?;
        Ok(Some(Self {
            algorithm,
            expected: hex::encode(bytes),
        }))
    }

    pub fn hasher(&self) -> StreamHasher {
        StreamHasher::new(self.algorithm)
    }

    /// Compare a finished digest with the expected one.
    pub fn verify(&self, computed: &str, what: &str) -> Result<()> {
        if !computed.eq_ignore_ascii_case(&self.expected) {
            anyhow::bail!(
                "archive hash differs from hash in index for {}: expected {}, got {}",
                what,
                self.expected,
                computed
            );
        }
        Ok(())
    }
}

/// Incremental digest fed chunk by chunk while streaming a download.
pub enum StreamHasher {
    Sha256(Sha256),
    Sha1(Sha1),
    Md5(Md5),
}

impl StreamHasher {
    pub fn new(algorithm: Algorithm) -> Self {
        match algorithm {
            Algorithm::Sha256 => StreamHasher::Sha256(Sha256::new()),
            Algorithm::Sha1 => StreamHasher::Sha1(Sha1::new()),
            Algorithm::Md5 => StreamHasher::Md5(Md5::new()),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        match self {
            StreamHasher::Sha256(h) => h.update(data),
            StreamHasher::Sha1(h) => h.update(data),
            StreamHasher::Md5(h) => h.update(data),
        }
    }

    pub fn finalize_hex(self) -> String {
        match self {
            StreamHasher::Sha256(h) => hex::encode(h.finalize()),
            StreamHasher::Sha1(h) => hex::encode(h.finalize()),
            StreamHasher::Md5(h) => hex::encode(h.finalize()),
        }
    }
}

/// Check an archive on disk against the size and checksum declared for it.
pub fn verify_file(path: &Path, resource: &Resource) -> Result<()> {
    let meta = std::fs::metadata(path)
        .with_context(|| format!("Failed to stat archive {:?}", path))?;
    if resource.size > 0 && meta.len() != resource.size {
        anyhow::bail!(
            "fetched archive size differs from size specified in index: expected {}, got {}",
            resource.size,
            meta.len()
        );
    }

    let Some(checksum) = Checksum::parse(&resource.checksum)? else {
        return Ok(());
    };
    let mut file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open archive {:?}", path))?;
    let mut hasher = checksum.hasher();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file
            .read(&mut buf)
            .with_context(|| format!("Failed to read archive {:?}", path))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    checksum.verify(&hasher.finalize_hex(), &resource.archive_file_name)
}
