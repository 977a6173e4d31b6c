//! SHA-256 digests for catalog content hashes.
//!
//! The remote catalog tags every package file with a `<algorithm>:<hex>`
//! digest. Only `sha256` is understood here, which is what the registry
//! publishes.

use std::{
    fmt,
    fs::File,
    io::{self, Read, Write},
    path::Path,
    str::FromStr,
};

use sha2::{Digest, Sha256};

use crate::error::{HashError, HashResult};

/// Length of a hex-encoded SHA-256 digest.
pub const SHA256_HEX_LEN: usize = 64;

/// A parsed, algorithm-tagged content hash such as `sha256:ab12…`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash {
    algorithm: String,
    hex: String,
}

impl ContentHash {
    /// Builds a `sha256` hash from a bare hex digest, normalising to lowercase.
    pub fn sha256(hex: &str) -> HashResult<Self> {
        if !is_sha256_hex(hex) {
            return Err(HashError::Malformed(hex.to_string()));
        }
        Ok(Self {
            algorithm: "sha256".into(),
            hex: hex.to_ascii_lowercase(),
        })
    }

    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    pub fn hex(&self) -> &str {
        &self.hex
    }

    pub fn is_sha256(&self) -> bool {
        self.algorithm == "sha256"
    }
}

impl FromStr for ContentHash {
    type Err = HashError;

    /// Parses `<algorithm>:<hex>`.
    ///
    /// Unknown algorithms are accepted so that callers can report them; a
    /// `sha256` tag additionally requires a well-formed 64-character digest.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (algorithm, hex) = s
            .split_once(':')
            .ok_or_else(|| HashError::Malformed(s.to_string()))?;

        if algorithm.is_empty() || hex.is_empty() {
            return Err(HashError::Malformed(s.to_string()));
        }

        if algorithm.eq_ignore_ascii_case("sha256") {
            return Self::sha256(hex);
        }

        Ok(Self {
            algorithm: algorithm.to_ascii_lowercase(),
            hex: hex.to_string(),
        })
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.hex)
    }
}

/// Returns `true` if `s` looks like a hex-encoded SHA-256 digest.
pub fn is_sha256_hex(s: &str) -> bool {
    s.len() == SHA256_HEX_LEN && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Computes the SHA-256 digest of everything `reader` yields.
pub fn sha256_reader<R: Read>(mut reader: R) -> io::Result<String> {
    let mut writer = DigestWriter::new(io::sink());
    io::copy(&mut reader, &mut writer)?;
    Ok(writer.finish().1)
}

/// Calculates the hex-encoded SHA-256 checksum of a file.
///
/// # Errors
///
/// * [`HashError::ReadFailed`] if the file cannot be opened or read.
///
/// # Example
///
/// ```no_run
/// use extmirror_utils::hash::calculate_checksum;
///
/// let checksum = calculate_checksum("/path/to/file.zip").unwrap();
/// println!("sha256:{checksum}");
/// ```
pub fn calculate_checksum<P: AsRef<Path>>(file_path: P) -> HashResult<String> {
    let file_path = file_path.as_ref();
    let read_failed = |err| {
        HashError::ReadFailed {
            path: file_path.to_path_buf(),
            source: err,
        }
    };
    let file = File::open(file_path).map_err(read_failed)?;
    sha256_reader(file).map_err(read_failed)
}

/// Verifies the checksum of a file against an expected hex digest,
/// ignoring case.
pub fn verify_checksum<P: AsRef<Path>>(file_path: P, expected: &str) -> HashResult<bool> {
    let actual = calculate_checksum(file_path)?;
    Ok(actual.eq_ignore_ascii_case(expected))
}

/// A writer adapter that digests every byte passed through it.
pub struct DigestWriter<W> {
    inner: W,
    hasher: Sha256,
    written: u64,
}

impl<W: Write> DigestWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            written: 0,
        }
    }

    /// Number of bytes written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Consumes the adapter, returning the inner writer and the hex digest.
    pub fn finish(self) -> (W, String) {
        (self.inner, hex::encode(self.hasher.finalize()))
    }
}

impl<W: Write> Write for DigestWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
