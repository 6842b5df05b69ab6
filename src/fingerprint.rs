use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{IndexError, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FingerprintMode {
    /// Modification time and size. Cheap, and what the index uses by default.
    #[default]
    Metadata,
    /// Metadata plus a SHA-256 of the whole file.
    ContentHash,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub modified_nanos: u64,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

impl Fingerprint {
    pub fn compute(path: &Path, mode: FingerprintMode) -> Result<Self> {
        let meta = path.metadata().map_err(|e| IndexError::io(path, e))?;
        let mtime = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        let nanos = mtime
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();

        let sha256 = match mode {
            FingerprintMode::Metadata => None,
            FingerprintMode::ContentHash => Some(hash_file(path)?),
        };

        Ok(Self {
            modified_nanos: u64::try_from(nanos).unwrap_or(u64::MAX),
            size: meta.len(),
            sha256,
        })
    }
}

pub fn hash_file(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|e| IndexError::io(path, e))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).map_err(|e| IndexError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
