// SPDX-License-Identifier: AGPL-3.0
// Copyright (C) 2025 MediaGit Contributors

//! Object identifiers and blobs as seen by the filter pipeline

use crate::error::{FilterError, FilterResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Object Identifier - SHA-256 hash of object content
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Oid([u8; 32]);

impl Oid {
    /// Create an OID by hashing the given data
    ///
    /// # Examples
    ///
    /// ```
    /// use mediagit_filter::Oid;
    ///
    /// let oid = Oid::hash(b"test content");
    /// assert_eq!(oid.to_hex().len(), 64);
    /// ```
    pub fn hash(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&hasher.finalize());
        Oid(bytes)
    }

    /// Create OID from raw bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Oid(bytes)
    }

    /// Get the raw bytes of the OID
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Whether every byte is zero (the "unknown object" id)
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    /// Convert OID to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Create OID from a 64 character hex string
    pub fn from_hex(s: &str) -> FilterResult<Self> {
        if s.len() != 64 {
            return Err(FilterError::Object(format!(
                "OID hex string must be 64 characters, got {}",
                s.len()
            )));
        }

        let bytes = hex::decode(s).map_err(|e| FilterError::Object(e.to_string()))?;
        let mut oid_bytes = [0u8; 32];
        oid_bytes.copy_from_slice(&bytes);
        Ok(Oid(oid_bytes))
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Oid({})", &self.to_hex()[..12])
    }
}

/// Blob content loaded from the object database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    id: Oid,
    content: Vec<u8>,
}

impl Blob {
    /// Create a blob whose id is the hash of its content
    pub fn new(content: impl Into<Vec<u8>>) -> Self {
        let content = content.into();
        Self {
            id: Oid::hash(&content),
            content,
        }
    }

    /// Create a blob with an explicit id
    pub fn with_id(id: Oid, content: impl Into<Vec<u8>>) -> Self {
        Self {
            id,
            content: content.into(),
        }
    }

    /// Object id of the blob
    pub fn id(&self) -> &Oid {
        &self.id
    }

    /// Raw (unfiltered) content
    pub fn raw_content(&self) -> &[u8] {
        &self.content
    }

    /// Raw content size in bytes
    pub fn raw_size(&self) -> u64 {
        self.content.len() as u64
    }
}
