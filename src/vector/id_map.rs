//! Position → record id side table.
//!
//! The index only knows insertion positions. This table resolves them and is
//! persisted next to the index blob. It carries the fingerprint of the
//! posting-list layout it was built with; loading it against a different
//! index is reported as [`VectorError::MappingDrift`].

use bincode::{Decode, Encode};

use crate::vector::index::{Fingerprint, SearchIndex};
use crate::vector::types::{Position, RecordId, VectorError};

/// Current on-disk version of the side table.
pub const ID_MAP_VERSION: u32 = 1;

#[derive(Encode, Decode)]
struct IdMapFile {
    version: u32,
    fingerprint: Fingerprint,
    ids: Vec<u64>,
}

/// Record ids indexed by insertion position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdMap {
    ids: Vec<RecordId>,
    fingerprint: Fingerprint,
}

impl IdMap {
    #[must_use]
    pub fn new(ids: Vec<RecordId>, fingerprint: Fingerprint) -> Self {
        Self { ids, fingerprint }
    }

    /// Record stored at `position`; `None` for the sentinel or out-of-range
    /// positions.
    #[must_use]
    pub fn resolve(&self, position: Position) -> Option<RecordId> {
        if !position.is_valid() {
            return None;
        }
        self.ids.get(position.get() as usize).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    #[must_use]
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Checks that this table was produced together with `index`.
    pub fn verify_against(&self, index: &SearchIndex) -> Result<(), VectorError> {
        if &self.fingerprint != index.fingerprint() {
            return Err(VectorError::MappingDrift {
                reason: "posting-list fingerprint differs".to_string(),
            });
        }
        if self.ids.len() != index.len() {
            return Err(VectorError::MappingDrift {
                reason: format!(
                    "{} ids for {} indexed vectors",
                    self.ids.len(),
                    index.len()
                ),
            });
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, VectorError> {
        let file = IdMapFile {
            version: ID_MAP_VERSION,
            fingerprint: self.fingerprint,
            ids: self.ids.iter().map(RecordId::get).collect(),
        };
        bincode::encode_to_vec(&file, bincode::config::standard())
            .map_err(|e| VectorError::InvalidFormat(format!("id map encoding failed: {e}")))
    }

    /// Decodes a side table, checking the version before the body.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, VectorError> {
        let config = bincode::config::standard();

        let (version, _): (u32, usize) = bincode::decode_from_slice(bytes, config)
            .map_err(|e| VectorError::InvalidFormat(format!("id map header: {e}")))?;
        if version != ID_MAP_VERSION {
            return Err(VectorError::FormatVersion {
                expected: ID_MAP_VERSION,
                actual: version,
            });
        }

        let (file, read): (IdMapFile, usize) = bincode::decode_from_slice(bytes, config)
            .map_err(|e| VectorError::InvalidFormat(format!("id map body: {e}")))?;
        if read != bytes.len() {
            return Err(VectorError::InvalidFormat(format!(
                "{} trailing bytes after id map",
                bytes.len() - read
            )));
        }

        Ok(Self {
            ids: file.ids.into_iter().map(RecordId::new).collect(),
            fingerprint: file.fingerprint,
        })
    }
}
