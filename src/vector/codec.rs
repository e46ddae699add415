//! Binary serialization of a [`SearchIndex`].
//!
//! # Format
//!
//! All integers and floats are little-endian.
//!
//! ```text
//! magic        4   b"JMIX"
//! version      u32
//! dimension    u32
//! clusters     u32
//! nprobe       u32
//! quantization u8   0 = flat, 1 = product
//! subvectors   u32  0 when flat
//! bits         u8   0 when flat
//! entries      u64  total posting slots
//! fingerprint  32
//! centroids    clusters * dimension f32
//! codebook     (dimension << bits) f32, product only
//! lists        per cluster: len u32, len * position u32,
//!              then len * dimension f32 (flat) or len * subvectors u8 (product)
//! ```
//!
//! Decoding recomputes the posting-list fingerprint and rejects blobs whose
//! header disagrees with their contents.

use std::sync::Arc;

use crate::vector::index::{Fingerprint, PostingList, SearchIndex};
use crate::vector::pq::ProductQuantizer;
use crate::vector::quantizer::TrainedQuantizer;
use crate::vector::types::{Position, VectorDimension, VectorError};

/// Magic bytes at the start of every index blob.
pub const INDEX_MAGIC: &[u8; 4] = b"JMIX";

/// Current index format version.
pub const INDEX_FORMAT_VERSION: u32 = 1;

const QUANTIZATION_FLAT: u8 = 0;
const QUANTIZATION_PRODUCT: u8 = 1;

/// Encodes and decodes index blobs.
pub struct IndexCodec;

impl IndexCodec {
    /// Serializes `index` into a self-describing blob.
    #[must_use]
    pub fn encode(index: &SearchIndex) -> Vec<u8> {
        let quantizer = index.quantizer();
        let dimension = index.dimension().get();
        let entries: usize = index.lists().iter().map(PostingList::len).sum();

        let mut out = ByteWriter::with_capacity(64 + entries * 8);
        out.bytes(INDEX_MAGIC);
        out.u32(INDEX_FORMAT_VERSION);
        out.u32(dimension as u32);
        out.u32(index.cluster_count() as u32);
        out.u32(index.default_nprobe() as u32);
        match quantizer.codebook() {
            None => {
                out.u8(QUANTIZATION_FLAT);
                out.u32(0);
                out.u8(0);
            }
            Some(pq) => {
                out.u8(QUANTIZATION_PRODUCT);
                out.u32(pq.num_subvectors() as u32);
                out.u8(pq.bits());
            }
        }
        out.u64(entries as u64);
        out.bytes(index.fingerprint());

        for centroid in quantizer.centroids() {
            out.f32s(centroid);
        }
        if let Some(pq) = quantizer.codebook() {
            out.f32s(pq.centroids());
        }

        for list in index.lists() {
            out.u32(list.len() as u32);
            for position in list.positions() {
                out.bytes(&position.to_bytes());
            }
            match quantizer.codebook() {
                None => out.f32s(list.vectors()),
                Some(_) => out.bytes(list.codes()),
            }
        }

        out.into_inner()
    }

    /// Reconstructs an index from [`encode`](Self::encode) output.
    ///
    /// # Errors
    /// - [`VectorError::FormatVersion`] for blobs of another format version
    /// - [`VectorError::InvalidFormat`] for bad magic, truncation, trailing
    ///   bytes or a fingerprint that does not match the posting lists
    pub fn decode(bytes: &[u8]) -> Result<SearchIndex, VectorError> {
        let mut reader = ByteReader::new(bytes);

        if reader.take(INDEX_MAGIC.len())? != INDEX_MAGIC {
            return Err(VectorError::InvalidFormat("bad magic bytes".to_string()));
        }
        let version = reader.u32()?;
        if version != INDEX_FORMAT_VERSION {
            return Err(VectorError::FormatVersion {
                expected: INDEX_FORMAT_VERSION,
                actual: version,
            });
        }

        let dimension = VectorDimension::new(reader.u32()? as usize)?;
        let clusters = reader.u32()? as usize;
        let nprobe = reader.u32()? as usize;
        let kind = reader.u8()?;
        let subvectors = reader.u32()? as usize;
        let bits = reader.u8()?;
        let entries = reader.u64()?;
        let mut fingerprint: Fingerprint = [0; 32];
        fingerprint.copy_from_slice(reader.take(32)?);

        let d = dimension.get();
        let mut centroids = Vec::with_capacity(clusters.min(reader.remaining() / 4));
        for _ in 0..clusters {
            centroids.push(reader.f32s(d)?);
        }

        let codebook = match kind {
            QUANTIZATION_FLAT => None,
            QUANTIZATION_PRODUCT => {
                ProductQuantizer::validate(d, subvectors, bits)?;
                let values = reader.f32s(d << bits)?;
                Some(ProductQuantizer::from_parts(d, subvectors, bits, values)?)
            }
            other => {
                return Err(VectorError::InvalidFormat(format!(
                    "unknown quantization kind {other}"
                )));
            }
        };

        let mut lists = Vec::with_capacity(clusters.min(reader.remaining() / 4));
        let mut seen_entries = 0u64;
        for _ in 0..clusters {
            let len = reader.u32()? as usize;
            seen_entries += len as u64;

            let positions = reader
                .take(checked_len(len, 4)?)?
                .chunks_exact(4)
                .map(|b| Position::from_bytes([b[0], b[1], b[2], b[3]]))
                .collect();
            let list = match &codebook {
                None => {
                    let vectors = reader.f32s(checked_len(len, d)?)?;
                    PostingList::from_parts(positions, vectors, Vec::new())
                }
                Some(pq) => {
                    let codes = reader.take(checked_len(len, pq.num_subvectors())?)?.to_vec();
                    PostingList::from_parts(positions, Vec::new(), codes)
                }
            };
            lists.push(list);
        }

        if reader.remaining() != 0 {
            return Err(VectorError::InvalidFormat(format!(
                "{} trailing bytes after posting lists",
                reader.remaining()
            )));
        }
        if seen_entries != entries {
            return Err(VectorError::InvalidFormat(format!(
                "header declares {entries} entries, lists hold {seen_entries}"
            )));
        }

        let quantizer = TrainedQuantizer::from_parts(dimension, centroids, codebook)?;
        let index = SearchIndex::from_parts(Arc::new(quantizer), lists, nprobe)?;
        if index.fingerprint() != &fingerprint {
            return Err(VectorError::InvalidFormat(
                "posting lists do not match the stored fingerprint".to_string(),
            ));
        }

        Ok(index)
    }
}

fn checked_len(count: usize, width: usize) -> Result<usize, VectorError> {
    count
        .checked_mul(width)
        .ok_or_else(|| VectorError::InvalidFormat("length overflow".to_string()))
}

struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    fn bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    fn u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    fn u32(&mut self, value: u32) {
        self.bytes(&value.to_le_bytes());
    }

    fn u64(&mut self, value: u64) {
        self.bytes(&value.to_le_bytes());
    }

    fn f32s(&mut self, values: &[f32]) {
        for value in values {
            self.bytes(&value.to_le_bytes());
        }
    }

    fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

struct ByteReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> ByteReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.offset
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], VectorError> {
        if len > self.remaining() {
            return Err(VectorError::InvalidFormat(format!(
                "truncated: wanted {len} bytes at offset {}, {} left",
                self.offset,
                self.remaining()
            )));
        }
        let slice = &self.bytes[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, VectorError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, VectorError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Result<u64, VectorError> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(buf))
    }

    fn f32s(&mut self, count: usize) -> Result<Vec<f32>, VectorError> {
        let bytes = self.take(checked_len(count, 4)?)?;
        Ok(bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::builder::IndexBuilder;
    use crate::vector::quantizer::{Quantization, QuantizerConfig};
    use crate::vector::types::RecordId;

    fn records(n: usize, dim: usize) -> Vec<(RecordId, Vec<f32>)> {
        (0..n)
            .map(|i| {
                let v = (0..dim).map(|j| ((i * 5 + j * 3) % 13) as f32).collect();
                (RecordId::new(i as u64), v)
            })
            .collect()
    }

    fn flat_index() -> SearchIndex {
        let config = QuantizerConfig {
            quantization: Quantization::Flat,
            ..Default::default()
        };
        IndexBuilder::build(config, 3, &records(60, 4)).unwrap().index
    }

    #[test]
    fn test_decoded_index_answers_identically() {
        let config = QuantizerConfig {
            quantization: Quantization::Product {
                subvectors: 2,
                bits: 4,
            },
            ..Default::default()
        };
        let original = IndexBuilder::build(config, 2, &records(120, 4)).unwrap().index;
        let decoded = IndexCodec::decode(&IndexCodec::encode(&original)).unwrap();

        assert_eq!(decoded.fingerprint(), original.fingerprint());
        assert_eq!(decoded.default_nprobe(), 2);
        assert!(decoded.quantizer().is_quantized());
        for query in [[0.0, 1.0, 2.0, 3.0], [12.0, 4.0, 7.0, 1.0]] {
            let a = original.search(&query, 5, 3).unwrap();
            let b = decoded.search(&query, 5, 3).unwrap();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = IndexCodec::encode(&flat_index());
        bytes[0] = b'X';
        assert!(matches!(
            IndexCodec::decode(&bytes),
            Err(VectorError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_version_mismatch() {
        let mut bytes = IndexCodec::encode(&flat_index());
        bytes[4..8].copy_from_slice(&2u32.to_le_bytes());
        assert!(matches!(
            IndexCodec::decode(&bytes),
            Err(VectorError::FormatVersion {
                expected: 1,
                actual: 2
            })
        ));
    }

    #[test]
    fn test_truncated_and_padded() {
        let bytes = IndexCodec::encode(&flat_index());
        for cut in [3, 20, bytes.len() / 2, bytes.len() - 1] {
            assert!(matches!(
                IndexCodec::decode(&bytes[..cut]),
                Err(VectorError::InvalidFormat(_))
            ));
        }
        let mut padded = bytes;
        padded.push(0);
        assert!(matches!(
            IndexCodec::decode(&padded),
            Err(VectorError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_tampered_fingerprint() {
        let mut bytes = IndexCodec::encode(&flat_index());
        // Fingerprint starts after the 34-byte fixed header
        bytes[34] ^= 0xFF;
        assert!(matches!(
            IndexCodec::decode(&bytes),
            Err(VectorError::InvalidFormat(_))
        ));
    }
}
