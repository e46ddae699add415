//! Durable, append-only table of record embeddings.
//!
//! Vectors are written once per embedding run and read back in bulk when the
//! index is rebuilt. Reads go through a memory map; writes append to the file
//! and then patch the count in the header.
//!
//! # Storage Format
//!
//! - Header (16 bytes): magic `JVEC`, version, dimension, entry count (u32 LE)
//! - Entries: `[record id: u64][f32; dimension]`, little-endian
//!
//! Only the first `count` entries are read, so a torn append past the header
//! count is ignored. A record id may appear more than once; the latest entry
//! wins.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use memmap2::{Mmap, MmapOptions};
use tempfile::NamedTempFile;

use crate::vector::types::{RecordId, VectorDimension, VectorError};

/// File name of the vector table inside the data directory.
pub const VECTOR_FILE_NAME: &str = "vectors.vec";

const STORAGE_VERSION: u32 = 1;
const HEADER_SIZE: usize = 16;
const MAGIC_BYTES: &[u8; 4] = b"JVEC";
const BYTES_PER_F32: usize = 4;
const BYTES_PER_ID: usize = 8;
const COUNT_OFFSET: u64 = 12;

/// Memory-mapped vector table.
#[derive(Debug)]
pub struct VectorStore {
    path: PathBuf,
    mmap: Option<Mmap>,
    dimension: VectorDimension,
    vector_count: usize,
}

impl VectorStore {
    /// Opens an existing table in `dir`.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, VectorError> {
        let path = dir.as_ref().join(VECTOR_FILE_NAME);
        if !path.exists() {
            return Err(VectorError::Storage(io::Error::new(
                io::ErrorKind::NotFound,
                format!("Vector table not found: {}", path.display()),
            )));
        }

        let file = File::open(&path)?;
        let mmap = unsafe { MmapOptions::new().map(&file)? };
        let (dimension, vector_count) = read_header(&mmap)?;

        Ok(Self {
            path,
            mmap: Some(mmap),
            dimension,
            vector_count,
        })
    }

    /// Opens the table in `dir`, creating an empty one if none exists.
    ///
    /// An existing table keeps its own dimension; `dimension` only applies
    /// to a new file.
    pub fn open_or_create(
        dir: impl AsRef<Path>,
        dimension: VectorDimension,
    ) -> Result<Self, VectorError> {
        let dir = dir.as_ref();
        let path = dir.join(VECTOR_FILE_NAME);
        if path.exists() {
            return Self::open(dir);
        }

        std::fs::create_dir_all(dir)?;
        let mut file = File::create(&path)?;
        file.write_all(&header_bytes(dimension, 0))?;
        file.flush()?;

        Ok(Self {
            path,
            mmap: None,
            dimension,
            vector_count: 0,
        })
    }

    /// Appends a batch. The whole batch is validated before anything is
    /// written.
    pub fn append(&mut self, entries: &[(RecordId, &[f32])]) -> Result<(), VectorError> {
        self.validate(entries)?;
        if entries.is_empty() {
            return Ok(());
        }
        let new_count = self.vector_count + entries.len();
        if new_count > u32::MAX as usize {
            return Err(VectorError::CapacityExceeded {
                max: u32::MAX as usize,
            });
        }

        let mut file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        let body_end = (HEADER_SIZE + self.vector_count * self.entry_size()) as u64;
        // Drop any torn tail from an interrupted append
        file.set_len(body_end)?;
        file.seek(SeekFrom::Start(body_end))?;
        file.write_all(&self.encode_entries(entries))?;

        file.seek(SeekFrom::Start(COUNT_OFFSET))?;
        file.write_all(&(new_count as u32).to_le_bytes())?;
        file.flush()?;

        self.vector_count = new_count;
        self.mmap = None;
        Ok(())
    }

    /// Replaces the whole table with `entries`.
    ///
    /// Written to a temporary file in the same directory and renamed over the
    /// old table, so readers see either the old or the new contents.
    pub fn replace_all(&mut self, entries: &[(RecordId, &[f32])]) -> Result<(), VectorError> {
        self.validate(entries)?;
        if entries.len() > u32::MAX as usize {
            return Err(VectorError::CapacityExceeded {
                max: u32::MAX as usize,
            });
        }

        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut temp = NamedTempFile::new_in(dir)?;
        temp.write_all(&header_bytes(self.dimension, entries.len() as u32))?;
        temp.write_all(&self.encode_entries(entries))?;
        temp.flush()?;
        temp.persist(&self.path).map_err(|e| e.error)?;

        self.vector_count = entries.len();
        self.mmap = None;
        Ok(())
    }

    /// Latest vector stored for `id`.
    pub fn read_vector(&mut self, id: RecordId) -> Result<Option<Vec<f32>>, VectorError> {
        let entries = self.decode_entries()?;
        Ok(entries
            .into_iter()
            .rev()
            .find(|(stored, _)| *stored == id)
            .map(|(_, vector)| vector))
    }

    /// One vector per record id: the latest one, in first-insertion order.
    pub fn read_all(&mut self) -> Result<Vec<(RecordId, Vec<f32>)>, VectorError> {
        let entries = self.decode_entries()?;
        let mut slots: HashMap<RecordId, usize> = HashMap::with_capacity(entries.len());
        let mut latest: Vec<(RecordId, Vec<f32>)> = Vec::with_capacity(entries.len());

        for (id, vector) in entries {
            match slots.get(&id) {
                Some(&slot) => latest[slot].1 = vector,
                None => {
                    slots.insert(id, latest.len());
                    latest.push((id, vector));
                }
            }
        }

        Ok(latest)
    }

    /// Number of entries, including superseded ones.
    #[must_use]
    pub fn vector_count(&self) -> usize {
        self.vector_count
    }

    #[must_use]
    pub fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn entry_size(&self) -> usize {
        BYTES_PER_ID + self.dimension.get() * BYTES_PER_F32
    }

    fn validate(&self, entries: &[(RecordId, &[f32])]) -> Result<(), VectorError> {
        for (_, vector) in entries {
            self.dimension.validate_vector(vector)?;
        }
        Ok(())
    }

    fn encode_entries(&self, entries: &[(RecordId, &[f32])]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(entries.len() * self.entry_size());
        for (id, vector) in entries {
            buf.extend_from_slice(&id.to_bytes());
            for value in *vector {
                buf.extend_from_slice(&value.to_le_bytes());
            }
        }
        buf
    }

    fn ensure_mapped(&mut self) -> Result<&Mmap, VectorError> {
        if self.mmap.is_none() {
            let file = File::open(&self.path)?;
            let mmap = unsafe { MmapOptions::new().map(&file)? };
            let (_, count) = read_header(&mmap)?;
            self.vector_count = count;
            self.mmap = Some(mmap);
        }
        self.mmap
            .as_ref()
            .ok_or_else(|| VectorError::InvalidFormat("vector table is not mapped".to_string()))
    }

    fn decode_entries(&mut self) -> Result<Vec<(RecordId, Vec<f32>)>, VectorError> {
        let entry_size = self.entry_size();
        let dimension = self.dimension.get();
        let mmap = self.ensure_mapped()?;
        let count = read_header(mmap)?.1;

        let body_end = HEADER_SIZE + count * entry_size;
        if mmap.len() < body_end {
            return Err(VectorError::InvalidFormat(format!(
                "vector table declares {count} entries but holds {} bytes",
                mmap.len()
            )));
        }

        Ok(mmap[HEADER_SIZE..body_end]
            .chunks_exact(entry_size)
            .map(|entry| {
                let mut id = [0u8; BYTES_PER_ID];
                id.copy_from_slice(&entry[..BYTES_PER_ID]);
                let vector = entry[BYTES_PER_ID..]
                    .chunks_exact(BYTES_PER_F32)
                    .take(dimension)
                    .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                    .collect();
                (RecordId::from_bytes(id), vector)
            })
            .collect())
    }
}

fn header_bytes(dimension: VectorDimension, count: u32) -> [u8; HEADER_SIZE] {
    let mut header = [0u8; HEADER_SIZE];
    header[0..4].copy_from_slice(MAGIC_BYTES);
    header[4..8].copy_from_slice(&STORAGE_VERSION.to_le_bytes());
    header[8..12].copy_from_slice(&(dimension.get() as u32).to_le_bytes());
    header[12..16].copy_from_slice(&count.to_le_bytes());
    header
}

fn read_header(bytes: &[u8]) -> Result<(VectorDimension, usize), VectorError> {
    if bytes.len() < HEADER_SIZE {
        return Err(VectorError::InvalidFormat(
            "File too small to contain header".to_string(),
        ));
    }
    if &bytes[0..4] != MAGIC_BYTES {
        return Err(VectorError::InvalidFormat(
            "Invalid magic bytes".to_string(),
        ));
    }

    let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    if version != STORAGE_VERSION {
        return Err(VectorError::FormatVersion {
            expected: STORAGE_VERSION,
            actual: version,
        });
    }

    let dimension =
        VectorDimension::new(u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize)?;
    let count = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]) as usize;
    Ok((dimension, count))
}
