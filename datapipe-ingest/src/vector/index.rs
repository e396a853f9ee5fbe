//! Exhaustive L2 index over fixed-width `f32` vectors.
//!
//! Snapshot layout: a bincode-encoded [`SnapshotHeader`] (fixed-width
//! little-endian integers) followed by `count * dimension` little-endian `f32`.
//!
//! ```text
//! b"DPVI" | version: u32 | dimension: u32 | count: u64 | payload
//! ```

use crate::error::{IngestError, Result};
use serde::Serialize;
use std::io::Write;
use std::path::Path;

const MAGIC: [u8; 4] = *b"DPVI";
const VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 4 + 8;

#[derive(Debug, Clone, Copy, PartialEq, bincode::Encode, bincode::Decode)]
struct SnapshotHeader {
    magic: [u8; 4],
    version: u32,
    dimension: u32,
    count: u64,
}

fn header_config() -> impl bincode::config::Config {
    bincode::config::standard()
        .with_little_endian()
        .with_fixed_int_encoding()
}

/// One search result: the insertion position and its Euclidean distance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Neighbor {
    pub position: usize,
    pub distance: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    dimension: usize,
    /// Row-major, `len() * dimension` values
    data: Vec<f32>,
}

impl VectorIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append vectors in order. Either all of them are added or, on a width
    /// mismatch, none are.
    pub fn add(&mut self, vectors: &[Vec<f32>]) -> Result<()> {
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(IngestError::DimensionMismatch {
                expected: self.dimension,
                actual: bad.len(),
            });
        }
        self.data.reserve(vectors.len() * self.dimension);
        for vector in vectors {
            self.data.extend_from_slice(vector);
        }
        Ok(())
    }

    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        let start = position.checked_mul(self.dimension)?;
        self.data.get(start..start + self.dimension)
    }

    /// The `k` nearest stored vectors, closest first. Returns everything
    /// stored when fewer than `k` exist.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if query.len() != self.dimension {
            return Err(IngestError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let mut neighbors: Vec<Neighbor> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(position, stored)| Neighbor {
                position,
                distance: euclidean(query, stored),
            })
            .collect();

        neighbors.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then(a.position.cmp(&b.position))
        });
        neighbors.truncate(k);
        Ok(neighbors)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let header = SnapshotHeader {
            magic: MAGIC,
            version: VERSION,
            dimension: self.dimension as u32,
            count: self.len() as u64,
        };
        let mut bytes = Vec::with_capacity(HEADER_LEN + self.data.len() * 4);
        bytes.extend(
            bincode::encode_to_vec(header, header_config())
                .map_err(|e| IngestError::parse("index snapshot", e))?,
        );
        for value in &self.data {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        Ok(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let (header, read): (SnapshotHeader, usize) =
            bincode::decode_from_slice(bytes, header_config())
                .map_err(|e| IngestError::parse("index snapshot", e))?;
        if header.magic != MAGIC {
            return Err(IngestError::parse("index snapshot", "missing DPVI header"));
        }
        if header.version != VERSION {
            return Err(IngestError::parse(
                "index snapshot",
                format!("unsupported version {}", header.version),
            ));
        }
        let dimension = header.dimension as usize;
        let count = header.count as usize;

        let payload = &bytes[read..];
        let expected = count
            .checked_mul(dimension)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| IngestError::parse("index snapshot", "header overflows"))?;
        if payload.len() != expected {
            return Err(IngestError::parse(
                "index snapshot",
                format!("expected {expected} payload bytes, found {}", payload.len()),
            ));
        }

        let mut data: Vec<f32> = bytemuck::pod_collect_to_vec(payload);
        if cfg!(target_endian = "big") {
            for value in &mut data {
                *value = f32::from_bits(u32::from_le(value.to_bits()));
            }
        }
        Ok(Self { dimension, data })
    }

    /// Write the whole index to `path`, replacing any previous snapshot atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        write_atomic(path, &self.to_bytes()?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }
}

fn euclidean(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

/// Write through a temp file in the target directory, then rename over `path`.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| IngestError::Io(e.error))?;
    Ok(())
}
