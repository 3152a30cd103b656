//! Chunk filter configuration and pipeline.
//!
//! Every chunk a durable store writes goes through the same pipeline:
//!
//! ```text
//! rows ─▶ shuffle (optional) ─▶ zstd (complevel > 0) ─▶ sha256 trailer (optional)
//! ```
//!
//! Decoding runs the steps in reverse and fails with a storage error when the
//! checksum trailer does not match.
//!
//! # Example
//!
//! ```rust
//! use rtab_core::storage::filters::{CompressionAlgorithm, FilterConfig};
//!
//! // Default: no filters
//! let config = FilterConfig::default();
//! assert_eq!(config.complib(), CompressionAlgorithm::None);
//!
//! // zstd level 5 with shuffle and a checksum trailer
//! let config = FilterConfig::zstd(5).with_checksum(true);
//! assert!(config.shuffle());
//! ```

use crate::error::{RtabError, RtabResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const CHECKSUM_LEN: usize = 32;
const MAX_COMPLEVEL: u8 = 9;

/// Compression library applied to chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CompressionAlgorithm {
    /// Chunks are stored as-is.
    #[default]
    None,
    /// Zstandard, level taken from `complevel`.
    Zstd,
}

impl std::fmt::Display for CompressionAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Zstd => write!(f, "ZSTD"),
        }
    }
}

/// Filter settings for one dataset. Persisted with the dataset metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FilterConfig {
    complevel: u8,
    complib: CompressionAlgorithm,
    shuffle: bool,
    checksum: bool,
}

impl FilterConfig {
    /// Preset: no compression, no shuffle, no checksum.
    pub fn none() -> Self {
        Self::default()
    }

    /// Preset: zstd at `level` (clamped to 0-9) with byte shuffle.
    ///
    /// Level 0 disables compression, matching [`FilterConfig::none`] apart from shuffle.
    pub fn zstd(level: u8) -> Self {
        let complevel = level.min(MAX_COMPLEVEL);
        Self {
            complevel,
            complib: if complevel > 0 {
                CompressionAlgorithm::Zstd
            } else {
                CompressionAlgorithm::None
            },
            shuffle: complevel > 0,
            checksum: false,
        }
    }

    /// Set the compression level. Levels above 9 are clamped.
    pub fn with_complevel(mut self, level: u8) -> Self {
        self.complevel = level.min(MAX_COMPLEVEL);
        if self.complevel == 0 {
            self.complib = CompressionAlgorithm::None;
        } else if self.complib == CompressionAlgorithm::None {
            self.complib = CompressionAlgorithm::Zstd;
        }
        self
    }

    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    pub fn with_checksum(mut self, checksum: bool) -> Self {
        self.checksum = checksum;
        self
    }

    /// Effective compression level: 0 whenever no library is selected.
    pub fn complevel(&self) -> u8 {
        match self.complib {
            CompressionAlgorithm::None => 0,
            CompressionAlgorithm::Zstd => self.complevel,
        }
    }

    pub fn complib(&self) -> CompressionAlgorithm {
        self.complib
    }

    pub fn shuffle(&self) -> bool {
        self.shuffle
    }

    pub fn checksum(&self) -> bool {
        self.checksum
    }

    /// Run a chunk of packed rows through the filter pipeline.
    pub fn encode_chunk(&self, rows: &[u8], row_size: usize) -> RtabResult<Vec<u8>> {
        let mut data = if self.shuffle {
            shuffle(rows, row_size)
        } else {
            rows.to_vec()
        };
        if self.complevel() > 0 {
            data = zstd::encode_all(data.as_slice(), i32::from(self.complevel()))
                .map_err(|e| RtabError::Storage(format!("chunk compression failed: {e}")))?;
        }
        if self.checksum {
            let digest = Sha256::digest(&data);
            data.extend_from_slice(&digest);
        }
        Ok(data)
    }

    /// Reverse [`FilterConfig::encode_chunk`].
    pub fn decode_chunk(&self, stored: &[u8], row_size: usize) -> RtabResult<Vec<u8>> {
        let body = if self.checksum {
            if stored.len() < CHECKSUM_LEN {
                return Err(RtabError::Storage(
                    "chunk is shorter than its checksum trailer".to_string(),
                ));
            }
            let (body, trailer) = stored.split_at(stored.len() - CHECKSUM_LEN);
            if Sha256::digest(body).as_slice() != trailer {
                return Err(RtabError::Storage("chunk checksum mismatch".to_string()));
            }
            body
        } else {
            stored
        };
        let data = if self.complevel() > 0 {
            zstd::decode_all(body)
                .map_err(|e| RtabError::Storage(format!("chunk decompression failed: {e}")))?
        } else {
            body.to_vec()
        };
        if row_size == 0 || data.len() % row_size != 0 {
            return Err(RtabError::Storage(format!(
                "decoded chunk of {} bytes is not a whole number of {row_size}-byte rows",
                data.len()
            )));
        }
        Ok(if self.shuffle {
            unshuffle(&data, row_size)
        } else {
            data
        })
    }
}

impl std::fmt::Display for FilterConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Filters(complevel={}, complib={}, shuffle={}, checksum={})",
            self.complevel(),
            self.complib,
            self.shuffle,
            self.checksum
        )
    }
}

/// Group byte `b` of every row together: `out[b * n + i] = rows[i * row_size + b]`.
fn shuffle(rows: &[u8], row_size: usize) -> Vec<u8> {
    if row_size <= 1 {
        return rows.to_vec();
    }
    let n = rows.len() / row_size;
    let mut out = vec![0u8; rows.len()];
    for (i, row) in rows.chunks_exact(row_size).enumerate() {
        for (b, &byte) in row.iter().enumerate() {
            out[b * n + i] = byte;
        }
    }
    out
}

fn unshuffle(data: &[u8], row_size: usize) -> Vec<u8> {
    if row_size <= 1 {
        return data.to_vec();
    }
    let n = data.len() / row_size;
    let mut out = vec![0u8; data.len()];
    for (i, row) in out.chunks_exact_mut(row_size).enumerate() {
        for (b, byte) in row.iter_mut().enumerate() {
            *byte = data[b * n + i];
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows() -> Vec<u8> {
        (0..12 * 40).map(|i| (i % 7) as u8).collect()
    }

    #[test]
    fn default_is_unfiltered() {
        let config = FilterConfig::default();
        assert_eq!(config.complib(), CompressionAlgorithm::None);
        assert_eq!(config.complevel(), 0);
        assert!(!config.shuffle());
        let data = rows();
        assert_eq!(config.encode_chunk(&data, 12).unwrap(), data);
    }

    #[test]
    fn level_clamping() {
        assert_eq!(FilterConfig::zstd(42).complevel(), 9);
        assert_eq!(FilterConfig::none().with_complevel(200).complevel(), 9);
        assert_eq!(FilterConfig::zstd(0).complib(), CompressionAlgorithm::None);
    }

    #[test]
    fn shuffle_is_reversible() {
        let data = rows();
        assert_eq!(unshuffle(&shuffle(&data, 12), 12), data);
    }

    #[test]
    fn zstd_pipeline_shrinks_repetitive_chunks() {
        let config = FilterConfig::zstd(5).with_checksum(true);
        let data = vec![7u8; 16 * 1024];
        let stored = config.encode_chunk(&data, 16).unwrap();
        assert!(stored.len() < data.len());
        assert_eq!(config.decode_chunk(&stored, 16).unwrap(), data);
    }

    #[test]
    fn corrupted_chunk_fails_checksum() {
        let config = FilterConfig::none().with_checksum(true);
        let mut stored = config.encode_chunk(&rows(), 12).unwrap();
        stored[3] ^= 0xff;
        let err = config.decode_chunk(&stored, 12).unwrap_err();
        assert!(err.is_storage_failure());
    }

    #[test]
    fn display_names() {
        assert_eq!(CompressionAlgorithm::Zstd.to_string(), "ZSTD");
        assert!(FilterConfig::zstd(3).to_string().contains("complevel=3"));
    }

    #[test]
    fn serde_round_trip() {
        let config = FilterConfig::zstd(4).with_checksum(true);
        let json = serde_json::to_string(&config).unwrap();
        let back: FilterConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
