//! Buffer planner — rows per batch and storage chunk size.
//!
//! The staging buffer grows with the expected table size, from 16 KiB for tables
//! under 1 MiB up to a 1 MiB ceiling. Storage chunks are half a buffer, or a quarter
//! when compression is on so a random read decompresses less.
//!
//! | Expected table size | Buffer  |
//! |---------------------|---------|
//! | ≤ 1 MiB             | 16 KiB  |
//! | ≤ 10 MiB            | 64 KiB  |
//! | ≤ 100 MiB           | 256 KiB |
//! | ≤ 1 GiB             | 512 KiB |
//! | larger              | 1 MiB   |

use serde::{Deserialize, Serialize};

const KIB: u64 = 1024;
const MIB: u64 = 1024 * KIB;

/// Upper bound on staging buffer memory.
pub const MAX_BUFFER_BYTES: usize = MIB as usize;

/// Output of [`plan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferSpec {
    /// Rows moved per batch (capacity of the staging buffer)
    pub rows_per_batch: usize,
    /// Rows per storage chunk
    pub chunk_rows: usize,
}

/// Size the staging buffer and the storage chunks for a table.
pub fn plan(row_size: usize, expected_rows: u64, complevel: u8) -> BufferSpec {
    let row_size = row_size.max(1) as u64;
    let expected_bytes = row_size.saturating_mul(expected_rows);

    let buffer_bytes = match expected_bytes {
        b if b <= MIB => 16 * KIB,
        b if b <= 10 * MIB => 64 * KIB,
        b if b <= 100 * MIB => 256 * KIB,
        b if b <= 1024 * MIB => 512 * KIB,
        _ => MIB,
    };
    let rows_per_batch = (buffer_bytes / row_size).max(1);

    let divisor = if complevel > 0 { 4 } else { 2 };
    let chunk_rows = (buffer_bytes / divisor / row_size).clamp(1, rows_per_batch);

    BufferSpec {
        rows_per_batch: rows_per_batch as usize,
        chunk_rows: chunk_rows as usize,
    }
}
