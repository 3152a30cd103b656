//! Staging buffers and their sizing.
//!
//! - [`planner`] decides how many rows move per batch and how big storage chunks are.
//! - [`record`] is the reusable row block those batches are staged in.

pub mod planner;
pub mod record;

pub use planner::{BufferSpec, plan};
pub use record::RecordBuffer;
