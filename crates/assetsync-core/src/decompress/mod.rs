//! Post-transfer decompression.
//!
//! GZip assets are inflated in place on a [`TaskPool`] worker once their bytes
//! have been received and verified; the engine drains completions on its tick.

mod gzip;
mod pool;

pub use gzip::gunzip_in_place;
pub use pool::{TaskCategory, TaskPool};
