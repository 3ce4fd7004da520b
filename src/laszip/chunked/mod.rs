//! Reading and writing points that are compressed in independent chunks.
//!
//! The layout of the compressed data is:
//!
//! 1) the offset to the chunk table (i64)
//! 2) the chunks
//! 3) the chunk table
//! 4) the offset to the chunk table again, only when the writer could not seek
//!    back to update the first one
mod reader;
mod writer;

pub use reader::ChunkedReader;
pub use writer::ChunkedWriter;
