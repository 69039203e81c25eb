//! ZIP archive reading and writing.
//!
//! Legacy backup archives are ordinary ZIP files whose members are the
//! product's fixed-page `.DAT` files. This module covers the container
//! format only; what the members mean is decided elsewhere.
//!
//! - [`structures`]: on-disk records (EOCD, ZIP64 EOCD, file headers)
//! - [`parser`]: locating and parsing the Central Directory
//! - [`extractor`]: reading member data (STORED and DEFLATE, CRC-checked)
//! - [`writer`]: deterministic archive output
//!
//! ## Limitations
//!
//! - No encryption support
//! - No multi-disk archives
//! - The writer never emits ZIP64 records

mod extractor;
mod parser;
mod structures;
mod writer;

pub use extractor::ZipExtractor;
pub use parser::ZipParser;
pub use structures::*;
pub use writer::ZipWriter;
