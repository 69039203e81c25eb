//! Byte-level primitives the entity extractors are built from.

pub mod numeric;
pub mod strings;

pub use numeric::{
    NumericCandidate, NumericEncoding, decode_at, find_backward, find_forward,
    find_forward_confirmed, find_marked, is_plausible, repeated_at, scan_backward, scan_forward,
    try_decode,
};
pub use strings::{ExtractedRun, extract_runs, is_account_number, is_printable, letter_count};
