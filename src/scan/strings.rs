//! Printable-run extraction.

/// A maximal run of printable ASCII and the offset of its first byte
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedRun {
    pub text: String,
    pub offset: usize,
}

impl ExtractedRun {
    /// Offset one past the last byte of the run
    pub fn end(&self) -> usize {
        self.offset + self.text.len()
    }

    pub fn trimmed(&self) -> &str {
        self.text.trim()
    }
}

#[inline]
pub fn is_printable(byte: u8) -> bool {
    (0x20..=0x7E).contains(&byte)
}

/// Collect every run of printable bytes whose length is in `[min_len, max_len]`.
///
/// Single linear pass; runs outside the window are dropped, not split.
pub fn extract_runs(buf: &[u8], min_len: usize, max_len: usize) -> Vec<ExtractedRun> {
    let mut runs = Vec::new();
    let mut run_len = 0usize;

    let emit = |end: usize, len: usize, runs: &mut Vec<ExtractedRun>| {
        if len >= min_len && len <= max_len {
            let start = end - len;
            runs.push(ExtractedRun {
                // Printable ASCII is valid UTF-8
                text: String::from_utf8_lossy(&buf[start..end]).into_owned(),
                offset: start,
            });
        }
    };

    for (i, &byte) in buf.iter().enumerate() {
        if is_printable(byte) {
            run_len += 1;
        } else {
            if run_len > 0 {
                emit(i, run_len, &mut runs);
            }
            run_len = 0;
        }
    }
    if run_len > 0 {
        emit(buf.len(), run_len, &mut runs);
    }

    runs
}

/// `^\d{4,6}(\.\d+)?$`, the shape of a chart account number
pub fn is_account_number(text: &str) -> bool {
    let (whole, fraction) = match text.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (text, None),
    };

    let whole_ok = (4..=6).contains(&whole.len()) && whole.bytes().all(|b| b.is_ascii_digit());
    let fraction_ok = fraction
        .is_none_or(|f| !f.is_empty() && f.bytes().all(|b| b.is_ascii_digit()));

    whole_ok && fraction_ok
}

/// Count of ASCII letters in `text`
pub fn letter_count(text: &str) -> usize {
    text.bytes().filter(u8::is_ascii_alphabetic).count()
}
