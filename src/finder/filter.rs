//! G-code preprocessing before upload.

/// Strip empty lines and `;` comment lines.
///
/// Every kept line is terminated with `\n`. Expects `\n` line endings; see
/// [`normalize_line_endings`].
pub fn filter_lines(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    append_filtered(&mut out, text);
    out
}

/// Filter several G-code blocks and concatenate them in order.
pub fn filter_blocks<I, S>(blocks: I) -> Vec<u8>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = Vec::new();
    for block in blocks {
        append_filtered(&mut out, block.as_ref());
    }
    out
}

fn append_filtered(out: &mut Vec<u8>, text: &str) {
    for line in text.split('\n') {
        if line.is_empty() || line.starts_with(';') {
            continue;
        }
        out.extend_from_slice(line.as_bytes());
        out.push(b'\n');
    }
}

/// Convert `\r\n` and lone `\r` line endings to `\n`.
pub fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}
