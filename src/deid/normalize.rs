//! Pre-detection text cleanup with an offset map back to the input
//!
//! Detectors see a canonical working copy: zero-width characters removed,
//! typographic quotes and dashes folded to ASCII, and runs of horizontal
//! whitespace collapsed to one space. Line breaks are kept. Every byte of the
//! working copy remembers which input character it came from, so any span
//! found in the copy projects to a span of the input on character
//! boundaries.

/// Characters dropped from the working copy
fn is_invisible(c: char) -> bool {
    matches!(
        c,
        '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}' | '\u{FEFF}' | '\u{00AD}'
    )
}

/// Horizontal whitespace collapsed into a single space
fn is_horizontal_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\u{00A0}' | '\u{2007}' | '\u{202F}')
}

fn fold(c: char) -> char {
    match c {
        '\u{2018}' | '\u{2019}' => '\'',
        '\u{201C}' | '\u{201D}' => '"',
        '\u{2013}' | '\u{2014}' | '\u{2212}' => '-',
        other => other,
    }
}

/// The working copy plus its per-byte map into the original input
#[derive(Debug, Clone)]
pub struct NormalizedText {
    /// Cleaned text handed to detectors
    pub text: String,
    starts: Vec<usize>,
    ends: Vec<usize>,
    identity: bool,
}

impl NormalizedText {
    /// Whether the working copy is byte-for-byte the input
    pub fn is_identity(&self) -> bool {
        self.identity
    }

    /// Maps the working-copy span `a..b` to the input span it covers
    ///
    /// Returns `None` for empty or out-of-range spans.
    pub fn project(&self, a: usize, b: usize) -> Option<(usize, usize)> {
        if a >= b || b > self.text.len() {
            return None;
        }
        if self.identity {
            return Some((a, b));
        }
        Some((self.starts[a], self.ends[b - 1]))
    }
}

/// Builds [`NormalizedText`] working copies
#[derive(Debug, Clone, Copy, Default)]
pub struct TextNormalizer;

impl TextNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Produces the working copy of `input`
    pub fn normalize(&self, input: &str) -> NormalizedText {
        let mut text = String::with_capacity(input.len());
        let mut starts = Vec::with_capacity(input.len());
        let mut ends = Vec::with_capacity(input.len());

        let mut chars = input.char_indices().peekable();
        while let Some((offset, c)) = chars.next() {
            if is_invisible(c) {
                continue;
            }

            if is_horizontal_space(c) {
                let mut run_end = offset + c.len_utf8();
                while let Some(&(next_offset, next)) = chars.peek() {
                    if is_horizontal_space(next) {
                        run_end = next_offset + next.len_utf8();
                        chars.next();
                    } else if is_invisible(next) {
                        chars.next();
                    } else {
                        break;
                    }
                }
                text.push(' ');
                starts.push(offset);
                ends.push(run_end);
                continue;
            }

            let folded = fold(c);
            let char_end = offset + c.len_utf8();
            text.push(folded);
            for _ in 0..folded.len_utf8() {
                starts.push(offset);
                ends.push(char_end);
            }
        }

        let identity = text == input;
        NormalizedText {
            text,
            starts,
            ends,
            identity,
        }
    }
}
