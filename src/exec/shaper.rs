//! Output shaping applied to every captured stream before it reaches the model.
//!
//! Order is fixed: line filter, then byte cap (keeping the tail), then line cap
//! (keeping the tail). The byte cap runs first so the line cap always sees the
//! bytes the model would otherwise receive. The byte cap moves forward to the
//! next character boundary, so it may keep slightly fewer than `max_bytes`.

use regex::bytes::Regex;
use tracing::debug;

/// Shaping parameters taken from a step's command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShapeLimits<'a> {
    pub filter_pattern: &'a str,
    pub max_bytes: usize,
    pub tail_lines: usize,
}

/// Shaped bytes plus whether any content was dropped by a cap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shaped {
    pub bytes: Vec<u8>,
    pub truncated: bool,
}

pub fn shape(raw: &[u8], limits: ShapeLimits<'_>) -> Shaped {
    let filtered = apply_filter(raw, limits.filter_pattern);
    let (bytes, truncated) = truncate_output(filtered, limits.max_bytes, limits.tail_lines);
    Shaped { bytes, truncated }
}

/// Keep only lines matching `pattern`. An invalid pattern leaves the output
/// untouched.
fn apply_filter(output: &[u8], pattern: &str) -> Vec<u8> {
    if pattern.is_empty() {
        return output.to_vec();
    }
    let rx = match Regex::new(pattern) {
        Ok(rx) => rx,
        Err(err) => {
            debug!(pattern, error = %err, "shaper.invalid_filter");
            return output.to_vec();
        }
    };
    let kept: Vec<&[u8]> = output
        .split(|byte| *byte == b'\n')
        .filter(|line| rx.is_match(line))
        .collect();
    kept.join(&b'\n')
}

fn truncate_output(mut output: Vec<u8>, max_bytes: usize, tail_lines: usize) -> (Vec<u8>, bool) {
    if output.is_empty() {
        return (output, false);
    }

    let mut truncated = false;
    if max_bytes > 0 && output.len() > max_bytes {
        let mut cut = output.len() - max_bytes;
        // Never start inside a UTF-8 sequence.
        while cut < output.len() && is_continuation_byte(output[cut]) {
            cut += 1;
        }
        output.drain(..cut);
        truncated = true;
    }

    if tail_lines == 0 {
        return (output, truncated);
    }

    let lines: Vec<&[u8]> = output.split(|byte| *byte == b'\n').collect();
    if lines.len() <= tail_lines {
        return (output, truncated);
    }
    let tail = lines[lines.len() - tail_lines..].join(&b'\n');
    (tail, true)
}

fn is_continuation_byte(byte: u8) -> bool {
    byte & 0b1100_0000 == 0b1000_0000
}
