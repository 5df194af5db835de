use std::borrow::Cow;

/// Upper bound on how much of a failed response body is kept in an error.
pub const MAX_ERROR_BODY_BYTES: usize = 4 * 1024;

const REDACTED: &str = "[REDACTED]";

/// Prefixes of well-known credential formats plus header/query/json markers
/// that precede a secret value.
const SECRET_MARKERS: [&str; 20] = [
    "sk-",
    "sess-",
    "ghp_",
    "github_pat_",
    "xoxb-",
    "xoxp-",
    "hf_",
    "AKIA",
    "ASIA",
    "AIza",
    "eyJ",
    "Bearer ",
    "bearer ",
    "api_key=",
    "access_token=",
    "password=",
    "\"api_key\":\"",
    "\"access_token\":\"",
    "\"token\":\"",
    "\"password\":\"",
];

fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':' | '+' | '/' | '=')
}

/// Replace every token that follows a secret marker with `[REDACTED]`.
pub fn scrub_secret_patterns(input: &str) -> Cow<'_, str> {
    if !SECRET_MARKERS.iter().any(|marker| input.contains(marker)) {
        return Cow::Borrowed(input);
    }

    let mut scrubbed = input.to_string();
    for marker in SECRET_MARKERS {
        let mut from = 0;
        while let Some(offset) = scrubbed[from..].find(marker) {
            let start = from + offset;
            let value_start = start + marker.len();
            let value_len: usize = scrubbed[value_start..]
                .chars()
                .take_while(|c| is_token_char(*c))
                .map(char::len_utf8)
                .sum();
            if value_len == 0 {
                from = value_start;
                continue;
            }
            scrubbed.replace_range(start..value_start + value_len, REDACTED);
            from = start + REDACTED.len();
        }
    }
    Cow::Owned(scrubbed)
}

/// Scrub a backend error body and cap it at [`MAX_ERROR_BODY_BYTES`].
pub fn sanitize_error_body(body: &str) -> String {
    let scrubbed = scrub_secret_patterns(body.trim());
    if scrubbed.len() <= MAX_ERROR_BODY_BYTES {
        return scrubbed.into_owned();
    }
    let mut end = MAX_ERROR_BODY_BYTES;
    while !scrubbed.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &scrubbed[..end])
}
