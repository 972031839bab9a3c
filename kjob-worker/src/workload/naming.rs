//! Cluster-safe names derived from session identifiers

/// Prefix of every job the worker creates
pub const JOB_NAME_PREFIX: &str = "hypha-job-";

/// Longest sanitized suffix kept after the prefix
const MAX_SUFFIX_LEN: usize = 50;

/// Maximum length of a label value
const MAX_LABEL_LEN: usize = 63;

/// Derives the job name of a session
///
/// The result is lower-case, at most 60 characters, made of `[a-z0-9-]`, and
/// starts and ends with an alphanumeric. Applying it to its own output returns
/// the same name. Distinct sessions may collide after sanitizing.
pub fn to_job_name(session_id: &str) -> String {
    let lowered = session_id.to_lowercase();
    let mut suffix = collapse_invalid(lowered.strip_prefix(JOB_NAME_PREFIX).unwrap_or(&lowered));

    if suffix.is_empty() {
        suffix = format!("session-{:08x}", fnv1a(session_id.as_bytes()));
    }

    if suffix.len() > MAX_SUFFIX_LEN {
        suffix.truncate(MAX_SUFFIX_LEN);
        let trimmed = suffix.trim_end_matches('-').len();
        suffix.truncate(trimmed);
    }

    format!("{}{}", JOB_NAME_PREFIX, suffix)
}

/// Turns arbitrary text into a valid label value (may be empty)
pub fn to_label_value(value: &str) -> String {
    let mut out: String = value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '-'
            }
        })
        .collect();
    out.truncate(MAX_LABEL_LEN);
    out.trim_matches(|c: char| !c.is_ascii_alphanumeric())
        .to_string()
}

/// Replaces every run of characters outside `[a-z0-9]` with one `-` and
/// strips leading and trailing separators
fn collapse_invalid(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            out.push(c);
        } else if !out.is_empty() && !out.ends_with('-') {
            out.push('-');
        }
    }
    let trimmed = out.trim_end_matches('-').len();
    out.truncate(trimmed);
    out
}

/// 32-bit FNV-1a, used for a stable fallback name
fn fnv1a(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0x811c_9dc5_u32, |hash, b| {
        (hash ^ u32::from(*b)).wrapping_mul(0x0100_0193)
    })
}
