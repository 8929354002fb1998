use once_cell::sync::Lazy;
use regex::Regex;

/// Simple word tokenizer.
///
/// Lowercases the content and keeps runs of letters and digits, so punctuation,
/// whitespace and symbols only act as separators.
pub fn tokenize(content: &str) -> Vec<String> {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\p{L}\p{N}]+").unwrap());
    RE.find_iter(&content.to_lowercase())
        .map(|token| token.as_str().to_string())
        .collect()
}

/// Stable 32 bits FNV-1a hash, identical across runs and platforms
pub fn fnv1a_32(token: &str) -> u32 {
    const OFFSET_BASIS: u32 = 0x811c_9dc5;
    const PRIME: u32 = 0x0100_0193;

    token.bytes().fold(OFFSET_BASIS, |hash, byte| {
        (hash ^ u32::from(byte)).wrapping_mul(PRIME)
    })
}
