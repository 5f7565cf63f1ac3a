pub const HASH_HEX_LEN: usize = 64;
pub const ADDRESS_HEX_LEN: usize = 40;

/// A classified search string. Exactly one variant applies to any input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchQuery {
    BlockNumber(u64),
    /// Block hash or transaction hash; the two share one shape.
    Hash32(String),
    Address20(String),
    Invalid,
}

impl SearchQuery {
    pub fn classify(raw: &str) -> Self {
        let trimmed = raw.trim();
        if !trimmed.is_empty() && trimmed.bytes().all(|b| b.is_ascii_digit()) {
            // Heights past u64 cannot exist on chain; saturate so they resolve to not-found.
            let height = trimmed.parse::<u64>().unwrap_or(u64::MAX);
            return Self::BlockNumber(height);
        }
        if is_prefixed_hex(trimmed, HASH_HEX_LEN) {
            return Self::Hash32(trimmed.to_string());
        }
        if is_prefixed_hex(trimmed, ADDRESS_HEX_LEN) {
            return Self::Address20(trimmed.to_string());
        }
        Self::Invalid
    }
}

/// Returns the lower-cased canonical form of a `0x` + 40 hex digit address.
pub fn canonical_address(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    is_prefixed_hex(trimmed, ADDRESS_HEX_LEN).then(|| trimmed.to_ascii_lowercase())
}

fn is_prefixed_hex(value: &str, digits: usize) -> bool {
    match value.strip_prefix("0x") {
        Some(body) => body.len() == digits && body.bytes().all(|b| b.is_ascii_hexdigit()),
        None => false,
    }
}
