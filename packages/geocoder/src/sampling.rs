//! Block sampling.
//!
//! A block address names a 100-number street segment. Rather than
//! geocoding every possible house number, the sampler takes evenly spaced
//! numbers across the segment, which is enough to spread a block's crime
//! weight along the street.

/// Highest offset from the block number that is still inside the block
/// (`800` covers `800..=899`).
pub const BLOCK_SPAN: u32 = 99;

/// Default address-number step between samples.
pub const DEFAULT_SPACING: u32 = 20;

/// Generates candidate addresses for a block.
///
/// Numbers run from `block_num` to `block_num + 99` inclusive in steps of
/// `spacing` (values below 1 are treated as 1). Each address is
/// `"<number> [<direction>] <street_name> [<suffix>]"`, omitting empty
/// parts. Returns nothing for a missing or zero block number.
#[must_use]
pub fn generate_block_samples(
    block_num: Option<u32>,
    street_name: &str,
    direction: &str,
    suffix: &str,
    spacing: u32,
) -> Vec<String> {
    let Some(block_num) = block_num.filter(|n| *n > 0) else {
        return Vec::new();
    };

    let spacing = spacing.max(1);
    let end = block_num.saturating_add(BLOCK_SPAN);

    (block_num..=end)
        .step_by(spacing as usize)
        .map(|number| {
            let number = number.to_string();
            [number.as_str(), direction, street_name, suffix]
                .into_iter()
                .filter(|part| !part.is_empty())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect()
}

/// Joins an address with its city, state and optional ZIP code for a
/// single-line geocoding query.
#[must_use]
pub fn format_address_for_geocoding(
    address: &str,
    city: &str,
    state: &str,
    zip_code: Option<&str>,
) -> String {
    let mut parts = vec![address, city, state];
    if let Some(zip) = zip_code.filter(|z| !z.is_empty()) {
        parts.push(zip);
    }
    parts.join(", ")
}
