//! Block address parsing.
//!
//! Crime data sources locate incidents with loosely formatted addresses:
//! - Block addresses: `"800 BLOCK WASHINGTON ST"`, `"200 BLOCK E COTTAGE ST"`
//! - Glued keywords: `"5900BLOCK FISHER RD"`
//! - Intersections: `"WASHINGTON ST & WILLIAMS ST"`
//! - Bare streets: `"HUNTINGTON AVE"`
//!
//! Parsing is a small rule table rather than a grammar: the address is
//! first classified into an [`AddressForm`] by ordered predicates, then the
//! form's parser picks the block number, direction and suffix out of the
//! token list using the [`Direction`] and [`Suffix`] token sets. Malformed
//! input never fails; it produces a descriptor with empty or `None` fields.

use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use strum_macros::{AsRefStr, Display, EnumString};

/// Keyword marking a block-style address.
pub const BLOCK_KEYWORD: &str = "BLOCK";

/// Separators that mark an intersection of two streets, checked in order.
pub const INTERSECTION_MARKERS: &[&str] = &["&", " / ", " AND ", " @ "];

/// House number glued to the block keyword: "5900BLOCK" -> "5900 BLOCK".
static GLUED_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)(BLOCK|BLK)\b").expect("valid regex"));

/// Abbreviated keyword variants normalized to `BLOCK`.
static BLOCK_ALIAS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bBLK\b").expect("valid regex"));

/// "BLOCK OF" noise: "800 BLOCK OF WASHINGTON ST".
static BLOCK_OF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bBLOCK\s+OF\b").expect("valid regex"));

/// Street direction prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Direction {
    /// North
    N,
    /// South
    S,
    /// East
    E,
    /// West
    W,
    /// Northeast
    NE,
    /// Northwest
    NW,
    /// Southeast
    SE,
    /// Southwest
    SW,
}

/// Street type suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Suffix {
    /// Street
    St,
    /// Avenue
    Ave,
    /// Road
    Rd,
    /// Boulevard
    Blvd,
    /// Drive
    Dr,
    /// Lane
    Ln,
    /// Way
    Way,
    /// Place
    Pl,
    /// Circle
    Cir,
    /// Court
    Ct,
}

/// Structured form of one raw address string.
///
/// `block_num == None` means the address cannot be sampled as a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockDescriptor {
    /// Leading block number (`800` in `"800 BLOCK WASHINGTON ST"`).
    pub block_num: Option<u32>,
    /// Street name without direction or suffix.
    pub street_name: String,
    /// Direction prefix, if present.
    pub direction: Option<Direction>,
    /// Street type suffix, if present.
    pub suffix: Option<Suffix>,
    /// Whether the address names an intersection.
    pub is_intersection: bool,
}

impl BlockDescriptor {
    /// Direction as written in addresses, or `""`.
    #[must_use]
    pub fn direction_str(&self) -> &str {
        self.direction.as_ref().map_or("", |d| d.as_ref())
    }

    /// Suffix as written in addresses, or `""`.
    #[must_use]
    pub fn suffix_str(&self) -> &str {
        self.suffix.as_ref().map_or("", |d| d.as_ref())
    }

    /// Whether the block sampler can expand this descriptor.
    #[must_use]
    pub fn is_samplable(&self) -> bool {
        matches!(self.block_num, Some(n) if n > 0)
    }

    /// Generates the block's candidate addresses at `spacing`.
    #[must_use]
    pub fn samples(&self, spacing: u32) -> Vec<String> {
        crate::sampling::generate_block_samples(
            self.block_num,
            &self.street_name,
            self.direction_str(),
            self.suffix_str(),
            spacing,
        )
    }

    fn street_only(street_name: String, suffix: Option<Suffix>, is_intersection: bool) -> Self {
        Self {
            block_num: None,
            street_name,
            direction: None,
            suffix,
            is_intersection,
        }
    }
}

/// Shape of a raw address, decided before field extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressForm {
    /// Two streets joined by an intersection marker.
    Intersection,
    /// A block address containing the `BLOCK` keyword.
    Block,
    /// Anything else, read as a street reference.
    Street,
}

/// Ordered classification rules; the first matching predicate wins.
const FORM_RULES: &[(AddressForm, fn(&str) -> bool)] = &[
    (AddressForm::Intersection, has_intersection_marker),
    (AddressForm::Block, has_block_keyword),
    (AddressForm::Street, |_| true),
];

fn has_intersection_marker(addr: &str) -> bool {
    INTERSECTION_MARKERS.iter().any(|m| addr.contains(m))
}

fn has_block_keyword(addr: &str) -> bool {
    addr.split_whitespace().any(|token| token == BLOCK_KEYWORD)
}

/// Uppercases, trims and rewrites keyword variants (`BLK`, `BLOCK OF`,
/// glued `800BLOCK`) into the canonical `BLOCK` token.
#[must_use]
pub fn normalize_address(raw: &str) -> String {
    let addr = raw.trim().to_uppercase();
    let addr = GLUED_BLOCK_RE.replace(&addr, "$1 $2");
    let addr = BLOCK_ALIAS_RE.replace_all(&addr, BLOCK_KEYWORD);
    let addr = BLOCK_OF_RE.replace_all(&addr, BLOCK_KEYWORD);
    addr.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Classifies a normalized address with [`FORM_RULES`].
#[must_use]
pub fn classify(addr: &str) -> AddressForm {
    FORM_RULES
        .iter()
        .find(|(_, matches)| matches(addr))
        .map_or(AddressForm::Street, |(form, _)| *form)
}

/// Parses a raw address string into a [`BlockDescriptor`].
///
/// ```
/// use crime_route_geocoder::address::{parse_block_address, Suffix};
///
/// let parsed = parse_block_address("800 BLOCK WASHINGTON ST");
/// assert_eq!(parsed.block_num, Some(800));
/// assert_eq!(parsed.street_name, "WASHINGTON");
/// assert_eq!(parsed.suffix, Some(Suffix::St));
/// ```
#[must_use]
pub fn parse_block_address(raw: &str) -> BlockDescriptor {
    let addr = normalize_address(raw);

    match classify(&addr) {
        AddressForm::Intersection => parse_intersection(&addr),
        AddressForm::Block => parse_block(&addr),
        AddressForm::Street => parse_street(&addr, false),
    }
}

fn parse_intersection(addr: &str) -> BlockDescriptor {
    let first = INTERSECTION_MARKERS
        .iter()
        .filter_map(|m| addr.find(m))
        .min()
        .map_or(addr, |idx| &addr[..idx]);

    parse_street(first.trim(), true)
}

/// Street reference: a trailing suffix is split off when there is more
/// than one token, otherwise the whole string is the street name.
fn parse_street(addr: &str, is_intersection: bool) -> BlockDescriptor {
    let tokens: Vec<&str> = addr.split_whitespace().collect();

    if let [name @ .., last] = tokens.as_slice()
        && !name.is_empty()
        && let Ok(suffix) = Suffix::from_str(last)
    {
        return BlockDescriptor::street_only(name.join(" "), Some(suffix), is_intersection);
    }

    BlockDescriptor::street_only(tokens.join(" "), None, is_intersection)
}

/// Block address: `<number> [direction] <street name...> [suffix]`.
fn parse_block(addr: &str) -> BlockDescriptor {
    let tokens: Vec<&str> = addr
        .split_whitespace()
        .filter(|token| *token != BLOCK_KEYWORD)
        .collect();

    let Some((first, rest)) = tokens.split_first() else {
        return BlockDescriptor::street_only(String::new(), None, false);
    };

    let block_num = first.parse::<u32>().ok();
    if block_num.is_none() {
        log::debug!("Unparseable block number {first:?} in {addr:?}");
    }

    let (direction, rest) = match rest.split_first() {
        Some((token, tail)) => Direction::from_str(token)
            .map_or((None, rest), |direction| (Some(direction), tail)),
        None => (None, rest),
    };

    let (suffix, name) = match rest.split_last() {
        Some((token, head)) => {
            Suffix::from_str(token).map_or((None, rest), |suffix| (Some(suffix), head))
        }
        None => (None, rest),
    };

    BlockDescriptor {
        block_num,
        street_name: name.join(" "),
        direction,
        suffix,
        is_intersection: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_block_address() {
        assert_eq!(
            parse_block_address("800 BLOCK WASHINGTON ST"),
            BlockDescriptor {
                block_num: Some(800),
                street_name: "WASHINGTON".to_string(),
                direction: None,
                suffix: Some(Suffix::St),
                is_intersection: false,
            }
        );
    }

    #[test]
    fn parses_direction() {
        let parsed = parse_block_address("200 block e cottage st");
        assert_eq!(parsed.block_num, Some(200));
        assert_eq!(parsed.direction, Some(Direction::E));
        assert_eq!(parsed.street_name, "COTTAGE");
        assert_eq!(parsed.direction_str(), "E");
        assert_eq!(parsed.suffix_str(), "ST");
    }

    #[test]
    fn keeps_multi_word_street_names() {
        let parsed = parse_block_address("100 BLOCK MASSACHUSETTS TURNPIKE");
        assert_eq!(parsed.street_name, "MASSACHUSETTS TURNPIKE");
        assert_eq!(parsed.suffix, None);

        let parsed = parse_block_address("1500 BLOCK MARTIN LUTHER KING BLVD");
        assert_eq!(parsed.street_name, "MARTIN LUTHER KING");
        assert_eq!(parsed.suffix, Some(Suffix::Blvd));
    }

    #[test]
    fn zero_block_is_not_samplable() {
        let parsed = parse_block_address("0 BLOCK CLINTON ST");
        assert_eq!(parsed.block_num, Some(0));
        assert!(!parsed.is_samplable());
    }

    #[test]
    fn non_numeric_block_number_is_none() {
        let parsed = parse_block_address("8A0 BLOCK WASHINGTON ST");
        assert_eq!(parsed.block_num, None);
        assert_eq!(parsed.street_name, "WASHINGTON");
        assert!(!parsed.is_samplable());
    }

    #[test]
    fn bare_block_keyword_yields_empty_street() {
        let parsed = parse_block_address("BLOCK");
        assert_eq!(parsed.block_num, None);
        assert_eq!(parsed.street_name, "");

        let parsed = parse_block_address("800 BLOCK");
        assert_eq!(parsed.block_num, Some(800));
        assert_eq!(parsed.street_name, "");
        assert_eq!(parsed.suffix, None);
    }

    #[test]
    fn detects_intersection() {
        let parsed = parse_block_address("WASHINGTON ST & WILLIAMS ST");
        assert!(parsed.is_intersection);
        assert_eq!(parsed.block_num, None);
        assert_eq!(parsed.street_name, "WASHINGTON");
        assert_eq!(parsed.suffix, Some(Suffix::St));
    }

    #[test]
    fn intersection_without_suffix() {
        let parsed = parse_block_address("BROADWAY AND 5TH AVE");
        assert!(parsed.is_intersection);
        assert_eq!(parsed.street_name, "BROADWAY");
        assert_eq!(parsed.suffix, None);
    }

    #[test]
    fn street_reference_without_block() {
        let parsed = parse_block_address("  huntington ave ");
        assert!(!parsed.is_intersection);
        assert_eq!(parsed.block_num, None);
        assert_eq!(parsed.street_name, "HUNTINGTON");
        assert_eq!(parsed.suffix, Some(Suffix::Ave));

        let parsed = parse_block_address("BROADWAY");
        assert_eq!(parsed.street_name, "BROADWAY");
        assert_eq!(parsed.suffix, None);
    }

    #[test]
    fn block_substring_is_not_a_keyword() {
        assert_eq!(classify("BLOCKER ST"), AddressForm::Street);
    }

    #[test]
    fn normalizes_keyword_variants() {
        assert_eq!(normalize_address("5900BLOCK FISHER RD"), "5900 BLOCK FISHER RD");
        assert_eq!(normalize_address("100 blk main st"), "100 BLOCK MAIN ST");
        assert_eq!(
            normalize_address("4800  BLOCK OF SILVER HILL RD"),
            "4800 BLOCK SILVER HILL RD"
        );
        assert_eq!(parse_block_address("100BLK MAIN ST").block_num, Some(100));
    }

    #[test]
    fn classification_order() {
        assert_eq!(classify("800 BLOCK A ST & B ST"), AddressForm::Intersection);
        assert_eq!(classify("800 BLOCK A ST"), AddressForm::Block);
        assert_eq!(classify("A ST"), AddressForm::Street);
    }

    #[test]
    fn empty_input_is_best_effort() {
        let parsed = parse_block_address("   ");
        assert_eq!(parsed.block_num, None);
        assert_eq!(parsed.street_name, "");
        assert!(!parsed.is_intersection);
    }
}
