//! Hyphenation ranges for ISBN-13 display.
//!
//! Registration groups are resolved for the `978` and `979` prefixes. Registrant
//! ranges are tabulated for the English-language groups 0 and 1; every other
//! group uses a generic split.

/// Registrant ranges keyed by the first seven digits after the group.
/// Each entry is `(start, end, registrant_length)`.
type RangeTable = &'static [(u32, u32, usize)];

const GROUP_0: RangeTable = &[
    (0_000_000, 1_999_999, 2),
    (2_000_000, 6_999_999, 3),
    (7_000_000, 8_499_999, 4),
    (8_500_000, 8_999_999, 5),
    (9_000_000, 9_499_999, 6),
    (9_500_000, 9_999_999, 7),
];

const GROUP_1: RangeTable = &[
    (0_000_000, 0_999_999, 2),
    (1_000_000, 3_999_999, 3),
    (4_000_000, 5_499_999, 4),
    (5_500_000, 8_697_999, 5),
    (8_698_000, 9_989_999, 6),
    (9_990_000, 9_999_999, 7),
];

const GENERIC: RangeTable = &[
    (0_000_000, 1_999_999, 2),
    (2_000_000, 6_999_999, 3),
    (7_000_000, 8_999_999, 4),
    (9_000_000, 9_999_999, 5),
];

/// Length of the registration group following the prefix
fn group_length(prefix: &str, body: &str) -> usize {
    let lead = |n: usize| body[..n].parse::<u32>().unwrap_or(0);

    match prefix {
        "979" => match lead(2) {
            10..=12 => 2,
            _ => 1,
        },
        _ => match lead(1) {
            0..=5 | 7 => 1,
            6 => 3,
            8 => 2,
            _ => match lead(2) {
                90..=94 => 2,
                95..=98 => 3,
                _ => match lead(4) {
                    9900..=9989 => 4,
                    _ => 5,
                },
            },
        },
    }
}

fn registrant_length(table: RangeTable, rest: &str) -> usize {
    let mut key: String = rest.chars().take(7).collect();
    while key.len() < 7 {
        key.push('0');
    }
    let key = key.parse::<u32>().unwrap_or(0);

    let len = table
        .iter()
        .find(|(start, end, _)| (*start..=*end).contains(&key))
        .map(|(_, _, len)| *len)
        .unwrap_or(2);

    // Always leave at least one digit for the publication element
    len.min(rest.len().saturating_sub(1)).max(1)
}

/// Hyphenate a normalized 13-digit ISBN
pub(super) fn hyphenate(isbn13: &str) -> String {
    if isbn13.len() != 13 {
        return isbn13.to_string();
    }

    let (prefix, rest) = isbn13.split_at(3);
    let (body, check) = rest.split_at(9);

    let group_len = group_length(prefix, body);
    let (group, rest) = body.split_at(group_len);

    let table = match (prefix, group) {
        ("978", "0") => GROUP_0,
        ("978", "1") => GROUP_1,
        _ => GENERIC,
    };
    let registrant_len = registrant_length(table, rest);
    let (registrant, publication) = rest.split_at(registrant_len);

    format!("{}-{}-{}-{}-{}", prefix, group, registrant, publication, check)
}
