//! Safe Harbor generalizations
//!
//! Each function returns `None` when the value cannot be generalized, in
//! which case the caller redacts it.

use crate::deid::consistency::DateParser;
use crate::deid::models::PhiCategory;
use std::net::Ipv4Addr;

/// Three-digit ZIP prefixes covering 20,000 or fewer people (2000 Census).
/// These are reported as `000`.
pub const RESTRICTED_ZIP3: [&str; 17] = [
    "036", "059", "063", "102", "203", "556", "692", "790", "821", "823", "830", "831", "878",
    "879", "884", "890", "893",
];

/// Generalized form of `value`, or `None` if there is none for the category
pub fn generalize(category: PhiCategory, value: &str, dates: &DateParser) -> Option<String> {
    match category {
        PhiCategory::Zip => generalize_zip(value),
        PhiCategory::AgeOver89 => generalize_age(value),
        PhiCategory::Date => dates.year_of(value).map(|year| year.to_string()),
        PhiCategory::IpAddress => generalize_ipv4(value),
        _ => None,
    }
}

/// `12345` or `12345-6789` → `123XX`; restricted prefixes → `000XX`
pub fn generalize_zip(value: &str) -> Option<String> {
    let value = value.trim();
    let (five, plus_four) = match value.split_once('-') {
        Some((five, four)) => (five, Some(four)),
        None => (value, None),
    };
    let digits_only = |s: &str, n: usize| s.len() == n && s.bytes().all(|b| b.is_ascii_digit());
    if !digits_only(five, 5) || plus_four.is_some_and(|four| !digits_only(four, 4)) {
        return None;
    }

    let prefix = &five[..3];
    if RESTRICTED_ZIP3.contains(&prefix) {
        Some("000XX".to_string())
    } else {
        Some(format!("{prefix}XX"))
    }
}

/// First number in the value; 90 and above become `90+`
pub fn generalize_age(value: &str) -> Option<String> {
    let digits: String = value
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    let age: u32 = digits.parse().ok()?;
    (age >= 90).then(|| "90+".to_string())
}

/// `10.1.2.3` → `10.x.x.x`
pub fn generalize_ipv4(value: &str) -> Option<String> {
    let addr: Ipv4Addr = value.trim().parse().ok()?;
    Some(format!("{}.x.x.x", addr.octets()[0]))
}
