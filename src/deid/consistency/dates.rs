//! Date recognition and layout-preserving date shifting
//!
//! A recognized date is rewritten field by field: only the year, month, day
//! and ordinal suffix are replaced, so separators, padding, month spelling,
//! case and any trailing time of day come through unchanged.

use crate::domain::errors::DeidError;
use crate::domain::result::Result;
use chrono::{Datelike, Duration, NaiveDate};
use regex::{Captures, Regex};
use std::ops::{Range, RangeInclusive};

const NUMERIC: &str =
    r"(?P<f1>\d{1,4})(?P<s1>[/.\-])(?P<f2>\d{1,2})(?P<s2>[/.\-])(?P<f3>\d{1,4})";
const NUMERIC_SPLIT_YEAR: &str =
    r"(?P<f1>\d{1,2})(?P<s1>[/.\-])(?P<f2>\d{1,2}),?\s+(?P<f3>\d{4})";
const COMPACT: &str = r"(?P<year>\d{4})(?P<month>\d{2})(?P<day>\d{2})";
const SPELLED_MONTH_FIRST: &str = r"(?P<month>[A-Za-z]{3,9})\.?\s+(?P<day>\d{1,2})(?P<ord>st|nd|rd|th|ST|ND|RD|TH)?,?\s+(?P<year>\d{4})";
const SPELLED_DAY_FIRST: &str = r"(?P<day>\d{1,2})(?P<ord>st|nd|rd|th|ST|ND|RD|TH)?\s+(?:of\s+)?(?P<month>[A-Za-z]{3,9})\.?,?\s+(?P<year>\d{4})";
const TIME_OF_DAY: &str = r"(?:(?:T|\s+)\d{1,2}:\d{2}(?::\d{2}(?:\.\d+)?)?(?:\s*[AaPp]\.?[Mm]\.?)?(?:Z|[+-]\d{2}:?\d{2})?)?";

const YEAR_ONLY: &str = r"^[12]\d{3}$";
const PARTIAL_NUMERIC: &str = r"^(?:\d{1,2}[/.\-](?:\d{1,2}|\d{4})|\d{4}[/.\-]\d{1,2})$";
const PARTIAL_MONTH_FIRST: &str = r"^(?P<month>[A-Za-z]{3,9})\.?(?:\s+\d{1,2}(?:st|nd|rd|th)?)?(?:,?\s+\d{4})?$";
const PARTIAL_DAY_FIRST: &str = r"^\d{1,2}(?:st|nd|rd|th)?\s+(?:of\s+)?(?P<month>[A-Za-z]{3,9})\.?$";
const ANY_YEAR: &str = r"\b(?P<year>[12]\d{3})\b";

const MONTHS: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// Result of shifting a date-like value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateShiftOutcome {
    /// The value with every date field moved by the offset
    Shifted(String),
    /// Only a year was present; it is redacted rather than shifted
    YearOnly,
    /// Month and day, or month and year, without the third field
    Partial,
    /// Not recognizable as a date, or the shift left the calendar range
    Unparseable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FormatKind {
    Numeric,
    Compact,
    SpelledMonthFirst,
    SpelledDayFirst,
}

struct DateFormat {
    kind: FormatKind,
    full: Regex,
    embedded: Regex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextCase {
    Upper,
    Lower,
    Title,
}

#[derive(Debug, Clone, Copy)]
enum Field {
    Year { digits: usize },
    MonthNumber { padded: bool },
    MonthName { abbreviated: bool, case: TextCase },
    Day { padded: bool },
    Ordinal { upper: bool },
}

/// A date found in a value, with the byte ranges of its fields
#[derive(Debug, Clone)]
struct DateMatch {
    date: NaiveDate,
    fields: Vec<(Range<usize>, Field)>,
}

impl DateMatch {
    fn render_into(&self, value: &str, date: NaiveDate) -> String {
        let mut fields = self.fields.clone();
        fields.sort_by_key(|(range, _)| range.start);

        let mut out = String::with_capacity(value.len() + 8);
        let mut cursor = 0;
        for (range, field) in fields {
            out.push_str(&value[cursor..range.start]);
            out.push_str(&render_field(field, date));
            cursor = range.end;
        }
        out.push_str(&value[cursor..]);
        out
    }
}

/// Recognizes dates in the layouts found in clinical notes
pub struct DateParser {
    formats: Vec<DateFormat>,
    year_only: Regex,
    partial_numeric: Regex,
    partial_month_first: Regex,
    partial_day_first: Regex,
    any_year: Regex,
}

impl DateParser {
    pub fn new() -> Result<Self> {
        let formats = [
            (FormatKind::Numeric, NUMERIC),
            (FormatKind::Numeric, NUMERIC_SPLIT_YEAR),
            (FormatKind::Compact, COMPACT),
            (FormatKind::SpelledMonthFirst, SPELLED_MONTH_FIRST),
            (FormatKind::SpelledDayFirst, SPELLED_DAY_FIRST),
        ]
        .into_iter()
        .map(|(kind, core)| {
            Ok(DateFormat {
                kind,
                full: compile(&format!("^(?:{core}){TIME_OF_DAY}$"))?,
                embedded: compile(&format!(r"\b(?:{core})\b"))?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            formats,
            year_only: compile(YEAR_ONLY)?,
            partial_numeric: compile(PARTIAL_NUMERIC)?,
            partial_month_first: compile(PARTIAL_MONTH_FIRST)?,
            partial_day_first: compile(PARTIAL_DAY_FIRST)?,
            any_year: compile(ANY_YEAR)?,
        })
    }

    /// Parses a value that is entirely one date (optionally with a time)
    pub fn parse(&self, value: &str) -> Option<NaiveDate> {
        self.match_full(value.trim()).map(|m| m.date)
    }

    /// Moves every field of the date in `value` by `days`
    ///
    /// A value that is not a date as a whole is searched for an embedded
    /// date, which is shifted in place.
    pub fn shift(&self, value: &str, days: i64) -> DateShiftOutcome {
        let found = self.match_full(value).or_else(|| self.match_embedded(value));

        match found {
            Some(found) => match Duration::try_days(days)
                .and_then(|delta| found.date.checked_add_signed(delta))
            {
                Some(shifted) => DateShiftOutcome::Shifted(found.render_into(value, shifted)),
                None => DateShiftOutcome::Unparseable,
            },
            None => self.classify_incomplete(value.trim()),
        }
    }

    /// Year of the date in `value`, falling back to any plausible year
    pub fn year_of(&self, value: &str) -> Option<i32> {
        if let Some(found) = self
            .match_full(value.trim())
            .or_else(|| self.match_embedded(value))
        {
            return Some(found.date.year());
        }
        self.any_year
            .captures(value)
            .and_then(|caps| caps.name("year"))
            .and_then(|m| m.as_str().parse().ok())
    }

    fn match_full(&self, value: &str) -> Option<DateMatch> {
        self.formats.iter().find_map(|format| {
            format
                .full
                .captures(value)
                .and_then(|caps| interpret(format.kind, &caps))
        })
    }

    fn match_embedded(&self, value: &str) -> Option<DateMatch> {
        let mut best: Option<(usize, DateMatch)> = None;
        for format in &self.formats {
            let first = format.embedded.captures_iter(value).find_map(|caps| {
                let start = caps.get(0).map_or(0, |m| m.start());
                interpret(format.kind, &caps).map(|found| (start, found))
            });
            if let Some((start, found)) = first {
                if best.as_ref().map_or(true, |(s, _)| start < *s) {
                    best = Some((start, found));
                }
            }
        }
        best.map(|(_, found)| found)
    }

    fn classify_incomplete(&self, value: &str) -> DateShiftOutcome {
        if self.year_only.is_match(value) {
            return DateShiftOutcome::YearOnly;
        }
        if self.partial_numeric.is_match(value) {
            return DateShiftOutcome::Partial;
        }
        for regex in [&self.partial_month_first, &self.partial_day_first] {
            let is_month = regex
                .captures(value)
                .and_then(|caps| caps.name("month"))
                .is_some_and(|m| parse_month(m.as_str()).is_some());
            if is_month {
                return DateShiftOutcome::Partial;
            }
        }
        DateShiftOutcome::Unparseable
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| DeidError::Other(format!("Invalid date pattern: {e}")))
}

fn interpret(kind: FormatKind, caps: &Captures<'_>) -> Option<DateMatch> {
    match kind {
        FormatKind::Numeric => interpret_numeric(caps),
        FormatKind::Compact => {
            let year = caps.name("year")?;
            let month = caps.name("month")?;
            let day = caps.name("day")?;
            let y: i32 = year.as_str().parse().ok()?;
            if !(1800..=2199).contains(&y) {
                return None;
            }
            let date =
                NaiveDate::from_ymd_opt(y, month.as_str().parse().ok()?, day.as_str().parse().ok()?)?;
            Some(DateMatch {
                date,
                fields: vec![
                    (year.range(), Field::Year { digits: 4 }),
                    (month.range(), Field::MonthNumber { padded: true }),
                    (day.range(), Field::Day { padded: true }),
                ],
            })
        }
        FormatKind::SpelledMonthFirst | FormatKind::SpelledDayFirst => interpret_spelled(caps),
    }
}

fn interpret_numeric(caps: &Captures<'_>) -> Option<DateMatch> {
    let f1 = caps.name("f1")?;
    let f2 = caps.name("f2")?;
    let f3 = caps.name("f3")?;
    // A year split off by whitespace has no second separator
    if let Some(s2) = caps.name("s2") {
        if caps.name("s1")?.as_str() != s2.as_str() {
            return None;
        }
    }

    let (year, month, day) = if f1.len() == 4 {
        if f3.len() > 2 {
            return None;
        }
        (f1, f2, f3)
    } else {
        if f1.len() > 2 || !(f3.len() == 2 || f3.len() == 4) {
            return None;
        }
        let first: u32 = f1.as_str().parse().ok()?;
        if first > 12 {
            (f3, f2, f1)
        } else {
            (f3, f1, f2)
        }
    };

    let y = expand_year(year.as_str())?;
    let date = NaiveDate::from_ymd_opt(y, month.as_str().parse().ok()?, day.as_str().parse().ok()?)?;

    Some(DateMatch {
        date,
        fields: vec![
            (year.range(), Field::Year { digits: year.len() }),
            (
                month.range(),
                Field::MonthNumber {
                    padded: month.len() == 2,
                },
            ),
            (
                day.range(),
                Field::Day {
                    padded: day.len() == 2,
                },
            ),
        ],
    })
}

fn interpret_spelled(caps: &Captures<'_>) -> Option<DateMatch> {
    let month = caps.name("month")?;
    let day = caps.name("day")?;
    let year = caps.name("year")?;

    let (month_number, abbreviated) = parse_month(month.as_str())?;
    let date = NaiveDate::from_ymd_opt(
        year.as_str().parse().ok()?,
        month_number,
        day.as_str().parse().ok()?,
    )?;

    let mut fields = vec![
        (
            month.range(),
            Field::MonthName {
                abbreviated,
                case: text_case(month.as_str()),
            },
        ),
        (
            day.range(),
            Field::Day {
                padded: day.len() == 2,
            },
        ),
        (year.range(), Field::Year { digits: 4 }),
    ];
    if let Some(ord) = caps.name("ord") {
        fields.push((
            ord.range(),
            Field::Ordinal {
                upper: ord.as_str().chars().all(|c| c.is_ascii_uppercase()),
            },
        ));
    }

    Some(DateMatch { date, fields })
}

/// Years a two-digit year reads back as
const TWO_DIGIT_WINDOW: RangeInclusive<i32> = 1969..=2068;

/// Two-digit years pivot at 69: 00-68 are 20xx, 69-99 are 19xx
fn expand_year(digits: &str) -> Option<i32> {
    let value: i32 = digits.parse().ok()?;
    match digits.len() {
        2 if value < 69 => Some(2000 + value),
        2 => Some(1900 + value),
        4 => Some(value),
        _ => None,
    }
}

/// Month number and whether the word is an abbreviation
fn parse_month(word: &str) -> Option<(u32, bool)> {
    let lower = word.to_ascii_lowercase();
    MONTHS.iter().enumerate().find_map(|(idx, name)| {
        let full = name.to_ascii_lowercase();
        if lower == full {
            Some((idx as u32 + 1, false))
        } else if lower == full[..3] || (idx == 8 && lower == "sept") {
            Some((idx as u32 + 1, true))
        } else {
            None
        }
    })
}

fn text_case(word: &str) -> TextCase {
    if word.len() > 1 && word.chars().all(|c| c.is_ascii_uppercase()) {
        TextCase::Upper
    } else if word.chars().all(|c| c.is_ascii_lowercase()) {
        TextCase::Lower
    } else {
        TextCase::Title
    }
}

fn ordinal_suffix(day: u32) -> &'static str {
    match (day % 10, day % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    }
}

fn render_field(field: Field, date: NaiveDate) -> String {
    match field {
        // Outside the window two digits would read back as another century
        Field::Year { digits: 2 } if TWO_DIGIT_WINDOW.contains(&date.year()) => {
            format!("{:02}", date.year().rem_euclid(100))
        }
        Field::Year { .. } => format!("{:04}", date.year()),
        Field::MonthNumber { padded: true } => format!("{:02}", date.month()),
        Field::MonthNumber { padded: false } => date.month().to_string(),
        Field::Day { padded: true } => format!("{:02}", date.day()),
        Field::Day { padded: false } => date.day().to_string(),
        Field::Ordinal { upper } => {
            let suffix = ordinal_suffix(date.day());
            if upper {
                suffix.to_ascii_uppercase()
            } else {
                suffix.to_string()
            }
        }
        Field::MonthName { abbreviated, case } => {
            let full = MONTHS[date.month0() as usize];
            let name = if abbreviated { &full[..3] } else { full };
            match case {
                TextCase::Upper => name.to_ascii_uppercase(),
                TextCase::Lower => name.to_ascii_lowercase(),
                TextCase::Title => name.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shifted(value: &str, days: i64) -> String {
        match DateParser::new().unwrap().shift(value, days) {
            DateShiftOutcome::Shifted(s) => s,
            other => panic!("expected shift of {value:?}, got {other:?}"),
        }
    }

    #[test]
    fn test_numeric_mdy_keeps_padding() {
        assert_eq!(shifted("01/15/2023", 30), "02/14/2023");
        assert_eq!(shifted("1/5/2023", 1), "1/6/2023");
        assert_eq!(shifted("12-31-2023", 1), "01-01-2024");
    }

    #[test]
    fn test_dmy_inferred_from_first_field() {
        assert_eq!(shifted("25.12.2020", 7), "01.01.2021");
    }

    #[test]
    fn test_iso_with_time() {
        assert_eq!(shifted("2023-01-15", 30), "2023-02-14");
        assert_eq!(shifted("2023-01-15T08:30:00Z", -15), "2022-12-31T08:30:00Z");
        assert_eq!(shifted("2023-01-15 14:05", 1), "2023-01-16 14:05");
    }

    #[test]
    fn test_two_digit_year_pivot() {
        assert_eq!(shifted("03/04/75", 1), "03/05/75");
        assert_eq!(shifted("06/30/68", 1), "07/01/68");
    }

    #[test]
    fn test_two_digit_year_widens_when_shift_crosses_pivot() {
        let parser = DateParser::new().unwrap();
        let forward = shifted("12/31/68", 1);
        assert_eq!(forward, "01/01/2069");
        assert_eq!(parser.parse(&forward), NaiveDate::from_ymd_opt(2069, 1, 1));

        let backward = shifted("01/01/69", -1);
        assert_eq!(backward, "12/31/1968");
        assert_eq!(parser.parse(&backward), NaiveDate::from_ymd_opt(1968, 12, 31));
    }

    #[test]
    fn test_year_split_off_by_whitespace() {
        assert_eq!(shifted("03/22 1975", 30), "04/21 1975");
        assert_eq!(shifted("25.12, 2020", 7), "01.01, 2021");
        let parser = DateParser::new().unwrap();
        assert_eq!(parser.shift("03/22/ 1975", 1), DateShiftOutcome::Unparseable);
    }

    #[test]
    fn test_compact() {
        assert_eq!(shifted("20230115", 30), "20230214");
    }

    #[test]
    fn test_spelled_months() {
        assert_eq!(shifted("January 15, 2023", 30), "February 14, 2023");
        assert_eq!(shifted("Jan. 15 2023", 30), "Feb. 14 2023");
        assert_eq!(shifted("MAR 1st, 2020", 1), "MAR 2nd, 2020");
        assert_eq!(shifted("3rd of March 2021", 20), "23rd of March 2021");
        assert_eq!(shifted("15 Sept 2022", 30), "15 Oct 2022");
    }

    #[test]
    fn test_embedded_date_is_shifted_in_place() {
        assert_eq!(
            shifted("admitted on 01/15/2023 at noon", 30),
            "admitted on 02/14/2023 at noon"
        );
    }

    #[test]
    fn test_partial_and_year_only() {
        let parser = DateParser::new().unwrap();
        assert_eq!(parser.shift("1975", 30), DateShiftOutcome::YearOnly);
        assert_eq!(parser.shift("03/2020", 30), DateShiftOutcome::Partial);
        assert_eq!(parser.shift("01/15", 30), DateShiftOutcome::Partial);
        assert_eq!(parser.shift("March 2020", 30), DateShiftOutcome::Partial);
        assert_eq!(parser.shift("5th of May", 30), DateShiftOutcome::Partial);
        assert_eq!(parser.shift("last Tuesday", 30), DateShiftOutcome::Unparseable);
    }

    #[test]
    fn test_invalid_calendar_dates_are_unparseable() {
        let parser = DateParser::new().unwrap();
        assert_eq!(parser.shift("02/30/2023", 1), DateShiftOutcome::Unparseable);
        assert_eq!(parser.shift("Smarch 3, 2020", 1), DateShiftOutcome::Unparseable);
    }

    #[test]
    fn test_overflow_is_unparseable() {
        let parser = DateParser::new().unwrap();
        assert_eq!(
            parser.shift("2023-01-15", i64::from(i32::MAX)),
            DateShiftOutcome::Unparseable
        );
    }

    #[test]
    fn test_year_of() {
        let parser = DateParser::new().unwrap();
        assert_eq!(parser.year_of("01/15/1980"), Some(1980));
        assert_eq!(parser.year_of("March 2020"), Some(2020));
        assert_eq!(parser.year_of("yesterday"), None);
        assert_eq!(
            parser.parse("2023-01-15"),
            NaiveDate::from_ymd_opt(2023, 1, 15)
        );
    }
}
