//! Text normalisation shared by the repository, the importer and the CLI.

use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

/// Title-case the way spreadsheet users expect: the first letter of every
/// run of letters is upper-cased, the rest lower-cased. Anything that is not
/// a letter (space, digit, apostrophe, hyphen) starts a new run.
pub fn title_case(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut prev_cased = false;
    for c in raw.chars() {
        if c.is_alphabetic() {
            if prev_cased {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_cased = true;
        } else {
            out.push(c);
            prev_cased = false;
        }
    }
    out
}

/// Canonical stored form of a dimension label.
pub fn standardize(raw: &str) -> String {
    title_case(raw.trim())
}

pub fn strip_accents(raw: &str) -> String {
    raw.nfkd().filter(|c| c.is_ascii()).collect()
}

fn whitespace_run() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("static regex"))
}

/// Header key used to match spreadsheet columns: trimmed, lower-case,
/// accent-free, inner whitespace collapsed to a single space.
pub fn normalize_header(raw: &str) -> String {
    let folded = strip_accents(&raw.trim().to_lowercase());
    whitespace_run().replace_all(folded.trim(), " ").into_owned()
}

/// Import-side decimal: a comma is read as the decimal separator. No
/// thousands grouping is accepted. Blank or non-finite input is `None`.
pub fn parse_decimal(raw: &str) -> Option<f64> {
    let s = raw.trim().replace(',', ".");
    if s.is_empty() {
        return None;
    }
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Brazilian-formatted amount as typed at the command line: `1.234,56`,
/// `1234,56` or plain `1234.56`.
pub fn parse_brl(raw: &str) -> Option<f64> {
    let s = raw.trim().trim_start_matches("R$").trim();
    if s.contains(',') {
        parse_decimal(&s.replace('.', ""))
    } else {
        parse_decimal(s)
    }
}

const DAY_FIRST_FORMATS: &[&str] = &["%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y"];
const DAY_FIRST_SHORT_YEAR_FORMATS: &[&str] = &["%d/%m/%y", "%d-%m-%y", "%d.%m.%y"];

/// Day-first date parsing. ISO dates (optionally followed by a time, as
/// spreadsheet date cells render) are accepted as well.
///
/// chrono's `%Y` also matches a two-digit year, so the format family is
/// picked from the digit count of the year component: `25/01/24` is 2024.
pub fn parse_date_dayfirst(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    let date_part = s.split([' ', 'T']).next().unwrap_or(s);
    let first_len = date_part.split(['/', '-', '.']).next().map_or(0, str::len);
    let last_len = date_part.rsplit(['/', '-', '.']).next().map_or(0, str::len);

    if first_len == 4 {
        return NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok();
    }
    let formats = match last_len {
        4 => DAY_FIRST_FORMATS,
        2 => DAY_FIRST_SHORT_YEAR_FORMATS,
        _ => return None,
    };
    formats
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(date_part, fmt).ok())
}

pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
