//! Date normalisation: heterogeneous extracted date strings → day/month/year.
//!
//! Upstream extraction produces whatever the source document (or the LLM)
//! felt like: `05/03/2024`, `2024-03-05`, `05-03-2024`, `5 de março de
//! 2024`, occasionally an ISO timestamp. The form layouts want three
//! zero-padded boxes, so everything funnels through [`normalize_date`].
//!
//! The function is **total**: unrecognised input yields empty parts rather
//! than an error, and out-of-range components are clamped to `"01"` — a
//! visibly wrong-but-reviewable value beats a crashed render.

use chrono::{Datelike, NaiveDate};

/// Zero-padded day/month/year components of one date field.
///
/// Day and month are 2 digits, year 4. All three empty means the input was
/// unrecognisable; the renderer then leaves the boxes blank.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DateParts {
    pub day: String,
    pub month: String,
    pub year: String,
}

impl DateParts {
    pub fn is_empty(&self) -> bool {
        self.day.is_empty() && self.month.is_empty() && self.year.is_empty()
    }

    fn from_numbers(day: i64, month: i64, year: i64) -> Self {
        // Clamp rather than reject: a field with "01" in it gets reviewed,
        // a missing field gets overlooked.
        let day = if (1..=31).contains(&day) { day } else { 1 };
        let month = if (1..=12).contains(&month) { month } else { 1 };
        let year = if year < 100 { 2000 + year } else { year };
        Self {
            day: format!("{day:02}"),
            month: format!("{month:02}"),
            year: format!("{year:04}"),
        }
    }
}

/// Portuguese month names, used both for spelled-month parsing (prefix
/// match) and for layouts that render the month as text.
const MONTHS_PT: [&str; 12] = [
    "janeiro", "fevereiro", "março", "abril", "maio", "junho", "julho", "agosto", "setembro",
    "outubro", "novembro", "dezembro",
];

/// Spelled-out Portuguese month name for a 1-based month number.
///
/// Out-of-range numbers return `""`; the caller is drawing onto a form and
/// must not panic over a bad month.
pub fn spelled_month(month: u32) -> &'static str {
    MONTHS_PT
        .get((month as usize).wrapping_sub(1))
        .copied()
        .unwrap_or("")
}

/// Parse a heterogeneous date string into validated, zero-padded parts.
///
/// Formats accepted, sniffed by separator:
/// * `DD/MM/YYYY` and `YYYY/MM/DD`
/// * `YYYY-MM-DD` and `DD-MM-YYYY`
/// * space-separated numeric or spelled-month forms
///   (`5 março 2024`, `5 de março de 2024`)
/// * anything [`chrono`] can parse from a small set of generic formats
///
/// Ambiguous slash/dash forms choose day/month order by checking which
/// outer token is ≤ 31 and at most 2 digits. Day and month are clamped
/// into range; 2-digit years are assumed current-century.
pub fn normalize_date(input: &str) -> DateParts {
    let input = input.trim();
    if input.is_empty() {
        return DateParts::default();
    }

    if input.contains('/') {
        if let Some(parts) = from_separated(input, '/') {
            return parts;
        }
    } else if input.contains('-') {
        if let Some(parts) = from_separated(input, '-') {
            return parts;
        }
    } else if input.contains(' ') {
        if let Some(parts) = from_spaced(input) {
            return parts;
        }
    }

    generic_parse(input).unwrap_or_default()
}

/// Slash or dash form with three numeric tokens.
fn from_separated(input: &str, sep: char) -> Option<DateParts> {
    let tokens: Vec<&str> = input.split(sep).map(str::trim).collect();
    if tokens.len() != 3 {
        return None;
    }

    // A non-numeric middle token means a spelled month slipped in
    // ("5-março-2024"); hand it to the spelled-month path.
    if tokens[1].parse::<i64>().is_err() {
        return month_name_form(tokens[0], tokens[1], tokens[2]);
    }

    let nums: Vec<i64> = tokens
        .iter()
        .map(|t| t.parse::<i64>())
        .collect::<Result<_, _>>()
        .ok()?;

    // Which outer token is the day? The one that fits in a day box:
    // ≤ 31 and at most 2 digits. A 4-digit leading token is a year.
    if tokens[0].len() <= 2 && (1..=31).contains(&nums[0]) {
        Some(DateParts::from_numbers(nums[0], nums[1], nums[2]))
    } else if tokens[0].len() == 4 {
        Some(DateParts::from_numbers(nums[2], nums[1], nums[0]))
    } else if tokens[2].len() <= 2 && (1..=31).contains(&nums[2]) {
        Some(DateParts::from_numbers(nums[2], nums[1], nums[0]))
    } else {
        // Neither outer token looks like a day; keep day-first order and
        // let the clamp make it reviewable.
        Some(DateParts::from_numbers(nums[0], nums[1], nums[2]))
    }
}

/// Space-separated form, numeric or with a spelled month; filler words
/// ("de", "do", "da") are dropped first.
fn from_spaced(input: &str) -> Option<DateParts> {
    let tokens: Vec<&str> = input
        .split_whitespace()
        .filter(|t| !matches!(t.to_lowercase().as_str(), "de" | "do" | "da"))
        .collect();
    if tokens.len() != 3 {
        return None;
    }
    if tokens[1].parse::<i64>().is_ok() {
        let day = tokens[0].parse::<i64>().ok()?;
        let month = tokens[1].parse::<i64>().ok()?;
        let year = tokens[2].parse::<i64>().ok()?;
        Some(DateParts::from_numbers(day, month, year))
    } else {
        month_name_form(tokens[0], tokens[1], tokens[2])
    }
}

/// `<day> <month-name> <year>` with prefix-matched Portuguese months.
///
/// Both sides are folded to bare ASCII so `marco`, `MARÇO`, and `Março`
/// all hit `março`.
fn month_name_form(day: &str, month_name: &str, year: &str) -> Option<DateParts> {
    let needle = fold(month_name);
    if needle.len() < 3 {
        return None;
    }
    let month = MONTHS_PT
        .iter()
        .position(|m| fold(m).starts_with(&needle))? as i64
        + 1;
    let day = day.parse::<i64>().ok()?;
    let year = year.parse::<i64>().ok()?;
    Some(DateParts::from_numbers(day, month, year))
}

/// Lowercase and strip combining marks so month names compare as ASCII.
fn fold(s: &str) -> String {
    use unicode_normalization::char::is_combining_mark;
    use unicode_normalization::UnicodeNormalization;
    s.nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// Last-resort parse through a small set of generic chrono formats.
fn generic_parse(input: &str) -> Option<DateParts> {
    const FORMATS: [&str; 4] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%d.%m.%Y", "%Y%m%d"];
    for fmt in FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(input, fmt) {
            return Some(DateParts::from_numbers(
                d.day() as i64,
                d.month() as i64,
                d.year() as i64,
            ));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(d: &str, m: &str, y: &str) -> DateParts {
        DateParts {
            day: d.into(),
            month: m.into(),
            year: y.into(),
        }
    }

    #[test]
    fn slash_day_first() {
        assert_eq!(normalize_date("5/3/2024"), parts("05", "03", "2024"));
        assert_eq!(normalize_date("05/03/2024"), parts("05", "03", "2024"));
    }

    #[test]
    fn iso_dash() {
        assert_eq!(normalize_date("2024-03-05"), parts("05", "03", "2024"));
    }

    #[test]
    fn dash_day_first() {
        assert_eq!(normalize_date("05-03-2024"), parts("05", "03", "2024"));
    }

    #[test]
    fn slash_year_first() {
        assert_eq!(normalize_date("2024/03/05"), parts("05", "03", "2024"));
    }

    #[test]
    fn clamps_out_of_range_components() {
        assert_eq!(normalize_date("35/13/2024"), parts("01", "01", "2024"));
        assert_eq!(normalize_date("0/0/2024"), parts("01", "01", "2024"));
    }

    #[test]
    fn two_digit_years_get_current_century() {
        assert_eq!(normalize_date("05/03/24"), parts("05", "03", "2024"));
    }

    #[test]
    fn spelled_month_with_fillers() {
        assert_eq!(
            normalize_date("5 de março de 2024"),
            parts("05", "03", "2024")
        );
        assert_eq!(normalize_date("5 marco 2024"), parts("05", "03", "2024"));
        assert_eq!(normalize_date("12 SET 2025"), parts("12", "09", "2025"));
    }

    #[test]
    fn spaced_numeric() {
        assert_eq!(normalize_date("5 3 2024"), parts("05", "03", "2024"));
    }

    #[test]
    fn generic_timestamp() {
        assert_eq!(
            normalize_date("2024-03-05T10:30:00"),
            parts("05", "03", "2024")
        );
    }

    #[test]
    fn unrecognized_yields_empty_not_panic() {
        assert!(normalize_date("").is_empty());
        assert!(normalize_date("amanhã").is_empty());
        assert!(normalize_date("//").is_empty());
        assert!(normalize_date("1/2").is_empty());
    }

    #[test]
    fn spelled_month_lookup() {
        assert_eq!(spelled_month(1), "janeiro");
        assert_eq!(spelled_month(3), "março");
        assert_eq!(spelled_month(12), "dezembro");
        assert_eq!(spelled_month(0), "");
        assert_eq!(spelled_month(13), "");
    }
}
