use chrono::{Datelike, Local, NaiveDate, NaiveDateTime, NaiveTime};

use crate::error::{ExtractError, Result};

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Interpret loosely formatted date text, assuming the current year where the
/// text carries none.
///
/// There is no declared format: the layout is inferred from the number of
/// tokens and, for a single run of digits, from its length.
///
/// * `"0901"`, `"20180901"`, `"090118"`, `"9012018"` – digit runs
/// * `"Sep 1"`, `"1st September"`, `"9/1"` – month and day
/// * `"2018-09-01"`, `"09/01/2018"`, `"1 Sep 18"` – year, month and day
pub fn parse_date(text: &str) -> Result<NaiveDate> {
    parse_date_in_year(text, Local::now().year())
}

/// [`parse_date`] with an explicit year for inputs that omit it.
pub fn parse_date_in_year(text: &str, current_year: i32) -> Result<NaiveDate> {
    let invalid = || ExtractError::InvalidDate(text.to_string());
    let tokens = date_tokens(text);

    let (year, month, day) = match tokens.as_slice() {
        [digits] => from_digit_run(digits, current_year).ok_or_else(invalid)?,
        [first, second] => {
            let (month, day) = month_and_day(first, second).ok_or_else(invalid)?;
            (current_year, month, day)
        }
        [first, second, third] => year_month_day(first, second, third).ok_or_else(invalid)?,
        _ => return Err(invalid()),
    };

    let month = u32::try_from(month).map_err(|_| invalid())?;
    let day = u32::try_from(day).map_err(|_| invalid())?;
    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(invalid)
}

/// Interpret loosely formatted time-of-day text.
///
/// Accepts `H`, `HM`, `HMS` digit runs (`"9"`, `"930"`, `"093000"`) or one to
/// three separated fields, with optional am/pm markers anywhere in the text.
/// `24:00:00` is clamped to the last second of the day.
pub fn parse_time(text: &str) -> Result<NaiveTime> {
    let invalid = || ExtractError::InvalidTime(text.to_string());

    let is_pm = text.chars().any(|c| c.eq_ignore_ascii_case(&'p'));
    let is_am = text.chars().any(|c| c.eq_ignore_ascii_case(&'a'));
    let stripped: String = text.chars().filter(|c| !c.is_ascii_alphabetic()).collect();
    let tokens: Vec<&str> = stripped
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .collect();

    let (hour, minute, second) = match tokens.as_slice() {
        [run] => {
            let n = number(run).ok_or_else(invalid)?;
            match run.len() {
                5 | 6 => (n / 10000, (n / 100) % 100, n % 100),
                3 | 4 => (n / 100, n % 100, 0),
                1 | 2 => (n, 0, 0),
                _ => return Err(invalid()),
            }
        }
        [h, m] => (
            number(h).ok_or_else(invalid)?,
            number(m).ok_or_else(invalid)?,
            0,
        ),
        [h, m, s] => (
            number(h).ok_or_else(invalid)?,
            number(m).ok_or_else(invalid)?,
            number(s).ok_or_else(invalid)?,
        ),
        _ => return Err(invalid()),
    };

    if !(0..=24).contains(&hour) || !(0..=59).contains(&minute) || !(0..=59).contains(&second) {
        return Err(invalid());
    }

    let (hour, minute, second) = if is_pm && hour <= 11 {
        (hour + 12, minute, second)
    } else if is_am && hour == 12 {
        (0, minute, second)
    } else if hour == 24 {
        (23, 59, 59)
    } else {
        (hour, minute, second)
    };

    NaiveTime::from_hms_opt(hour as u32, minute as u32, second as u32).ok_or_else(invalid)
}

/// Parse `"<date> <time>"`: the date is everything up to the first space, the
/// time everything after it.
pub fn parse_datetime(text: &str) -> Result<NaiveDateTime> {
    let text = text.trim();
    let (date, time) = text.split_once(' ').unwrap_or((text, ""));
    Ok(parse_date(date)?.and_time(parse_time(time)?))
}

// ---------------------------------------------------------------------------
// Tokenising
// ---------------------------------------------------------------------------

/// Split date text into runs of letters and runs of digits.
///
/// Ordinal suffixes following a number (`1st`, `22 nd`) are dropped first,
/// and letter runs always stand apart from adjacent digits (`Sep1` is two
/// tokens). Everything that is neither letter nor digit separates tokens.
fn date_tokens(text: &str) -> Vec<String> {
    #[derive(PartialEq, Clone, Copy)]
    enum Class {
        Letter,
        Digit,
        Separator,
    }

    fn class_of(c: char) -> Class {
        if c.is_ascii_digit() {
            Class::Digit
        } else if c.is_alphabetic() {
            Class::Letter
        } else {
            Class::Separator
        }
    }

    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut current_class = Class::Separator;

    for c in strip_ordinals(text).chars() {
        let class = class_of(c);
        if class != current_class && !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
        if class != Class::Separator {
            current.push(c);
        }
        current_class = class;
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn strip_ordinals(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < chars.len() {
        let is_suffix = i + 1 < chars.len()
            && is_ordinal_suffix(chars[i], chars[i + 1])
            && chars[..i]
                .iter()
                .rev()
                .find(|c| !c.is_whitespace())
                .is_some_and(|c| c.is_ascii_digit());
        if is_suffix {
            out.push(' ');
            i += 2;
        } else {
            out.push(chars[i]);
            i += 1;
        }
    }
    out
}

fn is_ordinal_suffix(a: char, b: char) -> bool {
    matches!(
        (a.to_ascii_lowercase(), b.to_ascii_lowercase()),
        ('s', 't') | ('n', 'd') | ('r', 'd') | ('t', 'h')
    )
}

// ---------------------------------------------------------------------------
// Layout inference
// ---------------------------------------------------------------------------

fn number(token: &str) -> Option<i32> {
    token.parse().ok()
}

fn is_word(token: &str) -> bool {
    token.chars().all(char::is_alphabetic)
}

fn month_number(name: &str) -> Option<i32> {
    let month = match name.to_ascii_uppercase().as_str() {
        "JAN" | "JANUARY" => 1,
        "FEB" | "FEBRUARY" => 2,
        "MAR" | "MARCH" => 3,
        "APR" | "APRIL" => 4,
        "MAY" => 5,
        "JUN" | "JUNE" => 6,
        "JUL" | "JULY" => 7,
        "AUG" | "AUGUST" => 8,
        "SEP" | "SEPT" | "SEPTEMBER" => 9,
        "OCT" | "OCTOBER" => 10,
        "NOV" | "NOVEMBER" => 11,
        "DEC" | "DECEMBER" => 12,
        _ => return None,
    };
    Some(month)
}

fn out_of_bounds(month: i32, day: i32) -> bool {
    month > 12 || day > 31 || day == 0
}

/// A single digit run; the layout is chosen by its length, falling back to
/// the next plausible layout when month or day bounds are violated.
fn from_digit_run(run: &str, current_year: i32) -> Option<(i32, i32, i32)> {
    let n = number(run)?;
    let ymd = match run.len() {
        // MD
        2 => (current_year, n / 10, n % 10),
        // MMDD
        3 | 4 => (current_year, n / 100, n % 100),
        // MDDYY
        5 => (n % 100 + 2000, n / 10000, (n / 100) % 100),
        // YYMMDD, then MMDDYY, then DDMMYY
        6 => {
            let mut ymd = (n / 10000 + 2000, (n / 100) % 100, n % 100);
            if out_of_bounds(ymd.1, ymd.2) {
                ymd = (n % 100 + 2000, n / 10000, (n / 100) % 100);
                if out_of_bounds(ymd.1, ymd.2) {
                    ymd = (ymd.0, (n / 100) % 100, n / 10000);
                }
            }
            ymd
        }
        // MDDYYYY, then DMMYYYY
        7 => {
            let mut ymd = (n % 10000, n / 1_000_000, (n / 10000) % 100);
            if out_of_bounds(ymd.1, ymd.2) {
                ymd = (ymd.0, (n / 10000) % 100, n / 1_000_000);
            }
            ymd
        }
        // YYYYMMDD, then MMDDYYYY, then DDMMYYYY
        8 => {
            let mut ymd = (n / 10000, (n / 100) % 100, n % 100);
            if out_of_bounds(ymd.1, ymd.2) {
                ymd = (n % 10000, n / 1_000_000, (n / 10000) % 100);
                if out_of_bounds(ymd.1, ymd.2) {
                    ymd = (ymd.0, (n / 10000) % 100, n / 1_000_000);
                }
            }
            ymd
        }
        _ => return None,
    };
    Some(ymd)
}

/// Two tokens: month name and day in either order, or two numbers where a
/// first value above 12 must be the day.
fn month_and_day(first: &str, second: &str) -> Option<(i32, i32)> {
    if is_word(first) {
        Some((month_number(first)?, number(second)?))
    } else if is_word(second) {
        Some((month_number(second)?, number(first)?))
    } else {
        let (month, day) = (number(first)?, number(second)?);
        if month > 12 {
            Some((day, month))
        } else {
            Some((month, day))
        }
    }
}

fn year_month_day(first: &str, second: &str, third: &str) -> Option<(i32, i32, i32)> {
    let two_digit = |year: i32| if year < 100 { year + 2000 } else { year };

    if is_word(first) {
        // Sep 01 2018
        let month = month_number(first)?;
        let year = two_digit(number(third)?);
        Some((year, month, number(second)?))
    } else if is_word(second) {
        // 2018 Sep 01, or 01 Sep 2018 when the last field cannot be a day
        let month = month_number(second)?;
        let last = number(third)?;
        let (year, day) = if first.len() >= 2 && last <= 31 {
            (number(first)?, last)
        } else {
            (last, number(first)?)
        };
        Some((two_digit(year), month, day))
    } else {
        let (a, b, c) = (number(first)?, number(second)?, number(third)?);
        if c > 31 {
            // MM DD YYYY, or DD MM YYYY when the leading field cannot be a month
            let year = if third.len() == 2 { c + 2000 } else { c };
            if a <= 12 {
                Some((year, a, b))
            } else {
                Some((year, b, a))
            }
        } else if b > 12 {
            // MM DD YY
            let year = if third.len() == 2 { c + 2000 } else { c };
            Some((year, a, b))
        } else {
            // YYYY MM DD
            let year = if first.len() == 2 { a + 2000 } else { a };
            Some((year, b, c))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn time(h: u32, m: u32, s: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, s).unwrap()
    }

    #[test]
    fn test_digit_runs() {
        assert_eq!(parse_date_in_year("91", 2020).unwrap(), date(2020, 9, 1));
        assert_eq!(parse_date_in_year("901", 2020).unwrap(), date(2020, 9, 1));
        assert_eq!(parse_date_in_year("1231", 2020).unwrap(), date(2020, 12, 31));
        assert_eq!(parse_date_in_year("90118", 2020).unwrap(), date(2018, 9, 1));
        assert_eq!(parse_date_in_year("180901", 2020).unwrap(), date(2018, 9, 1));
        assert_eq!(parse_date_in_year("9012018", 2020).unwrap(), date(2018, 9, 1));
        assert_eq!(parse_date_in_year("20180901", 2020).unwrap(), date(2018, 9, 1));
    }

    #[test]
    fn test_six_digit_fallbacks() {
        // 12/31/18: month 31 rules out YYMMDD
        assert_eq!(parse_date_in_year("123118", 2020).unwrap(), date(2018, 12, 31));
        // 25/07/40: neither YYMMDD (day 40) nor MMDDYY (month 25)
        assert_eq!(parse_date_in_year("250740", 2020).unwrap(), date(2040, 7, 25));
    }

    #[test]
    fn test_seven_and_eight_digit_fallbacks() {
        assert_eq!(parse_date_in_year("1312018", 2020).unwrap(), date(2018, 1, 31));
        assert_eq!(parse_date_in_year("12312018", 2020).unwrap(), date(2018, 12, 31));
        assert_eq!(parse_date_in_year("31122018", 2020).unwrap(), date(2018, 12, 31));
    }

    #[test]
    fn test_month_and_day() {
        assert_eq!(parse_date_in_year("Sep 1", 2020).unwrap(), date(2020, 9, 1));
        assert_eq!(parse_date_in_year("1st September", 2020).unwrap(), date(2020, 9, 1));
        assert_eq!(parse_date_in_year("Aug22nd", 2020).unwrap(), date(2020, 8, 22));
        assert_eq!(parse_date_in_year("9/1", 2020).unwrap(), date(2020, 9, 1));
        assert_eq!(parse_date_in_year("25/12", 2020).unwrap(), date(2020, 12, 25));
    }

    #[test]
    fn test_year_month_day() {
        assert_eq!(parse_date_in_year("2018-09-01", 2020).unwrap(), date(2018, 9, 1));
        assert_eq!(parse_date_in_year("09/01/2018", 2020).unwrap(), date(2018, 9, 1));
        assert_eq!(parse_date_in_year("25.12.2018", 2020).unwrap(), date(2018, 12, 25));
        assert_eq!(parse_date_in_year("12/25/18", 2020).unwrap(), date(2018, 12, 25));
        assert_eq!(parse_date_in_year("18/09/01", 2020).unwrap(), date(2018, 9, 1));
        assert_eq!(parse_date_in_year("Sep 3rd, 2018", 2020).unwrap(), date(2018, 9, 3));
        assert_eq!(parse_date_in_year("1 Sep 2018", 2020).unwrap(), date(2018, 9, 1));
        assert_eq!(parse_date_in_year("01 Sep 2018", 2020).unwrap(), date(2018, 9, 1));
        assert_eq!(parse_date_in_year("2018 Sep 01", 2020).unwrap(), date(2018, 9, 1));
    }

    #[test]
    fn test_invalid_dates() {
        for text in ["", "5", "123456789", "Foo 1", "2018-02-30", "1-2-3-4", "13/13/2018"] {
            let err = parse_date_in_year(text, 2020).unwrap_err();
            assert!(matches!(err, ExtractError::InvalidDate(_)), "{text:?} gave {err:?}");
        }
    }

    #[test]
    fn test_times() {
        assert_eq!(parse_time("11:30:00pm").unwrap(), time(23, 30, 0));
        assert_eq!(parse_time("12am").unwrap(), time(0, 0, 0));
        assert_eq!(parse_time("12pm").unwrap(), time(12, 0, 0));
        assert_eq!(parse_time("24:00:00").unwrap(), time(23, 59, 59));
        assert_eq!(parse_time("9").unwrap(), time(9, 0, 0));
        assert_eq!(parse_time("930").unwrap(), time(9, 30, 0));
        assert_eq!(parse_time("093015").unwrap(), time(9, 30, 15));
        assert_eq!(parse_time("7:05 P").unwrap(), time(19, 5, 0));
        assert_eq!(parse_time(" 0:00:01").unwrap(), time(0, 0, 1));
    }

    #[test]
    fn test_invalid_times() {
        for text in ["", "25:00", "10:60", "10:00:60", "1234567", "1:2:3:4"] {
            let err = parse_time(text).unwrap_err();
            assert!(matches!(err, ExtractError::InvalidTime(_)), "{text:?} gave {err:?}");
        }
    }

    #[test]
    fn test_parse_datetime() {
        let parsed = parse_datetime("2018/9/1 13:05:09").unwrap();
        assert_eq!(parsed, date(2018, 9, 1).and_time(time(13, 5, 9)));
        let parsed = parse_datetime("09/01/2018 1:05:09 PM").unwrap();
        assert_eq!(parsed, date(2018, 9, 1).and_time(time(13, 5, 9)));
    }

    proptest! {
        #[test]
        fn test_yymmdd_recovers_date(days in 0i64..36_500) {
            let expected = date(2000, 1, 1) + chrono::Duration::days(days);
            let text = expected.format("%y%m%d").to_string();
            prop_assert_eq!(parse_date_in_year(&text, 1999).unwrap(), expected);
        }

        #[test]
        fn test_slash_layout_recovers_date(days in 0i64..50_000) {
            let expected = date(1950, 1, 1) + chrono::Duration::days(days);
            let text = expected.format("%Y/%-m/%-d").to_string();
            prop_assert_eq!(parse_date_in_year(&text, 1999).unwrap(), expected);
        }
    }
}
