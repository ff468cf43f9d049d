//! Parsing of DICOM `DA`/`TM` values.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

/// Parse a DICOM date (`YYYYMMDD`); the ISO (`YYYY-MM-DD`) and legacy
/// ACR-NEMA (`YYYY.MM.DD`) spellings are accepted too.
#[must_use]
pub fn parse_dicom_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    ["%Y%m%d", "%Y-%m-%d", "%Y.%m.%d"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
}

/// Parse a DICOM time (`HH`, `HHMM`, `HHMMSS` or `HHMMSS.FFFFFF`).
/// Colon-separated times are accepted as well.
#[must_use]
pub fn parse_dicom_time(value: &str) -> Option<NaiveTime> {
    let compact: String = value.trim().chars().filter(|c| *c != ':').collect();
    let (whole, fraction) = match compact.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (compact.as_str(), None),
    };

    if whole.is_empty() || whole.len() % 2 != 0 || !whole.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let field = |i: usize| -> Option<u32> {
        whole.get(i..i + 2).map_or(Some(0), |s| s.parse().ok())
    };
    let (hour, minute, second) = (field(0)?, field(2)?, field(4)?);

    let micros = match fraction {
        Some(f) if !f.is_empty() && f.len() <= 6 && f.chars().all(|c| c.is_ascii_digit()) => {
            format!("{f:0<6}").parse().ok()?
        }
        Some(_) => return None,
        None => 0,
    };

    NaiveTime::from_hms_micro_opt(hour, minute, second, micros)
}

/// Combine `StudyDate` and `StudyTime`; a missing or invalid time counts as midnight
#[must_use]
pub fn parse_study_date_time(date: Option<&str>, time: Option<&str>) -> Option<NaiveDateTime> {
    let date = parse_dicom_date(date?)?;
    match time.and_then(parse_dicom_time) {
        Some(time) => Some(date.and_time(time)),
        None => date.and_hms_opt(0, 0, 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dates() {
        let expected = NaiveDate::from_ymd_opt(2021, 3, 4);
        assert_eq!(parse_dicom_date("20210304"), expected);
        assert_eq!(parse_dicom_date("2021-03-04"), expected);
        assert_eq!(parse_dicom_date("2021.03.04"), expected);
        assert_eq!(parse_dicom_date("2021"), None);
        assert_eq!(parse_dicom_date("20211304"), None);
    }

    #[test]
    fn test_parse_times() {
        assert_eq!(parse_dicom_time("14"), NaiveTime::from_hms_opt(14, 0, 0));
        assert_eq!(parse_dicom_time("1430"), NaiveTime::from_hms_opt(14, 30, 0));
        assert_eq!(parse_dicom_time("143015"), NaiveTime::from_hms_opt(14, 30, 15));
        assert_eq!(
            parse_dicom_time("143015.5"),
            NaiveTime::from_hms_micro_opt(14, 30, 15, 500_000)
        );
        assert_eq!(parse_dicom_time("14:30:15"), NaiveTime::from_hms_opt(14, 30, 15));
        assert_eq!(parse_dicom_time("143"), None);
        assert_eq!(parse_dicom_time(""), None);
        assert_eq!(parse_dicom_time("2561"), None);
    }

    #[test]
    fn test_study_date_time() {
        let dt = parse_study_date_time(Some("20200101"), Some("0830")).unwrap();
        assert_eq!(dt.to_string(), "2020-01-01 08:30:00");

        let midnight = parse_study_date_time(Some("20200101"), None).unwrap();
        assert_eq!(midnight.to_string(), "2020-01-01 00:00:00");

        assert_eq!(parse_study_date_time(None, Some("0830")), None);
    }
}
