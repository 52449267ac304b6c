//! Raw cell typing for the OOXML reader: number-format classification and
//! rendering of date/time serial numbers to display text.

use crate::error::SheetMapError;
use crate::workbook::CellValue;

/// Storage type of a cell as declared by the worksheet XML and the
/// workbook's number formats.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub(crate) enum CellType {
    #[default]
    Empty,
    /// Boolean values (true/false)
    Boolean,
    /// Numeric values
    Number,
    /// Date/time values stored as serial numbers from the 1900 epoch
    NumberDateTime1900,
    /// Date values stored as serial numbers from the 1900 epoch
    NumberDate1900,
    /// Time values stored as serial numbers from the 1900 epoch
    NumberTime1900,
    /// Date/time values stored as serial numbers from the 1904 epoch
    NumberDateTime1904,
    /// Date values stored as serial numbers from the 1904 epoch
    NumberDate1904,
    /// Time values stored as serial numbers from the 1904 epoch
    NumberTime1904,
    /// ISO 8601 date/time strings
    IsoDateTime,
    /// Inline string values
    InlineString,
    /// Shared string table references
    SharedString,
    /// Error values (#REF!, #DIV/0!, ...)
    Error,
}

impl CellType {
    /// Maps built-in Excel number format ids to date/time cell types.
    pub(crate) fn parse_builtin_number_format_id(id: &str, is_1904: bool) -> Option<Self> {
        match id {
            "22" => Some(if is_1904 { Self::NumberDateTime1904 } else { Self::NumberDateTime1900 }),
            "14" | "15" | "16" | "17" => Some(if is_1904 { Self::NumberDate1904 } else { Self::NumberDate1900 }),
            "18" | "19" | "20" | "21" | "45" | "46" | "47" => Some(if is_1904 { Self::NumberTime1904 } else { Self::NumberTime1900 }),
            _ => None,
        }
    }

    /// Classifies a custom number format string by scanning its format codes
    /// for date and time tokens, honoring escapes, literals, and color tags.
    pub(crate) fn parse_custom_number_format(format: &str, is_1904: bool) -> Self {
        let mut is_escaped = false;
        let mut is_literal = false;
        let mut is_date = false;
        let mut is_time = false;
        let mut is_color = false;
        for character in format.chars() {
            match character {
                _ if is_escaped => is_escaped = false,
                '_' | '\\' if !is_escaped => is_escaped = true,

                '"' if is_literal => is_literal = false,
                '"' if !is_literal && !is_color => is_literal = true,

                ']' if is_color => is_color = false,
                '[' if !is_color && !is_literal => is_color = true,
                _ if is_literal || is_color => (),

                'Y' | 'y' | 'D' | 'd' => is_date = true,
                'H' | 'h' | 'S' | 's' => is_time = true,
                _ => (),
            }
        }

        match (is_date, is_time, is_1904) {
            (true, true, false) => Self::NumberDateTime1900,
            (true, true, true) => Self::NumberDateTime1904,
            (true, false, false) => Self::NumberDate1900,
            (true, false, true) => Self::NumberDate1904,
            (false, true, false) => Self::NumberTime1900,
            (false, true, true) => Self::NumberTime1904,
            (false, false, _) => Self::Number,
        }
    }

    /// Converts a raw cell value of this type to its resolved form:
    /// the value the cell effectively holds, plus an optional formatted
    /// rendering kept as a fallback when the value itself is unusable.
    pub(crate) fn resolve_value(&self, raw: &str) -> (Option<CellValue>, Option<String>) {
        match self {
            Self::Empty | Self::Error => (None, None),
            Self::Boolean => (Some(CellValue::Bool(raw == "1" || raw.eq_ignore_ascii_case("true"))), None),
            Self::Number => match raw.parse::<f64>() {
                Ok(number) => (Some(CellValue::Number(number)), None),
                // Keep the raw text around so the cell still resolves to something
                Err(_) => (None, Some(raw.to_owned())),
            },
            Self::NumberDateTime1900 => resolve_serial(raw, to_datetime_string(raw, false)),
            Self::NumberDateTime1904 => resolve_serial(raw, to_datetime_string(raw, true)),
            Self::NumberDate1900 => resolve_serial(raw, to_date_string(raw, false)),
            Self::NumberDate1904 => resolve_serial(raw, to_date_string(raw, true)),
            Self::NumberTime1900 | Self::NumberTime1904 => resolve_serial(raw, to_time_string(raw)),
            Self::IsoDateTime => (Some(CellValue::Text(raw.replace('T', " "))), None),
            Self::InlineString | Self::SharedString => (Some(CellValue::Text(raw.to_owned())), None),
        }
    }
}

/// Resolves a date/time serial: the rendered text when conversion succeeds,
/// otherwise the bare number, otherwise the raw text as formatted fallback.
fn resolve_serial(raw: &str, rendered: Result<String, SheetMapError>) -> (Option<CellValue>, Option<String>) {
    match rendered {
        Ok(text) => (Some(CellValue::Text(text)), None),
        Err(_) => match raw.parse::<f64>() {
            Ok(number) => (Some(CellValue::Number(number)), None),
            Err(_) => (None, Some(raw.to_owned())),
        },
    }
}

/// Converts an Excel serial date to an ISO date string.
/// Handles the Lotus 1-2-3 leap year quirk for the 1900 epoch.
fn to_date_string(value: &str, is_1904: bool) -> Result<String, SheetMapError> {
    let days = value.parse::<f64>()?.trunc() as i64;
    let duration = chrono::Duration::days(
        days + if is_1904 {
            1462
        } else if days < 60 {
            1
        } else {
            0
        },
    );
    let date = chrono::NaiveDate::from_ymd_opt(1899, 12, 30).expect("NaiveDate Literal") + duration;
    Ok(date.format("%Y-%m-%d").to_string())
}

/// Converts an Excel serial time fraction to an ISO time string.
fn to_time_string(value: &str) -> Result<String, SheetMapError> {
    let factor = value.parse::<f64>()?;
    let mut hours = (factor.fract() * 86_400_000f64).round() as i64;
    let milliseconds = hours % 1_000; hours /= 1_000;
    let seconds = hours % 60; hours /= 60;
    let minutes = hours % 60; hours /= 60;
    let timestamp = if milliseconds > 0 {
        format!("{hours:02}:{minutes:02}:{seconds:02}.{milliseconds:03}")
    } else {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    };
    Ok(timestamp)
}

/// Converts an Excel serial date/time to an ISO datetime string.
fn to_datetime_string(value: &str, is_1904: bool) -> Result<String, SheetMapError> {
    let date = to_date_string(value, is_1904)?;
    let time = to_time_string(value)?;
    Ok(format!("{date} {time}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_format_ids() {
        assert_eq!(CellType::parse_builtin_number_format_id("14", false), Some(CellType::NumberDate1900));
        assert_eq!(CellType::parse_builtin_number_format_id("22", true), Some(CellType::NumberDateTime1904));
        assert_eq!(CellType::parse_builtin_number_format_id("20", false), Some(CellType::NumberTime1900));
        assert_eq!(CellType::parse_builtin_number_format_id("0", false), None);
    }

    #[test]
    fn custom_formats() {
        assert_eq!(CellType::parse_custom_number_format("yyyy-mm-dd", false), CellType::NumberDate1900);
        assert_eq!(CellType::parse_custom_number_format("hh:mm:ss", false), CellType::NumberTime1900);
        assert_eq!(CellType::parse_custom_number_format("yyyy-mm-dd hh:mm", true), CellType::NumberDateTime1904);
        assert_eq!(CellType::parse_custom_number_format("#,##0.00", false), CellType::Number);
        // "d" inside a quoted literal must not classify as a date
        assert_eq!(CellType::parse_custom_number_format("\"dollars\" 0.00", false), CellType::Number);
        // "Red" inside a color tag must not classify as a date
        assert_eq!(CellType::parse_custom_number_format("[Red]0.00", false), CellType::Number);
    }

    #[test]
    fn date_rendering() {
        // Serial 45123 is 2023-07-16 in the 1900 system
        let (value, formatted) = CellType::NumberDate1900.resolve_value("45123");
        assert_eq!(value, Some(CellValue::Text("2023-07-16".to_owned())));
        assert_eq!(formatted, None);
    }

    #[test]
    fn numbers_and_booleans() {
        assert_eq!(CellType::Number.resolve_value("1234.5").0, Some(CellValue::Number(1234.5)));
        assert_eq!(CellType::Boolean.resolve_value("1").0, Some(CellValue::Bool(true)));
        assert_eq!(CellType::Boolean.resolve_value("0").0, Some(CellValue::Bool(false)));
        let (value, formatted) = CellType::Number.resolve_value("not-a-number");
        assert_eq!(value, None);
        assert_eq!(formatted, Some("not-a-number".to_owned()));
    }

    #[test]
    fn error_cells_resolve_absent() {
        assert_eq!(CellType::Error.resolve_value("#DIV/0!"), (None, None));
    }
}
