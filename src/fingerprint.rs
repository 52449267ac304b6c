//! Structural fingerprinting of workbook layouts.
//!
//! The fingerprint is a pure function of sheet names (order-independent) and
//! the label structure of each sheet's first rows. Numeric content is
//! collapsed to a `NUM` marker so that two files sharing a layout but
//! carrying different figures hash identically, while any change to a
//! header, a label, a sheet name, or which rows are blank produces a new key.

use crate::workbook::CellValue;
use crate::workbook::Workbook;
use regex::Regex;
use sha2::Digest;
use sha2::Sha256;

/// Rows inspected per sheet. Layout identity lives in the top of the sheet;
/// everything below is data.
const FINGERPRINT_ROWS: usize = 10;

/// Pattern for values that read as numbers: plain, currency-prefixed,
/// comma-grouped, parenthesized negatives, and percentages.
pub(crate) fn numeric_pattern() -> Regex {
    Regex::new(r"^[\$€£¥]?\s*\(?\s*-?\d[\d,]*(\.\d+)?\s*\)?%?$").expect("Hardcode regex pattern")
}

/// Computes the structural fingerprint of a workbook as a hex SHA-256 digest.
pub fn fingerprint(workbook: &Workbook) -> String {
    let numeric = numeric_pattern();
    let mut names: Vec<&str> = workbook.sheets.iter().map(|sheet| sheet.name.as_str()).collect();
    names.sort_unstable();

    let mut canonical = format!("SHEETS:{}", names.join("|"));
    for name in &names {
        let sheet = match workbook.sheet(name) {
            Some(sheet) => sheet,
            None => continue,
        };
        for row in 0..FINGERPRINT_ROWS {
            let mut classes: Vec<String> = (0..sheet.col_count())
                .map(|col| classify(sheet.resolve(row, col), &numeric))
                .collect();
            // Trailing blanks carry no structure; data columns added to the
            // right of the layout must not perturb the key
            while classes.last().map(|class| class.is_empty()).unwrap_or(false) {
                classes.pop();
            }
            canonical.push('\n');
            canonical.push_str(name);
            canonical.push('!');
            canonical.push_str(&row.to_string());
            canonical.push(':');
            canonical.push_str(&classes.join("|"));
        }
    }

    let digest = Sha256::digest(canonical.as_bytes());
    digest.iter().map(|byte| format!("{byte:02x}")).collect()
}

/// Reduces a resolved cell to its structural class: `NUM` for anything
/// numeric or currency-like, empty for blanks, upper-cased text otherwise.
fn classify(value: Option<CellValue>, numeric: &Regex) -> String {
    match value {
        None => String::new(),
        Some(CellValue::Number(_)) => "NUM".to_owned(),
        Some(CellValue::Bool(value)) => value.to_string().to_uppercase(),
        Some(CellValue::Text(text)) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                String::new()
            } else if numeric.is_match(trimmed) {
                "NUM".to_owned()
            } else {
                trimmed.to_uppercase()
            }
        }
    }
}
