//! Heuristic layout analysis for workbooks with no saved profile: scores
//! each sheet's likelihood of holding tabular pricing data, detects the
//! header row, and proposes column-role assignments.
//!
//! Scores are advisory. A low or negative score flags low confidence for
//! the mapping interface; it never blocks anything.

use crate::fingerprint::numeric_pattern;
use crate::workbook::reference::column_index_to_letter;
use crate::workbook::CellValue;
use crate::workbook::Sheet;
use crate::workbook::Workbook;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;

/// Rows inspected when hunting for the header row.
const HEADER_SCAN_ROWS: usize = 20;
/// Columns inspected for dominance voting and role suggestion.
const COLUMN_SCAN_WIDTH: usize = 20;
/// Data rows sampled for dominance voting and the row-count reward.
const SAMPLE_ROWS: usize = 20;
/// Sample rows surfaced to the mapping interface.
const PREVIEW_SAMPLE_ROWS: usize = 10;

/// Words that mark a cell as header-like. Vendor sheets vary wildly but
/// reuse this vocabulary with high consistency.
const HEADER_WORDS: &[&str] = &[
    "description", "desc", "item", "product", "model", "part",
    "price", "cost", "margin", "qty", "quantity", "unit", "amount",
    "total", "labor", "material", "sell",
];

/// Sheet-name keywords that raise the pricing-likelihood score.
const SHEET_NAME_KEYWORDS: &[(&str, i32)] = &[
    ("pricing", 15),
    ("price", 15),
    ("margin", 10),
    ("budget", 10),
    ("estimate", 10),
    ("quote", 10),
    ("bid", 10),
    ("cost", 10),
    ("analysis", 5),
];

/// Sheet-name keywords that lower it.
const SHEET_NAME_EXCLUSIONS: &[(&str, i32)] = &[
    ("drawing", -20),
    ("template", -15),
    ("cover", -15),
    ("instruction", -15),
    ("terms", -10),
    ("notes", -10),
];

/// A column role with the header vocabulary that claims it. Rules are
/// matched in order; earlier rules win contested columns.
struct RoleRule {
    role: &'static str,
    header_words: &'static [&'static str],
}

const ROLE_RULES: &[RoleRule] = &[
    RoleRule { role: "description", header_words: &["description", "desc", "item", "product", "scope"] },
    RoleRule { role: "selling_price", header_words: &["selling price", "sell price", "sale price", "price", "sell"] },
    RoleRule { role: "cost", header_words: &["cost", "net"] },
    RoleRule { role: "margin_pct", header_words: &["margin %", "margin%", "gp%", "gp %", "margin pct"] },
    RoleRule { role: "margin_dollar", header_words: &["margin $", "margin$", "gp$", "profit"] },
];

/// Heuristic output for one sheet.
#[derive(Clone, Debug, Serialize)]
pub struct SheetAnalysis {
    pub sheet_name: String,
    /// Pricing-likelihood score; 0 or below signals low confidence.
    pub score: i32,
    /// Suggested 0-based header row index.
    pub header_row: usize,
    /// Text of the suggested header row.
    pub headers: Vec<String>,
    /// Sample data rows following the header, for the mapping interface.
    pub sample_rows: Vec<Vec<String>>,
    /// Suggested role assignments, role name to column letter.
    pub suggested_roles: BTreeMap<String, String>,
}

/// Analyzes every sheet of a workbook, ranked by descending score.
pub fn analyze_sheets(workbook: &Workbook) -> Vec<SheetAnalysis> {
    let numeric = numeric_pattern();
    let mut analyses: Vec<SheetAnalysis> = workbook
        .sheets
        .iter()
        .map(|sheet| analyze_sheet(sheet, &numeric))
        .collect();
    analyses.sort_by_key(|analysis| -analysis.score);
    analyses
}

fn analyze_sheet(sheet: &Sheet, numeric: &Regex) -> SheetAnalysis {
    let header_row = detect_header_row(sheet, numeric);
    let headers = sheet.row_text(header_row);
    let columns = classify_columns(sheet, header_row, numeric);

    let data_start = header_row + 1;
    let data_rows = (data_start..sheet.row_count().min(data_start + SAMPLE_ROWS))
        .filter(|row| !sheet.is_row_blank(*row, COLUMN_SCAN_WIDTH))
        .count();

    let mut score = 0i32;
    let name = sheet.name.to_lowercase();
    for (keyword, weight) in SHEET_NAME_KEYWORDS {
        if name.contains(keyword) {
            score += weight;
        }
    }
    for (keyword, weight) in SHEET_NAME_EXCLUSIONS {
        if name.contains(keyword) {
            score += weight;
        }
    }
    score += 10 * headers.iter().filter(|text| is_header_word(text)).count() as i32;

    let text_columns = columns.iter().filter(|dominance| **dominance == Dominance::Text).count();
    let numeric_columns = columns.iter().filter(|dominance| **dominance == Dominance::Numeric).count();
    if text_columns >= 1 && numeric_columns >= 1 {
        // The signature of a description + price table
        score += 25;
    }
    if numeric_columns >= 2 {
        score += 10;
    }
    score += data_rows as i32;
    if data_rows < 2 {
        score -= 20;
    }

    let sample_rows = (data_start..sheet.row_count().min(data_start + PREVIEW_SAMPLE_ROWS))
        .map(|row| sheet.row_text(row))
        .collect();

    let suggested_roles = suggest_roles(&headers, &columns);

    SheetAnalysis {
        sheet_name: sheet.name.to_owned(),
        score,
        header_row,
        headers,
        sample_rows,
        suggested_roles,
    }
}

/// Scans the first rows for the most header-like one: header vocabulary
/// raises a row's score, bare numbers lower it (numbers rarely appear in a
/// header). Ties keep the earliest row.
fn detect_header_row(sheet: &Sheet, numeric: &Regex) -> usize {
    let mut best_row = 0usize;
    let mut best_score = i32::MIN;
    for row in 0..sheet.row_count().min(HEADER_SCAN_ROWS) {
        let cells = sheet.row_text(row);
        let filled = cells.iter().filter(|text| !text.trim().is_empty()).count();
        if filled < 2 {
            continue;
        }
        let mut score = 0i32;
        for text in &cells {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                continue;
            }
            if is_header_word(trimmed) {
                score += 10;
            }
            if numeric.is_match(trimmed) {
                score -= 5;
            }
        }
        if score > best_score {
            best_score = score;
            best_row = row;
        }
    }
    best_row
}

fn is_header_word(text: &str) -> bool {
    let lower = text.trim().to_lowercase();
    !lower.is_empty() && HEADER_WORDS.iter().any(|word| lower.contains(word))
}

#[derive(Copy, Clone, Debug, PartialEq)]
enum Dominance {
    Empty,
    Text,
    Numeric,
    /// Numeric values that render as percentages.
    Percent,
}

/// Classifies each scanned column as text- or numeric-dominant by majority
/// vote over the sample rows below the header.
fn classify_columns(sheet: &Sheet, header_row: usize, numeric: &Regex) -> Vec<Dominance> {
    let data_start = header_row + 1;
    let data_end = sheet.row_count().min(data_start + SAMPLE_ROWS);
    (0..sheet.col_count().min(COLUMN_SCAN_WIDTH))
        .map(|col| {
            let mut text_votes = 0usize;
            let mut numeric_votes = 0usize;
            let mut percent_votes = 0usize;
            for row in data_start..data_end {
                match sheet.resolve(row, col) {
                    None => (),
                    Some(value) if value.is_blank() => (),
                    Some(CellValue::Number(_)) | Some(CellValue::Bool(_)) => numeric_votes += 1,
                    Some(CellValue::Text(text)) => {
                        let trimmed = text.trim().to_owned();
                        if trimmed.ends_with('%') && numeric.is_match(&trimmed) {
                            percent_votes += 1;
                        } else if numeric.is_match(&trimmed) {
                            numeric_votes += 1;
                        } else {
                            text_votes += 1;
                        }
                    }
                }
            }
            let total = text_votes + numeric_votes + percent_votes;
            if total == 0 {
                Dominance::Empty
            } else if percent_votes * 2 > total {
                Dominance::Percent
            } else if numeric_votes + percent_votes > text_votes {
                Dominance::Numeric
            } else {
                Dominance::Text
            }
        })
        .collect()
}

/// Proposes column roles: header-text matching against the role rule table
/// first, data-pattern voting for whatever remains. Each role claims at
/// most one column and each column at most one role.
fn suggest_roles(headers: &[String], columns: &[Dominance]) -> BTreeMap<String, String> {
    let mut roles = BTreeMap::<String, String>::new();
    let width = headers.len().max(columns.len()).min(COLUMN_SCAN_WIDTH);
    let mut claimed = vec![false; width];

    for rule in ROLE_RULES {
        for col in 0..width {
            if claimed[col] {
                continue;
            }
            let header = headers.get(col).map(|text| text.trim().to_lowercase()).unwrap_or_default();
            if header.is_empty() {
                continue;
            }
            if rule.header_words.iter().any(|word| header.contains(word)) {
                roles.insert(rule.role.to_owned(), column_index_to_letter(col));
                claimed[col] = true;
                break;
            }
        }
    }

    // Data-pattern fallback for roles the headers did not reveal
    for col in 0..width {
        if claimed[col] {
            continue;
        }
        let role = match columns.get(col) {
            Some(Dominance::Text) if !roles.contains_key("description") => Some("description"),
            Some(Dominance::Percent) if !roles.contains_key("margin_pct") => Some("margin_pct"),
            Some(Dominance::Numeric) if !roles.contains_key("selling_price") => Some("selling_price"),
            Some(Dominance::Numeric) if !roles.contains_key("cost") => Some("cost"),
            _ => None,
        };
        if let Some(role) = role {
            roles.insert(role.to_owned(), column_index_to_letter(col));
            claimed[col] = true;
        }
    }

    roles
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workbook::testing::sheet_from_rows;

    fn analyze_one(sheet: Sheet) -> SheetAnalysis {
        let workbook = Workbook { sheets: vec![sheet] };
        analyze_sheets(&workbook).remove(0)
    }

    #[test]
    fn detects_header_row_below_title() {
        let sheet = sheet_from_rows("Pricing", &[
            &["Acme Corp Pricing 2026"],
            &[],
            &["Description", "Qty", "Price", "Cost"],
            &["Widget", "2", "100", "60"],
            &["Gadget", "1", "250", "120"],
        ]);
        let analysis = analyze_one(sheet);
        assert_eq!(analysis.header_row, 2);
        assert_eq!(analysis.headers[0], "Description");
    }

    #[test]
    fn pricing_sheet_outranks_cover_sheet() {
        let cover = sheet_from_rows("Cover Page", &[
            &["Acme Corp"],
            &["Proposal #1234", "Rev 2"],
        ]);
        let pricing = sheet_from_rows("Margin Analysis", &[
            &["Description", "Selling Price", "Cost"],
            &["Widget", "100", "60"],
            &["Gadget", "250", "120"],
            &["Sprocket", "75", "40"],
        ]);
        let workbook = Workbook { sheets: vec![cover, pricing] };
        let analyses = analyze_sheets(&workbook);
        assert_eq!(analyses[0].sheet_name, "Margin Analysis");
        assert!(analyses[0].score > analyses[1].score);
        assert!(analyses[0].score > 0);
    }

    #[test]
    fn near_empty_sheet_scores_low() {
        let analysis = analyze_one(sheet_from_rows("Sheet1", &[&["a", "b"]]));
        assert!(analysis.score <= 0);
    }

    #[test]
    fn roles_from_headers() {
        let sheet = sheet_from_rows("Pricing", &[
            &["Item Description", "Selling Price", "Our Cost", "Margin %"],
            &["Widget", "100", "60", "40%"],
        ]);
        let analysis = analyze_one(sheet);
        assert_eq!(analysis.suggested_roles.get("description"), Some(&"A".to_owned()));
        assert_eq!(analysis.suggested_roles.get("selling_price"), Some(&"B".to_owned()));
        assert_eq!(analysis.suggested_roles.get("cost"), Some(&"C".to_owned()));
        assert_eq!(analysis.suggested_roles.get("margin_pct"), Some(&"D".to_owned()));
    }

    #[test]
    fn roles_from_data_patterns_when_headers_are_opaque() {
        let sheet = sheet_from_rows("Sheet1", &[
            &["Col1", "Col2", "Col3"],
            &["Projection screen", "1,200", "15%"],
            &["Mounting hardware", "350", "12%"],
            &["Install labor", "900", "20%"],
        ]);
        let analysis = analyze_one(sheet);
        assert_eq!(analysis.suggested_roles.get("description"), Some(&"A".to_owned()));
        assert_eq!(analysis.suggested_roles.get("selling_price"), Some(&"B".to_owned()));
        assert_eq!(analysis.suggested_roles.get("margin_pct"), Some(&"C".to_owned()));
    }

    #[test]
    fn one_column_per_role() {
        let sheet = sheet_from_rows("Pricing", &[
            &["Description", "Price", "Price"],
            &["Widget", "100", "110"],
        ]);
        let analysis = analyze_one(sheet);
        assert_eq!(analysis.suggested_roles.get("selling_price"), Some(&"B".to_owned()));
        // The second price column must not also claim selling_price
        assert_ne!(analysis.suggested_roles.get("cost"), Some(&"B".to_owned()));
    }

    #[test]
    fn sample_rows_follow_detected_header() {
        let sheet = sheet_from_rows("Pricing", &[
            &["Description", "Price"],
            &["Widget", "100"],
            &["Gadget", "200"],
        ]);
        let analysis = analyze_one(sheet);
        assert_eq!(analysis.sample_rows.len(), 2);
        assert_eq!(analysis.sample_rows[0][0], "Widget");
    }
}
