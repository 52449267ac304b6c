//! Section splitting and pricing document assembly for the heuristic path.
//!
//! A flat row sequence is partitioned into named sections, either on blank
//! row gaps or on detected section-label rows, then assembled into a
//! provenance-tagged document of tables, line items, and alternates.

use crate::profile::ColumnMapping;
use crate::profile::RowDecision;
use crate::workbook::reference::column_letter_to_index;
use log::warn;
use serde::Serialize;

/// Markers whose presence in a description makes the row a priced
/// add/deduct option rather than a base line item.
const ALTERNATE_MARKERS: &[&str] = &["alternate", "option", "add to cost", "deduct"];

/// Markers whose presence makes the row a total/subtotal line, never data.
const TOTAL_MARKERS: &[&str] = &["total", "subtotal", "bid form"];

/// How the splitter recognizes section boundaries.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum SplitMode {
    /// Fully blank rows close the current section.
    BlankRow,
    /// Label rows in the description column open a new section.
    SectionHeader,
}

/// A named, contiguous run of rows within a larger sheet.
#[derive(Clone, Debug, Serialize)]
pub struct Section {
    pub name: String,
    /// 0-based index of the section's first row (its label row when named).
    pub start_row: usize,
    /// Row that supplied the section's name, excluded from data.
    pub name_row: Option<usize>,
    /// Indices of the section's data rows within the input grid.
    pub rows: Vec<usize>,
}

/// Partitions a row grid into sections. Total over the scanned range:
/// every row that is not a blank terminator or a recognized label row lands
/// in exactly one section.
pub fn split_sections(grid: &[Vec<String>], mode: SplitMode, description_col: usize) -> Vec<Section> {
    match mode {
        SplitMode::BlankRow => split_on_blank_rows(grid),
        SplitMode::SectionHeader => split_on_label_rows(grid, description_col),
    }
}

fn split_on_blank_rows(grid: &[Vec<String>]) -> Vec<Section> {
    let mut sections = Vec::<Section>::new();
    let mut current = None::<Section>;
    for (row, cells) in grid.iter().enumerate() {
        let decision = if row_is_blank(cells) {
            RowDecision::StopAfter
        } else {
            RowDecision::Keep
        };
        if decision == RowDecision::StopAfter {
            // A blank row closes the section and opens the next
            if let Some(section) = current.take() {
                sections.push(section);
            }
            continue;
        }
        match &mut current {
            None => {
                let mut section = Section {
                    name: format!("Section {}", sections.len() + 1),
                    start_row: row,
                    name_row: None,
                    rows: Vec::new(),
                };
                // A lone value opening a section is its name, not data
                if non_blank_count(cells) == 1 {
                    section.name = first_non_blank(cells).unwrap_or_default();
                    section.name_row = Some(row);
                } else {
                    section.rows.push(row);
                }
                current = Some(section);
            }
            Some(section) => section.rows.push(row),
        }
    }
    if let Some(section) = current.take() {
        sections.push(section);
    }
    sections
}

fn split_on_label_rows(grid: &[Vec<String>], description_col: usize) -> Vec<Section> {
    let mut sections = Vec::<Section>::new();
    let mut current = None::<Section>;
    for (row, cells) in grid.iter().enumerate() {
        if row_is_blank(cells) {
            continue;
        }
        if let Some(label) = section_label(cells, description_col) {
            if let Some(section) = current.take() {
                sections.push(section);
            }
            current = Some(Section {
                name: label,
                start_row: row,
                name_row: Some(row),
                rows: Vec::new(),
            });
            continue;
        }
        current
            .get_or_insert_with(|| Section {
                name: format!("Section {}", sections.len() + 1),
                start_row: row,
                name_row: None,
                rows: Vec::new(),
            })
            .rows
            .push(row);
    }
    if let Some(section) = current.take() {
        sections.push(section);
    }
    sections
}

/// Recognizes a section-label row: the description cell is the row's only
/// content and reads like a heading, either fully upper-case (longer than
/// three characters) or ending with a colon.
///
/// Known limitation: a genuine data row that happens to be capitalized and
/// carries no price will be read as a label.
fn section_label(cells: &[String], description_col: usize) -> Option<String> {
    let text = cells.get(description_col).map(|text| text.trim()).unwrap_or("");
    if text.is_empty() {
        return None;
    }
    let alone = cells
        .iter()
        .enumerate()
        .all(|(col, cell)| col == description_col || cell.trim().is_empty());
    if !alone {
        return None;
    }
    let upper_case = text.len() > 3
        && text.chars().any(|character| character.is_alphabetic())
        && !text.chars().any(|character| character.is_lowercase());
    if upper_case {
        Some(text.to_owned())
    } else if let Some(stripped) = text.strip_suffix(':') {
        Some(stripped.trim().to_owned())
    } else {
        None
    }
}

fn row_is_blank(cells: &[String]) -> bool {
    cells.iter().all(|cell| cell.trim().is_empty())
}

fn non_blank_count(cells: &[String]) -> usize {
    cells.iter().filter(|cell| !cell.trim().is_empty()).count()
}

fn first_non_blank(cells: &[String]) -> Option<String> {
    cells
        .iter()
        .map(|cell| cell.trim())
        .find(|cell| !cell.is_empty())
        .map(str::to_owned)
}

/// A base line item: a description priced at face value.
#[derive(Clone, Debug, Serialize)]
pub struct LineItem {
    pub description: String,
    pub price: f64,
    pub source_row: usize,
}

/// A priced add/deduct option, carried as a signed delta besides the base
/// items.
#[derive(Clone, Debug, Serialize)]
pub struct Alternate {
    pub description: String,
    pub price_delta: f64,
    pub source_row: usize,
}

/// One section's worth of extracted pricing rows.
#[derive(Clone, Debug, Serialize)]
pub struct PricingTable {
    pub name: String,
    pub items: Vec<LineItem>,
    pub alternates: Vec<Alternate>,
    pub subtotal: f64,
    pub currency: String,
    /// Source rows that contributed to this table, in input order.
    pub source_rows: Vec<usize>,
}

/// The assembled document: tables plus import metadata.
#[derive(Clone, Debug, Serialize)]
pub struct PricingDocument {
    pub file_name: Option<String>,
    pub currency: String,
    pub tables: Vec<PricingTable>,
    pub total: f64,
    pub item_count: usize,
    pub warnings: Vec<String>,
}

/// Parses a money-like string: currency symbols, comma grouping, and
/// percent signs are stripped; parenthesized amounts are negative; blank or
/// unparseable input is 0.
pub fn parse_money(text: &str) -> f64 {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    let negative = trimmed.starts_with('(') && trimmed.ends_with(')');
    let cleaned: String = trimmed
        .chars()
        .filter(|character| character.is_ascii_digit() || *character == '.' || *character == '-')
        .collect();
    match cleaned.parse::<f64>() {
        Ok(value) if negative => -value.abs(),
        Ok(value) => value,
        Err(_) => {
            warn!("unparseable amount '{trimmed}', defaulting to 0");
            0.0
        }
    }
}

/// Assembles sections into a pricing document. Sections with no line items
/// are dropped; when nothing survives but rows exist, a single fallback
/// table over all rows is built instead.
pub fn build_pricing_document(
    grid: &[Vec<String>],
    sections: &[Section],
    description_col: usize,
    price_col: usize,
    currency: &str,
    file_name: Option<&str>,
) -> PricingDocument {
    let mut warnings = Vec::<String>::new();
    let mut tables: Vec<PricingTable> = sections
        .iter()
        .filter_map(|section| build_table(grid, section, description_col, price_col, currency, &mut warnings))
        .collect();

    if tables.is_empty() && grid.iter().any(|cells| !row_is_blank(cells)) {
        warnings.push("no section produced line items; using a fallback table over all rows".to_owned());
        let fallback = Section {
            name: "All Items".to_owned(),
            start_row: 0,
            name_row: None,
            rows: (0..grid.len()).filter(|row| !row_is_blank(&grid[*row])).collect(),
        };
        if let Some(table) = build_table(grid, &fallback, description_col, price_col, currency, &mut warnings) {
            tables.push(table);
        }
    }

    let total = tables.iter().map(|table| table.subtotal).sum();
    let item_count = tables.iter().map(|table| table.items.len()).sum();
    PricingDocument {
        file_name: file_name.map(str::to_owned),
        currency: currency.to_owned(),
        tables,
        total,
        item_count,
        warnings,
    }
}

/// Builds one table from a section, or None when it holds no line items.
fn build_table(
    grid: &[Vec<String>],
    section: &Section,
    description_col: usize,
    price_col: usize,
    currency: &str,
    warnings: &mut Vec<String>,
) -> Option<PricingTable> {
    let mut items = Vec::<LineItem>::new();
    let mut alternates = Vec::<Alternate>::new();
    let mut source_rows = Vec::<usize>::new();
    let mut subtotal_override = None::<f64>;

    for &row in &section.rows {
        let cells = &grid[row];
        let description = cells.get(description_col).map(|text| text.trim()).unwrap_or("");
        let price_text = cells.get(price_col).map(|text| text.trim()).unwrap_or("");
        if description.is_empty() {
            continue;
        }
        let lower = description.to_lowercase();

        if ALTERNATE_MARKERS.iter().any(|marker| lower.contains(marker)) {
            alternates.push(Alternate {
                description: description.to_owned(),
                price_delta: parse_money(price_text),
                source_row: row,
            });
            source_rows.push(row);
        } else if TOTAL_MARKERS.iter().any(|marker| lower.contains(marker)) {
            // A stated total overrides the computed subtotal only when it is
            // positive and there are items for it to describe
            let value = parse_money(price_text);
            if value > 0.0 && !items.is_empty() {
                subtotal_override = Some(value);
            }
        } else {
            if price_text.is_empty() {
                warnings.push(format!("row {}: item '{description}' has no price", row + 1));
            }
            items.push(LineItem {
                description: description.to_owned(),
                price: parse_money(price_text),
                source_row: row,
            });
            source_rows.push(row);
        }
    }

    if items.is_empty() {
        return None;
    }
    let subtotal = subtotal_override.unwrap_or_else(|| items.iter().map(|item| item.price).sum());
    Some(PricingTable {
        name: section.name.to_owned(),
        items,
        alternates,
        subtotal,
        currency: currency.to_owned(),
        source_rows,
    })
}

/// Convenience entry for the heuristic path: splits a confirmed grid on
/// section labels and assembles the document in one call. The mapping uses
/// the same field names as profile extraction; description defaults to the
/// first column and selling_price to the second when unmapped.
pub fn build_pricing_document_from_grid(
    grid: &[Vec<String>],
    mapping: &ColumnMapping,
    file_name: Option<&str>,
) -> PricingDocument {
    let description_col = mapped_column(mapping, "description").unwrap_or(0);
    let price_col = mapped_column(mapping, "selling_price").unwrap_or(1);
    let sections = split_sections(grid, SplitMode::SectionHeader, description_col);
    build_pricing_document(grid, &sections, description_col, price_col, "USD", file_name)
}

fn mapped_column(mapping: &ColumnMapping, field: &str) -> Option<usize> {
    mapping.get(field).and_then(|letter| column_letter_to_index(letter))
}
