//! Mapping profiles: the persisted recipe for extracting rows from one
//! recurring layout, the store seam they live behind, and the extractor
//! that walks a sheet according to a confirmed mapping.

use crate::error::SheetMapError;
use crate::workbook::reference::column_letter_to_index;
use crate::workbook::CellValue;
use crate::workbook::Sheet;
use crate::workbook::Workbook;
use chrono::DateTime;
use chrono::Utc;
use log::warn;
use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Mutex;

/// Columns inspected when deciding a row is fully blank.
const BLANK_SCAN_COLUMNS: usize = 10;

/// Columns inspected for a data-end keyword. Narrower than the blank scan;
/// end markers ("Grand Total") live in the leading columns of real sheets.
/// TODO: revisit whether wide layouts ever put the marker past column E.
const KEYWORD_SCAN_COLUMNS: usize = 5;

/// Mapping from logical field name (description, selling_price, ...) to a
/// spreadsheet column letter. Fields are open-ended and optional.
pub type ColumnMapping = BTreeMap<String, String>;

/// Rule deciding where a table's data ends.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataEndStrategy {
    /// Stop at the first fully blank row within the scanned column window.
    BlankRow,
    /// Stop at, and exclude, the first row whose leading columns contain the
    /// keyword (case-insensitive substring).
    Keyword { keyword: String },
    /// Stop before the given 0-based row index.
    FixedRow { row: usize },
}

/// A persisted, human-confirmed extraction recipe for one exact layout.
/// Created once via the mapping interface, read on every import whose
/// fingerprint matches, never mutated by this crate.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MappingProfile {
    pub id: String,
    pub name: String,
    pub fingerprint: String,
    /// Target sheet name; None means the workbook's first sheet.
    pub sheet_name: Option<String>,
    /// 0-based index of the header row, kept for diagnostics.
    pub header_row: usize,
    /// 0-based index of the first data row.
    pub data_start_row: usize,
    pub mapping: ColumnMapping,
    pub data_end: DataEndStrategy,
    /// Usage telemetry, advisory only; lost updates are acceptable.
    pub usage_count: u64,
    pub last_used: Option<DateTime<Utc>>,
}

/// Human-confirmed mapping produced by the external mapping interface.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SaveProfileInput {
    pub name: String,
    pub sheet_name: Option<String>,
    pub header_row: usize,
    pub data_start_row: usize,
    pub mapping: ColumnMapping,
    pub data_end: DataEndStrategy,
}

/// The persistent profile store this crate requires from its environment.
///
/// At most one profile may exist per fingerprint; `create` must behave as
/// create-if-absent under concurrent first-time imports of the same layout.
/// That guarantee belongs to the store, not to this crate.
pub trait ProfileStore {
    fn find_by_fingerprint(&self, fingerprint: &str) -> anyhow::Result<Option<MappingProfile>>;

    fn create(&self, fingerprint: &str, input: &SaveProfileInput) -> anyhow::Result<MappingProfile>;

    /// Best-effort usage bump; callers treat failures as advisory.
    fn increment_usage(&self, id: &str) -> anyhow::Result<()>;
}

/// In-memory profile store for tests and single-process embedding.
#[derive(Default)]
pub struct MemoryProfileStore {
    profiles: Mutex<HashMap<String, MappingProfile>>,
    next_id: AtomicU64,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProfileStore for MemoryProfileStore {
    fn find_by_fingerprint(&self, fingerprint: &str) -> anyhow::Result<Option<MappingProfile>> {
        let profiles = self.profiles.lock().expect("Profile store lock");
        Ok(profiles.get(fingerprint).cloned())
    }

    fn create(&self, fingerprint: &str, input: &SaveProfileInput) -> anyhow::Result<MappingProfile> {
        let mut profiles = self.profiles.lock().expect("Profile store lock");
        // Create-if-absent: a concurrent first import of the same layout
        // must not produce a second profile for the fingerprint
        if let Some(existing) = profiles.get(fingerprint) {
            return Ok(existing.clone());
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let profile = MappingProfile {
            id: format!("profile-{id}"),
            name: input.name.to_owned(),
            fingerprint: fingerprint.to_owned(),
            sheet_name: input.sheet_name.to_owned(),
            header_row: input.header_row,
            data_start_row: input.data_start_row,
            mapping: input.mapping.to_owned(),
            data_end: input.data_end.to_owned(),
            usage_count: 0,
            last_used: None,
        };
        profiles.insert(fingerprint.to_owned(), profile.clone());
        Ok(profile)
    }

    fn increment_usage(&self, id: &str) -> anyhow::Result<()> {
        let mut profiles = self.profiles.lock().expect("Profile store lock");
        for profile in profiles.values_mut() {
            if profile.id == id {
                profile.usage_count += 1;
                profile.last_used = Some(Utc::now());
            }
        }
        Ok(())
    }
}

/// One extracted record: the source row index and the resolved value of
/// every mapped field that was not blank.
#[derive(Clone, Debug, Serialize)]
pub struct ExtractedRow {
    pub row: usize,
    pub values: BTreeMap<String, CellValue>,
}

/// Result of a profile-based extraction, with the resolved sheet name and
/// header row text for diagnostics.
#[derive(Clone, Debug, Serialize)]
pub struct Extraction {
    pub rows: Vec<ExtractedRow>,
    pub sheet_name: String,
    pub header_row: Vec<String>,
}

/// Per-row outcome of the shared scanning state machine used by the
/// extractor and the section splitter.
#[derive(Copy, Clone, Debug, PartialEq)]
pub(crate) enum RowDecision {
    Keep,
    /// Terminate; the current row is not data (keyword marker).
    StopBefore,
    /// Terminate; the current row closed the scan (blank terminator).
    StopAfter,
}

/// Extracts field-keyed rows from a workbook according to a profile.
///
/// Fails with [`SheetMapError::MissingSheet`] when the profile's target
/// sheet is absent from this file. Rows whose mapped values are all blank
/// are structural gaps and dropped silently.
pub fn extract(workbook: &Workbook, profile: &MappingProfile) -> Result<Extraction, SheetMapError> {
    let sheet = resolve_sheet(workbook, profile)?;
    let header_row = sheet.row_text(profile.header_row);

    let columns: Vec<(String, usize)> = profile
        .mapping
        .iter()
        .filter_map(|(field, letter)| match column_letter_to_index(letter) {
            Some(index) => Some((field.to_owned(), index)),
            None => {
                warn!("profile '{}': field '{field}' has unparseable column '{letter}'", profile.id);
                None
            }
        })
        .collect();

    let end_row = match profile.data_end {
        DataEndStrategy::FixedRow { row } => row.min(sheet.row_count()),
        _ => sheet.row_count(),
    };

    let mut rows = Vec::<ExtractedRow>::new();
    for row in profile.data_start_row..end_row {
        match scan_row(sheet, row, &profile.data_end) {
            RowDecision::Keep => (),
            RowDecision::StopBefore | RowDecision::StopAfter => break,
        }
        let mut values = BTreeMap::<String, CellValue>::new();
        for (field, col) in &columns {
            if let Some(value) = sheet.resolve(row, *col) {
                if !value.is_blank() {
                    values.insert(field.to_owned(), value);
                }
            }
        }
        if !values.is_empty() {
            rows.push(ExtractedRow { row, values });
        }
    }

    Ok(Extraction {
        rows,
        sheet_name: sheet.name.to_owned(),
        header_row,
    })
}

/// Resolves the profile's target sheet: a named sheet, or the first sheet
/// when the profile does not pin one.
fn resolve_sheet<'a>(workbook: &'a Workbook, profile: &MappingProfile) -> Result<&'a Sheet, SheetMapError> {
    match &profile.sheet_name {
        Some(name) => workbook
            .sheet(name)
            .ok_or_else(|| SheetMapError::MissingSheet(name.to_owned())),
        None => workbook
            .first_sheet()
            .ok_or_else(|| SheetMapError::MissingSheet("first sheet".to_owned())),
    }
}

/// Applies the data-end strategy to one row.
fn scan_row(sheet: &Sheet, row: usize, data_end: &DataEndStrategy) -> RowDecision {
    match data_end {
        DataEndStrategy::BlankRow if sheet.is_row_blank(row, BLANK_SCAN_COLUMNS) => RowDecision::StopAfter,
        DataEndStrategy::Keyword { keyword } => {
            let keyword = keyword.to_lowercase();
            let hit = (0..KEYWORD_SCAN_COLUMNS)
                .any(|col| sheet.resolve_text(row, col).to_lowercase().contains(&keyword));
            if hit {
                RowDecision::StopBefore
            } else {
                RowDecision::Keep
            }
        }
        _ => RowDecision::Keep,
    }
}
