//! The normalization entry point: fingerprint the uploaded workbook, then
//! either extract via the matching profile or hand back raw previews so a
//! human can confirm a mapping.

use crate::error::SheetMapError;
use crate::fingerprint::fingerprint;
use crate::profile::extract;
use crate::profile::ExtractedRow;
use crate::profile::ProfileStore;
use crate::profile::SaveProfileInput;
use crate::workbook::Workbook;
use log::debug;
use log::warn;
use serde::Serialize;

/// Rows surfaced per sheet in a mapping-required preview. `total_rows`
/// always reports the true extent.
const PREVIEW_ROW_CAP: usize = 50;

/// A capped raw view of one sheet, rendered as display text for the
/// mapping interface.
#[derive(Clone, Debug, Serialize)]
pub struct SheetPreview {
    pub sheet_name: String,
    pub rows: Vec<Vec<String>>,
    pub total_rows: usize,
}

/// Outcome of a normalization attempt.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NormalizeResult {
    /// A known layout: data extracted through its confirmed profile.
    Success {
        fingerprint: String,
        profile_id: String,
        profile_name: String,
        extracted_data: Vec<ExtractedRow>,
        sheet_name: String,
        header_row: Vec<String>,
    },
    /// An unknown layout: raw previews for the mapping interface.
    MappingRequired {
        fingerprint: String,
        raw_preview: Vec<SheetPreview>,
        file_name: Option<String>,
    },
}

/// Stateless front door over a profile store. The same bytes against the
/// same store state always produce the same result.
pub struct Normalizer<S: ProfileStore> {
    store: S,
}

impl<S: ProfileStore> Normalizer<S> {
    pub fn new(store: S) -> Self {
        Normalizer { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Normalizes an uploaded spreadsheet.
    ///
    /// Parses the bytes, fingerprints the layout, and looks the fingerprint
    /// up in the store. A hit extracts immediately; a miss returns capped
    /// previews of every sheet so the caller can collect a mapping.
    pub fn normalize(&self, bytes: &[u8], file_name: Option<&str>) -> Result<NormalizeResult, SheetMapError> {
        let workbook = Workbook::from_bytes(bytes)?;
        let key = fingerprint(&workbook);

        let profile = self
            .store
            .find_by_fingerprint(&key)
            .map_err(SheetMapError::Store)?;
        match profile {
            Some(profile) => {
                debug!("layout {key} matched profile '{}'", profile.id);
                let extraction = extract(&workbook, &profile)?;
                // Telemetry only; a failed bump never fails the import
                if let Err(error) = self.store.increment_usage(&profile.id) {
                    warn!("usage bump for profile '{}' failed: {error:#}", profile.id);
                }
                Ok(NormalizeResult::Success {
                    fingerprint: key,
                    profile_id: profile.id,
                    profile_name: profile.name,
                    sheet_name: extraction.sheet_name,
                    header_row: extraction.header_row,
                    extracted_data: extraction.rows,
                })
            }
            None => {
                debug!("layout {key} has no profile, requesting a mapping");
                Ok(NormalizeResult::MappingRequired {
                    fingerprint: key,
                    raw_preview: preview(&workbook),
                    file_name: file_name.map(str::to_owned),
                })
            }
        }
    }

    /// Persists a human-confirmed mapping for the layout of these bytes and
    /// extracts through it in one step. Subsequent [`Self::normalize`] calls
    /// for the same layout succeed without intervention.
    pub fn save_profile_and_extract(
        &self,
        bytes: &[u8],
        input: &SaveProfileInput,
    ) -> Result<NormalizeResult, SheetMapError> {
        let workbook = Workbook::from_bytes(bytes)?;
        let key = fingerprint(&workbook);
        let profile = self.store.create(&key, input).map_err(SheetMapError::Store)?;
        let extraction = extract(&workbook, &profile)?;
        Ok(NormalizeResult::Success {
            fingerprint: key,
            profile_id: profile.id,
            profile_name: profile.name,
            sheet_name: extraction.sheet_name,
            header_row: extraction.header_row,
            extracted_data: extraction.rows,
        })
    }
}

fn preview(workbook: &Workbook) -> Vec<SheetPreview> {
    workbook
        .sheets
        .iter()
        .map(|sheet| SheetPreview {
            sheet_name: sheet.name.to_owned(),
            rows: (0..sheet.row_count().min(PREVIEW_ROW_CAP))
                .map(|row| sheet.row_text(row))
                .collect(),
            total_rows: sheet.row_count(),
        })
        .collect()
}
