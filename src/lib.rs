//! # SheetMap
//!
//! Normalizes inconsistently laid-out pricing spreadsheets into structured
//! records. Features:
//!
//! - Parse `.xlsx`/`.xlsm` workbooks from bytes, with merged-cell resolution
//!   and shared-string, date-format, and formula handling.
//! - Fingerprint a workbook's layout so recurring formats are recognized
//!   across uploads regardless of the figures they carry.
//! - Extract field-keyed rows through human-confirmed mapping profiles,
//!   persisted behind a pluggable store.
//! - Score and analyze sheets heuristically when no profile exists: header
//!   detection, column classification, and field-role suggestions.
//! - Split confirmed grids into named sections and assemble pricing
//!   documents with line items, alternates, and subtotals.

mod error;
mod helpers;

pub mod fingerprint;
pub mod heuristics;
pub mod normalize;
pub mod profile;
pub mod sections;
pub mod workbook;

pub use error::SheetMapError;
pub use helpers::xml::XmlError;
pub use fingerprint::fingerprint as fingerprint_workbook;
pub use heuristics::analyze_sheets;
pub use heuristics::SheetAnalysis;
pub use normalize::NormalizeResult;
pub use normalize::Normalizer;
pub use normalize::SheetPreview;
pub use profile::ColumnMapping;
pub use profile::DataEndStrategy;
pub use profile::ExtractedRow;
pub use profile::Extraction;
pub use profile::MappingProfile;
pub use profile::MemoryProfileStore;
pub use profile::ProfileStore;
pub use profile::SaveProfileInput;
pub use sections::build_pricing_document;
pub use sections::build_pricing_document_from_grid;
pub use sections::parse_money;
pub use sections::split_sections;
pub use sections::Alternate;
pub use sections::LineItem;
pub use sections::PricingDocument;
pub use sections::PricingTable;
pub use sections::Section;
pub use sections::SplitMode;
pub use workbook::reference::column_index_to_letter;
pub use workbook::reference::column_letter_to_index;
pub use workbook::Cell;
pub use workbook::CellValue;
pub use workbook::MergeRange;
pub use workbook::Sheet;
pub use workbook::Workbook;
pub use workbook::WorkbookError;
