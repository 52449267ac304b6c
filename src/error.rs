use thiserror::Error;

/// Main error type for the crate.
/// Aggregates errors from the standard library, dependencies, and internal
/// modules. Structural failures (unreadable bytes, a profile naming a sheet
/// the file does not contain) surface here; row-level anomalies never do.
#[derive(Error, Debug)]
pub enum SheetMapError {
    // Standard library errors
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    ParseInt(#[from] std::num::ParseIntError),

    #[error("{0}")]
    ParseFloat(#[from] std::num::ParseFloatError),

    #[error("{0}")]
    StringEncoding(#[from] std::str::Utf8Error),

    // Third-party library errors
    #[error("{0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("{0}")]
    Xml(#[from] quick_xml::Error),

    #[error("{0}")]
    XmlEncoding(#[from] quick_xml::encoding::EncodingError),

    #[error("{0}")]
    XmlAttribute(#[from] quick_xml::events::attributes::AttrError),

    // Internal module errors
    #[error("{0}")]
    XmlHelper(#[from] crate::helpers::xml::XmlError),

    #[error("{0}")]
    Workbook(#[from] crate::workbook::WorkbookError),

    /// A mapping profile names a sheet absent from the current file.
    /// Callers should fall back to the mapping-required path.
    #[error("Sheet '{0}' not found in workbook")]
    MissingSheet(String),

    /// The injected profile store failed a lookup or create.
    /// Usage-telemetry failures are logged, never surfaced here.
    #[error("Profile store error: {0}")]
    Store(anyhow::Error),
}

impl SheetMapError {
    /// True when the error means the input bytes were not a readable
    /// workbook, as opposed to a profile or store problem.
    pub fn is_malformed_workbook(&self) -> bool {
        !matches!(self, Self::MissingSheet(_) | Self::Store(_))
    }
}
