//! OOXML (.xlsx/.xlsm) reader: workbook structure, shared strings, number
//! formats, worksheet cells, and merge ranges, parsed from in-memory bytes.

use crate::error::SheetMapError;
use crate::helpers::xml::XmlNodeHelper;
use crate::helpers::xml::XmlReader;
use crate::helpers::xml::XmlTextContextHelper;
use crate::helpers::zip::ZipHelper;
use crate::match_xml_events;
use crate::workbook::cell::CellType;
use crate::workbook::reference::range_to_index;
use crate::workbook::reference::reference_to_index;
use crate::workbook::Cell;
use crate::workbook::CellValue;
use crate::workbook::MergeRange;
use crate::workbook::Sheet;
use crate::workbook::Workbook;
use crate::workbook::WorkbookError;
use log::warn;
use quick_xml::events::Event;
use quick_xml::name::QName;
use std::borrow::Cow;
use std::collections::HashMap;
use std::io::BufReader;
use std::io::Cursor;
use std::io::Read;
use std::io::Seek;
use zip::read::ZipFile;
use zip::ZipArchive;

// XML tag names for the parts of an XLSX archive we read
const TAG_RELATIONSHIP: &[u8] = b"Relationship"; // Workbook relationship entry
const TAG_SHEET: QName = QName(b"sheet");        // Worksheet definition
const TAG_WORKBOOK_PROPERTIES: QName = QName(b"workbookPr"); // Workbook properties (date system)
const TAG_SHARED_STRING_ITEM: QName = QName(b"si"); // Shared string table item
const TAG_PHONETIC_TEXT: QName = QName(b"rPh");  // Phonetic annotation inside strings
const TAG_TEXT: QName = QName(b"t");             // Text content within strings
const TAG_CUSTOM_FORMATS: QName = QName(b"numFmts"); // Custom number formats container
const TAG_CUSTOM_FORMAT: QName = QName(b"numFmt");   // Individual custom number format
const TAG_FORMAT_INDEXES: QName = QName(b"cellXfs"); // Cell format indexes container
const TAG_FORMAT_INDEX: QName = QName(b"xf");    // Individual cell format index
const TAG_ROW: QName = QName(b"row");            // Row in worksheet
const TAG_CELL: QName = QName(b"c");             // Cell in worksheet
const TAG_FORMULA: QName = QName(b"f");          // Cell formula
const TAG_VALUE: QName = QName(b"v");            // Cached cell value
const TAG_INLINE_STRING: QName = QName(b"is");   // Inline string value
const TAG_MERGE_CELL: QName = QName(b"mergeCell"); // Merge range declaration

/// Parses a workbook from raw .xlsx/.xlsm bytes.
pub(crate) fn read_workbook(bytes: &[u8]) -> Result<Workbook, SheetMapError> {
    let mut zip = ZipArchive::new(Cursor::new(bytes))?;
    let (sheets, is_1904) = load_workbook(&mut zip)?;
    let shared_strings = load_shared_strings(&mut zip)?;
    let number_formats = load_number_formats(&mut zip, is_1904)?;

    let mut workbook = Workbook::default();
    for (index, (sheet_name, zip_path)) in sheets.iter().enumerate() {
        let sheet = read_sheet(&mut zip, sheet_name, zip_path, index, &shared_strings, &number_formats)?;
        workbook.sheets.push(sheet);
    }
    Ok(workbook)
}

/// Loads worksheet names, their zip paths, and the workbook's date system.
///
/// Worksheet order follows the workbook.xml sheet list. A workbook with no
/// sheet entries parses to an empty list; a workbook.xml that is missing
/// entirely is a malformed file.
fn load_workbook<RS: Read + Seek>(
    zip: &mut ZipArchive<RS>,
) -> Result<(Vec<(String, String)>, bool), SheetMapError> {
    let relationships = load_relationships(zip, "xl/_rels/workbook.xml.rels")?;
    let mut reader = zip.xml_reader("xl/workbook.xml")?
        .ok_or_else(|| WorkbookError::MissingPart("xl/workbook.xml".to_string()))?;
    let mut sheets: Vec<(String, String)> = Vec::new();
    let mut is_1904 = false;
    match_xml_events!(reader => {
        Event::Start(event) if event.name() == TAG_SHEET => {
            let mut name = None::<Cow<str>>;
            let mut id = None::<Cow<str>>;
            for result in event.attributes() {
                let attribute = result?;
                let key = attribute.key.local_name();
                if key.as_ref() == b"name" {
                    name = Some(attribute.unescape_value()?);
                } else if key.as_ref() == b"id" {
                    id = Some(attribute.unescape_value()?);
                }
            }
            if let Some(name) = name {
                let path = id
                    .and_then(|id| relationships.get(id.as_ref()).cloned())
                    .unwrap_or_else(|| format!("xl/worksheets/sheet{}.xml", sheets.len() + 1));
                sheets.push((name.to_string(), path));
            }
        }
        Event::Start(event) if event.name() == TAG_WORKBOOK_PROPERTIES => {
            is_1904 = event.get_attribute_value("date1904")?
                .map(|value| value.eq("1") || value.eq("true"))
                .unwrap_or(false);
        }
    });
    Ok((sheets, is_1904))
}

/// Loads worksheet relationships, mapping relationship ids to zip paths.
/// A missing relationships part yields an empty map; sheet entries then fall
/// back to conventional worksheet paths.
fn load_relationships<RS: Read + Seek>(
    zip: &mut ZipArchive<RS>,
    path: &str,
) -> Result<HashMap<String, String>, SheetMapError> {
    let mut relationships: HashMap<String, String> = HashMap::new();
    let mut reader = match zip.xml_reader(path)? {
        Some(reader) => reader,
        None => return Ok(relationships),
    };
    match_xml_events!(reader => {
        Event::Start(event) if event.local_name().as_ref() == TAG_RELATIONSHIP => {
            let id = event.get_attribute_value("Id")?;
            let kind = event.get_attribute_value("Type")?;
            let target = event.get_attribute_value("Target")?;
            // Only worksheet relationships matter here
            if kind.map(|it| it.ends_with("/worksheet")).unwrap_or(true) {
                if let Some((id, target)) = id.zip(target) {
                    relationships.insert(id.to_string(), to_zip_path(target));
                }
            }
        }
    });
    Ok(relationships)
}

/// Normalizes a relationship target to a path inside the archive.
fn to_zip_path(path: Cow<'_, str>) -> String {
    if path.starts_with("/xl/") {
        path[1..].to_string()
    } else if path.starts_with("xl/") {
        path.to_string()
    } else {
        format!("xl/{path}")
    }
}

/// Loads the shared string table. Absent when the workbook has no strings.
fn load_shared_strings<RS: Read + Seek>(
    zip: &mut ZipArchive<RS>,
) -> Result<Vec<String>, SheetMapError> {
    let mut shared_strings = Vec::<String>::new();
    let mut reader = match zip.xml_reader("xl/sharedStrings.xml")? {
        Some(reader) => reader,
        None => return Ok(shared_strings),
    };
    match_xml_events!(reader => {
        Event::Start(event) if event.name() == TAG_SHARED_STRING_ITEM => {
            let string = read_string_value(&mut reader, TAG_SHARED_STRING_ITEM, false)?;
            shared_strings.push(string);
        }
    });
    Ok(shared_strings)
}

/// Loads number formats from styles.xml, producing a cell type per style
/// index. Only the date/time classification matters for resolution; every
/// other format stays a plain number.
fn load_number_formats<RS: Read + Seek>(
    zip: &mut ZipArchive<RS>,
    is_1904: bool,
) -> Result<Vec<CellType>, SheetMapError> {
    let mut reader = match zip.xml_reader("xl/styles.xml")? {
        Some(reader) => reader,
        None => return Ok(Vec::new()),
    };

    let mut custom_formats_context = false;
    let mut custom_formats = HashMap::<String, CellType>::new();
    let mut format_indexes_context = false;
    let mut format_indexes = Vec::<String>::new();

    match_xml_events!(reader => {
        Event::Start(event) if !custom_formats_context && event.name() == TAG_CUSTOM_FORMATS => {
            custom_formats_context = true;
        }
        Event::End(event) if custom_formats_context && event.name() == TAG_CUSTOM_FORMATS => {
            custom_formats_context = false;
        }
        Event::Start(event) if custom_formats_context && event.name() == TAG_CUSTOM_FORMAT => {
            let id = event.get_attribute_value("numFmtId")?;
            let format = event.get_attribute_value("formatCode")?;
            if let Some((id, format)) = id.zip(format) {
                let kind = CellType::parse_custom_number_format(&format, is_1904);
                custom_formats.insert(id.to_string(), kind);
            }
        }

        Event::Start(event) if !format_indexes_context && event.name() == TAG_FORMAT_INDEXES => {
            format_indexes_context = true;
        }
        Event::End(event) if format_indexes_context && event.name() == TAG_FORMAT_INDEXES => {
            format_indexes_context = false;
        }
        Event::Start(event) if format_indexes_context && event.name() == TAG_FORMAT_INDEX => {
            if let Some(id) = event.get_attribute_value("numFmtId")? {
                format_indexes.push(id.to_string());
            }
        }
    });

    Ok(format_indexes
        .iter()
        .map(|id| {
            custom_formats
                .get(id)
                .copied()
                .or_else(|| CellType::parse_builtin_number_format_id(id, is_1904))
                .unwrap_or(CellType::Number)
        })
        .collect())
}

/// Reads one worksheet part into a [`Sheet`]: cells with cached values and
/// formulas, inline and shared strings, and merge ranges.
fn read_sheet<RS: Read + Seek>(
    zip: &mut ZipArchive<RS>,
    sheet_name: &str,
    zip_path: &str,
    sheet_index: usize,
    shared_strings: &[String],
    number_formats: &[CellType],
) -> Result<Sheet, SheetMapError> {
    let mut sheet = Sheet::new(sheet_name);
    let mut reader = match zip.xml_reader(zip_path)? {
        Some(reader) => reader,
        // Tolerate a dangling sheet entry except for the first sheet, which
        // every real producer writes
        None if sheet_index > 0 => return Ok(sheet),
        None => return Err(WorkbookError::MissingPart(zip_path.to_string()).into()),
    };

    let mut row_count = 0usize;
    let mut col_count = 0usize;
    let mut row = 0usize;
    let mut col = 0usize;
    let mut kind = CellType::default();
    let mut value = String::new();
    let mut formula = None::<String>;
    match_xml_events!(reader => {
        Event::End(event) if event.name() == TAG_ROW => {
            row_count += 1;
            col_count = 0;
        }
        Event::Start(event) if event.name() == TAG_CELL => {
            (row, col) = event.get_attribute_value("r")?
                .and_then(|reference| reference_to_index(&reference))
                .unwrap_or((row_count, col_count));
            col_count += 1;
            value.clear();
            formula = None;
            kind = event.get_attribute_value("t")?.map(|t| {
                match t.as_ref() {
                    "inlineStr" | "str" => CellType::InlineString,
                    "s" => CellType::SharedString,
                    "d" => CellType::IsoDateTime,
                    "b" => CellType::Boolean,
                    "e" => CellType::Error,
                    _ => CellType::Number,
                }
            }).unwrap_or(CellType::Number);
            if let Some(format_id) = event.get_attribute_value("s")? {
                if kind == CellType::Number && !format_id.is_empty() {
                    let index = format_id.parse::<usize>()?;
                    kind = number_formats.get(index).copied().unwrap_or(CellType::Number);
                }
            }
        }
        Event::Start(event) if event.name() == TAG_FORMULA => {
            formula = Some(read_string_value(&mut reader, TAG_FORMULA, true)?);
        }
        Event::Start(event) if event.name() == TAG_INLINE_STRING => {
            value = read_string_value(&mut reader, TAG_INLINE_STRING, false)?;
        }
        Event::Start(event) if event.name() == TAG_VALUE => {
            value = read_string_value(&mut reader, TAG_VALUE, true)?;
        }
        Event::End(event) if event.name() == TAG_CELL => {
            let (resolved, formatted) = resolve_cell(kind, &value, shared_strings);
            let formula = formula.take();
            if resolved.is_some() || formatted.is_some() || formula.is_some() {
                sheet.insert(row, col, Cell { value: resolved, formula, formatted });
            }
            value.clear();
            kind = CellType::default();
        }
        Event::Start(event) if event.name() == TAG_MERGE_CELL => {
            if let Some(reference) = event.get_attribute_value("ref")? {
                match range_to_index(&reference) {
                    Some(((row_start, col_start), (row_end, col_end))) => {
                        sheet.add_merge(MergeRange { row_start, row_end, col_start, col_end });
                    }
                    None => warn!("sheet '{sheet_name}': skipping unparseable merge range '{reference}'"),
                }
            }
        }
    });
    Ok(sheet)
}

/// Resolves a raw (type, text) pair to the cell's value and formatted
/// fallback, going through the shared string table where needed.
fn resolve_cell(
    kind: CellType,
    value: &str,
    shared_strings: &[String],
) -> (Option<CellValue>, Option<String>) {
    if value.is_empty() {
        return (None, None);
    }
    if kind == CellType::SharedString {
        let text = value
            .parse::<usize>()
            .ok()
            .and_then(|index| shared_strings.get(index))
            .cloned()
            .unwrap_or_else(|| value.to_owned());
        return (Some(CellValue::Text(text)), None);
    }
    kind.resolve_value(value)
}

/// Reads string content until the given end tag, skipping phonetic
/// annotations and resolving entities and character references.
fn read_string_value<RS: Read + Seek>(
    reader: &mut XmlReader<BufReader<ZipFile<'_, RS>>>,
    end_tag: QName,
    is_text_content: bool,
) -> Result<String, SheetMapError> {
    let mut is_phonetic_text = false;
    let mut is_text = is_text_content;
    let mut text = String::new();
    match_xml_events!(reader => {
        Event::End(event) if event.name() == end_tag => break,
        Event::Start(event) if event.name() == TAG_PHONETIC_TEXT => is_phonetic_text = true,
        Event::End(event) if event.name() == TAG_PHONETIC_TEXT => is_phonetic_text = false,
        Event::Start(event) if !is_phonetic_text && event.name() == TAG_TEXT => is_text = true,
        Event::End(event) if is_text && event.name() == TAG_TEXT => is_text = false,
        Event::Text(event) if is_text => text.push_str(&event.xml_content()?),
        Event::CData(event) if is_text => text.push_str(&event.xml_content()?),
        Event::GeneralRef(event) if is_text => text.push_bytes_ref(&event)?,
    });
    Ok(text)
}
