//! End-to-end tests over the public surface: synthesized .xlsx archives go
//! through parsing, fingerprinting, profile storage, and extraction.

use sheetmap::column_index_to_letter;
use sheetmap::ColumnMapping;
use sheetmap::DataEndStrategy;
use sheetmap::MemoryProfileStore;
use sheetmap::NormalizeResult;
use sheetmap::Normalizer;
use sheetmap::ProfileStore;
use sheetmap::SaveProfileInput;
use sheetmap::SheetMapError;
use std::io::Cursor;
use std::io::Write;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// Renders worksheet XML from text rows. Cells that parse as numbers become
/// number cells with cached values, everything else inline strings; empty
/// strings leave a gap.
fn sheet_xml(rows: &[&[&str]], merges: &[&str]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
    );
    for (row, cells) in rows.iter().enumerate() {
        xml.push_str(&format!(r#"<row r="{}">"#, row + 1));
        for (col, text) in cells.iter().enumerate() {
            if text.is_empty() {
                continue;
            }
            let reference = format!("{}{}", column_index_to_letter(col), row + 1);
            if text.parse::<f64>().is_ok() {
                xml.push_str(&format!(r#"<c r="{reference}"><v>{text}</v></c>"#));
            } else {
                xml.push_str(&format!(
                    r#"<c r="{reference}" t="inlineStr"><is><t>{text}</t></is></c>"#
                ));
            }
        }
        xml.push_str("</row>");
    }
    xml.push_str("</sheetData>");
    if !merges.is_empty() {
        xml.push_str(&format!(r#"<mergeCells count="{}">"#, merges.len()));
        for merge in merges {
            xml.push_str(&format!(r#"<mergeCell ref="{merge}"/>"#));
        }
        xml.push_str("</mergeCells>");
    }
    xml.push_str("</worksheet>");
    xml
}

/// Assembles a minimal .xlsx archive from (sheet name, worksheet XML) pairs.
fn xlsx(sheets: &[(&str, String)]) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();

    let mut workbook = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets>"#,
    );
    let mut relationships = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    );
    for (index, (name, _)) in sheets.iter().enumerate() {
        let number = index + 1;
        workbook.push_str(&format!(
            r#"<sheet name="{name}" sheetId="{number}" r:id="rId{number}"/>"#
        ));
        relationships.push_str(&format!(
            r#"<Relationship Id="rId{number}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet{number}.xml"/>"#
        ));
    }
    workbook.push_str("</sheets></workbook>");
    relationships.push_str("</Relationships>");

    zip.start_file("xl/workbook.xml", options).unwrap();
    zip.write_all(workbook.as_bytes()).unwrap();
    zip.start_file("xl/_rels/workbook.xml.rels", options).unwrap();
    zip.write_all(relationships.as_bytes()).unwrap();
    for (index, (_, xml)) in sheets.iter().enumerate() {
        zip.start_file(format!("xl/worksheets/sheet{}.xml", index + 1), options)
            .unwrap();
        zip.write_all(xml.as_bytes()).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

fn pricing_file(price: &str) -> Vec<u8> {
    xlsx(&[(
        "Pricing",
        sheet_xml(
            &[
                &["Description", "Price", "Cost"],
                &["Widget", price, "60"],
                &["Gadget", "200", "110"],
                &[],
                &["Notes"],
            ],
            &[],
        ),
    )])
}

fn pricing_input() -> SaveProfileInput {
    let mut mapping = ColumnMapping::new();
    mapping.insert("description".to_owned(), "A".to_owned());
    mapping.insert("selling_price".to_owned(), "B".to_owned());
    mapping.insert("cost".to_owned(), "C".to_owned());
    SaveProfileInput {
        name: "Acme vendor sheet".to_owned(),
        sheet_name: Some("Pricing".to_owned()),
        header_row: 0,
        data_start_row: 1,
        mapping,
        data_end: DataEndStrategy::BlankRow,
    }
}

#[test]
fn first_upload_requests_a_mapping() {
    let normalizer = Normalizer::new(MemoryProfileStore::new());
    let result = normalizer
        .normalize(&pricing_file("100"), Some("acme_q3.xlsx"))
        .unwrap();
    match result {
        NormalizeResult::MappingRequired {
            fingerprint,
            raw_preview,
            file_name,
        } => {
            assert!(!fingerprint.is_empty());
            assert_eq!(file_name.as_deref(), Some("acme_q3.xlsx"));
            assert_eq!(raw_preview.len(), 1);
            assert_eq!(raw_preview[0].sheet_name, "Pricing");
            assert_eq!(raw_preview[0].total_rows, 5);
            assert_eq!(raw_preview[0].rows[0][0], "Description");
            assert_eq!(raw_preview[0].rows[1], vec!["Widget", "100", "60"]);
        }
        NormalizeResult::Success { .. } => panic!("no profile exists yet"),
    }
}

#[test]
fn saved_profile_makes_later_uploads_automatic() {
    let normalizer = Normalizer::new(MemoryProfileStore::new());
    let bytes = pricing_file("100");

    let saved = normalizer
        .save_profile_and_extract(&bytes, &pricing_input())
        .unwrap();
    let (saved_fingerprint, saved_rows) = match saved {
        NormalizeResult::Success {
            fingerprint,
            extracted_data,
            ..
        } => (fingerprint, extracted_data),
        NormalizeResult::MappingRequired { .. } => panic!("save must extract"),
    };
    assert_eq!(saved_rows.len(), 2);
    assert_eq!(saved_rows[0].values["description"].to_text(), "Widget");
    assert_eq!(saved_rows[0].values["selling_price"].to_text(), "100");

    // A later file with the same layout but different figures matches
    let later = normalizer
        .normalize(&pricing_file("9999.5"), Some("acme_q4.xlsx"))
        .unwrap();
    match later {
        NormalizeResult::Success {
            fingerprint,
            profile_name,
            extracted_data,
            sheet_name,
            header_row,
            ..
        } => {
            assert_eq!(fingerprint, saved_fingerprint);
            assert_eq!(profile_name, "Acme vendor sheet");
            assert_eq!(sheet_name, "Pricing");
            assert_eq!(header_row, vec!["Description", "Price", "Cost"]);
            assert_eq!(extracted_data.len(), 2);
            assert_eq!(extracted_data[0].values["selling_price"].to_text(), "9999.5");
        }
        NormalizeResult::MappingRequired { .. } => panic!("layout was mapped"),
    }

    let profile = normalizer
        .store()
        .find_by_fingerprint(&saved_fingerprint)
        .unwrap()
        .unwrap();
    assert_eq!(profile.usage_count, 1);
}

#[test]
fn normalization_is_idempotent() {
    let normalizer = Normalizer::new(MemoryProfileStore::new());
    let bytes = pricing_file("100");
    normalizer
        .save_profile_and_extract(&bytes, &pricing_input())
        .unwrap();

    let rows_of = |result: NormalizeResult| match result {
        NormalizeResult::Success { extracted_data, .. } => serde_json::to_value(extracted_data).unwrap(),
        NormalizeResult::MappingRequired { .. } => panic!("layout was mapped"),
    };
    let first = rows_of(normalizer.normalize(&bytes, None).unwrap());
    let second = rows_of(normalizer.normalize(&bytes, None).unwrap());
    assert_eq!(first, second);
}

#[test]
fn merged_title_cells_resolve_through_parsing() {
    let bytes = xlsx(&[(
        "Quote",
        sheet_xml(
            &[
                &["Hardware Pricing"],
                &["Description", "Price"],
                &["Monitor", "500"],
            ],
            &["A1:C1"],
        ),
    )]);
    let workbook = sheetmap::Workbook::from_bytes(&bytes).unwrap();
    let sheet = workbook.sheet("Quote").unwrap();
    assert_eq!(sheet.resolve_text(0, 2), "Hardware Pricing");
    assert_eq!(sheet.resolve_text(2, 1), "500");
}

#[test]
fn profile_pinned_to_an_absent_sheet_fails() {
    let normalizer = Normalizer::new(MemoryProfileStore::new());
    let bytes = pricing_file("100");
    let mut input = pricing_input();
    input.sheet_name = Some("Costs".to_owned());
    let error = normalizer.save_profile_and_extract(&bytes, &input).unwrap_err();
    assert!(matches!(error, SheetMapError::MissingSheet(name) if name == "Costs"));
}

#[test]
fn fingerprint_survives_numeric_changes_but_not_layout_changes() {
    let normalizer = Normalizer::new(MemoryProfileStore::new());
    let key_of = |bytes: &[u8]| match normalizer.normalize(bytes, None).unwrap() {
        NormalizeResult::MappingRequired { fingerprint, .. } => fingerprint,
        NormalizeResult::Success { fingerprint, .. } => fingerprint,
    };

    assert_eq!(key_of(&pricing_file("100")), key_of(&pricing_file("424242")));

    let renamed_header = xlsx(&[(
        "Pricing",
        sheet_xml(
            &[
                &["Description", "Unit Price", "Cost"],
                &["Widget", "100", "60"],
            ],
            &[],
        ),
    )]);
    assert_ne!(key_of(&pricing_file("100")), key_of(&renamed_header));
}

#[test]
fn multi_sheet_previews_cover_every_sheet() {
    let normalizer = Normalizer::new(MemoryProfileStore::new());
    let bytes = xlsx(&[
        ("Cover", sheet_xml(&[&["Acme Corp Proposal"]], &[])),
        (
            "Pricing",
            sheet_xml(&[&["Description", "Price"], &["Widget", "100"]], &[]),
        ),
    ]);
    match normalizer.normalize(&bytes, None).unwrap() {
        NormalizeResult::MappingRequired { raw_preview, .. } => {
            let names: Vec<&str> = raw_preview.iter().map(|preview| preview.sheet_name.as_str()).collect();
            assert_eq!(names, vec!["Cover", "Pricing"]);
        }
        NormalizeResult::Success { .. } => panic!("no profile exists yet"),
    }
}

#[test]
fn success_payload_carries_rows_as_a_flat_array() {
    let normalizer = Normalizer::new(MemoryProfileStore::new());
    let result = normalizer
        .save_profile_and_extract(&pricing_file("100"), &pricing_input())
        .unwrap();
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["status"], "success");
    assert!(json["extracted_data"].is_array());
    assert_eq!(json["extracted_data"][0]["values"]["description"], "Widget");
    // Sheet name and header row are siblings of the row array, not nested
    assert_eq!(json["sheet_name"], "Pricing");
    assert_eq!(json["header_row"][0], "Description");
}

#[test]
fn zero_sheet_workbook_is_a_degenerate_mapping_request() {
    let normalizer = Normalizer::new(MemoryProfileStore::new());
    let bytes = xlsx(&[]);
    match normalizer.normalize(&bytes, None).unwrap() {
        NormalizeResult::MappingRequired {
            fingerprint,
            raw_preview,
            ..
        } => {
            assert!(!fingerprint.is_empty());
            assert!(raw_preview.is_empty());
        }
        NormalizeResult::Success { .. } => panic!("an empty workbook cannot match a profile"),
    }
}

#[test]
fn garbage_bytes_are_rejected() {
    let normalizer = Normalizer::new(MemoryProfileStore::new());
    assert!(normalizer.normalize(b"not a zip archive", None).is_err());
}
