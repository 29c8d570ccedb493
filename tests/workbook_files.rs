#![allow(clippy::unwrap_used, clippy::expect_used)]

use rignet_lib::import::{DropReason, Workbook, WorkbookError, WorkbookFormat, TEMPLATE_HEADERS};
use rust_xlsxwriter::Workbook as XlsxWorkbook;

fn build(sheets: &[(&str, &[&[&str]])]) -> Vec<u8> {
    let mut workbook = XlsxWorkbook::new();
    for (name, rows) in sheets {
        let sheet = workbook.add_worksheet();
        sheet.set_name(*name).unwrap();
        for (r, row) in rows.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                if value.is_empty() {
                    continue;
                }
                sheet.write_string(r as u32, c as u16, *value).unwrap();
            }
        }
    }
    workbook.save_to_buffer().unwrap()
}

#[test]
fn numeric_machine_ids_read_as_text() {
    let mut workbook = XlsxWorkbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Rigs").unwrap();
    for (col, title) in TEMPLATE_HEADERS.iter().enumerate() {
        sheet.write_string(0, col as u16, *title).unwrap();
    }
    sheet.write_number(1, 0, 1203).unwrap();
    sheet.write_string(1, 1, "PLC").unwrap();
    sheet.write_string(1, 2, "10.31.141.216").unwrap();
    let bytes = workbook.save_to_buffer().unwrap();

    let parsed = Workbook::from_bytes(&bytes)
        .unwrap()
        .parse_sheet("Rigs")
        .unwrap();
    assert_eq!(parsed.rows[0].machine_id, "1203");
    assert_eq!(parsed.rows[0].subnet, "");
}

#[test]
fn blank_rows_between_data_keep_source_positions() {
    let header: &[&str] = &TEMPLATE_HEADERS;
    let bytes = build(&[(
        "Site",
        &[
            header,
            &["FS03", "PLC", "10.31.141.216"],
            &[],
            &["FS02", "", ""],
            &["FS02", "PLC", "10.31.145.211"],
        ],
    )]);
    let workbook = Workbook::from_bytes(&bytes).unwrap();
    assert_eq!(workbook.format(), WorkbookFormat::Spreadsheet);

    let info = &workbook.catalog()[0];
    assert_eq!(info.row_count, 3);

    let parsed = workbook.parse_sheet("Site").unwrap();
    let positions: Vec<usize> = parsed.rows.iter().map(|r| r.row_index).collect();
    assert_eq!(positions, vec![1, 4]);
    assert_eq!(parsed.dropped.len(), 1);
    assert_eq!(parsed.dropped[0].row_index, 3);
    assert_eq!(parsed.dropped[0].reason, DropReason::MissingIpAddress);
}

#[test]
fn sheet_listing_preserves_workbook_order() {
    let header: &[&str] = &TEMPLATE_HEADERS;
    let bytes = build(&[
        ("Cover", &[&["Site inventory 2026"]]),
        ("North", &[header, &["N1", "PLC", "10.1.0.1"]]),
        ("South", &[header, &["S1", "PLC", "10.2.0.1"]]),
    ]);
    let workbook = Workbook::from_bytes(&bytes).unwrap();
    assert_eq!(workbook.sheet_names(), vec!["Cover", "North", "South"]);
    let with_data: Vec<bool> = workbook.catalog().iter().map(|s| s.has_data).collect();
    assert_eq!(with_data, vec![false, true, true]);
    assert_eq!(workbook.auto_select(), None);

    let err = workbook.parse_sheet("Cover").unwrap_err();
    assert!(matches!(err, WorkbookError::EmptySheet { .. }));
}

#[test]
fn utf8_bom_and_crlf_csv_is_accepted() {
    let csv = "\u{feff}MACHINE ID,SYSTEM,IP ADDRESS\r\nFS03,PLC,10.31.141.216\r\n";
    let workbook = Workbook::from_bytes(csv.as_bytes()).unwrap();
    assert_eq!(workbook.format(), WorkbookFormat::Csv);
    let parsed = workbook.parse_sheet("Sheet1").unwrap();
    assert_eq!(parsed.rows[0].machine_id, "FS03");
    assert_eq!(parsed.rows[0].ip_address, "10.31.141.216");
}
