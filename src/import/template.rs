use anyhow::{Context, Result};
use rust_xlsxwriter::{Format, Workbook as XlsxWorkbook};

use super::workbook::TEMPLATE_HEADERS;

pub const TEMPLATE_SHEET: &str = "Equipment";

const SAMPLE_ROWS: [[&str; 6]; 3] = [
    ["FS03", "PLC", "10.31.141.216", "255.255.255.0", "10.31.141.1", "Main control"],
    ["FS03", "OBC", "10.31.141.217", "255.255.255.0", "10.31.141.1", ""],
    ["FS02", "PLC", "10.31.145.211", "255.255.255.0", "10.31.145.1", "Spare radio"],
];

/// Import template as CSV: header plus illustrative rows.
pub fn template_csv() -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(TEMPLATE_HEADERS).context("write template header")?;
    for row in SAMPLE_ROWS {
        writer.write_record(row).context("write template row")?;
    }
    writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("flush template csv: {}", e.error()))
}

/// Same content as [`template_csv`], as an xlsx workbook.
pub fn template_xlsx() -> Result<Vec<u8>> {
    let mut workbook = XlsxWorkbook::new();
    let header = Format::new().set_bold();
    let sheet = workbook.add_worksheet();
    sheet.set_name(TEMPLATE_SHEET)?;

    for (col, title) in TEMPLATE_HEADERS.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *title, &header)?;
        sheet.set_column_width(col as u16, 18)?;
    }
    for (row, values) in SAMPLE_ROWS.iter().enumerate() {
        for (col, value) in values.iter().enumerate() {
            if !value.is_empty() {
                sheet.write_string(row as u32 + 1, col as u16, *value)?;
            }
        }
    }

    workbook.save_to_buffer().context("render template workbook")
}
