//! Order report exports (CSV, Excel, PDF).

use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfLayerReference};
use rust_decimal::prelude::ToPrimitive;
use rust_xlsxwriter::{Format, Workbook, XlsxError};
use thiserror::Error;

use crate::models::report::ExportRow;

const PDF_TITLE: &str = "Order Report";
const PAGE_WIDTH: Mm = Mm(210.0);
const PAGE_HEIGHT: Mm = Mm(297.0);
const MARGIN_LEFT: Mm = Mm(20.0);
const TITLE_Y: f32 = 277.0;
const FIRST_LINE_Y: f32 = 262.0;
const LINE_HEIGHT: f32 = 7.0;
const BOTTOM_MARGIN: f32 = 20.0;

/// Errors while rendering an export.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Excel error: {0}")]
    Xlsx(#[from] XlsxError),

    #[error("PDF error: {0}")]
    Pdf(#[from] printpdf::Error),
}

/// Supported export formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Excel,
    Pdf,
}

impl ExportFormat {
    /// Download file name.
    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::Csv => "report.csv",
            Self::Excel => "report.xlsx",
            Self::Pdf => "report.pdf",
        }
    }

    /// `Content-Type` of the rendered file.
    #[must_use]
    pub const fn mime_type(self) -> &'static str {
        match self {
            Self::Csv => "text/csv",
            Self::Excel => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            Self::Pdf => "application/pdf",
        }
    }

    /// Render `rows` in this format.
    ///
    /// # Errors
    ///
    /// Returns `ExportError` if the underlying writer fails.
    pub fn render(self, rows: &[ExportRow]) -> Result<Vec<u8>, ExportError> {
        match self {
            Self::Csv => to_csv(rows),
            Self::Excel => to_xlsx(rows),
            Self::Pdf => to_pdf(rows),
        }
    }
}

fn created_at(row: &ExportRow) -> String {
    row.created_at.to_rfc3339()
}

fn to_csv(rows: &[ExportRow]) -> Result<Vec<u8>, ExportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["OrderID", "TotalPrice", "CreatedAt"])?;
    for row in rows {
        writer.write_record([
            row.id.to_string(),
            row.total_price.to_string(),
            created_at(row),
        ])?;
    }
    writer.flush().map_err(csv::Error::from)?;
    writer
        .into_inner()
        .map_err(|e| ExportError::Csv(csv::Error::from(e.into_error())))
}

fn to_xlsx(rows: &[ExportRow]) -> Result<Vec<u8>, ExportError> {
    let mut workbook = Workbook::new();
    let header = Format::new().set_bold();
    let money = Format::new().set_num_format("0.00");

    let sheet = workbook.add_worksheet();
    sheet.set_name("Orders")?;
    for (col, title) in (0u16..).zip(["Order ID", "Total Price", "Created At"]) {
        sheet.write_string_with_format(0, col, title, &header)?;
    }
    sheet.set_column_width(0, 38)?;
    sheet.set_column_width(1, 14)?;
    sheet.set_column_width(2, 28)?;

    for (index, row) in (1u32..).zip(rows) {
        sheet.write_string(index, 0, row.id.to_string())?;
        sheet.write_number_with_format(
            index,
            1,
            row.total_price.to_f64().unwrap_or_default(),
            &money,
        )?;
        sheet.write_string(index, 2, created_at(row))?;
    }

    Ok(workbook.save_to_buffer()?)
}

fn pdf_line(row: &ExportRow) -> String {
    format!(
        "Order {}   Total {}   Created {}",
        row.id,
        row.total_price,
        row.created_at.format("%Y-%m-%d %H:%M UTC")
    )
}

fn to_pdf(rows: &[ExportRow]) -> Result<Vec<u8>, ExportError> {
    let (doc, page, layer) = PdfDocument::new(PDF_TITLE, PAGE_WIDTH, PAGE_HEIGHT, "Layer 1");
    let regular = doc.add_builtin_font(BuiltinFont::Helvetica)?;
    let bold = doc.add_builtin_font(BuiltinFont::HelveticaBold)?;

    let mut current: PdfLayerReference = doc.get_page(page).get_layer(layer);
    current.use_text(PDF_TITLE, 18.0, MARGIN_LEFT, Mm(TITLE_Y), &bold);

    let mut y = FIRST_LINE_Y;
    for row in rows {
        if y < BOTTOM_MARGIN {
            let (page, layer) = doc.add_page(PAGE_WIDTH, PAGE_HEIGHT, "Layer 1");
            current = doc.get_page(page).get_layer(layer);
            y = TITLE_Y;
        }
        write_line(&current, &pdf_line(row), y, &regular);
        y -= LINE_HEIGHT;
    }

    Ok(doc.save_to_bytes()?)
}

fn write_line(layer: &PdfLayerReference, text: &str, y: f32, font: &IndirectFontRef) {
    layer.use_text(text, 10.0, MARGIN_LEFT, Mm(y), font);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use bazaar_core::OrderId;
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;

    fn rows(n: usize) -> Vec<ExportRow> {
        (0..n)
            .map(|i| ExportRow {
                id: OrderId::generate(),
                total_price: Decimal::new(1999 + i64::try_from(i).unwrap(), 2),
                created_at: Utc.with_ymd_and_hms(2025, 3, 14, 9, 30, 0).unwrap(),
            })
            .collect()
    }

    #[test]
    fn csv_has_header_and_one_line_per_order() {
        let data = rows(2);
        let bytes = ExportFormat::Csv.render(&data).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "OrderID,TotalPrice,CreatedAt");
        assert_eq!(
            lines[1],
            format!("{},19.99,2025-03-14T09:30:00+00:00", data[0].id)
        );
    }

    #[test]
    fn csv_of_no_orders_is_just_the_header() {
        let text = String::from_utf8(ExportFormat::Csv.render(&[]).unwrap()).unwrap();
        assert_eq!(text.trim_end(), "OrderID,TotalPrice,CreatedAt");
    }

    #[test]
    fn xlsx_is_a_zip_container() {
        let bytes = ExportFormat::Excel.render(&rows(3)).unwrap();
        assert!(bytes.starts_with(b"PK"));
    }

    #[test]
    fn pdf_spans_several_pages() {
        let bytes = ExportFormat::Pdf.render(&rows(120)).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn pdf_line_mentions_order_and_total() {
        let row = &rows(1)[0];
        let line = pdf_line(row);
        assert!(line.contains(&row.id.to_string()));
        assert!(line.contains("19.99"));
        assert!(line.contains("2025-03-14 09:30 UTC"));
    }

    #[test]
    fn formats_name_their_files() {
        assert_eq!(ExportFormat::Csv.file_name(), "report.csv");
        assert_eq!(ExportFormat::Excel.file_name(), "report.xlsx");
        assert_eq!(ExportFormat::Pdf.mime_type(), "application/pdf");
    }
}
