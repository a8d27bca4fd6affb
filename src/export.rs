//! Spreadsheet (XLSX, CSV) and PDF rendering of flattened record views.
//!
//! Hierarchy is communicated by indentation: columns marked `indent` are
//! prefixed with two spaces per depth level.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use rust_xlsxwriter::{Format, Workbook, XlsxError};
use serde_json::Value;

use crate::config::{ColumnConfig, ColumnKind, RecordTypeConfig};
use crate::error::{DashboardError, Result};
use crate::tree::{FlatRow, Record};

// A3 landscape, in points.
const PAGE_WIDTH: i64 = 1191;
const PAGE_HEIGHT: i64 = 842;
const MARGIN: i64 = 40;
const ROW_HEIGHT: i64 = 12;
const BODY_FONT_SIZE: i64 = 8;
// Rough average glyph width of Helvetica at 8pt.
const AVG_CHAR_WIDTH: f64 = 4.4;

/// Header plus string cells, ready to be written in any format.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportTable {
    pub title: String,
    pub file_stem: String,
    pub sheet_name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl ExportTable {
    pub fn from_rows(record_type: &RecordTypeConfig, rows: &[FlatRow]) -> Self {
        let headers = record_type
            .columns
            .iter()
            .map(|c| c.header.clone())
            .collect();

        let rows = rows
            .iter()
            .map(|row| {
                record_type
                    .columns
                    .iter()
                    .map(|column| render_cell(column, &row.record, row.level))
                    .collect::<Vec<String>>()
            })
            .collect();

        Self {
            title: record_type.export_title.clone(),
            file_stem: record_type.export_file_stem.clone(),
            sheet_name: record_type.sheet_name.clone(),
            headers,
            rows,
        }
    }

    pub fn csv_filename(&self) -> String {
        format!("{}.csv", self.file_stem)
    }

    pub fn pdf_filename(&self) -> String {
        format!("{}.pdf", self.file_stem)
    }

    pub fn xlsx_filename(&self) -> String {
        format!("{}.xlsx", self.file_stem)
    }

    /// One worksheet: a bold, frozen header row followed by the data rows.
    pub fn to_xlsx(&self) -> Result<Vec<u8>> {
        self.write_xlsx()
            .map_err(|e| DashboardError::Export(format!("XLSX: {}", e)))
    }

    fn write_xlsx(&self) -> std::result::Result<Vec<u8>, XlsxError> {
        let mut workbook = Workbook::new();
        let bold = Format::new().set_bold();

        let worksheet = workbook.add_worksheet();
        worksheet.set_name(&self.sheet_name)?;
        for (col, header) in self.headers.iter().enumerate() {
            worksheet.write_string_with_format(0, col as u16, header.as_str(), &bold)?;
        }
        for (row, cells) in self.rows.iter().enumerate() {
            for (col, cell) in cells.iter().enumerate() {
                worksheet.write_string(row as u32 + 1, col as u16, cell.as_str())?;
            }
        }
        worksheet.set_freeze_panes(1, 0)?;
        worksheet.autofit();

        workbook.save_to_buffer()
    }

    pub fn to_csv(&self) -> Result<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record(&self.headers)
            .map_err(|e| DashboardError::Export(format!("CSV header: {}", e)))?;
        for row in &self.rows {
            writer
                .write_record(row)
                .map_err(|e| DashboardError::Export(format!("CSV row: {}", e)))?;
        }
        writer
            .into_inner()
            .map_err(|e| DashboardError::Export(format!("CSV flush: {}", e)))
    }

    /// Render a paginated landscape A3 table with a title block on page one.
    pub fn to_pdf(&self, generated_at: &str) -> Result<Vec<u8>> {
        let columns = self.headers.len().max(1) as i64;
        let column_width = (PAGE_WIDTH - 2 * MARGIN) / columns;
        let max_chars = ((column_width as f64 / AVG_CHAR_WIDTH) as usize).saturating_sub(1).max(3);

        let mut pages: Vec<Vec<Operation>> = Vec::new();
        let mut ops = Vec::new();

        let mut y = PAGE_HEIGHT - MARGIN;
        text(&mut ops, "F2", 18, MARGIN, y, &self.title);
        y -= 22;
        text(&mut ops, "F1", 11, MARGIN, y, &format!("Generated on: {}", generated_at));
        y -= 30;
        y = self.header_row(&mut ops, y, column_width, max_chars);

        for row in &self.rows {
            if y < MARGIN {
                pages.push(std::mem::take(&mut ops));
                y = self.header_row(&mut ops, PAGE_HEIGHT - MARGIN, column_width, max_chars);
            }
            for (i, cell) in row.iter().enumerate() {
                let x = MARGIN + i as i64 * column_width;
                text(&mut ops, "F1", BODY_FONT_SIZE, x, y, &fit(cell, max_chars));
            }
            y -= ROW_HEIGHT;
        }
        pages.push(ops);

        write_pdf(pages).map_err(|e| DashboardError::Export(format!("PDF: {}", e)))
    }

    fn header_row(
        &self,
        ops: &mut Vec<Operation>,
        y: i64,
        column_width: i64,
        max_chars: usize,
    ) -> i64 {
        for (i, header) in self.headers.iter().enumerate() {
            let x = MARGIN + i as i64 * column_width;
            text(ops, "F2", BODY_FONT_SIZE, x, y, &fit(header, max_chars));
        }
        y - ROW_HEIGHT - 4
    }
}

/// Render one cell according to its column kind.
pub fn render_cell(column: &ColumnConfig, record: &Record, level: usize) -> String {
    let value = record.attr(&column.field).unwrap_or(&Value::Null);

    let rendered = match column.kind {
        ColumnKind::Text => display_value(value),
        ColumnKind::Bool => {
            let label = if truthy(value) { "Yes" } else { "No" };
            label.to_string()
        }
        ColumnKind::Date => format_date(value),
        ColumnKind::Count => match value {
            Value::Array(items) => items.len().to_string(),
            Value::Null => "0".to_string(),
            other => display_value(other),
        },
    };

    if column.indent {
        format!("{}{}", "  ".repeat(level), rendered)
    } else {
        rendered
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .map(display_value)
            .collect::<Vec<_>>()
            .join(", "),
        // Populated references: prefer a human label over the raw object.
        Value::Object(obj) => ["fullname", "name", "title", "email", "_id"]
            .iter()
            .find_map(|key| obj.get(*key).and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| value.to_string()),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => matches!(s.to_ascii_lowercase().as_str(), "true" | "yes" | "1"),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        _ => false,
    }
}

fn format_date(value: &Value) -> String {
    match value {
        Value::String(s) if looks_like_iso_date(s) => s[..10].to_string(),
        other => display_value(other),
    }
}

fn looks_like_iso_date(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() >= 10
        && bytes[..10].is_ascii()
        && bytes[..4].iter().all(u8::is_ascii_digit)
        && bytes[4] == b'-'
        && bytes[7] == b'-'
}

/// Truncate to `max_chars` characters.
fn fit(cell: &str, max_chars: usize) -> String {
    if cell.chars().count() <= max_chars {
        return cell.to_string();
    }
    let kept: String = cell.chars().take(max_chars.saturating_sub(2)).collect();
    format!("{}..", kept)
}

fn text(ops: &mut Vec<Operation>, font: &str, size: i64, x: i64, y: i64, content: &str) {
    ops.push(Operation::new("BT", vec![]));
    ops.push(Operation::new("Tf", vec![font.into(), size.into()]));
    ops.push(Operation::new("Td", vec![x.into(), y.into()]));
    ops.push(Operation::new("Tj", vec![Object::string_literal(latin1(content))]));
    ops.push(Operation::new("ET", vec![]));
}

/// The standard Type1 fonts only cover single-byte text.
fn latin1(content: &str) -> Vec<u8> {
    content
        .chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect()
}

fn write_pdf(pages: Vec<Vec<Operation>>) -> std::result::Result<Vec<u8>, lopdf::Error> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let body_font = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let header_font = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica-Bold",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => body_font,
            "F2" => header_font,
        },
    });

    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
    for operations in pages {
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    let pages_dict = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => count,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages_dict));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer)?;
    Ok(buffer)
}
