use crate::domain::model::{Cell, Table};
use crate::utils::error::{EtlError, Result};
use rust_xlsxwriter::{Color, Format, Workbook};

/// 表格轉 CSV（標題列 + 資料列）
pub fn write_csv(table: &Table) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&table.headers)?;
    for row in &table.rows {
        writer.write_record(row.cells.iter().map(Cell::display))?;
    }
    writer
        .into_inner()
        .map_err(|e| EtlError::processing(format!("CSV buffer flush failed: {}", e)))
}

/// One CSV record (with line terminator), for files written row by row.
pub fn csv_record<I, T>(fields: I) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(fields)?;
    writer
        .into_inner()
        .map_err(|e| EtlError::processing(format!("CSV buffer flush failed: {}", e)))
}

fn column_widths(table: &Table) -> Vec<usize> {
    table
        .headers
        .iter()
        .enumerate()
        .map(|(col, header)| {
            let longest_cell = table
                .rows
                .iter()
                .filter_map(|row| row.cells.get(col))
                .map(|cell| cell.display().chars().count())
                .max()
                .unwrap_or(0);
            header.chars().count().max(longest_cell) + 2
        })
        .collect()
}

/// 單一工作表的 XLSX：粗體標題、整列底色、欄寬依內容
pub fn write_xlsx(table: &Table) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(&table.sheet_name)?;

    let header_format = Format::new().set_bold();
    for (col, header) in table.headers.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, header, &header_format)?;
    }

    for (idx, row) in table.rows.iter().enumerate() {
        let row_num = (idx + 1) as u32;
        let base = match row.highlight {
            Some(h) => Format::new().set_background_color(Color::RGB(h.rgb())),
            None => Format::new(),
        };

        for (col, cell) in row.cells.iter().enumerate() {
            let col_num = col as u16;
            match cell {
                Cell::Text(text) => {
                    worksheet.write_string_with_format(row_num, col_num, text, &base)?;
                }
                Cell::Number(n) => {
                    let format = match table.number_formats.get(col).and_then(Option::as_ref) {
                        Some(num_format) => base.clone().set_num_format(num_format),
                        None => base.clone(),
                    };
                    worksheet.write_number_with_format(row_num, col_num, *n, &format)?;
                }
                Cell::Empty => {
                    if row.highlight.is_some() {
                        worksheet.write_blank(row_num, col_num, &base)?;
                    }
                }
            }
        }
    }

    for (col, width) in column_widths(table).into_iter().enumerate() {
        worksheet.set_column_width(col as u16, width as f64)?;
    }

    Ok(workbook.save_to_buffer()?)
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// `$1,234.56`, negatives as `-$1,234.56`.
pub fn format_currency(value: f64) -> String {
    let formatted = format!("{:.2}", value.abs());
    let (whole, cents) = formatted.split_once('.').unwrap_or((&formatted, "00"));
    let sign = if value < 0.0 && formatted != "0.00" { "-" } else { "" };
    format!("{}${}.{}", sign, group_thousands(whole), cents)
}

/// `12.34%` (input already in percent units).
pub fn format_percent(value: f64) -> String {
    format!("{:.2}%", value)
}
