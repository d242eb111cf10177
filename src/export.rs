//! CSV and Excel export of attendance rows.

use crate::error::{AppError, Result};
use crate::models::{AttendanceRecord, AttendanceStats, AttendanceStatus, Scope};
use rust_xlsxwriter::{Color, Format, FormatBorder, Workbook};
use std::path::{Path, PathBuf};

/// Fixed CSV header.
pub const CSV_HEADER: [&str; 5] = ["id", "name", "status", "mode", "time"];

/// Serialize records to CSV text.
///
/// Columns are `id,name,status,mode,time`, the header always comes first and
/// every line ends with `\n`. Fields containing quotes, commas or line breaks
/// are quoted with inner quotes doubled.
pub fn write_csv<'a>(records: impl IntoIterator<Item = &'a AttendanceRecord>) -> Result<String> {
    let mut wtr = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .quote_style(csv::QuoteStyle::Necessary)
        .from_writer(vec![]);

    wtr.write_record(CSV_HEADER)?;

    for record in records {
        let mode = record.mode.map(|m| m.as_str()).unwrap_or("");
        let time = record.time_label();
        wtr.write_record([
            record.id.as_str(),
            record.subject_name.as_str(),
            record.status.as_str(),
            mode,
            time.as_str(),
        ])?;
    }

    let buff = wtr.into_inner().map_err(|e| AppError::Export(e.to_string()))?;
    String::from_utf8(buff).map_err(|e| AppError::Export(e.to_string()))
}

/// Write records as a CSV file.
pub fn write_csv_file<'a>(records: impl IntoIterator<Item = &'a AttendanceRecord>, path: &Path) -> Result<()> {
    let content = write_csv(records)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Default export file name, unique per scope: `attendance_<date>_<group>.<ext>`.
pub fn export_filename(scope: &Scope, extension: &str) -> String {
    let group = scope
        .group_id
        .as_deref()
        .map(sanitize_for_filename)
        .filter(|g| !g.is_empty())
        .unwrap_or_else(|| "no-class".to_string());
    format!(
        "attendance_{date}_{group}.{extension}",
        date = scope.date.format("%Y-%m-%d")
    )
}

/// Keep ASCII letters, digits and `-`; every other byte becomes `_xx` (lowercase hex).
/// `_` itself is escaped, so distinct group ids never share a file name.
fn sanitize_for_filename(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("_{byte:02x}"));
        }
    }
    out
}

/// Open save file dialog and return selected path.
pub fn show_save_dialog(default_name: &str) -> Option<PathBuf> {
    let dialog = rfd::FileDialog::new().set_file_name(default_name);
    let dialog = if default_name.ends_with(".xlsx") {
        dialog.add_filter("Excel Files", &["xlsx"])
    } else {
        dialog.add_filter("CSV Files", &["csv"])
    };
    dialog.save_file()
}

/// Export attendance rows plus a summary sheet to an Excel file.
pub fn export_attendance_to_excel<'a>(
    records: impl IntoIterator<Item = &'a AttendanceRecord>,
    stats: &AttendanceStats,
    scope: &Scope,
    path: &Path,
) -> Result<()> {
    let mut workbook = Workbook::new();

    // Header format
    let header_format = Format::new()
        .set_bold()
        .set_background_color(Color::RGB(0x4472C4))
        .set_font_color(Color::White)
        .set_border(FormatBorder::Thin);

    let worksheet = workbook.add_worksheet();
    worksheet.set_name("Attendance")?;

    let headers = ["ID", "Name", "Status", "Mode", "Time"];
    for (col, header) in headers.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, *header, &header_format)?;
    }

    // Column widths
    worksheet.set_column_width(0, 15)?; // ID
    worksheet.set_column_width(1, 30)?; // Name
    worksheet.set_column_width(2, 20)?; // Status
    worksheet.set_column_width(3, 10)?; // Mode
    worksheet.set_column_width(4, 8)?; // Time

    let mut rows = 0u32;
    for record in records {
        rows += 1;
        worksheet.write_string(rows, 0, &record.id)?;
        worksheet.write_string(rows, 1, &record.subject_name)?;
        worksheet.write_string(rows, 2, record.status.label())?;
        worksheet.write_string(rows, 3, record.mode.map(|m| m.label()).unwrap_or(""))?;
        worksheet.write_string(rows, 4, record.time_label())?;
    }

    if rows > 0 {
        worksheet.autofilter(0, 0, rows, 4)?;
    }
    worksheet.set_freeze_panes(1, 0)?;

    let summary = workbook.add_worksheet();
    summary.set_name("Summary")?;
    summary.set_column_width(0, 22)?;
    summary.write_string_with_format(0, 0, "Scope", &header_format)?;
    summary.write_string(0, 1, scope.to_string())?;

    let mut row = 2u32;
    for status in AttendanceStatus::ALL {
        summary.write_string(row, 0, status.label())?;
        summary.write_number(row, 1, stats.count(status) as f64)?;
        row += 1;
    }
    summary.write_string_with_format(row, 0, "Total", &header_format)?;
    summary.write_number(row, 1, stats.total as f64)?;
    summary.write_string_with_format(row + 1, 0, "Presence rate (%)", &header_format)?;
    summary.write_number(row + 1, 1, f64::from(stats.present_rate))?;

    workbook.save(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AttendanceMode, SubjectRole};
    use chrono::{NaiveDate, NaiveTime};

    fn record(id: &str, name: &str, status: AttendanceStatus) -> AttendanceRecord {
        let attending = status.is_attending();
        AttendanceRecord {
            id: id.to_string(),
            subject_id: format!("s-{id}"),
            subject_name: name.to_string(),
            group_label: "10B".to_string(),
            subject_role: SubjectRole::Learner,
            status,
            mode: attending.then_some(AttendanceMode::Onsite),
            recorded_time: if attending { NaiveTime::from_hms_opt(7, 55, 0) } else { None },
        }
    }

    #[test]
    fn test_empty_input_is_header_only() {
        let none: [AttendanceRecord; 0] = [];
        let output = write_csv(&none).unwrap();
        assert_eq!(output, "id,name,status,mode,time\n");
    }

    #[test]
    fn test_rows_and_columns() {
        let records = [
            record("1", "Ana Lima", AttendanceStatus::Present),
            record("2", "Bo Chen", AttendanceStatus::ExcusedSick),
        ];
        let output = write_csv(&records).unwrap();
        assert_eq!(
            output,
            "id,name,status,mode,time\n1,Ana Lima,present,onsite,07:55\n2,Bo Chen,excused_sick,,\n"
        );
    }

    #[test]
    fn test_quotes_and_commas_are_escaped() {
        let records = [
            record("1", "Dwayne \"The Rock\" Johnson", AttendanceStatus::Present),
            record("2", "Smith, Jane", AttendanceStatus::Online),
        ];
        let output = write_csv(&records).unwrap();
        assert!(output.contains("\"Dwayne \"\"The Rock\"\" Johnson\""));
        assert!(output.contains("\"Smith, Jane\""));

        let mut reader = csv::Reader::from_reader(output.as_bytes());
        let names: Vec<String> = reader
            .records()
            .map(|row| row.unwrap()[1].to_string())
            .collect();
        assert_eq!(names, vec!["Dwayne \"The Rock\" Johnson", "Smith, Jane"]);
    }

    #[test]
    fn test_output_is_deterministic() {
        let records = [
            record("1", "A", AttendanceStatus::Present),
            record("2", "B", AttendanceStatus::UnexcusedAbsence),
        ];
        assert_eq!(write_csv(&records).unwrap(), write_csv(&records).unwrap());
    }

    #[test]
    fn test_filename_encodes_scope() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        assert_eq!(
            export_filename(&Scope::new(date, Some("7B".to_string())), "csv"),
            "attendance_2026-03-02_7B.csv"
        );
        assert_eq!(
            export_filename(&Scope::new(date, Some("Math 7/B".to_string())), "csv"),
            "attendance_2026-03-02_Math_207_2fB.csv"
        );
        assert_eq!(
            export_filename(&Scope::new(date, None), "xlsx"),
            "attendance_2026-03-02_no-class.xlsx"
        );
    }

    #[test]
    fn test_filename_keeps_distinct_groups_apart() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let names: Vec<String> = ["7/B", "7_B", "7 B", "7B"]
            .iter()
            .map(|group| export_filename(&Scope::new(date, Some(group.to_string())), "csv"))
            .collect();
        assert_eq!(names[0], "attendance_2026-03-02_7_2fB.csv");
        assert_eq!(names[1], "attendance_2026-03-02_7_5fB.csv");
        let unique: std::collections::BTreeSet<&String> = names.iter().collect();
        assert_eq!(unique.len(), names.len());
    }

    #[test]
    fn test_excel_export_writes_file() {
        let records = [record("1", "A", AttendanceStatus::Present)];
        let stats = crate::stats::aggregate(&records);
        let scope = Scope::new(NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(), Some("7B".to_string()));
        let path = std::env::temp_dir().join(format!("rollcall_export_{}.xlsx", std::process::id()));

        export_attendance_to_excel(&records, &stats, &scope, &path).unwrap();
        assert!(path.exists());
        let _ = std::fs::remove_file(&path);
    }
}
