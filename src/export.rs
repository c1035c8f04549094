//! Two-sheet spreadsheet summary of the challenge.

use chrono::Local;
use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};

use crate::db::models::Measurement;
use crate::ranking::{Ranking, GOAL_KG};

pub const CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const FILE_NAME: &str = "weighboard_export.xlsx";

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Build the workbook in memory.
///
/// "Measurements" lists every record oldest first; "Ranking" has one row per
/// participant in leaderboard order, with blank cells where there is no data.
pub fn build_workbook(measurements: &[Measurement], ranking: &Ranking) -> Result<Vec<u8>, XlsxError> {
    let mut workbook = Workbook::new();
    let header = Format::new().set_bold();
    let kilos = Format::new().set_num_format("0.00");
    let percent = Format::new().set_num_format("0.0");

    let mut chronological: Vec<&Measurement> = measurements.iter().collect();
    chronological.sort_by_key(|m| m.recorded_at);

    let sheet = workbook.add_worksheet();
    sheet.set_name("Measurements")?;
    write_header(sheet, &["Username", "Recorded at", "Weight (kg)", "Photo"], &header)?;
    for (i, m) in chronological.iter().enumerate() {
        let row = i as u32 + 1;
        sheet.write_string(row, 0, &m.username)?;
        sheet.write_string(
            row,
            1,
            m.recorded_at
                .with_timezone(&Local)
                .format(TIMESTAMP_FORMAT)
                .to_string(),
        )?;
        sheet.write_number_with_format(row, 2, m.weight_kg, &kilos)?;
        if let Some(photo) = &m.photo_ref {
            sheet.write_string(row, 3, photo)?;
        }
    }
    sheet.set_column_width(0, 18)?;
    sheet.set_column_width(1, 20)?;
    sheet.set_column_width(3, 36)?;

    let goal_header = format!("% of goal ({} kg)", GOAL_KG);
    let sheet = workbook.add_worksheet();
    sheet.set_name("Ranking")?;
    write_header(
        sheet,
        &["Username", "First weight", "Last weight", "Kg lost", goal_header.as_str()],
        &header,
    )?;
    for (i, r) in ranking.rows.iter().enumerate() {
        let row = i as u32 + 1;
        sheet.write_string(row, 0, &r.username)?;
        let cells = [
            (1, r.first_weight, &kilos),
            (2, r.last_weight, &kilos),
            (3, r.kg_lost, &kilos),
            (4, r.pct_of_goal, &percent),
        ];
        for (col, value, format) in cells {
            if let Some(value) = value {
                sheet.write_number_with_format(row, col, value, format)?;
            }
        }
    }
    sheet.set_column_width(0, 18)?;
    sheet.set_column_width(4, 18)?;

    workbook.save_to_buffer()
}

fn write_header(sheet: &mut Worksheet, titles: &[&str], format: &Format) -> Result<(), XlsxError> {
    for (col, title) in titles.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *title, format)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::MeasurementId;
    use crate::ranking::compute_ranking;
    use chrono::{TimeZone, Utc};
    use std::io::Read;

    fn part(bytes: &[u8], name: &str) -> String {
        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();
        let mut xml = String::new();
        archive
            .by_name(name)
            .unwrap()
            .read_to_string(&mut xml)
            .unwrap();
        xml
    }

    fn sample_log() -> Vec<Measurement> {
        vec![
            Measurement {
                id: MeasurementId::generate(),
                username: "Ana".into(),
                recorded_at: Utc.with_ymd_and_hms(2024, 1, 2, 8, 0, 0).unwrap(),
                weight_kg: 80.0,
                photo_ref: Some("Ana_20240102_080000.jpg".into()),
            },
            Measurement {
                id: MeasurementId::generate(),
                username: "Ana".into(),
                recorded_at: Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap(),
                weight_kg: 81.5,
                photo_ref: None,
            },
        ]
    }

    #[test]
    fn workbook_has_both_sheets_in_order() {
        let log = sample_log();
        let ranking = compute_ranking(&log, ["Ana", "Bruno"]);

        let bytes = build_workbook(&log, &ranking).unwrap();
        assert_eq!(&bytes[..2], b"PK");

        let workbook = part(&bytes, "xl/workbook.xml");
        let measurements = workbook.find("name=\"Measurements\"").unwrap();
        let ranking_sheet = workbook.find("name=\"Ranking\"").unwrap();
        assert!(measurements < ranking_sheet);
    }

    #[test]
    fn measurements_sheet_is_chronological() {
        let log = sample_log();
        let bytes = build_workbook(&log, &compute_ranking(&log, ["Ana"])).unwrap();

        let sheet = part(&bytes, "xl/worksheets/sheet1.xml");
        let older = sheet.find("<v>81.5</v>").unwrap();
        let newer = sheet.find("<v>80</v>").unwrap();
        assert!(older < newer);
    }

    #[test]
    fn ranking_leaves_missing_values_blank() {
        let log = sample_log();
        let ranking = compute_ranking(&log, ["Ana", "Bruno"]);
        assert_eq!(ranking.rows[1].username, "Bruno");

        let bytes = build_workbook(&log, &ranking).unwrap();
        let sheet = part(&bytes, "xl/worksheets/sheet2.xml");
        for cell in ["B2", "C2", "D2", "E2", "A3"] {
            assert!(sheet.contains(&format!("r=\"{cell}\"")), "{cell} missing");
        }
        for cell in ["B3", "C3", "D3", "E3"] {
            assert!(!sheet.contains(&format!("r=\"{cell}\"")), "{cell} should be blank");
        }
    }

    #[test]
    fn empty_log_still_exports() {
        let bytes = build_workbook(&[], &Ranking::default()).unwrap();
        assert_eq!(&bytes[..2], b"PK");
    }
}
