//! Comma separated tap tables.
//!
//! Cells never need quoting: lanes are restricted to
//! [`is_valid_lane_name`](crate::config::is_valid_lane_name) and every other
//! column is an integer. A pending end is written as an empty cell.

use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::Path,
};

use crate::{config::is_valid_lane_name, CalibratedTap, Result, TapCueError, TapRow};

pub const RAW_HEADER: [&str; 3] = ["track", "start", "end"];

pub const CALIBRATED_HEADER: [&str; 7] = [
    "track",
    "start",
    "end",
    "start_sequence",
    "start_calibrated",
    "end_sequence",
    "end_calibrated",
];

pub fn write_raw<W: Write>(mut writer: W, rows: &[TapRow]) -> Result<()> {
    writeln!(writer, "{}", RAW_HEADER.join(","))?;
    for row in rows {
        writeln!(writer, "{},{},{}", row.track, row.start, cell(row.end))?;
    }
    writer.flush()?;
    Ok(())
}

pub fn read_raw<R: BufRead>(reader: R) -> Result<Vec<TapRow>> {
    let mut lines = reader.lines().enumerate();

    match lines.next() {
        Some((_, header)) => check_header(&header?, &RAW_HEADER)?,
        None => return Err(TapCueError::table(1, "missing header")),
    }

    let mut rows = Vec::new();
    for (index, line) in lines {
        let line = line?;
        let line_no = index + 1;
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        let [track, start, end] = fields.as_slice() else {
            return Err(TapCueError::table(
                line_no,
                format!("expected 3 columns, found {}", fields.len()),
            ));
        };
        if !is_valid_lane_name(track) {
            return Err(TapCueError::table(line_no, format!("invalid track `{track}`")));
        }

        rows.push(TapRow {
            track: (*track).to_string(),
            start: parse_ms(start, line_no, "start")?,
            end: match *end {
                "" => None,
                value => Some(parse_ms(value, line_no, "end")?),
            },
        });
    }
    Ok(rows)
}

pub fn write_calibrated<W: Write>(mut writer: W, rows: &[CalibratedTap]) -> Result<()> {
    writeln!(writer, "{}", CALIBRATED_HEADER.join(","))?;
    for row in rows {
        writeln!(
            writer,
            "{},{},{},{},{},{},{}",
            row.track,
            row.start,
            cell(row.end),
            row.start_sequence,
            row.start_calibrated,
            cell(row.end_sequence),
            cell(row.end_calibrated),
        )?;
    }
    writer.flush()?;
    Ok(())
}

pub fn save_raw(path: &Path, rows: &[TapRow]) -> Result<()> {
    write_raw(BufWriter::new(File::create(path)?), rows)?;
    tracing::info!(path = %path.display(), rows = rows.len(), "raw taps written");
    Ok(())
}

pub fn load_raw(path: &Path) -> Result<Vec<TapRow>> {
    read_raw(BufReader::new(File::open(path)?))
}

pub fn save_calibrated(path: &Path, rows: &[CalibratedTap]) -> Result<()> {
    write_calibrated(BufWriter::new(File::create(path)?), rows)?;
    tracing::info!(path = %path.display(), rows = rows.len(), "calibrated taps written");
    Ok(())
}

fn cell(value: Option<i64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn check_header(line: &str, expected: &[&str]) -> Result<()> {
    let found: Vec<&str> = line
        .trim_start_matches('\u{feff}')
        .trim_end_matches('\r')
        .split(',')
        .map(str::trim)
        .collect();
    if found != expected {
        return Err(TapCueError::table(
            1,
            format!("expected header `{}`, found `{line}`", expected.join(",")),
        ));
    }
    Ok(())
}

fn parse_ms(value: &str, line: usize, column: &str) -> Result<i64> {
    value
        .parse()
        .map_err(|_| TapCueError::table(line, format!("`{value}` is not a valid {column} time")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{calibrate, BeatGrid, OverlapPolicy, TapRecorder};

    fn to_string(write: impl FnOnce(&mut Vec<u8>) -> Result<()>) -> String {
        let mut buffer = Vec::new();
        write(&mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn empty_recording_exports_headers_only() {
        let recorder = TapRecorder::new(["J", "K", "L"], OverlapPolicy::Ignore);
        let raw = to_string(|out| write_raw(out, &recorder.rows()));
        assert_eq!(raw, "track,start,end\n");

        let calibrated = to_string(|out| write_calibrated(out, &[]));
        assert_eq!(
            calibrated,
            "track,start,end,start_sequence,start_calibrated,end_sequence,end_calibrated\n"
        );
    }

    #[test]
    fn raw_table_survives_a_file_round_trip() {
        let mut recorder = TapRecorder::new(["J", "K", "L"], OverlapPolicy::Ignore);
        recorder.tap("L", 900, false);
        recorder.tap("L", 950, true);
        recorder.tap("J", 120, false);
        recorder.tap("J", 200, true);
        recorder.tap("K", 400, false);
        let rows = recorder.rows();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw_taps.csv");
        save_raw(&path, &rows).unwrap();

        assert_eq!(load_raw(&path).unwrap(), rows);
    }

    #[test]
    fn writes_calibrated_columns() {
        let grid = BeatGrid::new(120.0, 0).unwrap();
        let rows = [
            TapRow {
                track: "J".into(),
                start: 733,
                end: Some(1_010),
            },
            TapRow {
                track: "K".into(),
                start: 1_600,
                end: None,
            },
        ];

        let text = to_string(|out| write_calibrated(out, &calibrate(&rows, &grid)));
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[1], "J,733,1010,1,500,2,1000");
        assert_eq!(lines[2], "K,1600,,3,1500,,");
    }

    #[test]
    fn rejects_wrong_header() {
        let err = read_raw("lane,start,end\nJ,1,2\n".as_bytes()).unwrap_err();
        assert!(matches!(err, TapCueError::Table { line: 1, .. }));

        assert!(read_raw("".as_bytes()).is_err());
    }

    #[test]
    fn reports_bad_rows_with_line_numbers() {
        let err = read_raw("track,start,end\nJ,1,2\nJ,abc,3\n".as_bytes()).unwrap_err();
        assert!(matches!(err, TapCueError::Table { line: 3, .. }));

        let err = read_raw("track,start,end\nJ,1\n".as_bytes()).unwrap_err();
        assert!(format!("{err}").contains("expected 3 columns"));
    }

    #[test]
    fn tolerates_crlf_and_trailing_blank_lines() {
        let rows = read_raw("track,start,end\r\nK,5,10\r\n\r\n".as_bytes()).unwrap();
        assert_eq!(
            rows,
            [TapRow {
                track: "K".into(),
                start: 5,
                end: Some(10)
            }]
        );
    }
}
