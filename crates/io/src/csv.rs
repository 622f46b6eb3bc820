// CSV/TSV import and delimited export

use std::io::{Read, Write};
use std::path::Path;

use gridsift_engine::{Record, Value};

use crate::error::IoError;
use crate::RecordTable;

pub fn import(path: &Path) -> Result<RecordTable, IoError> {
    let content = read_file_as_utf8(path)?;
    let delimiter = sniff_delimiter(&content);
    import_from_string(&content, delimiter)
}

pub fn import_tsv(path: &Path) -> Result<RecordTable, IoError> {
    let content = read_file_as_utf8(path)?;
    import_from_string(&content, b'\t')
}

/// Detect the most likely field delimiter by checking consistency across the first few lines.
///
/// For each candidate (tab, semicolon, comma, pipe), count fields per line. The delimiter
/// that produces the most consistent field count (>1 field) wins.
fn sniff_delimiter(content: &str) -> u8 {
    let candidates: &[u8] = &[b'\t', b';', b',', b'|'];
    let sample_lines: Vec<&str> = content.lines().take(10).collect();

    let mut best = b',';
    let mut best_score = 0u64;

    for &delim in candidates {
        let counts: Vec<usize> = sample_lines
            .iter()
            .map(|line| {
                ::csv::ReaderBuilder::new()
                    .delimiter(delim)
                    .has_headers(false)
                    .flexible(true)
                    .from_reader(line.as_bytes())
                    .records()
                    .next()
                    .and_then(|r| r.ok())
                    .map_or(1, |r| r.len())
            })
            .collect();

        let target = counts.first().copied().unwrap_or(0);
        if target <= 1 {
            continue;
        }
        let consistent = counts.iter().filter(|&&c| c == target).count() as u64;
        let score = consistent * target as u64;
        if score > best_score {
            best_score = score;
            best = delim;
        }
    }

    best
}

/// Read file and convert to UTF-8 if needed (Windows-1252 fallback)
pub fn read_file_as_utf8(path: &Path) -> Result<String, IoError> {
    let mut file = std::fs::File::open(path).map_err(|e| IoError::file(path, e))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes).map_err(|e| IoError::file(path, e))?;

    match String::from_utf8(bytes) {
        Ok(s) => Ok(s),
        Err(e) => {
            log::debug!("{} is not UTF-8, decoding as Windows-1252", path.display());
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(e.as_bytes());
            Ok(decoded.into_owned())
        }
    }
}

/// First row is the header. Blank header cells get a positional name;
/// empty fields are left out of the record.
fn import_from_string(content: &str, delimiter: u8) -> Result<RecordTable, IoError> {
    let mut reader = ::csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(content.as_bytes());

    let columns: Vec<String> = reader
        .headers()?
        .iter()
        .enumerate()
        .map(|(i, h)| {
            let h = h.trim();
            if h.is_empty() {
                format!("Column{}", i + 1)
            } else {
                h.to_string()
            }
        })
        .collect();

    let mut records = Vec::new();
    for result in reader.records() {
        let row = result?;
        let mut record = Record::new();
        for (column, field) in columns.iter().zip(row.iter()) {
            if !field.is_empty() {
                record.set(column.as_str(), Value::infer(field));
            }
        }
        records.push(record);
    }

    log::debug!("imported {} record(s), {} column(s)", records.len(), columns.len());
    Ok(RecordTable { columns, records })
}

/// Write headers and rows as delimited text
pub fn write_delimited<W: Write>(
    out: W,
    headers: &[String],
    rows: &[Vec<String>],
    delimiter: u8,
    include_headers: bool,
) -> Result<(), IoError> {
    let mut writer = ::csv::WriterBuilder::new().delimiter(delimiter).from_writer(out);
    if include_headers {
        writer.write_record(headers)?;
    }
    for row in rows {
        writer.write_record(row)?;
    }
    writer.flush().map_err(::csv::Error::from)?;
    Ok(())
}

/// Export the visible view to a file
pub fn export(
    path: &Path,
    headers: &[String],
    rows: &[Vec<String>],
    delimiter: u8,
    include_headers: bool,
) -> Result<(), IoError> {
    let file = std::fs::File::create(path).map_err(|e| IoError::file(path, e))?;
    write_delimited(std::io::BufWriter::new(file), headers, rows, delimiter, include_headers)?;
    log::info!("exported {} row(s) to {}", rows.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_sniff_semicolon_delimiter() {
        let content = "Name;Age;City\nAlice;30;Paris\nBob;25;London\n";
        assert_eq!(sniff_delimiter(content), b';');
    }

    #[test]
    fn test_sniff_tab_delimiter() {
        let content = "Name\tAge\tCity\nAlice\t30\tParis\nBob\t25\tLondon\n";
        assert_eq!(sniff_delimiter(content), b'\t');
    }

    #[test]
    fn test_sniff_semicolon_with_commas_in_values() {
        let content = "Name;Address;City\n\"Doe, Jane\";\"123 Main St, Apt 4\";Paris\nBob;\"456 Elm\";London\n";
        assert_eq!(sniff_delimiter(content), b';');
    }

    #[test]
    fn test_import_infers_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("blocks.csv");
        fs::write(&path, "Name,Rotation,,Visible\nDesk,90,x,true\nLamp,,,\n").unwrap();

        let table = import(&path).unwrap();
        assert_eq!(table.columns, vec!["Name", "Rotation", "Column3", "Visible"]);
        assert_eq!(table.records.len(), 2);
        assert_eq!(table.records[0].get("Rotation"), Some(&Value::Number(90.0)));
        assert_eq!(table.records[0].text("Column3"), "x");
        assert!(!table.records[1].contains("Rotation"));
    }

    #[test]
    fn test_windows_1252_fallback() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("latin.csv");
        fs::write(&path, b"Name,City\nJos\xe9,Bogot\xe1\n").unwrap();
        let table = import(&path).unwrap();
        assert_eq!(table.records[0].text("Name"), "Jos\u{e9}");
    }

    #[test]
    fn test_write_delimited_quotes_and_headers() {
        let mut out = Vec::new();
        let headers = vec!["Name".to_string(), "Center X".to_string()];
        let rows = vec![vec!["Desk, large".to_string(), "1.5".to_string()]];
        write_delimited(&mut out, &headers, &rows, b',', true).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "Name,Center X\n\"Desk, large\",1.5\n");

        let mut out = Vec::new();
        write_delimited(&mut out, &headers, &rows, b'\t', false).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "Desk, large\t1.5\n");
    }

    #[test]
    fn test_export_to_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.csv");
        export(&path, &["A".to_string()], &[vec!["1".to_string()], vec!["2".to_string()]], b',', true).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "A\n1\n2\n");
    }
}
