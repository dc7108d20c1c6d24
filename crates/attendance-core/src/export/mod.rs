//! CSV downloads.
//!
//! Files open cleanly in spreadsheet software: UTF-8 with a byte-order
//! mark, every field double-quoted, rows separated by `\n`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

const BOM: &str = "\u{feff}";

/// A CSV file ready to be saved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvFile {
    pub filename: String,
    pub rows: Vec<Vec<String>>,
}

impl CsvFile {
    pub fn new(filename: impl Into<String>, headers: &[&str]) -> Self {
        Self {
            filename: filename.into(),
            rows: vec![headers.iter().map(|h| h.to_string()).collect()],
        }
    }

    pub fn push_row<I, S>(&mut self, row: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rows.push(row.into_iter().map(Into::into).collect());
    }

    /// Data rows, excluding the header.
    pub fn record_count(&self) -> usize {
        self.rows.len().saturating_sub(1)
    }

    pub fn to_csv_string(&self) -> String {
        let body = self
            .rows
            .iter()
            .map(|row| row.iter().map(|field| quote(field)).collect::<Vec<_>>().join(","))
            .collect::<Vec<_>>()
            .join("\n");
        format!("{}{}", BOM, body)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_csv_string().into_bytes()
    }

    /// Write into `dir` under the file's own name. Returns the full path.
    pub fn save_to(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        let path = dir.join(sanitize_filename(&self.filename));
        std::fs::write(&path, self.to_bytes())
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }
}

fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

/// Replace characters that are not allowed in file names.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Split a quoted CSV line back into fields.
    fn parse_line(line: &str) -> Vec<String> {
        let mut fields = Vec::new();
        let mut current = String::new();
        let mut chars = line.chars().peekable();
        let mut in_quotes = false;
        while let Some(c) = chars.next() {
            match (c, in_quotes) {
                ('"', true) if chars.peek() == Some(&'"') => {
                    current.push('"');
                    chars.next();
                }
                ('"', _) => in_quotes = !in_quotes,
                (',', false) => fields.push(std::mem::take(&mut current)),
                (c, _) => current.push(c),
            }
        }
        fields.push(current);
        fields
    }

    #[test]
    fn test_bom_and_quoting() {
        let mut csv = CsvFile::new("members_2024-06-01.csv", &["Name", "Notes"]);
        csv.push_row(["Sato", r#"said "hi", left"#]);
        let text = csv.to_csv_string();

        assert!(text.starts_with('\u{feff}'));
        assert_eq!(csv.to_bytes()[..3], [0xEF, 0xBB, 0xBF]);
        let lines: Vec<&str> = text.trim_start_matches('\u{feff}').split('\n').collect();
        assert_eq!(lines[0], r#""Name","Notes""#);
        assert_eq!(parse_line(lines[1]), vec!["Sato", r#"said "hi", left"#]);
        assert_eq!(csv.record_count(), 1);
    }

    #[test]
    fn test_save_sanitizes_name() {
        let dir = tempfile::tempdir().unwrap();
        let csv = CsvFile::new("Camp 6/1_attendance.csv", &["Name"]);
        let path = csv.save_to(dir.path()).unwrap();
        assert_eq!(path.file_name().unwrap(), "Camp 6_1_attendance.csv");
        assert!(std::fs::read(&path).unwrap().starts_with(&[0xEF, 0xBB, 0xBF]));
    }
}
