use std::fs;
use std::mem::take;
use std::path::Path;

use anyhow::{Context, Result, anyhow};

use crate::model::{RawStatRecord, RawValue};

/// A header row plus string cells, as read from a CSV file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn load_csv(path: &Path) -> Result<Self> {
        let text =
            fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        Self::from_csv(&text).with_context(|| format!("parse {}", path.display()))
    }

    pub fn from_csv(text: &str) -> Result<Self> {
        let mut rows = parse_rows(text.trim_start_matches('\u{feff}'), ',');
        if rows.is_empty() {
            return Err(anyhow!("csv has no header row"));
        }
        let headers = rows
            .remove(0)
            .into_iter()
            .map(|h| h.trim().to_string())
            .collect();
        Ok(Self { headers, rows })
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn missing_columns<'a>(&self, names: &[&'a str]) -> Vec<&'a str> {
        names
            .iter()
            .copied()
            .filter(|n| self.column(n).is_none())
            .collect()
    }

    /// Each row as a record keyed by header; blank cells are absent.
    pub fn records(&self) -> Vec<RawStatRecord> {
        self.rows
            .iter()
            .map(|row| {
                self.headers
                    .iter()
                    .enumerate()
                    .map(|(i, h)| {
                        let cell = row.get(i).map(|c| RawValue::from_cell(c));
                        (h.clone(), cell.unwrap_or(RawValue::Absent))
                    })
                    .collect()
            })
            .collect()
    }
}

/// Minimal CSV parser: quoted fields, doubled-quote escapes, CRLF.
pub fn parse_rows(text: &str, sep: char) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut field = String::new();
    let mut row = Vec::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' => {
                if in_quotes {
                    if matches!(chars.peek(), Some('"')) {
                        chars.next();
                        field.push('"');
                    } else {
                        in_quotes = false;
                    }
                } else {
                    in_quotes = true;
                }
            }
            c if c == sep && !in_quotes => row.push(take(&mut field)),
            '\n' | '\r' if !in_quotes => {
                if ch == '\r' && matches!(chars.peek(), Some('\n')) {
                    chars.next();
                }
                row.push(take(&mut field));
                if !(row.len() == 1 && row[0].is_empty()) {
                    rows.push(take(&mut row));
                } else {
                    row.clear();
                }
            }
            _ => field.push(ch),
        }
    }

    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }
    rows
}
