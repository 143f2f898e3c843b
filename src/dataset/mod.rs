//! Uploaded CSV tables and their pandas-style text dump.

use std::{
    io,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use unicode_width::UnicodeWidthStr;

/// Tables longer than this are shown as head and tail only.
const MAX_ROWS: usize = 60;
const EDGE_ROWS: usize = 5;
const COLUMN_GAP: &str = "  ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataTable {
    pub name: String,
    pub source: Option<PathBuf>,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl DataTable {
    pub fn from_csv_path(path: &Path) -> Result<Self> {
        if !path.is_file() {
            bail!("CSV file '{}' does not exist", path.display());
        }
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("")
            .to_lowercase();
        if extension != "csv" {
            bail!("Unsupported file type: .{}\nOnly .csv files can be attached", extension);
        }
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open '{}'", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "data.csv".into());
        let mut table = Self::from_reader(&name, file)
            .with_context(|| format!("Failed to parse CSV '{}'", path.display()))?;
        table.source = Some(path.to_path_buf());
        tracing::info!(file = %name, rows = table.rows.len(), columns = table.headers.len(), "dataset loaded");
        Ok(table)
    }

    pub fn from_reader<R: io::Read>(name: &str, reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);
        let headers: Vec<String> = rdr.headers()?.iter().map(|h| h.to_string()).collect();
        let mut rows = Vec::new();
        for record in rdr.records() {
            let record = record?;
            let mut row: Vec<String> = record.iter().map(|c| c.to_string()).collect();
            row.resize(headers.len(), String::new());
            rows.push(row);
        }
        Ok(Self { name: name.to_string(), source: None, headers, rows })
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows.len(), self.headers.len())
    }

    /// Text rendering in the layout `print(pandas.read_csv(...))` produces.
    pub fn dump(&self) -> String {
        let (n_rows, n_cols) = self.shape();
        if n_rows == 0 {
            return format!("Empty DataFrame\nColumns: [{}]\nIndex: []", self.headers.join(", "));
        }

        let truncated = n_rows > MAX_ROWS;
        let shown: Vec<Option<usize>> = if truncated {
            (0..EDGE_ROWS)
                .map(Some)
                .chain(std::iter::once(None))
                .chain((n_rows - EDGE_ROWS..n_rows).map(Some))
                .collect()
        } else {
            (0..n_rows).map(Some).collect()
        };

        let index_labels: Vec<String> = shown
            .iter()
            .map(|r| r.map_or_else(|| "..".to_string(), |i| i.to_string()))
            .collect();
        let index_width = index_labels.iter().map(|l| l.width()).max().unwrap_or(0);

        let cells: Vec<Vec<&str>> = shown
            .iter()
            .map(|r| match r {
                Some(i) => self.rows[*i]
                    .iter()
                    .map(|c| if c.is_empty() { "NaN" } else { c.as_str() })
                    .collect(),
                None => vec!["..."; n_cols],
            })
            .collect();
        let widths: Vec<usize> = (0..n_cols)
            .map(|c| {
                cells
                    .iter()
                    .map(|row| row[c].width())
                    .chain(std::iter::once(self.headers[c].width()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let mut out = String::new();
        out.push_str(&" ".repeat(index_width));
        for (header, w) in self.headers.iter().zip(&widths) {
            out.push_str(COLUMN_GAP);
            out.push_str(&pad_left(header, *w));
        }
        for (label, row) in index_labels.iter().zip(&cells) {
            out.push('\n');
            out.push_str(&pad_right(label, index_width));
            for (cell, w) in row.iter().zip(&widths) {
                out.push_str(COLUMN_GAP);
                out.push_str(&pad_left(cell, *w));
            }
        }
        if truncated {
            out.push_str(&format!("\n\n[{} rows x {} columns]", n_rows, n_cols));
        }
        out
    }
}

/// User text followed by the table dump, as sent to the model.
pub fn compose_prompt(user_text: &str, table: Option<&DataTable>) -> String {
    match table {
        Some(t) => format!("{} {}", user_text, t.dump()),
        None => user_text.to_string(),
    }
}

fn pad_left(s: &str, width: usize) -> String {
    format!("{}{}", " ".repeat(width.saturating_sub(s.width())), s)
}

fn pad_right(s: &str, width: usize) -> String {
    format!("{}{}", s, " ".repeat(width.saturating_sub(s.width())))
}
