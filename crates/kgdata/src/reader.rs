//! Reader for tab-separated atomic files.
//!
//! Every atomic file starts with a header row of `name[:type]` fields, e.g.
//! `user_id:token\titem_id:token\trating:float`. The type suffix is
//! informational and dropped; columns are addressed by name.

use std::io::BufRead;
use std::path::{Path, PathBuf};

use crate::error::{DatasetError, Result};

/// A parsed atomic file: header plus raw string rows.
#[derive(Debug, Clone)]
pub struct AtomicTable {
    path: PathBuf,
    columns: Vec<String>,
    /// `(1-based line number, fields)` for each data row.
    rows: Vec<(usize, Vec<String>)>,
}

impl AtomicTable {
    /// Read an atomic file from disk. Blank lines are skipped.
    pub fn read(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|source| DatasetError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let reader = std::io::BufReader::new(file);

        let mut columns: Option<Vec<String>> = None;
        let mut rows = Vec::new();

        for (idx, line) in reader.lines().enumerate() {
            let line = line.map_err(|source| DatasetError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            let line_no = idx + 1;
            let trimmed = line.trim_end_matches(['\r', '\n']);
            if trimmed.trim().is_empty() {
                continue;
            }

            let fields: Vec<String> = trimmed.split('\t').map(|f| f.trim().to_string()).collect();
            match &columns {
                None => {
                    columns = Some(
                        fields
                            .iter()
                            .map(|f| f.split(':').next().unwrap_or_default().to_string())
                            .collect(),
                    );
                }
                Some(header) => {
                    if fields.len() != header.len() {
                        return Err(DatasetError::Parse {
                            file: path.to_path_buf(),
                            line: line_no,
                            message: format!(
                                "expected {} fields, found {}",
                                header.len(),
                                fields.len()
                            ),
                        });
                    }
                    rows.push((line_no, fields));
                }
            }
        }

        let columns = columns.ok_or_else(|| {
            DatasetError::Empty(format!("{} has no header row", path.display()))
        })?;

        tracing::debug!(
            path = %path.display(),
            columns = columns.len(),
            rows = rows.len(),
            "Read atomic file"
        );

        Ok(Self {
            path: path.to_path_buf(),
            columns,
            rows,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of a required column.
    pub fn column(&self, name: &str) -> Result<usize> {
        self.optional_column(name)
            .ok_or_else(|| DatasetError::MissingColumn {
                file: self.path.clone(),
                column: name.to_string(),
            })
    }

    /// Index of a column that may be absent.
    pub fn optional_column(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Iterate `(line number, fields)` over data rows.
    pub fn rows(&self) -> impl Iterator<Item = (usize, &[String])> {
        self.rows.iter().map(|(line, fields)| (*line, fields.as_slice()))
    }

    /// Parse a numeric field, attributing failures to the row's line.
    pub fn parse_f64(&self, line: usize, column: &str, value: &str) -> Result<f64> {
        value.parse::<f64>().map_err(|e| DatasetError::Parse {
            file: self.path.clone(),
            line,
            message: format!("column `{column}`: cannot parse `{value}` as a number: {e}"),
        })
    }
}
