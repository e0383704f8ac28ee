//! Tab-delimited expression matrix codec.
//!
//! Matrices travel inside JSON string fields, so tab and newline are the
//! literal two-character escape sequences `\t` and `\n`. The header row
//! lists sample labels; when it starts with a tab the identifier column is
//! named `Gene`. Subsequent rows begin with a gene/protein identifier
//! followed by one numeric value per sample. `NA` and empty cells read as
//! zero.

use thiserror::Error;

/// Errors produced while decoding a matrix
#[derive(Error, Debug, PartialEq, Eq)]
pub enum MatrixError {
    #[error("Expression matrix must contain a header and at least one data row")]
    TooFewLines,

    #[error("Row {row} has {found} values but the matrix has {expected} samples")]
    Ragged {
        row: usize,
        found: usize,
        expected: usize,
    },

    #[error("Value '{value}' in row {row} is not numeric. Expression tables must contain numeric values per sample.")]
    NonNumeric { row: usize, value: String },

    #[error("Table contains duplicate genes: '{0}'")]
    DuplicateIdentifier(String),

    #[error("Invalid column '{0}'. Did you submit an analysis result instead of an expression table?")]
    ReservedColumn(String),

    #[error("Illegal character in data: '#'")]
    IllegalCharacter,
}

/// A decoded expression matrix: rows are genes, columns are samples
#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionMatrix {
    identifiers: Vec<String>,
    samples: Vec<String>,
    values: Vec<Vec<f64>>,
}

impl ExpressionMatrix {
    /// Decode a matrix from its wire representation
    pub fn parse(raw: &str) -> Result<Self, MatrixError> {
        if raw.contains('#') {
            return Err(MatrixError::IllegalCharacter);
        }

        let unescaped = unescape(raw);
        let mut lines = unescaped
            .lines()
            .map(str::trim_end)
            .filter(|line| !line.is_empty());

        let header = lines.next().ok_or(MatrixError::TooFewLines)?;
        let header = if header.starts_with('\t') {
            format!("Gene{}", header)
        } else {
            header.to_string()
        };

        let mut header_fields = header.split('\t').map(str::trim);
        // Leading field names the identifier column
        let _id_column = header_fields.next().ok_or(MatrixError::TooFewLines)?;
        let samples: Vec<String> = header_fields.map(|s| s.to_string()).collect();

        for sample in &samples {
            if sample.eq_ignore_ascii_case("pvalue") || sample.eq_ignore_ascii_case("fdr") {
                return Err(MatrixError::ReservedColumn(sample.clone()));
            }
        }

        let mut identifiers = Vec::new();
        let mut values = Vec::new();

        for (row, line) in lines.enumerate() {
            let mut fields = line.split('\t').map(str::trim);
            let identifier = fields.next().unwrap_or("").to_string();

            let mut row_values = Vec::with_capacity(samples.len());
            for field in fields {
                if field.is_empty() || field.eq_ignore_ascii_case("na") {
                    row_values.push(0.0);
                    continue;
                }
                let value: f64 = field.parse().map_err(|_| MatrixError::NonNumeric {
                    row: row + 1,
                    value: field.to_string(),
                })?;
                row_values.push(value);
            }

            if row_values.len() != samples.len() {
                return Err(MatrixError::Ragged {
                    row: row + 1,
                    found: row_values.len(),
                    expected: samples.len(),
                });
            }

            identifiers.push(identifier);
            values.push(row_values);
        }

        if values.is_empty() {
            return Err(MatrixError::TooFewLines);
        }

        let matrix = Self {
            identifiers,
            samples,
            values,
        };
        matrix.check_unique_identifiers()?;
        Ok(matrix)
    }

    fn check_unique_identifiers(&self) -> Result<(), MatrixError> {
        let mut seen = std::collections::HashSet::new();
        for identifier in &self.identifiers {
            if !seen.insert(identifier) {
                return Err(MatrixError::DuplicateIdentifier(identifier.clone()));
            }
        }
        Ok(())
    }

    pub fn n_rows(&self) -> usize {
        self.identifiers.len()
    }

    pub fn n_samples(&self) -> usize {
        self.samples.len()
    }

    pub fn identifiers(&self) -> &[String] {
        &self.identifiers
    }

    pub fn samples(&self) -> &[String] {
        &self.samples
    }

    pub fn row(&self, index: usize) -> &[f64] {
        &self.values[index]
    }

    pub fn value(&self, row: usize, column: usize) -> f64 {
        self.values[row][column]
    }

    pub fn set_value(&mut self, row: usize, column: usize, value: f64) {
        self.values[row][column] = value;
    }

    /// Column values in row order
    pub fn column(&self, index: usize) -> Vec<f64> {
        self.values.iter().map(|row| row[index]).collect()
    }

    /// Keep only the rows at the given indices, preserving order
    pub fn retain_rows(&self, rows: &[usize]) -> Self {
        Self {
            identifiers: rows.iter().map(|&i| self.identifiers[i].clone()).collect(),
            samples: self.samples.clone(),
            values: rows.iter().map(|&i| self.values[i].clone()).collect(),
        }
    }

    /// Build a matrix directly from parts; used by kernels deriving new
    /// matrices (e.g. translational efficiency).
    pub fn from_parts(
        identifiers: Vec<String>,
        samples: Vec<String>,
        values: Vec<Vec<f64>>,
    ) -> Self {
        Self {
            identifiers,
            samples,
            values,
        }
    }

    /// Serialize to plain tab-delimited text with a leading-tab header
    pub fn to_tsv(&self) -> String {
        let mut out = String::new();
        for sample in &self.samples {
            out.push('\t');
            out.push_str(sample);
        }
        out.push('\n');
        for (identifier, row) in self.identifiers.iter().zip(&self.values) {
            out.push_str(identifier);
            for value in row {
                out.push('\t');
                out.push_str(&format_value(*value));
            }
            out.push('\n');
        }
        out
    }
}

fn format_value(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// Turn the literal `\t` / `\n` escape sequences into real characters
fn unescape(raw: &str) -> String {
    raw.replace("\\t", "\t").replace("\\n", "\n")
}
