use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("column override names unknown field {field:?}")]
    UnknownField { field: String },
    #[error("required column {field:?} at index {index} is missing (sheet has {width} header cells)")]
    MissingColumn {
        field: &'static str,
        index: usize,
        width: usize,
    },
    #[error("column {field:?} at index {index} has header {found:?}, expected {expected:?}")]
    HeaderMismatch {
        field: &'static str,
        index: usize,
        expected: String,
        found: String,
    },
}

/// Per-field override read from configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnOverride {
    pub index: Option<usize>,
    pub header: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub field: &'static str,
    pub index: usize,
    /// Header text the sheet must carry at `index`, when pinned.
    pub header: Option<String>,
    /// Required columns must exist in the header row.
    pub required: bool,
}

/// Explicit mapping from record field names to sheet positions.
///
/// For row-oriented sheets the index is a column; for the transposed vehicle sheet it is
/// a row. Either way `validate` checks it against the header cells the record type
/// exposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    columns: Vec<ColumnSpec>,
}

impl ColumnMap {
    pub fn new(columns: Vec<ColumnSpec>) -> Self {
        Self { columns }
    }

    pub fn required(field: &'static str, index: usize) -> ColumnSpec {
        ColumnSpec {
            field,
            index,
            header: None,
            required: true,
        }
    }

    pub fn optional(field: &'static str, index: usize) -> ColumnSpec {
        ColumnSpec {
            field,
            index,
            header: None,
            required: false,
        }
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    /// Applies configuration overrides. Every override must name a known field.
    pub fn with_overrides(
        mut self,
        overrides: &BTreeMap<String, ColumnOverride>,
    ) -> Result<Self, SchemaError> {
        for (field, column_override) in overrides {
            let spec = self
                .columns
                .iter_mut()
                .find(|c| c.field == field.as_str())
                .ok_or_else(|| SchemaError::UnknownField {
                    field: field.clone(),
                })?;
            if let Some(index) = column_override.index {
                spec.index = index;
            }
            if let Some(header) = &column_override.header {
                spec.header = Some(header.clone());
            }
        }
        Ok(self)
    }

    pub fn index_of(&self, field: &str) -> Option<usize> {
        self.columns
            .iter()
            .find(|c| c.field == field)
            .map(|c| c.index)
    }

    /// Returns the trimmed cell for `field`, or `""` when the row is too short.
    pub fn cell<'a>(&self, row: &'a [String], field: &str) -> &'a str {
        self.index_of(field)
            .and_then(|index| row.get(index))
            .map_or("", |cell| cell.trim())
    }

    pub fn validate<S: AsRef<str>>(&self, headers: &[S]) -> Result<(), SchemaError> {
        for spec in &self.columns {
            let found = headers.get(spec.index).map(|h| h.as_ref().trim());
            match (found, &spec.header) {
                (None, Some(expected)) => {
                    return Err(SchemaError::HeaderMismatch {
                        field: spec.field,
                        index: spec.index,
                        expected: expected.clone(),
                        found: String::new(),
                    });
                }
                (None, None) if spec.required => {
                    return Err(SchemaError::MissingColumn {
                        field: spec.field,
                        index: spec.index,
                        width: headers.len(),
                    });
                }
                // Lowercase rather than ASCII folding: headers carry umlauts.
                (Some(found), Some(expected))
                    if found.to_lowercase() != expected.trim().to_lowercase() =>
                {
                    return Err(SchemaError::HeaderMismatch {
                        field: spec.field,
                        index: spec.index,
                        expected: expected.clone(),
                        found: found.to_string(),
                    });
                }
                _ => {}
            }
        }
        Ok(())
    }
}
