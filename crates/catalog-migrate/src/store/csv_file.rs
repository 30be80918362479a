//! Delimited text file source adapter.
//!
//! Reads a whole file up front (the catalog is bounded) so that repeated
//! paging with the same filter and offset always returns the same rows, which
//! the extractor requires for safe retry. Expected header:
//! `name, company_name, price, stock, sku, category, description` with
//! optional `status`.

use std::path::Path;

use tracing::debug;

use crate::error::{MigrateError, Result};
use crate::record::{RawRow, RecordFilter, RecordStatus};
use crate::store::{RecordPage, SourceReader};

use async_trait::async_trait;

/// File-backed [`SourceReader`] over delimited text.
#[derive(Debug)]
pub struct CsvFileSource {
    rows: Vec<RawRow>,
}

impl CsvFileSource {
    /// Open a comma-delimited file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_delimiter(path, b',')
    }

    /// Open a file with an explicit delimiter byte.
    pub fn open_with_delimiter<P: AsRef<Path>>(path: P, delimiter: u8) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .trim(csv::Trim::All)
            .flexible(true)
            .from_path(path)
            .map_err(|e| MigrateError::Source(format!("cannot open {}: {}", path.display(), e)))?;

        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_ascii_lowercase())
            .collect();
        if !headers.iter().any(|h| h == "name") {
            return Err(MigrateError::Source(format!(
                "{}: header row has no 'name' column (got: {})",
                path.display(),
                headers.join(", ")
            )));
        }

        let mut rows = Vec::new();
        for (index, result) in reader.records().enumerate() {
            let record = result?;
            let mut row = RawRow::new(index as u64);
            for (header, value) in headers.iter().zip(record.iter()) {
                row.insert(header, value);
            }
            rows.push(row);
        }

        debug!(path = %path.display(), rows = rows.len(), "loaded delimited source");
        Ok(Self { rows })
    }

    /// Whether a raw row matches the filter. Status defaults to active when
    /// the column is absent; category comparison is against the source text
    /// (the fallback category only exists after transformation).
    fn row_matches(row: &RawRow, filter: &RecordFilter) -> bool {
        if let Some(status) = filter.status {
            let row_status = row
                .get_trimmed("status")
                .map(RecordStatus::parse)
                .unwrap_or_default();
            if row_status != status {
                return false;
            }
        }
        if let Some(ref category) = filter.category {
            if row.get_trimmed("category") != Some(category.as_str()) {
                return false;
            }
        }
        true
    }
}

#[async_trait]
impl SourceReader for CsvFileSource {
    async fn list_records(
        &self,
        filter: &RecordFilter,
        limit: usize,
        offset: u64,
    ) -> Result<RecordPage> {
        let matching: Vec<&RawRow> = self
            .rows
            .iter()
            .filter(|row| Self::row_matches(row, filter))
            .collect();

        let total_count = matching.len() as u64;
        let total_pages = if limit == 0 {
            0
        } else {
            total_count.div_ceil(limit as u64)
        };

        let rows = matching
            .into_iter()
            .skip(offset as usize)
            .take(limit)
            .cloned()
            .collect();

        Ok(RecordPage {
            rows,
            total_count,
            total_pages,
        })
    }
}
