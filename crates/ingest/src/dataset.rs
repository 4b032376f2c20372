//! Dataset parsing, validation, and imputation.
//!
//! The upload artifact is a CSV with one header row and four required
//! columns: date, product_id, category, sales. Sales cells may be empty
//! (missing); dates must parse as calendar dates.

use std::path::Path;

use chrono::NaiveDate;
use tracing::debug;

use tidecast_core::model::FactRow;

use crate::error::IngestError;

/// Column names the dataset must carry (matched case-insensitively).
pub const REQUIRED_COLUMNS: [&str; 4] = ["date", "product_id", "category", "sales"];

/// A parsed, imputed dataset ready for upsert.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub rows: Vec<FactRow>,
    /// Row count before any processing.
    pub num_total_rows: i64,
    /// Empty sales cells, counted before imputation.
    pub num_missing_rows: i64,
    /// Rows whose value was filled in; always equals `num_missing_rows`.
    pub num_imputed_rows: i64,
}

struct Columns {
    date: usize,
    product_id: usize,
    category: usize,
    sales: usize,
}

fn resolve_columns(headers: &csv::StringRecord) -> Result<Columns, IngestError> {
    let find = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name))
    };

    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|name| find(name).is_none())
        .collect();
    if !missing.is_empty() {
        return Err(IngestError::Validation(format!(
            "missing required columns: {}",
            missing.join(", ")
        )));
    }

    Ok(Columns {
        date: find("date").unwrap(),
        product_id: find("product_id").unwrap(),
        category: find("category").unwrap(),
        sales: find("sales").unwrap(),
    })
}

fn parse_date(cell: &str, line: usize) -> Result<NaiveDate, IngestError> {
    let cell = cell.trim();
    // ISO first; slashed forms show up in exported spreadsheets.
    NaiveDate::parse_from_str(cell, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(cell, "%Y/%m/%d"))
        .map_err(|_| {
            IngestError::Validation(format!("row {line}: unparsable date '{cell}'"))
        })
}

/// Parse and impute the dataset at `path`.
///
/// Imputation scans rows in raw file order with no grouping: an empty
/// sales cell takes the nearest preceding non-missing value, or 0 when
/// nothing precedes it. Non-finite tokens (NaN, inf) count as missing
/// too. Imputed rows are flagged.
pub fn parse_dataset(path: &Path) -> Result<Dataset, IngestError> {
    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| IngestError::Validation(format!("cannot read dataset: {e}")))?;

    let headers = reader
        .headers()
        .map_err(|e| IngestError::Validation(format!("cannot read header row: {e}")))?
        .clone();
    let columns = resolve_columns(&headers)?;

    let mut rows = Vec::new();
    let mut num_missing = 0i64;
    let mut last_value: Option<f64> = None;

    for (idx, result) in reader.records().enumerate() {
        // Header is line 1; data starts at line 2.
        let line = idx + 2;
        let record =
            result.map_err(|e| IngestError::Validation(format!("row {line}: {e}")))?;

        let date = parse_date(record.get(columns.date).unwrap_or(""), line)?;
        let product_id = record.get(columns.product_id).unwrap_or("").trim().to_string();
        let category = record.get(columns.category).unwrap_or("").trim().to_string();

        let sales_cell = record.get(columns.sales).unwrap_or("").trim();
        let observed = if sales_cell.is_empty() {
            None
        } else {
            let value: f64 = sales_cell.parse().map_err(|_| {
                IngestError::Validation(format!(
                    "row {line}: unparsable sales value '{sales_cell}'"
                ))
            })?;
            // NaN and infinity parse but are not observations; treat
            // them like empty cells so they get filled, not stored.
            value.is_finite().then_some(value)
        };
        let (sales, is_imputed) = match observed {
            Some(value) => {
                last_value = Some(value);
                (value, false)
            }
            None => {
                num_missing += 1;
                (last_value.unwrap_or(0.0), true)
            }
        };

        rows.push(FactRow {
            date,
            product_id,
            category,
            sales,
            is_imputed,
        });
    }

    debug!(
        total = rows.len(),
        missing = num_missing,
        "dataset parsed"
    );

    Ok(Dataset {
        num_total_rows: rows.len() as i64,
        num_missing_rows: num_missing,
        num_imputed_rows: num_missing,
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_csv(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_forward_fill_imputation() {
        let file = write_csv(
            "Date,product_id,category,sales\n\
             2024-01-01,P1,A,100\n\
             2024-01-02,P1,A,\n\
             2024-01-03,P1,A,50\n",
        );
        let ds = parse_dataset(file.path()).unwrap();
        assert_eq!(ds.num_total_rows, 3);
        assert_eq!(ds.num_missing_rows, 1);
        assert_eq!(ds.num_imputed_rows, 1);
        assert_eq!(ds.rows[1].sales, 100.0);
        assert!(ds.rows[1].is_imputed);
        assert!(!ds.rows[0].is_imputed);
        assert!(!ds.rows[2].is_imputed);
    }

    #[test]
    fn test_leading_missing_imputes_to_zero() {
        let file = write_csv(
            "date,product_id,category,sales\n\
             2024-01-01,P1,A,\n\
             2024-01-02,P1,A,7.5\n",
        );
        let ds = parse_dataset(file.path()).unwrap();
        assert_eq!(ds.rows[0].sales, 0.0);
        assert!(ds.rows[0].is_imputed);
        assert_eq!(ds.num_missing_rows, 1);
    }

    #[test]
    fn test_fill_crosses_products_in_file_order() {
        // No grouping: the fill value comes from the previous row in the
        // file, whatever product or category it belongs to.
        let file = write_csv(
            "date,product_id,category,sales\n\
             2024-01-01,P1,A,10\n\
             2024-01-01,P2,B,\n",
        );
        let ds = parse_dataset(file.path()).unwrap();
        assert_eq!(ds.rows[1].sales, 10.0);
    }

    #[test]
    fn test_missing_columns_all_named() {
        let file = write_csv("date,sales\n2024-01-01,5\n");
        let err = parse_dataset(file.path()).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("product_id"), "got: {msg}");
        assert!(msg.contains("category"), "got: {msg}");
        assert!(!msg.contains("sales"), "got: {msg}");
    }

    #[test]
    fn test_header_match_is_case_insensitive() {
        let file = write_csv("DATE,Product_ID,Category,SALES\n2024-01-01,P1,A,3\n");
        let ds = parse_dataset(file.path()).unwrap();
        assert_eq!(ds.rows.len(), 1);
        assert_eq!(ds.rows[0].product_id, "P1");
    }

    #[test]
    fn test_unparsable_date_names_row() {
        let file = write_csv(
            "date,product_id,category,sales\n\
             2024-01-01,P1,A,1\n\
             not-a-date,P1,A,2\n",
        );
        let err = parse_dataset(file.path()).unwrap_err();
        assert!(err.to_string().contains("row 3"), "got: {err}");
    }

    #[test]
    fn test_non_finite_sales_counted_missing_and_filled() {
        let file = write_csv(
            "date,product_id,category,sales\n\
             2024-01-01,P1,A,100\n\
             2024-01-02,P1,A,NaN\n\
             2024-01-03,P1,A,inf\n\
             2024-01-04,P1,A,50\n",
        );
        let ds = parse_dataset(file.path()).unwrap();
        assert_eq!(ds.num_missing_rows, 2);
        assert_eq!(ds.num_imputed_rows, 2);
        assert_eq!(ds.rows[1].sales, 100.0);
        assert!(ds.rows[1].is_imputed);
        assert_eq!(ds.rows[2].sales, 100.0);
        assert!(ds.rows[2].is_imputed);
        assert!(ds.rows.iter().all(|r| r.sales.is_finite()));
    }

    #[test]
    fn test_unparsable_sales_value_rejected() {
        let file = write_csv("date,product_id,category,sales\n2024-01-01,P1,A,abc\n");
        let err = parse_dataset(file.path()).unwrap_err();
        assert!(err.to_string().contains("unparsable sales value"), "got: {err}");
    }

    #[test]
    fn test_slashed_dates_accepted() {
        let file = write_csv("date,product_id,category,sales\n2024/01/05,P1,A,1\n");
        let ds = parse_dataset(file.path()).unwrap();
        assert_eq!(ds.rows[0].date, "2024-01-05".parse().unwrap());
    }

    #[test]
    fn test_empty_dataset_is_valid() {
        let file = write_csv("date,product_id,category,sales\n");
        let ds = parse_dataset(file.path()).unwrap();
        assert_eq!(ds.num_total_rows, 0);
        assert!(ds.rows.is_empty());
    }
}
