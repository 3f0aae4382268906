//! Returns tables and flat-file ingestion
//!
//! The core only ever borrows a [`ReturnsTable`]. Where it comes from is the
//! business of a [`ReturnsLoader`]: a CSV file written by the price pipeline,
//! or a table built in memory by the caller.
//!
//! CSV layout for both prices and returns: a header row whose first cell names
//! the row index (usually `Date`) followed by one asset identifier per column,
//! then one row per period.

use crate::error::{Result, RiskError};
use crate::weights::PortfolioWeights;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Time-ordered per-asset log returns (T rows × N asset columns)
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnsTable {
    assets: Vec<String>,
    index: Vec<String>,
    data: DMatrix<f64>,
}

impl ReturnsTable {
    /// Build a table from asset ids, row labels and a T×N matrix
    ///
    /// Rejects shape disagreements and any non-finite value: missing data
    /// must be resolved before a table exists.
    pub fn new(assets: Vec<String>, index: Vec<String>, data: DMatrix<f64>) -> Result<Self> {
        if assets.is_empty() {
            return Err(RiskError::Data("returns table has no asset columns".to_string()));
        }
        if data.ncols() != assets.len() {
            return Err(RiskError::dimension("returns columns", assets.len(), data.ncols()));
        }
        if data.nrows() != index.len() {
            return Err(RiskError::dimension("returns index", index.len(), data.nrows()));
        }
        if let Some(pos) = data.iter().position(|v| !v.is_finite()) {
            // nalgebra storage is column-major
            let (row, col) = (pos % data.nrows(), pos / data.nrows());
            return Err(RiskError::Data(format!(
                "missing or non-finite return at row {} ({}), asset {}",
                row, index[row], assets[col]
            )));
        }

        Ok(Self { assets, index, data })
    }

    /// Build a table from row vectors, labelling rows `0..T`
    pub fn from_rows(assets: Vec<String>, rows: &[Vec<f64>]) -> Result<Self> {
        let n = assets.len();
        if let Some(bad) = rows.iter().find(|r| r.len() != n) {
            return Err(RiskError::dimension("returns row", n, bad.len()));
        }

        let flat: Vec<f64> = rows.iter().flatten().copied().collect();
        let data = DMatrix::from_row_slice(rows.len(), n, &flat);
        let index = (0..rows.len()).map(|i| i.to_string()).collect();
        Self::new(assets, index, data)
    }

    /// Asset identifiers in column order
    pub fn assets(&self) -> &[String] {
        &self.assets
    }

    /// Row labels in time order
    pub fn index(&self) -> &[String] {
        &self.index
    }

    /// Number of assets N
    pub fn n_assets(&self) -> usize {
        self.assets.len()
    }

    /// Number of observations T
    pub fn n_observations(&self) -> usize {
        self.data.nrows()
    }

    /// Underlying T×N matrix
    pub fn as_matrix(&self) -> &DMatrix<f64> {
        &self.data
    }

    /// Observed portfolio return per period, `R · w`, in time order
    pub fn portfolio_returns(&self, weights: &PortfolioWeights) -> Result<Vec<f64>> {
        if weights.len() != self.n_assets() {
            return Err(RiskError::dimension("weights", self.n_assets(), weights.len()));
        }

        let projected = &self.data * weights.as_vector();
        Ok(projected.iter().copied().collect())
    }
}

/// Time-ordered asset prices; missing quotes are NaN
#[derive(Debug, Clone, PartialEq)]
pub struct PriceTable {
    assets: Vec<String>,
    index: Vec<String>,
    data: DMatrix<f64>,
}

impl PriceTable {
    /// Build a price table; values may be NaN
    pub fn new(assets: Vec<String>, index: Vec<String>, data: DMatrix<f64>) -> Result<Self> {
        if data.ncols() != assets.len() {
            return Err(RiskError::dimension("price columns", assets.len(), data.ncols()));
        }
        if data.nrows() != index.len() {
            return Err(RiskError::dimension("price index", index.len(), data.nrows()));
        }
        Ok(Self { assets, index, data })
    }

    /// Read a price table from a CSV file
    pub fn from_csv_path(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        Self::from_csv_reader(file)
    }

    /// Read a price table from any CSV source
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let raw = read_csv_table(reader)?;
        Self::new(raw.assets, raw.index, raw.data)
    }

    /// Asset identifiers in column order
    pub fn assets(&self) -> &[String] {
        &self.assets
    }

    /// Number of price rows
    pub fn n_observations(&self) -> usize {
        self.data.nrows()
    }
}

/// Compute `ln(P_t / P_{t-1})` for every asset and drop incomplete rows
///
/// The first price row has no predecessor and never produces a return. Any
/// row where some asset's return is not finite (missing quote, non-positive
/// price) is dropped entirely.
pub fn log_returns(prices: &PriceTable) -> Result<ReturnsTable> {
    let (t, n) = prices.data.shape();
    let mut rows: Vec<f64> = Vec::with_capacity(t.saturating_sub(1) * n);
    let mut index = Vec::with_capacity(t.saturating_sub(1));
    let mut dropped = 0usize;

    for row in 1..t {
        let returns: Vec<f64> = (0..n)
            .map(|col| (prices.data[(row, col)] / prices.data[(row - 1, col)]).ln())
            .collect();

        if returns.iter().all(|r| r.is_finite()) {
            rows.extend(returns);
            index.push(prices.index[row].clone());
        } else {
            dropped += 1;
        }
    }

    debug!(
        kept = index.len(),
        dropped, "computed log returns from {} price rows", t
    );

    let data = DMatrix::from_row_slice(index.len(), n, &rows);
    ReturnsTable::new(prices.assets.clone(), index, data)
}

/// Source of returns tables for the risk core
pub trait ReturnsLoader {
    /// Produce a fully resolved returns table
    fn load(&self) -> Result<ReturnsTable>;
}

/// Location of a returns table on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Path to the returns CSV
    pub path: PathBuf,
}

/// Loads a returns table from a CSV file
#[derive(Debug, Clone)]
pub struct CsvReturnsLoader {
    config: LoaderConfig,
}

impl CsvReturnsLoader {
    /// Create a loader for the configured path
    pub fn new(config: LoaderConfig) -> Self {
        Self { config }
    }

    /// Create a loader directly from a path
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self::new(LoaderConfig { path: path.into() })
    }

    /// Parse a returns table from any CSV source
    pub fn read<R: Read>(reader: R) -> Result<ReturnsTable> {
        let raw = read_csv_table(reader)?;
        ReturnsTable::new(raw.assets, raw.index, raw.data)
    }
}

impl ReturnsLoader for CsvReturnsLoader {
    fn load(&self) -> Result<ReturnsTable> {
        debug!(path = %self.config.path.display(), "loading returns table");
        let file = std::fs::File::open(&self.config.path)?;
        Self::read(file)
    }
}

/// Hands out a clone of a table the caller already holds
#[derive(Debug, Clone)]
pub struct InMemoryReturnsLoader {
    table: ReturnsTable,
}

impl InMemoryReturnsLoader {
    pub fn new(table: ReturnsTable) -> Self {
        Self { table }
    }
}

impl ReturnsLoader for InMemoryReturnsLoader {
    fn load(&self) -> Result<ReturnsTable> {
        Ok(self.table.clone())
    }
}

/// Write a returns table as CSV with a `Date` index column
pub fn write_returns_csv<W: Write>(table: &ReturnsTable, writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);

    let mut header = vec!["Date".to_string()];
    header.extend(table.assets.iter().cloned());
    wtr.write_record(&header)?;

    for (row, label) in table.index.iter().enumerate() {
        let mut record = vec![label.clone()];
        record.extend(table.data.row(row).iter().map(|v| v.to_string()));
        wtr.write_record(&record)?;
    }

    wtr.flush()?;
    Ok(())
}

/// Write a returns table to a file path, creating parent directories
pub fn write_returns_csv_path(table: &ReturnsTable, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let file = std::fs::File::create(path)?;
    write_returns_csv(table, file)
}

struct RawTable {
    assets: Vec<String>,
    index: Vec<String>,
    data: DMatrix<f64>,
}

fn read_csv_table<R: Read>(reader: R) -> Result<RawTable> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    if headers.len() < 2 {
        return Err(RiskError::Data(
            "expected an index column followed by at least one asset column".to_string(),
        ));
    }
    let assets: Vec<String> = headers.iter().skip(1).map(str::to_string).collect();

    let mut index = Vec::new();
    let mut values = Vec::new();
    for (line, record) in rdr.records().enumerate() {
        let record = record?;
        if record.len() != headers.len() {
            return Err(RiskError::dimension(
                format!("csv record {}", line + 1),
                headers.len(),
                record.len(),
            ));
        }

        index.push(record[0].to_string());
        for cell in record.iter().skip(1) {
            values.push(parse_cell(cell, line + 1)?);
        }
    }

    let data = DMatrix::from_row_slice(index.len(), assets.len(), &values);
    Ok(RawTable { assets, index, data })
}

fn parse_cell(cell: &str, line: usize) -> Result<f64> {
    if cell.is_empty() {
        return Ok(f64::NAN);
    }
    cell.parse::<f64>()
        .map_err(|e| RiskError::Data(format!("record {}: cannot parse '{}': {}", line, cell, e)))
}
