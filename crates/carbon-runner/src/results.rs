//! The per-year results table.

use crate::Result;
use carbon_raster::RasterStats;
use serde::Serialize;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

/// Biomass statistics of one product year for both boundaries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YearStats {
    /// Product year.
    pub year: u16,
    /// Statistics over the activity area.
    pub activity_area: RasterStats,
    /// Statistics over the project area.
    pub project_area: RasterStats,
}

/// One CSV row; field names are the column headers.
#[derive(Serialize)]
struct CsvRow {
    year: u16,
    #[serde(rename = "AA_AGB_SUM")]
    aa_sum: f64,
    #[serde(rename = "AA_AGB_MEAN")]
    aa_mean: f64,
    #[serde(rename = "PA_AGB_SUM")]
    pa_sum: f64,
    #[serde(rename = "PA_AGB_MEAN")]
    pa_mean: f64,
}

impl From<&YearStats> for CsvRow {
    fn from(row: &YearStats) -> Self {
        Self {
            year: row.year,
            aa_sum: row.activity_area.sum,
            aa_mean: row.activity_area.mean,
            pa_sum: row.project_area.sum,
            pa_mean: row.project_area.mean,
        }
    }
}

/// Outcome of [`ResultsTable::write_once`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The table was written to a new file.
    Written,
    /// A file already existed at the path and was left untouched.
    AlreadyExists,
}

/// Year-ordered table of biomass statistics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultsTable {
    rows: Vec<YearStats>,
}

impl ResultsTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a row, keeping rows ordered by year. A row for an existing year
    /// replaces it.
    pub fn insert(&mut self, row: YearStats) {
        match self.rows.binary_search_by_key(&row.year, |r| r.year) {
            Ok(i) => self.rows[i] = row,
            Err(i) => self.rows.insert(i, row),
        }
    }

    /// Rows in year order.
    pub fn rows(&self) -> &[YearStats] {
        &self.rows
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Write the table as CSV with a header row.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv = csv::Writer::from_writer(writer);
        for row in &self.rows {
            csv.serialize(CsvRow::from(row))?;
        }
        csv.flush()?;
        Ok(())
    }

    /// Write the table to `path` unless a file is already there.
    ///
    /// An existing file is treated as the result of an earlier, complete run
    /// and is never modified.
    pub fn write_once<P: AsRef<Path>>(&self, path: P) -> Result<WriteOutcome> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Ok(WriteOutcome::AlreadyExists)
            }
            Err(e) => return Err(e.into()),
        };

        if let Err(e) = self.write_csv(file) {
            // Do not leave a partial table that later runs would treat as final
            let _ = fs::remove_file(path);
            return Err(e);
        }
        Ok(WriteOutcome::Written)
    }
}

impl fmt::Display for ResultsTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:>6} {:>16} {:>12} {:>16} {:>12}",
            "year", "AA_AGB_SUM", "AA_AGB_MEAN", "PA_AGB_SUM", "PA_AGB_MEAN"
        )?;
        for row in &self.rows {
            writeln!(
                f,
                "{:>6} {:>16.2} {:>12.4} {:>16.2} {:>12.4}",
                row.year,
                row.activity_area.sum,
                row.activity_area.mean,
                row.project_area.sum,
                row.project_area.mean
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(count: u64, sum: f64) -> RasterStats {
        RasterStats {
            count,
            sum,
            mean: if count == 0 { 0.0 } else { sum / count as f64 },
        }
    }

    fn table() -> ResultsTable {
        let mut table = ResultsTable::new();
        table.insert(YearStats {
            year: 2020,
            activity_area: stats(4, 100.0),
            project_area: stats(10, 500.0),
        });
        table.insert(YearStats {
            year: 2010,
            activity_area: stats(0, 0.0),
            project_area: stats(2, 30.0),
        });
        table
    }

    #[test]
    fn test_rows_ordered_by_year() {
        let table = table();
        let years: Vec<u16> = table.rows().iter().map(|r| r.year).collect();
        assert_eq!(years, vec![2010, 2020]);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_insert_replaces_year() {
        let mut table = table();
        table.insert(YearStats {
            year: 2020,
            activity_area: stats(1, 1.0),
            project_area: stats(1, 1.0),
        });
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows()[1].activity_area.sum, 1.0);
    }

    #[test]
    fn test_csv_layout() {
        let mut out = Vec::new();
        table().write_csv(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "year,AA_AGB_SUM,AA_AGB_MEAN,PA_AGB_SUM,PA_AGB_MEAN");
        assert_eq!(lines[1], "2010,0.0,0.0,30.0,15.0");
        assert_eq!(lines[2], "2020,100.0,25.0,500.0,50.0");
    }

    #[test]
    fn test_write_once_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("1234_out.csv");

        assert_eq!(table().write_once(&path).unwrap(), WriteOutcome::Written);
        let first = fs::read_to_string(&path).unwrap();

        let mut other = ResultsTable::new();
        other.insert(YearStats {
            year: 1999,
            activity_area: stats(1, 1.0),
            project_area: stats(1, 1.0),
        });
        assert_eq!(other.write_once(&path).unwrap(), WriteOutcome::AlreadyExists);
        assert_eq!(fs::read_to_string(&path).unwrap(), first);
    }

    #[test]
    fn test_display_has_header_and_rows() {
        let text = table().to_string();
        assert!(text.starts_with("  year"));
        assert_eq!(text.lines().count(), 3);
        assert!(text.contains("500.00"));
    }
}
