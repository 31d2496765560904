//! Consumption records and their loading
//!
//! Normalized history is a table of `county, year, month, kwh_per_household`.
//! It is either read directly or derived from raw sector consumption and
//! household counts by [`DataLoader::normalize`].

use crate::calendar::YearMonth;
use crate::county::canonical_county;
use crate::error::{ForecastError, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::path::Path;
use tracing::{debug, info, warn};

/// kWh in one GWh
const KWH_PER_GWH: f64 = 1_000_000.0;

/// One month of per-household consumption for one county
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumptionRecord {
    county: String,
    period: YearMonth,
    kwh_per_household: f64,
}

impl ConsumptionRecord {
    /// Create a validated record; the county name is canonicalized
    pub fn new(county: &str, year: i32, month: u32, kwh_per_household: f64) -> Result<Self> {
        let county = canonical_county(county);
        if county.is_empty() {
            return Err(ForecastError::DataError(
                "County name must not be empty".to_string(),
            ));
        }
        if !kwh_per_household.is_finite() || kwh_per_household < 0.0 {
            return Err(ForecastError::DataError(format!(
                "kWh per household must be a non-negative number, got {} for {} {}-{:02}",
                kwh_per_household, county, year, month
            )));
        }

        Ok(Self {
            county,
            period: YearMonth::new(year, month)?,
            kwh_per_household,
        })
    }

    pub fn county(&self) -> &str {
        &self.county
    }

    pub fn period(&self) -> YearMonth {
        self.period
    }

    pub fn year(&self) -> i32 {
        self.period.year()
    }

    pub fn month(&self) -> u32 {
        self.period.month()
    }

    pub fn kwh_per_household(&self) -> f64 {
        self.kwh_per_household
    }
}

/// Flat CSV representation of a record
#[derive(Debug, Serialize, Deserialize)]
struct RecordRow {
    county: String,
    year: i32,
    month: u32,
    kwh_per_household: f64,
}

impl From<&ConsumptionRecord> for RecordRow {
    fn from(record: &ConsumptionRecord) -> Self {
        Self {
            county: record.county.clone(),
            year: record.year(),
            month: record.month(),
            kwh_per_household: record.kwh_per_household,
        }
    }
}

/// Chronologically ordered history of a single county
#[derive(Debug, Clone, PartialEq)]
pub struct CountySeries {
    county: String,
    records: Vec<ConsumptionRecord>,
    by_period: BTreeMap<YearMonth, f64>,
}

impl CountySeries {
    /// Build a series, sorting records and rejecting duplicates or foreign counties
    pub fn new(county: &str, mut records: Vec<ConsumptionRecord>) -> Result<Self> {
        let county = canonical_county(county);
        if records.is_empty() {
            return Err(ForecastError::DataError(format!(
                "No records for county '{}'",
                county
            )));
        }
        if let Some(foreign) = records.iter().find(|r| r.county != county) {
            return Err(ForecastError::DataError(format!(
                "Record for '{}' cannot be part of the '{}' series",
                foreign.county, county
            )));
        }

        records.sort_by_key(|r| r.period);

        let mut by_period = BTreeMap::new();
        for record in &records {
            if by_period
                .insert(record.period, record.kwh_per_household)
                .is_some()
            {
                return Err(ForecastError::DataError(format!(
                    "Duplicate record for '{}' at {}",
                    county, record.period
                )));
            }
        }

        Ok(Self {
            county,
            records,
            by_period,
        })
    }

    /// Convenience constructor from `(period, value)` pairs
    pub fn from_values(county: &str, values: &[(YearMonth, f64)]) -> Result<Self> {
        let records = values
            .iter()
            .map(|(period, kwh)| ConsumptionRecord::new(county, period.year(), period.month(), *kwh))
            .collect::<Result<Vec<_>>>()?;
        Self::new(county, records)
    }

    pub fn county(&self) -> &str {
        &self.county
    }

    pub fn records(&self) -> &[ConsumptionRecord] {
        &self.records
    }

    /// Observed value for `period`, if the series has one
    pub fn value_at(&self, period: YearMonth) -> Option<f64> {
        self.by_period.get(&period).copied()
    }

    /// Most recent observed value at or before `period`
    pub fn latest_at_or_before(&self, period: YearMonth) -> Option<(YearMonth, f64)> {
        self.by_period
            .range(..=period)
            .next_back()
            .map(|(p, v)| (*p, *v))
    }

    pub fn first_period(&self) -> YearMonth {
        self.records[0].period
    }

    pub fn last_period(&self) -> YearMonth {
        self.records[self.records.len() - 1].period
    }

    pub fn values(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.kwh_per_household).collect()
    }

    pub fn periods(&self) -> Vec<YearMonth> {
        self.records.iter().map(|r| r.period).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records up to and including `cutoff`
    pub fn truncate_after(&self, cutoff: YearMonth) -> Result<Self> {
        let kept: Vec<_> = self
            .records
            .iter()
            .filter(|r| r.period <= cutoff)
            .cloned()
            .collect();
        Self::new(&self.county, kept)
    }
}

/// Source of recent actuals for a county
pub trait HistoryProvider: std::fmt::Debug + Send + Sync {
    /// The county's observed series, if any is known
    fn series(&self, county: &str) -> Option<&CountySeries>;
}

/// Consumption history for many counties, grouped per county
#[derive(Debug, Clone, Default)]
pub struct ConsumptionHistory {
    series: BTreeMap<String, CountySeries>,
}

impl ConsumptionHistory {
    /// Group records by county; each county's records become one series
    pub fn from_records(records: Vec<ConsumptionRecord>) -> Result<Self> {
        let mut grouped: BTreeMap<String, Vec<ConsumptionRecord>> = BTreeMap::new();
        for record in records {
            grouped
                .entry(record.county.clone())
                .or_default()
                .push(record);
        }

        let series = grouped
            .into_iter()
            .map(|(county, records)| {
                let series = CountySeries::new(&county, records)?;
                Ok((county, series))
            })
            .collect::<Result<BTreeMap<_, _>>>()?;

        Ok(Self { series })
    }

    /// Sorted canonical county names
    pub fn counties(&self) -> Vec<String> {
        self.series.keys().cloned().collect()
    }

    pub fn get(&self, county: &str) -> Option<&CountySeries> {
        self.series.get(&canonical_county(county))
    }

    pub fn iter(&self) -> impl Iterator<Item = &CountySeries> {
        self.series.values()
    }

    /// All records, ordered by county then period
    pub fn records(&self) -> Vec<ConsumptionRecord> {
        self.series
            .values()
            .flat_map(|s| s.records().iter().cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

impl HistoryProvider for ConsumptionHistory {
    fn series(&self, county: &str) -> Option<&CountySeries> {
        self.get(county)
    }
}

/// Filters applied when normalizing raw consumption
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizeOptions {
    /// Only rows of this sector are kept
    pub sector: String,
    /// First year kept (inclusive)
    pub first_year: i32,
    /// Last year kept (inclusive)
    pub last_year: i32,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            sector: "Residential".to_string(),
            first_year: 2022,
            last_year: 2024,
        }
    }
}

/// Data loader for consumption tables
#[derive(Debug)]
pub struct DataLoader;

impl DataLoader {
    /// Load normalized records from a CSV file
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Vec<ConsumptionRecord>> {
        let df = Self::read_frame(path)?;
        Self::from_dataframe(&df)
    }

    /// Load normalized records from a CSV file, grouped per county
    pub fn history_from_csv<P: AsRef<Path>>(path: P) -> Result<ConsumptionHistory> {
        ConsumptionHistory::from_records(Self::from_csv(path)?)
    }

    /// Convert a normalized DataFrame into records
    pub fn from_dataframe(df: &DataFrame) -> Result<Vec<ConsumptionRecord>> {
        Self::require_columns(df, &["county", "year", "month", "kwh_per_household"])?;

        let counties = string_column(df, "county")?;
        let years = i64_column(df, "year")?;
        let months = i64_column(df, "month")?;
        let values = f64_column(df, "kwh_per_household")?;

        let mut records = Vec::with_capacity(df.height());
        let mut skipped = 0usize;
        for i in 0..df.height() {
            match (&counties[i], years[i], months[i], values[i]) {
                (Some(county), Some(year), Some(month), Some(kwh)) => {
                    records.push(ConsumptionRecord::new(
                        county,
                        to_year(year)?,
                        to_month(month)?,
                        kwh,
                    )?);
                }
                _ => skipped += 1,
            }
        }

        if skipped > 0 {
            warn!(skipped, "dropped normalized rows with missing values");
        }
        debug!(records = records.len(), "loaded normalized consumption");
        Ok(records)
    }

    /// Normalize raw consumption and household CSV files
    pub fn normalize_csv<P: AsRef<Path>, Q: AsRef<Path>>(
        electricity: P,
        households: Q,
        options: &NormalizeOptions,
    ) -> Result<Vec<ConsumptionRecord>> {
        let electricity = Self::read_frame(electricity)?;
        let households = Self::read_frame(households)?;
        Self::normalize(&electricity, &households, options)
    }

    /// Derive per-household consumption
    ///
    /// Keeps rows of the configured sector and year range, inner-joins them
    /// with household counts on `(county, year)` and converts GWh to kWh per
    /// household. Output is sorted by county, year and month.
    pub fn normalize(
        electricity: &DataFrame,
        households: &DataFrame,
        options: &NormalizeOptions,
    ) -> Result<Vec<ConsumptionRecord>> {
        if options.first_year > options.last_year {
            return Err(ForecastError::InvalidParameter(format!(
                "first_year {} is after last_year {}",
                options.first_year, options.last_year
            )));
        }
        Self::require_columns(
            electricity,
            &["county", "year", "month", "sector", "consumption_gwh"],
        )?;
        Self::require_columns(households, &["county", "year", "households"])?;

        let household_counts = Self::household_counts(households)?;

        let counties = string_column(electricity, "county")?;
        let years = i64_column(electricity, "year")?;
        let months = i64_column(electricity, "month")?;
        let sectors = string_column(electricity, "sector")?;
        let consumption = f64_column(electricity, "consumption_gwh")?;

        let mut normalized: BTreeMap<(String, YearMonth), ConsumptionRecord> = BTreeMap::new();
        let mut unmatched = 0usize;
        let mut incomplete = 0usize;

        for i in 0..electricity.height() {
            let (county, year, month, sector, gwh) = match (
                &counties[i],
                years[i],
                months[i],
                &sectors[i],
                consumption[i],
            ) {
                (Some(c), Some(y), Some(m), Some(s), Some(g)) => (c, y, m, s, g),
                _ => {
                    incomplete += 1;
                    continue;
                }
            };

            let year = to_year(year)?;
            if sector != &options.sector || year < options.first_year || year > options.last_year
            {
                continue;
            }

            let county = canonical_county(county);
            let count = match household_counts.get(&(county.clone(), year)) {
                Some(&count) => count,
                None => {
                    unmatched += 1;
                    continue;
                }
            };

            let record = ConsumptionRecord::new(
                &county,
                year,
                to_month(month)?,
                gwh * KWH_PER_GWH / count,
            )?;
            let key = (county, record.period());
            if normalized.contains_key(&key) {
                return Err(ForecastError::DataError(format!(
                    "Duplicate {} consumption for '{}' at {}",
                    options.sector, key.0, key.1
                )));
            }
            normalized.insert(key, record);
        }

        if unmatched > 0 {
            warn!(unmatched, "electricity rows without household data were dropped");
        }
        if incomplete > 0 {
            warn!(incomplete, "electricity rows with missing values were dropped");
        }
        if normalized.is_empty() {
            return Err(ForecastError::DataError(
                "No records left after normalization; check sector, years and county names"
                    .to_string(),
            ));
        }

        info!(records = normalized.len(), "normalized consumption per household");
        Ok(normalized.into_values().collect())
    }

    /// Write records as a normalized CSV file
    pub fn write_csv<P: AsRef<Path>>(records: &[ConsumptionRecord], path: P) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        for record in records {
            writer.serialize(RecordRow::from(record))?;
        }
        writer.flush()?;
        Ok(())
    }

    fn household_counts(households: &DataFrame) -> Result<HashMap<(String, i32), f64>> {
        let counties = string_column(households, "county")?;
        let years = i64_column(households, "year")?;
        let counts = f64_column(households, "households")?;

        let mut lookup = HashMap::new();
        for i in 0..households.height() {
            if let (Some(county), Some(year), Some(count)) = (&counties[i], years[i], counts[i]) {
                if count <= 0.0 {
                    warn!(county = %county, year, "ignoring non-positive household count");
                    continue;
                }
                lookup.insert((canonical_county(county), to_year(year)?), count);
            }
        }
        Ok(lookup)
    }

    fn read_frame<P: AsRef<Path>>(path: P) -> Result<DataFrame> {
        let file = File::open(path)?;
        let df = CsvReader::new(file)
            .infer_schema(None)
            .has_header(true)
            .finish()?;
        Ok(df)
    }

    fn require_columns(df: &DataFrame, required: &[&str]) -> Result<()> {
        let available = df.get_column_names();
        let missing: Vec<&str> = required
            .iter()
            .filter(|name| !available.contains(name))
            .copied()
            .collect();

        if !missing.is_empty() {
            return Err(ForecastError::DataError(format!(
                "Missing required columns [{}]; available columns: [{}]",
                missing.join(", "),
                available.join(", ")
            )));
        }
        Ok(())
    }
}

fn to_year(value: i64) -> Result<i32> {
    i32::try_from(value)
        .map_err(|_| ForecastError::DataError(format!("Year {} is out of range", value)))
}

fn to_month(value: i64) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| ForecastError::DataError(format!("Month {} is out of range", value)))
}

fn string_column(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let series = df.column(name)?.cast(&DataType::Utf8)?;
    let values = series.utf8()?;
    Ok(values
        .into_iter()
        .map(|v| v.map(|s| s.to_string()))
        .collect())
}

fn i64_column(df: &DataFrame, name: &str) -> Result<Vec<Option<i64>>> {
    let series = df.column(name)?.cast(&DataType::Int64)?;
    Ok(series.i64()?.into_iter().collect())
}

fn f64_column(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let series = df.column(name)?.cast(&DataType::Float64)?;
    Ok(series.f64()?.into_iter().collect())
}
