use super::columns::{CandleColumn, ColumnMap};
use crate::data::{CandleLoader, CandleSeries};
use crate::error::{EvotraderError, Result};
use crate::types::{Candle, CandleInterval};
use chrono::{DateTime, Utc};
use polars::prelude::*;
use std::path::{Path, PathBuf};

/// Reads `<data_dir>/<PAIR>_<interval>.csv` files with millisecond open times
pub struct CsvConnector {
    data_dir: PathBuf,
}

impl CsvConnector {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
        }
    }

    pub fn file_path(&self, pair: &str, interval: CandleInterval) -> PathBuf {
        self.data_dir.join(format!("{}_{}.csv", pair, interval))
    }

    /// Load CSV file into DataFrame
    pub fn load<P: AsRef<Path>>(path: P) -> Result<DataFrame> {
        let df = CsvReadOptions::default()
            .with_has_header(true)
            .try_into_reader_with_file_path(Some(path.as_ref().to_path_buf()))?
            .finish()
            .map_err(|e| EvotraderError::DataLoading(format!("Failed to read CSV: {}", e)))?;

        Ok(df)
    }

    /// Load a whole file as candles, in file order
    pub fn read_candles<P: AsRef<Path>>(path: P) -> Result<Vec<Candle>> {
        let df = Self::load(&path)?;
        let columns = ColumnMap::resolve(&df)?;

        let times = df
            .column(columns.name(CandleColumn::OpenTime))?
            .cast(&DataType::Int64)?;
        let times = times.i64()?;
        let open = float_values(&df, columns.name(CandleColumn::Open))?;
        let high = float_values(&df, columns.name(CandleColumn::High))?;
        let low = float_values(&df, columns.name(CandleColumn::Low))?;
        let close = float_values(&df, columns.name(CandleColumn::Close))?;
        let volume = float_values(&df, columns.name(CandleColumn::Volume))?;

        let mut candles = Vec::with_capacity(df.height());
        for (i, millis) in times.into_iter().enumerate() {
            let open_time = millis
                .and_then(DateTime::<Utc>::from_timestamp_millis)
                .ok_or_else(|| {
                    EvotraderError::DataIntegrity(format!("Row {} has an invalid open time", i))
                })?;
            candles.push(Candle {
                open_time,
                open: open[i],
                high: high[i],
                low: low[i],
                close: close[i],
                volume: volume[i],
            });
        }

        log::debug!(
            "Read {} candles from {}",
            candles.len(),
            path.as_ref().display()
        );
        Ok(candles)
    }
}

fn float_values(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let column = df.column(name)?.cast(&DataType::Float64)?;
    let values = column.f64()?;
    Ok(values.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
}

impl CandleLoader for CsvConnector {
    fn load_candles(
        &self,
        pair: &str,
        interval: CandleInterval,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<CandleSeries> {
        let path = self.file_path(pair, interval);
        let candles: Vec<Candle> = Self::read_candles(&path)?
            .into_iter()
            .filter(|c| c.open_time >= start && c.open_time < end)
            .collect();

        let (first, last) = match (candles.first(), candles.last()) {
            (Some(first), Some(last)) => (first.open_time, last.open_time),
            _ => {
                return Err(EvotraderError::DataLoading(format!(
                    "No {} {} candles between {} and {} in {}",
                    pair,
                    interval,
                    start,
                    end,
                    path.display()
                )))
            }
        };

        let step = interval.duration();
        if first - start >= step || end - (last + step) >= step {
            return Err(EvotraderError::DataLoading(format!(
                "{} only covers {} to {} of the requested {} to {}",
                path.display(),
                first,
                last,
                start,
                end
            )));
        }

        CandleSeries::new(candles)
    }
}
