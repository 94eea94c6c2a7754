use crate::error::{EvotraderError, Result};
use polars::prelude::*;

/// Candle fields a file must provide
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CandleColumn {
    OpenTime,
    Open,
    High,
    Low,
    Close,
    Volume,
}

impl CandleColumn {
    pub const ALL: [CandleColumn; 6] = [
        CandleColumn::OpenTime,
        CandleColumn::Open,
        CandleColumn::High,
        CandleColumn::Low,
        CandleColumn::Close,
        CandleColumn::Volume,
    ];

    /// Accepted header names, compared without case; the first is canonical
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            CandleColumn::OpenTime => &["open_time", "opentime", "timestamp", "time", "date"],
            CandleColumn::Open => &["open", "o"],
            CandleColumn::High => &["high", "h"],
            CandleColumn::Low => &["low", "l"],
            CandleColumn::Close => &["close", "c"],
            CandleColumn::Volume => &["volume", "vol", "v"],
        }
    }

    pub fn canonical(&self) -> &'static str {
        self.aliases()[0]
    }
}

/// Header names of one file, resolved for every candle field
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMap {
    names: [String; 6],
}

impl ColumnMap {
    /// Finds every field in `df` and checks it holds numbers without gaps
    pub fn resolve(df: &DataFrame) -> Result<Self> {
        let headers: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|name| name.as_str().to_string())
            .collect();

        let mut names: [String; 6] = Default::default();
        for (slot, column) in names.iter_mut().zip(CandleColumn::ALL) {
            let found = column
                .aliases()
                .iter()
                .find_map(|alias| headers.iter().find(|h| h.eq_ignore_ascii_case(alias)))
                .ok_or_else(|| {
                    EvotraderError::DataLoading(format!(
                        "Missing column {} (accepted: {})",
                        column.canonical(),
                        column.aliases().join(", ")
                    ))
                })?;

            let values = df.column(found)?;
            if !matches!(
                values.dtype(),
                DataType::Float64
                    | DataType::Float32
                    | DataType::Int64
                    | DataType::Int32
                    | DataType::UInt64
                    | DataType::UInt32
            ) {
                return Err(EvotraderError::DataLoading(format!(
                    "Column '{}' must be numeric, found {:?}",
                    found,
                    values.dtype()
                )));
            }
            if values.null_count() > 0 {
                return Err(EvotraderError::DataIntegrity(format!(
                    "Column '{}' has {} missing values",
                    found,
                    values.null_count()
                )));
            }
            *slot = found.clone();
        }
        Ok(Self { names })
    }

    pub fn name(&self, column: CandleColumn) -> &str {
        let index = CandleColumn::ALL
            .iter()
            .position(|c| *c == column)
            .unwrap_or_default();
        &self.names[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::df;

    #[test]
    fn test_aliases_resolve_ignoring_case() {
        let df = df! {
            "Timestamp" => &[0i64, 60_000],
            "Open" => &[100.0, 101.0],
            "HIGH" => &[101.0, 103.0],
            "low" => &[99.0, 100.0],
            "C" => &[100.5, 102.0],
            "Vol" => &[1000.0, 1500.0],
        }
        .unwrap();

        let map = ColumnMap::resolve(&df).unwrap();
        assert_eq!(map.name(CandleColumn::OpenTime), "Timestamp");
        assert_eq!(map.name(CandleColumn::Close), "C");
        assert_eq!(map.name(CandleColumn::Volume), "Vol");
    }

    #[test]
    fn test_missing_column() {
        let df = df! {
            "open_time" => &[0i64],
            "open" => &[100.0],
            "high" => &[101.0],
            "low" => &[99.0],
            "close" => &[100.5],
        }
        .unwrap();

        assert!(matches!(ColumnMap::resolve(&df), Err(EvotraderError::DataLoading(_))));
    }

    #[test]
    fn test_text_column_rejected() {
        let df = df! {
            "open_time" => &[0i64],
            "open" => &["a"],
            "high" => &[101.0],
            "low" => &[99.0],
            "close" => &[100.5],
            "volume" => &[1.0],
        }
        .unwrap();

        assert!(ColumnMap::resolve(&df).is_err());
    }
}
