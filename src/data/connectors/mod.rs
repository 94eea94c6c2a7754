mod columns;
mod csv;

pub use columns::{CandleColumn, ColumnMap};
pub use csv::CsvConnector;
