pub mod csv;

pub use csv::{read_rows, CsvError, CsvProfile, ParsedCsv};
