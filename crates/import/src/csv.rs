use chrono::NaiveDate;
use csv::StringRecord;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::str::FromStr;
use thiserror::Error;

use arca_core::{Money, NormalizedRow, RowField, RowWarning, WarningKind};

#[derive(Error, Debug)]
pub enum CsvError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Invalid profile: {0}")]
    Profile(String),
    #[error("No data rows")]
    NoDataRows,
}

/// Column layout of one bank's CSV export. Either a single signed amount
/// column or a debit/credit pair must be set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvProfile {
    pub name: String,
    pub has_header: bool,
    pub delimiter: String,
    pub date_column: usize,
    pub description_column: usize,
    pub amount_column: Option<usize>,
    pub debit_column: Option<usize>,
    pub credit_column: Option<usize>,
    pub date_format: String,
}

impl Default for CsvProfile {
    fn default() -> Self {
        Self {
            name: "generic".to_string(),
            has_header: true,
            delimiter: ",".to_string(),
            date_column: 0,
            description_column: 1,
            amount_column: Some(2),
            debit_column: None,
            credit_column: None,
            date_format: "%Y-%m-%d".to_string(),
        }
    }
}

impl CsvProfile {
    /// Wells Fargo checking exports: headerless five-column files laid out
    /// as date, amount, star flag, blank, description.
    pub fn wells_fargo() -> Self {
        Self {
            name: "wells-fargo".to_string(),
            has_header: false,
            delimiter: ",".to_string(),
            date_column: 0,
            description_column: 4,
            amount_column: Some(1),
            debit_column: None,
            credit_column: None,
            date_format: "%m/%d/%Y".to_string(),
        }
    }

    pub fn for_name(name: &str) -> Option<Self> {
        match name {
            "wells-fargo" | "wells_fargo" => Some(Self::wells_fargo()),
            "generic" => Some(Self::default()),
            _ => None,
        }
    }

    pub fn from_toml(raw: &str) -> Result<Self, CsvError> {
        toml::from_str(raw).map_err(|e| CsvError::Profile(e.to_string()))
    }
}

/// Parse output: the rows that made it, and one warning per row that did
/// not. Warnings carry positions and kinds only, never field contents.
#[derive(Debug, Clone)]
pub struct ParsedCsv {
    pub rows: Vec<NormalizedRow>,
    pub warnings: Vec<RowWarning>,
}

/// Reads statement rows through a profile. Malformed rows are excluded and
/// reported; only a structurally unreadable file is an error.
pub fn read_rows<R: Read>(data: R, profile: &CsvProfile) -> Result<ParsedCsv, CsvError> {
    let delimiter = profile
        .delimiter
        .as_bytes()
        .first()
        .copied()
        .unwrap_or(b',');
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(profile.has_header)
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(data);

    let mut rows = Vec::new();
    let mut warnings = Vec::new();

    for (index, result) in reader.records().enumerate() {
        let record = result?;
        if record.is_empty() || record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        match parse_record(&record, profile, index + 1) {
            Ok(row) => rows.push(row),
            Err(warning) => warnings.push(warning),
        }
    }

    if rows.is_empty() && warnings.is_empty() {
        return Err(CsvError::NoDataRows);
    }

    Ok(ParsedCsv { rows, warnings })
}

fn parse_record(
    record: &StringRecord,
    profile: &CsvProfile,
    row_number: usize,
) -> Result<NormalizedRow, RowWarning> {
    let warn = |field, kind| RowWarning {
        row_number,
        field,
        kind,
    };

    let date_raw = field(record, profile.date_column)
        .ok_or_else(|| warn(RowField::Date, WarningKind::Missing))?;
    let date = parse_date(date_raw, &profile.date_format)
        .ok_or_else(|| warn(RowField::Date, WarningKind::Invalid))?;

    let description = field(record, profile.description_column)
        .ok_or_else(|| warn(RowField::Description, WarningKind::Missing))?
        .to_string();

    let amount = if let Some(col) = profile.amount_column {
        let raw = field(record, col).ok_or_else(|| warn(RowField::Amount, WarningKind::Missing))?;
        parse_amount(raw).ok_or_else(|| warn(RowField::Amount, WarningKind::Invalid))?
    } else {
        // Split columns: debits are money out, credits money in.
        let debit = profile.debit_column.and_then(|c| field(record, c));
        let credit = profile.credit_column.and_then(|c| field(record, c));
        match (debit, credit) {
            (Some(d), None) => {
                let amount =
                    parse_amount(d).ok_or_else(|| warn(RowField::Amount, WarningKind::Invalid))?;
                -amount
            }
            (None, Some(c)) => {
                parse_amount(c).ok_or_else(|| warn(RowField::Amount, WarningKind::Invalid))?
            }
            _ => return Err(warn(RowField::Amount, WarningKind::Missing)),
        }
    };

    Ok(NormalizedRow {
        date,
        description,
        amount,
    })
}

fn field<'a>(record: &'a StringRecord, col: usize) -> Option<&'a str> {
    record
        .get(col)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn parse_date(s: &str, format: &str) -> Option<NaiveDate> {
    let s = s.trim();

    if let Ok(date) = NaiveDate::parse_from_str(s, format) {
        return Some(date);
    }

    for fmt in &[
        "%m/%d/%Y", "%d/%m/%Y", "%Y/%m/%d", "%m-%d-%Y", "%d-%m-%Y", "%Y-%m-%d",
    ] {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Some(date);
        }
    }

    None
}

fn parse_amount(s: &str) -> Option<Money> {
    let s = s.trim();
    let (negative, s) = if s.starts_with('(') && s.ends_with(')') {
        (true, &s[1..s.len() - 1])
    } else {
        (false, s)
    };
    let s = s.replace([',', '$', ' '], "");
    let mut dec = Decimal::from_str(&s).ok()?;
    if negative {
        dec = -dec;
    }
    Some(Money::from_decimal(dec))
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── parse_amount ──────────────────────────────────────────────────────────

    #[test]
    fn parse_amount_plain() {
        assert_eq!(parse_amount("123.45").unwrap().to_cents(), 12345);
    }

    #[test]
    fn parse_amount_with_dollar_sign_and_commas() {
        assert_eq!(parse_amount("$1,234.56").unwrap().to_cents(), 123456);
    }

    #[test]
    fn parse_amount_negative() {
        assert_eq!(parse_amount("-50.00").unwrap().to_cents(), -5000);
    }

    #[test]
    fn parse_amount_accounting_parens() {
        assert_eq!(parse_amount("(75.25)").unwrap().to_cents(), -7525);
    }

    #[test]
    fn parse_amount_rounds_to_cents() {
        assert_eq!(parse_amount("1.239").unwrap().to_cents(), 124);
    }

    #[test]
    fn parse_amount_invalid() {
        assert!(parse_amount("not_a_number").is_none());
        assert!(parse_amount("").is_none());
    }

    // ── parse_date ────────────────────────────────────────────────────────────

    #[test]
    fn parse_date_preferred_format() {
        let d = parse_date("01/15/2024", "%m/%d/%Y").unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
    }

    #[test]
    fn parse_date_falls_back() {
        let d = parse_date("2024-01-15", "%m/%d/%Y").unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
    }

    #[test]
    fn parse_date_invalid() {
        assert!(parse_date("not-a-date", "%Y-%m-%d").is_none());
    }

    // ── read_rows ─────────────────────────────────────────────────────────────

    #[test]
    fn wells_fargo_headerless_layout() {
        let data = b"01/05/2024,-5.75,*,,CHECKCARD STARBUCKS 4521\n01/06/2024,1200.00,*,,ACH RENT PAYMENT\n";
        let parsed = read_rows(data.as_ref(), &CsvProfile::wells_fargo()).unwrap();

        assert_eq!(parsed.rows.len(), 2);
        assert!(parsed.warnings.is_empty());
        assert_eq!(parsed.rows[0].description, "CHECKCARD STARBUCKS 4521");
        assert_eq!(parsed.rows[0].amount.to_cents(), -575);
        assert_eq!(
            parsed.rows[0].date,
            NaiveDate::from_ymd_opt(2024, 1, 5).unwrap()
        );
        assert_eq!(parsed.rows[1].amount.to_cents(), 120_000);
    }

    #[test]
    fn generic_profile_with_header() {
        let data = b"date,description,amount\n2024-01-15,AMAZON,49.99\n2024-01-16,STARBUCKS,-5.00\n";
        let parsed = read_rows(data.as_ref(), &CsvProfile::default()).unwrap();
        assert_eq!(parsed.rows.len(), 2);
        assert_eq!(parsed.rows[0].amount.to_cents(), 4999);
        assert_eq!(parsed.rows[1].amount.to_cents(), -500);
    }

    #[test]
    fn debit_credit_columns() {
        let data =
            b"date,description,debit,credit\n2024-01-15,PAYROLL,,2500.00\n2024-01-16,SHELL OIL,41.00,\n";
        let profile = CsvProfile {
            amount_column: None,
            debit_column: Some(2),
            credit_column: Some(3),
            ..CsvProfile::default()
        };
        let parsed = read_rows(data.as_ref(), &profile).unwrap();
        assert_eq!(parsed.rows[0].amount.to_cents(), 250_000);
        assert_eq!(parsed.rows[1].amount.to_cents(), -4100);
    }

    #[test]
    fn bad_rows_are_excluded_with_warnings() {
        let data = b"date,description,amount\nnot-a-date,AMAZON,49.99\n2024-01-16,STARBUCKS,oops\n2024-01-17,SHELL OIL,-41.00\n";
        let parsed = read_rows(data.as_ref(), &CsvProfile::default()).unwrap();

        assert_eq!(parsed.rows.len(), 1);
        assert_eq!(parsed.rows[0].description, "SHELL OIL");

        assert_eq!(parsed.warnings.len(), 2);
        assert_eq!(parsed.warnings[0].row_number, 1);
        assert_eq!(parsed.warnings[0].field, RowField::Date);
        assert_eq!(parsed.warnings[0].kind, WarningKind::Invalid);
        assert_eq!(parsed.warnings[1].row_number, 2);
        assert_eq!(parsed.warnings[1].field, RowField::Amount);
    }

    #[test]
    fn short_row_warns_on_the_missing_column() {
        let data = b"01/05/2024,-5.75\n01/06/2024,9.00,*,,SHELL OIL\n";
        let parsed = read_rows(data.as_ref(), &CsvProfile::wells_fargo()).unwrap();
        assert_eq!(parsed.rows.len(), 1);
        assert_eq!(parsed.warnings.len(), 1);
        assert_eq!(parsed.warnings[0].field, RowField::Description);
        assert_eq!(parsed.warnings[0].kind, WarningKind::Missing);
    }

    #[test]
    fn all_bad_rows_is_not_an_error() {
        let data = b"date,description,amount\nnope,AMAZON,xx\n";
        let parsed = read_rows(data.as_ref(), &CsvProfile::default()).unwrap();
        assert!(parsed.rows.is_empty());
        assert_eq!(parsed.warnings.len(), 1);
    }

    #[test]
    fn empty_file_errors() {
        let data = b"date,description,amount\n";
        assert!(matches!(
            read_rows(data.as_ref(), &CsvProfile::default()),
            Err(CsvError::NoDataRows)
        ));
    }

    #[test]
    fn blank_lines_are_ignored() {
        let data = b"date,description,amount\n2024-01-15,AMAZON,49.99\n,,\n";
        let parsed = read_rows(data.as_ref(), &CsvProfile::default()).unwrap();
        assert_eq!(parsed.rows.len(), 1);
        assert!(parsed.warnings.is_empty());
    }

    // ── profiles ──────────────────────────────────────────────────────────────

    #[test]
    fn profile_lookup_by_name() {
        assert!(CsvProfile::for_name("wells-fargo").is_some());
        assert!(CsvProfile::for_name("generic").is_some());
        assert!(CsvProfile::for_name("first-galactic").is_none());
    }

    #[test]
    fn profile_from_toml_overrides_defaults() {
        let profile = CsvProfile::from_toml(
            "name = \"credit-union\"\nhas_header = false\ndate_format = \"%d/%m/%Y\"\n",
        )
        .unwrap();
        assert_eq!(profile.name, "credit-union");
        assert!(!profile.has_header);
        assert_eq!(profile.amount_column, Some(2));
    }

    #[test]
    fn profile_from_bad_toml_errors() {
        assert!(matches!(
            CsvProfile::from_toml("has_header = \"maybe\""),
            Err(CsvError::Profile(_))
        ));
    }
}
