use std::collections::BTreeMap;

use chrono::NaiveDate;
use hackspace_core::{DateOrder, Money, RawTransaction};
use thiserror::Error;

use crate::normalize::{parse_amount, parse_date};

const DATE_HEADERS: &[&str] = &["date", "transaction date", "trans date", "posted date", "value date"];
const DESCRIPTION_HEADERS: &[&str] = &[
    "description",
    "desc",
    "narrative",
    "details",
    "transaction description",
    "memo",
];
const AMOUNT_HEADERS: &[&str] = &["amount", "value", "sum", "transaction amount"];
const CREDIT_HEADERS: &[&str] = &["credit", "money in", "credit amount", "paid in"];
const DEBIT_HEADERS: &[&str] = &["debit", "money out", "debit amount", "paid out"];
const REFERENCE_HEADERS: &[&str] = &["reference", "ref", "payment reference", "transaction reference"];
const BALANCE_HEADERS: &[&str] = &["balance", "running balance", "account balance"];
const SPLIT_HEADERS: &[&str] = &["credit", "debit"];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("CSV file must contain a header row and at least one data row")]
    NoDataRows,
    #[error("Could not find a {column} column (expected one of: {expected})")]
    MissingColumn {
        column: &'static str,
        expected: String,
    },
    #[error("Row {row}: Invalid date format \"{raw}\"")]
    InvalidDate { row: u64, raw: String },
    #[error("Row {row}: Invalid amount \"{raw}\"")]
    InvalidAmount { row: u64, raw: String },
    #[error("Row {row}: Missing description")]
    EmptyDescription { row: u64 },
}

impl ParseError {
    /// Structural errors abort the whole file; row errors only drop a row.
    pub fn is_structural(&self) -> bool {
        matches!(self, ParseError::NoDataRows | ParseError::MissingColumn { .. })
    }

    fn missing(column: &'static str, synonyms: &[&[&str]]) -> Self {
        let expected = synonyms
            .iter()
            .map(|group| group.join(", "))
            .collect::<Vec<_>>()
            .join("; or both ");
        ParseError::MissingColumn { column, expected }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseOutcome {
    pub transactions: Vec<RawTransaction>,
    pub errors: Vec<ParseError>,
}

impl ParseOutcome {
    fn structural(error: ParseError) -> Self {
        ParseOutcome {
            transactions: Vec::new(),
            errors: vec![error],
        }
    }

    pub fn messages(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }
}

#[derive(Debug, Clone, Copy)]
enum AmountColumns {
    Single(usize),
    Split { credit: usize, debit: usize },
}

#[derive(Debug, Clone, Copy)]
struct ColumnMap {
    date: usize,
    description: usize,
    amount: AmountColumns,
    reference: Option<usize>,
    balance: Option<usize>,
}

impl ColumnMap {
    fn detect(headers: &[String]) -> Result<Self, ParseError> {
        let date = find_column(headers, DATE_HEADERS)
            .ok_or_else(|| ParseError::missing("date", &[DATE_HEADERS]))?;
        let description = find_column(headers, DESCRIPTION_HEADERS)
            .ok_or_else(|| ParseError::missing("description", &[DESCRIPTION_HEADERS]))?;

        let amount = match find_column(headers, AMOUNT_HEADERS) {
            Some(idx) => AmountColumns::Single(idx),
            None => match (
                find_column(headers, CREDIT_HEADERS),
                find_column(headers, DEBIT_HEADERS),
            ) {
                (Some(credit), Some(debit)) => AmountColumns::Split { credit, debit },
                _ => {
                    return Err(ParseError::missing("amount", &[AMOUNT_HEADERS, SPLIT_HEADERS]))
                }
            },
        };

        Ok(ColumnMap {
            date,
            description,
            amount,
            reference: find_column(headers, REFERENCE_HEADERS),
            balance: find_column(headers, BALANCE_HEADERS),
        })
    }
}

/// Synonyms are tried in order; the first one present among the headers wins.
fn find_column(headers: &[String], synonyms: &[&str]) -> Option<usize> {
    synonyms
        .iter()
        .find_map(|syn| headers.iter().position(|h| h.trim().eq_ignore_ascii_case(syn)))
}

/// Parses bank-statement CSV text into transactions.
///
/// The header row is located by name, so column order does not matter. A bad
/// row is skipped and reported; a missing required column aborts the parse.
/// Row numbers are the 1-based file line of the record.
pub fn parse_csv(content: &str, order: DateOrder) -> ParseOutcome {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut records = Vec::new();
    let mut errors = Vec::new();

    // Flexible records read from a `&str` cannot fail: field counts may
    // vary and the input is already UTF-8.
    for record in reader.records().flatten() {
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        let line = record.position().map_or(0, |p| p.line());
        records.push((line, record));
    }

    if records.len() < 2 {
        return ParseOutcome::structural(ParseError::NoDataRows);
    }

    let headers: Vec<String> = records[0].1.iter().map(|h| h.trim().to_string()).collect();
    let columns = match ColumnMap::detect(&headers) {
        Ok(columns) => columns,
        Err(e) => return ParseOutcome::structural(e),
    };

    let mut transactions = Vec::with_capacity(records.len() - 1);
    for (line, record) in &records[1..] {
        match parse_row(*line, record, &headers, &columns, order) {
            Ok(tx) => transactions.push(tx),
            Err(e) => errors.push(e),
        }
    }

    errors.sort_by_key(row_of);
    ParseOutcome {
        transactions,
        errors,
    }
}

fn row_of(error: &ParseError) -> u64 {
    match error {
        ParseError::InvalidDate { row, .. }
        | ParseError::InvalidAmount { row, .. }
        | ParseError::EmptyDescription { row } => *row,
        ParseError::NoDataRows | ParseError::MissingColumn { .. } => 0,
    }
}

fn parse_row(
    row: u64,
    record: &csv::StringRecord,
    headers: &[String],
    columns: &ColumnMap,
    order: DateOrder,
) -> Result<RawTransaction, ParseError> {
    let cell = move |idx: usize| record.get(idx).unwrap_or_default().trim();

    let raw_date = cell(columns.date);
    let transaction_date: NaiveDate =
        parse_date(raw_date, order).ok_or_else(|| ParseError::InvalidDate {
            row,
            raw: raw_date.to_string(),
        })?;

    let amount = match columns.amount {
        AmountColumns::Single(idx) => required_amount(row, cell(idx))?,
        AmountColumns::Split { credit, debit } => {
            let (credit, debit) = (cell(credit), cell(debit));
            if credit.is_empty() && debit.is_empty() {
                return Err(ParseError::InvalidAmount {
                    row,
                    raw: String::new(),
                });
            }
            let net = optional_amount(row, credit)?
                .unwrap_or_else(Money::zero)
                .checked_sub(optional_amount(row, debit)?.unwrap_or_else(Money::zero).abs())
                .filter(|m| m.to_cents().is_some());
            net.ok_or_else(|| ParseError::InvalidAmount {
                row,
                raw: format!("{credit} / {debit}"),
            })?
        }
    };

    let description = cell(columns.description);
    if description.is_empty() {
        return Err(ParseError::EmptyDescription { row });
    }

    let reference = columns
        .reference
        .map(cell)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    let balance = columns.balance.and_then(|idx| parse_amount(cell(idx)));

    let raw_data: BTreeMap<String, String> = headers
        .iter()
        .zip(record.iter())
        .map(|(h, v)| (h.clone(), v.to_string()))
        .collect();

    Ok(RawTransaction {
        transaction_date,
        description: description.to_string(),
        amount,
        reference,
        balance,
        raw_data,
    })
}

fn required_amount(row: u64, raw: &str) -> Result<Money, ParseError> {
    parse_amount(raw).ok_or_else(|| ParseError::InvalidAmount {
        row,
        raw: raw.to_string(),
    })
}

/// Blank is fine (`None`); present but unparseable is a row error.
fn optional_amount(row: u64, raw: &str) -> Result<Option<Money>, ParseError> {
    if raw.is_empty() {
        return Ok(None);
    }
    required_amount(row, raw).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn parse(content: &str) -> ParseOutcome {
        parse_csv(content, DateOrder::DayFirst)
    }

    #[test]
    fn basic_statement() {
        let out = parse(
            "Date,Description,Amount,Balance\n\
             25/01/2024,SHALOM T JUNE SUB,25.00,1025.00\n\
             26/01/2024,CARD PAYMENT TOOLSTATION,-12.99,1012.01\n",
        );
        assert!(out.errors.is_empty(), "{:?}", out.errors);
        assert_eq!(out.transactions.len(), 2);

        let first = &out.transactions[0];
        assert_eq!(first.transaction_date, d(2024, 1, 25));
        assert_eq!(first.description, "SHALOM T JUNE SUB");
        assert_eq!(first.amount, Money::from_cents(2500));
        assert_eq!(first.balance, Some(Money::from_cents(102500)));
        assert_eq!(first.reference, None);
        assert_eq!(first.raw_data.get("Amount").map(String::as_str), Some("25.00"));

        assert_eq!(out.transactions[1].amount, Money::from_cents(-1299));
    }

    #[test]
    fn quoted_comma_stays_in_one_field() {
        let out = parse(
            "\"Date\",\"Description\",\"Amount\"\n\
             \"25/01/2024\",\"Smith, J. membership\",\"25.00\"\n",
        );
        assert!(out.errors.is_empty());
        assert_eq!(out.transactions[0].description, "Smith, J. membership");
        assert_eq!(out.transactions[0].amount, Money::from_cents(2500));
    }

    #[test]
    fn doubled_quote_is_a_literal_quote() {
        let out = parse("Date,Description,Amount\n2024-01-25,\"The \"\"Big\"\" Lathe\",10\n");
        assert_eq!(out.transactions[0].description, "The \"Big\" Lathe");
    }

    #[test]
    fn headers_are_case_insensitive_and_any_order() {
        let out = parse(
            "AMOUNT,Reference,NARRATIVE,Transaction Date\n\
             30.00,ADA01,ADA01 SUBS,2024-02-01\n",
        );
        assert!(out.errors.is_empty());
        let tx = &out.transactions[0];
        assert_eq!(tx.description, "ADA01 SUBS");
        assert_eq!(tx.reference.as_deref(), Some("ADA01"));
        assert_eq!(tx.transaction_date, d(2024, 2, 1));
    }

    #[test]
    fn earlier_synonym_wins() {
        // "description" precedes "memo" in the synonym list.
        let out = parse("Date,Memo,Description,Amount\n2024-01-01,memo text,desc text,1\n");
        assert_eq!(out.transactions[0].description, "desc text");
    }

    #[test]
    fn credit_and_debit_columns() {
        let out = parse(
            "Date,Details,Paid In,Paid Out\n\
             01/02/2024,ADA01 SUBS,30.00,\n\
             02/02/2024,RENT,,500.00\n",
        );
        assert!(out.errors.is_empty(), "{:?}", out.errors);
        assert_eq!(out.transactions[0].amount, Money::from_cents(3000));
        assert_eq!(out.transactions[1].amount, Money::from_cents(-50000));
    }

    #[test]
    fn both_credit_and_debit_blank_is_a_row_error() {
        let out = parse("Date,Details,Credit,Debit\n01/02/2024,NOTHING,,\n01/02/2024,OK,1,\n");
        assert_eq!(out.transactions.len(), 1);
        assert!(matches!(out.errors[0], ParseError::InvalidAmount { row: 2, .. }));
    }

    #[test]
    fn oversized_amounts_are_row_errors() {
        let out = parse(
            "Date,Description,Credit,Debit
             01/01/2024,X,-79228162514264337593543950335,79228162514264337593543950335
             02/01/2024,OK,1,
",
        );
        assert_eq!(out.transactions.len(), 1);
        assert_eq!(out.transactions[0].description, "OK");
        assert!(matches!(out.errors[..], [ParseError::InvalidAmount { row: 2, .. }]));

        let out = parse(
            "Date,Description,Amount
             01/01/2024,HUGE,92233720368547758.08
             02/01/2024,OK,1.00
",
        );
        assert_eq!(out.transactions.len(), 1);
        assert!(matches!(out.errors[..], [ParseError::InvalidAmount { row: 2, .. }]));
    }

    #[test]
    fn credit_minus_debit_must_fit_in_cents() {
        let out = parse(
            "Date,Description,Credit,Debit
             01/01/2024,WIDE,-90000000000000000.00,90000000000000000.00
",
        );
        assert!(out.transactions.is_empty());
        assert!(matches!(out.errors[..], [ParseError::InvalidAmount { row: 2, .. }]));
    }

    #[test]
    fn bad_rows_are_skipped_and_reported() {
        let out = parse(
            "Date,Description,Amount\n\
             25/01/2024,GOOD ONE,10.00\n\
             not a date,BAD DATE,10.00\n\
             26/01/2024,BAD AMOUNT,ten\n\
             27/01/2024,,10.00\n\
             28/01/2024,GOOD TWO,(5.00)\n",
        );
        assert_eq!(out.transactions.len(), 2);
        assert_eq!(out.transactions[0].description, "GOOD ONE");
        assert_eq!(out.transactions[1].description, "GOOD TWO");
        assert_eq!(
            out.messages(),
            vec![
                "Row 3: Invalid date format \"not a date\"".to_string(),
                "Row 4: Invalid amount \"ten\"".to_string(),
                "Row 5: Missing description".to_string(),
            ]
        );
    }

    #[test]
    fn missing_date_column_aborts() {
        let out = parse("When,Description,Amount\n25/01/2024,X,1\n");
        assert!(out.transactions.is_empty());
        assert_eq!(out.errors.len(), 1);
        assert!(out.errors[0].is_structural());
        assert!(matches!(out.errors[0], ParseError::MissingColumn { column: "date", .. }));
        assert!(out.errors[0].to_string().contains("transaction date"));
    }

    #[test]
    fn missing_description_column_aborts() {
        let out = parse("Date,Payee,Amount\n25/01/2024,X,1\n");
        assert!(matches!(out.errors[0], ParseError::MissingColumn { column: "description", .. }));
        assert!(out.transactions.is_empty());
    }

    #[test]
    fn credit_without_debit_is_not_enough() {
        let out = parse("Date,Description,Credit\n25/01/2024,X,1\n");
        assert!(matches!(out.errors[0], ParseError::MissingColumn { column: "amount", .. }));
    }

    #[test]
    fn header_only_is_no_data() {
        let out = parse("Date,Description,Amount\n");
        assert_eq!(out.errors, vec![ParseError::NoDataRows]);
        assert!(parse("").errors[0].is_structural());
    }

    #[test]
    fn blank_lines_are_ignored() {
        let out = parse("\nDate,Description,Amount\n\n2024-01-25,X,1\n\n");
        assert_eq!(out.transactions.len(), 1);
        assert!(out.errors.is_empty());
    }

    #[test]
    fn reparsing_is_identical() {
        let content = "Date,Description,Amount\n25/01/2024,A,1\nbad,B,2\n";
        assert_eq!(parse(content), parse(content));
    }

    #[test]
    fn month_first_policy() {
        let out = parse_csv("Date,Description,Amount\n02/03/2024,X,1\n", DateOrder::MonthFirst);
        assert_eq!(out.transactions[0].transaction_date, d(2024, 2, 3));
    }
}
