//! Row normalization
//!
//! Turns a raw file's bytes into a stream of [`NormalizedRow`]s according to
//! its manifest entry: decode with the declared encoding, split fields with
//! the declared separator and quoting policy, parse declared datetime
//! columns, and reject rows whose primary key is incomplete.
//!
//! Quoting: when `ignore_quotes` is set, quote characters are literal data,
//! so `A|"B|C"|D` splits into four fields (`A`, `"B`, `C"`, `D`). With
//! quoting on (the default), the same line splits into three.

use std::collections::BTreeMap;
use std::io::Cursor;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::{IngestError, Result, RowError};
use crate::manifest::FileConfig;

/// Accepted datetime formats, tried in order; the first parse wins.
/// Date-only formats normalize to midnight.
const DATETIME_FORMATS: &[(&str, bool)] = &[
    ("%Y-%m-%d %H:%M:%S%.f", true),
    ("%Y-%m-%d %H:%M:%S", true),
    ("%Y-%m-%d", false),
    ("%m/%d/%Y %H:%M:%S", true),
    ("%m/%d/%Y", false),
    ("%m/%d/%y", false),
    ("%Y%m%d", false),
];

/// Parse a raw value against the accepted datetime formats
pub fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    for (format, has_time) in DATETIME_FORMATS {
        if *has_time {
            if let Ok(ts) = NaiveDateTime::parse_from_str(value, format) {
                return Some(ts);
            }
        } else if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return Some(date.and_time(NaiveTime::MIN));
        }
    }
    None
}

/// A decoded cell: raw text, a parsed timestamp, or null.
///
/// Empty and whitespace-only fields normalize to null.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CellValue {
    Text(String),
    Timestamp(NaiveDateTime),
    Null,
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }
}

/// One decoded row, tagged with its origin for error reporting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRow {
    pub file_tag: String,
    /// 1-based ordinal among data rows (the header is row 0)
    pub ordinal: u64,
    values: BTreeMap<String, CellValue>,
}

impl NormalizedRow {
    /// Value of a column, `Null` when absent
    pub fn value(&self, column: &str) -> &CellValue {
        self.values.get(column).unwrap_or(&CellValue::Null)
    }

    /// Iterate over (column, value) pairs in column order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &CellValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Streaming normalizer over one raw file.
///
/// Construction decodes the bytes, reads the header, and verifies the
/// manifest's primary key columns are all present; iteration yields either a
/// [`NormalizedRow`] or the [`RowError`] that skipped it.
#[derive(Debug)]
pub struct RowStream {
    file_tag: String,
    header: Vec<String>,
    reader: csv::Reader<Cursor<Vec<u8>>>,
    datetime_cols: Vec<String>,
    primary_key_cols: Vec<String>,
    ordinal: u64,
}

impl RowStream {
    /// Decode `raw` per the file's manifest entry and position the stream on
    /// the first data row
    pub fn open(config: &FileConfig, raw: &[u8]) -> Result<Self> {
        let (decoded, _, had_errors) = config.encoding.decode(raw);
        if had_errors {
            return Err(IngestError::Decode {
                file_tag: config.file_tag.clone(),
                encoding: config.encoding_label.clone(),
            });
        }

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(config.separator)
            .quoting(!config.ignore_quotes)
            .has_headers(false)
            .flexible(true)
            .from_reader(Cursor::new(decoded.into_owned().into_bytes()));

        let mut header_record = csv::StringRecord::new();
        let has_header = reader
            .read_record(&mut header_record)
            .map_err(|e| IngestError::config(&config.file_tag, e.to_string()))?;
        if !has_header {
            return Err(IngestError::EmptyFile {
                file_tag: config.file_tag.clone(),
            });
        }

        let header: Vec<String> = header_record.iter().map(|c| c.trim().to_string()).collect();
        let mut seen = std::collections::BTreeSet::new();
        for column in &header {
            if !seen.insert(column.as_str()) {
                return Err(IngestError::config(
                    &config.file_tag,
                    format!("header repeats column '{}'", column),
                ));
            }
        }

        // Invariant: primary_key_cols ⊆ header, or this file cannot ingest.
        for column in &config.primary_key_cols {
            if !header.iter().any(|h| h == column) {
                return Err(IngestError::MissingKeyColumn {
                    file_tag: config.file_tag.clone(),
                    column: column.clone(),
                });
            }
        }

        Ok(Self {
            file_tag: config.file_tag.clone(),
            header,
            reader,
            datetime_cols: config.datetime_cols.iter().cloned().collect(),
            primary_key_cols: config.primary_key_cols.clone(),
            ordinal: 0,
        })
    }

    /// The file's header columns, in file order
    pub fn header(&self) -> &[String] {
        &self.header
    }

    fn normalize_record(&self, record: &csv::StringRecord, ordinal: u64) -> std::result::Result<NormalizedRow, RowError> {
        if record.len() != self.header.len() {
            return Err(RowError::FieldCount {
                file_tag: self.file_tag.clone(),
                row: ordinal,
                expected: self.header.len(),
                actual: record.len(),
            });
        }

        let mut values = BTreeMap::new();
        for (column, raw) in self.header.iter().zip(record.iter()) {
            let trimmed = raw.trim();
            let cell = if trimmed.is_empty() {
                CellValue::Null
            } else if self.datetime_cols.iter().any(|c| c == column) {
                match parse_datetime(trimmed) {
                    Some(ts) => CellValue::Timestamp(ts),
                    None => {
                        return Err(RowError::DateParse {
                            file_tag: self.file_tag.clone(),
                            row: ordinal,
                            column: column.clone(),
                            value: trimmed.to_string(),
                        });
                    },
                }
            } else {
                CellValue::Text(trimmed.to_string())
            };
            values.insert(column.clone(), cell);
        }

        // A row that cannot state its own identity never enters the graph.
        for column in &self.primary_key_cols {
            if values.get(column).map(CellValue::is_null).unwrap_or(true) {
                return Err(RowError::MissingPrimaryKey {
                    file_tag: self.file_tag.clone(),
                    row: ordinal,
                    column: column.clone(),
                });
            }
        }

        Ok(NormalizedRow {
            file_tag: self.file_tag.clone(),
            ordinal,
            values,
        })
    }
}

impl Iterator for RowStream {
    type Item = std::result::Result<NormalizedRow, RowError>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut record = csv::StringRecord::new();
        match self.reader.read_record(&mut record) {
            Ok(false) => None,
            Ok(true) => {
                self.ordinal += 1;
                Some(self.normalize_record(&record, self.ordinal))
            },
            Err(e) => {
                self.ordinal += 1;
                Some(Err(RowError::Malformed {
                    file_tag: self.file_tag.clone(),
                    row: self.ordinal,
                    message: e.to_string(),
                }))
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ManifestRegistry;

    fn config(yaml: &str, tag: &str) -> FileConfig {
        ManifestRegistry::from_yaml_str(yaml)
            .unwrap()
            .resolve_file_config(tag)
            .unwrap()
            .clone()
    }

    fn contact_config() -> FileConfig {
        config(
            r#"
region_code: us_xx
default_encoding: utf-8
default_separator: "|"
raw_files:
  - file_tag: sprvsn_cntc
    primary_key_cols: [ofndr_num]
    datetime_cols: [cntc_dt]
"#,
            "sprvsn_cntc",
        )
    }

    #[test]
    fn test_normalizes_rows_and_parses_datetimes() {
        let raw = b"ofndr_num|cntc_dt|cntc_typ_desc\n123|2020-01-01|FIELD\n";
        let mut stream = RowStream::open(&contact_config(), raw).unwrap();
        assert_eq!(stream.header(), &["ofndr_num", "cntc_dt", "cntc_typ_desc"]);

        let row = stream.next().unwrap().unwrap();
        assert_eq!(row.ordinal, 1);
        assert_eq!(row.value("ofndr_num"), &CellValue::Text("123".to_string()));
        assert_eq!(
            row.value("cntc_dt"),
            &CellValue::Timestamp(
                NaiveDate::from_ymd_opt(2020, 1, 1).unwrap().and_time(NaiveTime::MIN)
            )
        );
        assert!(stream.next().is_none());
    }

    #[test]
    fn test_empty_fields_normalize_to_null() {
        let raw = b"ofndr_num|cntc_dt|cntc_typ_desc\n123||   \n";
        let mut stream = RowStream::open(&contact_config(), raw).unwrap();
        let row = stream.next().unwrap().unwrap();
        assert!(row.value("cntc_dt").is_null());
        assert!(row.value("cntc_typ_desc").is_null());
    }

    #[test]
    fn test_missing_primary_key_skips_row() {
        let raw = b"ofndr_num|cntc_dt|cntc_typ_desc\n|2020-01-01|FIELD\n456|2020-01-02|HOME\n";
        let mut stream = RowStream::open(&contact_config(), raw).unwrap();

        let err = stream.next().unwrap().unwrap_err();
        assert!(
            matches!(&err, RowError::MissingPrimaryKey { column, row: 1, .. } if column == "ofndr_num")
        );

        // The file continues past the bad row.
        let row = stream.next().unwrap().unwrap();
        assert_eq!(row.value("ofndr_num"), &CellValue::Text("456".to_string()));
    }

    #[test]
    fn test_unparseable_datetime_names_column_and_row() {
        let raw = b"ofndr_num|cntc_dt|cntc_typ_desc\n123|junk|FIELD\n";
        let mut stream = RowStream::open(&contact_config(), raw).unwrap();
        let err = stream.next().unwrap().unwrap_err();
        match err {
            RowError::DateParse { file_tag, row, column, value } => {
                assert_eq!(file_tag, "sprvsn_cntc");
                assert_eq!(row, 1);
                assert_eq!(column, "cntc_dt");
                assert_eq!(value, "junk");
            },
            other => panic!("expected DateParse, got {:?}", other),
        }
    }

    #[test]
    fn test_field_count_mismatch_skips_row() {
        let raw = b"ofndr_num|cntc_dt|cntc_typ_desc\n123|2020-01-01\n";
        let mut stream = RowStream::open(&contact_config(), raw).unwrap();
        let err = stream.next().unwrap().unwrap_err();
        assert!(matches!(err, RowError::FieldCount { expected: 3, actual: 2, .. }));
    }

    #[test]
    fn test_primary_key_column_absent_from_header_fails_file() {
        let raw = b"cntc_dt|cntc_typ_desc\n2020-01-01|FIELD\n";
        let err = RowStream::open(&contact_config(), raw).unwrap_err();
        assert!(
            matches!(err, IngestError::MissingKeyColumn { column, .. } if column == "ofndr_num")
        );
    }

    #[test]
    fn test_ignore_quotes_treats_quotes_as_literal_data() {
        let cfg = config(
            r#"
region_code: us_xx
default_encoding: utf-8
default_separator: "|"
raw_files:
  - file_tag: quoted
    primary_key_cols: [a]
    ignore_quotes: true
"#,
            "quoted",
        );
        let raw = b"a|b|c|d\nA|\"B|C\"|D\n";
        let mut stream = RowStream::open(&cfg, raw).unwrap();
        let row = stream.next().unwrap().unwrap();
        assert_eq!(row.value("a"), &CellValue::Text("A".to_string()));
        assert_eq!(row.value("b"), &CellValue::Text("\"B".to_string()));
        assert_eq!(row.value("c"), &CellValue::Text("C\"".to_string()));
        assert_eq!(row.value("d"), &CellValue::Text("D".to_string()));
    }

    #[test]
    fn test_quoting_enabled_keeps_separator_inside_quotes() {
        let cfg = config(
            r#"
region_code: us_xx
default_encoding: utf-8
default_separator: "|"
raw_files:
  - file_tag: quoted
    primary_key_cols: [a]
"#,
            "quoted",
        );
        let raw = b"a|b|c\nA|\"B|C\"|D\n";
        let mut stream = RowStream::open(&cfg, raw).unwrap();
        let row = stream.next().unwrap().unwrap();
        assert_eq!(row.value("b"), &CellValue::Text("B|C".to_string()));
        assert_eq!(row.value("c"), &CellValue::Text("D".to_string()));
    }

    #[test]
    fn test_latin1_decoding() {
        let cfg = config(
            r#"
region_code: us_xx
default_encoding: latin-1
default_separator: ","
raw_files:
  - file_tag: ofndr
    primary_key_cols: [ofndr_num]
"#,
            "ofndr",
        );
        // "JOSÉ" in latin-1: 0xc9 is É
        let raw = b"ofndr_num,name\n123,JOS\xc9\n";
        let mut stream = RowStream::open(&cfg, raw).unwrap();
        let row = stream.next().unwrap().unwrap();
        assert_eq!(row.value("name"), &CellValue::Text("JOSÉ".to_string()));
    }

    #[test]
    fn test_empty_file_fails() {
        let err = RowStream::open(&contact_config(), b"").unwrap_err();
        assert!(matches!(err, IngestError::EmptyFile { .. }));
    }

    #[test]
    fn test_datetime_format_list_order() {
        let midnight = |y, m, d: u32| {
            NaiveDate::from_ymd_opt(y, m as u32, d)
                .unwrap()
                .and_time(NaiveTime::MIN)
        };
        assert_eq!(parse_datetime("2020-01-02"), Some(midnight(2020, 1, 2)));
        assert_eq!(parse_datetime("01/02/2020"), Some(midnight(2020, 1, 2)));
        assert_eq!(parse_datetime("01/02/20"), Some(midnight(2020, 1, 2)));
        assert_eq!(parse_datetime("20200102"), Some(midnight(2020, 1, 2)));
        assert_eq!(
            parse_datetime("2020-01-02 13:45:00"),
            NaiveDate::from_ymd_opt(2020, 1, 2)
                .unwrap()
                .and_hms_opt(13, 45, 0)
        );
        assert_eq!(parse_datetime("not a date"), None);
    }
}
