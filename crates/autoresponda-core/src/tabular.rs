use std::io::{Cursor, Read, Seek};
use std::str::FromStr;

use calamine::{
    Data, Ods, OdsError, Range, Reader, Xls, XlsError, Xlsx, XlsxError, open_workbook_from_rs,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::rules::import::{ImportCell, ImportRow};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TabularFormat {
    Csv,
    Xlsx,
    /// Legacy BIFF workbook inside an OLE compound file.
    Xls,
    Ods,
}

impl TabularFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            TabularFormat::Csv => "csv",
            TabularFormat::Xlsx => "xlsx",
            TabularFormat::Xls => "xls",
            TabularFormat::Ods => "ods",
        }
    }

    /// Guess the format from a file name's extension.
    pub fn from_file_name(name: &str) -> Result<Self, TabularError> {
        let extension = name.rsplit_once('.').map(|(_, ext)| ext).unwrap_or_default();
        extension.parse()
    }
}

impl FromStr for TabularFormat {
    type Err = TabularError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "csv" | "text/csv" => Ok(Self::Csv),
            "xlsx" => Ok(Self::Xlsx),
            "xls" => Ok(Self::Xls),
            "ods" => Ok(Self::Ods),
            other => Err(TabularError::Unsupported(other.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum TabularError {
    #[error("unsupported file format: {0}")]
    Unsupported(String),
    #[error("unsupported or malformed file: {0}")]
    Malformed(String),
}

/// Parse raw file bytes into rows of cells. No header handling happens here.
pub fn parse_rows(bytes: &[u8], format: TabularFormat) -> Result<Vec<ImportRow>, TabularError> {
    match format {
        TabularFormat::Csv => parse_csv(bytes),
        TabularFormat::Xlsx => {
            let workbook: Xlsx<Cursor<&[u8]>> = open_workbook_from_rs(Cursor::new(bytes))
                .map_err(|err: XlsxError| TabularError::Malformed(err.to_string()))?;
            first_sheet_rows(workbook)
        }
        TabularFormat::Xls => {
            let workbook: Xls<Cursor<&[u8]>> = open_workbook_from_rs(Cursor::new(bytes))
                .map_err(|err: XlsError| TabularError::Malformed(err.to_string()))?;
            first_sheet_rows(workbook)
        }
        TabularFormat::Ods => {
            let workbook: Ods<Cursor<&[u8]>> = open_workbook_from_rs(Cursor::new(bytes))
                .map_err(|err: OdsError| TabularError::Malformed(err.to_string()))?;
            first_sheet_rows(workbook)
        }
    }
}

fn parse_csv(bytes: &[u8]) -> Result<Vec<ImportRow>, TabularError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::None)
        .from_reader(bytes);

    reader
        .records()
        .map(|record| {
            let record = record.map_err(|err| TabularError::Malformed(err.to_string()))?;
            Ok(record.iter().map(text_cell).collect())
        })
        .collect()
}

fn text_cell(value: &str) -> ImportCell {
    if value.is_empty() {
        ImportCell::Empty
    } else {
        ImportCell::Text(value.to_string())
    }
}

fn first_sheet_rows<RS, R>(mut workbook: R) -> Result<Vec<ImportRow>, TabularError>
where
    RS: Read + Seek,
    R: Reader<RS>,
    R::Error: std::fmt::Display,
{
    let Some(sheet_name) = workbook.sheet_names().first().cloned() else {
        return Ok(Vec::new());
    };

    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|err| TabularError::Malformed(err.to_string()))?;
    debug!(sheet = %sheet_name, rows = range.height(), "read first worksheet");

    Ok(range_rows(&range))
}

fn range_rows(range: &Range<Data>) -> Vec<ImportRow> {
    range
        .rows()
        .map(|row| row.iter().map(data_cell).collect())
        .collect()
}

fn data_cell(data: &Data) -> ImportCell {
    match data {
        Data::String(text) => text_cell(text),
        Data::Int(value) => ImportCell::Number(*value as f64),
        Data::Float(value) => ImportCell::Number(*value),
        Data::Bool(value) => ImportCell::Bool(*value),
        Data::DateTime(value) => ImportCell::Number(value.as_f64()),
        Data::DateTimeIso(text) | Data::DurationIso(text) => text_cell(text),
        Data::Error(_) | Data::Empty => ImportCell::Empty,
    }
}
