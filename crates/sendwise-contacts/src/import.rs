//! Contact file parsing: plain text, CSV, JSON and XLSX

use once_cell::sync::Lazy;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::io::{Cursor, Read};
use tracing::debug;
use utoipa::ToSchema;
use zip::result::ZipError;
use zip::ZipArchive;

use crate::errors::ImportError;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[a-z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?(?:\.[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?)+$",
    )
    .expect("email regex is valid")
});

const FIRST_SHEET_FALLBACK: &str = "xl/worksheets/sheet1.xml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ImportFormat {
    Txt,
    Csv,
    Json,
    Xlsx,
}

impl std::fmt::Display for ImportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

impl ImportFormat {
    /// Accepts a format name or a bare extension, e.g. `csv` or `.CSV`
    pub fn parse(value: &str) -> Result<Self, ImportError> {
        match value.trim().trim_start_matches('.').to_lowercase().as_str() {
            "txt" | "text" => Ok(ImportFormat::Txt),
            "csv" => Ok(ImportFormat::Csv),
            "json" => Ok(ImportFormat::Json),
            "xlsx" | "excel" => Ok(ImportFormat::Xlsx),
            _ => Err(ImportError::UnsupportedFormat(value.trim().to_string())),
        }
    }

    pub fn from_file_name(file_name: &str) -> Result<Self, ImportError> {
        match file_name.rsplit_once('.') {
            Some((_, extension)) => Self::parse(extension),
            None => Err(ImportError::UnsupportedFormat(file_name.to_string())),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ImportFormat::Txt => "txt",
            ImportFormat::Csv => "csv",
            ImportFormat::Json => "json",
            ImportFormat::Xlsx => "xlsx",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ImportFormat::Txt => "text/plain; charset=utf-8",
            ImportFormat::Csv => "text/csv; charset=utf-8",
            ImportFormat::Json => "application/json",
            ImportFormat::Xlsx => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ImportedContact {
    #[schema(example = "jane@example.com")]
    pub email: String,
    #[schema(example = "Jane Doe")]
    pub name: Option<String>,
}

/// A row that was not imported. `row` is 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SkippedRow {
    pub row: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    pub contacts: Vec<ImportedContact>,
    pub skipped: Vec<SkippedRow>,
}

/// Trimmed, lowercased address, or `None` when it is not a valid email
pub fn normalize_email(raw: &str) -> Option<String> {
    let email = raw.trim().to_lowercase();
    EMAIL_RE.is_match(&email).then_some(email)
}

#[derive(Default)]
struct ReportBuilder {
    report: ImportReport,
    seen: HashSet<String>,
}

impl ReportBuilder {
    fn push(&mut self, row: usize, raw_email: &str, name: Option<&str>) {
        let Some(email) = normalize_email(raw_email) else {
            let reason = if raw_email.trim().is_empty() {
                "missing email".to_string()
            } else {
                format!("invalid email '{}'", raw_email.trim())
            };
            self.skip(row, reason);
            return;
        };

        // First occurrence wins
        if !self.seen.insert(email.clone()) {
            return;
        }

        let name = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);
        self.report.contacts.push(ImportedContact { email, name });
    }

    fn skip(&mut self, row: usize, reason: String) {
        self.report.skipped.push(SkippedRow { row, reason });
    }

    fn finish(self) -> ImportReport {
        self.report
    }
}

pub fn parse_contacts(format: ImportFormat, data: &[u8]) -> Result<ImportReport, ImportError> {
    let report = match format {
        ImportFormat::Txt => parse_txt(decode_text(data)?),
        ImportFormat::Csv => parse_csv(decode_text(data)?),
        ImportFormat::Json => parse_json(decode_text(data)?)?,
        ImportFormat::Xlsx => parse_xlsx(data)?,
    };

    debug!(
        "Parsed {} file: {} contacts, {} skipped rows",
        format,
        report.contacts.len(),
        report.skipped.len()
    );

    Ok(report)
}

fn decode_text(data: &[u8]) -> Result<&str, ImportError> {
    let text = std::str::from_utf8(data).map_err(|_| ImportError::InvalidEncoding)?;
    Ok(text.trim_start_matches('\u{feff}'))
}

fn parse_txt(text: &str) -> ImportReport {
    let mut builder = ReportBuilder::default();
    for (index, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        builder.push(index + 1, line, None);
    }
    builder.finish()
}

/// Splits one CSV record, honouring double quotes and `""` escapes
pub(crate) fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }
    fields.push(field);

    fields
}

/// Groups lines into CSV records so quoted fields may span lines.
/// Each record carries the 1-based line it starts on.
fn csv_records(text: &str) -> Vec<(usize, String)> {
    let mut records = Vec::new();
    let mut current: Option<(usize, String)> = None;
    let mut in_quotes = false;

    for (index, line) in text.lines().enumerate() {
        match current.as_mut() {
            Some((_, record)) => {
                record.push('\n');
                record.push_str(line);
            }
            None => current = Some((index + 1, line.to_string())),
        }
        // `""` escapes flip the state twice, so parity is enough
        if line.matches('"').count() % 2 == 1 {
            in_quotes = !in_quotes;
        }
        if !in_quotes {
            records.extend(current.take());
        }
    }
    // An unterminated quote keeps the rest of the file as one record
    records.extend(current);

    records
}

fn parse_csv(text: &str) -> ImportReport {
    let mut builder = ReportBuilder::default();
    let mut records = csv_records(text)
        .into_iter()
        .filter(|(_, record)| !record.trim().is_empty())
        .peekable();

    let mut email_col = 0;
    let mut name_col = Some(1);

    if let Some((_, first)) = records.peek() {
        let header: Vec<String> = split_csv_line(first)
            .iter()
            .map(|f| f.trim().to_lowercase())
            .collect();
        if let Some(col) = header.iter().position(|f| f == "email") {
            email_col = col;
            name_col = header.iter().position(|f| f == "name");
            records.next();
        }
    }

    for (row, record) in records {
        let fields = split_csv_line(&record);
        let email = fields.get(email_col).map(String::as_str).unwrap_or("");
        let name = name_col.and_then(|col| fields.get(col)).map(String::as_str);
        builder.push(row, email, name);
    }

    builder.finish()
}

fn parse_json(text: &str) -> Result<ImportReport, ImportError> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| ImportError::Malformed(format!("Invalid JSON: {}", e)))?;
    let Value::Array(entries) = value else {
        return Err(ImportError::Malformed(
            "JSON import must be an array of emails or contact objects".to_string(),
        ));
    };

    let mut builder = ReportBuilder::default();
    for (index, entry) in entries.iter().enumerate() {
        let row = index + 1;
        match entry {
            Value::String(email) => builder.push(row, email, None),
            Value::Object(fields) => {
                let email = fields.get("email").and_then(Value::as_str).unwrap_or("");
                let name = fields.get("name").and_then(Value::as_str);
                builder.push(row, email, name);
            }
            _ => builder.skip(row, "entry is neither a string nor an object".to_string()),
        }
    }

    Ok(builder.finish())
}

// ========================================
// XLSX
// ========================================

/// A non-empty worksheet row; `number` is the spreadsheet's 1-based row number
#[derive(Debug, Clone, PartialEq, Eq)]
struct SheetRow {
    number: usize,
    cells: Vec<String>,
}

impl SheetRow {
    fn set(&mut self, column: usize, value: String) {
        if self.cells.len() <= column {
            self.cells.resize(column + 1, String::new());
        }
        self.cells[column] = value;
    }

    fn cell(&self, column: usize) -> &str {
        self.cells.get(column).map(String::as_str).unwrap_or("")
    }
}

struct PendingCell {
    column: usize,
    kind: Option<String>,
    value: String,
}

fn xml_error(e: impl std::fmt::Display) -> ImportError {
    ImportError::Xlsx(format!("Invalid XML: {}", e))
}

fn attribute(element: &BytesStart, key: &[u8]) -> Result<Option<String>, ImportError> {
    for attr in element.attributes() {
        let attr = attr.map_err(xml_error)?;
        if attr.key.local_name().as_ref() == key {
            return Ok(Some(attr.unescape_value().map_err(xml_error)?.into_owned()));
        }
    }
    Ok(None)
}

/// Attribute maps of every `element` tag, in document order
fn element_attributes(
    xml: &str,
    element: &[u8],
) -> Result<Vec<HashMap<String, String>>, ImportError> {
    let mut reader = Reader::from_str(xml);
    let mut found = Vec::new();

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == element => {
                let mut attrs = HashMap::new();
                for attr in e.attributes() {
                    let attr = attr.map_err(xml_error)?;
                    let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
                    attrs.insert(key, attr.unescape_value().map_err(xml_error)?.into_owned());
                }
                found.push(attrs);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(found)
}

fn read_zip_entry(
    archive: &mut ZipArchive<Cursor<&[u8]>>,
    name: &str,
) -> Result<Option<String>, ImportError> {
    let mut file = match archive.by_name(name) {
        Ok(file) => file,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(ImportError::Xlsx(format!("Failed to open {}: {}", name, e))),
    };

    let mut content = String::new();
    file.read_to_string(&mut content)
        .map_err(|e| ImportError::Xlsx(format!("Failed to read {}: {}", name, e)))?;

    Ok(Some(content))
}

/// Path of the first worksheet listed in the workbook
fn first_sheet_path(archive: &mut ZipArchive<Cursor<&[u8]>>) -> Result<String, ImportError> {
    let Some(workbook) = read_zip_entry(archive, "xl/workbook.xml")? else {
        return Ok(FIRST_SHEET_FALLBACK.to_string());
    };
    let Some(rel_id) = element_attributes(&workbook, b"sheet")?
        .into_iter()
        .next()
        .and_then(|mut attrs| attrs.remove("id"))
    else {
        return Ok(FIRST_SHEET_FALLBACK.to_string());
    };
    let Some(rels) = read_zip_entry(archive, "xl/_rels/workbook.xml.rels")? else {
        return Ok(FIRST_SHEET_FALLBACK.to_string());
    };

    let target = element_attributes(&rels, b"Relationship")?
        .into_iter()
        .find(|attrs| attrs.get("Id") == Some(&rel_id))
        .and_then(|mut attrs| attrs.remove("Target"));

    Ok(match target {
        Some(target) => match target.strip_prefix('/') {
            Some(absolute) => absolute.to_string(),
            None => format!("xl/{}", target),
        },
        None => FIRST_SHEET_FALLBACK.to_string(),
    })
}

fn parse_shared_strings(xml: &str) -> Result<Vec<String>, ImportError> {
    let mut reader = Reader::from_str(xml);
    let mut strings = Vec::new();
    let mut current: Option<String> = None;
    let mut in_text = false;
    let mut in_phonetic = false;

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"t" => in_text = true,
                b"rPh" => in_phonetic = true,
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Event::Text(text) if in_text && !in_phonetic => {
                if let Some(s) = current.as_mut() {
                    s.push_str(&text.unescape().map_err(xml_error)?);
                }
            }
            Event::CData(data) if in_text && !in_phonetic => {
                if let Some(s) = current.as_mut() {
                    s.push_str(&String::from_utf8_lossy(&data));
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"si" => strings.push(current.take().unwrap_or_default()),
                b"t" => in_text = false,
                b"rPh" => in_phonetic = false,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(strings)
}

/// Highest zero-based column a worksheet may use (`XFD`)
const MAX_COLUMN: usize = 16_383;

/// Zero-based column of a cell reference such as `C12`
fn column_index(reference: &str) -> Result<Option<usize>, ImportError> {
    let letters: String = reference
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    if letters.is_empty() {
        return Ok(None);
    }

    let out_of_range =
        || ImportError::Xlsx(format!("Cell reference {} is beyond column XFD", reference));
    let mut number = 0usize;
    for b in letters.to_ascii_uppercase().bytes() {
        number = number
            .checked_mul(26)
            .and_then(|n| n.checked_add((b - b'A' + 1) as usize))
            .filter(|n| *n - 1 <= MAX_COLUMN)
            .ok_or_else(out_of_range)?;
    }
    Ok(Some(number - 1))
}

fn parse_sheet(xml: &str, shared: &[String]) -> Result<Vec<SheetRow>, ImportError> {
    let mut reader = Reader::from_str(xml);
    let mut rows: Vec<SheetRow> = Vec::new();
    let mut row: Option<SheetRow> = None;
    let mut cell: Option<PendingCell> = None;
    let mut in_value = false;
    let mut in_phonetic = false;

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"row" => {
                    let number = attribute(&e, b"r")?
                        .and_then(|r| r.parse().ok())
                        .unwrap_or(rows.last().map(|r| r.number + 1).unwrap_or(1));
                    row = Some(SheetRow {
                        number,
                        cells: Vec::new(),
                    });
                }
                b"c" => {
                    let next_column = row.as_ref().map(|r| r.cells.len()).unwrap_or(0);
                    let column = match attribute(&e, b"r")? {
                        Some(reference) => column_index(&reference)?.unwrap_or(next_column),
                        None => next_column,
                    };
                    cell = Some(PendingCell {
                        column,
                        kind: attribute(&e, b"t")?,
                        value: String::new(),
                    });
                }
                b"v" | b"t" => in_value = cell.is_some(),
                b"rPh" => in_phonetic = true,
                _ => {}
            },
            Event::Text(text) if in_value && !in_phonetic => {
                if let Some(c) = cell.as_mut() {
                    c.value.push_str(&text.unescape().map_err(xml_error)?);
                }
            }
            Event::CData(data) if in_value && !in_phonetic => {
                if let Some(c) = cell.as_mut() {
                    c.value.push_str(&String::from_utf8_lossy(&data));
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"v" | b"t" => in_value = false,
                b"rPh" => in_phonetic = false,
                b"c" => {
                    if let (Some(pending), Some(current)) = (cell.take(), row.as_mut()) {
                        let value = match pending.kind.as_deref() {
                            Some("s") => pending
                                .value
                                .trim()
                                .parse::<usize>()
                                .ok()
                                .and_then(|i| shared.get(i).cloned())
                                .unwrap_or_default(),
                            _ => pending.value,
                        };
                        current.set(pending.column, value);
                    }
                }
                b"row" => {
                    if let Some(done) = row.take() {
                        if done.cells.iter().any(|c| !c.trim().is_empty()) {
                            rows.push(done);
                        }
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(rows)
}

fn read_xlsx_rows(data: &[u8]) -> Result<Vec<SheetRow>, ImportError> {
    let mut archive = ZipArchive::new(Cursor::new(data))
        .map_err(|e| ImportError::Xlsx(format!("Not an XLSX file: {}", e)))?;

    let shared = match read_zip_entry(&mut archive, "xl/sharedStrings.xml")? {
        Some(xml) => parse_shared_strings(&xml)?,
        None => Vec::new(),
    };

    let sheet_path = first_sheet_path(&mut archive)?;
    let sheet = read_zip_entry(&mut archive, &sheet_path)?
        .ok_or_else(|| ImportError::Xlsx(format!("Worksheet {} is missing", sheet_path)))?;

    parse_sheet(&sheet, &shared)
}

/// Header match: a column named exactly `exact`, else the first containing any of `partial`
fn find_column(header: &[String], exact: &str, partial: &[&str], skip: Option<usize>) -> Option<usize> {
    let candidates = || header.iter().enumerate().filter(|(i, _)| Some(*i) != skip);
    candidates()
        .find(|(_, h)| h.as_str() == exact)
        .or_else(|| candidates().find(|(_, h)| partial.iter().any(|p| h.contains(p))))
        .map(|(i, _)| i)
}

fn contacts_from_rows(rows: &[SheetRow]) -> Result<ImportReport, ImportError> {
    let mut builder = ReportBuilder::default();
    let Some(first) = rows.first() else {
        return Ok(builder.finish());
    };

    let header: Vec<String> = first
        .cells
        .iter()
        .map(|h| h.trim().to_lowercase())
        .collect();

    let (email_col, name_col, data_rows) =
        match find_column(&header, "email", &["email", "e-mail"], None) {
            Some(col) => (
                col,
                find_column(&header, "name", &["name"], Some(col)),
                &rows[1..],
            ),
            // Without an email header, the first row may already hold data
            None => match first.cells.iter().position(|c| c.contains('@')) {
                Some(col) => (col, None, rows),
                None => {
                    let col = rows
                        .get(1)
                        .and_then(|r| r.cells.iter().position(|c| c.contains('@')))
                        .ok_or_else(|| {
                            ImportError::Malformed("No email column found".to_string())
                        })?;
                    (col, find_column(&header, "name", &["name"], Some(col)), &rows[1..])
                }
            },
        };

    for row in data_rows {
        let name = name_col.map(|col| row.cell(col));
        builder.push(row.number, row.cell(email_col), name);
    }

    Ok(builder.finish())
}

fn parse_xlsx(data: &[u8]) -> Result<ImportReport, ImportError> {
    let rows = read_xlsx_rows(data)?;
    contacts_from_rows(&rows)
}
