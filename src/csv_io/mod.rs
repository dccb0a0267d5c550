use std::fs::File;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{EnrichError, Result};

/// Column holding the property search identifier.
pub const LOOKUP_COLUMN: usize = 1;

const OUTPUT_SUFFIX: &str = "-new.csv";

/// One record of the input file, fields in file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    fields: Vec<String>,
}

impl Row {
    pub fn new(fields: Vec<String>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Trimmed value of [`LOOKUP_COLUMN`], `None` when missing or blank.
    pub fn lookup_id(&self) -> Option<&str> {
        self.fields
            .get(LOOKUP_COLUMN)
            .map(|id| id.trim())
            .filter(|id| !id.is_empty())
    }
}

/// Derived columns followed by the untouched original fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichedRow {
    derived: Vec<String>,
    original: Row,
}

impl EnrichedRow {
    pub fn new(derived: Vec<String>, original: Row) -> Self {
        Self { derived, original }
    }

    pub fn derived(&self) -> &[String] {
        &self.derived
    }

    pub fn original(&self) -> &Row {
        &self.original
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.derived
            .iter()
            .chain(self.original.fields.iter())
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.derived.len() + self.original.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Checks that `path` names an existing `.csv` file.
pub fn validate_input_path(path: &Path) -> Result<()> {
    if path.extension().and_then(|ext| ext.to_str()) != Some("csv") {
        return Err(EnrichError::invalid_input(path, "expected a .csv file"));
    }
    if !path.is_file() {
        return Err(EnrichError::invalid_input(path, "file does not exist"));
    }
    Ok(())
}

/// Reads every record of a headerless CSV file. Every record must have the
/// same number of fields as the first one.
pub fn load_rows(path: &Path) -> Result<Vec<Row>> {
    validate_input_path(path)?;

    let file = File::open(path)
        .map_err(|e| EnrichError::invalid_input(path, format!("unreadable: {}", e)))?;

    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_reader(file);

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record?;
        rows.push(Row::new(record.iter().map(str::to_string).collect()));
    }

    info!("Loaded {} rows from {}", rows.len(), path.display());
    Ok(rows)
}

/// `dir/name.csv` -> `dir/name-new.csv`.
pub fn output_path(input: &Path) -> Result<PathBuf> {
    let name = input
        .file_name()
        .and_then(|name| name.to_str())
        .and_then(|name| name.strip_suffix(".csv"))
        .ok_or_else(|| EnrichError::invalid_input(input, "expected a .csv file"))?;

    Ok(input.with_file_name(format!("{}{}", name, OUTPUT_SUFFIX)))
}

/// Writes enriched rows without a header, replacing any existing file.
pub fn write_rows(path: &Path, rows: &[EnrichedRow]) -> Result<()> {
    let file = File::create(path).map_err(|source| EnrichError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_writer(file);

    for row in rows {
        wtr.write_record(row.fields())?;
    }

    wtr.flush().map_err(|source| EnrichError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    debug!("Wrote {} rows to {}", rows.len(), path.display());
    Ok(())
}
