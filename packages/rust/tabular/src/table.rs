//! In-memory result table and the CSV/JSON decoders that produce it.

use serde_json::Value;

use biokb_shared::{BioKbError, Result};

// ---------------------------------------------------------------------------
// ResultTable
// ---------------------------------------------------------------------------

/// An ordered, uniform-schema table of string cells.
///
/// Zero rows is a legitimate, successful outcome (the server answered and
/// the list was empty), never an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultTable {
    /// Column names, in file order.
    pub headers: Vec<String>,
    /// Data rows; each row has exactly `headers.len()` cells.
    pub rows: Vec<Vec<String>>,
}

impl ResultTable {
    /// An empty table with no columns and no rows.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of data rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// True when the table has no data rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Parse a CSV body into a table.
    ///
    /// An entirely empty body yields an empty table. Malformed CSV (ragged
    /// rows, broken quoting) is a parse error, which the download protocol
    /// uses as the signal to fall back to JSON.
    pub fn from_csv(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::empty());
        }

        let mut reader = csv::ReaderBuilder::new().from_reader(text.as_bytes());

        let headers = reader
            .headers()
            .map_err(|e| BioKbError::parse(format!("CSV header: {e}")))?
            .iter()
            .map(str::to_string)
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| BioKbError::parse(format!("CSV row: {e}")))?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        Ok(Self { headers, rows })
    }

    /// Parse a JSON array-of-objects body into a table.
    ///
    /// The column set is the union of all record keys, in first-seen order;
    /// records missing a column get an empty cell. Any shape other than an
    /// array of objects is a protocol error.
    pub fn from_json_records(text: &str) -> Result<Self> {
        let parsed: Value = serde_json::from_str(text)
            .map_err(|e| BioKbError::parse(format!("JSON body: {e}")))?;

        let Value::Array(records) = parsed else {
            return Err(BioKbError::protocol(
                "unexpected JSON structure from download endpoint (expected an array of records)",
            ));
        };

        let mut headers: Vec<String> = Vec::new();
        let mut objects = Vec::with_capacity(records.len());

        for record in records {
            let Value::Object(map) = record else {
                return Err(BioKbError::protocol(
                    "unexpected JSON structure from download endpoint (record is not an object)",
                ));
            };
            for key in map.keys() {
                if !headers.iter().any(|h| h == key) {
                    headers.push(key.clone());
                }
            }
            objects.push(map);
        }

        let rows = objects
            .into_iter()
            .map(|map| {
                headers
                    .iter()
                    .map(|h| map.get(h).map(render_cell).unwrap_or_default())
                    .collect()
            })
            .collect();

        Ok(Self { headers, rows })
    }

    /// Append a constant-valued column to every row.
    pub fn push_constant_column(&mut self, name: impl Into<String>, value: &str) {
        self.headers.push(name.into());
        for row in &mut self.rows {
            row.push(value.to_string());
        }
    }

    /// Concatenate tables with column-union semantics.
    ///
    /// Columns keep first-seen order across inputs; rows missing a column
    /// get an empty cell. Tables with zero rows contribute nothing, not
    /// even their headers.
    pub fn concat(tables: &[ResultTable]) -> ResultTable {
        let mut headers: Vec<String> = Vec::new();
        for table in tables {
            if table.is_empty() {
                continue;
            }
            for h in &table.headers {
                if !headers.iter().any(|existing| existing == h) {
                    headers.push(h.clone());
                }
            }
        }

        let mut rows = Vec::new();
        for table in tables {
            if table.is_empty() {
                continue;
            }
            for row in &table.rows {
                let aligned = headers
                    .iter()
                    .map(|h| {
                        table
                            .headers
                            .iter()
                            .position(|th| th == h)
                            .and_then(|i| row.get(i))
                            .cloned()
                            .unwrap_or_default()
                    })
                    .collect();
                rows.push(aligned);
            }
        }

        ResultTable { headers, rows }
    }
}

/// Render a JSON value as a cell, without quoting plain strings.
fn render_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
