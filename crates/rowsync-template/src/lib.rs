//! Document templates for Rowsync.
//!
//! A template is plain text with `{{ .table.field }}` placeholders. It is
//! parsed once per request; the referenced columns drive join synthesis and
//! each scanned [`FlatRow`] is rendered into one document.
//!
//! ```rust
//! use rowsync_core::FlatRow;
//! use rowsync_template::DocumentTemplate;
//!
//! let template = DocumentTemplate::parse("{{.products.nom}} costs {{.products.prix}}").unwrap();
//! let mut row = FlatRow::new();
//! row.insert("products", "nom", serde_json::json!("Chaise"));
//! row.insert("products", "prix", serde_json::json!(49.99));
//! assert_eq!(template.render(&row).unwrap(), "Chaise costs 49.99");
//! ```

use rowsync_core::{scalar_to_text, FlatRow, RowsyncError, TableColumnMap};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Field { table: String, field: String },
}

/// A parsed document template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentTemplate {
    segments: Vec<Segment>,
}

impl DocumentTemplate {
    /// Parse `template`, failing on unclosed or malformed placeholders.
    ///
    /// Only the nested `.table.field` form is accepted; a flat `{{ .field }}`
    /// is rejected so every placeholder names its table.
    pub fn parse(template: &str) -> Result<Self, RowsyncError> {
        let mut segments = Vec::new();
        let mut rest = template;
        let mut offset = 0;

        while let Some(start) = rest.find("{{") {
            if start > 0 {
                segments.push(Segment::Text(rest[..start].to_string()));
            }
            let after_start = &rest[start + 2..];
            let end = after_start.find("}}").ok_or_else(|| {
                RowsyncError::Template(format!(
                    "unclosed placeholder at byte {}",
                    offset + start
                ))
            })?;
            let (table, field) = parse_placeholder(&after_start[..end])?;
            segments.push(Segment::Field { table, field });

            let consumed = start + 2 + end + 2;
            offset += consumed;
            rest = &rest[consumed..];
        }

        if !rest.is_empty() {
            segments.push(Segment::Text(rest.to_string()));
        }
        Ok(Self { segments })
    }

    /// Every `table.column` the template references, in order of first use.
    pub fn table_columns(&self) -> TableColumnMap {
        let mut map = TableColumnMap::new();
        for segment in &self.segments {
            if let Segment::Field { table, field } = segment {
                map.insert(table.as_str(), field.as_str());
            }
        }
        map
    }

    /// Render the template against one row.
    ///
    /// A placeholder whose table or field is absent from `row` is an error;
    /// a present NULL renders as the empty string.
    pub fn render(&self, row: &FlatRow) -> Result<String, RowsyncError> {
        let mut output = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => output.push_str(text),
                Segment::Field { table, field } => {
                    let value = row.get(table, field).ok_or_else(|| {
                        RowsyncError::Template(format!("missing field {table}.{field}"))
                    })?;
                    output.push_str(&scalar_to_text(value));
                }
            }
        }
        Ok(output)
    }

    pub fn placeholder_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::Field { .. }))
            .count()
    }
}

/// Split the inside of `{{ ... }}` into `(table, field)`.
fn parse_placeholder(raw: &str) -> Result<(String, String), RowsyncError> {
    let inner = raw.trim();
    let path = inner.strip_prefix('.').ok_or_else(|| {
        RowsyncError::Template(format!(
            "placeholder '{{{{{raw}}}}}' must start with '.', as in {{{{ .table.field }}}}"
        ))
    })?;

    let mut parts = path.splitn(2, '.');
    let table = parts.next().unwrap_or_default();
    let field = parts.next().unwrap_or_default();

    let valid = |part: &str| !part.is_empty() && !part.chars().any(|c| c.is_whitespace() || c == '.');
    if !valid(table) || !valid(field) {
        return Err(RowsyncError::Template(format!(
            "placeholder '{{{{{raw}}}}}' must have the form {{{{ .table.field }}}}"
        )));
    }
    Ok((table.to_string(), field.to_string()))
}
