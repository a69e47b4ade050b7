//! Tabular result rendering.

use std::borrow::Cow;
use std::fmt::Write as _;
use std::str::FromStr;

use tiberius::{ColumnData, Row};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Markdown,
    Csv,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "markdown" | "md" => Ok(Self::Markdown),
            "csv" => Ok(Self::Csv),
            other => Err(format!("unknown output format '{other}' (table, markdown, csv)")),
        }
    }
}

/// One result set, fully materialized as strings.
#[derive(Debug, Clone, Default)]
pub struct ResultTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl ResultTable {
    pub fn from_rows(rows: Vec<Row>) -> Self {
        let columns = rows
            .first()
            .map(|row| row.columns().iter().map(|c| c.name().to_owned()).collect())
            .unwrap_or_default();
        let rows = rows
            .into_iter()
            .map(|row| row.into_iter().map(render_cell).collect())
            .collect();
        Self { columns, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn render(&self, format: OutputFormat) -> String {
        match format {
            OutputFormat::Table => self.render_table(),
            OutputFormat::Markdown => self.render_markdown(),
            OutputFormat::Csv => self.render_csv(),
        }
    }

    fn widths(&self) -> Vec<usize> {
        let mut widths: Vec<usize> = self.columns.iter().map(String::len).collect();
        for row in &self.rows {
            for (i, cell) in row.iter().enumerate() {
                if i >= widths.len() {
                    widths.push(cell.len());
                } else if cell.len() > widths[i] {
                    widths[i] = cell.len();
                }
            }
        }
        widths
    }

    fn render_table(&self) -> String {
        let widths = self.widths();
        let mut out = String::new();
        let line = |cells: &[String], out: &mut String| {
            let mut parts = Vec::with_capacity(cells.len());
            for (i, cell) in cells.iter().enumerate() {
                parts.push(format!("{:<width$}", cell, width = widths.get(i).copied().unwrap_or(0)));
            }
            let _ = writeln!(out, "{}", parts.join("  ").trim_end());
        };
        line(&self.columns, &mut out);
        let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        let _ = writeln!(out, "{}", rule.join("  ").trim_end());
        for row in &self.rows {
            line(row, &mut out);
        }
        out
    }

    fn render_markdown(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "| {} |", self.columns.join(" | "));
        let rule: Vec<&str> = self.columns.iter().map(|_| "---").collect();
        let _ = writeln!(out, "| {} |", rule.join(" | "));
        for row in &self.rows {
            let _ = writeln!(out, "| {} |", row.join(" | "));
        }
        out
    }

    fn render_csv(&self) -> String {
        let mut out = String::new();
        let escape = |cell: &str| -> String {
            if cell.contains([',', '"', '\n']) {
                format!("\"{}\"", cell.replace('"', "\"\""))
            } else {
                cell.to_owned()
            }
        };
        let _ = writeln!(out, "{}", self.columns.iter().map(|c| escape(c)).collect::<Vec<_>>().join(","));
        for row in &self.rows {
            let _ = writeln!(out, "{}", row.iter().map(|c| escape(c)).collect::<Vec<_>>().join(","));
        }
        out
    }
}

fn render_cell(data: ColumnData<'static>) -> String {
    fn opt<T: ToString>(value: Option<T>) -> String {
        value.map(|v| v.to_string()).unwrap_or_else(|| "NULL".to_owned())
    }

    match data {
        ColumnData::U8(v) => opt(v),
        ColumnData::I16(v) => opt(v),
        ColumnData::I32(v) => opt(v),
        ColumnData::I64(v) => opt(v),
        ColumnData::F32(v) => opt(v),
        ColumnData::F64(v) => opt(v),
        ColumnData::Bit(v) => opt(v.map(|b| if b { "1" } else { "0" })),
        ColumnData::String(v) => opt(v.map(Cow::into_owned)),
        ColumnData::Guid(v) => opt(v),
        ColumnData::Numeric(v) => opt(v),
        ColumnData::Binary(v) => match v {
            Some(bytes) => {
                let mut hex = String::with_capacity(2 + bytes.len() * 2);
                hex.push_str("0x");
                for byte in bytes.iter() {
                    let _ = write!(hex, "{byte:02X}");
                }
                hex
            }
            None => "NULL".to_owned(),
        },
        // Date/time and xml variants are rare in this tool's result sets;
        // their debug form is good enough for an operator's eyes.
        other => format!("{other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ResultTable {
        ResultTable {
            columns: vec!["name".into(), "value".into()],
            rows: vec![
                vec!["sa".into(), "1".into()],
                vec!["svc,acct".into(), "long-value".into()],
            ],
        }
    }

    #[test]
    fn format_parsing() {
        assert_eq!("md".parse::<OutputFormat>().unwrap(), OutputFormat::Markdown);
        assert_eq!("CSV".parse::<OutputFormat>().unwrap(), OutputFormat::Csv);
        assert!("yaml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn table_alignment() {
        let rendered = sample().render(OutputFormat::Table);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "name      value");
        assert_eq!(lines[1], "--------  ----------");
        assert_eq!(lines[2], "sa        1");
    }

    #[test]
    fn markdown_shape() {
        let rendered = sample().render(OutputFormat::Markdown);
        assert!(rendered.starts_with("| name | value |\n| --- | --- |\n"));
    }

    #[test]
    fn csv_escapes_embedded_commas() {
        let rendered = sample().render(OutputFormat::Csv);
        assert!(rendered.contains("\"svc,acct\",long-value"));
    }
}
