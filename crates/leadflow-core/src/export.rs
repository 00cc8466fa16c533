//! CSV rendering for list views and the consolidated export.
//!
//! A cell is quoted (with inner quotes doubled) only when it contains a comma,
//! a double quote or a line break. Sections without rows are dropped entirely,
//! title and header included.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

pub const CSV_CONTENT_TYPE: &str = "text/csv; charset=utf-8";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub key: &'static str,
    pub label: &'static str,
}

const fn col(key: &'static str, label: &'static str) -> Column {
    Column { key, label }
}

pub const LEAD_COLUMNS: &[Column] = &[
    col("leadNo", "Lead No"),
    col("leadDate", "Lead Date"),
    col("leadType", "Lead Type"),
    col("sellerBuyerName", "Name"),
    col("sellerBuyerContact", "Contact"),
    col("itemDetails", "Item Details"),
    col("purity", "Purity"),
    col("qty", "Quantity"),
    col("packing", "Packing"),
    col("warehouse", "Warehouse"),
    col("sample", "Sample"),
    col("marketRate", "Market Rate"),
    col("sellerBuyerRate", "Seller/Buyer Rate"),
    col("aikyanRate", "Aikyan Rate"),
    col("frequency", "Frequency"),
    col("status", "Status"),
    col("note", "Note"),
];

pub const RATE_COLUMNS: &[Column] = &[
    col("item", "Item"),
    col("type", "Type"),
    col("packing", "Packing"),
    col("marketRate", "Market Rate"),
    col("rateChange", "Rate Change"),
    col("vendorName", "Vendor Name"),
    col("vendorRate", "Vendor Rate"),
    col("transport", "Transport"),
    col("aikyanRate", "Aikyan Rate"),
];

pub const PHONEBOOK_COLUMNS: &[Column] = &[
    col("name", "Name"),
    col("contact", "Contact"),
    col("company", "Company"),
];

pub type Record = Map<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub title: String,
    pub columns: &'static [Column],
    pub rows: Vec<Record>,
}

impl Section {
    pub fn new(title: impl Into<String>, columns: &'static [Column], rows: Vec<Record>) -> Self {
        Self {
            title: title.into(),
            columns,
            rows,
        }
    }

    pub fn from_records<T: Serialize>(
        title: impl Into<String>,
        columns: &'static [Column],
        records: &[T],
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(title, columns, to_records(records)?))
    }
}

/// Serializes each item to a JSON object keyed by wire name.
pub fn to_records<T: Serialize>(items: &[T]) -> Result<Vec<Record>, serde_json::Error> {
    items
        .iter()
        .map(|item| match serde_json::to_value(item)? {
            Value::Object(map) => Ok(map),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                Ok(map)
            }
        })
        .collect()
}

pub fn render(sections: &[Section]) -> String {
    let mut out = String::new();
    for section in sections {
        if section.rows.is_empty() {
            continue;
        }
        out.push('"');
        out.push_str(&section.title.replace('"', "\"\""));
        out.push_str("\"\n");
        out.push_str(&header_line(section.columns));
        out.push('\n');
        out.push_str(&row_lines(section.columns, &section.rows));
        out.push_str("\n\n");
    }
    out
}

/// Single-table export: header plus rows, or nothing when there are no rows.
pub fn render_table(columns: &[Column], rows: &[Record]) -> String {
    if rows.is_empty() {
        return String::new();
    }
    format!("{}\n{}", header_line(columns), row_lines(columns, rows))
}

pub fn escape_cell(cell: &str) -> String {
    if cell.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}

fn header_line(columns: &[Column]) -> String {
    columns
        .iter()
        .map(|column| escape_cell(column.label))
        .collect::<Vec<_>>()
        .join(",")
}

fn row_lines(columns: &[Column], rows: &[Record]) -> String {
    rows.iter()
        .map(|row| {
            columns
                .iter()
                .map(|column| escape_cell(&cell_text(row.get(column.key))))
                .collect::<Vec<_>>()
                .join(",")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn cell_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(Value::Bool(flag)) => flag.to_string(),
        Some(Value::Number(number)) => number.to_string(),
        Some(other) => other.to_string(),
    }
}

pub fn consolidated_file_name(now: DateTime<Utc>) -> String {
    format!("leadflow_export_{}.csv", now.format("%Y%m%d-%H%M%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    const AB: &[Column] = &[col("a", "A"), col("b", "B")];

    #[test]
    fn section_with_comma_cell_is_quoted() {
        let rendered = render(&[Section::new(
            "T",
            &[Column { key: "a", label: "A" }],
            vec![record(json!({"a": "x,y"}))],
        )]);

        let lines = rendered.lines().collect::<Vec<_>>();
        assert_eq!(lines[0], "\"T\"");
        assert_eq!(lines[1], "A");
        assert_eq!(lines[2], "\"x,y\"");
        assert!(rendered.ends_with("\"x,y\"\n\n"));
    }

    #[test]
    fn empty_sections_contribute_nothing() {
        let empty = Section::new("EMPTY", AB, Vec::new());
        assert_eq!(render(&[empty.clone()]), "");

        let full = Section::new("FULL", AB, vec![record(json!({"a": "1", "b": "2"}))]);
        assert_eq!(render(&[empty.clone(), full.clone(), empty]), render(&[full]));
    }

    #[test]
    fn quotes_and_newlines_are_escaped_and_missing_values_blank() {
        let rows = vec![
            record(json!({"a": "say \"hi\"", "b": null})),
            record(json!({"a": "two\nlines"})),
            record(json!({"a": 42, "b": true})),
        ];
        assert_eq!(
            render_table(AB, &rows),
            "A,B\n\"say \"\"hi\"\"\",\n\"two\nlines\",\n42,true"
        );
        assert_eq!(render_table(AB, &[]), "");
    }

    #[test]
    fn sections_render_in_order_with_separators() {
        let rendered = render(&[
            Section::new("ONE", AB, vec![record(json!({"a": "1"}))]),
            Section::new("TWO", AB, vec![record(json!({"b": "2"}))]),
        ]);
        assert_eq!(rendered, "\"ONE\"\nA,B\n1,\n\n\"TWO\"\nA,B\n,2\n\n");
    }

    #[test]
    fn records_follow_serde_wire_names() {
        let entries = vec![crate::PhonebookEntry::for_contact("Meera", "555-0101")];
        let section =
            Section::from_records("PHONEBOOK DATA", PHONEBOOK_COLUMNS, &entries).expect("records");
        assert_eq!(
            render(&[section]),
            "\"PHONEBOOK DATA\"\nName,Contact,Company\nMeera,555-0101,Meera\n\n"
        );
    }

    #[test]
    fn consolidated_name_is_timestamped() {
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 8, 5, 3).single().expect("ts");
        assert_eq!(consolidated_file_name(now), "leadflow_export_20261019-080503.csv");
    }
}
