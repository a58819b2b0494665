use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Write};

use serde::de::{self, DeserializeOwned, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::value::RawValue;
use thiserror::Error;
use tracing::debug;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

pub const MAX_COLUMN_WIDTH: usize = 50;
const COLUMN_GAP: &str = "  ";
const DETAIL_LABEL_WIDTH: usize = 20;

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

/// Decides what reaches stdout and stderr.
#[derive(Debug, Clone, Copy)]
pub struct Formatter {
    mode: OutputMode,
    quiet: bool,
}

impl Formatter {
    pub fn new(json: bool, quiet: bool) -> Self {
        let mode = if json { OutputMode::Json } else { OutputMode::Human };
        Self { mode, quiet }
    }

    pub fn is_json(&self) -> bool {
        self.mode == OutputMode::Json
    }

    /// Pretty-prints a response body; bytes that are not JSON pass through.
    pub fn print_raw(&self, body: &[u8]) -> Result<(), OutputError> {
        self.write_raw(&mut io::stdout().lock(), body)
    }

    pub fn write_raw<W: Write>(&self, out: &mut W, body: &[u8]) -> Result<(), OutputError> {
        writeln!(out, "{}", indent_json(body))?;
        Ok(())
    }

    /// Prints `{"<field>": [...]}` keeping each item's text as received.
    pub fn print_items(&self, field: &str, items: &[Box<RawValue>]) -> Result<(), OutputError> {
        let mut wrapper = BTreeMap::new();
        wrapper.insert(field, items);
        let compact = serde_json::to_vec(&wrapper)?;
        self.print_raw(&compact)
    }

    pub fn print_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<(), OutputError> {
        let payload = serde_json::to_string_pretty(value)?;
        println!("{payload}");
        Ok(())
    }

    pub fn print_table(&self, table: &Table) -> Result<(), OutputError> {
        self.write_data(&mut io::stdout().lock(), &table.render())
    }

    pub fn print_details(&self, fields: &[(&str, String)]) -> Result<(), OutputError> {
        self.write_data(&mut io::stdout().lock(), &format_details(fields))
    }

    pub fn write_data<W: Write>(&self, out: &mut W, text: &str) -> Result<(), OutputError> {
        out.write_all(text.as_bytes())?;
        Ok(())
    }

    /// Informational line, dropped in quiet mode.
    pub fn message(&self, text: &str) {
        if let Err(err) = self.write_message(&mut io::stdout().lock(), text) {
            debug!("failed to write message: {err}");
        }
    }

    pub fn success(&self, text: &str) {
        if let Err(err) = self.write_success(&mut io::stdout().lock(), text) {
            debug!("failed to write success message: {err}");
        }
    }

    pub fn error(&self, text: &str) {
        eprintln!("Error: {text}");
    }

    pub fn write_message<W: Write>(&self, out: &mut W, text: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        writeln!(out, "{text}")
    }

    pub fn write_success<W: Write>(&self, out: &mut W, text: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        writeln!(out, "✓ {text}")
    }
}

/// Re-indents a JSON document with two spaces. Scalars keep their exact text,
/// so large integers and number formatting survive. Bytes that are not JSON
/// are returned unchanged.
pub fn indent_json(body: &[u8]) -> String {
    match serde_json::from_slice::<JsonNode>(body)
        .and_then(|node| serde_json::to_string_pretty(&node))
    {
        Ok(pretty) => pretty,
        Err(_) => String::from_utf8_lossy(body).into_owned(),
    }
}

/// A JSON tree whose leaves are the untouched source text.
enum JsonNode {
    Object(Vec<(String, JsonNode)>),
    Array(Vec<JsonNode>),
    Scalar(Box<RawValue>),
}

impl JsonNode {
    fn from_raw(raw: Box<RawValue>) -> Result<Self, serde_json::Error> {
        match raw.get().as_bytes().first() {
            Some(b'{') => Ok(JsonNode::Object(serde_json::from_str::<Entries>(raw.get())?.0)),
            Some(b'[') => Ok(JsonNode::Array(serde_json::from_str(raw.get())?)),
            _ => Ok(JsonNode::Scalar(raw)),
        }
    }
}

impl<'de> Deserialize<'de> for JsonNode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Box::<RawValue>::deserialize(deserializer)?;
        JsonNode::from_raw(raw).map_err(de::Error::custom)
    }
}

impl Serialize for JsonNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            JsonNode::Object(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
            JsonNode::Array(items) => serializer.collect_seq(items),
            JsonNode::Scalar(raw) => raw.serialize(serializer),
        }
    }
}

/// Object members in source order, duplicates included.
struct Entries(Vec<(String, JsonNode)>);

impl<'de> Deserialize<'de> for Entries {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = Entries;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a JSON object")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Entries, A::Error> {
                let mut entries = Vec::new();
                while let Some(entry) = map.next_entry::<String, JsonNode>()? {
                    entries.push(entry);
                }
                Ok(Entries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

/// An aligned text table.
#[derive(Debug, Clone, Default)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: &[&str]) -> Self {
        Self {
            headers: headers.iter().map(|header| header.to_uppercase()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn add_row(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    pub fn extend(&mut self, rows: impl IntoIterator<Item = Vec<String>>) {
        self.rows.extend(rows);
    }

    pub fn render(&self) -> String {
        let columns = self.headers.len();
        let headers: Vec<String> = self.headers.iter().map(|header| fit_cell(header)).collect();
        let rows: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|row| {
                (0..columns)
                    .map(|index| row.get(index).map(|cell| fit_cell(cell)).unwrap_or_default())
                    .collect()
            })
            .collect();

        let mut widths: Vec<usize> = headers.iter().map(|header| display_width(header)).collect();
        for row in &rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(display_width(cell));
            }
        }

        let mut output = String::new();
        push_line(&mut output, &headers, &widths);
        let separator: Vec<String> = widths.iter().map(|width| "-".repeat(*width)).collect();
        push_line(&mut output, &separator, &widths);
        for row in &rows {
            push_line(&mut output, row, &widths);
        }
        output
    }
}

fn push_line(output: &mut String, cells: &[String], widths: &[usize]) {
    let last = cells.len().saturating_sub(1);
    for (index, (cell, width)) in cells.iter().zip(widths).enumerate() {
        if index == last {
            output.push_str(cell);
        } else {
            output.push_str(&pad_right(cell, *width));
            output.push_str(COLUMN_GAP);
        }
    }
    output.push('\n');
}

fn fit_cell(value: &str) -> String {
    truncate_display(&single_line(value), MAX_COLUMN_WIDTH)
}

/// Collapses each line break (`\r\n`, `\n` or `\r`) into one space.
pub fn single_line(value: &str) -> String {
    value.replace("\r\n", " ").replace(['\n', '\r'], " ")
}

/// Projects each item through `project`, skipping items that do not decode as `T`.
pub fn project_rows<T, F>(items: &[Box<RawValue>], project: F) -> Vec<Vec<String>>
where
    T: DeserializeOwned,
    F: Fn(&T) -> Vec<String>,
{
    items
        .iter()
        .filter_map(|item| match serde_json::from_str::<T>(item.get()) {
            Ok(row) => Some(project(&row)),
            Err(err) => {
                debug!("skipping row that failed to decode: {err}");
                None
            }
        })
        .collect()
}

/// Renders `Label: value` lines, leaving out empty values.
pub fn format_details(fields: &[(&str, String)]) -> String {
    let mut output = String::new();
    for (label, value) in fields {
        if value.is_empty() {
            continue;
        }
        let label = format!("{label}:");
        output.push_str(&pad_right(&label, DETAIL_LABEL_WIDTH));
        output.push(' ');
        output.push_str(value);
        output.push('\n');
    }
    output
}

pub fn display_width(value: &str) -> usize {
    UnicodeWidthStr::width(value)
}

pub fn truncate_display(value: &str, max_width: usize) -> String {
    if display_width(value) <= max_width {
        return value.to_string();
    }
    let ellipsis = "...";
    if max_width <= ellipsis.len() {
        return take_width(value, max_width);
    }
    let mut output = take_width(value, max_width - ellipsis.len());
    output.push_str(ellipsis);
    output
}

fn take_width(value: &str, max_width: usize) -> String {
    let mut width = 0usize;
    let mut output = String::new();
    for ch in value.chars() {
        let ch_width = UnicodeWidthChar::width(ch).unwrap_or(0);
        if width + ch_width > max_width {
            break;
        }
        output.push(ch);
        width += ch_width;
    }
    output
}

fn pad_right(value: &str, width: usize) -> String {
    let mut output = value.to_string();
    let current = display_width(value);
    if current < width {
        output.push_str(&" ".repeat(width - current));
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn long_cells_are_cut_at_the_column_cap() {
        let mut table = Table::new(&["NAME", "SIZE"]);
        table.add_row(vec![
            "a-very-long-value-that-exceeds-the-cap-by-a-wide-margin-xx".to_string(),
            "3".to_string(),
        ]);
        let rendered = table.render();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 3);

        let separator: Vec<&str> = lines[1].split("  ").collect();
        assert_eq!(separator[0], "-".repeat(50));
        assert_eq!(separator[1], "----");

        let cell = &lines[2][..50];
        assert!(cell.ends_with("..."));
        assert_eq!(cell, "a-very-long-value-that-exceeds-the-cap-by-a-wid...");
        assert!(lines[2].ends_with("  3"));
    }

    #[test]
    fn line_breaks_in_cells_become_spaces() {
        let mut table = Table::new(&["text"]);
        table.add_row(vec!["line1\nline2".to_string()]);
        table.add_row(vec!["a\r\nb\rc".to_string()]);
        let rendered = table.render();
        assert_eq!(rendered, "TEXT\n-----------\nline1 line2\na b c\n");
    }

    #[test]
    fn headers_are_upper_cased_and_last_column_unpadded() {
        let mut table = Table::new(&["name", "type"]);
        table.add_row(vec!["spaces/AAAA".to_string(), "SPACE".to_string()]);
        table.add_row(vec!["spaces/B".to_string()]);
        let rendered = table.render();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "NAME         TYPE");
        assert_eq!(lines[1], "-----------  -----");
        assert_eq!(lines[2], "spaces/AAAA  SPACE");
        assert_eq!(lines[3], "spaces/B     ");
    }

    #[test]
    fn wide_characters_count_by_display_width() {
        let mut table = Table::new(&["E", "X"]);
        table.add_row(vec!["日本".to_string(), "1".to_string()]);
        let lines: Vec<String> = table.render().lines().map(str::to_string).collect();
        assert_eq!(lines[1], "----  -");
        assert_eq!(lines[2], "日本  1");
    }

    #[test]
    fn truncation_hard_cuts_tiny_caps() {
        assert_eq!(truncate_display("abcdef", 3), "abc");
        assert_eq!(truncate_display("abcdef", 5), "ab...");
        assert_eq!(truncate_display("abc", 5), "abc");
    }

    #[test]
    fn raw_output_is_indented_or_passed_through() {
        assert_eq!(indent_json(br#"{"b":1,"a":[true]}"#), "{\n  \"b\": 1,\n  \"a\": [\n    true\n  ]\n}");
        assert_eq!(indent_json(b"not json"), "not json");
        assert_eq!(indent_json(br#"{"a":1} trailing"#), r#"{"a":1} trailing"#);
    }

    #[test]
    fn indentation_keeps_number_text() {
        let out = indent_json(br#"{"id":12345678901234567890123,"ratio":1.0e2,"t":1.50}"#);
        assert_eq!(
            out,
            "{\n  \"id\": 12345678901234567890123,\n  \"ratio\": 1.0e2,\n  \"t\": 1.50\n}"
        );
    }

    #[test]
    fn indentation_handles_nesting_and_empty_containers() {
        let out = indent_json(b" {\"z\": {\"y\": [1, {\"x\": \"a\\u00e9\"}]}, \"e\": [], \"o\": {}}\n");
        assert_eq!(
            out,
            "{\n  \"z\": {\n    \"y\": [\n      1,\n      {\n        \"x\": \"a\\u00e9\"\n      }\n    ]\n  },\n  \"e\": [],\n  \"o\": {}\n}"
        );
    }

    #[test]
    fn quiet_mode_keeps_data_and_drops_messages() {
        let formatter = Formatter::new(false, true);
        let mut out = Vec::new();
        formatter.write_message(&mut out, "No spaces found.").expect("write");
        formatter.write_success(&mut out, "Deleted").expect("write");
        assert!(out.is_empty());

        formatter.write_data(&mut out, "NAME\n").expect("write");
        formatter.write_raw(&mut out, b"{}").expect("write");
        assert_eq!(String::from_utf8(out).expect("utf8"), "NAME\n{}\n");
    }

    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn message_write_failures_are_surfaced() {
        let formatter = Formatter::new(false, false);
        let err = formatter.write_message(&mut ClosedPipe, "hello").expect_err("closed");
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        let err = formatter.write_success(&mut ClosedPipe, "done").expect_err("closed");
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn success_messages_carry_check_mark() {
        let formatter = Formatter::new(false, false);
        let mut out = Vec::new();
        formatter.write_success(&mut out, "Message deleted").expect("write");
        assert_eq!(String::from_utf8(out).expect("utf8"), "✓ Message deleted\n");
    }

    #[derive(Deserialize)]
    struct Row {
        name: String,
    }

    fn raw(value: serde_json::Value) -> Box<RawValue> {
        RawValue::from_string(value.to_string()).expect("raw value")
    }

    #[test]
    fn rows_that_fail_to_decode_are_skipped() {
        let items = vec![raw(json!({"name": "a"})), raw(json!({"name": 5})), raw(json!({"name": "c"}))];
        let rows = project_rows(&items, |row: &Row| vec![row.name.clone()]);
        assert_eq!(rows, vec![vec!["a".to_string()], vec!["c".to_string()]]);
    }

    #[test]
    fn details_skip_empty_values() {
        let rendered = format_details(&[
            ("Name", "spaces/A".to_string()),
            ("Description", String::new()),
            ("Type", "SPACE".to_string()),
        ]);
        assert_eq!(
            rendered,
            "Name:                spaces/A\nType:                SPACE\n"
        );
    }
}
