//! Default formatting for objects that reach the end of a pipeline.

use poshconsole_types::{PsObject, PsValue};

const ERROR_RECORD_TYPE: &str = "System.Management.Automation.ErrorRecord";

/// Objects with more properties than this print as a list instead of a table.
const MAX_TABLE_COLUMNS: usize = 4;

/// Renders values the way `Out-Default` prints them, one entry per line.
pub fn format_lines(values: &[PsValue]) -> Vec<String> {
    let mut flat = Vec::new();
    flatten(values, &mut flat);

    let mut lines = Vec::new();
    let mut i = 0;
    while i < flat.len() {
        match flat[i] {
            PsValue::Object(obj) if is_tabular(obj) => {
                let type_name = obj.type_name();
                let run: Vec<&PsObject> = flat[i..]
                    .iter()
                    .map_while(|v| match v {
                        PsValue::Object(o) if is_tabular(o) && o.type_name() == type_name => Some(o),
                        _ => None,
                    })
                    .collect();
                i += run.len();
                if run[0].properties.len() > MAX_TABLE_COLUMNS {
                    list_view(&run, &mut lines);
                } else {
                    table_view(&run, &mut lines);
                }
            }
            value => {
                if !value.is_null() {
                    lines.extend(value.to_string().lines().map(str::to_string));
                }
                i += 1;
            }
        }
    }
    lines
}

/// `Out-String`: the formatted lines joined, with a trailing newline.
pub fn format_string(values: &[PsValue]) -> String {
    let mut out = String::new();
    for line in format_lines(values) {
        out.push_str(&line);
        out.push('\n');
    }
    out
}

fn flatten<'a>(values: &'a [PsValue], out: &mut Vec<&'a PsValue>) {
    for value in values {
        match value {
            PsValue::List(items) => flatten(items, out),
            other => out.push(other),
        }
    }
}

fn is_tabular(obj: &PsObject) -> bool {
    !obj.properties.is_empty() && obj.type_name() != ERROR_RECORD_TYPE
}

fn cell(value: &PsValue) -> String {
    match value {
        PsValue::List(items) => {
            let inner: Vec<String> = items.iter().map(ToString::to_string).collect();
            format!("{{{}}}", inner.join(", "))
        }
        other => other.to_string().replace('\n', " "),
    }
}

fn table_view(rows: &[&PsObject], lines: &mut Vec<String>) {
    let headers: Vec<&str> = rows[0].properties.iter().map(|p| p.name.as_str()).collect();
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            headers
                .iter()
                .map(|h| row.get(h).map(cell).unwrap_or_default())
                .collect()
        })
        .collect();
    let numeric: Vec<bool> = headers
        .iter()
        .map(|h| {
            rows.iter()
                .filter_map(|row| row.get(h))
                .all(PsValue::is_numeric)
        })
        .collect();
    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(c, h)| {
            cells
                .iter()
                .map(|row| row[c].chars().count())
                .chain(std::iter::once(h.chars().count()))
                .max()
                .unwrap_or_default()
        })
        .collect();

    let render = |values: &[String]| {
        let mut line = String::new();
        for (c, value) in values.iter().enumerate() {
            if c > 0 {
                line.push(' ');
            }
            if numeric[c] {
                line.push_str(&format!("{value:>width$}", width = widths[c]));
            } else {
                line.push_str(&format!("{value:<width$}", width = widths[c]));
            }
        }
        line.trim_end().to_string()
    };

    lines.push(String::new());
    let header_cells: Vec<String> = headers.iter().map(|h| (*h).to_string()).collect();
    lines.push(render(&header_cells));
    let underline: Vec<String> = headers.iter().map(|h| "-".repeat(h.chars().count())).collect();
    lines.push(render(&underline));
    for row in &cells {
        lines.push(render(row));
    }
    lines.push(String::new());
}

fn list_view(rows: &[&PsObject], lines: &mut Vec<String>) {
    for row in rows {
        let width = row
            .properties
            .iter()
            .map(|p| p.name.chars().count())
            .max()
            .unwrap_or_default();
        lines.push(String::new());
        for property in &row.properties {
            lines.push(
                format!("{:<width$} : {}", property.name, cell(&property.value))
                    .trim_end()
                    .to_string(),
            );
        }
    }
    lines.push(String::new());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(name: &str, size: i32) -> PsValue {
        PsValue::Object(
            PsObject::new("Test.Item")
                .with_property("Name", name)
                .with_property("Size", size),
        )
    }

    #[test]
    fn scalars_one_per_line() {
        let lines = format_lines(&[
            PsValue::from("a"),
            PsValue::NULL,
            PsValue::List(vec![PsValue::from(1), PsValue::from(true)]),
        ]);
        assert_eq!(lines, vec!["a", "1", "True"]);
    }

    #[test]
    fn objects_become_a_table() {
        let lines = format_lines(&[item("alpha", 5), item("b", 120)]);
        assert_eq!(
            lines,
            vec!["", "Name  Size", "----  ----", "alpha    5", "b      120", ""]
        );
    }

    #[test]
    fn wide_objects_use_list_view() {
        let mut obj = PsObject::new("Test.Wide");
        for name in ["A", "Bb", "C", "D", "E"] {
            obj.set(name, 1);
        }
        let lines = format_lines(&[PsValue::Object(obj)]);
        assert_eq!(lines[0], "");
        assert_eq!(lines[1], "A  : 1");
        assert_eq!(lines[2], "Bb : 1");
        assert_eq!(lines.len(), 7);
    }

    #[test]
    fn out_string_ends_with_newline() {
        assert_eq!(format_string(&[PsValue::from("x"), PsValue::from(2)]), "x\n2\n");
    }
}
