use std::fmt::{self, Display, Formatter};

use tabled::{builder::Builder, settings::Style as TableStyle};

use super::painter::Painter;

/// A structured table that renders via `Display`.
#[derive(Debug)]
pub(crate) struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Creates a table with column headers and data rows.
    pub(crate) fn grid(
        headers: impl IntoIterator<Item = impl Into<String>>,
        rows: Vec<Vec<String>>,
    ) -> Self {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows,
        }
    }

    /// Creates a two-column field/value table with muted field names.
    pub(crate) fn key_value(painter: &Painter, rows: Vec<(&str, String)>) -> Self {
        let records = rows
            .into_iter()
            .map(|(field, value)| vec![painter.muted(field), value])
            .collect();
        Self::grid(["field", "value"], records)
    }
}

impl Display for Table {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut builder = Builder::default();
        builder.push_record(&self.headers);
        for row in &self.rows {
            builder.push_record(row);
        }
        let mut table = builder.build();
        table.with(TableStyle::rounded());
        write!(f, "{table}")
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;

    use super::*;

    #[test]
    fn grid_table_renders_with_headers_and_rows() {
        let table = Table::grid(
            ["id", "kind"],
            vec![
                vec!["builtin_camera".into(), "camera".into()],
                vec!["AA:BB:CC".into(), "ble_scanner".into()],
            ],
        );
        assert_snapshot!(table.to_string(), @r"
    ╭────────────────┬─────────────╮
    │ id             │ kind        │
    ├────────────────┼─────────────┤
    │ builtin_camera │ camera      │
    │ AA:BB:CC       │ ble_scanner │
    ╰────────────────┴─────────────╯
    ");
    }

    #[test]
    fn key_value_table_measures_cyrillic_by_display_width() {
        let painter = Painter::new(false);
        let table = Table::key_value(
            &painter,
            vec![("text", "тест".into()), ("encoding", "hex_escape".into())],
        );
        assert_snapshot!(table.to_string(), @r"
    ╭──────────┬────────────╮
    │ field    │ value      │
    ├──────────┼────────────┤
    │ text     │ тест       │
    │ encoding │ hex_escape │
    ╰──────────┴────────────╯
    ");
    }
}
