//! Plain-text console tables for previews and query results.

use std::borrow::Cow;
use std::fmt::Write as _;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Align {
    Left,
    Right,
}

fn is_numeric(cell: &str) -> bool {
    !cell.is_empty() && cell.parse::<f64>().is_ok()
}

/// A column is right-aligned when every non-empty cell is numeric.
fn column_alignments(column_count: usize, rows: &[Vec<String>]) -> Vec<Align> {
    (0..column_count)
        .map(|idx| {
            let mut cells = rows
                .iter()
                .filter_map(|row| row.get(idx))
                .filter(|cell| !cell.is_empty())
                .peekable();
            if cells.peek().is_some() && cells.all(|cell| is_numeric(cell)) {
                Align::Right
            } else {
                Align::Left
            }
        })
        .collect()
}

pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let column_count = headers.len();
    let mut widths = headers.iter().map(|h| display_width(h)).collect::<Vec<_>>();
    for row in rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(display_width(cell));
        }
    }
    for width in &mut widths {
        *width = (*width).max(3);
    }
    let alignments = column_alignments(column_count, rows);

    let mut output = String::new();
    let _ = writeln!(output, "{}", format_row(headers, &widths, &alignments));
    let separator = widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>();
    let _ = writeln!(
        output,
        "{}",
        format_row(&separator, &widths, &vec![Align::Left; column_count])
    );
    for row in rows {
        let _ = writeln!(output, "{}", format_row(row, &widths, &alignments));
    }
    if rows.is_empty() {
        let _ = writeln!(output, "(no rows)");
    }
    output
}

pub fn print_table(headers: &[String], rows: &[Vec<String>]) {
    print!("{}", render_table(headers, rows));
}

fn format_row(values: &[String], widths: &[usize], alignments: &[Align]) -> String {
    let cells = values
        .iter()
        .zip(widths)
        .zip(alignments)
        .map(|((value, width), align)| {
            let sanitized = sanitize_cell(value);
            let padding = " ".repeat(width.saturating_sub(display_width(&sanitized)));
            match align {
                Align::Left => format!("{sanitized}{padding}"),
                Align::Right => format!("{padding}{sanitized}"),
            }
        })
        .collect::<Vec<_>>();
    cells.join("  ").trim_end().to_string()
}

fn display_width(value: &str) -> usize {
    value.chars().count()
}

fn sanitize_cell(value: &str) -> Cow<'_, str> {
    if value.contains(['\n', '\r', '\t']) {
        Cow::Owned(value.replace(['\n', '\r', '\t'], " "))
    } else {
        Cow::Borrowed(value)
    }
}
