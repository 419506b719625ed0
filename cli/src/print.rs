use colored::Colorize;
use std::borrow::Cow;
use std::fmt::Write as _;
use unicode_width::UnicodeWidthStr;

/// Column-aligned table that pads by visible width, so colored cells line up.
pub struct TablePrint {
    headers: Vec<Cow<'static, str>>,
    rows: Vec<Vec<String>>,
}

impl TablePrint {
    pub fn new_with_headers<S: Into<Cow<'static, str>>>(headers: Vec<S>) -> Self {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn add_row(&mut self, row: Vec<String>) -> &mut Self {
        self.rows.push(row);
        self
    }

    pub fn print(&self) {
        if self.rows.is_empty() {
            println!("{}", "Nothing to show".dimmed());
            return;
        }
        print!("{}", self.render());
    }

    fn widths(&self) -> Vec<usize> {
        let mut widths: Vec<usize> = self.headers.iter().map(|h| h.width()).collect();
        for row in &self.rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(visible_width(cell));
            }
        }
        widths
    }

    fn render(&self) -> String {
        let widths = self.widths();
        let mut out = String::new();
        let header_cells = self.headers.iter().map(|h| h.to_string());
        write_line(&mut out, &widths, header_cells);
        for row in &self.rows {
            write_line(&mut out, &widths, row.iter().cloned());
        }
        out
    }
}

fn write_line(out: &mut String, widths: &[usize], cells: impl Iterator<Item = String>) {
    let mut line = String::new();
    for (cell, width) in cells.zip(widths) {
        let padding = width.saturating_sub(visible_width(&cell));
        _ = write!(line, "{cell}{:padding$}   ", "");
    }
    out.push_str(line.trim_end());
    out.push('\n');
}

fn visible_width(cell: &str) -> usize {
    strip_ansi_escapes::strip_str(cell).width()
}
