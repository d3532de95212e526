//! Tabular region detection and rendering
//!
//! Tables are located in the extracted page text: a line that splits into two
//! or more cells (tab separated, otherwise runs of two-plus spaces) is a table
//! row, and two or more consecutive rows form a table. Each table renders as a
//! pipe-delimited table with a header separator when the first row looks like
//! a header, or as tab-delimited rows otherwise.

use regex::Regex;
use std::sync::OnceLock;

fn numeric_cell_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[\d.,\-/%]+$").expect("valid regex"))
}

fn multi_space_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r" {2,}").expect("valid regex"))
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("valid regex"))
}

/// Collapse internal whitespace and newlines of one cell to single spaces
pub(crate) fn clean_cell(value: &str) -> String {
    let normalized = value.replace('\r', "\n");
    whitespace_re().replace_all(&normalized, " ").trim().to_string()
}

/// Judge whether the first row of a table is a header row
///
/// A header needs at least one non-empty cell, must not be all
/// numeric-looking, and either every non-empty cell contains a letter or,
/// when the second row is non-empty, at least half of them do.
pub(crate) fn looks_like_header(first_row: &[String], second_row: Option<&[String]>) -> bool {
    let non_empty: Vec<&String> = first_row.iter().filter(|c| !c.is_empty()).collect();
    if non_empty.is_empty() {
        return false;
    }
    let alpha_cells = non_empty
        .iter()
        .filter(|c| c.chars().any(|ch| ch.is_alphabetic()))
        .count();
    let mostly_numeric = non_empty.iter().all(|c| numeric_cell_re().is_match(c));
    if mostly_numeric {
        return false;
    }
    if let Some(second) = second_row {
        let second_has_content = second.iter().any(|c| !c.is_empty());
        if second_has_content && alpha_cells >= (non_empty.len() / 2).max(1) {
            return true;
        }
    }
    alpha_cells == non_empty.len()
}

/// Render one table as pipe-delimited Markdown or tab-delimited rows
pub(crate) fn render_table(rows: &[Vec<String>]) -> String {
    let max_cols = rows.iter().map(Vec::len).max().unwrap_or(0);
    if max_cols == 0 {
        return String::new();
    }

    let cleaned: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            let mut cells: Vec<String> = row.iter().map(|c| clean_cell(c)).collect();
            cells.resize(max_cols, String::new());
            cells
        })
        .collect();

    let header = &cleaned[0];
    let body = &cleaned[1..];
    if looks_like_header(header, body.first().map(Vec::as_slice)) {
        let head_line = format!("| {} |", header.join(" | "));
        let sep_line = format!("| {} |", vec!["---"; header.len()].join(" | "));
        let mut lines = vec![head_line, sep_line];
        lines.extend(body.iter().map(|row| format!("| {} |", row.join(" | "))));
        return lines.join("\n").trim().to_string();
    }

    cleaned
        .iter()
        .map(|row| row.join("\t"))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Split one text line into table cells
///
/// Tab-separated lines split on tabs; otherwise runs of two or more spaces
/// are treated as column gaps.
fn split_cells(line: &str) -> Vec<String> {
    if line.contains('\t') {
        return line.split('\t').map(|c| c.trim().to_string()).collect();
    }
    multi_space_re()
        .split(line.trim())
        .map(|c| c.to_string())
        .collect()
}

/// Locate tabular regions in one page's text
///
/// Returns each table as rows of raw cells. Two or more consecutive lines
/// with at least two cells each form a table.
pub(crate) fn detect_tables(page_text: &str) -> Vec<Vec<Vec<String>>> {
    let mut tables = Vec::new();
    let mut current: Vec<Vec<String>> = Vec::new();

    for line in page_text.lines() {
        let cells = split_cells(line);
        let is_row = cells.len() >= 2 && cells.iter().any(|c| !c.is_empty());
        if is_row {
            current.push(cells);
        } else {
            if current.len() >= 2 {
                tables.push(std::mem::take(&mut current));
            }
            current.clear();
        }
    }
    if current.len() >= 2 {
        tables.push(current);
    }
    tables
}

/// Build the page-tagged `TABLES:` section from per-page text
pub(crate) fn tables_section(pages: &[String]) -> String {
    let mut rendered_pages = Vec::new();

    for (i, page_text) in pages.iter().enumerate() {
        let mut page_tables = Vec::new();
        for (table_index, rows) in detect_tables(page_text).iter().enumerate() {
            let rendered = render_table(rows);
            if rendered.is_empty() {
                continue;
            }
            page_tables.push(format!("[TABLE {}]\n{}", table_index + 1, rendered));
        }
        if !page_tables.is_empty() {
            rendered_pages.push(format!("--- PAGE {} ---\n{}", i + 1, page_tables.join("\n\n")));
        }
    }

    if rendered_pages.is_empty() {
        return "TABLES:\n(no tables detected)".to_string();
    }
    format!("TABLES:\n\n{}", rendered_pages.join("\n\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn clean_cell_collapses_whitespace() {
        assert_eq!(clean_cell("  Hausgeld\r\n2024  "), "Hausgeld 2024");
        assert_eq!(clean_cell("a\n\nb\tc"), "a b c");
        assert_eq!(clean_cell(""), "");
    }

    #[test]
    fn header_requires_letters_in_every_cell_without_second_row() {
        assert!(looks_like_header(&row(&["Position", "Betrag"]), None));
        assert!(!looks_like_header(&row(&["Position", "219,29"]), None));
    }

    #[test]
    fn numeric_first_row_is_never_a_header() {
        assert!(!looks_like_header(
            &row(&["2024", "219,29", "-5%"]),
            Some(&row(&["a", "b", "c"]))
        ));
    }

    #[test]
    fn half_letter_cells_suffice_with_populated_second_row() {
        // 1 of 2 non-empty cells has letters; second row has content
        assert!(looks_like_header(
            &row(&["Betrag", "2024"]),
            Some(&row(&["219,29", "100"]))
        ));
        // Without a second row the same first row is not a header
        assert!(!looks_like_header(&row(&["Betrag", "2024"]), None));
    }

    #[test]
    fn empty_first_row_is_not_a_header() {
        assert!(!looks_like_header(&row(&["", ""]), None));
        assert!(!looks_like_header(&[], None));
    }

    #[test]
    fn render_table_with_header_uses_pipes() {
        let rows = vec![row(&["Position", "Betrag"]), row(&["Hausgeld", "219,29"])];
        let rendered = render_table(&rows);
        assert_eq!(
            rendered,
            "| Position | Betrag |\n| --- | --- |\n| Hausgeld | 219,29 |"
        );
    }

    #[test]
    fn render_table_without_header_uses_tabs() {
        let rows = vec![row(&["100", "200"]), row(&["300", "400"])];
        assert_eq!(render_table(&rows), "100\t200\n300\t400");
    }

    #[test]
    fn render_table_pads_short_rows() {
        let rows = vec![row(&["Position", "Betrag", "Jahr"]), row(&["Hausgeld"])];
        let rendered = render_table(&rows);
        assert!(rendered.contains("| Hausgeld |  |  |"));
    }

    #[test]
    fn detect_tables_groups_consecutive_rows() {
        let page = "Einleitung zur Abrechnung\n\
                    Position  Betrag\n\
                    Hausgeld  219,29\n\
                    Ruecklage  50,00\n\
                    \n\
                    Schlussbemerkung";
        let tables = detect_tables(page);
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].len(), 3);
        assert_eq!(tables[0][1], row(&["Hausgeld", "219,29"]));
    }

    #[test]
    fn single_row_is_not_a_table() {
        let tables = detect_tables("Position  Betrag\nnur Fliesstext hier");
        assert!(tables.is_empty());
    }

    #[test]
    fn tables_section_tags_pages_and_tables() {
        let pages = vec![
            "nur Prosa".to_string(),
            "Position  Betrag\nHausgeld  219,29".to_string(),
        ];
        let section = tables_section(&pages);
        assert!(section.starts_with("TABLES:\n\n"));
        assert!(section.contains("--- PAGE 2 ---"));
        assert!(section.contains("[TABLE 1]"));
        assert!(!section.contains("--- PAGE 1 ---"));
    }

    #[test]
    fn tables_section_reports_absence() {
        let pages = vec!["nur Prosa ohne Spalten".to_string()];
        assert_eq!(tables_section(&pages), "TABLES:\n(no tables detected)");
    }
}
