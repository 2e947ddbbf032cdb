use super::citation;

/// Column separator for pipe tables.
pub const COLUMN_SEPARATOR: char = '|';

/// Whether a line belongs to a table block.
pub fn is_table_line(line: &str) -> bool {
    line.contains(COLUMN_SEPARATOR)
}

/// A row like `---|:---:` that only marks the header boundary.
fn is_separator_row(row: &str) -> bool {
    row.chars()
        .all(|c| c == COLUMN_SEPARATOR || c == '-' || c == ':' || c.is_whitespace())
}

fn split_cells(row: &str) -> Vec<String> {
    let row = row.trim();
    let row = row.strip_prefix(COLUMN_SEPARATOR).unwrap_or(row);
    let row = row.strip_suffix(COLUMN_SEPARATOR).unwrap_or(row);
    row.split(COLUMN_SEPARATOR)
        .map(|cell| cell.trim().to_string())
        .collect()
}

/// Renders a contiguous block of pipe-delimited lines as a table.
///
/// Separator rows are dropped; the first remaining row is the header and the
/// rest form the body. Returns `None` when no content row is left. The markup
/// is a single line so later line-break handling cannot split rows apart.
pub fn build<S: AsRef<str>>(rows: &[S]) -> Option<String> {
    let mut content = rows
        .iter()
        .map(|row| row.as_ref())
        .filter(|row| !is_separator_row(row));
    let header: &str = content.next()?;

    let mut out = String::from(r#"<table class="report-table"><thead><tr>"#);
    for cell in split_cells(header) {
        out.push_str("<th>");
        out.push_str(&cell);
        out.push_str("</th>");
    }
    out.push_str("</tr></thead>");

    let body: Vec<&str> = content.collect();
    if !body.is_empty() {
        out.push_str("<tbody>");
        for row in body {
            out.push_str("<tr>");
            for cell in split_cells(row) {
                out.push_str("<td>");
                out.push_str(&citation::substitute(&cell));
                out.push_str("</td>");
            }
            out.push_str("</tr>");
        }
        out.push_str("</tbody>");
    }
    out.push_str("</table>");
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_separator_and_body() {
        let html = build(&["A | B", "---|---", "1 | 2"]).expect("table");
        assert_eq!(
            html,
            r#"<table class="report-table"><thead><tr><th>A</th><th>B</th></tr></thead><tbody><tr><td>1</td><td>2</td></tr></tbody></table>"#
        );
    }

    #[test]
    fn outer_pipes_do_not_create_empty_cells() {
        let html = build(&["| Name | Score |", "| :--- | ---: |", "| x | 9 |"]).expect("table");
        assert!(html.contains("<th>Name</th><th>Score</th></tr>"));
        assert!(html.contains("<td>x</td><td>9</td>"));
        assert!(!html.contains("<th></th>"));
    }

    #[test]
    fn separator_rows_never_become_body_rows() {
        let html = build(&["A|B", "---|---", "1|2", "--|--"]).expect("table");
        assert_eq!(html.matches("<tr>").count(), 2);
        assert!(!html.contains("---"));
    }

    #[test]
    fn only_separators_builds_nothing() {
        assert_eq!(build(&["---|---", " | "]), None);
        assert_eq!(build::<&str>(&[]), None);
    }

    #[test]
    fn header_only_table_has_no_body() {
        let html = build(&["A | B"]).expect("table");
        assert!(!html.contains("<tbody>"));
    }

    #[test]
    fn body_cells_get_citation_markers() {
        let html = build(&["Claim | Ref", "Claim [1] | [2]"]).expect("table");
        assert!(html.contains(r#"<td>Claim <sup class="citation" data-citation-id="1">1</sup></td>"#));
        assert!(html.contains(r#"data-citation-id="2""#));
    }
}
