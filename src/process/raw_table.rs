use serde::Serialize;

/// Logical name forced onto the first header cell.
pub const POSITION_COLUMN: &str = "Position";

/// The timing table as read off the page, before any validation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RawTable {
    /// Header names for this poll. The first entry is always `Position`;
    /// the rest are the page's own labels, verbatim and in order.
    pub headers: Vec<String>,
    /// One entry per `<tr>` after the header row, one string per `<td>`.
    /// Rows may be shorter or longer than `headers`.
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    /// Build from the page's header labels, replacing the first label.
    pub fn new(mut headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        match headers.first_mut() {
            Some(first) => *first = POSITION_COLUMN.to_string(),
            None => headers.push(POSITION_COLUMN.to_string()),
        }
        Self { headers, rows }
    }

    /// Index of the first header named exactly `name` (case-sensitive).
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }
}
