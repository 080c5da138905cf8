//! Tokenizer for the spreadsheet CSV exports.
//!
//! The exports are simple enough that a full RFC 4180 reader is not needed: a double
//! quote toggles quoted mode and is dropped, commas inside quoted mode are kept, and
//! every cell is trimmed. Doubled quotes (`""`) are not unescaped and quoted fields never
//! span lines.

/// One tokenized row of cells.
pub type Row = Vec<String>;

/// Splits raw CSV text into rows of trimmed cells.
///
/// Leading and trailing whitespace of the whole text is ignored, so an empty export
/// yields no rows at all.
pub fn tokenize(text: &str) -> Vec<Row> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    text.split('\n').map(tokenize_line).collect()
}

/// Splits a single line into trimmed cells.
pub fn tokenize_line(line: &str) -> Row {
    let mut cells = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for ch in line.chars() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                cells.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    cells.push(current.trim().to_string());

    cells
}
