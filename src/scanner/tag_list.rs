use crate::error::{Result, TagCsvError};
use std::path::Path;

/// Read a peek file: one tag per line, `#` starts a comment line.
pub fn read_tag_list<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let path = path.as_ref();
    let content =
        std::fs::read_to_string(path).map_err(|e| TagCsvError::file_access(path, e))?;
    Ok(parse_tag_list(&content))
}

pub fn parse_tag_list(content: &str) -> Vec<String> {
    content
        .lines()
        .filter(|line| !line.starts_with('#'))
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Split an inline `a,b,c` tag list.
pub fn split_tags(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}
