use crate::error::{Result, TagCsvError};
use crate::merge::{write_csv_atomically, MergeSummary};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

struct ArchiveTable {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

/// Rows of one per-file CSV, mapped onto the column positions of the
/// combined layout. The first data row (units) is dropped.
fn load_archive_csv(path: &Path, columns: &mut Vec<String>) -> Result<Vec<Vec<String>>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .has_headers(true)
        .from_path(path)?;

    let headers = reader.headers()?.clone();
    if headers.is_empty() {
        return Err(TagCsvError::merge(format!("{} has no header", path.display())));
    }

    let mut known: HashMap<String, usize> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| (c.clone(), i))
        .collect();

    let mut positions = Vec::with_capacity(headers.len());
    for name in headers.iter() {
        let position = match known.get(name) {
            Some(&i) if !positions.contains(&i) => i,
            _ => {
                columns.push(name.to_string());
                known.insert(name.to_string(), columns.len() - 1);
                columns.len() - 1
            }
        };
        positions.push(position);
    }

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record?;
        if index == 0 {
            continue;
        }
        if record.len() > positions.len() {
            tracing::warn!(
                "Skipping record {} in {}: {} fields for {} columns",
                index + 2,
                path.display(),
                record.len(),
                positions.len()
            );
            continue;
        }
        let mut row = vec![String::new(); columns.len()];
        for (value, &position) in record.iter().zip(&positions) {
            row[position] = value.to_string();
        }
        rows.push(row);
    }

    Ok(rows)
}

/// Concatenate per-file archive CSVs, dropping units rows and exact
/// duplicate rows. Files that cannot be parsed or hold no data are skipped.
pub fn merge_archive_outputs(
    inputs: &[PathBuf],
    output_dir: &Path,
    merged_file_name: &str,
) -> Result<MergeSummary> {
    let mut table = ArchiveTable {
        columns: Vec::new(),
        rows: Vec::new(),
    };
    let mut skipped = 0;

    for input in inputs {
        let mut columns = table.columns.clone();
        match load_archive_csv(input, &mut columns) {
            Ok(rows) if rows.is_empty() => {
                skipped += 1;
                tracing::warn!("Skipping {}: no data rows after units row", input.display());
            }
            Ok(rows) => {
                tracing::debug!("Loaded {} rows from {}", rows.len(), input.display());
                table.columns = columns;
                table.rows.extend(rows);
            }
            Err(e) => {
                skipped += 1;
                tracing::warn!("Skipping unreadable output {}: {}", input.display(), e);
            }
        }
    }

    if table.rows.is_empty() {
        return Err(TagCsvError::merge(format!(
            "none of the {} extractor outputs contained usable rows",
            inputs.len()
        )));
    }

    let width = table.columns.len();
    let total = table.rows.len();
    let mut seen = HashSet::with_capacity(total);
    let mut unique = Vec::with_capacity(total);
    for mut row in table.rows {
        row.resize(width, String::new());
        if seen.insert(row.clone()) {
            unique.push(row);
        }
    }
    let duplicates_removed = total - unique.len();

    let merged_path = write_csv_atomically(output_dir, merged_file_name, |writer| {
        writer.write_record(&table.columns)?;
        for row in &unique {
            writer.write_record(row)?;
        }
        Ok(())
    })?;

    tracing::info!(
        "Merged {} rows ({} duplicates removed) into {}",
        unique.len(),
        duplicates_removed,
        merged_path.display()
    );

    Ok(MergeSummary {
        merged_path,
        rows: unique.len(),
        columns: width,
        skipped,
        duplicates_removed,
    })
}
