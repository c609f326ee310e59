use crate::error::{Result, TagCsvError};
use crate::merge::{write_csv_atomically, MergeSummary};
use chrono::NaiveDateTime;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Date and time as the extractor prints them.
const RAW_TIME_FORMAT: &str = "%y/%m/%d %H:%M:%S";
/// Timestamp layout in per-tag and merged CSVs.
pub const CSV_TIME_FORMAT: &str = "%Y/%m/%d %H:%M:%S";
const GOOD_QUALITY: &str = "GOOD";
const TIME_COLUMN: &str = "timestamp";
const MIN_FIELDS: usize = 6;

type Series = BTreeMap<NaiveDateTime, Option<String>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reading {
    pub timestamp: NaiveDateTime,
    pub tag: String,
    /// `None` when the quality flag was not good.
    pub value: Option<String>,
}

/// Parse one whitespace-separated extractor line:
/// `<id> <yy/mm/dd> <HH:MM:SS> <tag> <value> <quality> ...`.
pub fn parse_capture_line(line: &str) -> Option<Reading> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < MIN_FIELDS {
        return None;
    }

    let stamp = format!("{} {}", fields[1], fields[2]);
    let timestamp = NaiveDateTime::parse_from_str(&stamp, RAW_TIME_FORMAT).ok()?;
    let value = (fields[5] == GOOD_QUALITY).then(|| fields[4].to_string());

    Some(Reading {
        timestamp,
        tag: fields[3].to_string(),
        value,
    })
}

/// Merge per-file extractor outputs into one forward-filled wide table.
/// `inputs` must be in submission order; later readings for the same tag
/// and timestamp replace earlier ones.
pub fn merge_capture_outputs(
    inputs: &[PathBuf],
    output_dir: &Path,
    merged_file_name: &str,
) -> Result<MergeSummary> {
    let (series, skipped) = collect_series(inputs)?;

    if series.is_empty() {
        return Err(TagCsvError::merge(
            "no readings could be parsed from any extractor output",
        ));
    }

    let tag_dir = tempfile::Builder::new()
        .prefix(".tagcsv-tags")
        .tempdir_in(output_dir)
        .map_err(|e| TagCsvError::file_access(output_dir, e))?;

    let mut tag_files = Vec::with_capacity(series.len());
    for (idx, (tag, readings)) in series.iter().enumerate() {
        let path = tag_dir
            .path()
            .join(format!("{:04}_{}.csv", idx, sanitize_tag(tag)));
        write_tag_csv(&path, tag, readings)?;
        tag_files.push((tag.clone(), path));
    }
    tracing::debug!("Wrote {} per-tag series", tag_files.len());

    let mut columns = Vec::with_capacity(tag_files.len());
    for (tag, path) in &tag_files {
        columns.push((tag.clone(), read_tag_csv(path)?));
    }

    let table = align_forward_filled(&columns);
    let header = merged_header(columns.iter().map(|(tag, _)| tag.as_str()));
    let tag_count = columns.len();

    let merged_path = write_csv_atomically(output_dir, merged_file_name, |writer| {
        writer.write_record(&header)?;
        for (timestamp, cells) in &table {
            let mut record = Vec::with_capacity(cells.len() + 1);
            record.push(timestamp.format(CSV_TIME_FORMAT).to_string());
            record.extend(cells.iter().map(|c| c.clone().unwrap_or_default()));
            writer.write_record(&record)?;
        }
        Ok(())
    })?;

    tag_dir
        .close()
        .map_err(|e| TagCsvError::file_access(output_dir, e))?;

    tracing::info!(
        "Merged {} tags into {} rows at {}",
        tag_count,
        table.len(),
        merged_path.display()
    );

    Ok(MergeSummary {
        merged_path,
        rows: table.len(),
        columns: header.len(),
        skipped,
        duplicates_removed: 0,
    })
}

fn collect_series(inputs: &[PathBuf]) -> Result<(BTreeMap<String, Series>, usize)> {
    let mut series: BTreeMap<String, Series> = BTreeMap::new();
    let mut skipped = 0;

    for input in inputs {
        let bytes = std::fs::read(input).map_err(|e| TagCsvError::file_access(input, e))?;
        let content = String::from_utf8_lossy(&bytes);

        // First line is the extractor's column banner.
        for (number, line) in content.lines().enumerate().skip(1) {
            if line.trim().is_empty() {
                continue;
            }
            match parse_capture_line(line) {
                Some(reading) => {
                    series
                        .entry(reading.tag)
                        .or_default()
                        .insert(reading.timestamp, reading.value);
                }
                None => {
                    skipped += 1;
                    tracing::warn!(
                        "Skipping malformed line {} in {}: {}",
                        number + 1,
                        input.display(),
                        line.trim()
                    );
                }
            }
        }
    }

    Ok((series, skipped))
}

fn sanitize_tag(tag: &str) -> String {
    static UNSAFE: OnceLock<Option<Regex>> = OnceLock::new();
    match UNSAFE.get_or_init(|| Regex::new(r"[^A-Za-z0-9._-]+").ok()) {
        Some(pattern) => pattern.replace_all(tag, "_").into_owned(),
        None => tag.to_string(),
    }
}

fn write_tag_csv(path: &Path, tag: &str, readings: &Series) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record([TIME_COLUMN, tag])?;
    for (timestamp, value) in readings {
        writer.write_record([
            timestamp.format(CSV_TIME_FORMAT).to_string(),
            value.clone().unwrap_or_default(),
        ])?;
    }
    writer.flush().map_err(|e| TagCsvError::file_access(path, e))?;
    Ok(())
}

/// Time column first, then one column per tag. A tag whose name is already
/// taken gets a numeric suffix so every header is distinct.
fn merged_header<'a>(tags: impl Iterator<Item = &'a str>) -> Vec<String> {
    let tags: Vec<&str> = tags.collect();
    let mut used: HashSet<String> = tags.iter().map(|t| t.to_string()).collect();
    used.insert(TIME_COLUMN.to_string());

    let mut header = vec![TIME_COLUMN.to_string()];
    for tag in tags {
        if tag != TIME_COLUMN {
            header.push(tag.to_string());
            continue;
        }
        let mut suffix = 2;
        let renamed = loop {
            let candidate = format!("{}_{}", tag, suffix);
            if used.insert(candidate.clone()) {
                break candidate;
            }
            suffix += 1;
        };
        tracing::warn!("Tag '{}' clashes with the time column; writing it as '{}'", tag, renamed);
        header.push(renamed);
    }
    header
}

fn read_tag_csv(path: &Path) -> Result<Series> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut series = Series::new();
    for record in reader.records() {
        let record = record?;
        let stamp = record.get(0).unwrap_or_default();
        let timestamp = NaiveDateTime::parse_from_str(stamp, CSV_TIME_FORMAT).map_err(|e| {
            TagCsvError::merge(format!("bad timestamp '{}' in {}: {}", stamp, path.display(), e))
        })?;
        let value = record.get(1).filter(|v| !v.is_empty()).map(str::to_string);
        series.insert(timestamp, value);
    }
    Ok(series)
}

/// Rows over the union of timestamps, each column carrying its last
/// non-null value forward. Rows that are null in every column are dropped.
fn align_forward_filled(
    columns: &[(String, Series)],
) -> Vec<(NaiveDateTime, Vec<Option<String>>)> {
    let timestamps: BTreeSet<NaiveDateTime> = columns
        .iter()
        .flat_map(|(_, series)| series.keys().copied())
        .collect();

    let mut last: Vec<Option<String>> = vec![None; columns.len()];
    let mut rows = Vec::with_capacity(timestamps.len());

    for timestamp in timestamps {
        for (slot, (_, series)) in last.iter_mut().zip(columns) {
            if let Some(Some(value)) = series.get(&timestamp) {
                *slot = Some(value.clone());
            }
        }
        if last.iter().any(Option::is_some) {
            rows.push((timestamp, last.clone()));
        }
    }

    rows
}
