use crate::models::{Listing, COLUMNS};
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

pub const DEFAULT_PREFIX: &str = "airbnb_listings";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Delimited text with a header row
    #[default]
    Csv,
    /// Pretty printed JSON array
    Json,
}

#[derive(Debug, Clone)]
pub struct OutputOptions {
    pub dir: PathBuf,
    pub prefix: String,
    pub format: OutputFormat,
    /// Field delimiter for delimited output
    pub delimiter: u8,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            prefix: DEFAULT_PREFIX.to_string(),
            format: OutputFormat::Csv,
            delimiter: b',',
        }
    }
}

impl OutputOptions {
    fn extension(&self) -> &'static str {
        match (self.format, self.delimiter) {
            (OutputFormat::Json, _) => "json",
            (OutputFormat::Csv, b'\t') => "tsv",
            (OutputFormat::Csv, _) => "csv",
        }
    }
}

/// Timestamped output path, e.g. `./airbnb_listings_20260114_093000.csv`
pub fn output_path(options: &OutputOptions, timestamp: DateTime<Local>) -> PathBuf {
    options.dir.join(format!(
        "{}_{}.{}",
        options.prefix,
        timestamp.format("%Y%m%d_%H%M%S"),
        options.extension()
    ))
}

/// Append `_2`, `_3`, ... to the file stem until the path is free
fn first_free_path(path: PathBuf) -> PathBuf {
    if !path.exists() {
        return path;
    }

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();

    (2..)
        .map(|n| dir.join(format!("{}_{}.{}", stem, n, ext)))
        .find(|candidate| !candidate.exists())
        .unwrap_or(path)
}

/// Serialize listings to `writer`, returning the number of records written
pub fn write_listings<W: Write>(
    writer: W,
    listings: &[Listing],
    options: &OutputOptions,
) -> Result<usize> {
    match options.format {
        OutputFormat::Csv => {
            let mut wtr = csv::WriterBuilder::new()
                .delimiter(options.delimiter)
                .from_writer(writer);

            wtr.write_record(COLUMNS)?;
            for listing in listings {
                wtr.write_record(&listing.to_row())?;
            }
            wtr.flush()?;
        }
        OutputFormat::Json => {
            let mut writer = writer;
            serde_json::to_writer_pretty(&mut writer, listings)?;
            writeln!(writer)?;
            writer.flush()?;
        }
    }

    Ok(listings.len())
}

/// Write listings to a new timestamped file and return its path
pub fn save(
    listings: &[Listing],
    options: &OutputOptions,
    timestamp: DateTime<Local>,
) -> Result<PathBuf> {
    fs::create_dir_all(&options.dir).with_context(|| {
        format!("Failed to create output directory: {}", options.dir.display())
    })?;

    let path = first_free_path(output_path(options, timestamp));
    let file = File::options()
        .write(true)
        .create_new(true)
        .open(&path)
        .with_context(|| format!("Failed to create output file: {}", path.display()))?;

    let written = write_listings(BufWriter::new(file), listings, options)?;
    info!("💾 Saved {} listings to {}", written, path.display());

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn tricky_listing() -> Listing {
        Listing {
            title: Some("Cosy flat, \"quiet\" street".to_string()),
            url: Some("https://www.airbnb.com/rooms/7".to_string()),
            price: Some("$1,250".to_string()),
            rating: Some(4.5),
            reviews: None,
            property_type: Some("Entire home\nwith garden".to_string()),
            amenities: Some(vec!["Wifi, fast".to_string(), "Pool\tside".to_string()]),
            details: None,
        }
    }

    fn read_back(bytes: &[u8], delimiter: u8) -> Vec<Vec<String>> {
        csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .from_reader(bytes)
            .records()
            .map(|r| r.unwrap().iter().map(str::to_string).collect())
            .collect()
    }

    #[test]
    fn test_empty_run_writes_header_only() {
        let mut buf = Vec::new();
        let written = write_listings(&mut buf, &[], &OutputOptions::default()).unwrap();

        assert_eq!(written, 0);
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "title,url,price,rating,reviews,property_type,amenities\n"
        );
    }

    #[test]
    fn test_delimiter_bearing_values_round_trip() {
        let listing = tricky_listing();
        for delimiter in [b',', b'\t', b';'] {
            let options = OutputOptions {
                delimiter,
                ..Default::default()
            };
            let mut buf = Vec::new();
            write_listings(&mut buf, std::slice::from_ref(&listing), &options).unwrap();

            let rows = read_back(&buf, delimiter);
            assert_eq!(rows.len(), 2);
            assert_eq!(rows[0], COLUMNS.to_vec());
            assert_eq!(rows[1], listing.to_row().to_vec());
        }
    }

    #[test]
    fn test_missing_fields_use_placeholder() {
        let listing = Listing {
            title: Some("No price here".to_string()),
            ..Default::default()
        };
        let mut buf = Vec::new();
        write_listings(&mut buf, &[listing], &OutputOptions::default()).unwrap();

        let rows = read_back(&buf, b',');
        assert_eq!(rows[1][0], "No price here");
        assert!(rows[1][1..].iter().all(|cell| cell == "N/A"));
    }

    #[test]
    fn test_json_output_uses_null_for_missing() {
        let options = OutputOptions {
            format: OutputFormat::Json,
            ..Default::default()
        };
        let mut buf = Vec::new();
        write_listings(&mut buf, &[Listing::default()], &options).unwrap();

        let value: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert!(value[0]["price"].is_null());
        assert!(value[0]["amenities"].is_null());
    }

    #[test]
    fn test_output_path_embeds_timestamp() {
        let timestamp = Local.with_ymd_and_hms(2026, 1, 14, 9, 30, 5).unwrap();
        let path = output_path(&OutputOptions::default(), timestamp);
        assert_eq!(path, PathBuf::from("./airbnb_listings_20260114_093005.csv"));

        let tsv = OutputOptions {
            delimiter: b'\t',
            ..Default::default()
        };
        assert!(output_path(&tsv, timestamp)
            .to_string_lossy()
            .ends_with(".tsv"));
    }

    #[test]
    fn test_save_never_overwrites() {
        let dir = std::env::temp_dir().join(format!("stay-scout-output-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        let options = OutputOptions {
            dir: dir.clone(),
            ..Default::default()
        };
        let timestamp = Local.with_ymd_and_hms(2026, 1, 14, 9, 30, 5).unwrap();

        let first = save(&[tricky_listing()], &options, timestamp).unwrap();
        let second = save(&[tricky_listing()], &options, timestamp).unwrap();

        assert_ne!(first, second);
        assert!(second.to_string_lossy().ends_with("_093005_2.csv"));
        assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());

        fs::remove_dir_all(&dir).unwrap();
    }
}
