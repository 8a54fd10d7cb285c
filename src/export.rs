use crate::ranking::LeaderboardRow;
use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use thiserror::Error;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub const LEADERBOARD_HEADER: &str = "rank,student_id,total";
const UTF8_BOM: char = '\u{feff}';

const MANIFEST_ENTRY: &str = "manifest.json";
pub const BUNDLE_FORMAT_V1: &str = "scoreboard-leaderboards-v1";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CsvError {
    #[error("missing header row")]
    MissingHeader,
    #[error("unexpected header {found:?} (expected \"rank,student_id,total\")")]
    BadHeader { found: String },
    #[error("line {line}: expected 3 columns, found {found}")]
    BadColumns { line: usize, found: usize },
    #[error("line {line}: rank {value:?} is not a positive integer")]
    BadRank { line: usize, value: String },
    #[error("line {line}: total {value:?} is not a number")]
    BadTotal { line: usize, value: String },
}

fn csv_quote(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

fn parse_csv_record(line: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut buf = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '"' {
            if in_quotes && chars.peek() == Some(&'"') {
                buf.push('"');
                chars.next();
                continue;
            }
            in_quotes = !in_quotes;
            continue;
        }
        if ch == ',' && !in_quotes {
            out.push(std::mem::take(&mut buf));
            continue;
        }
        buf.push(ch);
    }
    out.push(buf);
    out
}

/// Splits CSV text into records, keeping line breaks that sit inside quotes.
/// Each record carries the 1-based line it starts on.
fn split_csv_records(text: &str) -> Vec<(usize, String)> {
    let mut out = Vec::new();
    let mut buf = String::new();
    let mut in_quotes = false;
    let mut line_no = 1;
    let mut start = 1;
    for ch in text.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                buf.push(ch);
            }
            '\n' if !in_quotes => {
                let record = std::mem::take(&mut buf);
                out.push((start, record.trim_end_matches('\r').to_string()));
                line_no += 1;
                start = line_no;
            }
            '\n' => {
                buf.push(ch);
                line_no += 1;
            }
            _ => buf.push(ch),
        }
    }
    if !buf.is_empty() {
        out.push((start, buf.trim_end_matches('\r').to_string()));
    }
    out
}

/// `rank,student_id,total` table with totals at two decimals.
pub fn leaderboard_to_csv(rows: &[LeaderboardRow], bom: bool) -> String {
    let mut csv = String::new();
    if bom {
        csv.push(UTF8_BOM);
    }
    csv.push_str(LEADERBOARD_HEADER);
    csv.push('\n');
    for r in rows {
        csv.push_str(&format!(
            "{},{},{:.2}\n",
            r.rank,
            csv_quote(&r.student_id),
            r.total
        ));
    }
    csv
}

pub fn parse_leaderboard_csv(text: &str) -> Result<Vec<LeaderboardRow>, CsvError> {
    let text = text.strip_prefix(UTF8_BOM).unwrap_or(text);
    let records = split_csv_records(text);
    let mut records = records.iter();

    let header = loop {
        match records.next() {
            Some((_, l)) if l.trim().is_empty() => continue,
            Some((_, l)) => break l.as_str(),
            None => return Err(CsvError::MissingHeader),
        }
    };
    if header.trim() != LEADERBOARD_HEADER {
        return Err(CsvError::BadHeader {
            found: header.to_string(),
        });
    }

    let mut rows = Vec::new();
    for (line_no, line) in records {
        if line.trim().is_empty() {
            continue;
        }
        let line_no = *line_no;
        let fields = parse_csv_record(line);
        if fields.len() != 3 {
            return Err(CsvError::BadColumns {
                line: line_no,
                found: fields.len(),
            });
        }
        let rank = match fields[0].trim().parse::<u32>() {
            Ok(v) if v > 0 => v,
            _ => {
                return Err(CsvError::BadRank {
                    line: line_no,
                    value: fields[0].clone(),
                })
            }
        };
        let total = match fields[2].trim().parse::<f64>() {
            Ok(v) if v.is_finite() => v,
            _ => {
                return Err(CsvError::BadTotal {
                    line: line_no,
                    value: fields[2].clone(),
                })
            }
        };
        rows.push(LeaderboardRow {
            rank,
            student_id: fields[1].clone(),
            total,
        });
    }
    Ok(rows)
}

pub fn write_text_file(out_path: &Path, text: &str) -> anyhow::Result<()> {
    if let Some(parent) = out_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create directory {}", parent.to_string_lossy())
            })?;
        }
    }
    std::fs::write(out_path, text)
        .with_context(|| format!("failed to write {}", out_path.to_string_lossy()))
}

#[derive(Debug, Clone)]
pub struct BundleSection {
    pub name: String,
    pub rows: Vec<LeaderboardRow>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManifestSection {
    name: String,
    entry: String,
    row_count: usize,
    sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Manifest {
    format: String,
    app_version: String,
    exported_at: String,
    dataset_digest: String,
    sections: Vec<ManifestSection>,
}

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub section_count: usize,
    pub entry_count: usize,
}

#[derive(Debug, Clone)]
pub struct ImportedBundle {
    pub dataset_digest: String,
    pub exported_at: String,
    pub sections: Vec<BundleSection>,
}

fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

fn section_entry_name(index: usize) -> String {
    format!("leaderboards/{:02}.csv", index + 1)
}

/// Zip of every section's leaderboard CSV plus a manifest with digests.
pub fn export_leaderboard_bundle(
    out_path: &Path,
    dataset_digest: &str,
    sections: &[BundleSection],
) -> anyhow::Result<ExportSummary> {
    if let Some(parent) = out_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create directory {}", parent.to_string_lossy())
            })?;
        }
    }

    let out_file = File::create(out_path).with_context(|| {
        format!(
            "failed to create output file {}",
            out_path.to_string_lossy()
        )
    })?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut manifest_sections = Vec::with_capacity(sections.len());
    for (i, s) in sections.iter().enumerate() {
        let entry = section_entry_name(i);
        let csv = leaderboard_to_csv(&s.rows, false);
        zip.start_file(entry.as_str(), opts)
            .with_context(|| format!("failed to start entry {}", entry))?;
        zip.write_all(csv.as_bytes())
            .with_context(|| format!("failed to write entry {}", entry))?;
        manifest_sections.push(ManifestSection {
            name: s.name.clone(),
            entry,
            row_count: s.rows.len(),
            sha256: sha256_hex(csv.as_bytes()),
        });
    }

    let manifest = Manifest {
        format: BUNDLE_FORMAT_V1.to_string(),
        app_version: env!("CARGO_PKG_VERSION").to_string(),
        exported_at: chrono::Utc::now().to_rfc3339(),
        dataset_digest: dataset_digest.to_string(),
        sections: manifest_sections,
    };
    zip.start_file(MANIFEST_ENTRY, opts)
        .context("failed to start manifest entry")?;
    zip.write_all(
        serde_json::to_string_pretty(&manifest)
            .context("failed to serialize manifest")?
            .as_bytes(),
    )
    .context("failed to write manifest entry")?;

    zip.finish().context("failed to finalize zip bundle")?;

    Ok(ExportSummary {
        bundle_format: BUNDLE_FORMAT_V1.to_string(),
        section_count: sections.len(),
        entry_count: sections.len() + 1,
    })
}

pub fn read_leaderboard_bundle(in_path: &Path) -> anyhow::Result<ImportedBundle> {
    let in_file = File::open(in_path)
        .with_context(|| format!("failed to open bundle {}", in_path.to_string_lossy()))?;
    let mut archive = ZipArchive::new(in_file).context("invalid zip archive")?;

    let mut manifest_text = String::new();
    archive
        .by_name(MANIFEST_ENTRY)
        .context("bundle missing manifest.json")?
        .read_to_string(&mut manifest_text)
        .context("failed to read manifest.json")?;
    let manifest: Manifest =
        serde_json::from_str(&manifest_text).context("manifest.json is invalid")?;
    if manifest.format != BUNDLE_FORMAT_V1 {
        return Err(anyhow!("unsupported bundle format: {}", manifest.format));
    }

    let mut sections = Vec::with_capacity(manifest.sections.len());
    for ms in &manifest.sections {
        let mut bytes = Vec::new();
        archive
            .by_name(&ms.entry)
            .with_context(|| format!("bundle missing {}", ms.entry))?
            .read_to_end(&mut bytes)
            .with_context(|| format!("failed to read {}", ms.entry))?;
        let actual = sha256_hex(&bytes);
        if actual != ms.sha256 {
            return Err(anyhow!(
                "digest mismatch for {}: manifest {}, content {}",
                ms.entry,
                ms.sha256,
                actual
            ));
        }
        let text = String::from_utf8(bytes).with_context(|| format!("{} is not UTF-8", ms.entry))?;
        let rows = parse_leaderboard_csv(&text).with_context(|| format!("invalid {}", ms.entry))?;
        if rows.len() != ms.row_count {
            return Err(anyhow!(
                "{} has {} rows, manifest says {}",
                ms.entry,
                rows.len(),
                ms.row_count
            ));
        }
        sections.push(BundleSection {
            name: ms.name.clone(),
            rows,
        });
    }

    Ok(ImportedBundle {
        dataset_digest: manifest.dataset_digest,
        exported_at: manifest.exported_at,
        sections,
    })
}
