use crate::calc::RawScoreRecord;
use crate::store::{GradeStore, Section};
use anyhow::{bail, Context};
use serde::Deserialize;
use std::path::Path;
use tracing::warn;

/// Dataset shipped with the binary, served when no dataset file is configured.
pub const SAMPLE_DATASET: &str = include_str!("../fixtures/sample_dataset.json");

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DatasetFile {
    sections: Vec<SectionFile>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SectionFile {
    name: String,
    #[serde(default)]
    students: Vec<StudentFile>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct StudentFile {
    id: String,
    // Any length is accepted here; record shape is checked when scoring.
    scores: Vec<f64>,
}

pub fn parse_dataset(text: &str) -> anyhow::Result<GradeStore> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let file: DatasetFile = serde_json::from_str(text).context("dataset is not valid JSON")?;

    let mut sections = Vec::with_capacity(file.sections.len());
    for (section_no, sf) in file.sections.into_iter().enumerate() {
        if sf.name.trim().is_empty() {
            bail!("section #{} has a blank name", section_no + 1);
        }
        let mut students = Vec::with_capacity(sf.students.len());
        for (student_no, st) in sf.students.into_iter().enumerate() {
            if st.id.trim().is_empty() {
                bail!(
                    "student #{} in section {:?} has a blank id",
                    student_no + 1,
                    sf.name
                );
            }
            if st.id.contains(['\r', '\n']) {
                bail!(
                    "student id {:?} in section {:?} spans multiple lines",
                    st.id,
                    sf.name
                );
            }
            students.push((st.id, RawScoreRecord::new(st.scores)));
        }
        let section = Section::new(sf.name, students)?;
        if section.is_empty() {
            warn!(section = section.name(), "section has no students");
        }
        sections.push(section);
    }
    GradeStore::new(sections)
}

pub fn load_dataset(path: &Path) -> anyhow::Result<GradeStore> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read dataset {}", path.to_string_lossy()))?;
    let text = String::from_utf8(bytes)
        .with_context(|| format!("dataset {} is not UTF-8", path.to_string_lossy()))?;
    parse_dataset(&text).with_context(|| format!("invalid dataset {}", path.to_string_lossy()))
}

pub fn sample_dataset() -> anyhow::Result<GradeStore> {
    parse_dataset(SAMPLE_DATASET).context("bundled sample dataset is invalid")
}
