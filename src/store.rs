use crate::calc::{self, CalcError, RawScoreRecord, RecordDefect};
use anyhow::bail;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// A named class group. Student ids are unique within a section only.
#[derive(Debug, Clone)]
pub struct Section {
    name: String,
    students: Vec<(String, RawScoreRecord)>,
    index: HashMap<String, usize>,
}

impl Section {
    pub fn new(name: impl Into<String>, students: Vec<(String, RawScoreRecord)>) -> anyhow::Result<Self> {
        let name = name.into();
        let mut index = HashMap::with_capacity(students.len());
        for (i, (student_id, _)) in students.iter().enumerate() {
            if index.insert(student_id.clone(), i).is_some() {
                bail!("duplicate student id {:?} in section {:?}", student_id, name);
            }
        }
        Ok(Self {
            name,
            students,
            index,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.students.len()
    }

    pub fn is_empty(&self) -> bool {
        self.students.is_empty()
    }

    pub fn get(&self, student_id: &str) -> Option<&RawScoreRecord> {
        self.index.get(student_id).map(|&i| &self.students[i].1)
    }

    pub fn contains(&self, student_id: &str) -> bool {
        self.index.contains_key(student_id)
    }

    /// Records in declaration order.
    pub fn records(&self) -> impl Iterator<Item = (&str, &RawScoreRecord)> {
        self.students.iter().map(|(id, r)| (id.as_str(), r))
    }
}

/// Read-only dataset built once at startup and shared by every query.
#[derive(Debug, Clone)]
pub struct GradeStore {
    sections: Vec<Section>,
    digest: String,
}

impl GradeStore {
    pub fn new(sections: Vec<Section>) -> anyhow::Result<Self> {
        for (i, s) in sections.iter().enumerate() {
            if sections[..i].iter().any(|prev| prev.name == s.name) {
                bail!("duplicate section name {:?}", s.name);
            }
        }
        let digest = dataset_digest(&sections);
        Ok(Self { sections, digest })
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn list_sections(&self) -> Vec<&str> {
        self.sections.iter().map(|s| s.name()).collect()
    }

    pub fn get_section(&self, name: &str) -> Result<&Section, CalcError> {
        self.sections
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| CalcError::UnknownSection(name.to_string()))
    }

    pub fn get_record(&self, section: &str, student_id: &str) -> Result<&RawScoreRecord, CalcError> {
        self.get_section(section)?
            .get(student_id)
            .ok_or_else(|| CalcError::UnknownStudent {
                section: section.to_string(),
                student_id: student_id.to_string(),
            })
    }

    pub fn list_student_ids(&self, section: &str) -> Result<Vec<&str>, CalcError> {
        Ok(self.get_section(section)?.records().map(|(id, _)| id).collect())
    }

    /// Names of every section that contains `student_id`, in declaration order.
    pub fn locate_student(&self, student_id: &str) -> Vec<&str> {
        self.sections
            .iter()
            .filter(|s| s.contains(student_id))
            .map(|s| s.name())
            .collect()
    }

    /// Every record that cannot be scored, as `(section, student_id, defect)`.
    pub fn malformed_records(&self) -> Vec<(&str, &str, RecordDefect)> {
        let mut out = Vec::new();
        for s in &self.sections {
            for (student_id, record) in s.records() {
                if let Err(defect) = calc::weighted_total(record) {
                    out.push((s.name(), student_id, defect));
                }
            }
        }
        out
    }

    /// Hex SHA-256 over the dataset content in declaration order.
    pub fn digest(&self) -> &str {
        &self.digest
    }
}

fn dataset_digest(sections: &[Section]) -> String {
    let mut hasher = Sha256::new();
    for s in sections {
        hasher.update(b"section\t");
        hasher.update(s.name.as_bytes());
        hasher.update(b"\n");
        for (student_id, record) in s.records() {
            hasher.update(student_id.as_bytes());
            hasher.update(b"\t");
            let components: Vec<String> = record.components().iter().map(|v| v.to_string()).collect();
            hasher.update(components.join(",").as_bytes());
            hasher.update(b"\n");
        }
    }
    format!("{:x}", hasher.finalize())
}
