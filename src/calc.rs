use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Components in a raw record: midterm, midterm extra, final, five exercises.
pub const RECORD_LEN: usize = 8;
pub const EXERCISE_COUNT: usize = 5;

const MIDTERM: usize = 0;
const MID_EXTRA: usize = 1;
const FINAL: usize = 2;
const EXERCISES_START: usize = 3;

/// One student's positional scores exactly as they appear in the dataset.
///
/// The length is not checked on construction; a record of the wrong shape is
/// only rejected when a total or breakdown is computed from it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RawScoreRecord(Vec<f64>);

impl RawScoreRecord {
    pub fn new(components: Vec<f64>) -> Self {
        Self(components)
    }

    pub fn components(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum RecordDefect {
    WrongLength { found: usize },
    InvalidComponent { index: usize, value: f64 },
    /// Every component is valid but the weighted sum is not finite.
    Overflow,
}

impl fmt::Display for RecordDefect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordDefect::WrongLength { found } => {
                write!(f, "{} components (expected {})", found, RECORD_LEN)
            }
            RecordDefect::InvalidComponent { index, value } => {
                write!(f, "component {} is {} (must be a non-negative number)", index, value)
            }
            RecordDefect::Overflow => f.write_str("weighted total is out of range"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalcError {
    #[error("unknown section: {0:?}")]
    UnknownSection(String),
    #[error("no student {student_id:?} in section {section:?}")]
    UnknownStudent { section: String, student_id: String },
    #[error("malformed score record for {student_id:?}: {defect}")]
    MalformedRecord {
        student_id: String,
        defect: RecordDefect,
    },
    #[error("statistics unavailable: section {0:?} has no ranked students")]
    EmptySection(String),
}

impl CalcError {
    pub fn code(&self) -> &'static str {
        match self {
            CalcError::UnknownSection(_) => "unknown_section",
            CalcError::UnknownStudent { .. } => "unknown_student",
            CalcError::MalformedRecord { .. } => "malformed_record",
            CalcError::EmptySection(_) => "empty_section",
        }
    }

    pub fn details(&self) -> serde_json::Value {
        match self {
            CalcError::UnknownSection(section) | CalcError::EmptySection(section) => {
                serde_json::json!({ "section": section })
            }
            CalcError::UnknownStudent {
                section,
                student_id,
            } => serde_json::json!({ "section": section, "studentId": student_id }),
            CalcError::MalformedRecord { student_id, defect } => {
                serde_json::json!({ "studentId": student_id, "defect": defect })
            }
        }
    }
}

/// What to do with a student whose raw record is malformed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MalformedPolicy {
    /// Score the student as 0.00 and flag the entry as degraded.
    #[default]
    Zero,
    /// Leave the student out of totals, ranking and statistics.
    Reject,
}

impl FromStr for MalformedPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "zero" => Ok(MalformedPolicy::Zero),
            "reject" => Ok(MalformedPolicy::Reject),
            other => Err(format!(
                "unknown malformed-record policy {:?} (expected zero or reject)",
                other
            )),
        }
    }
}

impl fmt::Display for MalformedPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MalformedPolicy::Zero => f.write_str("zero"),
            MalformedPolicy::Reject => f.write_str("reject"),
        }
    }
}

/// Two-decimal rounding applied once to a finished total.
/// Ties round half away from zero: `round(100 * x) / 100`.
pub fn round_off_2_decimal(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

pub fn validate_record(record: &RawScoreRecord) -> Result<(), RecordDefect> {
    if record.len() != RECORD_LEN {
        return Err(RecordDefect::WrongLength {
            found: record.len(),
        });
    }
    for (index, value) in record.components().iter().copied().enumerate() {
        if !value.is_finite() || value < 0.0 {
            return Err(RecordDefect::InvalidComponent { index, value });
        }
    }
    Ok(())
}

/// Weighted total of a raw record:
/// `midterm*3/11 + extra*3/11 + final*4/10 + sum(exercises)*2/5`,
/// rounded to two decimals.
pub fn weighted_total(record: &RawScoreRecord) -> Result<f64, RecordDefect> {
    validate_record(record)?;
    let c = record.components();
    let exercise_sum: f64 = c[EXERCISES_START..RECORD_LEN].iter().sum();

    let total = c[MIDTERM] * 3.0 / 11.0
        + c[MID_EXTRA] * 3.0 / 11.0
        + c[FINAL] * 4.0 / 10.0
        + exercise_sum * 2.0 / 5.0;

    let total = round_off_2_decimal(total);
    if !total.is_finite() {
        return Err(RecordDefect::Overflow);
    }
    Ok(total)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TotalOutcome {
    Scored(f64),
    /// Zero fallback for a malformed record; the defect travels with the value.
    Degraded { total: f64, defect: RecordDefect },
    Rejected(RecordDefect),
}

pub fn total_with_policy(record: &RawScoreRecord, policy: MalformedPolicy) -> TotalOutcome {
    match weighted_total(record) {
        Ok(total) => TotalOutcome::Scored(total),
        Err(defect) => match policy {
            MalformedPolicy::Zero => TotalOutcome::Degraded { total: 0.0, defect },
            MalformedPolicy::Reject => TotalOutcome::Rejected(defect),
        },
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBreakdown {
    pub midterm: f64,
    pub mid_extra: f64,
    pub midterm_sum: f64,
    #[serde(rename = "final")]
    pub final_exam: f64,
    pub exercises: [f64; EXERCISE_COUNT],
    pub exercise_sum: f64,
}

pub fn breakdown(record: &RawScoreRecord) -> Result<ScoreBreakdown, RecordDefect> {
    weighted_total(record)?;
    let c = record.components();
    let mut exercises = [0.0_f64; EXERCISE_COUNT];
    exercises.copy_from_slice(&c[EXERCISES_START..RECORD_LEN]);

    Ok(ScoreBreakdown {
        midterm: c[MIDTERM],
        mid_extra: c[MID_EXTRA],
        midterm_sum: c[MIDTERM] + c[MID_EXTRA],
        final_exam: c[FINAL],
        exercises,
        exercise_sum: exercises.iter().sum(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(v: &[f64]) -> RawScoreRecord {
        RawScoreRecord::new(v.to_vec())
    }

    #[test]
    fn round_off_goes_half_away_from_zero() {
        assert_eq!(round_off_2_decimal(0.0), 0.0);
        assert_eq!(round_off_2_decimal(0.125), 0.13);
        assert_eq!(round_off_2_decimal(-0.125), -0.13);
        assert_eq!(round_off_2_decimal(57.345454), 57.35);
        assert_eq!(round_off_2_decimal(13.0), 13.0);
    }

    #[test]
    fn reference_record_scores_57_35() {
        let total = weighted_total(&rec(&[58.0, 10.0, 47.0, 10.0, 10.0, 10.0, 10.0, 10.0]))
            .expect("valid record");
        assert_eq!(total, 57.35);
    }

    #[test]
    fn totals_are_deterministic() {
        let r = rec(&[93.0, 10.0, 84.0, 10.0, 10.0, 10.0, 10.0, 10.0]);
        let a = weighted_total(&r).expect("total");
        let b = weighted_total(&r).expect("total");
        assert_eq!(a.to_bits(), b.to_bits());
        assert_eq!(a, 81.69);
    }

    #[test]
    fn one_exercise_point_is_worth_0_4() {
        let bases = [
            [56.0, 10.0, 52.0, 10.0, 10.0, 0.0, 10.0, 10.0],
            [15.0, 0.0, 18.0, 0.0, 10.0, 9.0, 0.0, 9.0],
            [11.0, 0.0, 7.0, 10.0, 8.0, 0.0, 0.0, 0.0],
            [0.0; 8],
        ];
        for base in bases {
            let before = weighted_total(&rec(&base)).expect("base total");
            for idx in EXERCISES_START..RECORD_LEN {
                let mut bumped = base;
                bumped[idx] += 1.0;
                let after = weighted_total(&rec(&bumped)).expect("bumped total");
                assert!(
                    (after - before - 0.4).abs() < 1e-9,
                    "exercise {} on {:?}: {} -> {}",
                    idx,
                    base,
                    before,
                    after
                );
            }
        }
    }

    #[test]
    fn wrong_length_is_never_padded_or_truncated() {
        for len in [0usize, 7, 9] {
            let r = RawScoreRecord::new(vec![10.0; len]);
            assert_eq!(
                weighted_total(&r),
                Err(RecordDefect::WrongLength { found: len })
            );
        }
    }

    #[test]
    fn negative_and_nan_components_are_malformed() {
        let negative = rec(&[10.0, 10.0, -1.0, 10.0, 10.0, 10.0, 10.0, 10.0]);
        assert_eq!(
            weighted_total(&negative),
            Err(RecordDefect::InvalidComponent {
                index: 2,
                value: -1.0
            })
        );

        let nan = rec(&[10.0, 10.0, 10.0, 10.0, 10.0, 10.0, f64::NAN, 10.0]);
        match weighted_total(&nan) {
            Err(RecordDefect::InvalidComponent { index, .. }) => assert_eq!(index, 6),
            other => panic!("expected invalid component, got {:?}", other),
        }
    }

    #[test]
    fn huge_components_overflow_into_a_defect() {
        let big = rec(&[1e308, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(validate_record(&big), Ok(()));
        assert_eq!(weighted_total(&big), Err(RecordDefect::Overflow));
        assert_eq!(breakdown(&big), Err(RecordDefect::Overflow));

        // Finite before rounding, infinite once scaled by 100.
        let edge = rec(&[0.0, 0.0, 1e307, 0.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(weighted_total(&edge), Err(RecordDefect::Overflow));

        assert_eq!(
            total_with_policy(&big, MalformedPolicy::Zero),
            TotalOutcome::Degraded {
                total: 0.0,
                defect: RecordDefect::Overflow
            }
        );
        assert_eq!(
            serde_json::to_value(RecordDefect::Overflow).expect("serialize"),
            serde_json::json!({ "kind": "overflow" })
        );
    }

    #[test]
    fn policy_decides_between_degraded_zero_and_rejection() {
        let bad = rec(&[10.0, 10.0, 10.0]);
        let defect = RecordDefect::WrongLength { found: 3 };
        assert_eq!(
            total_with_policy(&bad, MalformedPolicy::Zero),
            TotalOutcome::Degraded { total: 0.0, defect }
        );
        assert_eq!(
            total_with_policy(&bad, MalformedPolicy::Reject),
            TotalOutcome::Rejected(defect)
        );

        let good = rec(&[58.0, 10.0, 47.0, 10.0, 10.0, 10.0, 10.0, 10.0]);
        assert_eq!(
            total_with_policy(&good, MalformedPolicy::Reject),
            TotalOutcome::Scored(57.35)
        );
    }

    #[test]
    fn breakdown_names_components() {
        let b = breakdown(&rec(&[78.0, 10.0, 44.0, 10.0, 9.0, 10.0, 9.0, 7.0])).expect("breakdown");
        assert_eq!(b.midterm, 78.0);
        assert_eq!(b.mid_extra, 10.0);
        assert_eq!(b.midterm_sum, 88.0);
        assert_eq!(b.final_exam, 44.0);
        assert_eq!(b.exercises, [10.0, 9.0, 10.0, 9.0, 7.0]);
        assert_eq!(b.exercise_sum, 45.0);

        let json = serde_json::to_value(&b).expect("serialize");
        assert_eq!(json["final"], serde_json::json!(44.0));
        assert_eq!(json["midExtra"], serde_json::json!(10.0));
    }

    #[test]
    fn policy_parses_from_cli_text() {
        assert_eq!("zero".parse::<MalformedPolicy>(), Ok(MalformedPolicy::Zero));
        assert_eq!(" Reject ".parse::<MalformedPolicy>(), Ok(MalformedPolicy::Reject));
        assert!("skip".parse::<MalformedPolicy>().is_err());
    }

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(CalcError::UnknownSection("x".into()).code(), "unknown_section");
        assert_eq!(
            CalcError::UnknownStudent {
                section: "x".into(),
                student_id: "".into()
            }
            .code(),
            "unknown_student"
        );
        assert_eq!(CalcError::EmptySection("x".into()).code(), "empty_section");
    }
}
