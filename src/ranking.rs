use crate::calc::{
    self, round_off_2_decimal, total_with_policy, CalcError, MalformedPolicy, RecordDefect,
    ScoreBreakdown, TotalOutcome,
};
use crate::store::{GradeStore, Section};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalEntry {
    pub student_id: String,
    pub total: f64,
    /// Set when `total` is the zero fallback for a malformed record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub defect: Option<RecordDefect>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedEntry {
    pub student_id: String,
    pub defect: RecordDefect,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionTotals {
    pub section: String,
    pub totals: Vec<TotalEntry>,
    pub rejected: Vec<RejectedEntry>,
}

impl SectionTotals {
    pub fn get(&self, student_id: &str) -> Option<&TotalEntry> {
        self.totals.iter().find(|t| t.student_id == student_id)
    }

    pub fn rejected_entry(&self, student_id: &str) -> Option<&RejectedEntry> {
        self.rejected.iter().find(|r| r.student_id == student_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardRow {
    pub rank: u32,
    pub student_id: String,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionStats {
    pub section: String,
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub max: f64,
    pub min: f64,
    pub degraded_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentResult {
    pub section: String,
    pub student_id: String,
    pub total: f64,
    pub rank: u32,
    /// Students registered in the section.
    pub student_count: usize,
    /// Students that received a rank (excludes rejected records).
    pub ranked_count: usize,
    pub degraded: bool,
    /// Absent for a degraded entry: a malformed record has no named components.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<ScoreBreakdown>,
}

/// 1 + number of totals strictly greater than `total`. Ties share a rank.
pub fn competition_rank<'a, I>(totals: I, total: f64) -> u32
where
    I: IntoIterator<Item = &'a f64>,
{
    let above = totals.into_iter().filter(|&&t| t > total).count();
    (above as u32) + 1
}

fn by_total_desc_then_id(a: &TotalEntry, b: &TotalEntry) -> Ordering {
    b.total
        .partial_cmp(&a.total)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.student_id.cmp(&b.student_id))
}

/// Descending by total; equal totals share a rank and are ordered by id.
pub fn leaderboard_rows(totals: &[TotalEntry]) -> Vec<LeaderboardRow> {
    let mut sorted: Vec<&TotalEntry> = totals.iter().collect();
    sorted.sort_by(|a, b| by_total_desc_then_id(a, b));

    let mut rows = Vec::with_capacity(sorted.len());
    let mut rank = 0u32;
    let mut prev: Option<f64> = None;
    for (i, entry) in sorted.into_iter().enumerate() {
        if prev != Some(entry.total) {
            rank = (i as u32) + 1;
            prev = Some(entry.total);
        }
        rows.push(LeaderboardRow {
            rank,
            student_id: entry.student_id.clone(),
            total: entry.total,
        });
    }
    rows
}

fn compute_median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[(n / 2) - 1] + sorted[n / 2]) / 2.0
    }
}

/// `None` when there is nothing to summarize.
pub fn summarize(section: &str, totals: &[TotalEntry]) -> Option<SectionStats> {
    if totals.is_empty() {
        return None;
    }
    let values: Vec<f64> = totals.iter().map(|t| t.total).collect();
    let sum: f64 = values.iter().sum();
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    // Clamp guards float noise in the mean of equal values.
    let mean = round_off_2_decimal(sum / values.len() as f64).clamp(min, max);

    Some(SectionStats {
        section: section.to_string(),
        count: values.len(),
        mean,
        median: round_off_2_decimal(compute_median(&values)),
        max,
        min,
        degraded_count: totals.iter().filter(|t| t.defect.is_some()).count(),
    })
}

/// Stateless queries over one dataset snapshot.
#[derive(Debug, Clone, Copy)]
pub struct RankingEngine<'a> {
    store: &'a GradeStore,
    policy: MalformedPolicy,
}

impl<'a> RankingEngine<'a> {
    pub fn new(store: &'a GradeStore, policy: MalformedPolicy) -> Self {
        Self { store, policy }
    }

    pub fn compute_all_totals(&self, section: &str) -> Result<SectionTotals, CalcError> {
        let s = self.store.get_section(section)?;
        Ok(self.totals_for(s))
    }

    fn totals_for(&self, section: &Section) -> SectionTotals {
        let mut totals = Vec::with_capacity(section.len());
        let mut rejected = Vec::new();
        for (student_id, record) in section.records() {
            match total_with_policy(record, self.policy) {
                TotalOutcome::Scored(total) => totals.push(TotalEntry {
                    student_id: student_id.to_string(),
                    total,
                    defect: None,
                }),
                TotalOutcome::Degraded { total, defect } => {
                    debug!(
                        section = section.name(),
                        student_id,
                        %defect,
                        "malformed score record, using zero total"
                    );
                    totals.push(TotalEntry {
                        student_id: student_id.to_string(),
                        total,
                        defect: Some(defect),
                    });
                }
                TotalOutcome::Rejected(defect) => {
                    debug!(
                        section = section.name(),
                        student_id,
                        %defect,
                        "malformed score record, excluded from ranking"
                    );
                    rejected.push(RejectedEntry {
                        student_id: student_id.to_string(),
                        defect,
                    });
                }
            }
        }
        SectionTotals {
            section: section.name().to_string(),
            totals,
            rejected,
        }
    }

    fn ranked_entry<'t>(
        totals: &'t SectionTotals,
        section: &Section,
        student_id: &str,
    ) -> Result<&'t TotalEntry, CalcError> {
        if let Some(entry) = totals.get(student_id) {
            return Ok(entry);
        }
        if let Some(r) = totals.rejected_entry(student_id) {
            return Err(CalcError::MalformedRecord {
                student_id: student_id.to_string(),
                defect: r.defect,
            });
        }
        Err(CalcError::UnknownStudent {
            section: section.name().to_string(),
            student_id: student_id.to_string(),
        })
    }

    pub fn rank(&self, section: &str, student_id: &str) -> Result<u32, CalcError> {
        let s = self.store.get_section(section)?;
        let totals = self.totals_for(s);
        let entry = Self::ranked_entry(&totals, s, student_id)?;
        Ok(competition_rank(
            totals.totals.iter().map(|t| &t.total),
            entry.total,
        ))
    }

    pub fn aggregate_stats(&self, section: &str) -> Result<SectionStats, CalcError> {
        let totals = self.compute_all_totals(section)?;
        summarize(section, &totals.totals).ok_or_else(|| CalcError::EmptySection(section.to_string()))
    }

    pub fn leaderboard(&self, section: &str) -> Result<Vec<LeaderboardRow>, CalcError> {
        Ok(leaderboard_rows(&self.compute_all_totals(section)?.totals))
    }

    pub fn lookup(&self, section: &str, student_id: &str) -> Result<StudentResult, CalcError> {
        let s = self.store.get_section(section)?;
        let totals = self.totals_for(s);
        let entry = Self::ranked_entry(&totals, s, student_id)?;
        let rank = competition_rank(totals.totals.iter().map(|t| &t.total), entry.total);
        let breakdown = s.get(student_id).and_then(|r| calc::breakdown(r).ok());

        Ok(StudentResult {
            section: s.name().to_string(),
            student_id: student_id.to_string(),
            total: entry.total,
            rank,
            student_count: s.len(),
            ranked_count: totals.totals.len(),
            degraded: entry.defect.is_some(),
            breakdown,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calc::RawScoreRecord;
    use crate::dataset::sample_dataset;

    fn entry(id: &str, total: f64) -> TotalEntry {
        TotalEntry {
            student_id: id.to_string(),
            total,
            defect: None,
        }
    }

    fn store_of(sections: Vec<(&str, Vec<(&str, Vec<f64>)>)>) -> GradeStore {
        GradeStore::new(
            sections
                .into_iter()
                .map(|(name, students)| {
                    Section::new(
                        name,
                        students
                            .into_iter()
                            .map(|(id, v)| (id.to_string(), RawScoreRecord::new(v)))
                            .collect(),
                    )
                    .expect("section")
                })
                .collect(),
        )
        .expect("store")
    }

    // Totals: a = 20.0, b = 20.0, c = 8.0, d = 4.0
    fn tie_store() -> GradeStore {
        store_of(vec![(
            "A",
            vec![
                ("d", vec![0.0, 0.0, 10.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
                ("b", vec![0.0, 0.0, 0.0, 10.0, 10.0, 10.0, 10.0, 10.0]),
                ("a", vec![0.0, 0.0, 50.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
                ("c", vec![0.0, 0.0, 20.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
            ],
        )])
    }

    #[test]
    fn ties_share_rank_and_skip_the_next() {
        let store = tie_store();
        let engine = RankingEngine::new(&store, MalformedPolicy::Zero);
        assert_eq!(engine.rank("A", "a").expect("rank"), 1);
        assert_eq!(engine.rank("A", "b").expect("rank"), 1);
        assert_eq!(engine.rank("A", "c").expect("rank"), 3);
        assert_eq!(engine.rank("A", "d").expect("rank"), 4);

        let rows = engine.leaderboard("A").expect("leaderboard");
        let view: Vec<(u32, &str, f64)> = rows
            .iter()
            .map(|r| (r.rank, r.student_id.as_str(), r.total))
            .collect();
        assert_eq!(
            view,
            vec![(1, "a", 20.0), (1, "b", 20.0), (3, "c", 8.0), (4, "d", 4.0)]
        );
    }

    #[test]
    fn rank_ones_match_students_sharing_the_max() {
        let totals = vec![
            entry("x", 50.0),
            entry("y", 71.2),
            entry("z", 71.2),
            entry("w", 71.2),
            entry("v", 12.0),
        ];
        let rows = leaderboard_rows(&totals);
        let max = totals.iter().map(|t| t.total).fold(f64::MIN, f64::max);
        let at_max = totals.iter().filter(|t| t.total == max).count();
        assert_eq!(rows.iter().filter(|r| r.rank == 1).count(), at_max);
        for r in &rows {
            let values: Vec<f64> = totals.iter().map(|t| t.total).collect();
            assert_eq!(r.rank, competition_rank(&values, r.total));
        }
    }

    #[test]
    fn rank_ignores_declaration_order() {
        let forward = tie_store();
        let reversed = store_of(vec![(
            "A",
            vec![
                ("c", vec![0.0, 0.0, 20.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
                ("a", vec![0.0, 0.0, 50.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
                ("b", vec![0.0, 0.0, 0.0, 10.0, 10.0, 10.0, 10.0, 10.0]),
                ("d", vec![0.0, 0.0, 10.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
            ],
        )]);
        let e1 = RankingEngine::new(&forward, MalformedPolicy::Zero);
        let e2 = RankingEngine::new(&reversed, MalformedPolicy::Zero);
        for id in ["a", "b", "c", "d"] {
            assert_eq!(e1.rank("A", id).expect("rank"), e2.rank("A", id).expect("rank"));
        }
        assert_eq!(e1.leaderboard("A").expect("lb"), e2.leaderboard("A").expect("lb"));
    }

    #[test]
    fn sample_section_locks() {
        let store = sample_dataset().expect("sample");
        let engine = RankingEngine::new(&store, MalformedPolicy::Zero);

        let result = engine.lookup("1분반", "9243").expect("lookup");
        assert_eq!(result.total, 57.35);
        assert_eq!(result.rank, 7);
        assert_eq!(result.student_count, 36);
        assert!(!result.degraded);
        let b = result.breakdown.expect("breakdown");
        assert_eq!(b.exercise_sum, 50.0);

        let stats = engine.aggregate_stats("1분반").expect("stats");
        assert_eq!(stats.count, 36);
        assert_eq!(stats.max, 81.69);
        assert_eq!(stats.min, 13.0);
        assert_eq!(stats.mean, 43.31);
        assert_eq!(stats.median, 42.33);
        assert!(stats.max >= stats.mean && stats.mean >= stats.min);

        let rows = engine.leaderboard("1분반").expect("leaderboard");
        assert_eq!(rows.len(), 36);
        assert_eq!(rows[0].student_id, "0103");
        assert_eq!(rows[35].student_id, "3923");
        assert_eq!(rows[35].rank, 36);
    }

    #[test]
    fn unknown_ids_are_errors_not_zero_scores() {
        let store = sample_dataset().expect("sample");
        let engine = RankingEngine::new(&store, MalformedPolicy::Zero);
        assert_eq!(engine.lookup("1분반", "0066").unwrap_err().code(), "unknown_student");
        assert_eq!(engine.lookup("1분반", "").unwrap_err().code(), "unknown_student");
        assert_eq!(engine.rank("3분반", "9243").unwrap_err().code(), "unknown_section");
        assert_eq!(engine.lookup("2분반", "0066").expect("lookup").rank, 1);
    }

    fn store_with_malformed() -> GradeStore {
        store_of(vec![(
            "A",
            vec![
                ("good", vec![58.0, 10.0, 47.0, 10.0, 10.0, 10.0, 10.0, 10.0]),
                ("short", vec![58.0, 10.0, 47.0]),
                ("low", vec![0.0, 0.0, 10.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
            ],
        )])
    }

    #[test]
    fn zero_policy_keeps_ranking_the_rest_of_the_section() {
        let store = store_with_malformed();
        let engine = RankingEngine::new(&store, MalformedPolicy::Zero);

        let totals = engine.compute_all_totals("A").expect("totals");
        assert_eq!(totals.totals.len(), 3);
        assert_eq!(totals.totals.iter().filter(|t| t.defect.is_some()).count(), 1);
        let short = totals.get("short").expect("short entry");
        assert_eq!(short.total, 0.0);
        assert_eq!(short.defect, Some(RecordDefect::WrongLength { found: 3 }));

        let result = engine.lookup("A", "short").expect("lookup");
        assert!(result.degraded);
        assert!(result.breakdown.is_none());
        assert_eq!(result.rank, 3);
        assert_eq!(engine.rank("A", "good").expect("rank"), 1);

        let stats = engine.aggregate_stats("A").expect("stats");
        assert_eq!(stats.degraded_count, 1);
        assert_eq!(stats.min, 0.0);
    }

    #[test]
    fn reject_policy_excludes_and_reports() {
        let store = store_with_malformed();
        let engine = RankingEngine::new(&store, MalformedPolicy::Reject);

        let totals = engine.compute_all_totals("A").expect("totals");
        assert_eq!(totals.totals.len(), 2);
        assert_eq!(totals.rejected.len(), 1);
        assert_eq!(totals.rejected[0].student_id, "short");

        assert_eq!(engine.lookup("A", "short").unwrap_err().code(), "malformed_record");
        let result = engine.lookup("A", "low").expect("lookup");
        assert_eq!(result.rank, 2);
        assert_eq!(result.student_count, 3);
        assert_eq!(result.ranked_count, 2);

        let stats = engine.aggregate_stats("A").expect("stats");
        assert_eq!(stats.count, 2);
        assert_eq!(stats.min, 4.0);
    }

    #[test]
    fn empty_section_has_no_statistics() {
        let store = store_of(vec![("A", vec![])]);
        let engine = RankingEngine::new(&store, MalformedPolicy::Zero);
        assert_eq!(
            engine.aggregate_stats("A").unwrap_err(),
            CalcError::EmptySection("A".to_string())
        );
        assert!(engine.leaderboard("A").expect("leaderboard").is_empty());

        let all_rejected = store_of(vec![("B", vec![("x", vec![1.0])])]);
        let engine = RankingEngine::new(&all_rejected, MalformedPolicy::Reject);
        assert_eq!(engine.aggregate_stats("B").unwrap_err().code(), "empty_section");
    }

    #[test]
    fn stats_order_holds_for_single_and_equal_totals() {
        let one = summarize("A", &[entry("a", 33.33)]).expect("stats");
        assert_eq!((one.max, one.mean, one.median, one.min), (33.33, 33.33, 33.33, 33.33));

        let same = summarize("A", &[entry("a", 0.1), entry("b", 0.1), entry("c", 0.1)]).expect("stats");
        assert!(same.max >= same.mean && same.mean >= same.min);
    }
}
