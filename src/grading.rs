//! Weighted grade computation for a subject.
//!
//! Category averages are point-weighted (`Σscore / ΣtotalPoints`), and the
//! overall grade is normalized by the weights of the categories that actually
//! contributed, so a half-finished semester still has a running grade.
//!
//! The Exam category only counts once the configured number of exam
//! assessments has been recorded *and* at least one exam grade entry exists.
//! Assessment grades never feed the weighted average.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::models::{Assessment, GradeEntry, Subject, EXAM};

#[derive(Debug, Error, PartialEq)]
pub enum GradeError {
    #[error("weight for '{category}' must be a finite, non-negative number (got {weight})")]
    InvalidWeight { category: String, weight: f64 },

    #[error("categories with grades all have zero weight")]
    ZeroTotalWeight,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", content = "percent", rename_all = "camelCase")]
pub enum OverallGrade {
    Percent(f64),
    /// No category had enough data to contribute.
    Indeterminate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum IncompleteReason {
    NoEntries,
    ExamsOutstanding { recorded: usize, expected: u32 },
    /// Scores too large to average in floating point.
    NonFiniteAverage,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum CategoryStatus {
    Average {
        percent: f64,
        score: f64,
        total_points: f64,
    },
    Incomplete {
        reason: IncompleteReason,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryGrade {
    pub category: String,
    pub weight: f64,
    /// Valid entries that went into the average.
    pub entries: usize,
    pub status: CategoryStatus,
}

#[cfg(test)]
impl CategoryGrade {
    pub fn percent(&self) -> Option<f64> {
        match self.status {
            CategoryStatus::Average { percent, .. } => Some(percent),
            CategoryStatus::Incomplete { .. } => None,
        }
    }

    pub fn is_incomplete(&self) -> bool {
        matches!(self.status, CategoryStatus::Incomplete { .. })
    }
}

/// A grade entry that was skipped. The rest of the subject is still graded.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum DataQualityWarning {
    NonPositiveTotalPoints {
        entry_id: String,
        entry_name: String,
        total_points: f64,
    },
    NonFiniteScore {
        entry_id: String,
        entry_name: String,
    },
    NonFiniteAverage {
        category: String,
    },
}

impl fmt::Display for DataQualityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataQualityWarning::NonPositiveTotalPoints { entry_name, total_points, .. } => {
                write!(f, "'{entry_name}' has total points {total_points}; excluded")
            }
            DataQualityWarning::NonFiniteScore { entry_name, .. } => {
                write!(f, "'{entry_name}' has a non-numeric score; excluded")
            }
            DataQualityWarning::NonFiniteAverage { category } => {
                write!(f, "'{category}' average overflows; category excluded")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamTally {
    /// Assessments of type "Exam".
    pub recorded: usize,
    pub expected: u32,
    /// Mean of numeric exam-assessment grades. Informational only.
    pub numeric_mean: Option<f64>,
    pub letter_graded: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeSummary {
    pub subject_id: String,
    pub overall: OverallGrade,
    pub categories: Vec<CategoryGrade>,
    /// Categories present in the entries but missing from the weight map.
    pub unweighted_categories: Vec<String>,
    pub warnings: Vec<DataQualityWarning>,
    pub exams: ExamTally,
}

#[cfg(test)]
impl GradeSummary {
    pub fn category(&self, name: &str) -> Option<&CategoryGrade> {
        self.categories.iter().find(|c| c.category == name)
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Bucket {
    score: f64,
    total_points: f64,
    entries: usize,
}

fn check_entry(entry: &GradeEntry) -> Option<DataQualityWarning> {
    if !entry.score.is_finite() {
        return Some(DataQualityWarning::NonFiniteScore {
            entry_id: entry.id.clone(),
            entry_name: entry.name.clone(),
        });
    }
    // NaN fails the `> 0.0` test too
    if !(entry.total_points > 0.0 && entry.total_points.is_finite()) {
        return Some(DataQualityWarning::NonPositiveTotalPoints {
            entry_id: entry.id.clone(),
            entry_name: entry.name.clone(),
            total_points: entry.total_points,
        });
    }
    None
}

fn tally_exams(subject: &Subject, assessments: &[Assessment]) -> ExamTally {
    let exams: Vec<&Assessment> = assessments.iter().filter(|a| a.kind == EXAM).collect();
    let numeric: Vec<f64> = exams
        .iter()
        .filter_map(|a| a.grade.as_ref().and_then(|g| g.as_numeric()))
        .collect();
    let letter_graded = exams
        .iter()
        .filter(|a| a.grade.as_ref().is_some_and(|g| g.as_numeric().is_none()))
        .count();

    ExamTally {
        recorded: exams.len(),
        expected: subject.total_exams,
        numeric_mean: (!numeric.is_empty())
            .then(|| numeric.iter().sum::<f64>() / numeric.len() as f64),
        letter_graded,
    }
}

/// Computes a subject's weighted grade from its entries and assessments.
///
/// Entries and assessments are expected to belong to `subject`; their
/// `subjectId` is not rechecked. Malformed entries are reported in
/// `warnings` and skipped.
pub fn compute_grade(
    subject: &Subject,
    entries: &[GradeEntry],
    assessments: &[Assessment],
) -> Result<GradeSummary, GradeError> {
    for (category, &weight) in &subject.grade_weights {
        if !weight.is_finite() || weight < 0.0 {
            return Err(GradeError::InvalidWeight { category: category.clone(), weight });
        }
    }

    let mut warnings = Vec::new();
    let mut unweighted = BTreeSet::new();
    let mut buckets: BTreeMap<&str, Bucket> = BTreeMap::new();

    for entry in entries {
        let weighted = subject.grade_weights.contains_key(&entry.category);
        if !weighted {
            unweighted.insert(entry.category.clone());
        }
        if let Some(warning) = check_entry(entry) {
            warnings.push(warning);
            continue;
        }
        if weighted {
            let bucket = buckets.entry(entry.category.as_str()).or_default();
            bucket.score += entry.score;
            bucket.total_points += entry.total_points;
            bucket.entries += 1;
        }
    }

    let exams = tally_exams(subject, assessments);
    let exams_outstanding = exams.recorded < subject.total_exams as usize;

    let mut categories = Vec::with_capacity(subject.grade_weights.len());
    let mut weighted_sum = 0.0;
    let mut weight_sum = 0.0;
    let mut contributing = 0usize;

    for (category, &weight) in &subject.grade_weights {
        let bucket = buckets.get(category.as_str()).copied().unwrap_or_default();
        let status = if category == EXAM && exams_outstanding {
            CategoryStatus::Incomplete {
                reason: IncompleteReason::ExamsOutstanding {
                    recorded: exams.recorded,
                    expected: subject.total_exams,
                },
            }
        } else if bucket.entries == 0 {
            CategoryStatus::Incomplete { reason: IncompleteReason::NoEntries }
        } else {
            let percent = bucket.score / bucket.total_points * 100.0;
            let contribution = percent * weight;
            if percent.is_finite() && (weighted_sum + contribution).is_finite() {
                weighted_sum += contribution;
                weight_sum += weight;
                contributing += 1;
                CategoryStatus::Average {
                    percent,
                    score: bucket.score,
                    total_points: bucket.total_points,
                }
            } else {
                warnings.push(DataQualityWarning::NonFiniteAverage { category: category.clone() });
                CategoryStatus::Incomplete { reason: IncompleteReason::NonFiniteAverage }
            }
        };
        categories.push(CategoryGrade {
            category: category.clone(),
            weight,
            entries: bucket.entries,
            status,
        });
    }

    let overall = if contributing == 0 {
        OverallGrade::Indeterminate
    } else if weight_sum <= 0.0 {
        return Err(GradeError::ZeroTotalWeight);
    } else {
        OverallGrade::Percent(weighted_sum / weight_sum)
    };

    Ok(GradeSummary {
        subject_id: subject.id.clone(),
        overall,
        categories,
        unweighted_categories: unweighted.into_iter().collect(),
        warnings,
        exams,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Grade;

    fn subject(weights: &[(&str, f64)], total_exams: u32) -> Subject {
        let mut s = Subject::new("Calculus", "sem");
        s.id = "calc".into();
        s.grade_weights = weights.iter().map(|(k, v)| (k.to_string(), *v)).collect();
        s.total_exams = total_exams;
        s
    }

    fn entry(category: &str, score: f64, total_points: f64) -> GradeEntry {
        GradeEntry {
            id: format!("{category}-{score}"),
            name: format!("{category} {score}/{total_points}"),
            score,
            total_points,
            category: category.into(),
            subject_id: "calc".into(),
        }
    }

    fn exam(grade: Option<Grade>) -> Assessment {
        Assessment {
            id: String::new(),
            name: "Midterm".into(),
            kind: EXAM.into(),
            date: None,
            grade,
            subject_id: "calc".into(),
        }
    }

    fn overall_percent(summary: &GradeSummary) -> f64 {
        match summary.overall {
            OverallGrade::Percent(p) => p,
            OverallGrade::Indeterminate => panic!("expected a numeric grade"),
        }
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_no_data_is_indeterminate() {
        let s = subject(&[("Homework", 0.4), ("Exam", 0.6)], 2);
        let summary = compute_grade(&s, &[], &[]).unwrap();
        assert_eq!(summary.overall, OverallGrade::Indeterminate);
        assert!(summary.categories.iter().all(CategoryGrade::is_incomplete));
    }

    #[test]
    fn test_no_weights_is_indeterminate() {
        let s = subject(&[], 0);
        let summary = compute_grade(&s, &[entry("Homework", 5.0, 10.0)], &[]).unwrap();
        assert_eq!(summary.overall, OverallGrade::Indeterminate);
        assert_eq!(summary.unweighted_categories, vec!["Homework"]);
    }

    #[test]
    fn test_category_average_is_point_weighted() {
        let s = subject(&[("Homework", 1.0)], 0);
        let entries = [entry("Homework", 9.0, 10.0), entry("Homework", 40.0, 50.0)];
        let summary = compute_grade(&s, &entries, &[]).unwrap();

        let hw = summary.category("Homework").unwrap();
        assert!(approx(hw.percent().unwrap(), 49.0 / 60.0 * 100.0));
        assert!(!approx(hw.percent().unwrap(), 85.0));
        assert_eq!(hw.entries, 2);
        assert!(approx(overall_percent(&summary), 49.0 / 60.0 * 100.0));
    }

    #[test]
    fn test_exam_incomplete_when_assessments_outstanding() {
        let s = subject(&[("Homework", 0.5), ("Exam", 0.5)], 2);
        let entries = [entry("Homework", 10.0, 10.0), entry("Exam", 50.0, 100.0)];
        let summary = compute_grade(&s, &entries, &[exam(None)]).unwrap();

        let ex = summary.category("Exam").unwrap();
        assert_eq!(
            ex.status,
            CategoryStatus::Incomplete {
                reason: IncompleteReason::ExamsOutstanding { recorded: 1, expected: 2 }
            }
        );
        // Homework alone drives the grade
        assert!(approx(overall_percent(&summary), 100.0));
    }

    #[test]
    fn test_exam_complete_when_count_met_and_entries_present() {
        let s = subject(&[("Homework", 0.5), ("Exam", 0.5)], 1);
        let entries = [entry("Homework", 10.0, 10.0), entry("Exam", 50.0, 100.0)];
        let summary = compute_grade(&s, &entries, &[exam(None)]).unwrap();

        assert!(approx(summary.category("Exam").unwrap().percent().unwrap(), 50.0));
        assert!(approx(overall_percent(&summary), 75.0));
    }

    #[test]
    fn test_exam_assessment_alone_does_not_complete_category() {
        // weights {Homework:0.4, Exam:0.6}, one exam expected and recorded,
        // no exam grade entries
        let s = subject(&[("Homework", 0.4), ("Exam", 0.6)], 1);
        let entries = [entry("Homework", 18.0, 20.0)];
        let summary = compute_grade(&s, &entries, &[exam(Some(Grade::Numeric(88.0)))]).unwrap();

        assert!(approx(summary.category("Homework").unwrap().percent().unwrap(), 90.0));
        assert_eq!(
            summary.category("Exam").unwrap().status,
            CategoryStatus::Incomplete { reason: IncompleteReason::NoEntries }
        );
        assert!(approx(overall_percent(&summary), 90.0));
        assert_eq!(summary.exams.recorded, 1);
        assert_eq!(summary.exams.numeric_mean, Some(88.0));
    }

    #[test]
    fn test_zero_expected_exams_needs_only_entries() {
        let s = subject(&[("Exam", 1.0)], 0);
        let summary = compute_grade(&s, &[entry("Exam", 7.0, 10.0)], &[]).unwrap();
        assert!(approx(overall_percent(&summary), 70.0));
    }

    #[test]
    fn test_uniform_weight_scaling_is_invariant() {
        let entries = [
            entry("Homework", 17.0, 20.0),
            entry("Homework", 4.0, 10.0),
            entry("Exam", 61.0, 80.0),
        ];
        let a = subject(&[("Homework", 1.0), ("Exam", 2.0)], 0);
        let b = subject(&[("Homework", 2.0), ("Exam", 4.0)], 0);
        let ga = overall_percent(&compute_grade(&a, &entries, &[]).unwrap());
        let gb = overall_percent(&compute_grade(&b, &entries, &[]).unwrap());
        assert!(approx(ga, gb));
    }

    #[test]
    fn test_weights_normalized_over_contributing_categories() {
        // Project has weight but no entries: excluded, not zero
        let s = subject(&[("Homework", 20.0), ("Quiz", 30.0), ("Project", 50.0)], 0);
        let entries = [entry("Homework", 8.0, 10.0), entry("Quiz", 6.0, 10.0)];
        let summary = compute_grade(&s, &entries, &[]).unwrap();
        let expected = (80.0 * 20.0 + 60.0 * 30.0) / 50.0;
        assert!(approx(overall_percent(&summary), expected));
        assert!(summary.category("Project").unwrap().is_incomplete());
    }

    #[test]
    fn test_unweighted_categories_reported_once() {
        let s = subject(&[("Homework", 1.0)], 0);
        let entries = [
            entry("Homework", 5.0, 10.0),
            entry("Lab", 3.0, 5.0),
            entry("Lab", 4.0, 5.0),
            entry("Bonus", 1.0, 1.0),
        ];
        let summary = compute_grade(&s, &entries, &[]).unwrap();
        assert_eq!(summary.unweighted_categories, vec!["Bonus", "Lab"]);
        assert!(approx(overall_percent(&summary), 50.0));
    }

    #[test]
    fn test_bad_total_points_warns_without_failing() {
        let s = subject(&[("Homework", 1.0)], 0);
        let entries = [
            entry("Homework", 9.0, 10.0),
            entry("Homework", 5.0, 0.0),
            entry("Homework", 5.0, -10.0),
        ];
        let summary = compute_grade(&s, &entries, &[]).unwrap();
        assert_eq!(summary.warnings.len(), 2);
        assert!(matches!(
            summary.warnings[0],
            DataQualityWarning::NonPositiveTotalPoints { total_points, .. } if total_points == 0.0
        ));
        assert_eq!(summary.category("Homework").unwrap().entries, 1);
        assert!(approx(overall_percent(&summary), 90.0));
    }

    #[test]
    fn test_only_bad_entries_leave_category_incomplete() {
        let s = subject(&[("Homework", 1.0)], 0);
        let summary = compute_grade(&s, &[entry("Homework", 5.0, 0.0)], &[]).unwrap();
        assert_eq!(summary.overall, OverallGrade::Indeterminate);
        assert_eq!(summary.warnings.len(), 1);
    }

    #[test]
    fn test_non_finite_score_warns() {
        let s = subject(&[("Homework", 1.0)], 0);
        let summary = compute_grade(&s, &[entry("Homework", f64::NAN, 10.0)], &[]).unwrap();
        assert!(matches!(summary.warnings[0], DataQualityWarning::NonFiniteScore { .. }));
    }

    #[test]
    fn test_overflowing_category_is_excluded_not_blanking_overall() {
        let s = subject(&[("Homework", 1.0), ("Quiz", 1.0)], 0);
        let entries = [entry("Quiz", 9.0, 10.0), entry("Homework", 1e308, 10.0)];
        let summary = compute_grade(&s, &entries, &[]).unwrap();

        assert!(approx(overall_percent(&summary), 90.0));
        assert_eq!(
            summary.warnings,
            vec![DataQualityWarning::NonFiniteAverage { category: "Homework".into() }]
        );
        assert_eq!(
            summary.category("Homework").unwrap().status,
            CategoryStatus::Incomplete { reason: IncompleteReason::NonFiniteAverage }
        );
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["overall"]["percent"], 90.0);
    }

    #[test]
    fn test_overflowing_sum_of_entries_is_excluded() {
        // each entry is finite on its own, their sum is not
        let s = subject(&[("Homework", 1.0)], 0);
        let entries = [entry("Homework", 1e308, 10.0), entry("Homework", 1e308, 20.0)];
        let summary = compute_grade(&s, &entries, &[]).unwrap();
        assert_eq!(summary.overall, OverallGrade::Indeterminate);
        assert_eq!(summary.warnings.len(), 1);
    }

    #[test]
    fn test_negative_weight_is_invalid() {
        let s = subject(&[("Homework", -1.0)], 0);
        let err = compute_grade(&s, &[], &[]).unwrap_err();
        assert_eq!(err, GradeError::InvalidWeight { category: "Homework".into(), weight: -1.0 });
    }

    #[test]
    fn test_all_zero_weights_with_data_is_invalid() {
        let s = subject(&[("Homework", 0.0)], 0);
        let err = compute_grade(&s, &[entry("Homework", 5.0, 10.0)], &[]).unwrap_err();
        assert_eq!(err, GradeError::ZeroTotalWeight);
    }

    #[test]
    fn test_letter_grades_are_counted_but_not_averaged() {
        let s = subject(&[("Exam", 1.0)], 2);
        let assessments = [
            exam(Some(Grade::Letter("A".into()))),
            exam(Some(Grade::Numeric(80.0))),
            Assessment { kind: "Quiz".into(), ..exam(Some(Grade::Numeric(10.0))) },
        ];
        let summary = compute_grade(&s, &[entry("Exam", 9.0, 10.0)], &assessments).unwrap();
        assert_eq!(summary.exams.recorded, 2);
        assert_eq!(summary.exams.letter_graded, 1);
        assert_eq!(summary.exams.numeric_mean, Some(80.0));
        assert!(approx(overall_percent(&summary), 90.0));
    }

    #[test]
    fn test_summary_serializes_camel_case() {
        let s = subject(&[("Homework", 1.0)], 0);
        let summary = compute_grade(&s, &[entry("Homework", 1.0, 2.0)], &[]).unwrap();
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["overall"]["kind"], "percent");
        assert_eq!(json["overall"]["percent"], 50.0);
        assert_eq!(json["categories"][0]["status"]["totalPoints"], 2.0);
        assert_eq!(json["subjectId"], "calc");
        assert!(json["unweightedCategories"].as_array().unwrap().is_empty());
    }
}
