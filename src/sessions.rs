use std::collections::HashMap;

use serde::Serialize;

use crate::models::StudySession;

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubjectStudyTime {
    pub subject: String,
    pub total_seconds: i64,
    pub sessions: usize,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StudyTimeSummary {
    pub semester_id: Option<String>,
    pub subjects: Vec<SubjectStudyTime>,
    pub total_seconds: i64,
}

/// Totals study time per subject label, longest first (ties by name).
pub fn summarize(semester_id: Option<String>, sessions: &[StudySession]) -> StudyTimeSummary {
    let mut by_subject: HashMap<&str, SubjectStudyTime> = HashMap::new();
    for session in sessions {
        let slot = by_subject
            .entry(session.subject.as_str())
            .or_insert_with(|| SubjectStudyTime {
                subject: session.subject.clone(),
                total_seconds: 0,
                sessions: 0,
            });
        slot.total_seconds += session.duration_seconds;
        slot.sessions += 1;
    }

    let mut subjects: Vec<SubjectStudyTime> = by_subject.into_values().collect();
    subjects.sort_by(|a, b| {
        b.total_seconds
            .cmp(&a.total_seconds)
            .then_with(|| a.subject.cmp(&b.subject))
    });
    let total_seconds = subjects.iter().map(|s| s.total_seconds).sum();

    StudyTimeSummary { semester_id, subjects, total_seconds }
}
