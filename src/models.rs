use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_with::SerializeDisplay;

use crate::store::Document;

/// Category every subject must carry in its assignment types.
pub const EXAM: &str = "Exam";

pub const DEFAULT_TOTAL_EXAMS: u32 = 2;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Semester {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub archived: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub semester_id: String,
    #[serde(default)]
    pub grade_weights: BTreeMap<String, f64>,
    #[serde(default = "default_assignment_types")]
    pub assignment_types: Vec<String>,
    #[serde(default = "default_total_exams")]
    pub total_exams: u32,
}

impl Subject {
    /// A subject with no weights, `["Exam"]` as its only type and the default exam count.
    pub fn new(name: impl Into<String>, semester_id: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            semester_id: semester_id.into(),
            grade_weights: BTreeMap::new(),
            assignment_types: default_assignment_types(),
            total_exams: DEFAULT_TOTAL_EXAMS,
        }
    }
}

pub fn default_assignment_types() -> Vec<String> {
    vec![EXAM.to_string()]
}

fn default_total_exams() -> u32 {
    DEFAULT_TOTAL_EXAMS
}

/// Prepends "Exam" when the list lacks it. Order of the other types is kept.
pub fn ensure_exam(mut types: Vec<String>) -> Vec<String> {
    if !types.iter().any(|t| t == EXAM) {
        types.insert(0, EXAM.to_string());
    }
    types
}

/// Grade recorded against an assessment. The wire form is a free string:
/// anything that parses as a finite number is numeric, the rest is a letter grade.
#[derive(SerializeDisplay, Debug, Clone, PartialEq)]
pub enum Grade {
    Numeric(f64),
    Letter(String),
}

impl Grade {
    pub fn as_numeric(&self) -> Option<f64> {
        match self {
            Grade::Numeric(v) => Some(*v),
            Grade::Letter(_) => None,
        }
    }
}

impl FromStr for Grade {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Ok(match s.parse::<f64>() {
            Ok(v) if v.is_finite() => Grade::Numeric(v),
            _ => Grade::Letter(s.to_string()),
        })
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Grade::Numeric(v) => write!(f, "{v}"),
            Grade::Letter(code) => f.write_str(code),
        }
    }
}

// Accepts null, a JSON number or a string; blank strings read as "no grade".
fn deserialize_grade<'de, D>(deserializer: D) -> Result<Option<Grade>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawGrade {
        Number(f64),
        Text(String),
    }

    Ok(match Option::<RawGrade>::deserialize(deserializer)? {
        None => None,
        Some(RawGrade::Number(v)) => Some(Grade::Numeric(v)),
        Some(RawGrade::Text(s)) if s.trim().is_empty() => None,
        Some(RawGrade::Text(s)) => s.parse().ok(),
    })
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Assessment {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "deserialize_grade")]
    pub grade: Option<Grade>,
    #[serde(default)]
    pub subject_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GradeEntry {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub score: f64,
    pub total_points: f64,
    pub category: String,
    #[serde(default)]
    pub subject_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StudySession {
    #[serde(default)]
    pub id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_seconds: i64,
    pub subject: String,
    #[serde(default)]
    pub semester_id: String,
}

/// Whole seconds between start and end, never negative.
pub fn derive_duration(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    (end - start).num_seconds().max(0)
}

// --- request payloads ---

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CreateSemesterReq {
    pub name: String,
    #[serde(default)]
    pub archived: bool,
}

/// `archived` is always applied; a missing flag reads as `false`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UpdateSemesterReq {
    pub name: Option<String>,
    #[serde(default)]
    pub archived: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubjectReq {
    pub name: String,
    #[serde(default)]
    pub semester_id: String,
    pub grade_weights: Option<BTreeMap<String, f64>>,
    pub assignment_types: Option<Vec<String>>,
    pub total_exams: Option<u32>,
}

impl CreateSubjectReq {
    pub fn into_subject(self) -> Subject {
        let mut subject = Subject::new(self.name, self.semester_id);
        if let Some(weights) = self.grade_weights {
            subject.grade_weights = weights;
        }
        if let Some(types) = self.assignment_types {
            subject.assignment_types = ensure_exam(types);
        }
        if let Some(total) = self.total_exams {
            subject.total_exams = total;
        }
        subject
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SubjectConfigReq {
    #[serde(default)]
    pub weights: BTreeMap<String, f64>,
    #[serde(default)]
    pub total_exams: u32,
}

/// Used for both create and update; `subjectId` is ignored on update.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentReq {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "deserialize_grade")]
    pub grade: Option<Grade>,
    #[serde(default)]
    pub subject_id: String,
}

impl AssessmentReq {
    pub fn into_assessment(self) -> Assessment {
        Assessment {
            id: String::new(),
            name: self.name,
            kind: self.kind,
            date: self.date,
            grade: self.grade,
            subject_id: self.subject_id,
        }
    }

    pub fn apply_to(self, assessment: &mut Assessment) {
        assessment.name = self.name;
        assessment.kind = self.kind;
        assessment.date = self.date;
        assessment.grade = self.grade;
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct GradeEntryReq {
    pub name: String,
    pub score: f64,
    pub total_points: f64,
    pub category: String,
    #[serde(default)]
    pub subject_id: String,
}

impl GradeEntryReq {
    pub fn into_entry(self) -> GradeEntry {
        GradeEntry {
            id: String::new(),
            name: self.name,
            score: self.score,
            total_points: self.total_points,
            category: self.category,
            subject_id: self.subject_id,
        }
    }

    pub fn apply_to(self, entry: &mut GradeEntry) {
        entry.name = self.name;
        entry.score = self.score;
        entry.total_points = self.total_points;
        entry.category = self.category;
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct StudySessionReq {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_seconds: Option<i64>,
    pub subject: String,
    #[serde(default)]
    pub semester_id: String,
}

impl StudySessionReq {
    fn duration(&self) -> i64 {
        self.duration_seconds
            .unwrap_or_else(|| derive_duration(self.start_time, self.end_time))
    }

    pub fn into_session(self) -> StudySession {
        StudySession {
            id: String::new(),
            duration_seconds: self.duration(),
            start_time: self.start_time,
            end_time: self.end_time,
            subject: self.subject,
            semester_id: self.semester_id,
        }
    }

    pub fn apply_to(self, session: &mut StudySession) {
        session.duration_seconds = self.duration();
        session.start_time = self.start_time;
        session.end_time = self.end_time;
        session.subject = self.subject;
    }
}

// --- store bindings ---

macro_rules! document {
    ($ty:ty, $collection:literal, $entity:literal) => {
        impl Document for $ty {
            const COLLECTION: &'static str = $collection;
            const ENTITY: &'static str = $entity;

            fn id(&self) -> &str {
                &self.id
            }

            fn set_id(&mut self, id: String) {
                self.id = id;
            }
        }
    };
}

document!(Semester, "semesters", "Semester");
document!(Subject, "subjects", "Subject");
document!(Assessment, "assessments", "Assessment");
document!(GradeEntry, "grade_entries", "Grade entry");
document!(StudySession, "sessions", "Study session");
