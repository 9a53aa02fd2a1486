use axum::{
    extract::{FromRequest, FromRequestParts, Path, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use serde::Deserialize;

use crate::{
    error::AppError,
    grading::{self, GradeSummary},
    models::*,
    sessions::{self, StudyTimeSummary},
    store::{load, SecondaryKey, Store},
};

/// JSON body whose rejections render as `AppError` (400).
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// Query string whose rejections render as `AppError` (400).
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct ApiQuery<T>(pub T);

type ApiResult<T> = Result<T, AppError>;

#[derive(Deserialize, Debug, Default)]
struct SemesterFilter {
    archived: Option<bool>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct BySemester {
    semester_id: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct BySubject {
    subject_id: Option<String>,
}

pub fn router<S: Store>(store: S) -> Router {
    Router::new()
        // semesters
        .route("/api/semesters", get(list_semesters::<S>).post(create_semester::<S>))
        .route("/api/semesters/:id", put(update_semester::<S>).delete(delete_semester::<S>))
        // subjects
        .route("/api/subjects", get(list_subjects::<S>).post(create_subject::<S>))
        .route("/api/subjects/:id", get(get_subject::<S>).delete(delete_subject::<S>))
        .route("/api/subjects/:id/types", put(update_subject_types::<S>))
        .route("/api/subjects/:id/config", put(update_subject_config::<S>))
        .route("/api/subjects/:id/grade", get(subject_grade::<S>))
        // assessments
        .route("/api/assessments", get(list_assessments::<S>).post(create_assessment::<S>))
        .route("/api/assessments/:id", put(update_assessment::<S>).delete(delete_assessment::<S>))
        // grade entries
        .route("/api/grades", get(list_grades::<S>).post(create_grade::<S>))
        .route("/api/grades/:id", put(update_grade::<S>).delete(delete_grade::<S>))
        // study sessions
        .route("/api/sessions", get(list_sessions::<S>).post(create_session::<S>))
        .route("/api/sessions/summary", get(session_summary::<S>))
        .route("/api/sessions/:id", put(update_session::<S>).delete(delete_session::<S>))
        .with_state(store)
}

async fn list_by_subject<S: Store, T: crate::store::Document>(
    store: &S,
    filter: BySubject,
) -> ApiResult<Vec<T>> {
    match filter.subject_id {
        Some(id) => store.find_by(SecondaryKey::SubjectId, &id).await,
        None => store.find_all().await,
    }
}

async fn list_by_semester<S: Store, T: crate::store::Document>(
    store: &S,
    filter: BySemester,
) -> ApiResult<Vec<T>> {
    match filter.semester_id {
        Some(id) => store.find_by(SecondaryKey::SemesterId, &id).await,
        None => store.find_all().await,
    }
}

// --- semesters ---

async fn list_semesters<S: Store>(
    State(store): State<S>,
    ApiQuery(filter): ApiQuery<SemesterFilter>,
) -> ApiResult<Json<Vec<Semester>>> {
    let mut semesters: Vec<Semester> = store.find_all().await?;
    if let Some(archived) = filter.archived {
        semesters.retain(|s| s.archived == archived);
    }
    Ok(Json(semesters))
}

async fn create_semester<S: Store>(
    State(store): State<S>,
    ApiJson(req): ApiJson<CreateSemesterReq>,
) -> ApiResult<(StatusCode, Json<Semester>)> {
    let semester = store
        .insert(Semester { id: String::new(), name: req.name, archived: req.archived })
        .await?;
    tracing::info!(id=%semester.id, name=%semester.name, "semester created");
    Ok((StatusCode::CREATED, Json(semester)))
}

async fn update_semester<S: Store>(
    State(store): State<S>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpdateSemesterReq>,
) -> ApiResult<Json<Semester>> {
    let mut semester: Semester = load(&store, &id).await?;
    if let Some(name) = req.name.filter(|n| !n.is_empty()) {
        semester.name = name;
    }
    semester.archived = req.archived;
    Ok(Json(store.update(semester).await?))
}

async fn delete_semester<S: Store>(
    State(store): State<S>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    store.delete::<Semester>(&id).await?;
    tracing::info!(%id, "semester deleted");
    Ok(StatusCode::NO_CONTENT)
}

// --- subjects ---

async fn list_subjects<S: Store>(
    State(store): State<S>,
    ApiQuery(filter): ApiQuery<BySemester>,
) -> ApiResult<Json<Vec<Subject>>> {
    Ok(Json(list_by_semester(&store, filter).await?))
}

async fn get_subject<S: Store>(
    State(store): State<S>,
    Path(id): Path<String>,
) -> ApiResult<Json<Subject>> {
    Ok(Json(load(&store, &id).await?))
}

async fn create_subject<S: Store>(
    State(store): State<S>,
    ApiJson(req): ApiJson<CreateSubjectReq>,
) -> ApiResult<(StatusCode, Json<Subject>)> {
    let subject = store.insert(req.into_subject()).await?;
    tracing::info!(id=%subject.id, semester_id=%subject.semester_id, "subject created");
    Ok((StatusCode::CREATED, Json(subject)))
}

async fn delete_subject<S: Store>(
    State(store): State<S>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    // assessments and grade entries are left in place
    store.delete::<Subject>(&id).await?;
    tracing::info!(%id, "subject deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn update_subject_types<S: Store>(
    State(store): State<S>,
    Path(id): Path<String>,
    ApiJson(types): ApiJson<Vec<String>>,
) -> ApiResult<Json<Subject>> {
    let mut subject: Subject = load(&store, &id).await?;
    subject.assignment_types = ensure_exam(types);
    Ok(Json(store.update(subject).await?))
}

async fn update_subject_config<S: Store>(
    State(store): State<S>,
    Path(id): Path<String>,
    ApiJson(config): ApiJson<SubjectConfigReq>,
) -> ApiResult<Json<Subject>> {
    let mut subject: Subject = load(&store, &id).await?;
    subject.grade_weights = config.weights;
    subject.total_exams = config.total_exams;
    Ok(Json(store.update(subject).await?))
}

async fn subject_grade<S: Store>(
    State(store): State<S>,
    Path(id): Path<String>,
) -> ApiResult<Json<GradeSummary>> {
    let subject: Subject = load(&store, &id).await?;
    let entries: Vec<GradeEntry> = store.find_by(SecondaryKey::SubjectId, &id).await?;
    let assessments: Vec<Assessment> = store.find_by(SecondaryKey::SubjectId, &id).await?;

    let summary = grading::compute_grade(&subject, &entries, &assessments)?;
    for warning in &summary.warnings {
        tracing::warn!(subject_id=%id, %warning, "grade entry excluded");
    }
    Ok(Json(summary))
}

// --- assessments ---

async fn list_assessments<S: Store>(
    State(store): State<S>,
    ApiQuery(filter): ApiQuery<BySubject>,
) -> ApiResult<Json<Vec<Assessment>>> {
    Ok(Json(list_by_subject(&store, filter).await?))
}

async fn create_assessment<S: Store>(
    State(store): State<S>,
    ApiJson(req): ApiJson<AssessmentReq>,
) -> ApiResult<(StatusCode, Json<Assessment>)> {
    let assessment = store.insert(req.into_assessment()).await?;
    Ok((StatusCode::CREATED, Json(assessment)))
}

async fn update_assessment<S: Store>(
    State(store): State<S>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<AssessmentReq>,
) -> ApiResult<Json<Assessment>> {
    let mut assessment: Assessment = load(&store, &id).await?;
    req.apply_to(&mut assessment);
    Ok(Json(store.update(assessment).await?))
}

async fn delete_assessment<S: Store>(
    State(store): State<S>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    store.delete::<Assessment>(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- grade entries ---

async fn list_grades<S: Store>(
    State(store): State<S>,
    ApiQuery(filter): ApiQuery<BySubject>,
) -> ApiResult<Json<Vec<GradeEntry>>> {
    Ok(Json(list_by_subject(&store, filter).await?))
}

async fn create_grade<S: Store>(
    State(store): State<S>,
    ApiJson(req): ApiJson<GradeEntryReq>,
) -> ApiResult<(StatusCode, Json<GradeEntry>)> {
    let entry = store.insert(req.into_entry()).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn update_grade<S: Store>(
    State(store): State<S>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<GradeEntryReq>,
) -> ApiResult<Json<GradeEntry>> {
    let mut entry: GradeEntry = load(&store, &id).await?;
    req.apply_to(&mut entry);
    Ok(Json(store.update(entry).await?))
}

async fn delete_grade<S: Store>(
    State(store): State<S>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    store.delete::<GradeEntry>(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- study sessions ---

async fn list_sessions<S: Store>(
    State(store): State<S>,
    ApiQuery(filter): ApiQuery<BySemester>,
) -> ApiResult<Json<Vec<StudySession>>> {
    Ok(Json(list_by_semester(&store, filter).await?))
}

async fn create_session<S: Store>(
    State(store): State<S>,
    ApiJson(req): ApiJson<StudySessionReq>,
) -> ApiResult<(StatusCode, Json<StudySession>)> {
    let session = store.insert(req.into_session()).await?;
    tracing::info!(
        id=%session.id,
        subject=%session.subject,
        seconds=session.duration_seconds,
        "study session recorded"
    );
    Ok((StatusCode::CREATED, Json(session)))
}

async fn update_session<S: Store>(
    State(store): State<S>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<StudySessionReq>,
) -> ApiResult<Json<StudySession>> {
    let mut session: StudySession = load(&store, &id).await?;
    req.apply_to(&mut session);
    Ok(Json(store.update(session).await?))
}

async fn delete_session<S: Store>(
    State(store): State<S>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    store.delete::<StudySession>(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn session_summary<S: Store>(
    State(store): State<S>,
    ApiQuery(filter): ApiQuery<BySemester>,
) -> ApiResult<Json<StudyTimeSummary>> {
    let semester_id = filter.semester_id.clone();
    let all: Vec<StudySession> = list_by_semester(&store, filter).await?;
    Ok(Json(sessions::summarize(semester_id, &all)))
}
