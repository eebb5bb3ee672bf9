//! HTTP handlers for the REST API.
//!
//! Each handler corresponds to an API endpoint and delegates to
//! [`crate::db::services`], which holds the role checks. Every handler
//! except `/health` requires a [`CurrentUser`].

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use tracing::info;

use super::auth::CurrentUser;
use super::dto::{
    AssignmentReceipt, CascadeReport, Course, CourseClassDetail, CourseListQuery,
    CourseListResponse, CreateSemesterRequest, HealthResponse, InstructorLoad, LoadChange,
    NewCourse, NewUser, ReassignRequest, SemesterDetailResponse, SemesterDto,
    SemesterListResponse, SetActiveRequest, SetActiveResponse, Slot, UserDto, UserListResponse,
};
use super::error::AppError;
use super::state::AppState;
use crate::api::{CourseClassId, CourseId, SemesterId, SlotId, UserId};
use crate::db::services as db_services;

/// Result type for handlers.
pub type HandlerResult<T> = Result<Json<T>, AppError>;

type IdPath = Result<Path<i64>, PathRejection>;
type JsonBody<T> = Result<Json<T>, JsonRejection>;

fn path_id(path: IdPath) -> Result<i64, AppError> {
    Ok(path?.0)
}

fn body<T>(json: JsonBody<T>) -> Result<T, AppError> {
    Ok(json?.0)
}

// =============================================================================
// Health Check
// =============================================================================

/// GET /health
///
/// Health check endpoint to verify the service is running and the repository is reachable.
pub async fn health_check(State(state): State<AppState>) -> HandlerResult<HealthResponse> {
    let db_status = match db_services::health_check(state.repository.as_ref()).await {
        Ok(true) => "connected".to_string(),
        Ok(false) => "disconnected".to_string(),
        Err(e) => format!("error: {}", e),
    };

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        version: "v1".to_string(),
        database: db_status,
    }))
}

// =============================================================================
// Semesters
// =============================================================================

/// GET /v1/semesters
pub async fn list_semesters(
    State(state): State<AppState>,
    _user: CurrentUser,
) -> HandlerResult<SemesterListResponse> {
    let semesters: Vec<SemesterDto> = db_services::list_semesters(state.repository.as_ref())
        .await?
        .into_iter()
        .map(Into::into)
        .collect();
    let total = semesters.len();

    Ok(Json(SemesterListResponse { semesters, total }))
}

/// POST /v1/semesters
pub async fn create_semester(
    State(state): State<AppState>,
    current: CurrentUser,
    request: JsonBody<CreateSemesterRequest>,
) -> Result<(StatusCode, Json<SemesterDto>), AppError> {
    let request = body(request)?;
    let semester =
        db_services::create_semester(state.repository.as_ref(), &current.caller, request.date)
            .await?;

    Ok((StatusCode::CREATED, Json(semester.into())))
}

/// GET /v1/semesters/{id}
pub async fn get_semester(
    State(state): State<AppState>,
    _user: CurrentUser,
    id: IdPath,
) -> HandlerResult<SemesterDetailResponse> {
    let semester_id = SemesterId::new(path_id(id)?);
    let detail = db_services::get_semester(state.repository.as_ref(), semester_id).await?;
    Ok(Json(detail.into()))
}

/// PUT /v1/semesters/{id}/activate
pub async fn activate_semester(
    State(state): State<AppState>,
    current: CurrentUser,
    id: IdPath,
) -> HandlerResult<SemesterDto> {
    let semester_id = SemesterId::new(path_id(id)?);
    let semester =
        db_services::activate_semester(state.repository.as_ref(), &current.caller, semester_id)
            .await?;
    info!(semester = %semester_id, by = %current.user.initials, "Semester activated");
    Ok(Json(semester.into()))
}

/// DELETE /v1/semesters/{id}
pub async fn delete_semester(
    State(state): State<AppState>,
    current: CurrentUser,
    id: IdPath,
) -> HandlerResult<CascadeReport> {
    let semester_id = SemesterId::new(path_id(id)?);
    let report =
        db_services::delete_semester(state.repository.as_ref(), &current.caller, semester_id)
            .await?;
    Ok(Json(report))
}

/// GET /v1/semesters/{id}/loads
///
/// Every instructor's load in the semester, under-loaded ones flagged.
pub async fn semester_loads(
    State(state): State<AppState>,
    current: CurrentUser,
    id: IdPath,
) -> HandlerResult<Vec<InstructorLoad>> {
    let semester_id = SemesterId::new(path_id(id)?);
    let loads =
        db_services::semester_loads(state.repository.as_ref(), &current.caller, semester_id)
            .await?;
    Ok(Json(loads))
}

/// POST /v1/semesters/{id}/recompute
///
/// Rebuild every stored load of the semester from current holdings.
pub async fn recompute_semester(
    State(state): State<AppState>,
    current: CurrentUser,
    id: IdPath,
) -> HandlerResult<Vec<LoadChange>> {
    let semester_id = SemesterId::new(path_id(id)?);
    let changes =
        db_services::recompute_semester(state.repository.as_ref(), &current.caller, semester_id)
            .await?;
    Ok(Json(changes))
}

// =============================================================================
// Courses
// =============================================================================

/// GET /v1/courses?semester_id=
pub async fn list_courses(
    State(state): State<AppState>,
    _user: CurrentUser,
    query: Result<Query<CourseListQuery>, QueryRejection>,
) -> HandlerResult<CourseListResponse> {
    let Query(query) = query?;
    let courses = db_services::list_courses(
        state.repository.as_ref(),
        query.semester_id.map(SemesterId::new),
    )
    .await?;
    let total = courses.len();

    Ok(Json(CourseListResponse { courses, total }))
}

/// POST /v1/courses
pub async fn create_course(
    State(state): State<AppState>,
    current: CurrentUser,
    request: JsonBody<NewCourse>,
) -> Result<(StatusCode, Json<Course>), AppError> {
    let request = body(request)?;
    let course =
        db_services::create_course(state.repository.as_ref(), &current.caller, &request).await?;
    Ok((StatusCode::CREATED, Json(course)))
}

/// GET /v1/courses/{id}
pub async fn get_course(
    State(state): State<AppState>,
    _user: CurrentUser,
    id: IdPath,
) -> HandlerResult<Course> {
    let course_id = CourseId::new(path_id(id)?);
    Ok(Json(
        db_services::get_course(state.repository.as_ref(), course_id).await?,
    ))
}

/// DELETE /v1/courses/{id}
pub async fn delete_course(
    State(state): State<AppState>,
    current: CurrentUser,
    id: IdPath,
) -> HandlerResult<CascadeReport> {
    let course_id = CourseId::new(path_id(id)?);
    let report =
        db_services::delete_course(state.repository.as_ref(), &current.caller, course_id).await?;
    Ok(Json(report))
}

/// GET /v1/courses/class/{id}
pub async fn get_course_class(
    State(state): State<AppState>,
    _user: CurrentUser,
    id: IdPath,
) -> HandlerResult<CourseClassDetail> {
    let class_id = CourseClassId::new(path_id(id)?);
    Ok(Json(
        db_services::get_course_class(state.repository.as_ref(), class_id).await?,
    ))
}

/// DELETE /v1/courses/class/{id}
pub async fn delete_course_class(
    State(state): State<AppState>,
    current: CurrentUser,
    id: IdPath,
) -> HandlerResult<CascadeReport> {
    let class_id = CourseClassId::new(path_id(id)?);
    let report =
        db_services::delete_course_class(state.repository.as_ref(), &current.caller, class_id)
            .await?;
    Ok(Json(report))
}

// =============================================================================
// Slots
// =============================================================================

/// GET /v1/slots/{id}
pub async fn get_slot(
    State(state): State<AppState>,
    _user: CurrentUser,
    id: IdPath,
) -> HandlerResult<Slot> {
    let slot_id = SlotId::new(path_id(id)?);
    Ok(Json(
        db_services::get_slot(state.repository.as_ref(), slot_id).await?,
    ))
}

/// PUT /v1/slots/{id}
///
/// Claim the slot for the caller.
pub async fn claim_slot(
    State(state): State<AppState>,
    current: CurrentUser,
    id: IdPath,
) -> HandlerResult<AssignmentReceipt> {
    let slot_id = SlotId::new(path_id(id)?);
    let receipt =
        db_services::claim_slot(state.repository.as_ref(), &current.caller, slot_id).await?;
    Ok(Json(receipt))
}

/// DELETE /v1/slots/{id}
pub async fn release_slot(
    State(state): State<AppState>,
    current: CurrentUser,
    id: IdPath,
) -> HandlerResult<AssignmentReceipt> {
    let slot_id = SlotId::new(path_id(id)?);
    let receipt =
        db_services::release_slot(state.repository.as_ref(), &current.caller, slot_id).await?;
    Ok(Json(receipt))
}

/// PUT /v1/slots/{id}/assignee
pub async fn reassign_slot(
    State(state): State<AppState>,
    current: CurrentUser,
    id: IdPath,
    request: JsonBody<ReassignRequest>,
) -> HandlerResult<AssignmentReceipt> {
    let slot_id = SlotId::new(path_id(id)?);
    let request = body(request)?;
    let receipt = db_services::reassign_slot(
        state.repository.as_ref(),
        &current.caller,
        slot_id,
        request.user_id,
    )
    .await?;
    Ok(Json(receipt))
}

// =============================================================================
// Users
// =============================================================================

/// GET /v1/users
pub async fn list_users(
    State(state): State<AppState>,
    current: CurrentUser,
) -> HandlerResult<UserListResponse> {
    let users: Vec<UserDto> = db_services::list_users(state.repository.as_ref(), &current.caller)
        .await?
        .into_iter()
        .map(Into::into)
        .collect();
    let total = users.len();

    Ok(Json(UserListResponse { users, total }))
}

/// POST /v1/users
pub async fn create_user(
    State(state): State<AppState>,
    current: CurrentUser,
    request: JsonBody<NewUser>,
) -> Result<(StatusCode, Json<UserDto>), AppError> {
    let request = body(request)?;
    let user =
        db_services::create_user(state.repository.as_ref(), &current.caller, &request).await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

/// GET /v1/users/me
pub async fn current_user(current: CurrentUser) -> HandlerResult<UserDto> {
    Ok(Json(current.user.into()))
}

/// GET /v1/users/{id}/semesters
pub async fn user_semesters(
    State(state): State<AppState>,
    current: CurrentUser,
    id: IdPath,
) -> HandlerResult<Vec<InstructorLoad>> {
    let user_id = UserId::new(path_id(id)?);
    let loads =
        db_services::user_semesters(state.repository.as_ref(), &current.caller, user_id).await?;
    Ok(Json(loads))
}

/// GET /v1/users/{id}/semesters/{semester_id}
pub async fn instructor_load(
    State(state): State<AppState>,
    current: CurrentUser,
    ids: Result<Path<(i64, i64)>, PathRejection>,
) -> HandlerResult<InstructorLoad> {
    let Path((user_id, semester_id)) = ids?;
    let load = db_services::instructor_load(
        state.repository.as_ref(),
        &current.caller,
        UserId::new(user_id),
        SemesterId::new(semester_id),
    )
    .await?;
    Ok(Json(load))
}

/// PUT /v1/users/{id}/active
pub async fn set_user_active(
    State(state): State<AppState>,
    current: CurrentUser,
    id: IdPath,
    request: JsonBody<SetActiveRequest>,
) -> HandlerResult<SetActiveResponse> {
    let user_id = UserId::new(path_id(id)?);
    let request = body(request)?;
    let (user, loads) = db_services::set_user_active(
        state.repository.as_ref(),
        &current.caller,
        user_id,
        request.is_active,
    )
    .await?;

    Ok(Json(SetActiveResponse {
        user: user.into(),
        loads,
    }))
}
