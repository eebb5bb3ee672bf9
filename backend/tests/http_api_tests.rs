//! REST API tests driven through `axum_test::TestServer`.

#![cfg(feature = "http-server")]

mod support;

use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::{TestRequest, TestServer};
use serde_json::json;

use bkd_backend::api::{AssignmentOutcome, AssignmentReceipt, Course, InstructorLoad, UserId};
use bkd_backend::db::{services, FullRepository, LocalRepository};
use bkd_backend::http::dto::{
    CascadeReport, CourseListResponse, SemesterDetailResponse, SemesterDto, SemesterListResponse,
    SetActiveResponse, UserDto, UserListResponse,
};
use bkd_backend::http::{create_router, ApiError, AppState, USER_ID_HEADER};

struct Api {
    server: TestServer,
    admin: UserId,
    alice: UserId,
    bob: UserId,
}

impl Api {
    async fn new() -> Self {
        let repo = Arc::new(LocalRepository::new());
        let admin = services::ensure_admin(repo.as_ref(), "Administrator", "ADM")
            .await
            .unwrap();
        let server = TestServer::new(create_router(AppState::new(
            repo as Arc<dyn FullRepository>,
        )))
        .unwrap();

        let mut api = Self {
            server,
            admin: admin.id,
            alice: admin.id,
            bob: admin.id,
        };
        api.alice = api.create_user("Alice Lestari", "ALC").await;
        api.bob = api.create_user("Bob Santoso", "BOB").await;
        api
    }

    fn as_user(request: TestRequest, user: UserId) -> TestRequest {
        request.add_header(
            HeaderName::from_static(USER_ID_HEADER),
            HeaderValue::from_str(&user.to_string()).unwrap(),
        )
    }

    async fn create_user(&self, name: &str, initials: &str) -> UserId {
        let response = Self::as_user(self.server.post("/v1/users"), self.admin)
            .json(&json!({ "name": name, "initials": initials }))
            .await;
        response.assert_status(StatusCode::CREATED);
        response.json::<UserDto>().id
    }

    /// Draft semester with one course, then activated.
    async fn open_semester(&self) -> (SemesterDto, Course) {
        let response = Self::as_user(self.server.post("/v1/semesters"), self.admin)
            .json(&json!({ "date": "2024-08-26" }))
            .await;
        response.assert_status(StatusCode::CREATED);
        let semester: SemesterDto = response.json();

        let response = Self::as_user(self.server.post("/v1/courses"), self.admin)
            .json(&json!({
                "semester_id": semester.id,
                "code": "IF2211",
                "name": "Algorithm Strategies",
                "course_types": [
                    { "kind": "lecture", "credit": 3.0, "class_count": 2, "meetings": 2 },
                    { "kind": "practicum", "credit": 1.0, "class_count": 1 },
                    { "kind": "tutorial", "credit": 0.0, "class_count": 1 }
                ]
            }))
            .await;
        response.assert_status(StatusCode::CREATED);
        let course: Course = response.json();

        let path = format!("/v1/semesters/{}/activate", semester.id);
        let response = Self::as_user(self.server.put(&path), self.admin).await;
        response.assert_status_ok();
        (response.json(), course)
    }
}

#[tokio::test]
async fn test_identity_gate() {
    let api = Api::new().await;

    api.server
        .get("/v1/semesters")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    let response = api
        .server
        .get("/v1/semesters")
        .add_header(
            HeaderName::from_static(USER_ID_HEADER),
            HeaderValue::from_static("not-a-number"),
        )
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);
    assert_eq!(response.json::<ApiError>().code, "UNAUTHORIZED");

    Api::as_user(api.server.get("/v1/semesters"), UserId::new(9999))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    let response = Api::as_user(api.server.get("/v1/users/me"), api.alice).await;
    response.assert_status_ok();
    let me: UserDto = response.json();
    assert_eq!(me.initials, "ALC");
    assert!(me.under_loaded);
}

#[tokio::test]
async fn test_admin_routes_reject_instructors() {
    let api = Api::new().await;

    let response = Api::as_user(api.server.post("/v1/semesters"), api.alice)
        .json(&json!({ "date": "2024-08-26" }))
        .await;
    response.assert_status(StatusCode::FORBIDDEN);
    assert_eq!(response.json::<ApiError>().code, "FORBIDDEN");

    Api::as_user(api.server.get("/v1/users"), api.alice)
        .await
        .assert_status(StatusCode::FORBIDDEN);

    let users: UserListResponse = Api::as_user(api.server.get("/v1/users"), api.admin)
        .await
        .json();
    assert_eq!(users.total, 3);
}

#[tokio::test]
async fn test_semester_and_catalog_reads() {
    let api = Api::new().await;
    let (semester, course) = api.open_semester().await;
    assert!(semester.is_active);
    assert_eq!(semester.display_name, "Odd 2024/2025");

    // The zero-credit tutorial is filtered out.
    assert_eq!(course.course_types.len(), 2);
    assert_eq!(course.slot_count(), 5);

    let list: SemesterListResponse = Api::as_user(api.server.get("/v1/semesters"), api.bob)
        .await
        .json();
    assert_eq!(list.total, 1);

    let detail: SemesterDetailResponse = Api::as_user(
        api.server.get(&format!("/v1/semesters/{}", semester.id)),
        api.bob,
    )
    .await
    .json();
    assert_eq!(detail.courses.len(), 1);

    let courses: CourseListResponse = Api::as_user(api.server.get("/v1/courses"), api.bob)
        .await
        .json();
    assert_eq!(courses.courses[0].code, "IF2211");

    let section = course.course_types[0].classes[0].id;
    let response = Api::as_user(
        api.server.get(&format!("/v1/courses/class/{}", section)),
        api.bob,
    )
    .await;
    response.assert_status_ok();

    Api::as_user(api.server.get("/v1/courses/424242"), api.bob)
        .await
        .assert_status(StatusCode::NOT_FOUND);

    Api::as_user(api.server.get("/v1/courses/abc"), api.bob)
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_claim_release_and_reassign() {
    let api = Api::new().await;
    let (semester, course) = api.open_semester().await;
    let slot = course.course_types[0].classes[0].slots[0].id;
    let path = format!("/v1/slots/{}", slot);

    let response = Api::as_user(api.server.put(&path), api.alice).await;
    response.assert_status_ok();
    let receipt: AssignmentReceipt = response.json();
    assert_eq!(receipt.outcome, AssignmentOutcome::Claimed);
    assert_eq!(receipt.loads[0].bkd, 3.0);

    let repeat: AssignmentReceipt = Api::as_user(api.server.put(&path), api.alice)
        .await
        .json();
    assert_eq!(repeat.outcome, AssignmentOutcome::AlreadyAssigned);

    let response = Api::as_user(api.server.put(&path), api.bob).await;
    response.assert_status(StatusCode::CONFLICT);
    assert_eq!(response.json::<ApiError>().code, "CONFLICT");

    Api::as_user(api.server.delete(&path), api.bob)
        .await
        .assert_status(StatusCode::FORBIDDEN);

    let response = Api::as_user(api.server.put(&format!("{}/assignee", path)), api.admin)
        .json(&json!({ "user_id": api.bob }))
        .await;
    response.assert_status_ok();
    let moved: AssignmentReceipt = response.json();
    assert_eq!(moved.slot.occupant, Some(api.bob));
    assert_eq!(moved.slot.occupant_initials.as_deref(), Some("BOB"));

    let load: InstructorLoad = Api::as_user(
        api.server
            .get(&format!("/v1/users/{}/semesters/{}", api.bob, semester.id)),
        api.bob,
    )
    .await
    .json();
    assert_eq!(load.bkd, 3.0);

    Api::as_user(
        api.server
            .get(&format!("/v1/users/{}/semesters/{}", api.bob, semester.id)),
        api.alice,
    )
    .await
    .assert_status(StatusCode::FORBIDDEN);

    let released: AssignmentReceipt = Api::as_user(api.server.delete(&path), api.bob)
        .await
        .json();
    assert_eq!(released.outcome, AssignmentOutcome::Released);

    let loads: Vec<InstructorLoad> = Api::as_user(
        api.server
            .get(&format!("/v1/semesters/{}/loads", semester.id)),
        api.admin,
    )
    .await
    .json();
    assert!(loads.iter().all(|l| l.bkd == 0.0 && l.under_loaded));
}

#[tokio::test]
async fn test_archived_semester_reports_semester_closed() {
    let api = Api::new().await;
    let (old, course) = api.open_semester().await;
    let slot = course.course_types[1].classes[0].slots[0].id;

    let next: SemesterDto = Api::as_user(api.server.post("/v1/semesters"), api.admin)
        .json(&json!({ "date": "2025-02-03" }))
        .await
        .json();
    Api::as_user(
        api.server
            .put(&format!("/v1/semesters/{}/activate", next.id)),
        api.admin,
    )
    .await
    .assert_status_ok();

    let response = Api::as_user(
        api.server
            .put(&format!("/v1/slots/{}/assignee", slot)),
        api.admin,
    )
    .json(&json!({ "user_id": api.alice }))
    .await;
    response.assert_status(StatusCode::CONFLICT);
    assert_eq!(response.json::<ApiError>().code, "SEMESTER_CLOSED");

    let report: CascadeReport = Api::as_user(
        api.server.delete(&format!("/v1/semesters/{}", old.id)),
        api.admin,
    )
    .await
    .json();
    assert_eq!(report.courses_removed, 1);
    assert_eq!(report.slots_removed, 5);

    let response = Api::as_user(
        api.server.delete(&format!("/v1/semesters/{}", next.id)),
        api.admin,
    )
    .await;
    response.assert_status(StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_deactivated_user_is_locked_out() {
    let api = Api::new().await;
    let (semester, course) = api.open_semester().await;
    let slot = course.course_types[1].classes[0].slots[0].id;
    Api::as_user(api.server.put(&format!("/v1/slots/{}", slot)), api.bob)
        .await
        .assert_status_ok();

    let response = Api::as_user(
        api.server.put(&format!("/v1/users/{}/active", api.bob)),
        api.admin,
    )
    .json(&json!({ "is_active": false }))
    .await;
    response.assert_status_ok();
    let change: SetActiveResponse = response.json();
    assert!(!change.user.is_active);
    assert_eq!(change.loads.len(), 1);
    assert_eq!(change.loads[0].semester_id, semester.id);

    let response = Api::as_user(api.server.get("/v1/users/me"), api.bob).await;
    response.assert_status(StatusCode::FORBIDDEN);

    let response = Api::as_user(api.server.post("/v1/users"), api.admin)
        .json(&json!({ "name": "Dup", "initials": "bob" }))
        .await;
    response.assert_status(StatusCode::CONFLICT);

    let response = Api::as_user(api.server.post("/v1/users"), api.admin)
        .json(&json!({ "name": "Short", "initials": "B" }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<ApiError>().code, "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_malformed_bodies_are_bad_requests() {
    let api = Api::new().await;

    let response = Api::as_user(api.server.post("/v1/semesters"), api.admin)
        .json(&json!({ "date": "26/08/2024" }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<ApiError>().code, "BAD_REQUEST");

    let response = Api::as_user(api.server.post("/v1/courses"), api.admin)
        .json(&json!({ "semester_id": 1, "code": "X", "name": "Y",
                       "course_types": [{ "kind": "seminar", "credit": 1.0, "class_count": 1 }] }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}
