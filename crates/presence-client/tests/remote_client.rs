use axum::extract::{Multipart, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::NaiveDate;
use presence_client::RemoteServiceClient;
use presence_core::{
    AttendanceService, CaptureTarget, Completion, DateRange, DirectoryDownloader, ImageCapture,
    ImageSource, ServiceError, UserIdentity, WorkflowController,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// One request as the fake backend saw it.
#[derive(Debug, Clone)]
enum Seen {
    Multipart { path: &'static str, fields: Vec<Field> },
    Json { path: &'static str, body: Value },
    Query { path: &'static str, params: HashMap<String, String> },
    Plain { path: &'static str },
}

#[derive(Debug, Clone)]
struct Field {
    name: String,
    file_name: Option<String>,
    content_type: Option<String>,
    data: Vec<u8>,
}

type Log = Arc<Mutex<Vec<Seen>>>;

async fn read_fields(mut multipart: Multipart) -> Vec<Field> {
    let mut fields = Vec::new();
    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await.unwrap().to_vec();
        fields.push(Field {
            name,
            file_name,
            content_type,
            data,
        });
    }
    fields
}

async fn register(State(log): State<Log>, multipart: Multipart) -> Json<Value> {
    let fields = read_fields(multipart).await;
    let user = fields
        .iter()
        .find(|f| f.name == "user_id")
        .map(|f| String::from_utf8(f.data.clone()).unwrap())
        .unwrap_or_default();
    log.lock().unwrap().push(Seen::Multipart {
        path: "/register",
        fields,
    });
    Json(json!({ "message": format!("User {user} registered successfully") }))
}

async fn predict(State(log): State<Log>, multipart: Multipart) -> Json<Value> {
    let fields = read_fields(multipart).await;
    log.lock().unwrap().push(Seen::Multipart {
        path: "/predict",
        fields,
    });
    Json(json!({ "user_id": "bob", "confidence": 0.93 }))
}

async fn attendance(State(log): State<Log>, Json(body): Json<Value>) -> Json<Value> {
    log.lock().unwrap().push(Seen::Json {
        path: "/attendance",
        body,
    });
    Json(json!({ "message": "Attendance logged" }))
}

async fn report(
    State(log): State<Log>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    log.lock().unwrap().push(Seen::Query {
        path: "/attendance_report",
        params,
    });
    (
        [("content-type", "text/csv")],
        "user_id,timestamp\nbob,2024-01-02 09:00:00\n",
    )
}

async fn list_users(State(log): State<Log>) -> Json<Value> {
    log.lock().unwrap().push(Seen::Plain { path: "/list_users" });
    Json(json!({ "users": [{ "user_id": "a" }, { "user_id": "b", "images": 3 }] }))
}

async fn delete_user(State(log): State<Log>, Json(body): Json<Value>) -> Json<Value> {
    log.lock().unwrap().push(Seen::Json {
        path: "/delete_user",
        body,
    });
    Json(json!({ "message": "deleted" }))
}

fn happy_backend(log: Log) -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/predict", post(predict))
        .route("/attendance", post(attendance))
        .route("/attendance_report", get(report))
        .route("/list_users", get(list_users))
        .route("/delete_user", delete(delete_user))
        .with_state(log)
}

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn happy_client() -> (RemoteServiceClient, Log) {
    let log = Log::default();
    let url = serve(happy_backend(log.clone())).await;
    (RemoteServiceClient::new(&url).unwrap(), log)
}

fn jpeg() -> ImageCapture {
    ImageCapture::new(
        vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10],
        "image/jpeg",
        "captured_photo.jpg",
        ImageSource::Camera,
    )
    .unwrap()
}

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn seen(log: &Log) -> Vec<Seen> {
    log.lock().unwrap().clone()
}

#[tokio::test]
async fn register_sends_multipart_and_returns_message() {
    let (client, log) = happy_client().await;

    let message = client
        .register(&UserIdentity::new("alice123"), &jpeg())
        .await
        .unwrap();
    assert_eq!(message, "User alice123 registered successfully");

    let requests = seen(&log);
    let Seen::Multipart { path, fields } = &requests[0] else {
        panic!("expected multipart, got {requests:?}");
    };
    assert_eq!(*path, "/register");
    assert_eq!(fields.len(), 2);

    let user = fields.iter().find(|f| f.name == "user_id").unwrap();
    assert_eq!(user.data, b"alice123");
    assert!(user.file_name.is_none());

    let image = fields.iter().find(|f| f.name == "images").unwrap();
    assert_eq!(image.file_name.as_deref(), Some("captured_photo.jpg"));
    assert_eq!(image.content_type.as_deref(), Some("image/jpeg"));
    assert_eq!(image.data, jpeg().payload());
}

#[tokio::test]
async fn predict_sends_image_field() {
    let (client, log) = happy_client().await;

    let identity = client.predict(&jpeg()).await.unwrap();
    assert_eq!(identity.as_str(), "bob");

    let requests = seen(&log);
    let Seen::Multipart { path, fields } = &requests[0] else {
        panic!("expected multipart, got {requests:?}");
    };
    assert_eq!(*path, "/predict");
    assert_eq!(fields.len(), 1);
    assert_eq!(fields[0].name, "image");
}

#[tokio::test]
async fn attendance_and_delete_send_json_user_id() {
    let (client, log) = happy_client().await;

    client
        .record_attendance(&UserIdentity::new("bob"))
        .await
        .unwrap();
    client.delete_user(&UserIdentity::new("carol")).await.unwrap();

    let requests = seen(&log);
    assert!(matches!(
        &requests[0],
        Seen::Json { path: "/attendance", body } if body == &json!({ "user_id": "bob" })
    ));
    assert!(matches!(
        &requests[1],
        Seen::Json { path: "/delete_user", body } if body == &json!({ "user_id": "carol" })
    ));
}

#[tokio::test]
async fn report_uses_date_only_query() {
    let (client, log) = happy_client().await;
    let range = DateRange::new(date("2024-01-01"), date("2024-01-31")).unwrap();

    let csv = client.generate_report(&range).await.unwrap();
    assert!(csv.starts_with(b"user_id,timestamp\n"));

    let requests = seen(&log);
    let Seen::Query { path, params } = &requests[0] else {
        panic!("expected query, got {requests:?}");
    };
    assert_eq!(*path, "/attendance_report");
    assert_eq!(params.len(), 2);
    assert_eq!(params["start_date"], "2024-01-01");
    assert_eq!(params["end_date"], "2024-01-31");
}

#[tokio::test]
async fn list_users_keeps_order() {
    let (client, _log) = happy_client().await;
    let users = client.list_users().await.unwrap();
    let ids: Vec<&str> = users.iter().map(|u| u.user_id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b"]);
}

#[tokio::test]
async fn server_errors_carry_structured_body() {
    let app = Router::new()
        .route(
            "/register",
            post(|| async {
                (
                    StatusCode::CONFLICT,
                    Json(json!({ "error": "User already exists" })),
                )
            }),
        )
        .route(
            "/predict",
            post(|| async {
                (
                    StatusCode::NOT_FOUND,
                    Json(json!({ "message": "No matching face found" })),
                )
            }),
        )
        .route(
            "/list_users",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "<html>oops</html>") }),
        );
    let client = RemoteServiceClient::new(&serve(app).await).unwrap();

    let err = client
        .register(&UserIdentity::new("alice123"), &jpeg())
        .await
        .unwrap_err();
    let ServiceError::Server { status, body } = &err else {
        panic!("expected server error, got {err:?}");
    };
    assert_eq!(*status, 409);
    assert_eq!(body.error.as_deref(), Some("User already exists"));

    let err = client.predict(&jpeg()).await.unwrap_err();
    assert_eq!(
        err.body().and_then(|b| b.message_first()),
        Some("No matching face found")
    );

    let err = client.list_users().await.unwrap_err();
    assert!(matches!(err, ServiceError::Server { status: 500, .. }));
    assert_eq!(err.body().and_then(|b| b.error_first()), None);
}

#[tokio::test]
async fn unexpected_success_bodies_are_malformed() {
    let app = Router::new()
        .route("/register", post(|| async { Json(json!({ "ok": true })) }))
        .route("/predict", post(|| async { Json(json!({ "user_id": "" })) }))
        .route("/list_users", get(|| async { Json(json!({ "users": "a,b" })) }));
    let client = RemoteServiceClient::new(&serve(app).await).unwrap();

    assert!(matches!(
        client.register(&UserIdentity::new("x"), &jpeg()).await,
        Err(ServiceError::MalformedResponse(_))
    ));
    assert!(matches!(
        client.predict(&jpeg()).await,
        Err(ServiceError::MalformedResponse(_))
    ));
    assert!(matches!(
        client.list_users().await,
        Err(ServiceError::MalformedResponse(_))
    ));
}

#[tokio::test]
async fn unreachable_backend_is_network_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = RemoteServiceClient::new(&format!("http://{addr}")).unwrap();
    assert!(matches!(
        client.list_users().await,
        Err(ServiceError::Network(_))
    ));
}

#[tokio::test]
async fn identify_and_log_against_backend() {
    let (client, log) = happy_client().await;
    let downloads = tempfile::tempdir().unwrap();
    let controller = WorkflowController::new(client, DirectoryDownloader::new(downloads.path()));

    controller.stage(CaptureTarget::Attendance, jpeg());
    assert_eq!(controller.identify_and_log().await, Completion::Success);
    assert_eq!(
        controller.notifications().current().unwrap().body,
        "Attendance logged for user: bob"
    );

    let requests = seen(&log);
    assert!(matches!(&requests[0], Seen::Multipart { path: "/predict", .. }));
    assert!(matches!(
        &requests[1],
        Seen::Json { path: "/attendance", body } if body["user_id"] == "bob"
    ));
}

#[tokio::test]
async fn predicted_identity_is_recorded_verbatim() {
    let log = Log::default();
    let app = Router::new()
        .route("/predict", post(|| async { Json(json!({ "user_id": " bob " })) }))
        .route("/attendance", post(attendance))
        .with_state(log.clone());
    let client = RemoteServiceClient::new(&serve(app).await).unwrap();
    let downloads = tempfile::tempdir().unwrap();
    let controller = WorkflowController::new(client, DirectoryDownloader::new(downloads.path()));

    controller.stage(CaptureTarget::Attendance, jpeg());
    assert_eq!(controller.identify_and_log().await, Completion::Success);

    let requests = seen(&log);
    assert_eq!(requests.len(), 1);
    assert!(matches!(
        &requests[0],
        Seen::Json { path: "/attendance", body } if body["user_id"] == " bob "
    ));
}

#[tokio::test]
async fn report_workflow_saves_named_csv() {
    let (client, _log) = happy_client().await;
    let downloads = tempfile::tempdir().unwrap();
    let controller = WorkflowController::new(client, DirectoryDownloader::new(downloads.path()));

    let done = controller
        .generate_report(Some(date("2024-01-01")), Some(date("2024-01-31")))
        .await;
    assert_eq!(done, Completion::Success);

    let saved = downloads
        .path()
        .join("attendance_report_2024-01-01_to_2024-01-31.csv");
    assert_eq!(
        std::fs::read_to_string(saved).unwrap(),
        "user_id,timestamp\nbob,2024-01-02 09:00:00\n"
    );
}
