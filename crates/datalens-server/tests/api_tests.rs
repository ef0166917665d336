use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

use datalens_server::api;
use datalens_server::config::ServerConfig;
use datalens_server::server::DataLensServer;
use datalens_store::{FsDatasetStore, FsHistoryStore};

const BOUNDARY: &str = "datalens-test-boundary";

struct TestApp {
    router: Router,
    server: Arc<DataLensServer>,
    data_dir: TempDir,
    _history_dir: TempDir,
}

async fn test_app() -> TestApp {
    let data_dir = TempDir::new().unwrap();
    let history_dir = TempDir::new().unwrap();
    let config = ServerConfig {
        data_dir: data_dir.path().to_string_lossy().into_owned(),
        history_dir: history_dir.path().to_string_lossy().into_owned(),
        ..ServerConfig::default()
    };
    let store = Arc::new(FsDatasetStore::new(data_dir.path()).await.unwrap());
    let history = Arc::new(FsHistoryStore::new(history_dir.path()).await.unwrap());
    let server = Arc::new(DataLensServer::new(config, store, history));
    TestApp {
        router: api::build_router(server.clone()),
        server,
        data_dir,
        _history_dir: history_dir,
    }
}

fn multipart_upload(uri: &str, filename: &str, bytes: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"{filename}\"\r\nContent-Type: text/csv\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn tool_call(tool: &str, arguments: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(format!("/tools/{tool}"))
        .header("content-type", "application/json")
        .body(Body::from(arguments.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn delete(uri: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

/// The text block of a tool response, parsed back into JSON
fn tool_text(body: &Value) -> Value {
    let text = body["content"][0]["text"].as_str().unwrap();
    serde_json::from_str(text).unwrap()
}

fn sales_csv(rows: usize) -> String {
    let mut csv = String::from("date,region,revenue\n");
    for i in 0..rows {
        let region = if i % 2 == 0 { "EU" } else { "US" };
        csv.push_str(&format!("2024-01-{:02},{},{}\n", (i % 28) + 1, region, i));
    }
    csv
}

#[tokio::test]
async fn upload_query_delete_scenario() {
    let app = test_app().await;
    let csv = sales_csv(100);

    // Upload reports the parsed shape
    let (status, body) = send(
        &app.router,
        multipart_upload("/upload?session_id=s1", "sales.csv", csv.as_bytes()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["uploaded_files"][0]["filename"], json!("sales.csv"));
    assert_eq!(body["uploaded_files"][0]["row_count"], json!(100));
    assert_eq!(
        body["uploaded_files"][0]["columns"],
        json!(["date", "region", "revenue"])
    );

    // head(2) returns exactly 2 ordered records
    let (status, body) = send(
        &app.router,
        tool_call(
            "query_data",
            json!({"filename": "sales.csv", "operation": "head", "n": 2}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let records = tool_text(&body);
    assert_eq!(records.as_array().unwrap().len(), 2);
    let keys: Vec<&String> = records[0].as_object().unwrap().keys().collect();
    assert_eq!(keys, vec!["date", "region", "revenue"]);

    // count equals the row count reported at upload time
    let (status, body) = send(
        &app.router,
        tool_call(
            "query_data",
            json!({"filename": "sales.csv", "operation": "count"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tool_text(&body), json!(100));

    // sum(revenue) is the arithmetic sum 0 + 1 + ... + 99
    let (status, body) = send(
        &app.router,
        tool_call(
            "query_data",
            json!({"filename": "sales.csv", "operation": "sum", "column": "revenue"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tool_text(&body), json!(4950.0));
    assert_eq!(body["source_info"]["columns_used"], json!(["revenue"]));

    // Delete, then the file is gone for every path
    let (status, body) = send(&app.router, delete("/files/sales.csv")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["message"].as_str().unwrap().contains("sales.csv"));

    let (status, body) = send(
        &app.router,
        tool_call("get_columns", json!({"filename": "sales.csv"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("sales.csv"));
    assert!(!app.data_dir.path().join("sales.csv").exists());
}

#[tokio::test]
async fn upload_rejects_unsupported_extension_without_writing() {
    let app = test_app().await;

    let (status, body) = send(
        &app.router,
        multipart_upload("/upload", "notes.txt", b"a,b\n1,2\n"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("notes.txt"));
    assert!(!app.data_dir.path().join("notes.txt").exists());
}

#[tokio::test]
async fn upload_rolls_back_unparseable_files() {
    let app = test_app().await;

    let (status, body) = send(
        &app.router,
        multipart_upload("/upload", "broken.xlsx", b"not a workbook"),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("broken.xlsx"));
    assert!(!app.data_dir.path().join("broken.xlsx").exists());
}

#[tokio::test]
async fn upload_with_no_files_is_a_validation_error() {
    let app = test_app().await;

    let request = Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(format!("--{BOUNDARY}--\r\n")))
        .unwrap();
    let (status, body) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("No files"));
}

#[tokio::test]
async fn tool_responses_carry_text_content_and_source_info() {
    let app = test_app().await;
    let (status, _) = send(
        &app.router,
        multipart_upload("/upload", "sales.csv", sales_csv(10).as_bytes()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app.router, tool_call("list_files", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["content"][0]["type"], json!("text"));
    let files = tool_text(&body);
    assert_eq!(files[0]["filename"], json!("sales.csv"));
    assert_eq!(files[0]["row_count"], json!(10));
    assert_eq!(body["source_info"]["operation"], json!("list_files"));
    assert_eq!(body["source_info"]["files_found"], json!(1));

    let (status, body) = send(
        &app.router,
        tool_call("get_columns", json!({"filename": "sales.csv"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let result = tool_text(&body);
    assert_eq!(result["columns"], json!(["date", "region", "revenue"]));
    assert_eq!(result["column_count"], json!(3));

    let (status, body) = send(
        &app.router,
        tool_call("describe_file", json!({"filename": "sales.csv"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let described = tool_text(&body);
    assert_eq!(described["row_count"], json!(10));
    assert_eq!(described["columns"][2]["name"], json!("revenue"));
    assert_eq!(described["columns"][2]["dtype"], json!("int"));
}

#[tokio::test]
async fn missing_required_tool_arguments_are_validation_errors() {
    let app = test_app().await;

    let (status, body) = send(&app.router, tool_call("get_columns", json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("filename"));

    let (status, body) = send(
        &app.router,
        tool_call("query_data", json!({"filename": "sales.csv"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("operation"));
}

#[tokio::test]
async fn unknown_tool_is_not_found() {
    let app = test_app().await;
    let (status, body) = send(&app.router, tool_call("explode", json!({}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("explode"));
}

#[tokio::test]
async fn chat_history_round_trip() {
    let app = test_app().await;
    send(
        &app.router,
        multipart_upload("/upload?session_id=s1", "sales.csv", sales_csv(10).as_bytes()),
    )
    .await;

    // Empty history is an empty sequence, not an error
    let (status, body) = send(&app.router, get("/chat_history/s1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["session_id"], json!("s1"));
    assert_eq!(body["history"], json!([]));

    // A query with session context lands in the history
    let (status, _) = send(
        &app.router,
        tool_call(
            "query_data",
            json!({
                "filename": "sales.csv",
                "operation": "count",
                "session_id": "s1",
                "question": "How many rows?",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app.router, get("/chat_history/s1")).await;
    assert_eq!(status, StatusCode::OK);
    let history = body["history"].as_array().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["question"], json!("How many rows?"));
    assert_eq!(history[0]["response"], json!("10"));
    assert_eq!(
        history[0]["source_info"]["operation"],
        json!("count")
    );

    // The same history is visible through the tool surface
    let (status, body) = send(
        &app.router,
        tool_call("get_chat_history", json!({"session_id": "s1"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tool_text(&body).as_array().unwrap().len(), 1);

    // Clear destroys the sequence; clearing again stays a no-op
    let (status, body) = send(&app.router, delete("/chat_history/s1")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["message"].as_str().unwrap().contains("s1"));

    let (status, body) = send(&app.router, get("/chat_history/s1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["history"], json!([]));

    let (status, _) = send(&app.router, delete("/chat_history/s1")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn source_endpoint_serves_provenance_by_query_id() {
    let app = test_app().await;
    send(
        &app.router,
        multipart_upload("/upload", "sales.csv", sales_csv(10).as_bytes()),
    )
    .await;

    let (status, _) = send(
        &app.router,
        tool_call(
            "query_data",
            json!({
                "filename": "sales.csv",
                "operation": "sum",
                "column": "revenue",
                "query_id": "q-front-end-1",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app.router, get("/source/q-front-end-1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["query_id"], json!("q-front-end-1"));
    let source = &body["source_info"];
    assert_eq!(source["filename"], json!("sales.csv"));
    assert_eq!(source["operation"], json!("sum"));
    assert_eq!(source["columns_used"], json!(["revenue"]));
    assert_eq!(source["result_summary"]["result_type"], json!("number"));
    assert_eq!(source["dataset_available"], json!(true));

    // Provenance outlives the dataset, but says the dataset is gone
    send(&app.router, delete("/files/sales.csv")).await;
    let (status, body) = send(&app.router, get("/source/q-front-end-1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["source_info"]["dataset_available"], json!(false));

    // Unknown query ids are 404
    let (status, body) = send(&app.router, get("/source/ghost")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("ghost"));
}

#[tokio::test]
async fn reusing_a_query_id_for_a_different_file_is_rejected() {
    let app = test_app().await;
    send(
        &app.router,
        multipart_upload("/upload", "a.csv", b"x\n1\n"),
    )
    .await;
    send(
        &app.router,
        multipart_upload("/upload", "b.csv", b"x\n2\n"),
    )
    .await;

    let (status, _) = send(
        &app.router,
        tool_call(
            "query_data",
            json!({"filename": "a.csv", "operation": "count", "query_id": "shared"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app.router,
        tool_call(
            "query_data",
            json!({"filename": "b.csv", "operation": "count", "query_id": "shared"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("shared"));
}

#[tokio::test]
async fn resources_expose_files_and_contents() {
    let app = test_app().await;
    send(
        &app.router,
        multipart_upload("/upload", "sales.csv", b"x,y\n1,2\n"),
    )
    .await;

    let (status, body) = send(&app.router, get("/resources")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["resources"][0]["uri"], json!("file://sales.csv"));
    assert_eq!(body["resources"][0]["metadata"]["row_count"], json!(1));

    let (status, body) = send(&app.router, get("/resources/file://sales.csv")).await;
    assert_eq!(status, StatusCode::OK);
    let text = body["contents"][0]["text"].as_str().unwrap();
    assert_eq!(
        serde_json::from_str::<Value>(text).unwrap(),
        json!([{"x": 1, "y": 2}])
    );
}

#[tokio::test]
async fn health_reports_cache_and_provenance_counters() {
    let app = test_app().await;
    send(
        &app.router,
        multipart_upload("/upload", "sales.csv", b"x\n1\n"),
    )
    .await;
    send(
        &app.router,
        tool_call("query_data", json!({"filename": "sales.csv", "operation": "count"})),
    )
    .await;

    let (status, body) = send(&app.router, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("UP"));
    assert_eq!(body["cache"]["entries"], json!(1));
    assert_eq!(body["provenance"]["records"], json!(1));
    assert_eq!(body["dependencies"]["datasetStore"]["status"], json!("UP"));
}

#[tokio::test]
async fn root_and_tool_catalog_are_served() {
    let app = test_app().await;

    let (status, body) = send(&app.router, get("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], json!("DataLens Server"));

    let (status, body) = send(&app.router, get("/tools")).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = body["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(
        names,
        vec![
            "list_files",
            "get_columns",
            "describe_file",
            "query_data",
            "get_chat_history"
        ]
    );
}

#[tokio::test]
async fn concurrent_uploads_and_queries_on_distinct_files_stay_isolated() {
    let app = test_app().await;
    let workers = 8usize;

    // Concurrent uploads of distinct filenames
    let tasks: Vec<_> = (0..workers)
        .map(|i| {
            let router = app.router.clone();
            tokio::spawn(async move {
                let csv = format!("id,value\n{},{}\n", i, i * 10);
                let request =
                    multipart_upload("/upload", &format!("worker-{}.csv", i), csv.as_bytes());
                let response = router.oneshot(request).await.unwrap();
                assert_eq!(response.status(), StatusCode::OK);
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    // Concurrent queries against distinct filenames
    let tasks: Vec<_> = (0..workers)
        .map(|i| {
            let router = app.router.clone();
            tokio::spawn(async move {
                let request = tool_call(
                    "query_data",
                    json!({
                        "filename": format!("worker-{}.csv", i),
                        "operation": "sum",
                        "column": "value",
                        "query_id": format!("wq-{}", i),
                    }),
                );
                let response = router.oneshot(request).await.unwrap();
                assert_eq!(response.status(), StatusCode::OK);
                let bytes = response.into_body().collect().await.unwrap().to_bytes();
                let body: Value = serde_json::from_slice(&bytes).unwrap();
                let text = body["content"][0]["text"].as_str().unwrap().to_string();
                (i, text)
            })
        })
        .collect();
    for task in tasks {
        let (i, text) = task.await.unwrap();
        assert_eq!(text, format!("{}.0", i * 10));
    }

    // Exactly the expected entries, each with correct values
    let (_, body) = send(&app.router, tool_call("list_files", json!({}))).await;
    assert_eq!(tool_text(&body).as_array().unwrap().len(), workers);
    for i in 0..workers {
        let (status, body) = send(&app.router, get(&format!("/source/wq-{}", i))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body["source_info"]["filename"],
            json!(format!("worker-{}.csv", i))
        );
    }
    let (entries, _) = app.server.cache_stats();
    assert_eq!(entries, workers);
}
