//! Remote table service fixtures served by wiremock

use serde_json::json;
use std::time::Duration;
use userdata_export::config::{PollConfig, PublishConfig, RemoteConfig, RetryConfig};
use userdata_export::{
    CallerMetadata, Config, DateRange, ExportRequest, FieldType, SchemaField, TableDescriptor,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

/// Path prefix the fake service lives under
pub const API: &str = "/repo/v1";

/// Health code every test request filters on
pub const HEALTH_CODE: &str = "it-health-code";

/// Config pointing at `server` that never sleeps
pub fn config_for(server: &MockServer) -> Config {
    Config {
        poll: PollConfig {
            max_attempts: 3,
            interval: Duration::ZERO,
        },
        retry: RetryConfig {
            max_attempts: 1,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_multiplier: 2.0,
            jitter: false,
        },
        publish: PublishConfig {
            bucket: "it-bucket".into(),
            url_ttl: Duration::from_secs(12 * 3600),
            ..Default::default()
        },
        remote: RemoteConfig {
            base_url: format!("{}{}", server.uri(), API),
            auth_token: Some("it-token".into()),
            request_timeout: Duration::from_secs(5),
        },
        ..Default::default()
    }
}

/// March 2015 export for [`HEALTH_CODE`]
pub fn request() -> ExportRequest {
    let range = DateRange::new(
        "2015-03-01".parse().unwrap(),
        "2015-03-31".parse().unwrap(),
    )
    .unwrap();
    ExportRequest::new(
        HEALTH_CODE,
        range,
        CallerMetadata {
            study_id: "it-study".into(),
            log_id: "it-log".into(),
        },
    )
    .unwrap()
}

/// Table with a plain `recordId` column and an `audio` attachment column
pub fn table(id: &str) -> TableDescriptor {
    TableDescriptor::new(
        id,
        vec![
            SchemaField::new("recordId", FieldType::String),
            SchemaField::new("audio", FieldType::AttachmentV2),
        ],
    )
}

fn body_contains(needle: String) -> impl Fn(&Request) -> bool + Send + Sync + 'static {
    move |req: &Request| String::from_utf8_lossy(&req.body).contains(&needle)
}

/// Serve a file handle through the url-then-fetch indirection
pub async fn mount_file_handle(server: &MockServer, file_handle_id: &str, bytes: Vec<u8>) {
    Mock::given(method("GET"))
        .and(path(format!("{API}/fileHandle/{file_handle_id}/url")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(format!("{}/storage/{file_handle_id}", server.uri())),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/storage/{file_handle_id}")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(bytes))
        .mount(server)
        .await;
}

/// A table whose query succeeds with `csv`
///
/// The query job reports "not ready" once before it completes.
pub async fn mount_table(server: &MockServer, table_id: &str, csv: &str) {
    let token = format!("query-{table_id}");
    Mock::given(method("POST"))
        .and(path(format!(
            "{API}/entity/{table_id}/table/download/csv/async/start"
        )))
        .and(body_contains(HEALTH_CODE.to_string()))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "token": token })))
        .mount(server)
        .await;

    let get_path = format!("{API}/entity/{table_id}/table/download/csv/async/get/{token}");
    Mock::given(method("GET"))
        .and(path(get_path.clone()))
        .respond_with(ResponseTemplate::new(202))
        .up_to_n_times(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(get_path))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "resultsFileHandleId": format!("csv-{table_id}") })),
        )
        .mount(server)
        .await;

    mount_file_handle(server, &format!("csv-{table_id}"), csv.as_bytes().to_vec()).await;
}

/// Attachment bulk download for `table_id` producing `bundle`
pub async fn mount_bundle(server: &MockServer, table_id: &str, bundle: Vec<u8>) {
    let token = format!("bulk-{table_id}");
    Mock::given(method("POST"))
        .and(path(format!("{API}/file/bulk/async/start")))
        .and(body_contains(format!(
            "\"associateObjectId\":\"{table_id}\""
        )))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "token": token })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{API}/file/bulk/async/get/{token}")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "resultZipFileHandleId": format!("zip-{table_id}") })),
        )
        .mount(server)
        .await;

    mount_file_handle(server, &format!("zip-{table_id}"), bundle).await;
}

/// A table whose query cannot even be started
pub async fn mount_failing_table(server: &MockServer, table_id: &str, status: u16) {
    Mock::given(method("POST"))
        .and(path(format!(
            "{API}/entity/{table_id}/table/download/csv/async/start"
        )))
        .respond_with(ResponseTemplate::new(status).set_body_string("table unavailable"))
        .mount(server)
        .await;
}

/// A table whose query never finishes
pub async fn mount_stuck_table(server: &MockServer, table_id: &str) {
    let token = format!("query-{table_id}");
    Mock::given(method("POST"))
        .and(path(format!(
            "{API}/entity/{table_id}/table/download/csv/async/start"
        )))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "token": token })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!(
            "{API}/entity/{table_id}/table/download/csv/async/get/{token}"
        )))
        .respond_with(ResponseTemplate::new(202))
        .mount(server)
        .await;
}

/// Attachment bulk download for `table_id` that never finishes
pub async fn mount_stuck_bundle(server: &MockServer, table_id: &str) {
    let token = format!("bulk-{table_id}");
    Mock::given(method("POST"))
        .and(path(format!("{API}/file/bulk/async/start")))
        .and(body_contains(format!(
            "\"associateObjectId\":\"{table_id}\""
        )))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "token": token })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{API}/file/bulk/async/get/{token}")))
        .respond_with(ResponseTemplate::new(202))
        .mount(server)
        .await;
}
