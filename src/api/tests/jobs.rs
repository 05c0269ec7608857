use super::*;
use serde_json::json;

#[tokio::test]
async fn test_add_url_creates_pending_jobs() {
    let (downloader, _temp_dir) = create_test_downloader().await;
    let app = router_for(&downloader);

    let response = send(
        app.clone(),
        "POST",
        "/jobs",
        Some(json!({ "url": "https://media.test/playlist?list=abc" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = json_body(response).await;
    assert_eq!(body["ids"], json!([1, 2, 3]));

    let response = send(app, "GET", "/jobs", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let jobs = json_body(response).await;
    let jobs = jobs.as_array().unwrap();
    assert_eq!(jobs.len(), 3);
    assert_eq!(jobs[0]["status"], "pending");
    assert_eq!(jobs[1]["item"]["title"], "Entry 2");
}

#[tokio::test]
async fn test_add_url_validation_and_resolve_errors() {
    let (downloader, _temp_dir) = create_test_downloader().await;
    let app = router_for(&downloader);

    let response = send(app.clone(), "POST", "/jobs", Some(json!({ "url": "  " }))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"]["code"], "validation_error");

    let response = send(
        app,
        "POST",
        "/jobs",
        Some(json!({ "url": "https://media.test/private" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(downloader.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_get_unknown_job_is_404() {
    let (downloader, _temp_dir) = create_test_downloader().await;
    let app = router_for(&downloader);

    let response = send(app.clone(), "GET", "/jobs/42", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["error"]["code"], "job_not_found");

    let response = send(app, "POST", "/jobs/42/pause", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_start_all_runs_jobs_to_completion() {
    let (downloader, _temp_dir) = create_test_downloader().await;
    let app = router_for(&downloader);
    let id = downloader
        .enqueue(crate::types::ItemDescriptor::new(
            "https://media.test/watch?v=a",
            "A",
        ))
        .await
        .unwrap();

    let response = send(app.clone(), "POST", "/jobs/start", Some(json!({ "max_height": 720 }))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["ids"], json!([id.get()]));

    let info = wait_for_status(&downloader, id, Status::Completed).await;
    let format = info.params.unwrap().format_spec;
    assert!(format.contains("720"), "format was {format}");

    let response = send(app, "GET", &format!("/jobs/{id}"), None).await;
    let body = json_body(response).await;
    assert_eq!(body["status"], "completed");
    assert_eq!(body["output_path"], "/downloads/out.mp4");
}

#[tokio::test]
async fn test_start_without_body_uses_defaults() {
    let (downloader, _temp_dir) = create_test_downloader().await;
    let app = router_for(&downloader);
    let id = downloader
        .enqueue(crate::types::ItemDescriptor::new(
            "https://media.test/watch?v=b",
            "B",
        ))
        .await
        .unwrap();

    let response = send(app, "POST", "/jobs/start", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let info = wait_for_status(&downloader, id, Status::Completed).await;
    assert_eq!(
        info.params.unwrap().format_spec,
        downloader.get_config().download.default_format
    );
}

#[tokio::test]
async fn test_pause_resume_cancel_over_http() {
    let (downloader, temp_dir) = create_test_downloader().await;
    let app = router_for(&downloader);
    let (url, gate) = gated_url(temp_dir.path(), "http");
    let id = downloader
        .enqueue(crate::types::ItemDescriptor::new(url, "Gated"))
        .await
        .unwrap();

    send(app.clone(), "POST", "/jobs/start", None).await;
    wait_for_status(&downloader, id, Status::Active).await;

    let response = send(app.clone(), "POST", &format!("/jobs/{id}/pause"), None).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    wait_for_status(&downloader, id, Status::Paused).await;

    // Pausing a paused job is a no-op, resuming a cancelled one is not
    let response = send(app.clone(), "POST", &format!("/jobs/{id}/pause"), None).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = send(app.clone(), "POST", &format!("/jobs/{id}/cancel"), None).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    wait_for_status(&downloader, id, Status::Cancelled).await;

    let response = send(app.clone(), "POST", &format!("/jobs/{id}/resume"), None).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(json_body(response).await["error"]["code"], "invalid_state");

    let response = send(app, "POST", &format!("/jobs/{id}/retry"), None).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(
        json_body(response).await["error"]["code"],
        "parameters_unavailable"
    );
    open_gate(&gate);
}

#[tokio::test]
async fn test_clear_finished_and_stats() {
    let (downloader, temp_dir) = create_test_downloader().await;
    let app = router_for(&downloader);
    let done = downloader
        .enqueue(crate::types::ItemDescriptor::new(
            "https://media.test/watch?v=c",
            "C",
        ))
        .await
        .unwrap();
    downloader
        .start(done, crate::downloader::test_helpers::params(temp_dir.path()))
        .await
        .unwrap();
    wait_for_status(&downloader, done, Status::Completed).await;
    let waiting = downloader
        .enqueue(crate::types::ItemDescriptor::new(
            "https://media.test/watch?v=d",
            "D",
        ))
        .await
        .unwrap();

    let response = send(app.clone(), "GET", "/stats", None).await;
    let stats = json_body(response).await;
    assert_eq!(stats["total"], 2);
    assert_eq!(stats["completed"], 1);
    assert_eq!(stats["pending"], 1);
    assert_eq!(stats["capacity"], 3);

    let response = send(app, "DELETE", "/jobs/finished", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["ids"], json!([done.get()]));

    let remaining: Vec<JobId> = downloader
        .list()
        .await
        .unwrap()
        .into_iter()
        .map(|job| job.id)
        .collect();
    assert_eq!(remaining, vec![waiting]);
}
