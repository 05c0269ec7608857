use super::*;
use futures::StreamExt;

#[tokio::test]
async fn test_health_check() {
    let (downloader, _temp_dir) = create_test_downloader().await;
    let app = router_for(&downloader);

    let response = send(app, "GET", "/health", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["engine_available"], true);
    assert_eq!(body["capacity"], 3);
}

#[tokio::test]
async fn test_engine_update_check_and_apply() {
    let (downloader, _temp_dir) = create_test_downloader().await;
    let app = router_for(&downloader);

    let response = send(app.clone(), "GET", "/engine/update", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let check = json_body(response).await;
    assert_eq!(
        check["current"],
        crate::downloader::test_helpers::INSTALLED_VERSION
    );
    assert_eq!(check["latest"], "2024.08.06");
    assert_eq!(check["available"], true);

    let response = send(app.clone(), "POST", "/engine/update", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["result"], "updated");

    let response = send(app, "POST", "/engine/update", None).await;
    assert_eq!(json_body(response).await["result"], "up_to_date");
}

#[tokio::test]
async fn test_event_stream_delivers_named_events() {
    let (downloader, _temp_dir) = create_test_downloader().await;
    let app = router_for(&downloader);

    let response = send(app, "GET", "/events", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "text/event-stream"
    );

    let id = downloader
        .enqueue(crate::types::ItemDescriptor::new(
            "https://media.test/watch?v=e",
            "E",
        ))
        .await
        .unwrap();

    let mut body = response.into_body().into_data_stream();
    let chunk = tokio::time::timeout(Duration::from_secs(5), body.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let text = String::from_utf8(chunk.to_vec()).unwrap();

    assert!(text.contains("event: queued"), "got {text}");
    assert!(text.contains(&format!("\"id\":{id}")), "got {text}");
}
