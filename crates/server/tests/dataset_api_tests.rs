//! Integration tests for the dataset endpoints.

mod common;

use axum::http::StatusCode;
use common::{LTAG, TestServer, dataset_uri};
use serde_json::json;

#[tokio::test]
async fn test_register_holds_write_lock_until_unlocked() {
    let server = TestServer::with_subproject().await;
    let uri = dataset_uri("survey.segy");

    let (status, body) = server
        .send("POST", &uri, Some(json!({ "gtags": ["raw"] })), &[])
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["name"], "survey.segy");
    assert_eq!(body["path"], "/");
    assert_eq!(body["ltag"], LTAG);
    assert_eq!(body["sbit_count"], 1);
    let wid = body["sbit"].as_str().unwrap().to_string();
    assert!(wid.starts_with('W'));

    let (status, body) = server.send("GET", &uri, None, &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sbit"], wid.as_str());
    assert_eq!(body["sbit_count"], 1);
    assert!(body["ctag"].as_str().unwrap().ends_with("gcp-a;opendes"));

    let (status, _) = server.send("PUT", &format!("{uri}/unlock"), None, &[]).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = server.send("GET", &uri, None, &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["sbit"].is_null());
    assert_eq!(body["sbit_count"], 0);
}

#[tokio::test]
async fn test_register_replays_with_same_lock_id() {
    let server = TestServer::with_subproject().await;
    let uri = dataset_uri("replayed");
    let headers = [("x-seismic-dms-lockid", "W-client-session-1")];

    let (status, first) = server
        .send("POST", &uri, Some(json!({ "metadata": { "k": 1 } })), &headers)
        .await;
    assert_eq!(status, StatusCode::OK, "{first}");
    assert_eq!(first["sbit"], "W-client-session-1");

    let (status, second) = server
        .send("POST", &uri, Some(json!({ "metadata": { "k": 1 } })), &headers)
        .await;
    assert_eq!(status, StatusCode::OK, "{second}");
    assert_eq!(first, second);

    // A different session cannot register over the held lock.
    let (status, _) = server
        .send(
            "POST",
            &uri,
            None,
            &[("x-seismic-dms-lockid", "W-client-session-2")],
        )
        .await;
    assert_eq!(status, StatusCode::LOCKED);
}

#[tokio::test]
async fn test_register_existing_dataset_conflicts() {
    let server = TestServer::with_subproject().await;
    let uri = dataset_uri("twice");

    let (status, _) = server.send("POST", &uri, None, &[]).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = server.send("PUT", &format!("{uri}/unlock"), None, &[]).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = server.send("POST", &uri, None, &[]).await;
    assert_eq!(status, StatusCode::CONFLICT);

    // The failed attempt released its lock.
    let (_, body) = server.send("GET", &uri, None, &[]).await;
    assert_eq!(body["sbit_count"], 0);
}

#[tokio::test]
async fn test_lock_modes() {
    let server = TestServer::with_subproject().await;
    let uri = dataset_uri("locked");

    let (_, body) = server.send("POST", &uri, None, &[]).await;
    let wid = body["sbit"].as_str().unwrap().to_string();

    let (status, _) = server
        .send("PUT", &format!("{uri}/lock?openmode=write"), None, &[])
        .await;
    assert_eq!(status, StatusCode::LOCKED);
    let (status, _) = server
        .send("PUT", &format!("{uri}/lock?openmode=read"), None, &[])
        .await;
    assert_eq!(status, StatusCode::LOCKED);

    // The holder re-entering with its own id keeps the lock.
    let (status, body) = server
        .send(
            "PUT",
            &format!("{uri}/lock?openmode=write&wid={wid}"),
            None,
            &[],
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["sbit"], wid.as_str());

    let (status, _) = server
        .send("PUT", &format!("{uri}/lock?openmode=append"), None, &[])
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_readers_share_lock() {
    let server = TestServer::with_subproject().await;
    let uri = dataset_uri("shared");
    server.send("POST", &uri, None, &[]).await;
    server.send("PUT", &format!("{uri}/unlock"), None, &[]).await;

    let (status, first) = server
        .send("PUT", &format!("{uri}/lock?openmode=read"), None, &[])
        .await;
    assert_eq!(status, StatusCode::OK, "{first}");
    assert_eq!(first["sbit_count"], 1);
    assert!(first["sbit"].as_str().unwrap().starts_with('R'));

    let (status, second) = server
        .send("PUT", &format!("{uri}/lock?openmode=read"), None, &[])
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["sbit_count"], 2);

    let (status, _) = server
        .send("PUT", &format!("{uri}/lock?openmode=write"), None, &[])
        .await;
    assert_eq!(status, StatusCode::LOCKED);
}

#[tokio::test]
async fn test_patch_with_close_and_empty_body_releases_lock() {
    let server = TestServer::with_subproject().await;
    let uri = dataset_uri("closing");

    let (_, body) = server.send("POST", &uri, None, &[]).await;
    let wid = body["sbit"].as_str().unwrap().to_string();

    let (status, body) = server
        .send("PATCH", &format!("{uri}?close={wid}"), None, &[])
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert!(body["sbit"].is_null());
    assert_eq!(body["sbit_count"], 0);
}

#[tokio::test]
async fn test_patch_updates_fields_and_refuses_while_write_locked() {
    let server = TestServer::with_subproject().await;
    let uri = dataset_uri("patched");

    let (_, body) = server.send("POST", &uri, None, &[]).await;
    let wid = body["sbit"].as_str().unwrap().to_string();
    let ctag = body["ctag"].as_str().unwrap().to_string();

    let (status, _) = server
        .send("PATCH", &uri, Some(json!({ "readonly": true })), &[])
        .await;
    assert_eq!(status, StatusCode::LOCKED);

    // Closing the session in the same call lets the patch through.
    let (status, body) = server
        .send(
            "PATCH",
            &format!("{uri}?close={wid}"),
            Some(json!({ "metadata": { "survey": "north" }, "gtags": ["qc"] })),
            &[],
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["metadata"]["survey"], "north");
    assert_eq!(body["gtags"], json!(["qc"]));
    assert_ne!(body["ctag"].as_str().unwrap(), ctag);
}

#[tokio::test]
async fn test_list_and_bulk_queries() {
    let server = TestServer::with_subproject().await;
    for (name, gtags) in [("a", vec!["x"]), ("b", vec!["x", "y"])] {
        let uri = format!("{}?path=/dir", dataset_uri(name));
        let (status, _) = server
            .send("POST", &uri, Some(json!({ "gtags": gtags })), &[])
            .await;
        assert_eq!(status, StatusCode::OK);
    }
    let list_uri = "/v1/dataset/tenant/tenant-a/subproject/sub-b";

    let (status, body) = server.send("GET", list_uri, None, &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["datasets"].as_array().unwrap().len(), 2);

    let (_, body) = server
        .send("GET", &format!("{list_uri}?gtag=x,y"), None, &[])
        .await;
    let names: Vec<_> = body["datasets"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["b"]);

    let (status, body) = server
        .send("GET", &format!("{list_uri}/content?path=/"), None, &[])
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["directories"], json!(["dir/"]));

    let (status, body) = server
        .send(
            "POST",
            &format!("{list_uri}/exist"),
            Some(json!({ "datasets": ["/dir/a", "/dir/missing"] })),
            &[],
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([true, false]));
}

#[tokio::test]
async fn test_delete_dataset() {
    let server = TestServer::with_subproject().await;
    let uri = dataset_uri("doomed");
    server.send("POST", &uri, None, &[]).await;

    // Refused while write locked.
    let (status, _) = server.send("DELETE", &uri, None, &[]).await;
    assert_eq!(status, StatusCode::LOCKED);

    server.send("PUT", &format!("{uri}/unlock"), None, &[]).await;
    let (status, _) = server.send("DELETE", &uri, None, &[]).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = server.send("GET", &uri, None, &[]).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_subproject_is_not_found() {
    let server = TestServer::new().await;
    let (status, body) = server.send("GET", &dataset_uri("any"), None, &[]).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");
}
