use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use cms_portal::{
    AppConfig, AppState, create_router,
    memory::InMemoryRepository,
    models::User,
    repository::RepositoryState,
};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

const EDITOR_ID: Uuid = Uuid::from_u128(0xed17);
const VIEWER_ID: Uuid = Uuid::from_u128(0x5ee);

// --- Test App ---

async fn spawn_app() -> (Router, Arc<InMemoryRepository>) {
    let repo = Arc::new(InMemoryRepository::new());
    repo.insert_user(User {
        id: EDITOR_ID,
        email: "editor@example.com".to_string(),
        role: "admin".to_string(),
    })
    .await;
    repo.insert_user(User {
        id: VIEWER_ID,
        email: "viewer@example.com".to_string(),
        role: String::new(),
    })
    .await;
    repo.insert_page(3, "about", true).await;

    let state = AppState::new(repo.clone() as RepositoryState, AppConfig::default());
    (create_router(state), repo)
}

fn request(method: &str, uri: &str, user: Option<Uuid>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(id) = user {
        builder = builder.header("x-user-id", id.to_string());
    }
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::String(String::from_utf8_lossy(&bytes).into()))
    };
    (status, body)
}

fn catalog_rebuild(layout: i16) -> Value {
    json!({
        "layout": layout,
        "items": [
            {
                "name": { "uk": "Каталог", "en": "Catalog" },
                "properties": { "target": { "type": "link", "url": "/catalog" } },
                "children": [
                    {
                        "name": { "uk": "Взуття" },
                        "properties": { "target": { "type": "link", "url": "/catalog/shoes" } }
                    },
                    {
                        "name": { "uk": "Прихована" },
                        "properties": { "target": { "type": "link", "url": "/secret" } },
                        "visibility": false
                    }
                ]
            },
            {
                "name": { "uk": "Про нас" },
                "properties": { "target": { "type": "page", "id": 3 } }
            }
        ]
    })
}

// --- Tests ---

#[tokio::test]
async fn test_health_check() {
    let (app, _) = spawn_app().await;
    let (status, body) = send(&app, request("GET", "/health", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("ok".to_string()));
}

#[tokio::test]
async fn test_request_id_is_propagated() {
    let (app, _) = spawn_app().await;
    let response = app
        .oneshot(request("GET", "/health", None, None))
        .await
        .unwrap();
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_admin_routes_require_authentication() {
    let (app, _) = spawn_app().await;

    let (status, _) = send(&app, request("GET", "/admin/menus?layout=1", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, request("PUT", "/admin/menus/rebuild", None, Some(catalog_rebuild(1)))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, request("GET", "/me", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_viewer_cannot_rebuild() {
    let (app, repo) = spawn_app().await;
    let (status, body) = send(
        &app,
        request("PUT", "/admin/menus/rebuild", Some(VIEWER_ID), Some(catalog_rebuild(1))),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "access_denied");
    assert!(repo.snapshot().await.is_empty());
}

#[tokio::test]
async fn test_rebuild_then_public_tree_in_two_languages() {
    let (app, _) = spawn_app().await;

    let (status, admin_tree) = send(
        &app,
        request("PUT", "/admin/menus/rebuild", Some(EDITOR_ID), Some(catalog_rebuild(2))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(admin_tree[0]["_lft"], 1);
    assert_eq!(admin_tree[0]["_rgt"], 6);
    assert_eq!(admin_tree[0]["children"][1]["visibility"], false);
    assert_eq!(admin_tree[0]["children"][0]["depth"], 1);

    let (status, public) = send(&app, request("GET", "/menus?layout=2", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        public,
        json!([
            {
                "id": public[0]["id"],
                "name": "Каталог",
                "url": "/catalog",
                "children": [
                    { "id": public[0]["children"][0]["id"], "name": "Взуття", "url": "/catalog/shoes", "children": [] }
                ]
            },
            { "id": public[1]["id"], "name": "Про нас", "url": "/pages/about", "children": [] }
        ])
    );

    let english = Request::builder()
        .uri("/menus?layout=2")
        .header(header::ACCEPT_LANGUAGE, "en")
        .body(Body::empty())
        .unwrap();
    let (_, public_en) = send(&app, english).await;
    assert_eq!(public_en[0]["name"], "Catalog");
    // no "en" entry: default language
    assert_eq!(public_en[1]["name"], "Про нас");
}

#[tokio::test]
async fn test_rebuild_validation_error_has_path() {
    let (app, _) = spawn_app().await;
    let payload = json!({
        "layout": 1,
        "items": [
            { "name": { "uk": "A" }, "properties": { "target": { "type": "link", "url": "/a" } },
              "children": [ { "name": { "uk": "B" }, "properties": { "target": { "type": "page" } } } ] }
        ]
    });
    let (status, body) = send(&app, request("PUT", "/admin/menus/rebuild", Some(EDITOR_ID), Some(payload))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "validation");
    assert!(
        body["message"]
            .as_str()
            .unwrap()
            .contains("items[0].children[0].properties.target.id")
    );
}

#[tokio::test]
async fn test_node_lifecycle_over_http() {
    let (app, _) = spawn_app().await;
    let create = |name: &str, parent: Value| {
        json!({
            "layout": 1,
            "name": { "uk": name },
            "properties": { "target": { "type": "link", "url": format!("/{}", name) } },
            "parent_id": parent
        })
    };

    let (status, root) = send(&app, request("POST", "/admin/menus", Some(EDITOR_ID), Some(create("root", Value::Null)))).await;
    assert_eq!(status, StatusCode::CREATED);
    let root_id = root["id"].as_i64().unwrap();

    let (_, child) = send(&app, request("POST", "/admin/menus", Some(EDITOR_ID), Some(create("child", json!(root_id))))).await;
    let child_id = child["id"].as_i64().unwrap();
    assert_eq!(child["parent_id"], root_id);

    // hide the child
    let (status, patched) = send(
        &app,
        request("PATCH", &format!("/admin/menus/{}", child_id), Some(EDITOR_ID), Some(json!({ "visibility": false }))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(patched["visibility"], false);

    let (_, public) = send(&app, request("GET", "/menus?layout=1", None, None)).await;
    assert_eq!(public[0]["children"], json!([]));

    // any authenticated reader still sees it
    let (status, shown) = send(&app, request("GET", &format!("/admin/menus/{}", child_id), Some(VIEWER_ID), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(shown["_lft"], 2);

    // cycle
    let (status, body) = send(
        &app,
        request("PUT", &format!("/admin/menus/{}/position", root_id), Some(EDITOR_ID), Some(json!({ "parent_id": child_id }))),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "cycle_detected");

    // promote child to a root
    let (status, moved) = send(
        &app,
        request("PUT", &format!("/admin/menus/{}/position", child_id), Some(EDITOR_ID), Some(json!({ "parent_id": null }))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(moved["parent_id"], Value::Null);
    assert_eq!((moved["_lft"].as_i64(), moved["_rgt"].as_i64()), (Some(3), Some(4)));

    let (_, report) = send(&app, request("GET", "/admin/menus/integrity?layout=1", Some(VIEWER_ID), None)).await;
    assert_eq!(report["node_count"], 2);
    assert_eq!(report["issues"], json!([]));

    let (status, deleted) = send(&app, request("DELETE", &format!("/admin/menus/{}", root_id), Some(EDITOR_ID), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deleted["removed"], 1);

    let (status, _) = send(&app, request("GET", &format!("/admin/menus/{}", root_id), Some(EDITOR_ID), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, cleared) = send(&app, request("DELETE", "/admin/menus/layouts/1", Some(EDITOR_ID), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cleared["removed"], 1);
}

#[tokio::test]
async fn test_cross_layout_parent_is_unprocessable() {
    let (app, _) = spawn_app().await;
    let header_root = json!({
        "layout": 1,
        "name": { "uk": "Header" },
        "properties": { "target": { "type": "link", "url": "/" } }
    });
    let (_, root) = send(&app, request("POST", "/admin/menus", Some(EDITOR_ID), Some(header_root))).await;

    let footer_child = json!({
        "layout": 2,
        "name": { "uk": "Footer" },
        "properties": { "target": { "type": "link", "url": "/f" } },
        "parent_id": root["id"]
    });
    let (status, body) = send(&app, request("POST", "/admin/menus", Some(EDITOR_ID), Some(footer_child))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "layout_mismatch");
}

#[tokio::test]
async fn test_me_reports_capabilities() {
    let (app, _) = spawn_app().await;

    let (status, me) = send(&app, request("GET", "/me", Some(EDITOR_ID), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["can_edit_menus"], true);

    let (_, me) = send(&app, request("GET", "/me", Some(VIEWER_ID), None)).await;
    assert_eq!(me["can_edit_menus"], false);
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let (app, _) = spawn_app().await;
    let (status, doc) = send(&app, request("GET", "/api-docs/openapi.json", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(doc["paths"].get("/admin/menus/rebuild").is_some());
}
