use async_trait::async_trait;
use cms_portal::{
    MenuService,
    access::RoleGate,
    auth::AuthUser,
    error::{MenuError, MenuResult},
    localized::LocalizedText,
    memory::InMemoryRepository,
    menu::{
        nested_set::{MAX_MENU_DEPTH, verify_layout},
        rebuild::{PlannedNode, plan_forest, validate_forest},
    },
    models::{
        AdminMenuNode, MenuItemInput, MenuNode, MenuNodePatch, MoveMenuNode, NewMenuNode,
        PublicMenuNode, RebuildRequest, User,
    },
    repository::{Repository, RepositoryState},
};
use serde_json::{Value, json};
use std::{collections::HashMap, sync::Arc};
use tokio::test;
use uuid::Uuid;

// --- Helpers ---

fn editor() -> AuthUser {
    AuthUser {
        id: Uuid::new_v4(),
        role: "admin".to_string(),
    }
}

fn service(repo: Arc<InMemoryRepository>) -> MenuService {
    MenuService::new(repo as RepositoryState, Arc::new(RoleGate::default()), "uk")
}

fn items(value: Value) -> Vec<MenuItemInput> {
    serde_json::from_value(value).unwrap()
}

fn catalog_forest() -> Vec<MenuItemInput> {
    items(json!([
        {
            "name": { "uk": "Каталог" },
            "properties": { "target": { "type": "link", "url": "/catalog" } },
            "children": [
                {
                    "name": { "uk": "Взуття" },
                    "properties": { "target": { "type": "link", "url": "/catalog/shoes" } }
                }
            ]
        }
    ]))
}

fn validation_path(result: Result<(), MenuError>) -> String {
    match result {
        Err(MenuError::Validation { path, .. }) => path,
        other => panic!("expected a validation error, got {:?}", other),
    }
}

/// Compares a materialized admin forest with the submitted one.
fn assert_isomorphic(actual: &[AdminMenuNode], expected: &[MenuItemInput]) {
    assert_eq!(actual.len(), expected.len());
    for (a, e) in actual.iter().zip(expected) {
        assert_eq!(a.name, e.name);
        assert_eq!(a.properties, e.properties);
        assert_eq!(a.visibility, e.visibility.unwrap_or(true));
        assert_isomorphic(&a.children, &e.children);
    }
}

// --- Validation ---

#[test]
async fn test_validation_reports_nested_target_id_path() {
    let forest = items(json!([
        { "name": { "uk": "A" }, "properties": { "target": { "type": "link", "url": "/a" } } },
        {
            "name": { "uk": "B" },
            "properties": { "target": { "type": "link", "url": "/b" } },
            "children": [
                { "name": { "uk": "B1" }, "properties": { "target": { "type": "link", "url": "/b1" } } },
                { "name": { "uk": "B2" }, "properties": { "target": { "type": "page" } } }
            ]
        }
    ]));
    assert_eq!(
        validation_path(validate_forest(&forest)),
        "items[1].children[1].properties.target.id"
    );
}

#[test]
async fn test_validation_paths_for_each_rule() {
    let cases = [
        (json!([{ "name": {}, "properties": { "target": { "type": "link" } } }]), "items[0].name"),
        (
            json!([{ "name": { "uk": "  " }, "properties": { "target": { "type": "link" } } }]),
            "items[0].name.uk",
        ),
        (json!([{ "name": { "uk": "A" }, "properties": [] }]), "items[0].properties"),
        (json!([{ "name": { "uk": "A" } }]), "items[0].properties"),
        (json!([{ "name": { "uk": "A" }, "properties": {} }]), "items[0].properties.target"),
        (
            json!([{ "name": { "uk": "A" }, "properties": { "target": { "type": "video" } } }]),
            "items[0].properties.target.type",
        ),
        (
            json!([{ "name": { "uk": "A" }, "properties": { "target": { "type": "page", "id": "x" } } }]),
            "items[0].properties.target.id",
        ),
    ];
    for (forest, expected) in cases {
        assert_eq!(validation_path(validate_forest(&items(forest))), expected);
    }
}

#[test]
async fn test_validation_accepts_extra_keys_and_numeric_string_ids() {
    let forest = items(json!([{
        "name": { "uk": "A", "en": "A" },
        "properties": { "icon": "star", "target": { "type": "page", "id": "12", "extra": true } }
    }]));
    assert!(validate_forest(&forest).is_ok());
}

// --- Planning ---

#[test]
async fn test_plan_assigns_depth_first_bounds() {
    let forest = items(json!([
        {
            "name": { "uk": "A" },
            "properties": { "target": { "type": "link", "url": "/a" } },
            "children": [
                { "name": { "uk": "A1" }, "properties": { "target": { "type": "link", "url": "/a1" } } }
            ]
        },
        { "name": { "uk": "B" }, "properties": { "target": { "type": "link", "url": "/b" } }, "visibility": false }
    ]));
    let plan = plan_forest(&forest);

    let shape: Vec<(Option<usize>, i32, i32, bool)> = plan
        .iter()
        .map(|p| (p.parent, p.left_bound, p.right_bound, p.visibility))
        .collect();
    assert_eq!(
        shape,
        vec![
            (None, 1, 4, true),
            (Some(0), 2, 3, true),
            (None, 5, 6, false),
        ]
    );
}

// --- Service-level rebuild ---

#[test]
async fn test_rebuild_catalog_scenario_materializes_publicly() {
    let repo = Arc::new(InMemoryRepository::new());
    let menus = service(repo.clone());

    menus
        .rebuild(
            &editor(),
            RebuildRequest {
                layout: 2,
                items: catalog_forest(),
            },
        )
        .await
        .unwrap();

    let public = menus.public_tree(2, "uk").await.unwrap();
    let shoes_id = public[0].children[0].id;
    assert_eq!(
        public,
        vec![PublicMenuNode {
            id: public[0].id,
            name: "Каталог".to_string(),
            url: "/catalog".to_string(),
            children: vec![PublicMenuNode {
                id: shoes_id,
                name: "Взуття".to_string(),
                url: "/catalog/shoes".to_string(),
                children: vec![],
            }],
        }]
    );
}

#[test]
async fn test_rebuild_replaces_layout_and_round_trips() {
    let repo = Arc::new(InMemoryRepository::new());
    let menus = service(repo.clone());

    // prior content in the target layout and in a neighbour layout
    for layout in [1, 2] {
        repo.create_menu_node(NewMenuNode {
            layout,
            name: LocalizedText::new().with("uk", "Old"),
            properties: json!({ "target": { "type": "link", "url": "/old" } }),
            parent_id: None,
            visibility: true,
        })
        .await
        .unwrap();
    }

    let forest = items(json!([
        {
            "name": { "uk": "Головна", "en": "Home" },
            "properties": { "target": { "type": "page", "id": 1 } }
        },
        {
            "name": { "uk": "Послуги" },
            "properties": { "target": { "type": "link", "url": "/services" }, "icon": "gear" },
            "visibility": false,
            "children": [
                { "name": { "uk": "Дизайн" }, "properties": { "target": { "type": "link", "url": "/d" } } },
                {
                    "name": { "uk": "Розробка" },
                    "properties": { "target": { "type": "link", "url": "/dev" } },
                    "children": [
                        { "name": { "en": "Rust" }, "properties": { "target": { "type": "link", "url": "/rust" } } }
                    ]
                }
            ]
        }
    ]));

    let returned = menus
        .rebuild(
            &editor(),
            RebuildRequest {
                layout: 1,
                items: forest.clone(),
            },
        )
        .await
        .unwrap();
    assert_isomorphic(&returned, &forest);

    let stored = repo.list_menu_nodes(1, true).await.unwrap();
    assert_eq!(stored.len(), 5);
    assert!(stored.iter().all(|n| n.name.get("uk") != Some("Old")));
    assert!(verify_layout(&stored).is_empty());

    let neighbour = repo.list_menu_nodes(2, true).await.unwrap();
    assert_eq!(neighbour.len(), 1);

    let relisted = menus.admin_tree(&editor(), 1).await.unwrap();
    assert_isomorphic(&relisted, &forest);
}

#[test]
async fn test_rebuild_with_invalid_payload_changes_nothing() {
    let repo = Arc::new(InMemoryRepository::new());
    let menus = service(repo.clone());
    menus
        .rebuild(
            &editor(),
            RebuildRequest {
                layout: 1,
                items: catalog_forest(),
            },
        )
        .await
        .unwrap();
    let before = repo.snapshot().await;

    let result = menus
        .rebuild(
            &editor(),
            RebuildRequest {
                layout: 1,
                items: items(json!([{ "name": { "uk": "X" }, "properties": { "target": { "type": "nope" } } }])),
            },
        )
        .await;

    assert!(matches!(result, Err(MenuError::Validation { .. })));
    assert_eq!(repo.snapshot().await, before);
}

#[test]
async fn test_rebuild_store_failure_rolls_back() {
    let repo = Arc::new(InMemoryRepository::failing_rebuild_after(1));
    repo.create_menu_node(NewMenuNode {
        layout: 1,
        name: LocalizedText::new().with("uk", "Keep me"),
        properties: json!({ "target": { "type": "link", "url": "/keep" } }),
        parent_id: None,
        visibility: true,
    })
    .await
    .unwrap();
    let before = repo.snapshot().await;
    let menus = service(repo.clone());

    let result = menus
        .rebuild(
            &editor(),
            RebuildRequest {
                layout: 1,
                items: catalog_forest(),
            },
        )
        .await;

    assert!(matches!(result, Err(MenuError::Storage(_))));
    assert_eq!(repo.snapshot().await, before);
}

#[test]
async fn test_rebuild_with_empty_forest_clears_layout() {
    let repo = Arc::new(InMemoryRepository::new());
    let menus = service(repo.clone());
    menus
        .rebuild(
            &editor(),
            RebuildRequest {
                layout: 4,
                items: catalog_forest(),
            },
        )
        .await
        .unwrap();

    let tree = menus
        .rebuild(
            &editor(),
            RebuildRequest {
                layout: 4,
                items: vec![],
            },
        )
        .await
        .unwrap();

    assert!(tree.is_empty());
    assert!(repo.list_menu_nodes(4, true).await.unwrap().is_empty());
}

// --- Depth limit ---

/// A rebuild body holding one path `levels` deep, as it arrives over HTTP.
fn nested_request_body(layout: i16, levels: usize) -> String {
    let mut item: Option<Value> = None;
    for level in (0..levels).rev() {
        let children: Vec<Value> = item.take().into_iter().collect();
        item = Some(json!({
            "name": { "uk": format!("level {}", level + 1) },
            "properties": { "target": { "type": "link", "url": format!("/l{}", level + 1) } },
            "children": children
        }));
    }
    json!({ "layout": layout, "items": item.into_iter().collect::<Vec<_>>() }).to_string()
}

#[test]
async fn test_rebuild_accepts_forest_at_depth_limit() {
    let request: RebuildRequest =
        serde_json::from_str(&nested_request_body(1, MAX_MENU_DEPTH)).unwrap();
    let forest = request.items.clone();

    let repo = Arc::new(InMemoryRepository::new());
    let returned = service(repo.clone()).rebuild(&editor(), request).await.unwrap();

    assert_isomorphic(&returned, &forest);
    let stored = repo.list_menu_nodes(1, true).await.unwrap();
    assert_eq!(stored.len(), MAX_MENU_DEPTH);
    assert!(verify_layout(&stored).is_empty());
}

#[test]
async fn test_rebuild_rejects_forest_past_depth_limit_with_path() {
    let request: RebuildRequest =
        serde_json::from_str(&nested_request_body(1, MAX_MENU_DEPTH + 1)).unwrap();

    let expected = format!("items[0]{}", ".children[0]".repeat(MAX_MENU_DEPTH));
    assert_eq!(validation_path(validate_forest(&request.items)), expected);

    let repo = Arc::new(InMemoryRepository::new());
    let result = service(repo.clone()).rebuild(&editor(), request).await;
    assert!(matches!(result, Err(MenuError::Validation { .. })));
    assert!(repo.snapshot().await.is_empty());
}

#[test]
async fn test_deepest_tree_built_by_creates_survives_rebuild() {
    let repo = Arc::new(InMemoryRepository::new());
    let menus = service(repo.clone());
    let mut parent_id = None;
    for level in 0..MAX_MENU_DEPTH {
        let created = menus
            .create(
                &editor(),
                NewMenuNode {
                    layout: 3,
                    name: LocalizedText::new().with("uk", format!("n{}", level)),
                    properties: json!({ "target": { "type": "link", "url": "/" } }),
                    parent_id,
                    visibility: true,
                },
            )
            .await
            .unwrap();
        parent_id = Some(created.id);
    }

    let exported = menus.admin_tree(&editor(), 3).await.unwrap();
    let body = json!({ "layout": 3, "items": exported }).to_string();
    let request: RebuildRequest = serde_json::from_str(&body).unwrap();
    let forest = request.items.clone();

    let rebuilt = menus.rebuild(&editor(), request).await.unwrap();
    assert_isomorphic(&rebuilt, &forest);
}

// --- Returned tree ---

/// Lands one more root in the layout right after every rebuild commits.
struct BusyLayout {
    inner: Arc<InMemoryRepository>,
}

#[async_trait]
impl Repository for BusyLayout {
    async fn get_user(&self, id: Uuid) -> MenuResult<Option<User>> {
        self.inner.get_user(id).await
    }
    async fn page_slugs(&self, ids: &[i64]) -> MenuResult<HashMap<i64, String>> {
        self.inner.page_slugs(ids).await
    }
    async fn list_menu_nodes(&self, layout: i16, include_hidden: bool) -> MenuResult<Vec<MenuNode>> {
        self.inner.list_menu_nodes(layout, include_hidden).await
    }
    async fn get_menu_node(&self, id: i64) -> MenuResult<Option<MenuNode>> {
        self.inner.get_menu_node(id).await
    }
    async fn create_menu_node(&self, node: NewMenuNode) -> MenuResult<MenuNode> {
        self.inner.create_menu_node(node).await
    }
    async fn move_menu_node(&self, id: i64, target: MoveMenuNode) -> MenuResult<MenuNode> {
        self.inner.move_menu_node(id, target).await
    }
    async fn delete_menu_subtree(&self, id: i64) -> MenuResult<u64> {
        self.inner.delete_menu_subtree(id).await
    }
    async fn clear_menu_layout(&self, layout: i16) -> MenuResult<u64> {
        self.inner.clear_menu_layout(layout).await
    }
    async fn replace_menu_layout(
        &self,
        layout: i16,
        plan: Vec<PlannedNode>,
    ) -> MenuResult<Vec<MenuNode>> {
        let inserted = self.inner.replace_menu_layout(layout, plan).await?;
        self.inner
            .create_menu_node(NewMenuNode {
                layout,
                name: LocalizedText::new().with("uk", "Пізніше"),
                properties: json!({ "target": { "type": "link", "url": "/later" } }),
                parent_id: None,
                visibility: true,
            })
            .await?;
        Ok(inserted)
    }
    async fn update_menu_node(&self, id: i64, patch: MenuNodePatch) -> MenuResult<MenuNode> {
        self.inner.update_menu_node(id, patch).await
    }
}

#[test]
async fn test_rebuild_returns_the_rows_it_committed() {
    let inner = Arc::new(InMemoryRepository::new());
    let menus = MenuService::new(
        Arc::new(BusyLayout {
            inner: inner.clone(),
        }),
        Arc::new(RoleGate::default()),
        "uk",
    );

    let forest = catalog_forest();
    let returned = menus
        .rebuild(
            &editor(),
            RebuildRequest {
                layout: 1,
                items: forest.clone(),
            },
        )
        .await
        .unwrap();

    assert_isomorphic(&returned, &forest);
    // the later write is in the store but not in the rebuild's answer
    assert_eq!(inner.list_menu_nodes(1, true).await.unwrap().len(), 3);
}
