//! Record and object store adapters against the fake backend.

use std::time::Duration;

use larder_client::{ApiClient, AuthClient, RestObjectStore, RestRecordStore};
use larder_core::{
    AuthError, AuthProvider, EntityType, Ingredient, IngredientId, IngredientPatch, LarderError,
    NetworkError, Patch, Recipe, RecipeDraft, UserId, ValidationError,
};
use larder_storage::{ObjectStore, RecordStore};
use larder_test_utils::assertions::{assert_auth_error, assert_not_found, assert_validation_error};
use larder_test_utils::fixtures::{salt_draft, soup_draft};
use serde_json::json;

use test_support::{config_for, FakeBackend, ANON_KEY, BUCKET, PASSWORD};

struct Clients {
    records: RestRecordStore,
    objects: RestObjectStore,
}

async fn signed_in(backend: &FakeBackend) -> Clients {
    backend.add_user("alice@example.com", "alice");
    let api = ApiClient::new(&backend.config()).unwrap();
    let auth = AuthClient::new(api.clone(), None);
    auth.sign_in("alice@example.com", PASSWORD).await.unwrap();
    Clients {
        records: RestRecordStore::new(api.clone()),
        objects: RestObjectStore::new(api, BUCKET),
    }
}

#[tokio::test]
async fn test_create_returns_server_row() {
    let backend = FakeBackend::start().await;
    let clients = signed_in(&backend).await;

    let recipe: Recipe = clients.records.create(&(), &soup_draft()).await.unwrap();
    assert_eq!(recipe.owner_id, UserId::from("alice"));
    assert_eq!(recipe.name, "Tomato soup");

    backend.queue_id("abc");
    let salt: Ingredient = clients.records.create(&recipe.id, &salt_draft()).await.unwrap();
    assert_eq!(salt.id, IngredientId::from("abc"));
    assert_eq!(salt.recipe_id, recipe.id);

    let request = backend
        .last_request("POST", "/rest/v1/recipe_ingredients")
        .unwrap();
    let body = request.body.clone().unwrap();
    assert_eq!(body["recipe_id"], json!(recipe.id.to_string()));
    assert!(body.get("owner_id").is_none());
    assert!(body.get("id").is_none());
    assert_eq!(request.header("prefer"), Some("return=representation"));
    assert_eq!(request.header("apikey"), Some(ANON_KEY));
    assert!(request
        .header("authorization")
        .is_some_and(|v| v.starts_with("Bearer at-")));
}

#[tokio::test]
async fn test_list_filters_by_parent_in_creation_order() {
    let backend = FakeBackend::start().await;
    let clients = signed_in(&backend).await;
    let recipe: Recipe = clients.records.create(&(), &soup_draft()).await.unwrap();
    let other: Recipe = clients.records.create(&(), &soup_draft()).await.unwrap();

    for name in ["Salt", "Pepper", "Thyme"] {
        let mut draft = salt_draft();
        draft.name = name.to_string();
        let _: Ingredient = clients.records.create(&recipe.id, &draft).await.unwrap();
    }
    let _: Ingredient = clients.records.create(&other.id, &salt_draft()).await.unwrap();

    let rows: Vec<Ingredient> = clients.records.list(&recipe.id).await.unwrap();
    let names: Vec<&str> = rows.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["Salt", "Pepper", "Thyme"]);

    let request = backend.last_request("GET", "/rest/v1/recipe_ingredients").unwrap();
    assert_eq!(
        request.query_value("recipe_id"),
        Some(format!("eq.{}", recipe.id).as_str())
    );
    assert_eq!(request.query_value("order"), Some("created_at.asc,id.asc"));

    let recipes: Vec<Recipe> = clients.records.list(&()).await.unwrap();
    assert_eq!(recipes.len(), 2);
}

#[tokio::test]
async fn test_update_sends_three_state_patch() {
    let backend = FakeBackend::start().await;
    let clients = signed_in(&backend).await;
    let recipe: Recipe = clients.records.create(&(), &soup_draft()).await.unwrap();
    let mut draft = salt_draft();
    draft.notes = Some("coarse".into());
    draft.unit = Some("tsp".into());
    let salt: Ingredient = clients.records.create(&recipe.id, &draft).await.unwrap();

    let patch = IngredientPatch {
        quantity: Some(2.0),
        notes: Patch::Clear,
        ..Default::default()
    };
    let updated: Ingredient = clients.records.update(&salt.id, &patch).await.unwrap();
    assert_eq!(updated.quantity, 2.0);
    assert_eq!(updated.notes, None);
    assert_eq!(updated.unit.as_deref(), Some("tsp"));

    let body = backend
        .last_request("PATCH", "/rest/v1/recipe_ingredients")
        .and_then(|r| r.body)
        .unwrap();
    assert_eq!(body, json!({ "quantity": 2.0, "notes": null }));
}

#[tokio::test]
async fn test_missing_rows_are_not_found() {
    let backend = FakeBackend::start().await;
    let clients = signed_in(&backend).await;
    let missing = IngredientId::from("abc");

    let fetched = clients.records.fetch::<Ingredient>(&missing).await;
    assert_not_found(&fetched, EntityType::Ingredient);

    let updated = clients
        .records
        .update::<Ingredient>(&missing, &IngredientPatch { quantity: Some(1.0), ..Default::default() })
        .await;
    assert_not_found(&updated, EntityType::Ingredient);

    let deleted = clients.records.delete::<Ingredient>(&missing).await;
    assert_eq!(
        deleted,
        Err(LarderError::not_found(EntityType::Ingredient, "abc"))
    );
}

#[tokio::test]
async fn test_delete_removes_row() {
    let backend = FakeBackend::start().await;
    let clients = signed_in(&backend).await;
    let recipe: Recipe = clients.records.create(&(), &soup_draft()).await.unwrap();

    clients.records.delete::<Recipe>(&recipe.id).await.unwrap();
    assert!(backend.rows("recipes").is_empty());
    assert!(clients.records.fetch::<Recipe>(&recipe.id).await.is_err());
}

#[tokio::test]
async fn test_schema_rejection_is_validation_error() {
    let backend = FakeBackend::start().await;
    let clients = signed_in(&backend).await;

    let draft = RecipeDraft {
        name: "  ".into(),
        serving_size: 2,
        ..Default::default()
    };
    let result = clients.records.create::<Recipe>(&(), &draft).await;
    assert_validation_error(&result);
    match result {
        Err(LarderError::Validation(ValidationError::Rejected { message })) => {
            assert!(message.contains("check constraint"));
        }
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn test_anonymous_writes_are_auth_errors() {
    let backend = FakeBackend::start().await;
    let api = ApiClient::new(&backend.config()).unwrap();
    let records = RestRecordStore::new(api);

    let listed: Vec<Recipe> = records.list(&()).await.unwrap();
    assert!(listed.is_empty());

    let created = records.create::<Recipe>(&(), &soup_draft()).await;
    assert_auth_error(&created);

    let request = backend.last_request("POST", "/rest/v1/recipes").unwrap();
    assert_eq!(request.header("authorization"), Some("Bearer anon-key"));
}

#[tokio::test]
async fn test_server_failures_are_network_errors() {
    let backend = FakeBackend::start().await;
    let clients = signed_in(&backend).await;

    backend.fail_next(503, json!({ "message": "upstream unavailable" }));
    let result = clients.records.list::<Recipe>(&()).await;
    assert_eq!(
        result,
        Err(LarderError::Network(NetworkError::Server {
            status: 503,
            message: "upstream unavailable".into(),
        }))
    );
    assert!(result.unwrap_err().is_retryable());

    backend.fail_next(401, json!({ "code": "PGRST301", "message": "JWT expired" }));
    let result = clients.records.list::<Recipe>(&()).await;
    assert_eq!(result, Err(LarderError::Auth(AuthError::SessionExpired)));
}

#[tokio::test]
async fn test_timeout_and_transport_failures() {
    let backend = FakeBackend::start().await;
    let mut config = backend.config();
    config.request_timeout_ms = 50;
    let records = RestRecordStore::new(ApiClient::new(&config).unwrap());

    backend.set_delay(Duration::from_millis(500));
    let result = records.list::<Recipe>(&()).await;
    assert_eq!(result, Err(LarderError::Network(NetworkError::Timeout)));

    // Nothing listens on port 9 of localhost.
    let records = RestRecordStore::new(ApiClient::new(&config_for("http://127.0.0.1:9")).unwrap());
    let result = records.list::<Recipe>(&()).await;
    assert!(matches!(
        result,
        Err(LarderError::Network(NetworkError::Transport { .. }))
    ));
}

#[tokio::test]
async fn test_upload_and_sign_object() {
    let backend = FakeBackend::start().await;
    let clients = signed_in(&backend).await;

    let stored = clients
        .objects
        .upload("alice/r1/photo.png", vec![1, 2, 3], "image/png")
        .await
        .unwrap();
    assert_eq!(stored, "alice/r1/photo.png");
    assert_eq!(
        backend.object(&format!("{BUCKET}/alice/r1/photo.png")),
        Some(vec![1, 2, 3])
    );
    let upload = backend.last_request("POST", "/storage/v1/object/recipe-images").unwrap();
    assert_eq!(upload.header("content-type"), Some("image/png"));

    let url = clients
        .objects
        .create_signed_url("alice/r1/photo.png", Duration::from_secs(3600))
        .await
        .unwrap();
    let prefix = format!(
        "{}/storage/v1/object/sign/{BUCKET}/alice/r1/photo.png?token=",
        backend.base_url()
    );
    assert!(url.starts_with(&prefix), "{url}");
    let sign = backend.last_request("POST", "/storage/v1/object/sign/").unwrap();
    assert_eq!(sign.body, Some(json!({ "expiresIn": 3600 })));

    let missing = clients
        .objects
        .create_signed_url("alice/r1/missing.png", Duration::from_secs(60))
        .await;
    assert!(matches!(
        missing,
        Err(LarderError::Validation(ValidationError::InvalidValue { .. }))
    ));

}
