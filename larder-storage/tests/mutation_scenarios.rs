//! End-to-end mutation scenarios over the in-memory store.

use larder_core::{
    EntityType, Ingredient, IngredientId, IngredientPatch, LarderError, Patch, Recipe, RecipeId,
    RecipePatch, RecordIdType, UserId,
};
use larder_storage::{CacheKey, CacheValue, Freshness, RecordStore, SessionWatcher, StoreOp};
use tokio::sync::broadcast;

use test_support::{draft, harness, recipe_draft, settle};

#[tokio::test]
async fn test_create_converges_to_server_row() {
    let h = harness("u1");
    let recipe = RecipeId::from("R1");
    h.seed_ingredients(&recipe, &[]).await;
    assert_eq!(h.cached_ingredients(&recipe), Some(vec![]));

    h.store.queue_id("abc");
    h.store.hold();
    let handle = h
        .coordinator
        .create::<Ingredient>(recipe.clone(), draft("Salt", 1.0))
        .unwrap();

    let optimistic = h.cached_ingredients(&recipe).unwrap();
    assert_eq!(optimistic.len(), 1);
    assert!(optimistic[0].id.is_temporary());
    assert_eq!(Some(optimistic[0].id.as_str()), handle.temp_id());
    assert_eq!(optimistic[0].name, "Salt");

    h.store.release();
    let created = handle.wait().await.unwrap();
    assert_eq!(created.id, IngredientId::from("abc"));
    assert_eq!(created.owner_id, UserId::from("u1"));

    let rows = h.cached_ingredients(&recipe).unwrap();
    assert_eq!(rows, vec![created]);
    assert_eq!(h.cache.pending_count(&CacheKey::ingredients(&recipe)), 0);
}

#[tokio::test]
async fn test_delete_of_missing_row_rolls_back() {
    let h = harness("u1");
    let recipe = RecipeId::from("R1");
    h.store.queue_id("abc");
    let before = h.seed_ingredients(&recipe, &[draft("Salt", 1.0)]).await;
    let id = IngredientId::from("abc");

    // Gone server-side, still cached locally.
    h.store.delete::<Ingredient>(&id).await.unwrap();

    h.store.hold();
    let handle = h.coordinator.delete::<Ingredient>(recipe.clone(), id).unwrap();
    assert_eq!(h.cached_ingredients(&recipe), Some(vec![]));

    h.store.release();
    let err = handle.wait().await.unwrap_err();
    assert_eq!(err, LarderError::not_found(EntityType::Ingredient, "abc"));
    assert_eq!(h.cached_ingredients(&recipe), Some(before));
    assert!(h.cache.is_invalidated(&CacheKey::ingredients(&recipe)));

    let refreshed = h
        .reads
        .list::<Ingredient>(&recipe, Freshness::consistent())
        .await
        .unwrap();
    assert!(refreshed.was_cache_miss());
    assert!(refreshed.value().is_empty());
}

#[tokio::test]
async fn test_updates_on_one_key_are_issued_in_order() {
    let h = harness("u1");
    let recipe = RecipeId::from("R1");
    let rows = h
        .seed_ingredients(&recipe, &[draft("Salt", 1.0), draft("Pepper", 1.0)])
        .await;
    h.store.clear_calls();

    h.store.hold();
    let first = h
        .coordinator
        .update::<Ingredient>(
            recipe.clone(),
            rows[0].id.clone(),
            IngredientPatch {
                quantity: Some(2.0),
                ..Default::default()
            },
        )
        .unwrap();
    let second = h
        .coordinator
        .update::<Ingredient>(
            recipe.clone(),
            rows[1].id.clone(),
            IngredientPatch {
                quantity: Some(3.0),
                ..Default::default()
            },
        )
        .unwrap();
    settle().await;

    // The second update waits for the first to settle before it is sent.
    assert_eq!(h.store.call_count(StoreOp::Update), 1);
    let optimistic = h.cached_ingredients(&recipe).unwrap();
    assert_eq!(optimistic[0].quantity, 2.0);
    assert_eq!(optimistic[1].quantity, 3.0);

    h.store.release();
    first.wait().await.unwrap();
    second.wait().await.unwrap();

    let targets: Vec<_> = h
        .store
        .calls()
        .into_iter()
        .filter(|call| call.op == StoreOp::Update)
        .map(|call| call.target)
        .collect();
    assert_eq!(
        targets,
        vec![Some(rows[0].id.to_string()), Some(rows[1].id.to_string())]
    );
}

#[tokio::test]
async fn test_failed_update_between_successes_keeps_later_change() {
    let h = harness("u1");
    let recipe = RecipeId::from("R1");
    let rows = h.seed_ingredients(&recipe, &[draft("Salt", 1.0)]).await;
    let id = rows[0].id.clone();

    h.store.hold();
    h.store.fail_next(StoreOp::Update, LarderError::internal("boom"));
    let failing = h
        .coordinator
        .update::<Ingredient>(
            recipe.clone(),
            id.clone(),
            IngredientPatch {
                notes: Patch::Set("coarse".into()),
                ..Default::default()
            },
        )
        .unwrap();
    let succeeding = h
        .coordinator
        .update::<Ingredient>(
            recipe.clone(),
            id.clone(),
            IngredientPatch {
                quantity: Some(4.0),
                ..Default::default()
            },
        )
        .unwrap();

    h.store.release();
    assert!(failing.wait().await.is_err());
    let updated = succeeding.wait().await.unwrap();

    let cached = h.cached_ingredients(&recipe).unwrap();
    assert_eq!(cached, vec![updated.clone()]);
    assert_eq!(updated.quantity, 4.0);
    assert_eq!(updated.notes, None);
}

#[tokio::test]
async fn test_identity_switch_discards_inflight_mutation() {
    let h = harness("alice");
    let recipe = RecipeId::from("R1");
    h.seed_ingredients(&recipe, &[draft("Salt", 1.0)]).await;

    let (tx, rx) = broadcast::channel(8);
    let subscription =
        SessionWatcher::spawn(h.cache.clone(), rx, Some(UserId::from("alice")));

    h.store.hold();
    let handle = h
        .coordinator
        .create::<Ingredient>(recipe.clone(), draft("Pepper", 1.0))
        .unwrap();
    assert_eq!(h.cached_ingredients(&recipe).map(|rows| rows.len()), Some(2));

    tx.send(larder_core::SessionEvent {
        previous_user_id: Some(UserId::from("alice")),
        session: None,
    })
    .unwrap();
    settle().await;
    assert_eq!(h.cached_ingredients(&recipe), None);

    h.store.release();
    handle.wait().await.unwrap();
    assert_eq!(h.cached_ingredients(&recipe), None);
    assert_eq!(subscription.switches(), 1);
    subscription.cancel().await;
}

#[tokio::test]
async fn test_read_racing_a_mutation_is_not_written_back() {
    let h = harness("u1");
    let recipe = RecipeId::from("R1");
    h.store.create::<Ingredient>(&recipe, &draft("Salt", 1.0)).await.unwrap();

    h.store.hold();
    let read = tokio::spawn({
        let reads = h.reads.clone();
        let recipe = recipe.clone();
        async move { reads.list::<Ingredient>(&recipe, Freshness::Refetch).await }
    });
    settle().await;

    let handle = h
        .coordinator
        .create::<Ingredient>(recipe.clone(), draft("Pepper", 1.0))
        .unwrap();
    h.store.release();

    let listed = read.await.unwrap().unwrap();
    assert!(listed.is_optimistic());
    let created = handle.wait().await.unwrap();

    let cached = h.cached_ingredients(&recipe).unwrap();
    assert!(cached.contains(&created));
    assert!(cached.iter().all(|row| !row.id.is_temporary()));
    assert!(h.cache.stats().discarded_reads >= 1);
}

#[tokio::test]
async fn test_record_fetch_in_flight_before_update_is_discarded() {
    let h = harness("u1");
    let recipe: Recipe = h.store.create(&(), &recipe_draft("Soup")).await.unwrap();
    let key = CacheKey::recipe(&recipe.id);

    // Fetch started, nothing cached for the record yet.
    let stale = h.cache.begin_read(&key);
    let updated = h
        .coordinator
        .update::<Recipe>(
            (),
            recipe.id.clone(),
            RecipePatch {
                name: Some("Stew".into()),
                ..Default::default()
            },
        )
        .unwrap()
        .wait()
        .await
        .unwrap();
    assert_eq!(updated.name, "Stew");

    assert!(!h.cache.complete_read(stale, CacheValue::Recipe(recipe.clone())));
    assert_eq!(h.cached_recipe(&recipe.id), None);
    let read = h
        .reads
        .get::<Recipe>(&recipe.id, Freshness::consistent())
        .await
        .unwrap();
    assert_eq!(read.into_value().name, "Stew");
}

#[tokio::test]
async fn test_record_fetch_overlapping_delete_is_discarded() {
    let h = harness("u1");
    let recipe: Recipe = h.store.create(&(), &recipe_draft("Soup")).await.unwrap();
    let key = CacheKey::recipe(&recipe.id);

    let before_delete = h.cache.begin_read(&key);
    h.store.hold();
    let handle = h.coordinator.delete::<Recipe>((), recipe.id.clone()).unwrap();
    let during_delete = h.cache.begin_read(&key);
    h.store.release();
    handle.wait().await.unwrap();

    assert!(!h.cache.complete_read(before_delete, CacheValue::Recipe(recipe.clone())));
    assert!(!h.cache.complete_read(during_delete, CacheValue::Recipe(recipe.clone())));
    assert!(!h.cache.contains(&key));
}

#[tokio::test]
async fn test_list_fetch_overlapping_create_keeps_created_row() {
    let h = harness("u1");
    let recipe = RecipeId::from("R1");
    h.seed_ingredients(&recipe, &[]).await;
    let key = CacheKey::ingredients(&recipe);

    h.store.queue_id("abc");
    h.store.hold();
    let handle = h
        .coordinator
        .create::<Ingredient>(recipe.clone(), draft("Salt", 1.0))
        .unwrap();
    // Answered from a snapshot taken before the insert.
    let overlapping = h.cache.begin_read(&key);
    h.store.release();
    let created = handle.wait().await.unwrap();

    assert!(!h.cache.complete_read(overlapping, CacheValue::Ingredients(vec![])));
    assert_eq!(h.cached_ingredients(&recipe), Some(vec![created]));
}

#[tokio::test]
async fn test_failed_recipe_mutations_restore_list_and_record() {
    let h = harness("u1");
    let recipe = h.seed_recipe("Soup").await;
    h.seed_ingredients(&recipe.id, &[draft("Salt", 1.0)]).await;
    let list_before = h.cached_recipes();
    let record_before = h.cached_recipe(&recipe.id);
    let ingredients_before = h.cached_ingredients(&recipe.id);
    assert!(list_before.is_some());
    assert_eq!(record_before.as_ref(), Some(&recipe));

    h.store.hold();
    h.store.fail_next(StoreOp::Update, LarderError::internal("down"));
    let update = h
        .coordinator
        .update::<Recipe>(
            (),
            recipe.id.clone(),
            RecipePatch {
                name: Some("Stew".into()),
                notes: Patch::Set("thick".into()),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(h.cached_recipe(&recipe.id).map(|r| r.name), Some("Stew".into()));
    assert_eq!(h.cached_recipes().unwrap()[0].name, "Stew");
    h.store.release();
    assert!(update.wait().await.is_err());

    assert_eq!(h.cached_recipes(), list_before);
    assert_eq!(h.cached_recipe(&recipe.id), record_before);
    assert!(!h.cache.is_invalidated(&CacheKey::Recipes));
    assert!(!h.cache.is_invalidated(&CacheKey::recipe(&recipe.id)));

    h.store.fail_next(StoreOp::Delete, LarderError::internal("down"));
    let delete = h.coordinator.delete::<Recipe>((), recipe.id.clone()).unwrap();
    assert_eq!(h.cached_recipes(), Some(vec![]));
    assert!(delete.wait().await.is_err());

    assert_eq!(h.cached_recipes(), list_before);
    assert_eq!(h.cached_recipe(&recipe.id), record_before);
    assert_eq!(h.cached_ingredients(&recipe.id), ingredients_before);
    assert!(!h.cache.is_invalidated(&CacheKey::ingredients(&recipe.id)));
}

#[tokio::test]
async fn test_create_refreshes_cached_record_for_new_id() {
    let h = harness("u1");
    let id = RecipeId::from("abc");
    let mut stale: Recipe = h.store.create(&(), &recipe_draft("Old")).await.unwrap();
    stale.id = id.clone();
    h.cache.set(CacheKey::recipe(&id), CacheValue::Recipe(stale));

    h.store.queue_id("abc");
    let created = h
        .coordinator
        .create::<Recipe>((), recipe_draft("Soup"))
        .unwrap()
        .wait()
        .await
        .unwrap();
    assert_eq!(created.id, id);
    assert_eq!(h.cached_recipe(&id), Some(created));
}
