//! The `Larder` facade: one value wiring auth, the stores, the cache and the
//! mutation coordinator together for a client application.

use std::sync::Arc;

use larder_core::{
    AuthError, AuthProvider, GroceryItem, GroceryItemDraft, GroceryItemId, GroceryItemPatch,
    GroceryListId, Ingredient, IngredientDraft, IngredientId, IngredientPatch, LarderResult,
    PantryId, PantryItem, PantryItemDraft, PantryItemId, PantryItemPatch, Recipe, RecipeDraft,
    RecipeId, RecipePatch,
};
use larder_storage::{
    CacheRead, Freshness, KeyedCache, MutationCoordinator, MutationHandle, ReadThrough,
    RecipeImages, Resource, SessionSubscription, SessionWatcher,
};

use crate::api_client::ApiClient;
use crate::auth::{AutoRefresh, AuthClient};
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::objects::RestObjectStore;
use crate::rest::RestRecordStore;

pub struct Larder {
    config: ClientConfig,
    auth: AuthClient,
    cache: Arc<KeyedCache>,
    reads: ReadThrough<RestRecordStore>,
    mutations: MutationCoordinator<RestRecordStore>,
    images: RecipeImages<RestRecordStore, RestObjectStore>,
    watcher: Option<SessionSubscription>,
    refresher: Option<AutoRefresh>,
}

impl std::fmt::Debug for Larder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Larder")
            .field("base_url", &self.config.base_url())
            .field("auth", &self.auth)
            .finish_non_exhaustive()
    }
}

impl Larder {
    /// Build every component from `config` and start the background tasks.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn connect(config: ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;
        let api = ApiClient::new(&config)?;
        let auth = AuthClient::new(api.clone(), config.password_reset_redirect.clone());

        let cache = Arc::new(KeyedCache::new(config.cache_config()));
        let records = Arc::new(RestRecordStore::new(api.clone()));
        let objects = Arc::new(RestObjectStore::new(api, config.image_bucket.clone()));

        let reads = ReadThrough::new(Arc::clone(&cache), Arc::clone(&records));
        let mutations = MutationCoordinator::new(Arc::clone(&cache), records);
        let images = RecipeImages::new(mutations.clone(), objects, config.image_config());

        let watcher = SessionWatcher::spawn(
            Arc::clone(&cache),
            auth.subscribe(),
            auth.current_user_id(),
        );
        let refresher = config
            .refresh
            .enabled
            .then(|| auth.spawn_auto_refresh(config.refresh.clone()));

        tracing::info!(
            base_url = %config.base_url(),
            bucket = %config.image_bucket,
            auto_refresh = config.refresh.enabled,
            "Larder client connected"
        );

        Ok(Self {
            config,
            auth,
            cache,
            reads,
            mutations,
            images,
            watcher: Some(watcher),
            refresher,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn auth(&self) -> &AuthClient {
        &self.auth
    }

    pub fn cache(&self) -> &Arc<KeyedCache> {
        &self.cache
    }

    pub fn reads(&self) -> &ReadThrough<RestRecordStore> {
        &self.reads
    }

    pub fn mutations(&self) -> &MutationCoordinator<RestRecordStore> {
        &self.mutations
    }

    pub fn images(&self) -> &RecipeImages<RestRecordStore, RestObjectStore> {
        &self.images
    }

    fn default_freshness(&self) -> Freshness {
        self.cache.config().default_freshness()
    }

    // ------------------------------------------------------------------------
    // Generic access
    // ------------------------------------------------------------------------

    /// List `R` under `parent` with the configured staleness bound.
    pub async fn list<R: Resource>(&self, parent: &R::Parent) -> LarderResult<CacheRead<Vec<R>>> {
        self.reads.list::<R>(parent, self.default_freshness()).await
    }

    /// List `R` under `parent`, bypassing any cached value.
    pub async fn refresh<R: Resource>(&self, parent: &R::Parent) -> LarderResult<Vec<R>> {
        self.reads
            .list::<R>(parent, Freshness::Refetch)
            .await
            .map(CacheRead::into_value)
    }

    // ------------------------------------------------------------------------
    // Recipes
    // ------------------------------------------------------------------------

    pub async fn recipes(&self) -> LarderResult<Vec<Recipe>> {
        self.list::<Recipe>(&()).await.map(CacheRead::into_value)
    }

    pub async fn recipe(&self, id: &RecipeId) -> LarderResult<Recipe> {
        self.reads
            .get::<Recipe>(id, self.default_freshness())
            .await
            .map(CacheRead::into_value)
    }

    pub fn create_recipe(&self, draft: RecipeDraft) -> LarderResult<MutationHandle<Recipe>> {
        self.mutations.create::<Recipe>((), draft)
    }

    pub fn update_recipe(
        &self,
        id: RecipeId,
        patch: RecipePatch,
    ) -> LarderResult<MutationHandle<Recipe>> {
        self.mutations.update::<Recipe>((), id, patch)
    }

    pub fn delete_recipe(&self, id: RecipeId) -> LarderResult<MutationHandle<()>> {
        self.mutations.delete::<Recipe>((), id)
    }

    /// Upload an image for `recipe` and attach it. Requires a signed-in user,
    /// whose id prefixes the object path.
    pub async fn upload_recipe_image(
        &self,
        recipe: &RecipeId,
        file_name: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> LarderResult<Recipe> {
        let owner = self.auth.current_user_id().ok_or(AuthError::NotSignedIn)?;
        self.images
            .upload_and_attach(&owner, recipe, file_name, bytes, content_type)
            .await
    }

    /// Signed URL for the recipe's image, if it has one.
    pub async fn recipe_image_url(&self, recipe: &Recipe) -> LarderResult<Option<String>> {
        match recipe.image_url.as_deref() {
            Some(path) if !path.is_empty() => self.images.signed_url(path).await.map(Some),
            _ => Ok(None),
        }
    }

    // ------------------------------------------------------------------------
    // Ingredients
    // ------------------------------------------------------------------------

    pub async fn ingredients(&self, recipe: &RecipeId) -> LarderResult<Vec<Ingredient>> {
        self.list::<Ingredient>(recipe).await.map(CacheRead::into_value)
    }

    pub fn add_ingredient(
        &self,
        recipe: RecipeId,
        draft: IngredientDraft,
    ) -> LarderResult<MutationHandle<Ingredient>> {
        self.mutations.create::<Ingredient>(recipe, draft)
    }

    pub fn update_ingredient(
        &self,
        recipe: RecipeId,
        id: IngredientId,
        patch: IngredientPatch,
    ) -> LarderResult<MutationHandle<Ingredient>> {
        self.mutations.update::<Ingredient>(recipe, id, patch)
    }

    pub fn remove_ingredient(
        &self,
        recipe: RecipeId,
        id: IngredientId,
    ) -> LarderResult<MutationHandle<()>> {
        self.mutations.delete::<Ingredient>(recipe, id)
    }

    // ------------------------------------------------------------------------
    // Pantry
    // ------------------------------------------------------------------------

    pub async fn pantry_items(&self, pantry: &PantryId) -> LarderResult<Vec<PantryItem>> {
        self.list::<PantryItem>(pantry).await.map(CacheRead::into_value)
    }

    pub fn add_pantry_item(
        &self,
        pantry: PantryId,
        draft: PantryItemDraft,
    ) -> LarderResult<MutationHandle<PantryItem>> {
        self.mutations.create::<PantryItem>(pantry, draft)
    }

    pub fn update_pantry_item(
        &self,
        pantry: PantryId,
        id: PantryItemId,
        patch: PantryItemPatch,
    ) -> LarderResult<MutationHandle<PantryItem>> {
        self.mutations.update::<PantryItem>(pantry, id, patch)
    }

    pub fn remove_pantry_item(
        &self,
        pantry: PantryId,
        id: PantryItemId,
    ) -> LarderResult<MutationHandle<()>> {
        self.mutations.delete::<PantryItem>(pantry, id)
    }

    // ------------------------------------------------------------------------
    // Grocery lists
    // ------------------------------------------------------------------------

    pub async fn grocery_items(&self, list: &GroceryListId) -> LarderResult<Vec<GroceryItem>> {
        self.list::<GroceryItem>(list).await.map(CacheRead::into_value)
    }

    pub fn add_grocery_item(
        &self,
        list: GroceryListId,
        draft: GroceryItemDraft,
    ) -> LarderResult<MutationHandle<GroceryItem>> {
        self.mutations.create::<GroceryItem>(list, draft)
    }

    pub fn update_grocery_item(
        &self,
        list: GroceryListId,
        id: GroceryItemId,
        patch: GroceryItemPatch,
    ) -> LarderResult<MutationHandle<GroceryItem>> {
        self.mutations.update::<GroceryItem>(list, id, patch)
    }

    /// Tick or untick an item.
    pub fn set_grocery_item_checked(
        &self,
        list: GroceryListId,
        id: GroceryItemId,
        is_checked: bool,
    ) -> LarderResult<MutationHandle<GroceryItem>> {
        self.update_grocery_item(list, id, GroceryItemPatch::checked(is_checked))
    }

    pub fn remove_grocery_item(
        &self,
        list: GroceryListId,
        id: GroceryItemId,
    ) -> LarderResult<MutationHandle<()>> {
        self.mutations.delete::<GroceryItem>(list, id)
    }

    /// Stop the background tasks.
    pub async fn shutdown(mut self) {
        if let Some(refresher) = self.refresher.take() {
            refresher.stop().await;
        }
        if let Some(watcher) = self.watcher.take() {
            watcher.cancel().await;
        }
        tracing::info!("Larder client shut down");
    }
}
