//! Binds each entity kind to its cache keys, parent scope and wire shapes.
//!
//! Everything generic in this crate (record stores, the read path, the
//! mutation coordinator) is written once against [`Resource`]; the impls at
//! the bottom of this file are the only place that knows which key a recipe
//! or an ingredient lives under.

use std::fmt;

use larder_core::validation::{
    validate_grocery_item_draft, validate_grocery_item_patch, validate_ingredient_draft,
    validate_ingredient_patch, validate_pantry_item_draft, validate_pantry_item_patch,
    validate_recipe_draft, validate_recipe_patch,
};
use larder_core::{
    EntityType, GroceryItem, GroceryItemDraft, GroceryItemId, GroceryItemPatch, GroceryListId,
    Ingredient, IngredientDraft, IngredientId, IngredientPatch, LarderError, LarderResult,
    PantryId, PantryItem, PantryItemDraft, PantryItemId, PantryItemPatch, Recipe, RecipeDraft,
    RecipeId, RecipePatch, RecordIdType, Timestamp, ValidationError,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::cache::{CacheKey, CacheValue};

/// A record kind managed through the cache.
pub trait Resource:
    Clone + fmt::Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    const ENTITY_TYPE: EntityType;

    type Id: RecordIdType + Clone + fmt::Debug + fmt::Display + PartialEq + Send + Sync + 'static;
    /// Scope a collection of this resource is listed under.
    type Parent: Clone + fmt::Debug + PartialEq + Send + Sync + 'static;
    type Draft: Clone + fmt::Debug + Serialize + Send + Sync + 'static;
    type Patch: Clone + fmt::Debug + Serialize + Send + Sync + 'static;

    fn id(&self) -> &Self::Id;

    fn parent(&self) -> Self::Parent;

    fn created_at(&self) -> Timestamp;

    /// Key of the collection this record is listed in.
    fn collection_key(parent: &Self::Parent) -> CacheKey;

    /// Key under which a single record is cached, for kinds that have one.
    fn singleton_key(_id: &Self::Id) -> Option<CacheKey> {
        None
    }

    /// Keys whose contents refer to this record and go stale when it is deleted.
    fn dependent_keys(_id: &Self::Id) -> Vec<CacheKey> {
        Vec::new()
    }

    /// Column and value restricting a listing to `parent`. `None` when rows
    /// are scoped by ownership alone.
    fn parent_filter(parent: &Self::Parent) -> Option<(&'static str, String)>;

    fn placeholder(parent: &Self::Parent, draft: &Self::Draft) -> Self;

    fn apply_patch(&mut self, patch: &Self::Patch);

    fn validate_draft(draft: Self::Draft) -> Result<Self::Draft, ValidationError>;

    fn validate_patch(patch: Self::Patch) -> Result<Self::Patch, ValidationError>;

    fn into_collection(rows: Vec<Self>) -> CacheValue;

    fn from_collection(value: CacheValue) -> Option<Vec<Self>>;

    fn into_single(self) -> Option<CacheValue> {
        None
    }

    fn from_single(_value: CacheValue) -> Option<Self> {
        None
    }

    /// Row sent to the record store when creating a record under `parent`.
    fn insert_payload(parent: &Self::Parent, draft: &Self::Draft) -> LarderResult<Value> {
        let mut payload = serde_json::to_value(draft).map_err(|e| {
            LarderError::internal(format!("failed to encode {:?} draft: {e}", Self::ENTITY_TYPE))
        })?;
        if let (Some((column, value)), Some(row)) =
            (Self::parent_filter(parent), payload.as_object_mut())
        {
            row.insert(column.to_string(), Value::String(value));
        }
        Ok(payload)
    }
}

/// Sort rows the way listings are returned: oldest first, ties broken by id.
pub fn sort_rows<R: Resource>(rows: &mut [R]) {
    rows.sort_by(|a, b| {
        a.created_at()
            .cmp(&b.created_at())
            .then_with(|| a.id().as_str().cmp(b.id().as_str()))
    });
}

// ============================================================================
// IMPLEMENTATIONS FOR LARDER ENTITIES
// ============================================================================

impl Resource for Recipe {
    const ENTITY_TYPE: EntityType = EntityType::Recipe;

    type Id = RecipeId;
    type Parent = ();
    type Draft = RecipeDraft;
    type Patch = RecipePatch;

    fn id(&self) -> &RecipeId {
        &self.id
    }

    fn parent(&self) {}

    fn created_at(&self) -> Timestamp {
        self.created_at
    }

    fn collection_key(_parent: &()) -> CacheKey {
        CacheKey::Recipes
    }

    fn singleton_key(id: &RecipeId) -> Option<CacheKey> {
        Some(CacheKey::recipe(id))
    }

    fn dependent_keys(id: &RecipeId) -> Vec<CacheKey> {
        vec![CacheKey::ingredients(id)]
    }

    fn parent_filter(_parent: &()) -> Option<(&'static str, String)> {
        None
    }

    fn placeholder(_parent: &(), draft: &RecipeDraft) -> Self {
        Recipe::placeholder(draft)
    }

    fn apply_patch(&mut self, patch: &RecipePatch) {
        Recipe::apply_patch(self, patch)
    }

    fn validate_draft(draft: RecipeDraft) -> Result<RecipeDraft, ValidationError> {
        validate_recipe_draft(draft)
    }

    fn validate_patch(patch: RecipePatch) -> Result<RecipePatch, ValidationError> {
        validate_recipe_patch(patch)
    }

    fn into_collection(rows: Vec<Self>) -> CacheValue {
        CacheValue::Recipes(rows)
    }

    fn from_collection(value: CacheValue) -> Option<Vec<Self>> {
        match value {
            CacheValue::Recipes(rows) => Some(rows),
            _ => None,
        }
    }

    fn into_single(self) -> Option<CacheValue> {
        Some(CacheValue::Recipe(self))
    }

    fn from_single(value: CacheValue) -> Option<Self> {
        match value {
            CacheValue::Recipe(row) => Some(row),
            _ => None,
        }
    }
}

impl Resource for Ingredient {
    const ENTITY_TYPE: EntityType = EntityType::Ingredient;

    type Id = IngredientId;
    type Parent = RecipeId;
    type Draft = IngredientDraft;
    type Patch = IngredientPatch;

    fn id(&self) -> &IngredientId {
        &self.id
    }

    fn parent(&self) -> RecipeId {
        self.recipe_id.clone()
    }

    fn created_at(&self) -> Timestamp {
        self.created_at
    }

    fn collection_key(recipe_id: &RecipeId) -> CacheKey {
        CacheKey::ingredients(recipe_id)
    }

    fn parent_filter(recipe_id: &RecipeId) -> Option<(&'static str, String)> {
        Some(("recipe_id", recipe_id.to_string()))
    }

    fn placeholder(recipe_id: &RecipeId, draft: &IngredientDraft) -> Self {
        Ingredient::placeholder(recipe_id, draft)
    }

    fn apply_patch(&mut self, patch: &IngredientPatch) {
        Ingredient::apply_patch(self, patch)
    }

    fn validate_draft(draft: IngredientDraft) -> Result<IngredientDraft, ValidationError> {
        validate_ingredient_draft(draft)
    }

    fn validate_patch(patch: IngredientPatch) -> Result<IngredientPatch, ValidationError> {
        validate_ingredient_patch(patch)
    }

    fn into_collection(rows: Vec<Self>) -> CacheValue {
        CacheValue::Ingredients(rows)
    }

    fn from_collection(value: CacheValue) -> Option<Vec<Self>> {
        match value {
            CacheValue::Ingredients(rows) => Some(rows),
            _ => None,
        }
    }
}

impl Resource for PantryItem {
    const ENTITY_TYPE: EntityType = EntityType::PantryItem;

    type Id = PantryItemId;
    type Parent = PantryId;
    type Draft = PantryItemDraft;
    type Patch = PantryItemPatch;

    fn id(&self) -> &PantryItemId {
        &self.id
    }

    fn parent(&self) -> PantryId {
        self.pantry_id.clone()
    }

    fn created_at(&self) -> Timestamp {
        self.created_at
    }

    fn collection_key(pantry_id: &PantryId) -> CacheKey {
        CacheKey::pantry_items(pantry_id)
    }

    fn parent_filter(pantry_id: &PantryId) -> Option<(&'static str, String)> {
        Some(("pantry_id", pantry_id.to_string()))
    }

    fn placeholder(pantry_id: &PantryId, draft: &PantryItemDraft) -> Self {
        PantryItem::placeholder(pantry_id, draft)
    }

    fn apply_patch(&mut self, patch: &PantryItemPatch) {
        PantryItem::apply_patch(self, patch)
    }

    fn validate_draft(draft: PantryItemDraft) -> Result<PantryItemDraft, ValidationError> {
        validate_pantry_item_draft(draft)
    }

    fn validate_patch(patch: PantryItemPatch) -> Result<PantryItemPatch, ValidationError> {
        validate_pantry_item_patch(patch)
    }

    fn into_collection(rows: Vec<Self>) -> CacheValue {
        CacheValue::PantryItems(rows)
    }

    fn from_collection(value: CacheValue) -> Option<Vec<Self>> {
        match value {
            CacheValue::PantryItems(rows) => Some(rows),
            _ => None,
        }
    }
}

impl Resource for GroceryItem {
    const ENTITY_TYPE: EntityType = EntityType::GroceryItem;

    type Id = GroceryItemId;
    type Parent = GroceryListId;
    type Draft = GroceryItemDraft;
    type Patch = GroceryItemPatch;

    fn id(&self) -> &GroceryItemId {
        &self.id
    }

    fn parent(&self) -> GroceryListId {
        self.list_id.clone()
    }

    fn created_at(&self) -> Timestamp {
        self.created_at
    }

    fn collection_key(list_id: &GroceryListId) -> CacheKey {
        CacheKey::grocery_items(list_id)
    }

    fn parent_filter(list_id: &GroceryListId) -> Option<(&'static str, String)> {
        Some(("list_id", list_id.to_string()))
    }

    fn placeholder(list_id: &GroceryListId, draft: &GroceryItemDraft) -> Self {
        GroceryItem::placeholder(list_id, draft)
    }

    fn apply_patch(&mut self, patch: &GroceryItemPatch) {
        GroceryItem::apply_patch(self, patch)
    }

    fn validate_draft(draft: GroceryItemDraft) -> Result<GroceryItemDraft, ValidationError> {
        validate_grocery_item_draft(draft)
    }

    fn validate_patch(patch: GroceryItemPatch) -> Result<GroceryItemPatch, ValidationError> {
        validate_grocery_item_patch(patch)
    }

    fn into_collection(rows: Vec<Self>) -> CacheValue {
        CacheValue::GroceryItems(rows)
    }

    fn from_collection(value: CacheValue) -> Option<Vec<Self>> {
        match value {
            CacheValue::GroceryItems(rows) => Some(rows),
            _ => None,
        }
    }
}
