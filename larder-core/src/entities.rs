//! Core entity structures
//!
//! Full rows as returned by the record store, the drafts users submit when
//! creating them, and the three-state patches used to edit them.

use crate::patch::{apply_required, Patch};
use crate::{
    GroceryItemId, GroceryListId, IngredientId, PantryId, PantryItemId, RecipeId, RecordIdType,
    Timestamp, UserId,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Entity type discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityType {
    Recipe,
    Ingredient,
    PantryItem,
    GroceryItem,
}

impl EntityType {
    /// Name of the backing table in the record store.
    pub fn table(self) -> &'static str {
        match self {
            EntityType::Recipe => "recipes",
            EntityType::Ingredient => "recipe_ingredients",
            EntityType::PantryItem => "pantry_items",
            EntityType::GroceryItem => "grocery_items",
        }
    }
}

// ============================================================================
// RECIPES
// ============================================================================

/// Recipe - top-level record owned by a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub id: RecipeId,
    pub owner_id: UserId,
    pub name: String,
    pub serving_size: Option<i32>,
    pub total_time: Option<i32>,
    pub notes: Option<String>,
    /// Object-storage path of the recipe image, not a URL.
    pub image_url: Option<String>,
    /// Ordered instruction steps.
    #[serde(default)]
    pub instructions: Vec<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// User-supplied fields for a new recipe.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecipeDraft {
    pub name: String,
    pub serving_size: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_time: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub instructions: Vec<String>,
}

/// Partial update for a recipe.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecipePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Patch::is_absent")]
    pub serving_size: Patch<i32>,
    #[serde(default, skip_serializing_if = "Patch::is_absent")]
    pub total_time: Patch<i32>,
    #[serde(default, skip_serializing_if = "Patch::is_absent")]
    pub notes: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_absent")]
    pub image_url: Patch<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<Vec<String>>,
}

impl RecipePatch {
    /// True when no field would change.
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.serving_size.is_absent()
            && self.total_time.is_absent()
            && self.notes.is_absent()
            && self.image_url.is_absent()
            && self.instructions.is_none()
    }
}

impl Recipe {
    /// Build a placeholder row for a recipe that has not been confirmed yet.
    pub fn placeholder(draft: &RecipeDraft) -> Self {
        let now = Utc::now();
        Self {
            id: RecipeId::temporary(),
            owner_id: UserId::default(),
            name: draft.name.clone(),
            serving_size: Some(draft.serving_size),
            total_time: draft.total_time,
            notes: draft.notes.clone(),
            image_url: draft.image_url.clone(),
            instructions: draft.instructions.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Merge a partial update into this row.
    pub fn apply_patch(&mut self, patch: &RecipePatch) {
        apply_required(&patch.name, &mut self.name);
        patch.serving_size.apply(&mut self.serving_size);
        patch.total_time.apply(&mut self.total_time);
        patch.notes.apply(&mut self.notes);
        patch.image_url.apply(&mut self.image_url);
        apply_required(&patch.instructions, &mut self.instructions);
    }
}

// ============================================================================
// INGREDIENTS
// ============================================================================

/// Ingredient of a recipe. `recipe_id` is a reference, not ownership.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ingredient {
    pub id: IngredientId,
    pub recipe_id: RecipeId,
    pub owner_id: UserId,
    pub name: String,
    pub quantity: f64,
    pub unit: Option<String>,
    pub notes: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// User-supplied fields for a new ingredient.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngredientDraft {
    pub name: String,
    pub quantity: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Partial update for an ingredient.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngredientPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<f64>,
    #[serde(default, skip_serializing_if = "Patch::is_absent")]
    pub unit: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_absent")]
    pub notes: Patch<String>,
}

impl IngredientPatch {
    /// True when no field would change.
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.quantity.is_none()
            && self.unit.is_absent()
            && self.notes.is_absent()
    }
}

impl Ingredient {
    /// Build a placeholder row for an ingredient that has not been confirmed yet.
    pub fn placeholder(recipe_id: &RecipeId, draft: &IngredientDraft) -> Self {
        let now = Utc::now();
        Self {
            id: IngredientId::temporary(),
            recipe_id: recipe_id.clone(),
            owner_id: UserId::default(),
            name: draft.name.clone(),
            quantity: draft.quantity,
            unit: draft.unit.clone(),
            notes: draft.notes.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Merge a partial update into this row.
    pub fn apply_patch(&mut self, patch: &IngredientPatch) {
        apply_required(&patch.name, &mut self.name);
        apply_required(&patch.quantity, &mut self.quantity);
        patch.unit.apply(&mut self.unit);
        patch.notes.apply(&mut self.notes);
    }
}

// ============================================================================
// PANTRY
// ============================================================================

/// Item stocked in a pantry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PantryItem {
    pub id: PantryItemId,
    pub pantry_id: PantryId,
    pub owner_id: UserId,
    pub name: String,
    pub quantity: Option<f64>,
    pub unit: Option<String>,
    pub category: Option<String>,
    pub notes: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PantryItemDraft {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PantryItemPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Patch::is_absent")]
    pub quantity: Patch<f64>,
    #[serde(default, skip_serializing_if = "Patch::is_absent")]
    pub unit: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_absent")]
    pub category: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_absent")]
    pub notes: Patch<String>,
}

impl PantryItemPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.quantity.is_absent()
            && self.unit.is_absent()
            && self.category.is_absent()
            && self.notes.is_absent()
    }
}

impl PantryItem {
    pub fn placeholder(pantry_id: &PantryId, draft: &PantryItemDraft) -> Self {
        let now = Utc::now();
        Self {
            id: PantryItemId::temporary(),
            pantry_id: pantry_id.clone(),
            owner_id: UserId::default(),
            name: draft.name.clone(),
            quantity: draft.quantity,
            unit: draft.unit.clone(),
            category: draft.category.clone(),
            notes: draft.notes.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn apply_patch(&mut self, patch: &PantryItemPatch) {
        apply_required(&patch.name, &mut self.name);
        patch.quantity.apply(&mut self.quantity);
        patch.unit.apply(&mut self.unit);
        patch.category.apply(&mut self.category);
        patch.notes.apply(&mut self.notes);
    }
}

// ============================================================================
// GROCERY LIST
// ============================================================================

/// Line on a shopping list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroceryItem {
    pub id: GroceryItemId,
    pub list_id: GroceryListId,
    pub owner_id: UserId,
    pub name: String,
    pub quantity: Option<f64>,
    pub unit: Option<String>,
    pub notes: Option<String>,
    pub is_checked: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroceryItemDraft {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroceryItemPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Patch::is_absent")]
    pub quantity: Patch<f64>,
    #[serde(default, skip_serializing_if = "Patch::is_absent")]
    pub unit: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_absent")]
    pub notes: Patch<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_checked: Option<bool>,
}

impl GroceryItemPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.quantity.is_absent()
            && self.unit.is_absent()
            && self.notes.is_absent()
            && self.is_checked.is_none()
    }

    /// Patch that only ticks or unticks the item.
    pub fn checked(is_checked: bool) -> Self {
        Self {
            is_checked: Some(is_checked),
            ..Default::default()
        }
    }
}

impl GroceryItem {
    pub fn placeholder(list_id: &GroceryListId, draft: &GroceryItemDraft) -> Self {
        let now = Utc::now();
        Self {
            id: GroceryItemId::temporary(),
            list_id: list_id.clone(),
            owner_id: UserId::default(),
            name: draft.name.clone(),
            quantity: draft.quantity,
            unit: draft.unit.clone(),
            notes: draft.notes.clone(),
            is_checked: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn apply_patch(&mut self, patch: &GroceryItemPatch) {
        apply_required(&patch.name, &mut self.name);
        patch.quantity.apply(&mut self.quantity);
        patch.unit.apply(&mut self.unit);
        patch.notes.apply(&mut self.notes);
        apply_required(&patch.is_checked, &mut self.is_checked);
    }
}

// =============================================================================
// TESTS
// =============================================================================
