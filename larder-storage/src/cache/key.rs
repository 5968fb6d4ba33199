//! Cache keys and the values stored under them.
//!
//! Keys are a closed set of tagged variants so two logical resources can
//! never collide, and every variant carries the identifiers that scope it.
//! Collection keys resolve to an empty collection when a mutation has to be
//! applied before anything was fetched; singleton keys have no such default.

use std::fmt;

use larder_core::{
    EntityType, GroceryItem, GroceryListId, Ingredient, PantryId, PantryItem, Recipe, RecipeId,
    Timestamp,
};

/// Identifies one logical resource in the cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// All recipes visible to the signed-in user.
    Recipes,
    /// A single recipe.
    Recipe(RecipeId),
    /// Ingredients of one recipe.
    Ingredients(RecipeId),
    /// Items of one pantry.
    PantryItems(PantryId),
    /// Items of one grocery list.
    GroceryItems(GroceryListId),
    /// Signed URL for an object path in the image bucket.
    SignedImageUrl(String),
}

impl CacheKey {
    pub fn recipe(id: &RecipeId) -> Self {
        Self::Recipe(id.clone())
    }

    pub fn ingredients(recipe_id: &RecipeId) -> Self {
        Self::Ingredients(recipe_id.clone())
    }

    pub fn pantry_items(pantry_id: &PantryId) -> Self {
        Self::PantryItems(pantry_id.clone())
    }

    pub fn grocery_items(list_id: &GroceryListId) -> Self {
        Self::GroceryItems(list_id.clone())
    }

    pub fn signed_image_url(path: impl Into<String>) -> Self {
        Self::SignedImageUrl(path.into())
    }

    /// Kind of record stored under this key, if any.
    pub fn entity_type(&self) -> Option<EntityType> {
        match self {
            Self::Recipes | Self::Recipe(_) => Some(EntityType::Recipe),
            Self::Ingredients(_) => Some(EntityType::Ingredient),
            Self::PantryItems(_) => Some(EntityType::PantryItem),
            Self::GroceryItems(_) => Some(EntityType::GroceryItem),
            Self::SignedImageUrl(_) => None,
        }
    }

    /// True for keys holding an ordered collection of rows.
    pub fn is_collection(&self) -> bool {
        matches!(
            self,
            Self::Recipes | Self::Ingredients(_) | Self::PantryItems(_) | Self::GroceryItems(_)
        )
    }

    /// Value a mutation starts from when the key has never been populated.
    pub fn empty_value(&self) -> Option<CacheValue> {
        match self {
            Self::Recipes => Some(CacheValue::Recipes(Vec::new())),
            Self::Ingredients(_) => Some(CacheValue::Ingredients(Vec::new())),
            Self::PantryItems(_) => Some(CacheValue::PantryItems(Vec::new())),
            Self::GroceryItems(_) => Some(CacheValue::GroceryItems(Vec::new())),
            Self::Recipe(_) | Self::SignedImageUrl(_) => None,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Recipes => f.write_str("recipes"),
            Self::Recipe(id) => write!(f, "recipe:{id}"),
            Self::Ingredients(id) => write!(f, "ingredients:{id}"),
            Self::PantryItems(id) => write!(f, "pantry-items:{id}"),
            Self::GroceryItems(id) => write!(f, "grocery-items:{id}"),
            Self::SignedImageUrl(path) => write!(f, "signed-url:{path}"),
        }
    }
}

/// A time-limited URL for a stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedUrl {
    pub url: String,
    pub expires_at: Timestamp,
}

/// Value stored under a [`CacheKey`].
#[derive(Debug, Clone, PartialEq)]
pub enum CacheValue {
    Recipes(Vec<Recipe>),
    Recipe(Recipe),
    Ingredients(Vec<Ingredient>),
    PantryItems(Vec<PantryItem>),
    GroceryItems(Vec<GroceryItem>),
    SignedUrl(SignedUrl),
}

impl CacheValue {
    /// Number of rows for collections, 1 for single values.
    pub fn len(&self) -> usize {
        match self {
            Self::Recipes(rows) => rows.len(),
            Self::Ingredients(rows) => rows.len(),
            Self::PantryItems(rows) => rows.len(),
            Self::GroceryItems(rows) => rows.len(),
            Self::Recipe(_) | Self::SignedUrl(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
