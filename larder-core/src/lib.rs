//! LARDER Core - Entity Types
//!
//! Pure data structures shared by every other crate: typed ids, recipe,
//! ingredient, pantry and grocery rows, three-state patches, input
//! validation, the error taxonomy, and the auth-provider contract.
//! This crate performs no I/O.

pub mod auth;
pub mod entities;
pub mod error;
pub mod identity;
pub mod patch;
pub mod units;
pub mod validation;

pub use auth::{AuthProvider, Session, SessionEvent, SignUpOutcome, User};
pub use entities::{
    EntityType, GroceryItem, GroceryItemDraft, GroceryItemPatch, Ingredient, IngredientDraft,
    IngredientPatch, PantryItem, PantryItemDraft, PantryItemPatch, Recipe, RecipeDraft,
    RecipePatch,
};
pub use error::{
    AuthError, ConfigError, LarderError, LarderResult, NetworkError, ValidationError,
};
pub use identity::{
    GroceryItemId, GroceryListId, IngredientId, PantryId, PantryItemId, RecipeId, RecordIdType,
    Timestamp, UserId, TEMP_ID_PREFIX,
};
pub use patch::Patch;
pub use units::Unit;
