//! Input validation for drafts, patches, and credentials.
//!
//! These checks run before any optimistic change is applied, so a payload the
//! user can fix locally never reaches the cache or the network.

use crate::error::ValidationError;
use crate::patch::Patch;
use crate::units::Unit;
use crate::{
    GroceryItemDraft, GroceryItemPatch, IngredientDraft, IngredientPatch, PantryItemDraft,
    PantryItemPatch, RecipeDraft, RecipePatch,
};
use once_cell::sync::Lazy;
use regex::Regex;

/// Minimum password length accepted on password updates.
pub const MIN_PASSWORD_LEN: usize = 8;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid")
});
static LOWERCASE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-z]").expect("pattern is valid"));
static UPPERCASE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Z]").expect("pattern is valid"));
static DIGIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9]").expect("pattern is valid"));
static SPECIAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-zA-Z0-9]").expect("pattern is valid"));

fn invalid(field: &str, reason: &str) -> ValidationError {
    ValidationError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

fn required_text(field: &str, value: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::RequiredFieldMissing {
            field: field.to_string(),
        });
    }
    Ok(trimmed.to_string())
}

/// Trim optional text; blank becomes `None`.
pub fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn normalize_patch_text(patch: Patch<String>) -> Patch<String> {
    match patch {
        Patch::Set(text) => Patch::from_form_text(Some(&text)),
        other => other,
    }
}

fn normalize_unit(field: &str, unit: Option<String>) -> Result<Option<String>, ValidationError> {
    match optional_text(unit) {
        None => Ok(None),
        Some(text) => Unit::normalize(&text)
            .map(|symbol| Some(symbol.to_string()))
            .ok_or_else(|| invalid(field, "select a valid unit")),
    }
}

fn normalize_unit_patch(field: &str, patch: Patch<String>) -> Result<Patch<String>, ValidationError> {
    match normalize_patch_text(patch) {
        Patch::Set(text) => Unit::normalize(&text)
            .map(|symbol| Patch::Set(symbol.to_string()))
            .ok_or_else(|| invalid(field, "select a valid unit")),
        other => Ok(other),
    }
}

fn at_least_one_int(field: &str, value: i32) -> Result<(), ValidationError> {
    if value < 1 {
        return Err(invalid(field, "must be at least 1"));
    }
    Ok(())
}

fn at_least_one(field: &str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() || value < 1.0 {
        return Err(invalid(field, "must be at least 1"));
    }
    Ok(())
}

fn non_negative(field: &str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() || value < 0.0 {
        return Err(invalid(field, "must not be negative"));
    }
    Ok(())
}

fn clean_steps(steps: Vec<String>) -> Vec<String> {
    steps
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

// ============================================================================
// RECIPES
// ============================================================================

/// Validate and normalize a recipe draft.
pub fn validate_recipe_draft(draft: RecipeDraft) -> Result<RecipeDraft, ValidationError> {
    let name = required_text("name", &draft.name)?;
    at_least_one_int("serving_size", draft.serving_size)?;
    if let Some(total_time) = draft.total_time {
        at_least_one_int("total_time", total_time)?;
    }
    Ok(RecipeDraft {
        name,
        serving_size: draft.serving_size,
        total_time: draft.total_time,
        notes: optional_text(draft.notes),
        image_url: optional_text(draft.image_url),
        instructions: clean_steps(draft.instructions),
    })
}

/// Validate and normalize a recipe patch.
pub fn validate_recipe_patch(patch: RecipePatch) -> Result<RecipePatch, ValidationError> {
    let name = patch
        .name
        .as_deref()
        .map(|name| required_text("name", name))
        .transpose()?;
    if let Patch::Set(serving_size) = patch.serving_size {
        at_least_one_int("serving_size", serving_size)?;
    }
    if let Patch::Set(total_time) = patch.total_time {
        at_least_one_int("total_time", total_time)?;
    }
    Ok(RecipePatch {
        name,
        serving_size: patch.serving_size,
        total_time: patch.total_time,
        notes: normalize_patch_text(patch.notes),
        image_url: normalize_patch_text(patch.image_url),
        instructions: patch.instructions.map(clean_steps),
    })
}

// ============================================================================
// INGREDIENTS
// ============================================================================

/// Validate and normalize an ingredient draft.
pub fn validate_ingredient_draft(
    draft: IngredientDraft,
) -> Result<IngredientDraft, ValidationError> {
    let name = required_text("name", &draft.name)?;
    at_least_one("quantity", draft.quantity)?;
    Ok(IngredientDraft {
        name,
        quantity: draft.quantity,
        unit: normalize_unit("unit", draft.unit)?,
        notes: optional_text(draft.notes),
    })
}

/// Validate and normalize an ingredient patch.
pub fn validate_ingredient_patch(
    patch: IngredientPatch,
) -> Result<IngredientPatch, ValidationError> {
    let name = patch
        .name
        .as_deref()
        .map(|name| required_text("name", name))
        .transpose()?;
    if let Some(quantity) = patch.quantity {
        at_least_one("quantity", quantity)?;
    }
    Ok(IngredientPatch {
        name,
        quantity: patch.quantity,
        unit: normalize_unit_patch("unit", patch.unit)?,
        notes: normalize_patch_text(patch.notes),
    })
}

// ============================================================================
// PANTRY / GROCERY
// ============================================================================

pub fn validate_pantry_item_draft(
    draft: PantryItemDraft,
) -> Result<PantryItemDraft, ValidationError> {
    let name = required_text("name", &draft.name)?;
    if let Some(quantity) = draft.quantity {
        non_negative("quantity", quantity)?;
    }
    Ok(PantryItemDraft {
        name,
        quantity: draft.quantity,
        unit: normalize_unit("unit", draft.unit)?,
        category: optional_text(draft.category),
        notes: optional_text(draft.notes),
    })
}

pub fn validate_pantry_item_patch(
    patch: PantryItemPatch,
) -> Result<PantryItemPatch, ValidationError> {
    let name = patch
        .name
        .as_deref()
        .map(|name| required_text("name", name))
        .transpose()?;
    if let Patch::Set(quantity) = patch.quantity {
        non_negative("quantity", quantity)?;
    }
    Ok(PantryItemPatch {
        name,
        quantity: patch.quantity,
        unit: normalize_unit_patch("unit", patch.unit)?,
        category: normalize_patch_text(patch.category),
        notes: normalize_patch_text(patch.notes),
    })
}

pub fn validate_grocery_item_draft(
    draft: GroceryItemDraft,
) -> Result<GroceryItemDraft, ValidationError> {
    let name = required_text("name", &draft.name)?;
    if let Some(quantity) = draft.quantity {
        non_negative("quantity", quantity)?;
    }
    Ok(GroceryItemDraft {
        name,
        quantity: draft.quantity,
        unit: normalize_unit("unit", draft.unit)?,
        notes: optional_text(draft.notes),
    })
}

pub fn validate_grocery_item_patch(
    patch: GroceryItemPatch,
) -> Result<GroceryItemPatch, ValidationError> {
    let name = patch
        .name
        .as_deref()
        .map(|name| required_text("name", name))
        .transpose()?;
    if let Patch::Set(quantity) = patch.quantity {
        non_negative("quantity", quantity)?;
    }
    Ok(GroceryItemPatch {
        name,
        quantity: patch.quantity,
        unit: normalize_unit_patch("unit", patch.unit)?,
        notes: normalize_patch_text(patch.notes),
        is_checked: patch.is_checked,
    })
}

// ============================================================================
// CREDENTIALS
// ============================================================================

/// Check that an email address has a plausible shape.
pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    if !EMAIL_RE.is_match(email.trim()) {
        return Err(invalid("email", "enter a valid email"));
    }
    Ok(())
}

/// Check sign-in credentials: valid email, non-empty password.
pub fn validate_credentials(email: &str, password: &str) -> Result<(), ValidationError> {
    validate_email(email)?;
    if password.is_empty() {
        return Err(ValidationError::RequiredFieldMissing {
            field: "password".to_string(),
        });
    }
    Ok(())
}

/// Check a new password against the strength policy and its confirmation.
pub fn validate_new_password(password: &str, confirm: &str) -> Result<(), ValidationError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(invalid("password", "must be at least 8 characters"));
    }
    if !LOWERCASE_RE.is_match(password) {
        return Err(invalid("password", "must contain a lowercase letter"));
    }
    if !UPPERCASE_RE.is_match(password) {
        return Err(invalid("password", "must contain an uppercase letter"));
    }
    if !DIGIT_RE.is_match(password) {
        return Err(invalid("password", "must contain a number"));
    }
    if !SPECIAL_RE.is_match(password) {
        return Err(invalid("password", "must contain a special character"));
    }
    if password != confirm {
        return Err(invalid("confirm", "passwords do not match"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ingredient_draft_trims_and_normalizes_unit() {
        let draft = validate_ingredient_draft(IngredientDraft {
            name: "  Salt ".into(),
            quantity: 1.0,
            unit: Some(" gram ".into()),
            notes: Some("   ".into()),
        })
        .unwrap();
        assert_eq!(draft.name, "Salt");
        assert_eq!(draft.unit.as_deref(), Some("g"));
        assert_eq!(draft.notes, None);
    }

    #[test]
    fn test_ingredient_draft_rejects_blank_name_and_small_quantity() {
        let err = validate_ingredient_draft(IngredientDraft {
            name: "  ".into(),
            quantity: 1.0,
            ..Default::default()
        })
        .unwrap_err();
        assert_eq!(err.field(), Some("name"));

        let err = validate_ingredient_draft(IngredientDraft {
            name: "Salt".into(),
            quantity: 0.5,
            ..Default::default()
        })
        .unwrap_err();
        assert_eq!(err.field(), Some("quantity"));
    }

    #[test]
    fn test_ingredient_patch_blank_text_clears() {
        let patch = validate_ingredient_patch(IngredientPatch {
            notes: Patch::Set("  ".into()),
            unit: Patch::Set("tablespoon".into()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(patch.notes, Patch::Clear);
        assert_eq!(patch.unit, Patch::Set("tbsp".into()));
    }

    #[test]
    fn test_unknown_unit_rejected() {
        let err = validate_ingredient_patch(IngredientPatch {
            unit: Patch::Set("furlong".into()),
            ..Default::default()
        })
        .unwrap_err();
        assert_eq!(err.field(), Some("unit"));
    }

    #[test]
    fn test_recipe_draft_rules() {
        let err = validate_recipe_draft(RecipeDraft {
            name: "Bread".into(),
            serving_size: 0,
            ..Default::default()
        })
        .unwrap_err();
        assert_eq!(err.field(), Some("serving_size"));

        let ok = validate_recipe_draft(RecipeDraft {
            name: "Bread".into(),
            serving_size: 2,
            instructions: vec![" Mix ".into(), "".into(), "Bake".into()],
            ..Default::default()
        })
        .unwrap();
        assert_eq!(ok.instructions, vec!["Mix".to_string(), "Bake".to_string()]);
    }

    #[test]
    fn test_recipe_patch_allows_clearing_total_time() {
        let patch = validate_recipe_patch(RecipePatch {
            total_time: Patch::Clear,
            ..Default::default()
        })
        .unwrap();
        assert!(patch.total_time.is_clear());

        let err = validate_recipe_patch(RecipePatch {
            total_time: Patch::Set(0),
            ..Default::default()
        })
        .unwrap_err();
        assert_eq!(err.field(), Some("total_time"));
    }

    #[test]
    fn test_email() {
        assert!(validate_email("cook@example.com").is_ok());
        assert!(validate_email("not-an-email").is_err());
        assert!(validate_credentials("cook@example.com", "").is_err());
    }

    #[test]
    fn test_password_policy() {
        assert!(validate_new_password("Str0ng!pw", "Str0ng!pw").is_ok());
        assert!(validate_new_password("Sh0rt!", "Sh0rt!").is_err());
        assert!(validate_new_password("nouppercase1!", "nouppercase1!").is_err());
        assert!(validate_new_password("NoDigits!!", "NoDigits!!").is_err());
        assert!(validate_new_password("NoSpecial12", "NoSpecial12").is_err());
        let err = validate_new_password("Str0ng!pw", "Str0ng!px").unwrap_err();
        assert_eq!(err.field(), Some("confirm"));
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_ingredient_name_is_trimmed(
            pad_left in "[ \t]{0,3}",
            name in "[A-Za-z][A-Za-z ]{0,20}[A-Za-z]",
            pad_right in "[ \t]{0,3}",
            quantity in 1.0f64..1000.0,
        ) {
            let draft = validate_ingredient_draft(IngredientDraft {
                name: format!("{pad_left}{name}{pad_right}"),
                quantity,
                ..Default::default()
            })
            .unwrap();
            prop_assert_eq!(draft.name, name);
            prop_assert_eq!(draft.quantity, quantity);
        }

        #[test]
        fn prop_quantity_below_one_rejected(quantity in -1000.0f64..0.999) {
            let err = validate_ingredient_draft(IngredientDraft {
                name: "Salt".into(),
                quantity,
                ..Default::default()
            })
            .unwrap_err();
            prop_assert_eq!(err.field(), Some("quantity"));
        }

        #[test]
        fn prop_whitespace_names_rejected(name in "[ \t\n]{0,8}") {
            let result = validate_ingredient_draft(IngredientDraft {
                name,
                quantity: 1.0,
                ..Default::default()
            });
            prop_assert!(result.is_err());
        }
    }
}
