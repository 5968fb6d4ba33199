//! LARDER Test Utilities
//!
//! Shared test infrastructure for the LARDER workspace:
//! - An in-memory auth provider that emits real session events
//! - Proptest generators for ids, drafts, patches and rows
//! - Fixtures for the common recipe scenarios
//! - Assertions over `LarderResult`

// Re-export the in-memory stores from their source crate
pub use larder_storage::{InMemoryObjectStore, InMemoryRecordStore, StoreCall, StoreOp};

pub use larder_core::{
    AuthError, AuthProvider, EntityType, GroceryItem, GroceryItemDraft, GroceryItemPatch,
    GroceryListId, Ingredient, IngredientDraft, IngredientId, IngredientPatch, LarderError,
    LarderResult, PantryId, PantryItem, PantryItemDraft, PantryItemPatch, Patch, Recipe,
    RecipeDraft, RecipeId, RecipePatch, RecordIdType, Session, SessionEvent, SignUpOutcome,
    Timestamp, User, UserId, ValidationError,
};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;

// ============================================================================
// IN-MEMORY AUTH PROVIDER
// ============================================================================

struct AuthState {
    /// email -> (password, user)
    accounts: HashMap<String, (String, User)>,
    current: Option<Session>,
    reset_requests: Vec<String>,
}

/// Auth provider backed by a map of accounts.
///
/// Every session change is broadcast as a [`SessionEvent`], like the hosted
/// provider's auth state listener.
pub struct InMemoryAuthProvider {
    state: Mutex<AuthState>,
    events: broadcast::Sender<SessionEvent>,
}

impl Default for InMemoryAuthProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryAuthProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryAuthProvider")
            .field("signed_in", &self.current_user_id())
            .finish()
    }
}

impl InMemoryAuthProvider {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            state: Mutex::new(AuthState {
                accounts: HashMap::new(),
                current: None,
                reset_requests: Vec::new(),
            }),
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, AuthState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register an account whose user id is `user_id`.
    pub fn with_account(self, email: &str, password: &str, user_id: &str) -> Self {
        let user = User {
            id: UserId::from(user_id),
            email: Some(email.to_string()),
        };
        self.lock()
            .accounts
            .insert(email.to_string(), (password.to_string(), user));
        self
    }

    pub fn current_user_id(&self) -> Option<UserId> {
        self.lock()
            .current
            .as_ref()
            .map(|session| session.user.id.clone())
    }

    /// Emails a password reset was requested for.
    pub fn reset_requests(&self) -> Vec<String> {
        self.lock().reset_requests.clone()
    }

    /// Issue a fresh token for the signed-in user, as a background refresh would.
    pub fn refresh(&self) -> Option<Session> {
        let mut state = self.lock();
        let user = state.current.as_ref()?.user.clone();
        let session = session_for(user);
        let previous = state.current.replace(session.clone());
        drop(state);
        self.emit(previous, Some(session.clone()));
        Some(session)
    }

    fn emit(&self, previous: Option<Session>, session: Option<Session>) {
        // No receivers is fine.
        let _ = self.events.send(SessionEvent {
            previous_user_id: previous.map(|s| s.user.id),
            session,
        });
    }

    fn switch_to(&self, session: Option<Session>) {
        let previous = {
            let mut state = self.lock();
            std::mem::replace(&mut state.current, session.clone())
        };
        self.emit(previous, session);
    }
}

fn session_for(user: User) -> Session {
    Session {
        access_token: format!("access-{}", uuid::Uuid::new_v4().simple()),
        refresh_token: format!("refresh-{}", uuid::Uuid::new_v4().simple()),
        expires_at: Some(Utc::now() + Duration::hours(1)),
        user,
    }
}

#[async_trait]
impl AuthProvider for InMemoryAuthProvider {
    async fn sign_in(&self, email: &str, password: &str) -> LarderResult<Session> {
        larder_core::validation::validate_credentials(email, password)?;
        let user = {
            let state = self.lock();
            match state.accounts.get(email.trim()) {
                Some((expected, user)) if expected == password => user.clone(),
                _ => {
                    return Err(AuthError::Rejected {
                        message: "Invalid login credentials".to_string(),
                    }
                    .into())
                }
            }
        };
        let session = session_for(user);
        self.switch_to(Some(session.clone()));
        Ok(session)
    }

    async fn sign_up(&self, email: &str, password: &str) -> LarderResult<SignUpOutcome> {
        larder_core::validation::validate_credentials(email, password)?;
        let user = {
            let mut state = self.lock();
            if state.accounts.contains_key(email.trim()) {
                return Err(AuthError::Rejected {
                    message: "User already registered".to_string(),
                }
                .into());
            }
            let user = User {
                id: UserId::from(uuid::Uuid::new_v4().to_string()),
                email: Some(email.trim().to_string()),
            };
            state
                .accounts
                .insert(email.trim().to_string(), (password.to_string(), user.clone()));
            user
        };
        let session = session_for(user);
        self.switch_to(Some(session.clone()));
        Ok(SignUpOutcome::SignedIn(session))
    }

    async fn sign_out(&self) -> LarderResult<()> {
        self.switch_to(None);
        Ok(())
    }

    async fn reset_password_for_email(&self, email: &str) -> LarderResult<()> {
        larder_core::validation::validate_email(email)?;
        self.lock().reset_requests.push(email.trim().to_string());
        Ok(())
    }

    async fn update_password(&self, password: &str) -> LarderResult<()> {
        let mut state = self.lock();
        let Some(email) = state
            .current
            .as_ref()
            .and_then(|session| session.user.email.clone())
        else {
            return Err(AuthError::NotSignedIn.into());
        };
        if let Some(account) = state.accounts.get_mut(&email) {
            account.0 = password.to_string();
        }
        Ok(())
    }

    async fn current_session(&self) -> LarderResult<Option<Session>> {
        Ok(self.lock().current.clone())
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for LARDER entity types.

    use super::*;
    use proptest::prelude::*;

    /// A server-style id (never temporary).
    pub fn arb_server_id() -> impl Strategy<Value = String> {
        "[a-f0-9]{8}"
    }

    pub fn arb_recipe_id() -> impl Strategy<Value = RecipeId> {
        arb_server_id().prop_map(RecipeId::from_raw)
    }

    pub fn arb_ingredient_id() -> impl Strategy<Value = IngredientId> {
        arb_server_id().prop_map(IngredientId::from_raw)
    }

    pub fn arb_user_id() -> impl Strategy<Value = UserId> {
        arb_server_id().prop_map(UserId::from_raw)
    }

    /// Timestamps within 2020-2030.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1577836800i64..1893456000i64).prop_map(|secs| {
            chrono::DateTime::from_timestamp(secs, 0).unwrap_or_else(Utc::now)
        })
    }

    /// Names that survive trimming and validation.
    pub fn arb_name() -> impl Strategy<Value = String> {
        "[A-Za-z][A-Za-z ]{0,23}".prop_map(|s| s.trim().to_string())
    }

    pub fn arb_unit() -> impl Strategy<Value = String> {
        prop::sample::select(vec!["g", "kg", "ml", "L", "tsp", "tbsp", "cup", "oz", "lb", "piece"])
            .prop_map(str::to_string)
    }

    pub fn arb_text_patch() -> impl Strategy<Value = Patch<String>> {
        prop_oneof![
            Just(Patch::Absent),
            Just(Patch::Clear),
            "[a-z][a-z ]{0,15}".prop_map(|s| Patch::Set(s.trim().to_string())),
        ]
    }

    pub fn arb_ingredient_draft() -> impl Strategy<Value = IngredientDraft> {
        (
            arb_name(),
            1u32..1000,
            prop::option::of(arb_unit()),
            prop::option::of("[a-z]{1,12}"),
        )
            .prop_map(|(name, quantity, unit, notes)| IngredientDraft {
                name,
                quantity: f64::from(quantity),
                unit,
                notes,
            })
    }

    pub fn arb_ingredient_patch() -> impl Strategy<Value = IngredientPatch> {
        (
            prop::option::of(arb_name()),
            prop::option::of((1u32..1000).prop_map(f64::from)),
            prop_oneof![
                Just(Patch::Absent),
                Just(Patch::Clear),
                arb_unit().prop_map(Patch::Set),
            ],
            arb_text_patch(),
        )
            .prop_map(|(name, quantity, unit, notes)| IngredientPatch {
                name,
                quantity,
                unit,
                notes,
            })
    }

    pub fn arb_recipe_draft() -> impl Strategy<Value = RecipeDraft> {
        (
            arb_name(),
            1i32..12,
            prop::option::of(1i32..600),
            prop::collection::vec("[A-Za-z][a-z ]{0,30}", 0..5),
        )
            .prop_map(|(name, serving_size, total_time, instructions)| RecipeDraft {
                name,
                serving_size,
                total_time,
                instructions: instructions
                    .into_iter()
                    .map(|step| step.trim().to_string())
                    .collect(),
                ..Default::default()
            })
    }

    pub fn arb_recipe_patch() -> impl Strategy<Value = RecipePatch> {
        (
            prop::option::of(arb_name()),
            prop_oneof![
                Just(Patch::Absent),
                Just(Patch::Clear),
                (1i32..12).prop_map(Patch::Set),
            ],
            arb_text_patch(),
        )
            .prop_map(|(name, serving_size, notes)| RecipePatch {
                name,
                serving_size,
                notes,
                ..Default::default()
            })
    }

    /// A persisted ingredient row under `recipe_id`.
    pub fn arb_ingredient(recipe_id: RecipeId) -> impl Strategy<Value = Ingredient> {
        (
            arb_ingredient_id(),
            arb_user_id(),
            arb_ingredient_draft(),
            arb_timestamp(),
        )
            .prop_map(move |(id, owner_id, draft, created_at)| Ingredient {
                id,
                recipe_id: recipe_id.clone(),
                owner_id,
                name: draft.name,
                quantity: draft.quantity,
                unit: draft.unit,
                notes: draft.notes,
                created_at,
                updated_at: created_at,
            })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built rows and drafts for common scenarios.

    use super::*;

    pub fn salt_draft() -> IngredientDraft {
        IngredientDraft {
            name: "Salt".to_string(),
            quantity: 1.0,
            unit: Some("tsp".to_string()),
            notes: None,
        }
    }

    pub fn soup_draft() -> RecipeDraft {
        RecipeDraft {
            name: "Tomato soup".to_string(),
            serving_size: 4,
            total_time: Some(40),
            instructions: vec!["Chop".to_string(), "Simmer".to_string()],
            ..Default::default()
        }
    }

    /// A persisted recipe owned by `owner`.
    pub fn recipe(id: &str, owner: &str) -> Recipe {
        let now = Utc::now();
        Recipe {
            id: RecipeId::from(id),
            owner_id: UserId::from(owner),
            name: "Tomato soup".to_string(),
            serving_size: Some(4),
            total_time: Some(40),
            notes: None,
            image_url: None,
            instructions: vec!["Chop".to_string(), "Simmer".to_string()],
            created_at: now,
            updated_at: now,
        }
    }

    /// A persisted ingredient row.
    pub fn ingredient(id: &str, recipe_id: &str, name: &str) -> Ingredient {
        let now = Utc::now();
        Ingredient {
            id: IngredientId::from(id),
            recipe_id: RecipeId::from(recipe_id),
            owner_id: UserId::from("local-user"),
            name: name.to_string(),
            quantity: 1.0,
            unit: None,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn session(user_id: &str) -> Session {
        super::session_for(User {
            id: UserId::from(user_id),
            email: Some(format!("{user_id}@example.com")),
        })
    }

    /// Auth provider with two accounts, alice and bob, both using `Passw0rd!`.
    pub fn two_user_auth() -> InMemoryAuthProvider {
        InMemoryAuthProvider::new()
            .with_account("alice@example.com", "Passw0rd!", "alice")
            .with_account("bob@example.com", "Passw0rd!", "bob")
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over LARDER results.

    use super::*;

    #[track_caller]
    pub fn assert_ok<T: std::fmt::Debug>(result: &LarderResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    }

    #[track_caller]
    pub fn assert_not_found<T: std::fmt::Debug>(result: &LarderResult<T>, entity_type: EntityType) {
        match result {
            Err(LarderError::NotFound {
                entity_type: et, ..
            }) => {
                assert_eq!(*et, entity_type, "Wrong entity type in NotFound error");
            }
            other => panic!("Expected NotFound error for {:?}, got: {:?}", entity_type, other),
        }
    }

    #[track_caller]
    pub fn assert_validation_error<T: std::fmt::Debug>(result: &LarderResult<T>) {
        match result {
            Err(LarderError::Validation(_)) => {}
            other => panic!("Expected Validation error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_auth_error<T: std::fmt::Debug>(result: &LarderResult<T>) {
        match result {
            Err(LarderError::Auth(_)) => {}
            other => panic!("Expected Auth error, got: {:?}", other),
        }
    }

    /// Assert that no row carries a temporary id.
    #[track_caller]
    pub fn assert_no_placeholders(rows: &[Ingredient]) {
        if let Some(row) = rows.iter().find(|row| row.id.is_temporary()) {
            panic!("Placeholder row {} still present", row.id);
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[tokio::test]
    async fn test_sign_in_emits_event() {
        let auth = fixtures::two_user_auth();
        let mut events = auth.subscribe();

        auth.sign_in("alice@example.com", "Passw0rd!").await.unwrap();
        let event = events.recv().await.unwrap();
        assert_eq!(event.previous_user_id, None);
        assert_eq!(event.next_user_id(), Some(&UserId::from("alice")));

        auth.sign_in("bob@example.com", "Passw0rd!").await.unwrap();
        let event = events.recv().await.unwrap();
        assert!(event.identity_changed());

        auth.refresh().unwrap();
        let event = events.recv().await.unwrap();
        assert!(!event.identity_changed());

        auth.sign_out().await.unwrap();
        let event = events.recv().await.unwrap();
        assert_eq!(event.next_user_id(), None);
        assert_eq!(auth.current_user_id(), None);
    }

    #[tokio::test]
    async fn test_bad_credentials_rejected() {
        let auth = fixtures::two_user_auth();
        assertions::assert_auth_error(&auth.sign_in("alice@example.com", "nope").await);
        assertions::assert_validation_error(&auth.sign_in("not-an-email", "x").await);
        assert!(auth.current_session().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_password_requires_session() {
        let auth = fixtures::two_user_auth();
        assertions::assert_auth_error(&auth.update_password("N3w-pass!").await);

        auth.sign_in("alice@example.com", "Passw0rd!").await.unwrap();
        auth.update_password("N3w-pass!").await.unwrap();
        auth.sign_out().await.unwrap();
        assertions::assert_ok(&auth.sign_in("alice@example.com", "N3w-pass!").await);
    }

    #[test]
    fn test_fixture_ids_are_not_temporary() {
        assertions::assert_no_placeholders(&[fixtures::ingredient("abc", "R1", "Salt")]);
        assert!(!fixtures::recipe("R1", "u1").id.is_temporary());
    }

    proptest! {
        #[test]
        fn prop_generated_drafts_validate(draft in generators::arb_ingredient_draft()) {
            prop_assert!(larder_core::validation::validate_ingredient_draft(draft).is_ok());
        }

        #[test]
        fn prop_generated_recipe_drafts_validate(draft in generators::arb_recipe_draft()) {
            prop_assert!(larder_core::validation::validate_recipe_draft(draft).is_ok());
        }

        #[test]
        fn prop_generated_patches_validate(patch in generators::arb_ingredient_patch()) {
            prop_assert!(larder_core::validation::validate_ingredient_patch(patch).is_ok());
        }
    }
}
