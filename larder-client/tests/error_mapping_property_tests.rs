//! Property-Based Tests for HTTP Error Mapping
//!
//! **Classification:** every error status maps to one domain error class
//! determined by the status and what the request was about.
//!
//! **Messages:** the server's message survives mapping whichever field the
//! service put it in.

use larder_client::api_client::{error_message, map_status, ErrorContext};
use larder_core::{AuthError, EntityType, LarderError, NetworkError, ValidationError};
use proptest::prelude::*;
use reqwest::StatusCode;
use serde_json::json;

fn context_strategy() -> impl Strategy<Value = ErrorContext> {
    prop_oneof![
        prop::sample::select(vec![
            EntityType::Recipe,
            EntityType::Ingredient,
            EntityType::PantryItem,
            EntityType::GroceryItem,
        ])
        .prop_map(ErrorContext::Collection),
        "[a-z0-9]{1,8}".prop_map(|id| ErrorContext::record(EntityType::Ingredient, id)),
        Just(ErrorContext::Auth),
        "[a-z]{1,6}/[a-z]{1,6}\\.png".prop_map(|path| ErrorContext::Object { path }),
    ]
}

fn message_strategy() -> impl Strategy<Value = String> {
    "[A-Za-z][A-Za-z ]{0,30}".prop_map(|s| s.trim().to_string())
}

proptest! {
    #[test]
    fn prop_server_errors_are_retryable(
        status in 500u16..600,
        context in context_strategy(),
        message in message_strategy(),
    ) {
        let status = StatusCode::from_u16(status).unwrap();
        let body = json!({ "message": message }).to_string();
        let err = map_status(status, &body, &context);
        prop_assert!(err.is_retryable());
        let is_server_error = matches!(err, LarderError::Network(NetworkError::Server { .. }));
        prop_assert!(is_server_error);
    }

    #[test]
    fn prop_auth_statuses_require_sign_in(
        status in prop::sample::select(vec![401u16, 403]),
        context in context_strategy(),
        message in message_strategy(),
    ) {
        let status = StatusCode::from_u16(status).unwrap();
        let body = json!({ "message": message }).to_string();
        let err = map_status(status, &body, &context);
        prop_assert!(err.requires_sign_in());
        prop_assert!(!err.is_retryable());
    }

    #[test]
    fn prop_client_errors_map_to_domain_classes(
        status in prop::sample::select(vec![400u16, 404, 406, 409, 422]),
        context in context_strategy(),
        message in message_strategy(),
    ) {
        let status = StatusCode::from_u16(status).unwrap();
        let body = json!({ "message": message }).to_string();
        let err = map_status(status, &body, &context);
        let expected_class = match (&context, status.as_u16()) {
            (ErrorContext::Auth, 400 | 422) => matches!(err, LarderError::Auth(_)),
            (ErrorContext::Record { .. }, 404 | 406) => err.clears_cache_entry(),
            (ErrorContext::Object { .. }, 404) => matches!(err, LarderError::Validation(_)),
            (_, 400 | 409 | 422) => matches!(err, LarderError::Validation(_)),
            _ => matches!(err, LarderError::Network(_)),
        };
        prop_assert!(expected_class, "{:?} {} -> {:?}", context, status, err);
    }

    #[test]
    fn prop_message_survives_any_field(
        field in prop::sample::select(vec!["message", "msg", "error_description", "error"]),
        message in message_strategy(),
    ) {
        let body = json!({ field: message.clone() }).to_string();
        prop_assert_eq!(error_message(&body), Some(message.clone()));

        let err = map_status(
            StatusCode::CONFLICT,
            &body,
            &ErrorContext::Collection(EntityType::Recipe),
        );
        prop_assert_eq!(
            err,
            LarderError::Validation(ValidationError::Rejected { message })
        );
    }
}

#[test]
fn expired_jwt_is_session_expiry() {
    let err = map_status(
        StatusCode::UNAUTHORIZED,
        r#"{"code":"PGRST301","message":"JWT expired"}"#,
        &ErrorContext::Collection(EntityType::Recipe),
    );
    assert_eq!(err, LarderError::Auth(AuthError::SessionExpired));
}
