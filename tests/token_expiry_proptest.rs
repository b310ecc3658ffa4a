//! Property tests for OAuth expiry normalization.
//!
//! Upstream sources report `expiresAt` in seconds or milliseconds; the store
//! treats values below 1e12 as seconds and scales them. These tests pin that
//! boundary and the validity predicate built on top of it.

use agentbridge::pipeline::tokens::{is_token_valid_at, normalize_expiry_ms, OAuthToken};
use proptest::prelude::*;

fn token_with_expiry(expires_at: Option<f64>) -> OAuthToken {
    OAuthToken {
        provider: "google".into(),
        access_token: "access".into(),
        refresh_token: None,
        expires_at,
        scopes: vec![],
        user_id: None,
    }
}

/// Exact behavior at the unit boundary.
#[test]
fn test_normalization_at_boundary() {
    // Largest seconds-interpreted value.
    let just_below = 1e12 - 1.0;
    assert_eq!(normalize_expiry_ms(just_below), just_below * 1000.0);
    // The boundary itself is already milliseconds.
    assert_eq!(normalize_expiry_ms(1e12), 1e12);
    assert_eq!(normalize_expiry_ms(1e12 + 1.0), 1e12 + 1.0);
}

proptest! {
    /// Every value below 1e12 is scaled by 1000.
    #[test]
    fn prop_seconds_values_scaled(raw in 0.0f64..1e12) {
        prop_assert_eq!(normalize_expiry_ms(raw), raw * 1000.0);
    }

    /// Every value at or above 1e12 passes through unchanged.
    #[test]
    fn prop_millisecond_values_unchanged(raw in 1e12f64..1e15) {
        prop_assert_eq!(normalize_expiry_ms(raw), raw);
    }

    /// Validity agrees with comparing now against the normalized expiry.
    #[test]
    fn prop_validity_matches_normalized_comparison(
        raw in 1.0f64..1e15,
        now_ms in 1.0f64..1e15,
    ) {
        let token = token_with_expiry(Some(raw));
        prop_assert_eq!(
            is_token_valid_at(&token, now_ms),
            now_ms < normalize_expiry_ms(raw)
        );
    }

    /// A token with no expiry is valid at any point in time.
    #[test]
    fn prop_missing_expiry_always_valid(now_ms in 0.0f64..1e15) {
        prop_assert!(is_token_valid_at(&token_with_expiry(None), now_ms));
    }
}
