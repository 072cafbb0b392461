//! End-to-end token scenarios across separate issuing and verifying codecs.
//!
//! The login service and the game server each build their own
//! `TokenCodec` from the same `TokenConfig`; these tests mirror that split.

use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

use gatehouse_auth::{
    HandshakeError, HandshakeGate, ManualClock, TokenCodec, TokenConfig,
    TokenError,
};
use http::HeaderMap;
use http::header::AUTHORIZATION;

const SECRET: &str = "verylongsecretkeyforjwt1234567890";

fn config() -> TokenConfig {
    TokenConfig::new(SECRET, Duration::from_secs(60)).expect("valid config")
}

fn bearer(token: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, format!("Bearer {token}").parse().unwrap());
    headers
}

#[test]
fn test_scenario_a_fresh_token_verifies_for_alice() {
    let issuer = TokenCodec::new(&config());
    let verifier = TokenCodec::new(&config());

    let token = issuer.issue("alice").expect("issue");
    let identity = verifier.verify(&token).expect("verify");

    assert_eq!(identity.subject, "alice");
}

#[test]
fn test_scenario_b_token_expires_after_lifetime() {
    let clock = Arc::new(ManualClock::new(
        UNIX_EPOCH + Duration::from_secs(1_800_000_000),
    ));
    let codec = TokenCodec::with_clock(&config(), Arc::clone(&clock));

    let token = codec.issue("alice").unwrap();
    assert!(codec.verify(&token).is_ok());

    clock.advance(Duration::from_secs(61));

    assert_eq!(codec.verify(&token), Err(TokenError::Expired));
}

#[test]
fn test_gate_collapses_every_token_failure_into_unauthorized() {
    let clock = Arc::new(ManualClock::starting_now());
    let codec = Arc::new(TokenCodec::with_clock(&config(), Arc::clone(&clock)));
    let gate = HandshakeGate::new(Arc::clone(&codec));

    let good = codec.issue("alice").unwrap();
    let other = TokenCodec::new(
        &TokenConfig::new("x".repeat(40), Duration::from_secs(60)).unwrap(),
    )
    .issue("alice")
    .unwrap();

    let bad_signature = gate.authorize(&bearer(&other)).unwrap_err();
    let malformed = gate.authorize(&bearer("not.a.jwt")).unwrap_err();
    clock.advance(Duration::from_secs(120));
    let expired = gate.authorize(&bearer(&good)).unwrap_err();

    for err in [bad_signature, malformed, expired] {
        assert!(matches!(err, HandshakeError::Unauthorized(_)));
        assert_eq!(err.to_string(), "unauthorized");
    }
}
