// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Service-account assertion tests
//!
//! The fixture key pair lets the signed assertion be verified the way the
//! token endpoint would verify it.

use anemia_eye_service::storage::{
    credentials::{build_assertion, AssertionClaims, CLOUD_PLATFORM_SCOPE, DEFAULT_TOKEN_URI},
    ServiceAccountKey,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use std::time::{SystemTime, UNIX_EPOCH};

const KEY_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/service_account.json");
const PUBLIC_KEY_PATH: &str = concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/tests/fixtures/service_account_pub.pem"
);

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

fn verify(token: &str) -> AssertionClaims {
    let pem = std::fs::read(PUBLIC_KEY_PATH).unwrap();
    let key = DecodingKey::from_rsa_pem(&pem).unwrap();
    let mut validation = Validation::new(Algorithm::RS256);
    validation.set_audience(&[DEFAULT_TOKEN_URI]);
    decode::<AssertionClaims>(token, &key, &validation)
        .unwrap()
        .claims
}

#[tokio::test]
async fn test_assertion_verifies_with_public_key() {
    let key = ServiceAccountKey::from_file(KEY_PATH).unwrap();
    let issued_at = now();

    let token = build_assertion(&key, CLOUD_PLATFORM_SCOPE, issued_at).unwrap();
    let claims = verify(&token);

    assert_eq!(
        claims.iss,
        "predictor@anemia-test-project.iam.gserviceaccount.com"
    );
    assert_eq!(claims.scope, CLOUD_PLATFORM_SCOPE);
    assert_eq!(claims.aud, DEFAULT_TOKEN_URI);
    assert_eq!(claims.iat, issued_at);
    assert_eq!(claims.exp, issued_at + 3600);
}

#[tokio::test]
async fn test_tampered_assertion_fails_verification() {
    let key = ServiceAccountKey::from_file(KEY_PATH).unwrap();
    let mut token = build_assertion(&key, CLOUD_PLATFORM_SCOPE, now()).unwrap();
    token.push('x');

    let pem = std::fs::read(PUBLIC_KEY_PATH).unwrap();
    let mut validation = Validation::new(Algorithm::RS256);
    validation.set_audience(&[DEFAULT_TOKEN_URI]);
    assert!(decode::<AssertionClaims>(
        &token,
        &DecodingKey::from_rsa_pem(&pem).unwrap(),
        &validation
    )
    .is_err());
}
