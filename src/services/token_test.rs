use super::*;

const NOW: i64 = 1_700_000_000;

fn encode_claims_standard(json: &str) -> String {
    let header = STANDARD.encode(TOKEN_HEADER);
    let payload = STANDARD.encode(json);
    let signature = STANDARD.encode("local-demo");
    format!("{header}.{payload}.{signature}")
}

// =============================================================================
// bytes_to_hex
// =============================================================================

#[test]
fn bytes_to_hex_leading_zero() {
    assert_eq!(bytes_to_hex(&[0x0a, 0xff]), "0aff");
}

#[test]
fn bytes_to_hex_empty() {
    assert_eq!(bytes_to_hex(&[]), "");
}

// =============================================================================
// issue_token
// =============================================================================

#[test]
fn issued_token_has_three_segments() {
    let token = issue_token("bob", NOW, 3600, "secret");
    assert_eq!(token.split('.').count(), 3);
}

#[test]
fn issued_token_claims_round_trip() {
    let token = issue_token("bob", NOW, 3600, "secret");
    let claims = decode_claims(&token).unwrap();
    assert_eq!(claims.sub.as_deref(), Some("bob"));
    assert_eq!(claims.iat, Some(NOW));
    assert_eq!(claims.exp, Some(NOW + 3600));
    assert_eq!(claims.jti.as_deref().map(str::len), Some(16));
}

#[test]
fn two_tokens_in_same_second_differ() {
    let a = issue_token("bob", NOW, 3600, "secret");
    let b = issue_token("bob", NOW, 3600, "secret");
    assert_ne!(a, b);
}

#[test]
fn signature_depends_on_secret() {
    let sig_a = sign("h", "p", "one");
    let sig_b = sign("h", "p", "two");
    assert_ne!(sig_a, sig_b);
    assert_eq!(sig_a.len(), 64);
}

// =============================================================================
// validity
// =============================================================================

#[test]
fn token_valid_strictly_before_expiry() {
    let token = issue_token("bob", NOW, 60, "secret");
    assert!(is_token_valid_at(&token, NOW));
    assert!(is_token_valid_at(&token, NOW + 59));
    assert!(!is_token_valid_at(&token, NOW + 60));
    assert!(!is_token_valid_at(&token, NOW + 61));
}

#[test]
fn zero_ttl_token_is_immediately_expired() {
    let token = issue_token("bob", NOW, 0, "secret");
    assert!(!is_token_valid_at(&token, NOW));
}

#[test]
fn freshly_issued_token_is_valid_now() {
    let token = issue_token("bob", now_secs(), 3600, "secret");
    assert!(is_token_valid(&token));
}

#[test]
fn standard_padded_encoding_is_decoded() {
    let token = encode_claims_standard(r#"{"sub":"bob","iat":1,"exp":2}"#);
    assert_eq!(expires_at(&token), Some(2));
    assert!(!is_token_valid_at(&token, 5));
}

#[test]
fn opaque_token_without_dots_is_valid() {
    assert_eq!(decode_claims("abcdef0123456789"), None);
    assert!(is_token_valid_at("abcdef0123456789", i64::MAX));
}

#[test]
fn two_segment_token_is_treated_as_opaque() {
    assert!(is_token_valid_at("abc.def", NOW));
}

#[test]
fn undecodable_middle_segment_is_treated_as_valid() {
    assert!(is_token_valid_at("aaa.%%%not-base64%%%.ccc", NOW));
}

#[test]
fn claims_without_expiry_are_treated_as_valid() {
    let token = encode_claims_standard(r#"{"sub":2,"user":"johnd","iat":1516239022}"#);
    assert_eq!(expires_at(&token), None);
    assert!(is_token_valid_at(&token, i64::MAX));
}

#[test]
fn non_json_middle_segment_is_treated_as_valid() {
    let payload = URL_SAFE_NO_PAD.encode("not json");
    let token = format!("h.{payload}.s");
    assert!(is_token_valid_at(&token, NOW));
}
