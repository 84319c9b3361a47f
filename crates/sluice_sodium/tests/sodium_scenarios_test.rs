//! End-to-end calls through the host surface against the simulated sandbox.

use sluice_core::{Encoding, Rendered, SluiceError, from_base64, from_hex, is_hex};
use sluice_sim::{FailurePlan, FaultPoint, SimSandbox, SimSeed};
use sluice_sodium::{Input, Sodium};
use sluice_wasm::Ready;
use std::panic::{AssertUnwindSafe, catch_unwind};

fn sodium() -> Sodium<SimSandbox> {
    Sodium::new(Ready::initialize(SimSandbox::default()).unwrap())
}

fn bytes(rendered: Rendered) -> Vec<u8> {
    rendered.into_bytes().expect("expected raw bytes")
}

fn assert_no_leaks(sodium: &Sodium<SimSandbox>) {
    assert_eq!(sodium.heap_stats().live(), 0);
    assert_eq!(sodium.backend().live_allocations(), 0);
}

#[test]
fn test_generichash_raw_then_hex() {
    let mut s = sodium();
    let raw = bytes(s.crypto_generichash("The quick brown fox", None, None).unwrap());
    assert_eq!(raw.len(), 32);

    s.set_encoding("hex").unwrap();
    let hex = s
        .crypto_generichash("The quick brown fox", None, None)
        .unwrap()
        .into_text()
        .unwrap();
    assert_eq!(hex.len(), 64);
    assert_eq!(hex, hex.to_lowercase());
    assert_eq!(from_hex(&hex).unwrap(), raw);
    assert_no_leaks(&s);
}

#[test]
fn test_generichash_key_changes_digest() {
    let mut s = sodium();
    let key = [0x42u8; 32];
    let plain = bytes(s.crypto_generichash("msg", None, None).unwrap());
    let keyed = bytes(s.crypto_generichash("msg", Some(Input::from(&key)), None).unwrap());
    assert_ne!(plain, keyed);

    let err = s.crypto_generichash("msg", Some(Input::from(&[0u8; 8])), None).unwrap_err();
    assert_eq!(err.to_string(), "crypto_generichash expected 16 to 64-byte key but got length 8");
}

#[test]
fn test_sha256_known_answer() {
    let mut s = sodium();
    let digest = s.crypto_hash_sha256("abc", Some("hex")).unwrap();
    assert_eq!(
        digest.as_text(),
        Some("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
    );
}

#[test]
fn test_auth_verify_corrupted_is_primitive_error() {
    let mut s = sodium();
    let key = [7u8; 32];
    let mut tag = bytes(s.crypto_auth("transfer 100", &key, None).unwrap());
    s.crypto_auth_verify(&tag, "transfer 100", &key).unwrap();

    tag[0] ^= 0x01;
    let err = s.crypto_auth_verify(&tag, "transfer 100", &key).unwrap_err();
    assert_eq!(
        err,
        SluiceError::Primitive {
            call: "crypto_auth_verify".to_string(),
            status: -1
        }
    );
    assert_no_leaks(&s);
}

#[test]
fn test_secretbox_round_trip_as_utf8() {
    let mut s = sodium();
    let nonce = [1u8; 24];
    let key = [2u8; 32];
    let sealed = bytes(s.crypto_secretbox_easy("hello sandbox", &nonce, &key, None).unwrap());
    assert_eq!(sealed.len(), "hello sandbox".len() + 16);

    let opened = s.crypto_secretbox_open_easy(&sealed, &nonce, &key, Some("utf8")).unwrap();
    assert_eq!(opened.as_text(), Some("hello sandbox"));

    let mut forged = sealed.clone();
    *forged.last_mut().unwrap() ^= 0x80;
    let err = s.crypto_secretbox_open_easy(&forged, &nonce, &key, None).unwrap_err();
    assert_eq!(err.kind(), "PrimitiveError");

    let err = s.crypto_secretbox_open_easy(&sealed[..15], &nonce, &key, None).unwrap_err();
    assert_eq!(
        err.to_string(),
        "crypto_secretbox_open_easy expected at least 16-byte ciphertext but got length 15"
    );
    assert_no_leaks(&s);
}

#[test]
fn test_aead_additional_data() {
    let mut s = sodium();
    let nonce = [3u8; 12];
    let key = [4u8; 32];
    let header = || Some(Input::from("header"));
    let sealed = bytes(
        s.crypto_aead_chacha20poly1305_ietf_encrypt("payload", header(), &nonce, &key, None)
            .unwrap(),
    );
    assert_eq!(sealed.len(), 7 + 16);

    let opened = s
        .crypto_aead_chacha20poly1305_ietf_decrypt(&sealed, header(), &nonce, &key, None)
        .unwrap();
    assert_eq!(bytes(opened), b"payload");

    let err = s
        .crypto_aead_chacha20poly1305_ietf_decrypt(&sealed, None, &nonce, &key, None)
        .unwrap_err();
    assert_eq!(err.kind(), "PrimitiveError");

    let unbound = bytes(
        s.crypto_aead_chacha20poly1305_ietf_encrypt("payload", None, &nonce, &key, None)
            .unwrap(),
    );
    let opened = s
        .crypto_aead_chacha20poly1305_ietf_decrypt(&unbound, None, &nonce, &key, None)
        .unwrap();
    assert_eq!(bytes(opened), b"payload");
    assert_no_leaks(&s);
}

#[test]
fn test_seed_keypair_hex_composite() {
    let mut s = sodium();
    let seed = [9u8; 32];
    let raw = s.crypto_sign_seed_keypair(&seed, None).unwrap();
    let hex = s.crypto_sign_seed_keypair(&seed, Some("hex")).unwrap();

    let public = hex.get("publicKey").and_then(Rendered::as_text).unwrap();
    let private = hex.get("privateKey").and_then(Rendered::as_text).unwrap();
    assert!(is_hex(public) && is_hex(private));
    assert_eq!(public.len(), 64);
    assert_eq!(private.len(), 128);
    assert_eq!(hex.get("keyType").and_then(Rendered::as_text), Some("ed25519"));

    assert_eq!(
        from_hex(public).unwrap(),
        raw.get("publicKey").and_then(Rendered::as_bytes).unwrap()
    );
    assert_eq!(
        from_hex(private).unwrap(),
        raw.get("privateKey").and_then(Rendered::as_bytes).unwrap()
    );
    assert_eq!(raw.get("keyType").and_then(Rendered::as_text), Some("ed25519"));
}

#[test]
fn test_sign_and_verify() {
    let mut s = sodium();
    let pair = s.crypto_sign_keypair(None).unwrap();
    let public = pair.get("publicKey").and_then(Rendered::as_bytes).unwrap().to_vec();
    let private = pair.get("privateKey").and_then(Rendered::as_bytes).unwrap().to_vec();

    let signature = bytes(s.crypto_sign_detached("release v1", &private, None).unwrap());
    assert_eq!(signature.len(), 64);
    s.crypto_sign_verify_detached(&signature, "release v1", &public).unwrap();

    let err = s
        .crypto_sign_verify_detached(&signature, "release v2", &public)
        .unwrap_err();
    assert_eq!(err.kind(), "PrimitiveError");
    assert_no_leaks(&s);
}

#[test]
fn test_key_exchange_agrees() {
    let mut s = sodium();
    let alice = s.crypto_box_keypair(None).unwrap();
    let bob = s.crypto_box_keypair(None).unwrap();
    assert_eq!(alice.get("keyType").and_then(Rendered::as_text), Some("x25519"));

    let key = |pair: &Rendered, name: &str| {
        pair.get(name).and_then(Rendered::as_bytes).unwrap().to_vec()
    };
    let (alice_public, alice_private) = (key(&alice, "publicKey"), key(&alice, "privateKey"));
    let (bob_public, bob_private) = (key(&bob, "publicKey"), key(&bob, "privateKey"));

    let derived = bytes(s.crypto_scalarmult_base(&alice_private, None).unwrap());
    assert_eq!(derived, alice_public);

    let ab = bytes(s.crypto_scalarmult(&alice_private, &bob_public, None).unwrap());
    let ba = bytes(s.crypto_scalarmult(&bob_private, &alice_public, None).unwrap());
    assert_eq!(ab, ba);

    // The identity point gives an all-zero secret
    let err = s.crypto_scalarmult(&alice_private, &[0u8; 32], None).unwrap_err();
    assert_eq!(err.kind(), "PrimitiveError");
    assert_no_leaks(&s);
}

#[test]
fn test_randombytes_reproducible_per_seed() {
    let draw = |seed| {
        let sandbox = SimSandbox::new(SimSeed::from_literal(seed));
        let mut s = Sodium::new(Ready::initialize(sandbox).unwrap());
        s.randombytes_buf(24, Some("base64")).unwrap().into_text().unwrap()
    };
    let a = draw(11);
    assert_eq!(a, draw(11));
    assert_ne!(a, draw(12));
    assert_eq!(from_base64(&a).unwrap().len(), 24);
}

#[test]
fn test_set_encoding_rejects_unknown() {
    let mut s = sodium();
    s.set_encoding("hex").unwrap();
    assert_eq!(s.encoding(), Encoding::Hex);

    let err = s.set_encoding("bogus").unwrap_err();
    assert_eq!(err, SluiceError::UnsupportedEncoding("bogus".to_string()));
    assert_eq!(s.encoding(), Encoding::Hex);
    assert_eq!(
        Sodium::<SimSandbox>::available_encodings(),
        ["hex", "base64", "utf8", "uint8array"]
    );
}

#[test]
fn test_argument_errors() {
    let mut s = sodium();
    let err = s.call("crypto_auth", &[Some(Input::from("m"))], None).unwrap_err();
    assert_eq!(err.to_string(), "crypto_auth: key cannot be null or undefined");

    let err = s
        .call("crypto_auth", &[Some(Input::Number(1)), Some(Input::from(&[0u8; 32]))], None)
        .unwrap_err();
    assert_eq!(err.kind(), "UnsupportedType");
    assert_eq!(s.heap_stats().allocations, 0);
}

#[test]
fn test_utf8_of_binary_output_is_format_error() {
    let mut s = sodium();
    // The digest of "abc" starts 0xba 0x78, not valid UTF-8
    let err = s.crypto_hash_sha256("abc", Some("utf8")).unwrap_err();
    assert_eq!(err.kind(), "FormatError");
    assert_no_leaks(&s);
}

#[test]
fn test_rendered_composite_serializes_in_order() {
    let mut s = sodium();
    let pair = s.crypto_sign_seed_keypair(&[1u8; 32], Some("base64")).unwrap();
    let json = serde_json::to_string(&pair).unwrap();
    let public_at = json.find("publicKey").unwrap();
    let private_at = json.find("privateKey").unwrap();
    let type_at = json.find("keyType").unwrap();
    assert!(public_at < private_at && private_at < type_at);
}

#[test]
fn test_failed_init_prevents_construction() {
    let sandbox = SimSandbox::default().with_plan(FailurePlan::none().fail_init());
    let err = Ready::initialize(sandbox).err().unwrap();
    assert_eq!(err.kind(), "NotReady");
}

#[test]
#[should_panic(expected = "fatal sandbox error during invoke crypto_hash_sha256")]
fn test_trap_is_fatal() {
    let plan = FailurePlan::none().trap_at(FaultPoint::Invoke("crypto_hash_sha256".to_string()));
    let mut s = Sodium::new(Ready::initialize(SimSandbox::default().with_plan(plan)).unwrap());
    let _ = s.crypto_hash_sha256("abc", None);
}

#[test]
#[should_panic(expected = "fatal sandbox error during free")]
fn test_trap_during_release_is_fatal() {
    let plan = FailurePlan::none().trap_at(FaultPoint::Free);
    let mut s = Sodium::new(Ready::initialize(SimSandbox::default().with_plan(plan)).unwrap());
    let _ = s.randombytes_buf(4, None);
}

#[test]
fn test_no_call_runs_after_a_caught_fault() {
    let plan = FailurePlan::none().trap_at(FaultPoint::Invoke("crypto_hash_sha256".to_string()));
    let mut s = Sodium::new(Ready::initialize(SimSandbox::default().with_plan(plan)).unwrap());

    let first = catch_unwind(AssertUnwindSafe(|| s.crypto_hash_sha256("abc", None)));
    assert!(first.is_err());
    assert!(s.is_poisoned());
    let mallocs = s.backend().stats().mallocs;
    let live = s.backend().live_allocations();

    let again = catch_unwind(AssertUnwindSafe(|| s.crypto_hash_sha512("abc", Some("hex"))));
    assert!(again.is_err());
    assert_eq!(s.backend().stats().mallocs, mallocs);
    assert_eq!(s.backend().live_allocations(), live);
    assert!(s.backend().invoked().is_empty());
}
