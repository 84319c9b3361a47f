//! The compiled-in catalog of supported primitives.
//!
//! Sizes are libsodium's `*_BYTES` constants; layouts follow the C
//! signatures of the exports.

use crate::contract::{ArgSpec, CallContract, LengthRule, OutputLength, OutputSpec, Slot, Width};
use sluice_core::{SluiceError, SluiceResult};

use LengthRule::{Any, AtLeast, Fixed, Range};
use OutputLength::{InputMinus, InputPlus, Scalar};
use Width::{LongLong, Size};

const HASH_BYTES: usize = 32;
const SHA256_BYTES: usize = 32;
const SHA512_BYTES: usize = 64;
const AUTH_BYTES: usize = 32;
const AUTH_KEYBYTES: usize = 32;
const SECRETBOX_NONCEBYTES: usize = 24;
const SECRETBOX_KEYBYTES: usize = 32;
const SECRETBOX_MACBYTES: usize = 16;
const AEAD_NPUBBYTES: usize = 12;
const AEAD_KEYBYTES: usize = 32;
const AEAD_ABYTES: usize = 16;
const SIGN_PUBLICKEYBYTES: usize = 32;
const SIGN_SECRETKEYBYTES: usize = 64;
const SIGN_SEEDBYTES: usize = 32;
const SIGN_BYTES: usize = 64;
const SCALARMULT_BYTES: usize = 32;
const SCALARMULT_SCALARBYTES: usize = 32;

/// Largest `randombytes_buf` request: anything the 32-bit sandbox can address
const RANDOMBYTES_MAX: u64 = u32::MAX as u64;

const SIGN_KEYPAIR_OUTPUTS: &[OutputSpec] = &[
    OutputSpec::new("publicKey", OutputLength::Fixed(SIGN_PUBLICKEYBYTES)),
    OutputSpec::new("privateKey", OutputLength::Fixed(SIGN_SECRETKEYBYTES)),
];

/// Every supported call, sorted by name
pub static CATALOG: &[CallContract] = &[
    CallContract {
        name: "crypto_aead_chacha20poly1305_ietf_decrypt",
        export: "crypto_aead_chacha20poly1305_ietf_decrypt",
        args: &[
            ArgSpec::bytes("ciphertext", AtLeast(AEAD_ABYTES)),
            ArgSpec::optional("additional_data", Any),
            ArgSpec::bytes("public_nonce", Fixed(AEAD_NPUBBYTES)),
            ArgSpec::bytes("key", Fixed(AEAD_KEYBYTES)),
        ],
        outputs: &[OutputSpec::new("message", InputMinus(0, AEAD_ABYTES))],
        literals: &[],
        // (m, mlen_p, nsec, c, clen, ad, adlen, npub, k)
        layout: &[
            Slot::Output(0),
            Slot::Null,
            Slot::Null,
            Slot::Input(0),
            Slot::InputLen(0, LongLong),
            Slot::Input(1),
            Slot::InputLen(1, LongLong),
            Slot::Input(2),
            Slot::Input(3),
        ],
    },
    CallContract {
        name: "crypto_aead_chacha20poly1305_ietf_encrypt",
        export: "crypto_aead_chacha20poly1305_ietf_encrypt",
        args: &[
            ArgSpec::bytes("message", Any),
            ArgSpec::optional("additional_data", Any),
            ArgSpec::bytes("public_nonce", Fixed(AEAD_NPUBBYTES)),
            ArgSpec::bytes("key", Fixed(AEAD_KEYBYTES)),
        ],
        outputs: &[OutputSpec::new("ciphertext", InputPlus(0, AEAD_ABYTES))],
        literals: &[],
        // (c, clen_p, m, mlen, ad, adlen, nsec, npub, k)
        layout: &[
            Slot::Output(0),
            Slot::Null,
            Slot::Input(0),
            Slot::InputLen(0, LongLong),
            Slot::Input(1),
            Slot::InputLen(1, LongLong),
            Slot::Null,
            Slot::Input(2),
            Slot::Input(3),
        ],
    },
    CallContract {
        name: "crypto_auth",
        export: "crypto_auth",
        args: &[
            ArgSpec::bytes("message", Any),
            ArgSpec::bytes("key", Fixed(AUTH_KEYBYTES)),
        ],
        outputs: &[OutputSpec::new("tag", OutputLength::Fixed(AUTH_BYTES))],
        literals: &[],
        layout: &[
            Slot::Output(0),
            Slot::Input(0),
            Slot::InputLen(0, LongLong),
            Slot::Input(1),
        ],
    },
    CallContract {
        name: "crypto_auth_verify",
        export: "crypto_auth_verify",
        args: &[
            ArgSpec::bytes("tag", Fixed(AUTH_BYTES)),
            ArgSpec::bytes("message", Any),
            ArgSpec::bytes("key", Fixed(AUTH_KEYBYTES)),
        ],
        outputs: &[],
        literals: &[],
        layout: &[
            Slot::Input(0),
            Slot::Input(1),
            Slot::InputLen(1, LongLong),
            Slot::Input(2),
        ],
    },
    CallContract {
        name: "crypto_box_keypair",
        export: "crypto_box_keypair",
        args: &[],
        outputs: &[
            OutputSpec::new("publicKey", OutputLength::Fixed(SCALARMULT_BYTES)),
            OutputSpec::new("privateKey", OutputLength::Fixed(SCALARMULT_SCALARBYTES)),
        ],
        literals: &[("keyType", "x25519")],
        layout: &[Slot::Output(0), Slot::Output(1)],
    },
    CallContract {
        name: "crypto_generichash",
        export: "crypto_generichash",
        args: &[
            ArgSpec::bytes("message", Any),
            ArgSpec::optional("key", Range(16, 64)),
        ],
        outputs: &[OutputSpec::new("hash", OutputLength::Fixed(HASH_BYTES))],
        literals: &[],
        // (out, outlen, in, inlen, key, keylen)
        layout: &[
            Slot::Output(0),
            Slot::OutputLen(0, Size),
            Slot::Input(0),
            Slot::InputLen(0, LongLong),
            Slot::Input(1),
            Slot::InputLen(1, Size),
        ],
    },
    CallContract {
        name: "crypto_hash_sha256",
        export: "crypto_hash_sha256",
        args: &[ArgSpec::bytes("message", Any)],
        outputs: &[OutputSpec::new("hash", OutputLength::Fixed(SHA256_BYTES))],
        literals: &[],
        layout: &[Slot::Output(0), Slot::Input(0), Slot::InputLen(0, LongLong)],
    },
    CallContract {
        name: "crypto_hash_sha512",
        export: "crypto_hash_sha512",
        args: &[ArgSpec::bytes("message", Any)],
        outputs: &[OutputSpec::new("hash", OutputLength::Fixed(SHA512_BYTES))],
        literals: &[],
        layout: &[Slot::Output(0), Slot::Input(0), Slot::InputLen(0, LongLong)],
    },
    CallContract {
        name: "crypto_scalarmult",
        export: "crypto_scalarmult",
        args: &[
            ArgSpec::bytes("privateKey", Fixed(SCALARMULT_SCALARBYTES)),
            ArgSpec::bytes("publicKey", Fixed(SCALARMULT_BYTES)),
        ],
        outputs: &[OutputSpec::new("sharedSecret", OutputLength::Fixed(SCALARMULT_BYTES))],
        literals: &[],
        layout: &[Slot::Output(0), Slot::Input(0), Slot::Input(1)],
    },
    CallContract {
        name: "crypto_scalarmult_base",
        export: "crypto_scalarmult_base",
        args: &[ArgSpec::bytes("privateKey", Fixed(SCALARMULT_SCALARBYTES))],
        outputs: &[OutputSpec::new("publicKey", OutputLength::Fixed(SCALARMULT_BYTES))],
        literals: &[],
        layout: &[Slot::Output(0), Slot::Input(0)],
    },
    CallContract {
        name: "crypto_secretbox_easy",
        export: "crypto_secretbox_easy",
        args: &[
            ArgSpec::bytes("message", Any),
            ArgSpec::bytes("nonce", Fixed(SECRETBOX_NONCEBYTES)),
            ArgSpec::bytes("key", Fixed(SECRETBOX_KEYBYTES)),
        ],
        outputs: &[OutputSpec::new("ciphertext", InputPlus(0, SECRETBOX_MACBYTES))],
        literals: &[],
        layout: &[
            Slot::Output(0),
            Slot::Input(0),
            Slot::InputLen(0, LongLong),
            Slot::Input(1),
            Slot::Input(2),
        ],
    },
    CallContract {
        name: "crypto_secretbox_open_easy",
        export: "crypto_secretbox_open_easy",
        args: &[
            ArgSpec::bytes("ciphertext", AtLeast(SECRETBOX_MACBYTES)),
            ArgSpec::bytes("nonce", Fixed(SECRETBOX_NONCEBYTES)),
            ArgSpec::bytes("key", Fixed(SECRETBOX_KEYBYTES)),
        ],
        outputs: &[OutputSpec::new("message", InputMinus(0, SECRETBOX_MACBYTES))],
        literals: &[],
        layout: &[
            Slot::Output(0),
            Slot::Input(0),
            Slot::InputLen(0, LongLong),
            Slot::Input(1),
            Slot::Input(2),
        ],
    },
    CallContract {
        name: "crypto_sign_detached",
        export: "crypto_sign_detached",
        args: &[
            ArgSpec::bytes("message", Any),
            ArgSpec::bytes("privateKey", Fixed(SIGN_SECRETKEYBYTES)),
        ],
        outputs: &[OutputSpec::new("signature", OutputLength::Fixed(SIGN_BYTES))],
        literals: &[],
        // (sig, siglen_p, m, mlen, sk)
        layout: &[
            Slot::Output(0),
            Slot::Null,
            Slot::Input(0),
            Slot::InputLen(0, LongLong),
            Slot::Input(1),
        ],
    },
    CallContract {
        name: "crypto_sign_keypair",
        export: "crypto_sign_keypair",
        args: &[],
        outputs: SIGN_KEYPAIR_OUTPUTS,
        literals: &[("keyType", "ed25519")],
        layout: &[Slot::Output(0), Slot::Output(1)],
    },
    CallContract {
        name: "crypto_sign_seed_keypair",
        export: "crypto_sign_seed_keypair",
        args: &[ArgSpec::bytes("seed", Fixed(SIGN_SEEDBYTES))],
        outputs: SIGN_KEYPAIR_OUTPUTS,
        literals: &[("keyType", "ed25519")],
        layout: &[Slot::Output(0), Slot::Output(1), Slot::Input(0)],
    },
    CallContract {
        name: "crypto_sign_verify_detached",
        export: "crypto_sign_verify_detached",
        args: &[
            ArgSpec::bytes("signature", Fixed(SIGN_BYTES)),
            ArgSpec::bytes("message", Any),
            ArgSpec::bytes("publicKey", Fixed(SIGN_PUBLICKEYBYTES)),
        ],
        outputs: &[],
        literals: &[],
        layout: &[
            Slot::Input(0),
            Slot::Input(1),
            Slot::InputLen(1, LongLong),
            Slot::Input(2),
        ],
    },
    CallContract {
        name: "randombytes_buf",
        export: "randombytes_buf",
        args: &[ArgSpec::scalar("length", RANDOMBYTES_MAX)],
        outputs: &[OutputSpec::new("buffer", Scalar(0))],
        literals: &[],
        layout: &[Slot::Output(0), Slot::Scalar(0, Size)],
    },
];

/// Find a call by name
///
/// # Errors
///
/// Returns `UnknownCall` if the name is not in the catalog
pub fn lookup(name: &str) -> SluiceResult<&'static CallContract> {
    CATALOG
        .binary_search_by(|contract| contract.name.cmp(name))
        .map(|index| &CATALOG[index])
        .map_err(|_| SluiceError::UnknownCall(name.to_string()))
}

/// Sorted names of every supported call
#[must_use]
pub fn names() -> Vec<&'static str> {
    CATALOG.iter().map(|contract| contract.name).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::ArgKind;

    #[test]
    fn test_catalog_is_sorted_and_unique() {
        for pair in CATALOG.windows(2) {
            assert!(pair[0].name < pair[1].name, "{} >= {}", pair[0].name, pair[1].name);
        }
    }

    #[test]
    fn test_lookup() {
        assert_eq!(lookup("crypto_auth").unwrap().export, "crypto_auth");
        let err = lookup("crypto_pwhash").unwrap_err();
        assert_eq!(err, SluiceError::UnknownCall("crypto_pwhash".to_string()));
    }

    #[test]
    fn test_layouts_reference_declared_slots() {
        for contract in CATALOG {
            for slot in contract.layout {
                match *slot {
                    Slot::Output(i) | Slot::OutputLen(i, _) => {
                        assert!(i < contract.outputs.len(), "{}: output {i}", contract.name);
                    }
                    Slot::Input(i) | Slot::InputLen(i, _) => {
                        assert!(
                            matches!(contract.args.get(i).map(|a| a.kind), Some(ArgKind::Bytes(_))),
                            "{}: input {i}",
                            contract.name
                        );
                    }
                    Slot::Scalar(i, _) => {
                        assert!(
                            matches!(
                                contract.args.get(i).map(|a| a.kind),
                                Some(ArgKind::Scalar { .. })
                            ),
                            "{}: scalar {i}",
                            contract.name
                        );
                    }
                    Slot::Null => {}
                }
            }
        }
    }

    #[test]
    fn test_every_output_is_passed() {
        for contract in CATALOG {
            for i in 0..contract.outputs.len() {
                assert!(
                    contract.layout.contains(&Slot::Output(i)),
                    "{}: output {i}",
                    contract.name
                );
            }
        }
    }

    #[test]
    fn test_derived_lengths_reference_inputs() {
        for contract in CATALOG {
            for output in contract.outputs {
                if let InputPlus(i, _) | InputMinus(i, _) | Scalar(i) = output.length {
                    assert!(i < contract.args.len(), "{}: {}", contract.name, output.name);
                }
            }
        }
    }
}
