//! Stand-in primitives with libsodium export signatures.
//!
//! The marshaller only relies on signatures, sizes and status codes, so
//! some algorithms are substitutes for ones the workspace has no crate for:
//! BLAKE3 replaces BLAKE2b in `crypto_generichash`, SHA-512 prefix
//! hashing replaces HMAC in `crypto_auth`, and the two secret-key
//! constructions use a BLAKE3 keystream with a truncated BLAKE3 MAC.
//! Ed25519, X25519 and SHA-2 are the real algorithms.

use crate::memory::LinearMemory;
use curve25519_dalek::montgomery::MontgomeryPoint;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::RngCore;
use rand_chacha::ChaCha8Rng;
use sha2::{Digest, Sha256, Sha512};
use sluice_wasm::{CallArg, SandboxFault};

/// Exports implemented by the simulated sandbox
pub const EXPORTS: &[&str] = &[
    "crypto_aead_chacha20poly1305_ietf_decrypt",
    "crypto_aead_chacha20poly1305_ietf_encrypt",
    "crypto_auth",
    "crypto_auth_verify",
    "crypto_box_keypair",
    "crypto_generichash",
    "crypto_hash_sha256",
    "crypto_hash_sha512",
    "crypto_scalarmult",
    "crypto_scalarmult_base",
    "crypto_secretbox_easy",
    "crypto_secretbox_open_easy",
    "crypto_sign_detached",
    "crypto_sign_keypair",
    "crypto_sign_seed_keypair",
    "crypto_sign_verify_detached",
    "randombytes_buf",
];

const MAC_BYTES: usize = 16;
const FAILED: i32 = -1;

/// Run an export against simulated memory
///
/// # Errors
///
/// Returns a fault for unknown exports, wrong argument shapes and
/// out-of-bounds accesses, as a real module would trap
pub fn dispatch(
    export: &str,
    args: &[CallArg],
    memory: &mut LinearMemory,
    rng: &mut ChaCha8Rng,
) -> Result<i32, SandboxFault> {
    let a = Args { export, args };
    match export {
        "crypto_generichash" => generichash(&a, memory),
        "crypto_hash_sha256" => {
            a.arity(3)?;
            let message = a.read(memory, 1, a.len64(2)?)?;
            a.write(memory, 0, &Sha256::digest(&message))?;
            Ok(0)
        }
        "crypto_hash_sha512" => {
            a.arity(3)?;
            let message = a.read(memory, 1, a.len64(2)?)?;
            a.write(memory, 0, &Sha512::digest(&message))?;
            Ok(0)
        }
        "crypto_auth" => {
            a.arity(4)?;
            let message = a.read(memory, 1, a.len64(2)?)?;
            let key = a.read(memory, 3, 32)?;
            a.write(memory, 0, &auth_tag(&key, &message))?;
            Ok(0)
        }
        "crypto_auth_verify" => {
            a.arity(4)?;
            let tag = a.read(memory, 0, 32)?;
            let message = a.read(memory, 1, a.len64(2)?)?;
            let key = a.read(memory, 3, 32)?;
            Ok(if auth_tag(&key, &message)[..] == tag[..] { 0 } else { FAILED })
        }
        "crypto_secretbox_easy" => {
            a.arity(5)?;
            let message = a.read(memory, 1, a.len64(2)?)?;
            let nonce = a.read(memory, 3, 24)?;
            let key = a.key(memory, 4)?;
            let (body, tag) = seal(&key, &nonce, &[], &message);
            let mut combined = tag.to_vec();
            combined.extend_from_slice(&body);
            a.write(memory, 0, &combined)?;
            Ok(0)
        }
        "crypto_secretbox_open_easy" => {
            a.arity(5)?;
            let clen = a.len64(2)?;
            if clen < MAC_BYTES {
                return Ok(FAILED);
            }
            let combined = a.read(memory, 1, clen)?;
            let nonce = a.read(memory, 3, 24)?;
            let key = a.key(memory, 4)?;
            let (tag, body) = combined.split_at(MAC_BYTES);
            match open(&key, &nonce, &[], body, tag) {
                Some(message) => {
                    a.write(memory, 0, &message)?;
                    Ok(0)
                }
                None => Ok(FAILED),
            }
        }
        "crypto_aead_chacha20poly1305_ietf_encrypt" => aead_encrypt(&a, memory),
        "crypto_aead_chacha20poly1305_ietf_decrypt" => aead_decrypt(&a, memory),
        "crypto_sign_keypair" => {
            a.arity(2)?;
            let mut seed = [0u8; 32];
            rng.fill_bytes(&mut seed);
            let (public, secret) = sign_keypair(&seed);
            a.write(memory, 0, &public)?;
            a.write(memory, 1, &secret)?;
            Ok(0)
        }
        "crypto_sign_seed_keypair" => {
            a.arity(3)?;
            let seed = a.key(memory, 2)?;
            let (public, secret) = sign_keypair(&seed);
            a.write(memory, 0, &public)?;
            a.write(memory, 1, &secret)?;
            Ok(0)
        }
        "crypto_sign_detached" => {
            a.arity(5)?;
            let message = a.read(memory, 2, a.len64(3)?)?;
            let secret = a.read(memory, 4, 64)?;
            let seed = a.to_key(&secret[..32])?;
            let signature = SigningKey::from_bytes(&seed).sign(&message).to_bytes();
            a.write(memory, 0, &signature)?;
            a.write_len(memory, 1, signature.len())?;
            Ok(0)
        }
        "crypto_sign_verify_detached" => {
            a.arity(4)?;
            let signature = a.read(memory, 0, 64)?;
            let message = a.read(memory, 1, a.len64(2)?)?;
            let public = a.key(memory, 3)?;
            let Ok(verifying) = VerifyingKey::from_bytes(&public) else {
                return Ok(FAILED);
            };
            let mut raw = [0u8; 64];
            raw.copy_from_slice(&signature);
            let signature = Signature::from_bytes(&raw);
            Ok(if verifying.verify(&message, &signature).is_ok() { 0 } else { FAILED })
        }
        "crypto_box_keypair" => {
            a.arity(2)?;
            let mut secret = [0u8; 32];
            rng.fill_bytes(&mut secret);
            a.write(memory, 0, MontgomeryPoint::mul_base_clamped(secret).as_bytes())?;
            a.write(memory, 1, &secret)?;
            Ok(0)
        }
        "crypto_scalarmult_base" => {
            a.arity(2)?;
            let scalar = a.key(memory, 1)?;
            a.write(memory, 0, MontgomeryPoint::mul_base_clamped(scalar).as_bytes())?;
            Ok(0)
        }
        "crypto_scalarmult" => {
            a.arity(3)?;
            let scalar = a.key(memory, 1)?;
            let point = MontgomeryPoint(a.key(memory, 2)?);
            let shared = point.mul_clamped(scalar).to_bytes();
            a.write(memory, 0, &shared)?;
            // Low-order points yield the all-zero secret
            Ok(if shared.iter().all(|&b| b == 0) { FAILED } else { 0 })
        }
        "randombytes_buf" => {
            a.arity(2)?;
            let mut bytes = vec![0u8; a.size(1)?];
            rng.fill_bytes(&mut bytes);
            a.write(memory, 0, &bytes)?;
            Ok(0)
        }
        _ => Err(SandboxFault::new(format!("invoke {export}"), "export not found")),
    }
}

fn generichash(a: &Args<'_>, memory: &mut LinearMemory) -> Result<i32, SandboxFault> {
    a.arity(6)?;
    let out_len = a.size(1)?;
    let key_len = a.size(5)?;
    if !(16..=64).contains(&out_len) || key_len > 64 {
        return Ok(FAILED);
    }
    let message = a.read(memory, 2, a.len64(3)?)?;
    let key = if key_len == 0 { Vec::new() } else { a.read(memory, 4, key_len)? };

    let mut hasher = blake3::Hasher::new();
    hasher.update(&(key_len as u64).to_le_bytes());
    hasher.update(&key);
    hasher.update(&message);
    let mut digest = vec![0u8; out_len];
    hasher.finalize_xof().fill(&mut digest);
    a.write(memory, 0, &digest)?;
    Ok(0)
}

fn aead_encrypt(a: &Args<'_>, memory: &mut LinearMemory) -> Result<i32, SandboxFault> {
    // (c, clen_p, m, mlen, ad, adlen, nsec, npub, k)
    a.arity(9)?;
    let message = a.read(memory, 2, a.len64(3)?)?;
    let ad = a.read(memory, 4, a.len64(5)?)?;
    let nonce = a.read(memory, 7, 12)?;
    let key = a.key(memory, 8)?;
    let (mut combined, tag) = seal(&key, &nonce, &ad, &message);
    combined.extend_from_slice(&tag);
    a.write(memory, 0, &combined)?;
    a.write_len(memory, 1, combined.len())?;
    Ok(0)
}

fn aead_decrypt(a: &Args<'_>, memory: &mut LinearMemory) -> Result<i32, SandboxFault> {
    // (m, mlen_p, nsec, c, clen, ad, adlen, npub, k)
    a.arity(9)?;
    let clen = a.len64(4)?;
    if clen < MAC_BYTES {
        return Ok(FAILED);
    }
    let combined = a.read(memory, 3, clen)?;
    let ad = a.read(memory, 5, a.len64(6)?)?;
    let nonce = a.read(memory, 7, 12)?;
    let key = a.key(memory, 8)?;
    let (body, tag) = combined.split_at(clen - MAC_BYTES);
    match open(&key, &nonce, &ad, body, tag) {
        Some(message) => {
            a.write(memory, 0, &message)?;
            a.write_len(memory, 1, message.len())?;
            Ok(0)
        }
        None => Ok(FAILED),
    }
}

fn auth_tag(key: &[u8], message: &[u8]) -> [u8; 32] {
    let digest = Sha512::new().chain_update(key).chain_update(message).finalize();
    let mut tag = [0u8; 32];
    tag.copy_from_slice(&digest[..32]);
    tag
}

fn sign_keypair(seed: &[u8; 32]) -> ([u8; 32], [u8; 64]) {
    let public = SigningKey::from_bytes(seed).verifying_key().to_bytes();
    let mut secret = [0u8; 64];
    secret[..32].copy_from_slice(seed);
    secret[32..].copy_from_slice(&public);
    (public, secret)
}

fn seal(key: &[u8; 32], nonce: &[u8], ad: &[u8], message: &[u8]) -> (Vec<u8>, [u8; MAC_BYTES]) {
    let body: Vec<u8> = keystream(key, nonce, message.len())
        .iter()
        .zip(message)
        .map(|(k, m)| k ^ m)
        .collect();
    let tag = mac(key, nonce, ad, &body);
    (body, tag)
}

fn open(key: &[u8; 32], nonce: &[u8], ad: &[u8], body: &[u8], tag: &[u8]) -> Option<Vec<u8>> {
    let expected = mac(key, nonce, ad, body);
    if expected[..] != tag[..] {
        return None;
    }
    Some(
        keystream(key, nonce, body.len())
            .iter()
            .zip(body)
            .map(|(k, c)| k ^ c)
            .collect(),
    )
}

fn keystream(key: &[u8; 32], nonce: &[u8], len: usize) -> Vec<u8> {
    let mut hasher = blake3::Hasher::new_keyed(key);
    hasher.update(b"sluice-sim stream");
    hasher.update(nonce);
    let mut stream = vec![0u8; len];
    hasher.finalize_xof().fill(&mut stream);
    stream
}

fn mac(key: &[u8; 32], nonce: &[u8], ad: &[u8], body: &[u8]) -> [u8; MAC_BYTES] {
    let mut hasher = blake3::Hasher::new_keyed(key);
    hasher.update(b"sluice-sim mac");
    hasher.update(nonce);
    hasher.update(&(ad.len() as u64).to_le_bytes());
    hasher.update(ad);
    hasher.update(body);
    let mut tag = [0u8; MAC_BYTES];
    tag.copy_from_slice(&hasher.finalize().as_bytes()[..MAC_BYTES]);
    tag
}

/// Argument decoding for one export invocation
struct Args<'a> {
    export: &'a str,
    args: &'a [CallArg],
}

impl Args<'_> {
    fn fault(&self, reason: impl ToString) -> SandboxFault {
        SandboxFault::new(format!("invoke {}", self.export), reason)
    }

    fn arity(&self, expected: usize) -> Result<(), SandboxFault> {
        if self.args.len() == expected {
            Ok(())
        } else {
            Err(self.fault(format!("expected {expected} arguments, got {}", self.args.len())))
        }
    }

    fn ptr(&self, i: usize) -> Result<u32, SandboxFault> {
        match self.args.get(i) {
            Some(CallArg::Address(address)) => Ok(address.raw()),
            Some(CallArg::Null) => Ok(0),
            other => Err(self.fault(format!("argument {i} is not a pointer: {other:?}"))),
        }
    }

    fn size(&self, i: usize) -> Result<usize, SandboxFault> {
        match self.args.get(i) {
            Some(CallArg::U32(v)) => Ok(*v as usize),
            other => Err(self.fault(format!("argument {i} is not a size_t: {other:?}"))),
        }
    }

    fn len64(&self, i: usize) -> Result<usize, SandboxFault> {
        match self.args.get(i) {
            Some(CallArg::U64(v)) => {
                usize::try_from(*v).map_err(|_| self.fault(format!("argument {i} overflows")))
            }
            other => Err(self.fault(format!(
                "argument {i} is not an unsigned long long: {other:?}"
            ))),
        }
    }

    fn read(&self, memory: &LinearMemory, i: usize, len: usize) -> Result<Vec<u8>, SandboxFault> {
        if len == 0 {
            return Ok(Vec::new());
        }
        let address = self.ptr(i)?;
        memory
            .read(address, len)
            .map(<[u8]>::to_vec)
            .map_err(|e| self.fault(e))
    }

    fn key(&self, memory: &LinearMemory, i: usize) -> Result<[u8; 32], SandboxFault> {
        let bytes = self.read(memory, i, 32)?;
        self.to_key(&bytes)
    }

    fn to_key(&self, bytes: &[u8]) -> Result<[u8; 32], SandboxFault> {
        <[u8; 32]>::try_from(bytes).map_err(|_| self.fault("key is not 32 bytes"))
    }

    fn write(&self, memory: &mut LinearMemory, i: usize, bytes: &[u8]) -> Result<(), SandboxFault> {
        let address = self.ptr(i)?;
        if address == 0 {
            return Err(self.fault(format!("argument {i} is a null output pointer")));
        }
        memory.write(address, bytes).map_err(|e| self.fault(e))
    }

    /// Store a length through an optional `unsigned long long *`
    fn write_len(
        &self,
        memory: &mut LinearMemory,
        i: usize,
        len: usize,
    ) -> Result<(), SandboxFault> {
        match self.ptr(i)? {
            0 => Ok(()),
            address => memory
                .write(address, &(len as u64).to_le_bytes())
                .map_err(|e| self.fault(e)),
        }
    }
}
