//! The host-facing call surface.

use crate::catalog::{self, lookup};
use crate::contract::CallContract;
use crate::input::Input;
use crate::marshal::Marshaller;
use sluice_core::{EncodedResult, Encoding, Rendered, ResultEncoder, SluiceResult};
use sluice_wasm::{HeapStats, Ready, SandboxBackend, SandboxConfig};
use std::sync::{Arc, Mutex};

/// Sandboxed libsodium primitives with encoded results
///
/// One instance owns one sandbox. Calls take `&mut self`, so access is
/// serialized; wrap in [`Sodium::into_shared`] to share across threads.
///
/// Every primitive method takes an optional encoding name. `None` uses the
/// instance default, which starts as `uint8array`.
#[derive(Debug)]
pub struct Sodium<B: SandboxBackend> {
    marshaller: Marshaller<B>,
    encoder: ResultEncoder,
}

impl<B: SandboxBackend> Sodium<B> {
    /// Wrap an initialized sandbox
    #[must_use]
    pub fn new(ready: Ready<B>) -> Self {
        Self {
            marshaller: Marshaller::new(ready),
            encoder: ResultEncoder::new(),
        }
    }

    /// Wrap an initialized sandbox, applying the release policy from `config`
    #[must_use]
    pub fn with_config(ready: Ready<B>, config: &SandboxConfig) -> Self {
        Self {
            marshaller: Marshaller::new(ready).with_scrub(config.scrub_on_release),
            encoder: ResultEncoder::new(),
        }
    }

    /// Set the default output encoding
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedEncoding` for unknown names; the default is left
    /// unchanged
    pub fn set_encoding(&mut self, name: &str) -> SluiceResult<()> {
        self.encoder.set_encoding(name)
    }

    /// Current default output encoding
    #[must_use]
    pub fn encoding(&self) -> Encoding {
        self.encoder.encoding()
    }

    /// Names of every output encoding
    #[must_use]
    pub fn available_encodings() -> Vec<&'static str> {
        Encoding::available()
    }

    /// Sorted names of every supported call
    #[must_use]
    pub fn list_supported_calls() -> Vec<&'static str> {
        catalog::names()
    }

    /// Contract of a supported call
    ///
    /// # Errors
    ///
    /// Returns `UnknownCall` if the name is not supported
    pub fn contract(name: &str) -> SluiceResult<&'static CallContract> {
        lookup(name)
    }

    /// Allocation counters for the sandbox heap
    #[must_use]
    pub fn heap_stats(&self) -> HeapStats {
        self.marshaller.stats()
    }

    /// Borrow the sandbox
    #[must_use]
    pub fn backend(&self) -> &B {
        self.marshaller.heap().backend()
    }

    /// Take the sandbox back, ending this instance
    #[must_use]
    pub fn into_backend(self) -> B {
        self.marshaller.into_backend()
    }

    /// Whether an earlier sandbox fault has made this instance unusable
    ///
    /// Every call on a poisoned instance re-raises the original fault.
    #[must_use]
    pub fn is_poisoned(&self) -> bool {
        self.marshaller.heap().is_poisoned()
    }

    /// Share this instance behind a mutex
    #[must_use]
    pub fn into_shared(self) -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(self))
    }

    /// Run any supported call by name and render its result
    ///
    /// The call name and encoding are resolved before anything is allocated.
    ///
    /// # Errors
    ///
    /// Returns `UnknownCall`, `UnsupportedEncoding`, any marshalling error,
    /// or `Format` if the result cannot be rendered as requested
    pub fn call(
        &mut self,
        name: &str,
        args: &[Option<Input<'_>>],
        encoding: Option<&str>,
    ) -> SluiceResult<Rendered> {
        let contract = lookup(name)?;
        let encoding = self.encoder.resolve(encoding)?;
        let result = self.marshaller.call(contract, args)?;
        ResultEncoder::encode_with(&result, encoding)
    }

    /// Run any supported call by name without rendering
    ///
    /// # Errors
    ///
    /// Returns `UnknownCall` or any marshalling error
    pub fn call_raw(
        &mut self,
        name: &str,
        args: &[Option<Input<'_>>],
    ) -> SluiceResult<EncodedResult> {
        let contract = lookup(name)?;
        self.marshaller.call(contract, args)
    }

    fn verify(&mut self, name: &str, args: &[Option<Input<'_>>]) -> SluiceResult<()> {
        self.call_raw(name, args).map(|_| ())
    }

    /// Generic (keyed) hash with a 32-byte output
    ///
    /// # Errors
    ///
    /// Returns `LengthMismatch` for keys outside 16 to 64 bytes
    pub fn crypto_generichash<'a>(
        &mut self,
        message: impl Into<Input<'a>>,
        key: Option<Input<'a>>,
        encoding: Option<&str>,
    ) -> SluiceResult<Rendered> {
        self.call("crypto_generichash", &[Some(message.into()), key], encoding)
    }

    /// SHA-256 digest
    ///
    /// # Errors
    ///
    /// Returns an error if the sandbox heap is exhausted
    pub fn crypto_hash_sha256<'a>(
        &mut self,
        message: impl Into<Input<'a>>,
        encoding: Option<&str>,
    ) -> SluiceResult<Rendered> {
        self.call("crypto_hash_sha256", &[Some(message.into())], encoding)
    }

    /// SHA-512 digest
    ///
    /// # Errors
    ///
    /// Returns an error if the sandbox heap is exhausted
    pub fn crypto_hash_sha512<'a>(
        &mut self,
        message: impl Into<Input<'a>>,
        encoding: Option<&str>,
    ) -> SluiceResult<Rendered> {
        self.call("crypto_hash_sha512", &[Some(message.into())], encoding)
    }

    /// Message authentication tag
    ///
    /// # Errors
    ///
    /// Returns `LengthMismatch` unless the key is 32 bytes
    pub fn crypto_auth<'a>(
        &mut self,
        message: impl Into<Input<'a>>,
        key: impl Into<Input<'a>>,
        encoding: Option<&str>,
    ) -> SluiceResult<Rendered> {
        self.call("crypto_auth", &[Some(message.into()), Some(key.into())], encoding)
    }

    /// Check a message authentication tag
    ///
    /// # Errors
    ///
    /// Returns `Primitive` if the tag does not match
    pub fn crypto_auth_verify<'a>(
        &mut self,
        tag: impl Into<Input<'a>>,
        message: impl Into<Input<'a>>,
        key: impl Into<Input<'a>>,
    ) -> SluiceResult<()> {
        self.verify(
            "crypto_auth_verify",
            &[Some(tag.into()), Some(message.into()), Some(key.into())],
        )
    }

    /// Authenticated secret-key encryption; the ciphertext is 16 bytes longer
    ///
    /// # Errors
    ///
    /// Returns `LengthMismatch` for a bad nonce or key
    pub fn crypto_secretbox_easy<'a>(
        &mut self,
        message: impl Into<Input<'a>>,
        nonce: impl Into<Input<'a>>,
        key: impl Into<Input<'a>>,
        encoding: Option<&str>,
    ) -> SluiceResult<Rendered> {
        self.call(
            "crypto_secretbox_easy",
            &[Some(message.into()), Some(nonce.into()), Some(key.into())],
            encoding,
        )
    }

    /// Decrypt and verify a secretbox ciphertext
    ///
    /// # Errors
    ///
    /// Returns `Primitive` if authentication fails
    pub fn crypto_secretbox_open_easy<'a>(
        &mut self,
        ciphertext: impl Into<Input<'a>>,
        nonce: impl Into<Input<'a>>,
        key: impl Into<Input<'a>>,
        encoding: Option<&str>,
    ) -> SluiceResult<Rendered> {
        self.call(
            "crypto_secretbox_open_easy",
            &[Some(ciphertext.into()), Some(nonce.into()), Some(key.into())],
            encoding,
        )
    }

    /// AEAD encryption with optional additional data
    ///
    /// # Errors
    ///
    /// Returns `LengthMismatch` for a bad nonce or key
    pub fn crypto_aead_chacha20poly1305_ietf_encrypt<'a>(
        &mut self,
        message: impl Into<Input<'a>>,
        additional_data: Option<Input<'a>>,
        public_nonce: impl Into<Input<'a>>,
        key: impl Into<Input<'a>>,
        encoding: Option<&str>,
    ) -> SluiceResult<Rendered> {
        self.call(
            "crypto_aead_chacha20poly1305_ietf_encrypt",
            &[Some(message.into()), additional_data, Some(public_nonce.into()), Some(key.into())],
            encoding,
        )
    }

    /// AEAD decryption with optional additional data
    ///
    /// # Errors
    ///
    /// Returns `Primitive` if authentication fails
    pub fn crypto_aead_chacha20poly1305_ietf_decrypt<'a>(
        &mut self,
        ciphertext: impl Into<Input<'a>>,
        additional_data: Option<Input<'a>>,
        public_nonce: impl Into<Input<'a>>,
        key: impl Into<Input<'a>>,
        encoding: Option<&str>,
    ) -> SluiceResult<Rendered> {
        self.call(
            "crypto_aead_chacha20poly1305_ietf_decrypt",
            &[
                Some(ciphertext.into()),
                additional_data,
                Some(public_nonce.into()),
                Some(key.into()),
            ],
            encoding,
        )
    }

    /// Fresh Ed25519 key pair: `publicKey`, `privateKey`, `keyType`
    ///
    /// # Errors
    ///
    /// Returns an error if the sandbox heap is exhausted
    pub fn crypto_sign_keypair(&mut self, encoding: Option<&str>) -> SluiceResult<Rendered> {
        self.call("crypto_sign_keypair", &[], encoding)
    }

    /// Ed25519 key pair derived from a 32-byte seed
    ///
    /// # Errors
    ///
    /// Returns `LengthMismatch` unless the seed is 32 bytes
    pub fn crypto_sign_seed_keypair<'a>(
        &mut self,
        seed: impl Into<Input<'a>>,
        encoding: Option<&str>,
    ) -> SluiceResult<Rendered> {
        self.call("crypto_sign_seed_keypair", &[Some(seed.into())], encoding)
    }

    /// Detached Ed25519 signature
    ///
    /// # Errors
    ///
    /// Returns `LengthMismatch` unless the private key is 64 bytes
    pub fn crypto_sign_detached<'a>(
        &mut self,
        message: impl Into<Input<'a>>,
        private_key: impl Into<Input<'a>>,
        encoding: Option<&str>,
    ) -> SluiceResult<Rendered> {
        self.call(
            "crypto_sign_detached",
            &[Some(message.into()), Some(private_key.into())],
            encoding,
        )
    }

    /// Check a detached Ed25519 signature
    ///
    /// # Errors
    ///
    /// Returns `Primitive` if the signature is invalid
    pub fn crypto_sign_verify_detached<'a>(
        &mut self,
        signature: impl Into<Input<'a>>,
        message: impl Into<Input<'a>>,
        public_key: impl Into<Input<'a>>,
    ) -> SluiceResult<()> {
        self.verify(
            "crypto_sign_verify_detached",
            &[Some(signature.into()), Some(message.into()), Some(public_key.into())],
        )
    }

    /// Fresh X25519 key pair: `publicKey`, `privateKey`, `keyType`
    ///
    /// # Errors
    ///
    /// Returns an error if the sandbox heap is exhausted
    pub fn crypto_box_keypair(&mut self, encoding: Option<&str>) -> SluiceResult<Rendered> {
        self.call("crypto_box_keypair", &[], encoding)
    }

    /// X25519 public key for a private key
    ///
    /// # Errors
    ///
    /// Returns `LengthMismatch` unless the private key is 32 bytes
    pub fn crypto_scalarmult_base<'a>(
        &mut self,
        private_key: impl Into<Input<'a>>,
        encoding: Option<&str>,
    ) -> SluiceResult<Rendered> {
        self.call("crypto_scalarmult_base", &[Some(private_key.into())], encoding)
    }

    /// X25519 shared secret
    ///
    /// # Errors
    ///
    /// Returns `Primitive` if the public key yields an all-zero secret
    pub fn crypto_scalarmult<'a>(
        &mut self,
        private_key: impl Into<Input<'a>>,
        public_key: impl Into<Input<'a>>,
        encoding: Option<&str>,
    ) -> SluiceResult<Rendered> {
        self.call(
            "crypto_scalarmult",
            &[Some(private_key.into()), Some(public_key.into())],
            encoding,
        )
    }

    /// `length` random bytes
    ///
    /// # Errors
    ///
    /// Returns `Allocation` if the sandbox cannot hold `length` bytes
    pub fn randombytes_buf(
        &mut self,
        length: u32,
        encoding: Option<&str>,
    ) -> SluiceResult<Rendered> {
        self.call("randombytes_buf", &[Some(Input::from(length))], encoding)
    }
}
