/// Cryptographic primitives for the derivation pipeline.
///
/// - [`kdf`]: scrypt key stretch (master key)
/// - [`hash`]: SHA-256, HMAC-SHA256, constant-time comparison
/// - [`cipher`]: AES-256-CTR for stored site secrets
/// - [`sensitive`]: zero-on-drop buffers for key material
pub mod cipher;
pub mod hash;
pub mod kdf;
pub mod sensitive;
