use aes::Aes128;
use cfb8::cipher::NewCipher;
use cfb8::Cfb8;

pub(crate) use cfb8::cipher::AsyncStreamCipher;

/// AES-128-CFB8, the symmetric cipher both stream directions wrap once
/// a shared secret is installed.
pub(crate) type AesCfb8 = Cfb8<Aes128>;

/// The protocol reuses the shared secret as the IV.
pub(crate) fn new_cipher(key: &[u8; 16]) -> AesCfb8 {
    AesCfb8::new(key.into(), key.into())
}
