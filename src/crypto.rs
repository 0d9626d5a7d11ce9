use std::time::{SystemTime, UNIX_EPOCH};

use aes::cipher::{block_padding::Pkcs7, BlockEncryptMut, KeyIvInit};
use anyhow::{anyhow, bail, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use rand::Rng;
use rsa::{pkcs1::DecodeRsaPublicKey, pkcs8::DecodePublicKey, Pkcs1v15Encrypt, RsaPublicKey};
use serde::Serialize;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;

const KEY_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const KEY_LEN: usize = 32;
const IV_LEN: usize = 16;

// the sign-in endpoint only accepts the desktop platform id
const PLATFORM: u32 = 64;

/// A random lowercase alphanumeric prefix followed by the 10 digit unix
/// timestamp, 32 characters in total.
pub fn aes_key(rng: &mut impl Rng, timestamp: u64) -> String {
    let stamp = timestamp.to_string();
    let mut key: String = (0..KEY_LEN.saturating_sub(stamp.len()))
        .map(|_| KEY_CHARS[rng.gen_range(0..KEY_CHARS.len())] as char)
        .collect();
    key.push_str(&stamp);
    key
}

/// AES-256-CBC with PKCS#7 padding. The key is zero padded to 32 bytes and
/// its first 16 bytes double as the IV.
pub fn aes_encrypt(plain: &str, key: &str) -> Result<String> {
    let bytes = key.as_bytes();
    if bytes.len() < IV_LEN || bytes.len() > KEY_LEN {
        bail!("AES key must be {IV_LEN}..={KEY_LEN} bytes, got {}", bytes.len());
    }
    let mut padded = [0u8; KEY_LEN];
    padded[..bytes.len()].copy_from_slice(bytes);

    let cipher = Aes256CbcEnc::new_from_slices(&padded, &bytes[..IV_LEN])
        .map_err(|_| anyhow!("invalid AES key length"))?;
    let encrypted = cipher.encrypt_padded_vec_mut::<Pkcs7>(plain.as_bytes());
    Ok(STANDARD.encode(encrypted))
}

/// RSA PKCS#1 v1.5 encryption with a PEM public key, either SPKI
/// (`BEGIN PUBLIC KEY`) or PKCS#1 (`BEGIN RSA PUBLIC KEY`).
pub fn rsa_encrypt(plain: &str, pem: &str) -> Result<String> {
    let pem = pem.trim();
    let key = RsaPublicKey::from_public_key_pem(pem)
        .ok()
        .or_else(|| RsaPublicKey::from_pkcs1_pem(pem).ok())
        .context("invalid RSA public key")?;
    let encrypted = key.encrypt(&mut rand::thread_rng(), Pkcs1v15Encrypt, plain.as_bytes())?;
    Ok(STANDARD.encode(encrypted))
}

#[derive(Serialize)]
struct Identity {
    user_id: u64,
    platform: u32,
}

/// The encrypted login material for one sign-in request.
#[derive(Debug)]
pub struct CryptoData {
    /// AES encrypted identity, sent in the request body.
    pub extra: String,
    /// RSA encrypted AES key, sent as the `token` header.
    pub token: String,
    pub aes_key: String,
}

impl CryptoData {
    /// `public_key` is the base64 encoded PEM handed out by the key endpoint.
    pub fn new(public_key: &str, user_id: u64) -> Result<Self> {
        let pem = String::from_utf8(
            STANDARD
                .decode(public_key.trim())
                .context("public key is not base64")?,
        )
        .context("public key is not utf-8")?;

        let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
        let aes_key = aes_key(&mut rand::thread_rng(), now);
        let plain = serde_json::to_string(&Identity {
            user_id,
            platform: PLATFORM,
        })?;

        let extra = aes_encrypt(&plain, &aes_key)?;
        let token = rsa_encrypt(&aes_key, &pem)?;

        let data = Self {
            extra,
            token,
            aes_key,
        };
        log::debug!("encrypted identity {plain}");
        Ok(data)
    }
}
