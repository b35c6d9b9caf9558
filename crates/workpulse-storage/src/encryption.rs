// Envelope encryption for integration credentials.
// AES-256-GCM with per-value DEKs wrapped by versioned KEKs, so keys can
// rotate without re-encrypting every stored credential.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

const NONCE_SIZE: usize = 12;
const KEY_SIZE: usize = 32;
const DEK_SIZE: usize = 32;
const PAYLOAD_VERSION: u8 = 1;
const ALGORITHM: &str = "AES-256-GCM";

/// Provider credentials in plaintext form; only ever materialized per request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationCredentials {
    pub username: String,
    pub api_token: String,
}

/// Encrypted payload stored in the integrations.credentials column
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedPayload {
    pub version: u8,
    pub alg: String,
    /// Key id of the KEK that wrapped the DEK
    pub key_id: String,
    pub dek_wrapped: String,
    pub nonce: String,
    pub ciphertext: String,
}

#[derive(Clone)]
struct VersionedKey {
    id: String,
    cipher: Aes256Gcm,
}

/// Encryption service supporting key rotation. Thread-safe, cheap to clone.
#[derive(Clone)]
pub struct EncryptionService {
    primary_key: Arc<VersionedKey>,
    keys: Arc<HashMap<String, Aes256Gcm>>,
}

impl EncryptionService {
    /// Create from versioned key strings in format "key_id:base64_key".
    /// The primary key encrypts; all keys decrypt.
    pub fn new(primary_key: &str, previous_keys: &[&str]) -> Result<Self> {
        let (primary_id, primary_cipher) = Self::parse_versioned_key(primary_key)?;

        let mut keys = HashMap::new();
        keys.insert(primary_id.clone(), primary_cipher.clone());
        for key_str in previous_keys {
            let (id, cipher) = Self::parse_versioned_key(key_str)?;
            if keys.contains_key(&id) {
                anyhow::bail!("Duplicate key ID: {}", id);
            }
            keys.insert(id, cipher);
        }

        Ok(Self {
            primary_key: Arc::new(VersionedKey {
                id: primary_id,
                cipher: primary_cipher,
            }),
            keys: Arc::new(keys),
        })
    }

    /// Create from SECRETS_ENCRYPTION_KEY / SECRETS_ENCRYPTION_KEY_PREVIOUS
    pub fn from_env() -> Result<Self> {
        let primary = std::env::var("SECRETS_ENCRYPTION_KEY")
            .context("SECRETS_ENCRYPTION_KEY environment variable not set")?;
        let previous: Vec<String> = std::env::var("SECRETS_ENCRYPTION_KEY_PREVIOUS")
            .ok()
            .into_iter()
            .collect();
        let previous_refs: Vec<&str> = previous.iter().map(|s| s.as_str()).collect();
        Self::new(&primary, &previous_refs)
    }

    fn parse_versioned_key(key_str: &str) -> Result<(String, Aes256Gcm)> {
        let parts: Vec<&str> = key_str.splitn(2, ':').collect();
        if parts.len() != 2 {
            anyhow::bail!("Invalid key format, expected 'key_id:base64_key'");
        }
        let key_id = parts[0].to_string();
        let key_bytes = BASE64
            .decode(parts[1])
            .context("Failed to decode key from base64")?;
        if key_bytes.len() != KEY_SIZE {
            anyhow::bail!(
                "Key must be {} bytes, got {} for key_id '{}'",
                KEY_SIZE,
                key_bytes.len(),
                key_id
            );
        }
        let cipher = Aes256Gcm::new_from_slice(&key_bytes)
            .map_err(|e| anyhow::anyhow!("Failed to create cipher: {}", e))?;
        Ok((key_id, cipher))
    }

    /// Encrypt credentials into a storable payload
    pub fn encrypt_credentials(&self, credentials: &IntegrationCredentials) -> Result<EncryptedPayload> {
        let plaintext = serde_json::to_vec(credentials)?;

        // Fresh DEK per value
        let mut dek_bytes = [0u8; DEK_SIZE];
        rand::thread_rng().fill_bytes(&mut dek_bytes);
        let dek = Aes256Gcm::new_from_slice(&dek_bytes)
            .map_err(|e| anyhow::anyhow!("Failed to create DEK cipher: {}", e))?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = dek
            .encrypt(nonce, plaintext.as_ref())
            .map_err(|e| anyhow::anyhow!("Encryption failed: {}", e))?;

        // Wrap the DEK with the primary KEK (zero nonce is safe: each DEK is
        // wrapped exactly once)
        let wrap_nonce = Nonce::from_slice(&[0u8; NONCE_SIZE]);
        let dek_wrapped = self
            .primary_key
            .cipher
            .encrypt(wrap_nonce, dek_bytes.as_ref())
            .map_err(|e| anyhow::anyhow!("DEK wrapping failed: {}", e))?;

        Ok(EncryptedPayload {
            version: PAYLOAD_VERSION,
            alg: ALGORITHM.to_string(),
            key_id: self.primary_key.id.clone(),
            dek_wrapped: BASE64.encode(dek_wrapped),
            nonce: BASE64.encode(nonce_bytes),
            ciphertext: BASE64.encode(ciphertext),
        })
    }

    /// Decrypt a stored payload back into credentials
    pub fn decrypt_credentials(&self, payload: &EncryptedPayload) -> Result<IntegrationCredentials> {
        let kek = self
            .keys
            .get(&payload.key_id)
            .with_context(|| format!("No key available for key_id '{}'", payload.key_id))?;

        let dek_wrapped = BASE64
            .decode(&payload.dek_wrapped)
            .context("Failed to decode wrapped DEK")?;
        let wrap_nonce = Nonce::from_slice(&[0u8; NONCE_SIZE]);
        let dek_bytes = kek
            .decrypt(wrap_nonce, dek_wrapped.as_ref())
            .map_err(|e| anyhow::anyhow!("DEK unwrapping failed: {}", e))?;
        let dek = Aes256Gcm::new_from_slice(&dek_bytes)
            .map_err(|e| anyhow::anyhow!("Failed to create DEK cipher: {}", e))?;

        let nonce_bytes = BASE64.decode(&payload.nonce).context("Failed to decode nonce")?;
        let ciphertext = BASE64
            .decode(&payload.ciphertext)
            .context("Failed to decode ciphertext")?;

        let plaintext = dek
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
            .map_err(|e| anyhow::anyhow!("Decryption failed: {}", e))?;

        Ok(serde_json::from_slice(&plaintext)?)
    }

    /// Decrypt straight from the JSONB column value
    pub fn decrypt_column(&self, column: &serde_json::Value) -> Result<IntegrationCredentials> {
        let payload: EncryptedPayload = serde_json::from_value(column.clone())
            .context("integrations.credentials is not a valid encrypted payload")?;
        self.decrypt_credentials(&payload)
    }
}

/// Generate a fresh KEK in "key_id:base64_key" form
pub fn generate_encryption_key(key_id: &str) -> String {
    let mut key_bytes = [0u8; KEY_SIZE];
    rand::thread_rng().fill_bytes(&mut key_bytes);
    format!("{}:{}", key_id, BASE64.encode(key_bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> IntegrationCredentials {
        IntegrationCredentials {
            username: "etl@example.com".to_string(),
            api_token: "token-123".to_string(),
        }
    }

    #[test]
    fn test_encrypt_decrypt_round_trip() {
        let service = EncryptionService::new(&generate_encryption_key("v1"), &[]).unwrap();
        let payload = service.encrypt_credentials(&credentials()).unwrap();
        assert_eq!(payload.key_id, "v1");
        assert_eq!(payload.alg, ALGORITHM);

        let decrypted = service.decrypt_credentials(&payload).unwrap();
        assert_eq!(decrypted.username, "etl@example.com");
        assert_eq!(decrypted.api_token, "token-123");
    }

    #[test]
    fn test_rotation_decrypts_with_previous_key() {
        let old_key = generate_encryption_key("v1");
        let old_service = EncryptionService::new(&old_key, &[]).unwrap();
        let payload = old_service.encrypt_credentials(&credentials()).unwrap();

        let new_service =
            EncryptionService::new(&generate_encryption_key("v2"), &[old_key.as_str()]).unwrap();
        let decrypted = new_service.decrypt_credentials(&payload).unwrap();
        assert_eq!(decrypted.api_token, "token-123");
    }

    #[test]
    fn test_unknown_key_id_fails() {
        let service_a = EncryptionService::new(&generate_encryption_key("a"), &[]).unwrap();
        let service_b = EncryptionService::new(&generate_encryption_key("b"), &[]).unwrap();
        let payload = service_a.encrypt_credentials(&credentials()).unwrap();
        assert!(service_b.decrypt_credentials(&payload).is_err());
    }

    #[test]
    fn test_invalid_key_format_rejected() {
        assert!(EncryptionService::new("not-a-versioned-key", &[]).is_err());
        assert!(EncryptionService::new("v1:short", &[]).is_err());
    }
}
