use anyhow::{bail, Result};
use std::fs;
use std::path::{Path, PathBuf};
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use log::info;
use rand::RngCore;

use crate::mail_reader::imap::Credentials;

const PASSWORD_FILE: &str = ".encrypted_password";
const KEY_FILE: &str = ".encryption_key";
const NONCE_LEN: usize = 12;
pub const PASSWORD_ENV: &str = "IMAP_PASSWORD";

/// Where the encrypted password and its key live.
#[derive(Debug, Clone)]
pub struct SecretStore {
    key_path: PathBuf,
    password_path: PathBuf,
}

impl Default for SecretStore {
    fn default() -> Self {
        SecretStore::in_dir(Path::new("."))
    }
}

impl SecretStore {
    pub fn in_dir(dir: &Path) -> Self {
        SecretStore {
            key_path: dir.join(KEY_FILE),
            password_path: dir.join(PASSWORD_FILE),
        }
    }

    fn cipher(&self) -> Result<Aes256Gcm> {
        let key = if self.key_path.exists() {
            // Read existing key
            let key_bytes = fs::read(&self.key_path)?;
            Aes256Gcm::new_from_slice(&key_bytes)
                .map_err(|e| anyhow::anyhow!("Failed to create cipher from key: {}", e))?
        } else {
            // Generate new key
            let mut key_bytes = [0u8; 32];
            rand::thread_rng().fill_bytes(&mut key_bytes);
            fs::write(&self.key_path, key_bytes)?;
            Aes256Gcm::new_from_slice(&key_bytes)
                .map_err(|e| anyhow::anyhow!("Failed to create cipher from new key: {}", e))?
        };
        Ok(key)
    }

    pub fn encrypt_password(&self, password: &str) -> Result<String> {
        let cipher = self.cipher()?;
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher.encrypt(nonce, password.as_bytes())
            .map_err(|e| anyhow::anyhow!("Failed to encrypt password: {}", e))?;

        let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(&combined))
    }

    pub fn decrypt_password(&self, encrypted: &str) -> Result<String> {
        let cipher = self.cipher()?;
        let combined = BASE64.decode(encrypted.trim())
            .map_err(|e| anyhow::anyhow!("Failed to decode base64: {}", e))?;
        if combined.len() <= NONCE_LEN {
            bail!("Stored password is truncated");
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        let plaintext = cipher.decrypt(nonce, ciphertext)
            .map_err(|e| anyhow::anyhow!("Failed to decrypt password: {}", e))?;

        String::from_utf8(plaintext)
            .map_err(|e| anyhow::anyhow!("Failed to convert decrypted bytes to string: {}", e))
    }

    pub fn store_password(&self, password: &str) -> Result<()> {
        let encrypted = self.encrypt_password(password)?;
        fs::write(&self.password_path, encrypted)?;
        info!("Password stored in {}", self.password_path.display());
        Ok(())
    }

    pub fn stored_password(&self) -> Result<Option<String>> {
        if !self.password_path.exists() {
            return Ok(None);
        }
        let encrypted = fs::read_to_string(&self.password_path)?;
        self.decrypt_password(&encrypted).map(Some)
    }
}

/// Resolves the password for `login`: the environment first, then the
/// encrypted store, then an interactive prompt whose answer gets stored.
pub fn get_credentials(login: &str, env_password: Option<String>, store: &SecretStore) -> Result<Credentials> {
    let password = match env_password.filter(|password| !password.is_empty()) {
        Some(password) => password,
        None => match store.stored_password()? {
            Some(password) => password,
            None => {
                let password = prompt_password(login)?;
                store.store_password(&password)?;
                password
            }
        },
    };
    Ok(Credentials {
        username: login.to_string(),
        password,
    })
}

pub fn prompt_password(login: &str) -> Result<String> {
    let password = rpassword::prompt_password(format!("Password for {}: ", login))?;
    if password.is_empty() {
        bail!("Empty password");
    }
    Ok(password)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_password_survives_a_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SecretStore::in_dir(dir.path());

        assert!(store.stored_password().unwrap().is_none());
        store.store_password("hunter2").unwrap();

        let on_disk = fs::read_to_string(dir.path().join(PASSWORD_FILE)).unwrap();
        assert!(!on_disk.contains("hunter2"));
        assert_eq!(store.stored_password().unwrap().as_deref(), Some("hunter2"));
    }

    #[test]
    fn environment_password_wins() {
        let dir = tempfile::tempdir().unwrap();
        let store = SecretStore::in_dir(dir.path());
        store.store_password("from-store").unwrap();

        let credentials = get_credentials("me@example.com", Some("from-env".to_string()), &store).unwrap();
        assert_eq!(credentials.username, "me@example.com");
        assert_eq!(credentials.password, "from-env");

        let credentials = get_credentials("me@example.com", Some(String::new()), &store).unwrap();
        assert_eq!(credentials.password, "from-store");
    }

    #[test]
    fn tampered_password_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = SecretStore::in_dir(dir.path());
        let encrypted = store.encrypt_password("secret").unwrap();

        let mut bytes = BASE64.decode(&encrypted).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        assert!(store.decrypt_password(&BASE64.encode(&bytes)).is_err());
        assert!(store.decrypt_password("c2hvcnQ=").is_err());
    }
}
