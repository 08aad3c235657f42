//! Admin token check and `.env` key writing.
//!
//! The admin token is hashed with argon2 at boot; only the hash lives in
//! shared state. An unset token disables the admin endpoints.

use argon2::{
    password_hash::{rand_core::OsRng, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use std::fs;
use std::io;
use std::path::Path;

pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";
pub const LLM_KEY_VAR: &str = "LLM_API_KEY";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminCheck {
    /// No admin token configured.
    Disabled,
    Denied,
    Granted,
}

#[derive(Debug, Clone)]
pub struct AdminGuard {
    token_hash: Option<String>,
}

impl AdminGuard {
    pub fn new(token: Option<&str>) -> Result<Self, argon2::password_hash::Error> {
        let token_hash = match token {
            Some(token) => {
                let salt = SaltString::generate(&mut OsRng);
                Some(Argon2::default().hash_password(token.as_bytes(), &salt)?.to_string())
            }
            None => None,
        };
        Ok(AdminGuard { token_hash })
    }

    pub fn disabled() -> Self {
        AdminGuard { token_hash: None }
    }

    pub fn check(&self, presented: Option<&str>) -> AdminCheck {
        let Some(hash) = &self.token_hash else {
            return AdminCheck::Disabled;
        };
        match presented {
            Some(token) if verify_password(token, hash) => AdminCheck::Granted,
            _ => AdminCheck::Denied,
        }
    }
}

fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Set `key=value` in a dotenv file, replacing an existing assignment
/// (also `export key=...`) or appending one. Other lines are kept verbatim.
pub fn write_env_var(path: &Path, key: &str, value: &str) -> io::Result<()> {
    let existing = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e),
    };

    let assignment = format!("{key}={value}");
    let mut replaced = false;
    let mut lines: Vec<String> = existing
        .lines()
        .map(|line| {
            let bare = line.trim_start().trim_start_matches("export ").trim_start();
            if bare.strip_prefix(key).is_some_and(|rest| rest.trim_start().starts_with('=')) {
                replaced = true;
                assignment.clone()
            } else {
                line.to_string()
            }
        })
        .collect();
    if !replaced {
        lines.push(assignment);
    }

    let mut out = lines.join("\n");
    out.push('\n');
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, out)
}
