//! Registration workflow configuration

use anyhow::Result;

/// Tunables for the verification-code registration workflow
#[derive(Debug, Clone)]
pub struct RegistrationConfig {
    /// Verification window for a pending registration, in seconds
    pub code_ttl: u64,
    /// Shared cap: sends per email per hour, and verify attempts per code
    pub max_attempts: u32,
    /// Minimum delay between consecutive resends for one email, in seconds
    pub resend_cooldown: i64,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            code_ttl: 600,
            max_attempts: 5,
            resend_cooldown: 60,
        }
    }
}

impl RegistrationConfig {
    /// Create a new RegistrationConfig from environment variables
    ///
    /// # Environment Variables
    /// - `VERIFICATION_CODE_TTL`: verification window in seconds (default: 600)
    /// - `VERIFICATION_CODE_MAX_ATTEMPTS`: send/verify cap (default: 5)
    /// - `VERIFICATION_CODE_RESEND_COOLDOWN`: resend cooldown in seconds (default: 60)
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let code_ttl = std::env::var("VERIFICATION_CODE_TTL")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.code_ttl);

        let max_attempts = std::env::var("VERIFICATION_CODE_MAX_ATTEMPTS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.max_attempts);

        let resend_cooldown = std::env::var("VERIFICATION_CODE_RESEND_COOLDOWN")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.resend_cooldown);

        Ok(Self {
            code_ttl,
            max_attempts,
            resend_cooldown,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_registration_config_defaults() {
        unsafe {
            std::env::remove_var("VERIFICATION_CODE_TTL");
            std::env::remove_var("VERIFICATION_CODE_MAX_ATTEMPTS");
            std::env::remove_var("VERIFICATION_CODE_RESEND_COOLDOWN");
        }

        let config = RegistrationConfig::from_env().unwrap();
        assert_eq!(config.code_ttl, 600);
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.resend_cooldown, 60);
    }

    #[test]
    #[serial]
    fn test_registration_config_from_env() {
        unsafe {
            std::env::set_var("VERIFICATION_CODE_TTL", "300");
            std::env::set_var("VERIFICATION_CODE_MAX_ATTEMPTS", "3");
            std::env::set_var("VERIFICATION_CODE_RESEND_COOLDOWN", "30");
        }

        let config = RegistrationConfig::from_env().unwrap();
        assert_eq!(config.code_ttl, 300);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.resend_cooldown, 30);

        unsafe {
            std::env::remove_var("VERIFICATION_CODE_TTL");
            std::env::remove_var("VERIFICATION_CODE_MAX_ATTEMPTS");
            std::env::remove_var("VERIFICATION_CODE_RESEND_COOLDOWN");
        }
    }
}
