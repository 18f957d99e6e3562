use crate::error::{Error, Result};
use std::str::FromStr;

/// Minimum random bytes in a token value.
pub const MIN_TOKEN_BYTES: usize = 48;

/// Maximum random bytes in a token value.
pub const MAX_TOKEN_BYTES: usize = 512;

const ENV_TOKEN_TTL_HOURS: &str = "RBAC_TOKEN_TTL_HOURS";
const ENV_ADMIN_ROLE: &str = "RBAC_ADMIN_ROLE";
const ENV_MAX_CONFLICT_RETRIES: &str = "RBAC_MAX_CONFLICT_RETRIES";
const ENV_TOKEN_BYTES: &str = "RBAC_TOKEN_BYTES";

/// Runtime settings shared by the services.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Config {
    /// Lifetime of tokens issued at login. Must be positive.
    pub token_ttl_hours: i64,
    /// Role whose holders pass [`Engine::is_admin`](crate::Engine::is_admin).
    pub admin_role_name: String,
    /// Re-reads after a unique conflict during get-or-create.
    pub max_conflict_retries: u32,
    /// Random bytes per token value, kept within [`MIN_TOKEN_BYTES`] and
    /// [`MAX_TOKEN_BYTES`].
    pub token_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            token_ttl_hours: 24,
            admin_role_name: "Admin".to_string(),
            max_conflict_retries: 3,
            token_bytes: MIN_TOKEN_BYTES,
        }
    }
}

impl Config {
    /// Reads overrides from `RBAC_*` environment variables on top of defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(value) = lookup(ENV_TOKEN_TTL_HOURS) {
            let hours: i64 = parse_value(ENV_TOKEN_TTL_HOURS, &value)?;
            if hours <= 0 {
                return Err(Error::Validation(format!(
                    "{ENV_TOKEN_TTL_HOURS} must be positive, got {hours}"
                )));
            }
            config.token_ttl_hours = hours;
        }
        if let Some(value) = lookup(ENV_ADMIN_ROLE) {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                return Err(Error::Validation(format!(
                    "{ENV_ADMIN_ROLE} must not be empty"
                )));
            }
            config.admin_role_name = trimmed.to_string();
        }
        if let Some(value) = lookup(ENV_MAX_CONFLICT_RETRIES) {
            config.max_conflict_retries = parse_value(ENV_MAX_CONFLICT_RETRIES, &value)?;
        }
        if let Some(value) = lookup(ENV_TOKEN_BYTES) {
            let bytes: usize = parse_value(ENV_TOKEN_BYTES, &value)?;
            if bytes > MAX_TOKEN_BYTES {
                return Err(Error::Validation(format!(
                    "{ENV_TOKEN_BYTES} must not exceed {MAX_TOKEN_BYTES}, got {bytes}"
                )));
            }
            config.token_bytes = bytes;
        }
        Ok(config)
    }

    /// Sets the token lifetime.
    pub fn token_ttl_hours(mut self, hours: i64) -> Self {
        self.token_ttl_hours = hours;
        self
    }

    /// Sets the admin role name.
    pub fn admin_role_name(mut self, name: impl Into<String>) -> Self {
        self.admin_role_name = name.into();
        self
    }

    /// Sets the get-or-create retry budget.
    pub fn max_conflict_retries(mut self, retries: u32) -> Self {
        self.max_conflict_retries = retries;
        self
    }

    /// Sets the random bytes per token.
    pub fn token_bytes(mut self, bytes: usize) -> Self {
        self.token_bytes = bytes;
        self
    }

    pub(crate) fn effective_token_bytes(&self) -> usize {
        self.token_bytes.clamp(MIN_TOKEN_BYTES, MAX_TOKEN_BYTES)
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Validation(format!("{key} has malformed value {value:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_without_overrides() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.admin_role_name, "Admin");
        assert_eq!(config.token_ttl_hours, 24);
    }

    #[test]
    fn overrides_are_parsed() {
        let config = Config::from_lookup(lookup(&[
            ("RBAC_TOKEN_TTL_HOURS", "2"),
            ("RBAC_ADMIN_ROLE", " Root "),
            ("RBAC_MAX_CONFLICT_RETRIES", "5"),
            ("RBAC_TOKEN_BYTES", "64"),
        ]))
        .unwrap();
        assert_eq!(config.token_ttl_hours, 2);
        assert_eq!(config.admin_role_name, "Root");
        assert_eq!(config.max_conflict_retries, 5);
        assert_eq!(config.token_bytes, 64);
    }

    #[test]
    fn malformed_values_are_rejected() {
        let err = Config::from_lookup(lookup(&[("RBAC_TOKEN_TTL_HOURS", "soon")]))
            .expect_err("must reject");
        assert!(err.to_string().contains("RBAC_TOKEN_TTL_HOURS"));
    }

    #[test]
    fn non_positive_ttl_is_rejected() {
        for hours in ["0", "-3"] {
            let err = Config::from_lookup(lookup(&[("RBAC_TOKEN_TTL_HOURS", hours)]))
                .expect_err("must reject");
            assert!(matches!(err, Error::Validation(_)));
        }
    }

    #[test]
    fn token_bytes_above_ceiling_are_rejected() {
        let huge = usize::MAX.to_string();
        let err = Config::from_lookup(lookup(&[("RBAC_TOKEN_BYTES", huge.as_str())]))
            .expect_err("must reject");
        assert!(matches!(err, Error::Validation(_)));
        assert!(err.to_string().contains("RBAC_TOKEN_BYTES"));

        let max = MAX_TOKEN_BYTES.to_string();
        let config = Config::from_lookup(lookup(&[("RBAC_TOKEN_BYTES", max.as_str())])).unwrap();
        assert_eq!(config.effective_token_bytes(), MAX_TOKEN_BYTES);
    }

    #[test]
    fn token_bytes_stay_within_bounds() {
        assert_eq!(
            Config::default().token_bytes(8).effective_token_bytes(),
            MIN_TOKEN_BYTES
        );
        assert_eq!(
            Config::default().token_bytes(usize::MAX).effective_token_bytes(),
            MAX_TOKEN_BYTES
        );
    }
}
