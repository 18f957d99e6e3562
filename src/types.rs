use crate::error::{Error, Result};
use std::borrow::Borrow;
use std::fmt;

const MAX_EMAIL_LEN: usize = 254;

fn validate_name(value: &str, kind: &str, max_len: usize) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::Validation(format!("{kind} must not be empty")));
    }
    if trimmed.chars().count() > max_len {
        return Err(Error::Validation(format!(
            "{kind} length must be <= {max_len}"
        )));
    }
    if trimmed.chars().any(char::is_control) {
        return Err(Error::Validation(format!(
            "{kind} contains control characters"
        )));
    }
    Ok(trimmed.to_string())
}

macro_rules! define_id_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        #[cfg_attr(feature = "serde", serde(transparent))]
        pub struct $name(u64);

        impl $name {
            /// Wraps a raw identifier assigned by a store.
            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            /// Returns the raw identifier.
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }
    };
}

macro_rules! define_name_type {
    ($(#[$doc:meta])* $name:ident, $kind:expr, $max_len:expr) => {
        $(#[$doc])*
        #[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        #[cfg_attr(feature = "serde", serde(transparent))]
        pub struct $name(String);

        impl $name {
            /// Maximum length in characters.
            pub const MAX_LEN: usize = $max_len;

            /// Creates a validated name. Surrounding whitespace is trimmed;
            /// case is preserved.
            pub fn new(value: impl AsRef<str>) -> Result<Self> {
                validate_name(value.as_ref(), $kind, $max_len).map(Self)
            }

            /// Creates a name from a trusted string without validation.
            pub fn from_string(value: String) -> Self {
                Self(value)
            }

            /// Returns the underlying string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<&str> for $name {
            type Error = Error;

            fn try_from(value: &str) -> Result<Self> {
                Self::new(value)
            }
        }
    };
}

define_id_type!(
    /// Principal identifier.
    PrincipalId
);
define_id_type!(
    /// Resource identifier.
    ResourceId
);
define_id_type!(
    /// Action identifier.
    ActionId
);
define_id_type!(
    /// Permission identifier.
    PermissionId
);
define_id_type!(
    /// Role identifier.
    RoleId
);

define_name_type!(
    /// Resource name, e.g. `products`.
    ResourceName,
    "resource name",
    100
);
define_name_type!(
    /// Action name, e.g. `read`.
    ActionName,
    "action name",
    50
);
define_name_type!(
    /// Role name, e.g. `Manager`.
    RoleName,
    "role name",
    100
);

/// Principal email address.
///
/// The domain part is lowercased on construction; the local part is kept
/// as given.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Email(String);

impl Email {
    /// Parses and normalizes an email address.
    pub fn new(value: impl AsRef<str>) -> Result<Self> {
        let trimmed = value.as_ref().trim();
        if trimmed.is_empty() {
            return Err(Error::Validation("email must not be empty".to_string()));
        }
        if trimmed.len() > MAX_EMAIL_LEN {
            return Err(Error::Validation(format!(
                "email length must be <= {MAX_EMAIL_LEN}"
            )));
        }
        let (local, domain) = trimmed
            .rsplit_once('@')
            .ok_or_else(|| Error::Validation("email must contain '@'".to_string()))?;
        if local.is_empty() || domain.is_empty() {
            return Err(Error::Validation(
                "email must not have empty segments".to_string(),
            ));
        }
        if trimmed.chars().any(|ch| ch.is_whitespace() || ch.is_control()) {
            return Err(Error::Validation(
                "email contains invalid characters".to_string(),
            ));
        }
        Ok(Self(format!("{local}@{}", domain.to_ascii_lowercase())))
    }

    /// Returns the underlying string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Email {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for Email {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}
