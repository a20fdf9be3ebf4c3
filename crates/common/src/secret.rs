//! Secret types for protecting sensitive values from accidental logging.
//!
//! This module re-exports types from the [`secrecy`] crate. Lock PINs are
//! carried as [`SecretString`] from the moment they are parsed off the wire
//! until they are digested, so any struct that derives `Debug` around them
//! prints a redacted placeholder instead of the digits.
//!
//! # Example
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct ToggleLock {
//!     session: String,
//!     pin: SecretString,
//! }
//!
//! let req = ToggleLock {
//!     session: "standup".to_string(),
//!     pin: SecretString::from("123456"),
//! };
//!
//! assert!(!format!("{req:?}").contains("123456"));
//! assert_eq!(req.pin.expose_secret(), "123456");
//! ```
//!
//! # Serde Integration
//!
//! With the `serde` feature enabled, secrets can be deserialized from JSON
//! frames directly:
//!
//! ```rust
//! use serde::Deserialize;
//! use common::secret::SecretString;
//!
//! #[derive(Debug, Deserialize)]
//! struct LockFrame {
//!     pin: SecretString,
//! }
//!
//! let frame: LockFrame = serde_json::from_str(r#"{"pin": "654321"}"#).unwrap();
//! assert!(!format!("{frame:?}").contains("654321"));
//! ```

pub use secrecy::{ExposeSecret, SecretString};

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_string_debug_is_redacted() {
        let pin = SecretString::from("987654");
        let debug = format!("{pin:?}");
        assert!(!debug.contains("987654"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_secret_string_expose() {
        let pin = SecretString::from("24681357");
        assert_eq!(pin.expose_secret(), "24681357");
    }
}
