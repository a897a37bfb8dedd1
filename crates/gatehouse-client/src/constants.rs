//! Client configuration constants.
//!
//! Centralizes hardcoded values for easier configuration and documentation.

use gatehouse_types::RecordKind;

/// Collection holding personnel records.
pub const PERSONNEL_COLLECTION: &str = RecordKind::Personnel.collection();

/// Collection holding visitor records.
pub const VISITORS_COLLECTION: &str = RecordKind::Visitor.collection();

/// Collection holding user profiles, keyed by principal uid.
pub const USERS_COLLECTION: &str = RecordKind::UserProfile.collection();

/// Config file name inside the platform config directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Directory name under the platform config directory.
pub const CONFIG_DIR_NAME: &str = "gatehouse";

/// Environment variable carrying the credential key.
pub const ENV_API_KEY: &str = "GATEHOUSE_API_KEY";
pub const ENV_AUTH_DOMAIN: &str = "GATEHOUSE_AUTH_DOMAIN";
pub const ENV_PROJECT_ID: &str = "GATEHOUSE_PROJECT_ID";
pub const ENV_APP_ID: &str = "GATEHOUSE_APP_ID";
pub const ENV_FORCE_LONG_POLLING: &str = "GATEHOUSE_FORCE_LONG_POLLING";

/// Minimum password length accepted for new accounts.
pub const MIN_PASSWORD_LEN: usize = 6;
