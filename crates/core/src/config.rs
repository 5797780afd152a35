use crate::error::LoungeResult;
use serde::Deserialize;

/// Root application configuration. Loaded from an optional TOML file and
/// environment variables with the prefix `LOUNGE__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub accounts: AccountsConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

// ─── Ledger Config ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// Venue label written on regular visit records.
    #[serde(default = "default_venue_name")]
    pub venue_name: String,
    /// Venue label written on achievement reward records.
    #[serde(default = "default_bonus_venue_name")]
    pub bonus_venue_name: String,
    /// Share of an order that may be paid with points, in percent.
    #[serde(default = "default_max_deduction_percent")]
    pub max_deduction_percent: u64,
    /// Offset of the venue's local calendar from UTC. Streak and monthly
    /// achievements are evaluated against local dates.
    #[serde(default = "default_utc_offset_minutes")]
    pub utc_offset_minutes: i32,
}

fn default_venue_name() -> String {
    "Paradise Lounge".to_string()
}
fn default_bonus_venue_name() -> String {
    "Paradise Lounge Bonus".to_string()
}
fn default_max_deduction_percent() -> u64 {
    10
}
fn default_utc_offset_minutes() -> i32 {
    180
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            venue_name: default_venue_name(),
            bonus_venue_name: default_bonus_venue_name(),
            max_deduction_percent: default_max_deduction_percent(),
            utc_offset_minutes: default_utc_offset_minutes(),
        }
    }
}

// ─── Accounts Config ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct AccountsConfig {
    /// The single administrator email trusted by the access policy.
    #[serde(default = "default_admin_email")]
    pub admin_email: String,
    /// Points credited to every new account.
    #[serde(default = "default_welcome_bonus")]
    pub welcome_bonus: u64,
    #[serde(default = "default_code_length")]
    pub code_length: usize,
    #[serde(default = "default_min_password_len")]
    pub min_password_len: usize,
}

fn default_admin_email() -> String {
    "admin@paradise-lounge.local".to_string()
}
fn default_welcome_bonus() -> u64 {
    200
}
fn default_code_length() -> usize {
    6
}
fn default_min_password_len() -> usize {
    8
}

impl Default for AccountsConfig {
    fn default() -> Self {
        Self {
            admin_email: default_admin_email(),
            welcome_bonus: default_welcome_bonus(),
            code_length: default_code_length(),
            min_password_len: default_min_password_len(),
        }
    }
}

// ─── Store Config ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: String,
}

fn default_snapshot_path() -> String {
    "lounge-data.json".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            snapshot_path: default_snapshot_path(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ledger: LedgerConfig::default(),
            accounts: AccountsConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables only.
    pub fn load() -> LoungeResult<Self> {
        Self::load_from(None)
    }

    /// Load configuration from an optional TOML file, then environment
    /// variables. Environment values win.
    pub fn load_from(path: Option<&str>) -> LoungeResult<Self> {
        tracing::debug!(path = ?path, "Loading configuration");
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix("LOUNGE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(config.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.ledger.max_deduction_percent, 10);
        assert_eq!(config.ledger.venue_name, "Paradise Lounge");
        assert_eq!(config.accounts.welcome_bonus, 200);
        assert_eq!(config.accounts.code_length, 6);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = AppConfig::load_from(Some("/nonexistent/lounge-config")).unwrap();
        assert_eq!(config.ledger.bonus_venue_name, "Paradise Lounge Bonus");
        assert_eq!(config.store.snapshot_path, "lounge-data.json");
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let path =
            std::env::temp_dir().join(format!("lounge-config-{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(&path, "[ledger\nmax_deduction_percent = ").unwrap();

        let result = AppConfig::load_from(path.to_str());
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(result, Err(crate::LoungeError::Config(_))));
    }
}
