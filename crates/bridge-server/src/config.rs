use std::path::PathBuf;

use thiserror::Error;

use bridge_gateway::BridgeConfig;
use bridge_irc::IrcConfig;

/// Admin tokens that MUST NOT be used.
const PLACEHOLDER_ADMIN_TOKENS: &[&str] = &["xxx"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("{key} has an invalid value '{value}'")]
    Invalid { key: &'static str, value: String },
    #[error("ADMIN_TOKEN is still a placeholder, set a real secret")]
    PlaceholderAdminToken,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub history_path: PathBuf,
    pub backlog_size: usize,
    pub irc_server: String,
    pub irc_network: String,
    pub irc_channel: String,
    pub irc_nick: String,
    pub irc_login: Option<(String, String)>,
    pub dry_irc: bool,
    pub bridge: BridgeConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let admin_token = required("ADMIN_TOKEN")?;
        if PLACEHOLDER_ADMIN_TOKENS.contains(&admin_token.as_str()) {
            return Err(ConfigError::PlaceholderAdminToken);
        }

        let irc_login = match (get("IRC_LOGIN_CHANNEL"), get("IRC_LOGIN_MSG")) {
            (Some(target), Some(message)) => Some((target, message)),
            _ => None,
        };

        Ok(Self {
            host: get("BRIDGE_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse(&get, "BRIDGE_PORT", 6969)?,
            db_path: get("BRIDGE_DB_PATH").unwrap_or_else(|| "bridge.db".into()).into(),
            history_path: get("BRIDGE_HISTORY_PATH")
                .unwrap_or_else(|| "message_log.json".into())
                .into(),
            backlog_size: parse(&get, "BACKLOG_SIZE", 30)?,
            irc_server: required("IRC_SERVER")?,
            irc_network: get("IRC_NETWORK").unwrap_or_else(|| "quakenet".into()),
            irc_channel: required("IRC_CHANNEL")?,
            irc_nick: get("IRC_NICK").unwrap_or_else(|| "ws-client".into()),
            irc_login,
            dry_irc: get("DRY_IRC").is_some_and(|v| is_true(&v)),
            bridge: BridgeConfig {
                accounts_password: required("ACCOUNTS_PASSWORD")?,
                admin_token,
                sign_up_token: get("SIGN_UP_TOKEN"),
                require_accounts: get("ACCOUNTS").is_some_and(|v| is_true(&v)),
                default_write_access: get("DEFAULT_WRITE_ACCESS").is_none_or(|v| is_true(&v)),
            },
        })
    }

    pub fn irc(&self, rooms: Vec<String>) -> IrcConfig {
        IrcConfig {
            server: self.irc_server.clone(),
            network: self.irc_network.clone(),
            nick: self.irc_nick.clone(),
            rooms,
            login: self.irc_login.clone(),
        }
    }
}

fn parse<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match get(key) {
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}

/// `1`, `true`, `yes` or `on`, any case.
fn is_true(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    const REQUIRED: &[(&str, &str)] = &[
        ("ADMIN_TOKEN", "s3cret"),
        ("IRC_SERVER", "irc.quakenet.org:6667"),
        ("IRC_CHANNEL", "#bridge"),
        ("ACCOUNTS_PASSWORD", "shared"),
    ];

    #[test]
    fn defaults() {
        let config = load(REQUIRED).unwrap();
        assert_eq!(config.port, 6969);
        assert_eq!(config.backlog_size, 30);
        assert_eq!(config.irc_network, "quakenet");
        assert_eq!(config.irc_nick, "ws-client");
        assert_eq!(config.history_path, PathBuf::from("message_log.json"));
        assert!(!config.dry_irc);
        assert!(!config.bridge.require_accounts);
        assert!(config.bridge.default_write_access);
        assert!(config.irc_login.is_none());
    }

    #[test]
    fn missing_required_values() {
        assert_eq!(load(&REQUIRED[1..]).unwrap_err(), ConfigError::Missing("ADMIN_TOKEN"));

        let mut vars = REQUIRED.to_vec();
        vars.retain(|(k, _)| *k != "IRC_CHANNEL");
        vars.push(("IRC_CHANNEL", ""));
        assert_eq!(load(&vars).unwrap_err(), ConfigError::Missing("IRC_CHANNEL"));
    }

    #[test]
    fn placeholder_admin_token_is_rejected() {
        let mut vars = REQUIRED.to_vec();
        vars[0] = ("ADMIN_TOKEN", "xxx");
        assert_eq!(load(&vars).unwrap_err(), ConfigError::PlaceholderAdminToken);
    }

    #[test]
    fn flags_and_numbers() {
        let mut vars = REQUIRED.to_vec();
        vars.extend([
            ("ACCOUNTS", "Yes"),
            ("DRY_IRC", "1"),
            ("DEFAULT_WRITE_ACCESS", "off"),
            ("BACKLOG_SIZE", "100"),
            ("IRC_LOGIN_CHANNEL", "Q@CServe.quakenet.org"),
            ("IRC_LOGIN_MSG", "AUTH relay pw"),
        ]);
        let config = load(&vars).unwrap();
        assert!(config.bridge.require_accounts);
        assert!(config.dry_irc);
        assert!(!config.bridge.default_write_access);
        assert_eq!(config.backlog_size, 100);
        assert_eq!(
            config.irc_login,
            Some(("Q@CServe.quakenet.org".to_string(), "AUTH relay pw".to_string()))
        );

        vars.push(("BRIDGE_PORT", "http"));
        assert_eq!(
            load(&vars).unwrap_err(),
            ConfigError::Invalid {
                key: "BRIDGE_PORT",
                value: "http".into()
            }
        );
    }
}
