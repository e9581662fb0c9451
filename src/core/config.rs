use std::env;
use std::path::PathBuf;

use crate::chat::prompt::DEFAULT_PERSONA;

pub const DEFAULT_AVATAR_PORT_START: u16 = 9300;
pub const DEFAULT_AVATAR_PORT_END: u16 = 9400;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub storage_path: PathBuf,
    pub system_message: String,
    pub avatar_enabled: bool,
    pub avatar_port_start: u16,
    pub avatar_port_end: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        let storage_path = env::var("FAYDESK_STORAGE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::data_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("faydesk")
            });
        let system_message =
            env::var("FAYDESK_SYSTEM_MESSAGE").unwrap_or_else(|_| DEFAULT_PERSONA.to_string());
        let avatar_enabled = env::var("FAYDESK_AVATAR_ENABLED")
            .map(|v| parse_flag(&v))
            .unwrap_or(true);
        let avatar_port_start = parse_port("FAYDESK_AVATAR_PORT_START", DEFAULT_AVATAR_PORT_START);
        let avatar_port_end = parse_port("FAYDESK_AVATAR_PORT_END", DEFAULT_AVATAR_PORT_END);

        Self {
            storage_path,
            system_message,
            avatar_enabled,
            avatar_port_start,
            avatar_port_end,
        }
    }
}

fn parse_flag(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}

fn parse_port(var: &str, default: u16) -> u16 {
    match env::var(var) {
        Ok(value) => value.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring invalid {}={}, using {}", var, value, default);
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("true"));
        assert!(parse_flag("1"));
        assert!(!parse_flag("False"));
        assert!(!parse_flag(" off "));
    }
}
