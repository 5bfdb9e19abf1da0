use std::path::Path;

use anyhow::{Result, bail};
use foldwatch_runtime::Config;
use foldwatch_types::{ClientDescriptor, ClientIdentity};

pub fn add(
    data_dir: &Path,
    name: String,
    log_root: String,
    clock_offset_minutes: i64,
    ignore_utc_offset: bool,
) -> Result<()> {
    let config_path = data_dir.join("config.toml");
    let mut config = Config::load_from(&config_path)?;

    let identity = ClientIdentity {
        name,
        descriptor: ClientDescriptor::Path { log_root },
        clock_offset_minutes,
        ignore_utc_offset,
    };
    identity.validate()?;

    if config.client(&identity.name).is_some() {
        bail!("a client named '{}' is already configured", identity.name);
    }

    let name = identity.name.clone();
    let target = identity.path_string();
    config.clients.push(identity);
    config.save_to(&config_path)?;
    println!("Added client '{name}' ({target})");
    Ok(())
}

pub fn list(data_dir: &Path) -> Result<()> {
    let config = Config::load_from(&data_dir.join("config.toml"))?;
    if config.clients.is_empty() {
        println!("No clients configured. Add one with 'foldwatch client add'.");
        return Ok(());
    }

    println!("{:<20} {:<8} {:<32} {:>6}  UTC", "NAME", "KIND", "TARGET", "CLOCK");
    for identity in &config.clients {
        let kind = match identity.descriptor {
            ClientDescriptor::Network { .. } => "network",
            ClientDescriptor::Path { .. } => "path",
        };
        println!(
            "{:<20} {:<8} {:<32} {:>5}m  {}",
            identity.name,
            kind,
            identity.path_string(),
            identity.clock_offset_minutes,
            if identity.ignore_utc_offset { "ignored" } else { "applied" },
        );
    }
    Ok(())
}

pub fn remove(data_dir: &Path, name: &str) -> Result<()> {
    let config_path = data_dir.join("config.toml");
    let mut config = Config::load_from(&config_path)?;

    let before = config.clients.len();
    config.clients.retain(|c| c.name != name);
    if config.clients.len() == before {
        bail!("no client named '{name}'");
    }

    config.save_to(&config_path)?;
    println!("Removed client '{name}'");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_then_remove_round_trips_config() -> Result<()> {
        let dir = tempfile::tempdir()?;

        add(dir.path(), "rig-1".to_string(), "/var/lib/fah".to_string(), 0, false)?;
        let config = Config::load_from(&dir.path().join("config.toml"))?;
        assert_eq!(config.clients.len(), 1);
        assert_eq!(config.clients[0].name, "rig-1");

        remove(dir.path(), "rig-1")?;
        let config = Config::load_from(&dir.path().join("config.toml"))?;
        assert!(config.clients.is_empty());
        Ok(())
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let dir = tempfile::tempdir().unwrap();
        add(dir.path(), "rig-1".to_string(), "/a".to_string(), 0, false).unwrap();
        assert!(add(dir.path(), "rig-1".to_string(), "/b".to_string(), 0, false).is_err());
    }

    #[test]
    fn test_remove_unknown_name_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(remove(dir.path(), "ghost").is_err());
    }
}
