//! Config command implementation.

use anyhow::Result;

use relaydrop_core::config::{Config, KEYS};

use super::{with_hint, ConfigAction, ConfigArgs};

/// Run the config command.
pub fn run(args: ConfigArgs) -> Result<()> {
    let mut config = Config::load().map_err(with_hint)?;

    match args.action {
        ConfigAction::Get { key } => match config.get(&key) {
            Some(v) => println!("{}: {}", key, v),
            None => println!("Unknown configuration key: {}", key),
        },

        ConfigAction::Set { key, value } => {
            config.set(&key, &value).map_err(with_hint)?;
            config.save().map_err(with_hint)?;
            println!("Set {} = {}", key, value);
        }

        ConfigAction::Show => {
            println!();
            println!("RelayDrop Configuration");
            println!("{}", "─".repeat(50));
            println!();
            let mut section = "";
            for key in KEYS.iter().copied() {
                let (head, name) = key.split_once('.').unwrap_or(("", key));
                if head != section {
                    if !section.is_empty() {
                        println!();
                    }
                    println!("[{}]", head);
                    section = head;
                }
                println!("  {} = \"{}\"", name, config.get(key).unwrap_or_default());
            }
            println!();
        }

        ConfigAction::Path => {
            println!("{}", Config::config_path().display());
        }

        ConfigAction::Reset => {
            Config::default().save().map_err(with_hint)?;
            println!("Configuration reset to defaults.");
        }
    }

    Ok(())
}
