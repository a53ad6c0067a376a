//! API key management subcommand.

use std::io::BufRead;

use crate::api_key;
use crate::cli::args::{KeyAction, KeyArgs};

/// Run the key subcommand.
pub fn run(args: KeyArgs) -> Result<(), String> {
    match args.action {
        KeyAction::Set => {
            eprintln!("Paste the OpenAI API key and press Enter:");
            let mut key = String::new();
            std::io::stdin()
                .lock()
                .read_line(&mut key)
                .map_err(|e| format!("Failed to read key: {}", e))?;
            let key = key.trim();
            if key.is_empty() {
                return Err("No key entered".to_string());
            }
            api_key::set_api_key(Some(key))?;
            println!("Stored API key {} in the system keyring.", api_key::mask_key(key));
            Ok(())
        }
        KeyAction::Clear => {
            api_key::set_api_key(None)?;
            println!("API key removed from the system keyring.");
            Ok(())
        }
        KeyAction::Status => {
            match api_key::resolve_api_key_with_source() {
                Some((key, source)) => {
                    println!("API key {} (from {})", api_key::mask_key(&key), source.as_str());
                }
                None => {
                    println!(
                        "No API key configured. Set OPENAI_API_KEY or run `dentascribe key set`."
                    );
                }
            }
            Ok(())
        }
    }
}
