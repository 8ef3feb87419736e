use anyhow::Result;

use crate::settings::{FileSettingsStore, SettingsStore};

pub fn handle_status_command() -> Result<()> {
    let settings = FileSettingsStore::open_default()?;

    match settings.get_current_path()? {
        Some(path) => {
            let state = if path.exists() { "present" } else { "missing" };
            println!("Recording in progress: {} ({})", path.display(), state);
            println!("It will be finalized on the next call-ended signal.");
        }
        None => println!("No recording in progress."),
    }

    Ok(())
}
