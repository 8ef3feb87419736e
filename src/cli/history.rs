use anyhow::Result;

use super::args::HistoryCliArgs;
use crate::history::{self, format_size};

pub fn handle_history_command(args: HistoryCliArgs) -> Result<()> {
    let page = history::get_recent(args.limit)?;

    if page.entries.is_empty() {
        println!("No uploaded recordings yet.");
        return Ok(());
    }

    println!(
        "Showing {} of {} recording(s):\n",
        page.entries.len(),
        page.total
    );

    for entry in page.entries {
        println!("ID: {}", entry.id);
        println!("File: {}", entry.filename);
        println!("Uploaded: {}", entry.uploaded_at);
        println!("Size: {}", format_size(entry.file_size));
        if entry.retry_count > 0 {
            println!("Retries: {}", entry.retry_count);
        }
        println!("URL: {}", entry.url);
        println!("---");
    }

    Ok(())
}
