use anyhow::{bail, Result};

use super::args::UploadCliArgs;
use crate::app;
use crate::config::Config;
use crate::recording::RecordingHandle;
use crate::upload::UploadOutcome;

pub async fn handle_upload_command(config: &Config, args: UploadCliArgs) -> Result<()> {
    if !args.file.is_file() {
        bail!("Recording not found: {}", args.file.display());
    }

    let pipeline = app::build_pipeline(config)?;
    let handle = RecordingHandle::new(args.file);

    let Some(job) = pipeline.submit(&handle) else {
        bail!(
            "No upload scheduled for {} (empty file?)",
            handle.file_path.display()
        );
    };

    match job.await? {
        UploadOutcome::Succeeded(record) => {
            println!("Uploaded {} -> {}", record.filename, record.remote_url);
            Ok(())
        }
        UploadOutcome::Failed(e) => bail!("Upload failed: {}", e),
    }
}
