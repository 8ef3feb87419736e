pub mod args;
pub mod history;
pub mod status;
pub mod upload;

pub use args::{Cli, CliCommand, HistoryCliArgs, UploadCliArgs};
pub use history::handle_history_command;
pub use status::handle_status_command;
pub use upload::handle_upload_command;
