use clap::Parser;

use crate::config::StorageBackend;

/// Educar timetable service CLI arguments
#[derive(Debug, Parser)]
#[command(
    name = "educar",
    version,
    about = "Class timetable service with schedule conflict checking"
)]
pub struct Cli {
    /// Database URL, e.g. sqlite://educar.db (overrides DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Address to listen on, e.g. 127.0.0.1:8080 (overrides BIND_ADDR)
    #[arg(long)]
    pub bind: Option<String>,

    /// Storage backend (overrides STORAGE_BACKEND)
    #[arg(long, value_enum)]
    pub storage: Option<StorageBackend>,
}
