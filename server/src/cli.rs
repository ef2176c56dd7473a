use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(about = "Trackmap CLI: GPS tracks, wind overlay and track archive.")]
pub struct Cli {
    /// Base URL of the archive service
    #[arg(env = "TRACKMAP_ARCHIVE_URL", short, long)]
    pub archive_url: Option<String>,
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Draw track files and print the resulting map layers as JSON
    Show {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Also upload every file to the archive
        #[arg(long, requires_all = ["author", "description"])]
        upload: bool,
        #[arg(long)]
        author: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        account: Option<String>,
    },
    /// Replay a track point by point
    Play {
        file: PathBuf,
        /// Tick interval in milliseconds (floor 100)
        #[arg(long)]
        interval_ms: Option<u64>,
    },
    /// Fetch the wind layer and summarize it
    Wind {
        #[arg(env = "TRACKMAP_WIND_URL", long)]
        url: Option<String>,
    },
    /// Upload a track file to the archive
    Upload {
        file: PathBuf,
        #[arg(long)]
        author: String,
        #[arg(long)]
        description: String,
        #[arg(long)]
        account: Option<String>,
    },
    History(HistoryCommand),
    /// Serve the map viewer
    Serve {
        #[arg(env = "TRACKMAP_SERVER_ADDRESS")]
        address: std::net::SocketAddr,
    },
}

#[derive(Debug, Parser)]
pub struct HistoryCommand {
    #[command(subcommand)]
    pub cmd: HistorySubCommand,
}

#[derive(Debug, Subcommand)]
pub enum HistorySubCommand {
    List,
    Delete {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_show_with_upload() {
        let cli = Cli::try_parse_from([
            "trackmap",
            "show",
            "a.csv",
            "b.csv",
            "--upload",
            "--author",
            "Ana",
            "--description",
            "Regatta",
        ])
        .unwrap();
        match cli.cmd {
            Command::Show { files, upload, .. } => {
                assert_eq!(files.len(), 2);
                assert!(upload);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_upload_flag_needs_author() {
        assert!(Cli::try_parse_from(["trackmap", "show", "a.csv", "--upload"]).is_err());
    }

    #[test]
    fn test_parse_history_delete() {
        let cli = Cli::try_parse_from(["trackmap", "history", "delete", "--yes"]).unwrap();
        assert!(matches!(
            cli.cmd,
            Command::History(HistoryCommand {
                cmd: HistorySubCommand::Delete { yes: true }
            })
        ));
    }
}
