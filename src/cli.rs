use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ptbkit")]
#[command(version)]
#[command(about = "Read and write legacy accounting backup archives", long_about = None)]
#[command(after_help = "Examples:\n  \
  ptbkit list backup.ptb                    list archive members and their roles\n  \
  ptbkit import backup.ptb -o result.json   recover records as JSON\n  \
  ptbkit export snapshot.json -o out.ptb    write records back into an archive")]
pub struct Cli {
    /// Verbose logging (ptbkit=debug)
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List archive members and the role each one resolves to
    List {
        /// Backup archive
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Recover records from a backup archive
    Import {
        /// Backup archive
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Write the JSON result here instead of stdout
        #[arg(short = 'o', long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// JSON import configuration
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Write raw member bytes into this directory
        #[arg(long, value_name = "DIR")]
        dump_dir: Option<PathBuf>,

        /// Truncate members larger than this many bytes
        #[arg(long, value_name = "BYTES")]
        max_member_bytes: Option<u64>,

        /// Abandon an entity that takes longer than this. Its work is
        /// dropped; exit waits at most a short grace period for it
        #[arg(long, value_name = "MS")]
        timeout_ms: Option<u64>,
    },

    /// Encode a JSON snapshot of records into a backup archive
    Export {
        /// JSON snapshot
        #[arg(value_name = "SNAPSHOT")]
        snapshot: PathBuf,

        /// Archive to write
        #[arg(short = 'o', long, value_name = "FILE")]
        output: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_import_flags() {
        let cli = Cli::parse_from([
            "ptbkit", "import", "backup.ptb", "-o", "out.json", "--dump-dir", "raw", "-v",
        ]);
        assert!(cli.verbose);
        match cli.command {
            Command::Import {
                file,
                output,
                dump_dir,
                config,
                ..
            } => {
                assert_eq!(file, PathBuf::from("backup.ptb"));
                assert_eq!(output, Some(PathBuf::from("out.json")));
                assert_eq!(dump_dir, Some(PathBuf::from("raw")));
                assert!(config.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn export_requires_output() {
        assert!(Cli::try_parse_from(["ptbkit", "export", "snapshot.json"]).is_err());
    }
}
