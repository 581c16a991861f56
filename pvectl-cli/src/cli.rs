//! Command-line argument parsing.

use clap::{Parser, Subcommand};

/// pvectl - Submit and follow hypervisor tasks
#[derive(Parser, Debug)]
#[command(name = "pvectl")]
#[command(about = "pvectl - Submit and follow hypervisor tasks")]
#[command(version)]
pub struct Args {
    /// Path to configuration file (optional, defaults used if not found)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn")]
    pub log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    pub log_json: bool,

    /// API root, overrides the configuration file
    #[arg(long, env = "PVECTL_BASE_URL")]
    pub base_url: Option<String>,

    /// Enable development mode (in-memory API with a scripted task)
    #[arg(long)]
    pub dev: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Post an operation and follow its log until it finishes
    Submit {
        /// API path, e.g. nodes/pve1/qemu/100/status/start
        path: String,

        /// Operation parameter (repeatable)
        #[arg(short, long = "param", value_name = "KEY=VALUE", value_parser = parse_param)]
        params: Vec<(String, String)>,
    },

    /// Print the status of a task
    Status { upid: String },

    /// Print the log of a task
    Log {
        upid: String,

        /// Keep printing lines until the task is done
        #[arg(short, long)]
        follow: bool,
    },

    /// Block until a task finishes
    Wait { upid: String },

    /// Stop a running task
    Cancel { upid: String },
}

impl Command {
    /// Task identifier the command operates on, if any.
    pub fn upid(&self) -> Option<&str> {
        match self {
            Command::Submit { .. } => None,
            Command::Status { upid }
            | Command::Log { upid, .. }
            | Command::Wait { upid }
            | Command::Cancel { upid } => Some(upid),
        }
    }
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_param() {
        assert_eq!(
            parse_param("memory=2048").unwrap(),
            ("memory".to_string(), "2048".to_string())
        );
        // Only the first '=' separates
        assert_eq!(
            parse_param("args=-vga=std").unwrap(),
            ("args".to_string(), "-vga=std".to_string())
        );
        assert_eq!(parse_param("force=").unwrap(), ("force".to_string(), String::new()));
        assert!(parse_param("memory").is_err());
        assert!(parse_param("=2048").is_err());
    }

    #[test]
    fn test_submit_arguments() {
        let args = Args::try_parse_from([
            "pvectl",
            "--dev",
            "submit",
            "nodes/pve1/qemu/100/status/start",
            "-p",
            "timeout=30",
            "--param",
            "skiplock=1",
        ])
        .unwrap();

        assert!(args.dev);
        match args.command {
            Command::Submit { path, params } => {
                assert_eq!(path, "nodes/pve1/qemu/100/status/start");
                assert_eq!(params.len(), 2);
                assert_eq!(params[1], ("skiplock".to_string(), "1".to_string()));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_upid_commands() {
        let args = Args::try_parse_from(["pvectl", "log", "UPID:x", "--follow"]).unwrap();
        assert_eq!(args.command.upid(), Some("UPID:x"));
        assert!(matches!(args.command, Command::Log { follow: true, .. }));
        assert!(Args::try_parse_from(["pvectl", "wait"]).is_err());
    }
}
