//! Command-line interface parsing for the campus portal client.

use clap::{Parser, Subcommand};

use campuscache_core::Config;

/// Campus portal client - reads portal data through a local offline cache
#[derive(Parser, Debug)]
#[command(name = "campuscache")]
#[command(about = "Campus portal data with an offline-first cache")]
#[command(version)]
pub struct Cli {
    /// Keep the cache in memory for this run only
    #[arg(long, global = true)]
    pub ephemeral: bool,

    /// Also write logs to a daily file in the cache directory
    #[arg(long, global = true)]
    pub log_file: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Campus news feed
    News,
    /// Upcoming campus events
    Events,
    /// Timetable, for one study group or the configured one
    Schedule {
        #[arg(long)]
        group: Option<i64>,
    },
    /// Grades for a user (defaults to the configured user)
    Grades { user: Option<i64> },
    /// Enrolled courses for a user
    Courses { user: Option<i64> },
    /// A user's profile
    Profile { user: Option<i64> },
    /// All portal users (admin)
    Users,
    /// Preload news, events and schedule, plus per-user data when a user is known
    Warm { user: Option<i64> },
    /// Inspect or reset the local cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum CacheAction {
    /// Drop every cached entry
    Clear,
    /// Drop one cached entry
    Forget { key: String },
    /// Show one cached entry and its age
    Show { key: String },
}

/// Pick the user from the command line, falling back to the config file.
pub fn resolve_user(arg: Option<i64>, config: &Config) -> anyhow::Result<i64> {
    arg.or(config.user_id).ok_or_else(|| {
        anyhow::anyhow!("No user given and no user_id in config; pass a user id")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_commands() {
        let cli = Cli::try_parse_from(["campuscache", "news"]).unwrap();
        assert_eq!(cli.command, Command::News);
        assert!(!cli.ephemeral);

        let cli = Cli::try_parse_from(["campuscache", "grades", "42"]).unwrap();
        assert_eq!(cli.command, Command::Grades { user: Some(42) });
    }

    #[test]
    fn test_parse_schedule_group() {
        let cli = Cli::try_parse_from(["campuscache", "schedule", "--group", "3"]).unwrap();
        assert_eq!(cli.command, Command::Schedule { group: Some(3) });
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = ["campuscache", "warm", "--ephemeral", "--log-file"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert!(cli.ephemeral);
        assert!(cli.log_file);
        assert_eq!(cli.command, Command::Warm { user: None });
    }

    #[test]
    fn test_parse_cache_actions() {
        let cli = Cli::try_parse_from(["campuscache", "cache", "forget", "news_list"]).unwrap();
        assert_eq!(
            cli.command,
            Command::Cache {
                action: CacheAction::Forget {
                    key: "news_list".to_string()
                }
            }
        );
        assert!(Cli::try_parse_from(["campuscache", "cache"]).is_err());
    }

    #[test]
    fn test_invalid_user_id_rejected() {
        assert!(Cli::try_parse_from(["campuscache", "profile", "bob"]).is_err());
    }

    #[test]
    fn test_resolve_user_falls_back_to_config() {
        let config = Config {
            user_id: Some(7),
            ..Default::default()
        };
        assert_eq!(resolve_user(Some(9), &config).unwrap(), 9);
        assert_eq!(resolve_user(None, &config).unwrap(), 7);
        assert!(resolve_user(None, &Config::default()).is_err());
    }
}
