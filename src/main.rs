use std::path::PathBuf;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use tracing_subscriber::{fmt, EnvFilter};

use pathz::authz::loader::{compile_policy, load_policy_file};
use pathz::settings::Settings;
use pathz::{Mode, Path, PolicyStore};

#[derive(Parser, Debug)]
#[command(
    name = "pathz",
    version,
    about = "Path-based authorization policy checker"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Policy file, overriding `policy.policy_file` from the configuration
    #[arg(short, long)]
    policy: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Authorize a single request and print the decision as JSON
    Check {
        #[arg(short, long)]
        user: String,
        /// Request path, e.g. /interfaces/interface[name=Ethernet0]/state
        #[arg(long)]
        path: String,
        /// Optional request prefix prepended to `path`
        #[arg(long)]
        prefix: Option<String>,
        /// read or write
        #[arg(short, long)]
        mode: Mode,
    },
    /// Compile the policy and report its size
    Validate,
}

fn main() -> Result<()> {
    // logging
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).with_writer(std::io::stderr).init();

    let cli = Cli::parse();

    let mut settings = Settings::load(&cli.config)?;
    if let Some(policy) = cli.policy {
        settings.policy.policy_file = policy;
        settings.policy.enabled = true;
    }
    tracing::debug!(?settings, "Loaded configuration");

    match cli.command {
        Command::Check {
            user,
            path,
            prefix,
            mode,
        } => {
            let store = PolicyStore::from_settings(&settings);
            let path: Path = path.parse()?;
            let decision = match prefix {
                Some(prefix) => {
                    let prefix: Path = prefix.parse()?;
                    store.authorize_with_prefix(&user, &prefix, &path, mode)?
                }
                None => store.authorize(&user, &path, mode)?,
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&decision).into_diagnostic()?
            );
        }
        Command::Validate => {
            let document = load_policy_file(&settings.policy.policy_file)?;
            let snapshot = compile_policy(document)?;
            println!(
                "{}: {} rules, {} groups, {} nodes",
                settings.policy.policy_file.display(),
                snapshot.document.rules.len(),
                snapshot.groups.len(),
                snapshot.root.node_count()
            );
        }
    }
    Ok(())
}
