use anyhow::Result;
use clap::Parser;
use extpm::commands;
use std::path::PathBuf;

/// extpm - extension package manager
///
/// Installs packages of plugins and scripts from package repositories,
/// resolving their dependencies.
///
/// Examples:
///   extpm install keypatch             # Newest release from the configured repositories
///   extpm install "foo>=1.0,<2"        # Newest release within a range
///   extpm install foo --repo github:owner/index
#[derive(Parser, Debug)]
#[command(author, version = env!("EXTPM_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Base directory holding config.json and packages (defaults to ~/.extpm)
    #[arg(long = "home", env = "EXTPM_HOME", value_name = "PATH", global = true)]
    pub home: Option<PathBuf>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Install packages and their dependencies
    Install(InstallArgs),

    /// Upgrade an installed package to its newest release
    Upgrade(NameArgs),

    /// Remove an installed package
    #[command(alias = "rm")]
    Remove(NameArgs),

    /// List installed packages
    #[command(alias = "ls")]
    List(ListArgs),

    /// Search the configured repositories
    Search(SearchArgs),

    /// Enable a disabled package
    Enable(NameArgs),

    /// Disable a package without removing it
    Disable(NameArgs),

    /// Register and load every enabled package
    Refresh,

    /// Print configured repositories
    Repos,
}

#[derive(clap::Args, Debug)]
pub struct InstallArgs {
    /// Package name, optionally with a version range (e.g. "foo>=1.0,<2", "foo==1.2.0")
    #[arg(value_name = "SPEC", required = true)]
    pub specs: Vec<String>,

    /// Install from this repository instead of the configured ones
    #[arg(long, value_name = "URL")]
    pub repo: Option<String>,

    /// Replace installed packages with their newest matching release
    #[arg(long, short = 'U')]
    pub upgrade: bool,

    /// Remove a package again if its installer fails
    #[arg(long)]
    pub remove_on_fail: bool,
}

#[derive(clap::Args, Debug)]
pub struct NameArgs {
    /// Package id
    #[arg(value_name = "NAME")]
    pub name: String,
}

#[derive(clap::Args, Debug)]
pub struct ListArgs {
    /// List disabled packages instead
    #[arg(long)]
    pub disabled: bool,
}

#[derive(clap::Args, Debug)]
pub struct SearchArgs {
    /// Filter by id, name or description
    #[arg(value_name = "QUERY")]
    pub query: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let runtime = extpm::runtime::RealRuntime;

    match cli.command {
        Commands::Install(args) => {
            commands::install(
                runtime,
                cli.home,
                &args.specs,
                args.repo.as_deref(),
                args.upgrade,
                args.remove_on_fail,
            )
            .await?
        }
        Commands::Upgrade(args) => commands::upgrade(runtime, cli.home, &args.name).await?,
        Commands::Remove(args) => commands::remove(runtime, cli.home, &args.name).await?,
        Commands::List(args) => commands::list(runtime, cli.home, args.disabled)?,
        Commands::Search(args) => {
            commands::search(runtime, cli.home, args.query.as_deref()).await?
        }
        Commands::Enable(args) => commands::enable(runtime, cli.home, &args.name)?,
        Commands::Disable(args) => commands::disable(runtime, cli.home, &args.name)?,
        Commands::Refresh => commands::refresh(runtime, cli.home)?,
        Commands::Repos => commands::repos(runtime, cli.home)?,
    }
    Ok(())
}
