mod cmd;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgGroup, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::cmd::{
  CheckoutArgs, InstallArgs, cmd_checkout, cmd_env_create, cmd_env_list, cmd_find, cmd_info, cmd_install, cmd_spec,
};
use crate::output::{OutputFormat, print_error};

/// spackle - source-based package builds from dependency-resolved specs
#[derive(Parser)]
#[command(name = "spackle")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Increase log verbosity (-v info, -vv debug)
  #[arg(short, long, global = true, action = clap::ArgAction::Count)]
  verbose: u8,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Concretize specs and print the resulting dependency tree
  Spec {
    /// Specs to concretize, e.g. `zlib@1.3+shared %gcc`
    #[arg(required = true, num_args = 1..)]
    specs: Vec<String>,

    /// Print the concretized graph as JSON
    #[arg(long)]
    json: bool,

    /// Also write the graph as a lockfile
    #[arg(long, value_name = "FILE")]
    lock: Option<PathBuf>,
  },

  /// Concretize, build and install specs
  Install {
    specs: Vec<String>,

    /// Number of parallel builds
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Prefer versions that are already installed
    #[arg(long)]
    reuse: bool,

    /// Install into (and add the specs to) an environment
    #[arg(short, long, value_name = "ENV")]
    env: Option<String>,

    /// Keep scratch directories after successful builds
    #[arg(long)]
    keep_stage: bool,

    #[arg(short, long, value_enum, default_value_t)]
    output: OutputFormat,
  },

  /// List installed packages
  Find {
    /// Only show installs matching this spec
    spec: Option<String>,

    /// Show hashes and install prefixes
    #[arg(short, long)]
    long: bool,

    #[arg(short, long, value_enum, default_value_t)]
    output: OutputFormat,
  },

  /// Show details about a package recipe
  Info {
    package: String,

    #[arg(short, long, value_enum, default_value_t)]
    output: OutputFormat,
  },

  /// Check out a git ref of spackle itself, an environment or a repository
  #[command(group(ArgGroup::new("target").args(["env", "repo"])))]
  Checkout {
    /// Branch, tag or commit to check out
    reference: String,

    /// Remote to fetch from
    #[arg(short, long, default_value = spackle_lib::checkout::DEFAULT_REMOTE)]
    remote: String,

    /// URL for the remote, added if the remote does not exist
    #[arg(long)]
    url: Option<String>,

    /// Check out in this environment's directory
    #[arg(short, long, value_name = "ENV")]
    env: Option<String>,

    /// Check out in the repository with this namespace
    #[arg(long, value_name = "NAMESPACE")]
    repo: Option<String>,
  },

  /// Manage environments
  #[command(subcommand)]
  Env(EnvCommands),
}

#[derive(Subcommand)]
enum EnvCommands {
  /// Create an empty named environment
  Create { name: String },

  /// List named environments
  List {
    #[arg(short, long, value_enum, default_value_t)]
    output: OutputFormat,
  },
}

fn init_tracing(verbose: u8) {
  let default = match verbose {
    0 => "warn",
    1 => "info",
    _ => "debug",
  };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();
}

fn main() -> ExitCode {
  let cli = Cli::parse();
  init_tracing(cli.verbose);

  let result = match cli.command {
    Commands::Spec { specs, json, lock } => cmd_spec(&specs, json, lock.as_deref()),
    Commands::Install {
      specs,
      jobs,
      reuse,
      env,
      keep_stage,
      output,
    } => cmd_install(InstallArgs {
      specs,
      jobs,
      reuse,
      env,
      keep_stage,
      output,
    }),
    Commands::Find { spec, long, output } => cmd_find(spec.as_deref(), long, output),
    Commands::Info { package, output } => cmd_info(&package, output),
    Commands::Checkout {
      reference,
      remote,
      url,
      env,
      repo,
    } => cmd_checkout(CheckoutArgs {
      reference,
      remote,
      url,
      env,
      repo,
    }),
    Commands::Env(EnvCommands::Create { name }) => cmd_env_create(&name),
    Commands::Env(EnvCommands::List { output }) => cmd_env_list(output),
  };

  match result {
    Ok(()) => ExitCode::SUCCESS,
    Err(e) => {
      print_error(&format!("{:#}", e));
      ExitCode::FAILURE
    }
  }
}
