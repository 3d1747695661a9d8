//! helmscan CLI - check which resources of a Helm release exist in the cluster

use clap::Parser;
use clap::error::ErrorKind;
use helmscan_core::ReleaseQuery;
use helmscan_kube::ResolverConfig;
use helmscan_kube::resolver::{DEFAULT_CONCURRENCY, MAX_CONCURRENCY};
use std::io;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod commands;
mod display;
mod error;
mod exit_codes;

use display::OutputFormat;
use error::CliError;

#[derive(Parser, Debug)]
#[command(name = "helmscan")]
#[command(version)]
#[command(
    about = "List the resources of a Helm release and whether each one exists in the cluster",
    long_about = None
)]
struct Cli {
    /// Helm release name
    #[arg(long)]
    name: String,

    /// Namespace the release is installed in
    #[arg(short, long)]
    namespace: String,

    /// Revision to inspect (default: latest)
    #[arg(long)]
    revision: Option<u32>,

    /// Existence checks in flight at once
    #[arg(
        long,
        env = "HELMSCAN_CONCURRENCY",
        default_value_t = DEFAULT_CONCURRENCY as u64,
        value_parser = clap::value_parser!(u64).range(1..=MAX_CONCURRENCY as u64)
    )]
    concurrency: u64,

    /// Deadline in seconds for all existence checks
    #[arg(
        long,
        env = "HELMSCAN_TIMEOUT",
        default_value_t = 60,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    timeout: u64,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,

    /// Disable coloured output
    #[arg(long)]
    no_color: bool,

    /// Enable debug logging on stderr
    #[arg(long)]
    debug: bool,
}

impl Cli {
    fn query(&self) -> error::Result<ReleaseQuery> {
        Ok(ReleaseQuery::new(&self.name, &self.namespace, self.revision)?)
    }

    fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            concurrency: self.concurrency as usize,
            deadline: Duration::from_secs(self.timeout),
            ..Default::default()
        }
    }
}

fn parse_args() -> Cli {
    match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // clap exits with 2 on bad usage, which is our "not found" code
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => exit_codes::SUCCESS,
                _ => exit_codes::USAGE_ERROR,
            };
            let _ = err.print();
            std::process::exit(code);
        }
    }
}

fn init_tracing(debug: bool) {
    let default = if debug {
        "warn,helmscan=debug,helmscan_core=debug,helmscan_kube=debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> error::Result<i32> {
    // Validate before any cluster I/O
    let query = cli.query()?;
    let config = cli.resolver_config();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::internal(format!("cannot start async runtime: {}", e)))?;

    runtime.block_on(commands::scan::run(&query, config, cli.output))
}

fn main() {
    // Setup miette for nice error display
    miette::set_panic_hook();

    let cli = parse_args();
    init_tracing(cli.debug);
    if cli.no_color {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            let code = err.exit_code();
            eprintln!("{:?}", miette::Report::new(err));
            code
        }
    };
    std::process::exit(code);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("helmscan").chain(args.iter().copied()))
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&["--name", "web", "--namespace", "prod"]).unwrap();
        assert_eq!(cli.revision, None);
        assert_eq!(cli.output, OutputFormat::Table);

        let config = cli.resolver_config();
        assert_eq!(config.concurrency, 8);
        assert_eq!(config.deadline, Duration::from_secs(60));
    }

    #[test]
    fn test_concurrency_range() {
        assert!(parse(&["--name", "web", "-n", "prod", "--concurrency", "64"]).is_ok());
        assert!(parse(&["--name", "web", "-n", "prod", "--concurrency", "0"]).is_err());
        assert!(parse(&["--name", "web", "-n", "prod", "--concurrency", "65"]).is_err());
    }

    #[test]
    fn test_invalid_query_is_usage_error() {
        let cli = parse(&["--name", "Web_App", "-n", "prod"]).unwrap();
        assert_eq!(cli.query().unwrap_err().exit_code(), exit_codes::USAGE_ERROR);

        let cli = parse(&["--name", "web", "-n", "prod", "--revision", "0"]).unwrap();
        assert_eq!(cli.query().unwrap_err().exit_code(), exit_codes::USAGE_ERROR);
    }

    #[test]
    fn test_json_output_flag() {
        let cli = parse(&["--name", "web", "-n", "prod", "-o", "json"]).unwrap();
        assert_eq!(cli.output, OutputFormat::Json);
    }
}
