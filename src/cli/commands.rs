use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Deploy repositories as hosted static sites
#[derive(Parser, Debug)]
#[command(
    name = "siteforge",
    about = "Deploy repositories as hosted static sites",
    version,
    author,
    long_about = "siteforge detects the stack of a repository, builds it in an isolated \
                  subprocess, and provisions storage, CDN and managed-build resources for \
                  the result. Run it as an HTTP service with `serve` or deploy once with `deploy`."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(short = 'v', long, global = true, help = "Enable debug logging")]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Quiet mode - suppress non-error output"
    )]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Run the deployment API",
        long_about = "Serves the deployment API until interrupted. Idle sessions are swept \
                      in the background.\n\n\
                      Examples:\n  \
                      siteforge serve\n  \
                      siteforge serve --listen 0.0.0.0:8080 --dry-run"
    )]
    Serve(ServeArgs),

    #[command(
        about = "Deploy one repository and wait for the result",
        long_about = "Runs a single deployment in-process and prints the final record.\n\n\
                      Examples:\n  \
                      siteforge deploy https://github.com/acme/site\n  \
                      siteforge deploy https://github.com/acme/site --project acme-site --dry-run\n  \
                      siteforge deploy https://github.com/acme/site --source-dir ./site --stack static"
    )]
    Deploy(DeployArgs),

    #[command(about = "List registered stack handlers and load failures")]
    Stacks(StacksArgs),

    #[command(about = "Validate cloud credentials and show the caller identity")]
    Whoami(WhoamiArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct ServeArgs {
    #[arg(long, value_name = "ADDR", help = "Listen address (overrides SITEFORGE_LISTEN)")]
    pub listen: Option<String>,

    #[arg(long, value_name = "RPM", help = "Requests per session per minute")]
    pub rate_limit: Option<usize>,

    #[arg(long, help = "Plan resources without calling the cloud")]
    pub dry_run: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct DeployArgs {
    #[arg(value_name = "REPOSITORY", help = "https URL of the repository")]
    pub repository_url: String,

    #[arg(short = 'p', long, value_name = "NAME", help = "Project name (derived from the repository by default)")]
    pub project: Option<String>,

    #[arg(long, value_name = "TOKEN", help = "GitHub token for private repositories")]
    pub token: Option<String>,

    #[arg(long, value_name = "STACK", help = "Skip analysis and use this stack")]
    pub stack: Option<String>,

    #[arg(long, help = "Plan resources without calling the cloud")]
    pub dry_run: bool,

    #[arg(
        long,
        value_name = "DIR",
        help = "Use a local checkout instead of cloning"
    )]
    pub source_dir: Option<PathBuf>,

    #[arg(long, help = "Keep the checkout after the deployment finishes")]
    pub keep_workdir: bool,

    #[arg(short = 'f', long, value_enum, default_value = "human", help = "Output format")]
    pub format: OutputFormatArg,
}

#[derive(Parser, Debug, Clone)]
pub struct StacksArgs {
    #[arg(short = 'f', long, value_enum, default_value = "human", help = "Output format")]
    pub format: OutputFormatArg,
}

#[derive(Parser, Debug, Clone)]
pub struct WhoamiArgs {
    #[arg(long, value_name = "REGION", help = "Region override")]
    pub region: Option<String>,

    #[arg(short = 'f', long, value_enum, default_value = "human", help = "Output format")]
    pub format: OutputFormatArg,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormatArg {
    Json,
    Human,
}

impl From<OutputFormatArg> for super::output::OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Json => super::output::OutputFormat::Json,
            OutputFormatArg::Human => super::output::OutputFormat::Human,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_args_verify() {
        CliArgs::command().debug_assert();
    }

    #[test]
    fn test_default_deploy_args() {
        let args = CliArgs::parse_from(["siteforge", "deploy", "https://github.com/acme/site"]);
        match args.command {
            Commands::Deploy(deploy) => {
                assert_eq!(deploy.repository_url, "https://github.com/acme/site");
                assert_eq!(deploy.format, OutputFormatArg::Human);
                assert!(deploy.project.is_none());
                assert!(deploy.stack.is_none());
                assert!(!deploy.dry_run);
                assert!(deploy.source_dir.is_none());
            }
            _ => panic!("Expected Deploy command"),
        }
    }

    #[test]
    fn test_deploy_with_options() {
        let args = CliArgs::parse_from([
            "siteforge",
            "deploy",
            "https://github.com/acme/site",
            "--project",
            "acme-site",
            "--stack",
            "static",
            "--source-dir",
            "/tmp/site",
            "--dry-run",
            "--format",
            "json",
        ]);
        match args.command {
            Commands::Deploy(deploy) => {
                assert_eq!(deploy.project.as_deref(), Some("acme-site"));
                assert_eq!(deploy.stack.as_deref(), Some("static"));
                assert_eq!(deploy.source_dir, Some(PathBuf::from("/tmp/site")));
                assert!(deploy.dry_run);
                assert_eq!(deploy.format, OutputFormatArg::Json);
            }
            _ => panic!("Expected Deploy command"),
        }
    }

    #[test]
    fn test_serve_overrides() {
        let args = CliArgs::parse_from(["siteforge", "serve", "--listen", "0.0.0.0:9000", "--rate-limit", "5"]);
        match args.command {
            Commands::Serve(serve) => {
                assert_eq!(serve.listen.as_deref(), Some("0.0.0.0:9000"));
                assert_eq!(serve.rate_limit, Some(5));
                assert!(!serve.dry_run);
            }
            _ => panic!("Expected Serve command"),
        }
    }

    #[test]
    fn test_deploy_requires_repository() {
        assert!(CliArgs::try_parse_from(["siteforge", "deploy"]).is_err());
    }

    #[test]
    fn test_global_flags() {
        let args = CliArgs::parse_from(["siteforge", "-v", "stacks"]);
        assert!(args.verbose);

        let args = CliArgs::parse_from(["siteforge", "--log-level", "debug", "whoami"]);
        assert_eq!(args.log_level.as_deref(), Some("debug"));

        assert!(CliArgs::try_parse_from(["siteforge", "-v", "-q", "stacks"]).is_err());
    }
}
