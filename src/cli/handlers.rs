//! Subcommand handlers. Each returns the process exit code.

use super::commands::{DeployArgs, ServeArgs, StacksArgs, WhoamiArgs};
use super::output::OutputFormatter;
use crate::analysis::{FixedAnalyzer, ManifestAnalyzer, StackAnalyzer};
use crate::config::SiteforgeConfig;
use crate::deploy::{DeploymentRequest, DeploymentService, DeploymentStatus};
use crate::progress::LoggingHandler;
use crate::provision::{AwsProvisioner, CloudClients, DryRunProvisioner, Provisioner};
use crate::session::{spawn_expiry_sweeper, InMemorySessionStore, SessionGuard, SessionStore};
use crate::source::{GitFetcher, LocalFetcher, SourceFetcher};
use crate::stack::{HandlerRegistry, StackId};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

fn load_config(adjust: impl FnOnce(&mut SiteforgeConfig)) -> Option<SiteforgeConfig> {
    let mut config = SiteforgeConfig::default();
    adjust(&mut config);
    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        eprintln!("\nPlease check your SITEFORGE_* environment variables and command-line arguments.");
        return None;
    }
    debug!("{}", config);
    Some(config)
}

async fn provisioner_for(config: &SiteforgeConfig, dry_run: bool) -> Arc<dyn Provisioner> {
    if dry_run {
        info!(region = %config.region, "Dry run: resources will be planned, not created");
        return Arc::new(DryRunProvisioner::new(config.region.clone()));
    }
    let clients = CloudClients::connect(&config.cloud_settings()).await;
    Arc::new(AwsProvisioner::new(clients, config.managed_build_settings()))
}

fn print(output: Result<String>) -> i32 {
    match output {
        Ok(text) => {
            println!("{}", text.trim_end());
            0
        }
        Err(e) => {
            error!("Failed to format output: {:#}", e);
            1
        }
    }
}

pub async fn handle_serve(args: &ServeArgs) -> i32 {
    let Some(config) = load_config(|config| {
        if let Some(listen) = &args.listen {
            config.listen = listen.clone();
        }
        if let Some(rpm) = args.rate_limit {
            config.rate_limit_rpm = rpm;
        }
    }) else {
        return 1;
    };

    match serve(config, args.dry_run).await {
        Ok(()) => 0,
        Err(e) => {
            error!("Server failed: {:#}", e);
            1
        }
    }
}

async fn serve(config: SiteforgeConfig, dry_run: bool) -> Result<()> {
    let addr = config.listen_addr()?;
    let store: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
    let service = Arc::new(
        DeploymentService::builder(&config.work_dir)
            .guard(SessionGuard::new(Arc::clone(&store), config.guard_config()))
            .executor_options(config.executor_options())
            .provisioner(provisioner_for(&config, dry_run).await)
            .namer(config.namer())
            .progress(Arc::new(LoggingHandler))
            .keep_workdirs(config.keep_workdirs)
            .build(),
    );

    let purger = Arc::clone(&service);
    let sweeper = spawn_expiry_sweeper(store, config.session_timeout(), SWEEP_INTERVAL, move |ids| {
        purger.purge_sessions(ids);
    });
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    let result = crate::api::serve(listener, service, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
        }
        info!("Shutting down");
    })
    .await
    .context("API server error");

    sweeper.abort();
    result
}

pub async fn handle_deploy(args: &DeployArgs) -> i32 {
    let Some(config) = load_config(|config| {
        config.keep_workdirs |= args.keep_workdir;
    }) else {
        return 1;
    };

    let analyzer: Arc<dyn StackAnalyzer> = match &args.stack {
        Some(stack) => {
            let stack = StackId::parse(stack);
            info!(stack = %stack, "Skipping analysis");
            Arc::new(FixedAnalyzer::stack(stack))
        }
        None => Arc::new(ManifestAnalyzer),
    };
    let fetcher: Arc<dyn SourceFetcher> = match &args.source_dir {
        Some(dir) => {
            if !dir.is_dir() {
                error!("Source directory does not exist: {}", dir.display());
                return 1;
            }
            Arc::new(LocalFetcher::new(dir))
        }
        None => Arc::new(GitFetcher::default()),
    };

    let service = Arc::new(
        DeploymentService::builder(&config.work_dir)
            .guard(SessionGuard::new(
                Arc::new(InMemorySessionStore::new()),
                config.guard_config(),
            ))
            .analyzer(analyzer)
            .fetcher(fetcher)
            .executor_options(config.executor_options())
            .provisioner(provisioner_for(&config, args.dry_run).await)
            .namer(config.namer())
            .progress(Arc::new(LoggingHandler))
            .keep_workdirs(config.keep_workdirs)
            .build(),
    );

    let session = service.create_session();
    let mut request = DeploymentRequest::new(&args.repository_url).with_session(session.as_str());
    if let Some(project) = &args.project {
        request = request.with_project(project);
    }
    if let Some(token) = &args.token {
        request = request.with_token(token);
    }

    let submitted = match service.submit(request) {
        Ok(submitted) => submitted,
        Err(e) => {
            error!(kind = e.kind(), "Deployment rejected: {}", e);
            return 1;
        }
    };

    let record = match service.wait_terminal(&submitted.deployment_id).await {
        Ok(record) => record,
        Err(e) => {
            error!("Deployment lost: {}", e);
            return 1;
        }
    };

    let code = print(OutputFormatter::new(args.format.into()).format_record(&record));
    if record.status == DeploymentStatus::Ready {
        code
    } else {
        1
    }
}

pub fn handle_stacks(args: &StacksArgs) -> i32 {
    let registry = HandlerRegistry::with_defaults();
    print(
        OutputFormatter::new(args.format.into())
            .format_stacks(&registry.list_available(), &registry.load_failures()),
    )
}

pub async fn handle_whoami(args: &WhoamiArgs) -> i32 {
    let Some(config) = load_config(|config| {
        if let Some(region) = &args.region {
            config.region = region.clone();
        }
    }) else {
        return 1;
    };

    let clients = CloudClients::connect(&config.cloud_settings()).await;
    match clients.validate_credentials().await {
        Ok(identity) => print(OutputFormatter::new(args.format.into()).format_identity(&identity)),
        Err(e) => {
            error!("{}", e);
            eprintln!("\nConfigure credentials with AWS_PROFILE or AWS_ACCESS_KEY_ID/AWS_SECRET_ACCESS_KEY.");
            1
        }
    }
}
