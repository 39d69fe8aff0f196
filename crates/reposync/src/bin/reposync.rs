use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use kube::api::ListParams;
use kube::{Api, Client, CustomResourceExt};
use tracing::{error, info, warn};

use reposync::controller::{runtime, Context, ReconcileOutcome};
use reposync::{
    init_tracing, ClusterDiscovery, ClusterResourceClient, ClusterStore, ControllerConfig,
    GitHubCommitSource, LogFormat, Materializer, Reconciler, SyncRepo, TemplateResolver,
};

#[derive(Debug, Parser)]
#[command(
    name = "reposync",
    version,
    about = "Materializes cluster resources whenever a watched repository branch moves."
)]
struct Cli {
    /// Controller configuration file (YAML). Defaults apply when omitted.
    #[arg(long, env = "REPOSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Only watch SyncRepo resources in this namespace.
    #[arg(long, env = "REPOSYNC_NAMESPACE")]
    namespace: Option<String>,

    /// Log output format: text or json.
    #[arg(long, default_value = "text")]
    log_format: LogFormat,

    /// Reconcile every sync resource once and exit.
    #[arg(long)]
    once: bool,

    /// Print the SyncRepo CustomResourceDefinition and exit.
    #[arg(long)]
    print_crd: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.print_crd {
        return match serde_yaml::to_string(&SyncRepo::crd()) {
            Ok(yaml) => {
                print!("{}", yaml);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Failed to render CRD: {}", e);
                ExitCode::FAILURE
            }
        };
    }

    init_tracing(cli.log_format);
    info!("Starting reposync v{}", env!("CARGO_PKG_VERSION"));

    let config = match &cli.config {
        Some(path) => match ControllerConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                error!("{}", e);
                return ExitCode::FAILURE;
            }
        },
        None => ControllerConfig::default(),
    };

    let client = match Client::try_default().await {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to create cluster client: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let commits = match GitHubCommitSource::new(&config.commit_source) {
        Ok(commits) => Arc::new(commits),
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let materializer = Materializer::new(
        Arc::new(ClusterDiscovery::new(client.clone())),
        Arc::new(ClusterResourceClient::new(client.clone())),
    );
    let reconciler = Reconciler::new(
        Arc::new(ClusterStore::new(client.clone())),
        commits,
        Arc::new(TemplateResolver::new()),
        materializer,
    )
    .with_target_namespace(config.target_namespace.clone())
    .with_rate_limit_cooldown(config.rate_limit_cooldown);
    let ctx = Arc::new(Context::new(reconciler, &config));

    let api: Api<SyncRepo> = match &cli.namespace {
        Some(namespace) => Api::namespaced(client, namespace),
        None => Api::all(client),
    };

    if cli.once {
        let keys: Vec<_> = match api.list(&ListParams::default()).await {
            Ok(list) => list.items.iter().map(SyncRepo::key).collect(),
            Err(e) => {
                error!("Failed to list sync resources: {}", e);
                return ExitCode::FAILURE;
            }
        };

        let mut failed = false;
        for (key, result) in ctx.run_once(&keys).await {
            match result {
                Ok(reconciled) => match reconciled.outcome {
                    ReconcileOutcome::Materialized { commit, created } => {
                        info!("{}: commit {} created {} resources", key, commit, created.len());
                        for resource in created {
                            info!("  {}", resource);
                        }
                    }
                    ReconcileOutcome::Deferred(reason) => {
                        warn!("{}: {}", key, reason);
                        failed = true;
                    }
                    other => info!("{}: {}", key, other.label()),
                },
                Err(e) => {
                    error!("{}: {}", key, e);
                    failed = true;
                }
            }
        }
        return if failed {
            ExitCode::FAILURE
        } else {
            ExitCode::SUCCESS
        };
    }

    runtime::run(api, ctx, config.workers).await;
    ExitCode::SUCCESS
}
