// ABOUTME: function-launcher binary.
// ABOUTME: Loads the catalog, connects to the broker and serves calls until Ctrl-C or SIGTERM.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::signal;

use function_launcher::config::{DEFAULT_CLUSTER_ID, DEFAULT_GRPC_HOST};
use function_launcher::session::generate_function_signature;
use function_launcher::{
    catalog, connect_with_retry, BrokerConfig, FunctionMode, GrpcSessionFactory, HttpExecutor,
    LoopSettings,
};

#[derive(Parser)]
#[command(name = "function-launcher")]
#[command(about = "Offers catalog functions to the function broker and starts them on request")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    broker: BrokerArgs,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(long, env = "LOG_OUTPUT_LEVEL", global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the function catalog (default)
    Run(RunArgs),
    /// Request a new function id and signature from the broker
    Signature,
}

#[derive(Args)]
struct BrokerArgs {
    /// Broker host, `host[:port]` or a full URL
    #[arg(long, env = "OPENOBD_GRPC_HOST", default_value = DEFAULT_GRPC_HOST, global = true)]
    grpc_host: String,

    /// Cluster to authenticate against
    #[arg(long, env = "OPENOBD_CLUSTER_ID", default_value = DEFAULT_CLUSTER_ID, global = true)]
    cluster_id: String,

    /// Partner client id
    #[arg(long, env = "OPENOBD_PARTNER_CLIENT_ID", global = true)]
    client_id: Option<String>,

    /// Partner client secret
    #[arg(long, env = "OPENOBD_PARTNER_CLIENT_SECRET", hide_env_values = true, global = true)]
    client_secret: Option<String>,

    /// Any value switches to plaintext gRPC
    #[arg(long, env = "DEV_MODE", global = true)]
    dev_mode: Option<String>,
}

#[derive(Args)]
struct RunArgs {
    /// Function catalog JSON
    #[arg(long, env = "FUNCTIONS_FILE_LOCATION")]
    functions_file: Option<PathBuf>,

    /// Skip functions below this mode
    #[arg(long, env = "FUNCTIONS_MINIMUM_MODE")]
    minimum_mode: Option<String>,

    /// Base URL of the execution backend
    #[arg(long, env = "OPENOBD_EXECUTOR_HOST")]
    executor_host: Option<String>,

    /// Connect and reconnect attempts; also the shutdown grace period in seconds
    #[arg(long, env = "LAUNCHER_MAX_ATTEMPTS", default_value_t = 10)]
    max_attempts: u32,
}

impl BrokerArgs {
    fn to_config(&self) -> Result<BrokerConfig> {
        let Some(client_id) = self.client_id.clone() else {
            bail!("OPENOBD_PARTNER_CLIENT_ID is not set");
        };
        let Some(client_secret) = self.client_secret.clone() else {
            bail!("OPENOBD_PARTNER_CLIENT_SECRET is not set");
        };
        Ok(BrokerConfig::new(client_id, client_secret)
            .with_host(self.grpc_host.clone())
            .with_cluster_id(self.cluster_id.clone())
            .with_insecure(self.dev_mode.is_some()))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    launcher_log::init_with_level(cli.log_level.as_deref());

    let broker = cli.broker.to_config()?;
    match cli.command {
        Some(Commands::Signature) => signature(&broker).await,
        Some(Commands::Run(args)) => run(broker, args).await,
        // Without a subcommand the run settings come from the environment alone
        None => run(broker, RunArgs::from_env()?).await,
    }
}

impl RunArgs {
    fn from_env() -> Result<Self> {
        #[derive(Parser)]
        struct EnvOnly {
            #[command(flatten)]
            run: RunArgs,
        }
        let parsed = EnvOnly::try_parse_from(["function-launcher"])
            .context("invalid run settings in the environment")?;
        Ok(parsed.run)
    }
}

async fn run(broker: BrokerConfig, args: RunArgs) -> Result<()> {
    let Some(functions_file) = args.functions_file else {
        bail!("FUNCTIONS_FILE_LOCATION is not set");
    };
    let Some(executor_host) = args.executor_host else {
        bail!("OPENOBD_EXECUTOR_HOST is not set");
    };

    let minimum = FunctionMode::minimum_from(args.minimum_mode.as_deref());
    let functions = catalog::load(&functions_file, minimum)
        .with_context(|| format!("loading {}", functions_file.display()))?;
    if functions.is_empty() {
        tracing::warn!("No functions to offer");
    }

    let executor = HttpExecutor::new(executor_host)?;
    let settings = LoopSettings::default().with_max_reconnect_attempts(args.max_attempts);

    tracing::info!(endpoint = %broker.endpoint_url(), cluster_id = %broker.cluster_id, "Connecting to function broker");
    let factory = GrpcSessionFactory::new(broker);
    let launcher = connect_with_retry(factory, executor, functions, settings, args.max_attempts)
        .await
        .context("could not connect to the function broker")?;

    let handle = launcher.handle();
    let mut task = tokio::spawn(launcher.run());

    tokio::select! {
        result = &mut task => {
            return result
                .context("launcher task failed")?
                .context("launcher stopped");
        }
        _ = shutdown_signal() => {}
    }

    handle.request_shutdown();
    let grace = u64::from(args.max_attempts);
    for waited in 0..grace {
        if !handle.is_running() {
            break;
        }
        tracing::info!(waited_secs = waited, grace_secs = grace, "Waiting for launcher to stop");
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    if handle.is_running() {
        tracing::error!("Launcher did not stop in time, forcing shutdown");
        std::process::exit(1);
    }

    task.await
        .context("launcher task failed")?
        .context("launcher stopped")
}

async fn signature(broker: &BrokerConfig) -> Result<()> {
    let signature = generate_function_signature(broker)
        .await
        .context("could not generate a function signature")?;
    println!("id:        {}", signature.id);
    println!("signature: {}", signature.signature);
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
