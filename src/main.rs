use anyhow::Result;
use clap::{Parser, Subcommand};
use scriptwarden::api::types::StartExecutionRequest;
use scriptwarden::client::WardenClient;
use scriptwarden::config::WardenConfig;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_SERVER: &str = "http://127.0.0.1:7410";

#[derive(Parser)]
#[command(
    name = "scriptwarden",
    about = "Coordinator for tracking and cancelling remote script executions",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the coordinator daemon (API server + record sweeper)
    Serve {
        /// Bind address (overrides the config file)
        #[arg(long)]
        bind: Option<String>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Dispatch a script execution into a context
    Exec {
        /// Target context identifier
        #[arg(long)]
        context: String,

        /// Payload template name (see `templates`)
        #[arg(long)]
        template: Option<String>,

        /// Inline script body instead of a template
        #[arg(long)]
        script: Option<String>,

        /// Requested runtime in milliseconds
        #[arg(long, default_value_t = 5000)]
        duration_ms: u64,

        /// Daemon base URL
        #[arg(long, default_value = DEFAULT_SERVER)]
        server: String,
    },

    /// Request termination of a running execution
    Cancel {
        /// Execution id or context id, per the deployment's cancel scope
        identifier: String,

        /// Daemon base URL
        #[arg(long, default_value = DEFAULT_SERVER)]
        server: String,
    },

    /// List tracked executions
    List {
        /// Keep re-polling until interrupted
        #[arg(long)]
        watch: bool,

        /// Poll interval in seconds for --watch
        #[arg(long, default_value_t = 2)]
        interval: u64,

        /// Daemon base URL
        #[arg(long, default_value = DEFAULT_SERVER)]
        server: String,
    },

    /// List available payload templates
    Templates {
        /// Daemon base URL
        #[arg(long, default_value = DEFAULT_SERVER)]
        server: String,
    },
}

fn init_tracing(default_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { bind, config } => {
            let mut config = match config {
                Some(path) => WardenConfig::load(&path)?,
                None => WardenConfig::load_or_default(),
            };
            init_tracing(&config.logging.level);
            if let Some(bind) = bind {
                config.server.listen_address = bind;
            }
            tracing::info!(bind = %config.server.listen_address, "Starting scriptwarden daemon");
            scriptwarden::serve(config).await?;
        }
        Commands::Exec {
            context,
            template,
            script,
            duration_ms,
            server,
        } => {
            init_tracing("warn");
            if template.is_some() == script.is_some() {
                anyhow::bail!("exactly one of --template and --script must be given");
            }
            let client = WardenClient::new(&server)?;
            let started = client
                .start(&StartExecutionRequest {
                    context_id: context,
                    template,
                    script,
                    duration_ms,
                })
                .await?;
            println!(
                "Execution {} started in context '{}'.",
                started.execution_id, started.context_id
            );
        }
        Commands::Cancel { identifier, server } => {
            init_tracing("warn");
            let client = WardenClient::new(&server)?;
            let outcome = client.cancel(&identifier).await?;
            if outcome.executor_acknowledged {
                println!(
                    "Execution {} terminated; executor acknowledged the cancel.",
                    outcome.execution_id
                );
            } else if let Some(error) = outcome.executor_error {
                println!(
                    "Execution {} terminated; cancel not delivered ({}). The script may still be running.",
                    outcome.execution_id, error
                );
            } else {
                println!(
                    "Execution {} terminated; executor had nothing left to stop.",
                    outcome.execution_id
                );
            }
        }
        Commands::List {
            watch,
            interval,
            server,
        } => {
            init_tracing("warn");
            let client = WardenClient::new(&server)?;
            loop {
                let listing = client.list().await?;
                if listing.executions.is_empty() {
                    println!("No executions tracked.");
                } else {
                    println!(
                        "{:<36} | {:<12} | {:<10} | {:<10} | {:>8} | Started",
                        "Execution", "Context", "Status", "Payload", "Ms"
                    );
                    println!(
                        "{:-<36}-|-{:-<12}-|-{:-<10}-|-{:-<10}-|-{:-<8}-|-{:-<8}",
                        "", "", "", "", "", ""
                    );
                    for execution in &listing.executions {
                        println!(
                            "{:<36} | {:<12} | {:<10} | {:<10} | {:>8} | {}",
                            execution.execution_id,
                            execution.context_id,
                            execution.status,
                            execution.payload_label,
                            execution.requested_duration_ms,
                            execution.started_at.format("%H:%M:%S"),
                        );
                    }
                }
                if !watch {
                    break;
                }
                tokio::time::sleep(Duration::from_secs(interval.max(1))).await;
                println!();
            }
        }
        Commands::Templates { server } => {
            init_tracing("warn");
            let client = WardenClient::new(&server)?;
            let listing = client.templates().await?;
            println!("{:<12} | Description", "Template");
            println!("{:-<12}-|-{:-<50}", "", "");
            for template in &listing.templates {
                println!("{:<12} | {}", template.name, template.description);
            }
        }
    }

    Ok(())
}
