mod output;
mod runtime;

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use runtime::{Runtime, parse_env, parse_variables, read_scripts, registry};
use std::path::PathBuf;
use svcflow_cloud::{Csp, DeployerKind, StateParser};
use svcflow_config::Config;
use svcflow_deployer::{CorrelationId, DeployerResult};
use svcflow_lifecycle::{
    Disposition, MigrationTarget, OrderRequest, Registration, TaskType, TemplateRef,
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "svcflowd")]
#[command(about = "Lifecycle engine for terraform/OpenTofu managed services", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct OrderArgs {
    service_id: String,
    /// Input variable (KEY=VALUE, JSON values keep their type)
    #[arg(long = "var", value_name = "KEY=VALUE")]
    vars: Vec<String>,
    /// Environment variable for the deployer process
    #[arg(long = "env", value_name = "KEY=VALUE")]
    env: Vec<String>,
    /// Return once dispatched instead of waiting for the result
    #[arg(long)]
    no_wait: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the resource mapping table of a CSP
    Mappings {
        #[arg(long)]
        csp: Csp,
    },
    /// Parse a deployer state file into canonical resources
    Parse {
        #[arg(long)]
        csp: Csp,
        state_file: PathBuf,
    },
    /// Register a service instance
    Register {
        #[arg(long)]
        service_id: String,
        #[arg(long)]
        csp: Csp,
        /// Defaults to deployer.kind_default
        #[arg(long)]
        deployer: Option<DeployerKind>,
        /// Directory holding the script set
        #[arg(long)]
        scripts: PathBuf,
        #[arg(long, default_value = "custom")]
        template: String,
        #[arg(long, default_value = "1.0.0")]
        template_version: String,
        #[arg(long = "var", value_name = "KEY=VALUE")]
        vars: Vec<String>,
    },
    /// Deploy a registered service
    Deploy(OrderArgs),
    /// Re-apply a deployed service with new variables
    Modify(OrderArgs),
    /// Destroy a service
    Destroy(OrderArgs),
    /// Operator destroy, accepted from any settled state
    Purge(OrderArgs),
    /// Move a service to another CSP
    Migrate {
        #[command(flatten)]
        order: OrderArgs,
        #[arg(long)]
        csp: Csp,
        /// Defaults to the service's current deployer
        #[arg(long)]
        deployer: Option<DeployerKind>,
        #[arg(long)]
        scripts: PathBuf,
    },
    /// Dry-run the service's scripts
    Plan { service_id: String },
    /// Show state, inventory and orders of a service
    Status { service_id: String },
    /// Deliver a deployer webhook payload
    Callback {
        correlation_id: CorrelationId,
        payload: PathBuf,
        #[arg(long)]
        no_wait: bool,
    },
}

fn init_tracing(config: &Config) {
    let json = config.log.json;
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log.filter)),
        )
        .with(json.then(|| fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| fmt::layer().with_writer(std::io::stderr)))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load()?;
    init_tracing(&config);

    match cli.command {
        Commands::Mappings { csp } => {
            let registry = registry()?;
            output::mapping_table(registry.resolve(csp)?.mapping_table());
        }
        Commands::Parse { csp, state_file } => {
            let registry = registry()?;
            let raw = std::fs::read_to_string(&state_file)
                .with_context(|| format!("reading {}", state_file.display()))?;
            let parsed = StateParser::new(&registry).parse(csp, &raw)?;
            output::parsed(&parsed);
        }
        Commands::Register {
            service_id,
            csp,
            deployer,
            scripts,
            template,
            template_version,
            vars,
        } => {
            let deployer = match deployer {
                Some(deployer) => deployer,
                None => config.deployer.kind_default.parse()?,
            };
            let rt = Runtime::start(&config).await?;
            let instance = rt
                .coordinator
                .register(Registration {
                    service_id,
                    template: TemplateRef::new(template, template_version),
                    csp,
                    deployer,
                    scripts: read_scripts(&scripts)?,
                    variables: parse_variables(&vars)?,
                })
                .await?;
            println!(
                "{} {} {}",
                "✓".green().bold(),
                instance.service_id.bold(),
                output::state(instance.state)
            );
            rt.shutdown();
        }
        Commands::Deploy(args) => run_order(&config, TaskType::Deploy, args, None).await?,
        Commands::Modify(args) => run_order(&config, TaskType::Modify, args, None).await?,
        Commands::Destroy(args) => run_order(&config, TaskType::Destroy, args, None).await?,
        Commands::Purge(args) => run_order(&config, TaskType::Purge, args, None).await?,
        Commands::Migrate {
            order,
            csp,
            deployer,
            scripts,
        } => {
            let target = (csp, deployer, read_scripts(&scripts)?);
            run_order(&config, TaskType::Migrate, order, Some(target)).await?;
        }
        Commands::Plan { service_id } => {
            let rt = Runtime::start(&config).await?;
            let outcome = rt.coordinator.plan(&service_id).await?;
            output::outcome(&outcome);
            rt.shutdown();
            anyhow::ensure!(outcome.is_success(), "plan failed");
        }
        Commands::Status { service_id } => {
            let rt = Runtime::start(&config).await?;
            let instance = rt.coordinator.instance(&service_id).await?;
            let orders = rt.coordinator.orders_of(&service_id).await?;
            output::instance(&instance, &orders);
            rt.shutdown();
        }
        Commands::Callback {
            correlation_id,
            payload,
            no_wait,
        } => {
            let raw = std::fs::read_to_string(&payload)
                .with_context(|| format!("reading {}", payload.display()))?;
            let outcome = DeployerResult::from_json(&raw)?.into_outcome();

            let rt = Runtime::start(&config).await?;
            let disposition = rt.coordinator.on_callback(correlation_id, outcome).await?;
            match disposition {
                Disposition::Applied => println!("{} callback applied", "✓".green().bold()),
                Disposition::Unknown => println!("{} unknown correlation id", "-".dimmed()),
                Disposition::Stale => println!("{} callback already settled", "-".dimmed()),
            }

            if disposition == Disposition::Applied && !no_wait {
                // rollback or next migration phase may have been dispatched
                if let Some(order) = rt.coordinator.order_for(correlation_id).await? {
                    rt.wait_idle(&order.service_id, order.order_id).await?;
                    let instance = rt.coordinator.instance(&order.service_id).await?;
                    println!("{} {}", instance.service_id.bold(), output::state(instance.state));
                }
            }
            rt.shutdown();
        }
    }

    Ok(())
}

async fn run_order(
    config: &Config,
    task: TaskType,
    args: OrderArgs,
    migration: Option<(Csp, Option<DeployerKind>, std::collections::BTreeMap<String, String>)>,
) -> anyhow::Result<()> {
    let rt = Runtime::start(config).await?;
    let variables = parse_variables(&args.vars)?;

    let mut request = OrderRequest::new();
    request.variables = variables.clone();
    request.env = parse_env(&args.env)?;
    if let Some((csp, deployer, scripts)) = migration {
        let current = rt.coordinator.instance(&args.service_id).await?;
        request = request.with_migration(MigrationTarget {
            csp,
            deployer: deployer.unwrap_or(current.deployer),
            scripts,
            variables,
        });
    }

    let order_id = rt
        .coordinator
        .execute(&args.service_id, task, request)
        .await?;
    println!("{} {} order {}", "→".cyan(), task, order_id);

    if !args.no_wait {
        rt.wait_idle(&args.service_id, order_id).await?;
        let instance = rt.coordinator.instance(&args.service_id).await?;
        let order = rt.coordinator.order(order_id).await?;
        println!(
            "{} {}",
            instance.service_id.bold(),
            output::state(instance.state)
        );
        if let Some(reason) = &order.failure {
            println!("  {} {}", "reason:".red(), reason);
        }
    }

    rt.shutdown();
    Ok(())
}
