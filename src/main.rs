use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use regtest_pipeline::config::Config;
use regtest_pipeline::orchestration::{FailurePolicy, RunReport, Scheduler, SchedulerConfig};
use regtest_pipeline::{
    plog, plog_warn, CommandNode, Instance, LifecycleOps, LifecycleRegistrar, NodeProcess,
    PipelineGraph, Result,
};

/// Start, stop and clean local regtest nodes as dependency-ordered operations
#[derive(Parser, Debug)]
#[command(name = "regtest-pipeline")]
#[command(version, about, long_about = None)]
#[command(
    after_help = "ENVIRONMENT:\n    REGTEST_PIPELINE_DEBUG=1     Enable debug logging (alternative to --debug)"
)]
pub struct Cli {
    /// Config file (default: ~/.regtest-pipeline/config.toml)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Enable debug logging (writes to ~/.regtest-pipeline/pipeline.log)
    #[arg(short = 'd', long)]
    pub debug: bool,

    /// Node instance as DIR or DIR=SUFFIX; repeat for several instances
    #[arg(short = 'i', long = "instance", value_name = "DIR[=SUFFIX]")]
    pub instances: Vec<Instance>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// List registered operations and their dependencies
    List,

    /// Show the execution order for the given operations without running them
    Plan {
        /// Operation names, e.g. `start stopA cleanA`
        #[arg(required = true)]
        operations: Vec<String>,
    },

    /// Execute the given operations and everything they depend on
    Run {
        /// Operation names, e.g. `start stopA cleanA`
        #[arg(required = true)]
        operations: Vec<String>,

        /// Maximum number of operations executing at once
        #[arg(short = 'j', long)]
        jobs: Option<usize>,

        /// Keep running independent operations after a failure
        #[arg(long = "continue")]
        keep_going: bool,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    regtest_pipeline::log::init(cli.debug);

    match execute(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn execute(cli: Cli) -> Result<ExitCode> {
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let node: Arc<dyn NodeProcess> = Arc::new(CommandNode::new(config.node.clone()));
    let (graph, _) = build_graph(&cli.instances, &config, node)?;

    match cli.command {
        Command::List => {
            print_operations(&graph);
            Ok(ExitCode::SUCCESS)
        }
        Command::Plan { operations } => {
            let targets: Vec<&str> = operations.iter().map(String::as_str).collect();
            for (step, name) in graph.execution_order(&targets)?.into_iter().enumerate() {
                let description = graph.get(name).map(|op| op.describe()).unwrap_or_default();
                println!("{:>3}. {:<20} {}", step + 1, name, description);
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Run {
            operations,
            jobs,
            keep_going,
            json,
        } => {
            let scheduler_config = SchedulerConfig {
                max_parallel: jobs.unwrap_or_else(|| config.effective_max_parallel()),
                policy: if keep_going || config.continue_on_failure {
                    FailurePolicy::Continue
                } else {
                    FailurePolicy::FailFast
                },
            };
            let report = run_operations(graph, scheduler_config, &operations)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }

            match report.into_result() {
                Ok(_) => Ok(ExitCode::SUCCESS),
                Err(e) => {
                    eprintln!("error: {}", e);
                    Ok(ExitCode::FAILURE)
                }
            }
        }
    }
}

/// Register one lifecycle per instance. CLI instances replace configured ones.
fn build_graph(
    cli_instances: &[Instance],
    config: &Config,
    node: Arc<dyn NodeProcess>,
) -> Result<(PipelineGraph, Vec<LifecycleOps>)> {
    let instances = if cli_instances.is_empty() {
        config
            .effective_instances()?
            .into_iter()
            .map(|i| Instance::new(&i.data_dir, &i.suffix))
            .collect::<Result<Vec<_>>>()?
    } else {
        cli_instances.to_vec()
    };

    let registrar = LifecycleRegistrar::new(node).with_label(&config.label);
    let mut graph = PipelineGraph::new();
    let ops = registrar.register_instances(&mut graph, instances)?;
    Ok((graph, ops))
}

fn run_operations(
    graph: PipelineGraph,
    config: SchedulerConfig,
    operations: &[String],
) -> Result<RunReport> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let token = CancellationToken::new();
        let on_interrupt = token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                plog_warn!("Interrupted, no further operations will start");
                on_interrupt.cancel();
            }
        });

        let targets: Vec<&str> = operations.iter().map(String::as_str).collect();
        plog!("Running {:?} with {:?}", targets, config);
        let mut scheduler = Scheduler::new(Arc::new(graph), config).with_cancellation(token);
        scheduler.run(&targets).await
    })
}

fn print_operations(graph: &PipelineGraph) {
    for name in graph.names() {
        let description = graph.get(name).map(|op| op.describe()).unwrap_or_default();
        let deps = graph.dependencies_of(name);
        if deps.is_empty() {
            println!("{:<20} {}", name, description);
        } else {
            println!(
                "{:<20} {} (after {})",
                name,
                description,
                deps.join(", ")
            );
        }
    }
}

fn print_report(report: &RunReport) {
    for outcome in &report.outcomes {
        println!("{:<20} {}", outcome.name, outcome.status);
    }
}
