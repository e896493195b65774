use anyhow::Context;
use clap::Parser;
use status_bridge::bridge::StatusBridge;
use status_bridge::model::StatusModel;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Builder as TokioBuilder;
use tokio::signal;
use workflow::config::WorkflowConfig;
use workflow::runner::Runner;

mod generator;
mod status_bridge;
mod workflow;

#[derive(Parser)]
#[command(author, version, about = "Synthetic scan driver for the plot extraction chain")]
struct Args {
    /// Run the configured scenario once and print a summary
    #[arg(long, default_value_t = false)]
    offline: bool,
    /// Load a workflow config from YAML
    #[arg(long)]
    workflow: Option<PathBuf>,
    #[arg(long, default_value_t = 8)]
    scans: u32,
    #[arg(long, default_value_t = 1024)]
    azimuths: u32,
    #[arg(long, default_value_t = 512)]
    gates: usize,
    #[arg(long, default_value_t = 0)]
    seed: u64,
    /// Write the offline result as JSON
    #[arg(long)]
    report: Option<PathBuf>,
    /// Keep the status bridge alive until Ctrl+C
    #[arg(long, default_value_t = false)]
    serve: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let workflow_config = if let Some(path) = args.workflow {
        WorkflowConfig::load(path)?
    } else {
        WorkflowConfig::from_args(args.scans, args.azimuths, args.gates, args.seed)
    };

    let runner = Runner::new(workflow_config.clone());
    let status_bridge = StatusBridge::new(Arc::new(runner.clone()));

    if args.offline {
        let result = runner.execute()?;

        println!(
            "Offline run -> PRIs {}, points {}, confirmed tracks {:?}, initiations {}",
            result.pri_count,
            result.point_count,
            result.confirmed_tracks(),
            result.initiations.len()
        );

        if let Some(report_path) = args.report.as_ref() {
            if let Some(parent) = report_path.parent() {
                fs::create_dir_all(parent)?;
            }
            let report =
                serde_json::to_string_pretty(&result).context("serializing offline report")?;
            fs::write(report_path, report)
                .with_context(|| format!("writing report {}", report_path.display()))?;
        }

        status_bridge.publish(StatusModel::from(result));
        status_bridge.publish_status("Offline workflow results ready.");
    }
    if args.serve {
        let _server = status_bridge.serve(workflow_config.bind);
        status_bridge.publish_status("HTTP bridge running (Ctrl+C to stop)...");
        let runtime = TokioBuilder::new_current_thread()
            .enable_all()
            .build()
            .context("creating runtime for signal handling")?;
        runtime.block_on(async {
            signal::ctrl_c().await.context("awaiting Ctrl+C to exit")?;
            Ok::<(), anyhow::Error>(())
        })?;
    }

    Ok(())
}
