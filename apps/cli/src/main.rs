use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use vss_core::StartDate;
use vss_host_windows::HostScheduler;
use vss_provider::{apply_run, list_storage, load_manifest, plan_run};
use vss_report::create_report_bundle;
use vss_scheduler::TaskScheduler;
use vss_vssadmin::VssAdmin;

/// Reconciles volume shadow copy storage and snapshot schedules.
#[derive(Parser)]
#[command(name = "vss", version)]
struct Cli {
    /// vssadmin executable.
    #[arg(long, env = "VSS_VSSADMIN", default_value = "vssadmin.exe", global = true)]
    vssadmin: PathBuf,

    /// Pretty-print JSON output.
    #[arg(long, global = true)]
    pretty: bool,

    /// More logging (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Errors only.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the current shadow storage records.
    List {
        #[arg(long)]
        drive: Option<String>,
    },
    /// Show what apply would change, without changing anything.
    Plan(ManifestArgs),
    /// Converge every drive in the manifest.
    Apply {
        #[command(flatten)]
        manifest: ManifestArgs,

        /// Write reports/<run-id>/ under this directory.
        #[arg(long)]
        report_base: Option<PathBuf>,
    },
}

#[derive(Args)]
struct ManifestArgs {
    /// YAML or JSON desired-state manifest.
    #[arg(long)]
    manifest: PathBuf,
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        "error"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let text = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", text);
    Ok(())
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    run(&cli, &HostScheduler::connect())
}

fn run<S: TaskScheduler>(cli: &Cli, scheduler: &S) -> Result<ExitCode> {
    let admin = VssAdmin::new(&cli.vssadmin);
    match &cli.command {
        Command::List { drive } => {
            let records = list_storage(&admin, scheduler, drive.as_deref())?;
            print_json(&records, cli.pretty)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Plan(args) => {
            let resources = load_manifest(&args.manifest)?;
            let plans = plan_run(&resources, &admin, scheduler)?;
            print_json(&plans, cli.pretty)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Apply {
            manifest,
            report_base,
        } => {
            let resources = load_manifest(&manifest.manifest)?;
            let summary = apply_run(&resources, &admin, scheduler, StartDate::today())?;
            print_json(&summary, cli.pretty)?;
            if let Some(base) = report_base {
                let report = create_report_bundle(base, &summary.records, Some(serde_json::to_value(&summary)?))
                    .context("write report bundle")?;
                eprintln!("report_root: {}", report.root.display());
            }
            if summary.is_success() {
                Ok(ExitCode::SUCCESS)
            } else {
                eprintln!("{} of {} drives failed", summary.failures(), summary.resources.len());
                Ok(ExitCode::FAILURE)
            }
        }
    }
}
