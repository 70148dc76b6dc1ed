use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use dpl_runner::{RunHalted, RunOptions, RunReport, Runner};

#[derive(Parser)]
#[command(name = "dpl", version)]
struct Cli {
    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Initialize dpl in the current repo (creates .dpl/, config, journal)
    Init,

    /// Check config, step file, artifacts and accounts
    Doctor,

    /// Run the step file against a network
    Deploy {
        #[arg(long)]
        network: String,
        /// Redeploy this step even if its fingerprint matches (repeatable)
        #[arg(long = "force", value_name = "NAME")]
        force: Vec<String>,
        /// Report what would be deployed or reused without sending anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Show current records and the last run for a network
    Status {
        #[arg(long)]
        network: String,
    },

    /// Resolve every named account on a network
    Accounts {
        #[arg(long)]
        network: String,
    },

    /// Write a single-file address book for a network
    Export {
        #[arg(long)]
        network: String,
        #[arg(long)]
        out: PathBuf,
    },

    /// Every record ever written for a network, oldest first
    History {
        #[arg(long)]
        network: String,
        #[arg(long)]
        artifact: Option<String>,
    },
}

fn print_report(report: &RunReport) {
    let mode = if report.dry_run { " (dry run)" } else { "" };
    println!("Run {} on {}{}: {:?}", report.run_id, report.network, mode, report.state);
    for s in &report.steps {
        let addr = s.address.map(|a| a.to_string()).unwrap_or_else(|| "-".to_string());
        let reason = s.reason.map(|r| format!(" ({})", r.as_str())).unwrap_or_default();
        let placeholder = if s.placeholder_args { " [placeholder args]" } else { "" };
        println!("- {} [{}] {}{}{}", s.name, s.state.as_str(), addr, reason, placeholder);
        if let Some(e) = &s.error {
            println!("    {e}");
        }
    }
    println!("Transactions: {}", report.transactions());
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let repo_root = std::env::current_dir()?;

    match cli.cmd {
        Command::Init => {
            Runner::init_repo(&repo_root)?;
            println!("Initialized dpl in {}", repo_root.display());
        }
        Command::Doctor => {
            let r = Runner::open(repo_root)?;
            r.doctor()?;
            println!("OK");
        }
        Command::Deploy { network, force, dry_run } => {
            let r = Runner::open(repo_root)?;
            let opts = RunOptions { force: force.into_iter().collect(), dry_run };
            match r.deploy(&network, &opts) {
                Ok(report) => {
                    if cli.json {
                        println!("{}", serde_json::to_string_pretty(&report)?);
                    } else {
                        print_report(&report);
                    }
                }
                Err(err) => {
                    if let Some(halted) = err.downcast_ref::<RunHalted>() {
                        if cli.json {
                            println!("{}", serde_json::to_string_pretty(&halted.report)?);
                        } else {
                            print_report(&halted.report);
                        }
                    }
                    return Err(err);
                }
            }
        }
        Command::Status { network } => {
            let r = Runner::open(repo_root)?;
            let status = r.status(&network)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                println!("Network {} (chain {}): {} record(s)", status.network, status.chain_id, status.records.len());
                for rec in &status.records {
                    println!("- {} {} [{}]", rec.name, rec.address, rec.contract);
                }
                match status.last_run {
                    Some(run) => {
                        let failed = run.failed_step.map(|s| format!(" at {s}")).unwrap_or_default();
                        println!("Last run: {} {}{}", run.run_id, run.state.as_str(), failed);
                    }
                    None => println!("Last run: none"),
                }
            }
        }
        Command::Accounts { network } => {
            let r = Runner::open(repo_root)?;
            for (role, resolved) in r.accounts(&network)? {
                match resolved {
                    Ok(addr) => println!("{role}: {addr}"),
                    Err(e) => println!("{role}: error: {e}"),
                }
            }
        }
        Command::Export { network, out } => {
            let r = Runner::open(repo_root)?;
            let book = r.export(&network, &out)?;
            println!("Wrote {} contract(s) to {}", book.contracts.len(), out.display());
        }
        Command::History { network, artifact } => {
            let r = Runner::open(repo_root)?;
            let entries = r.history(&network, artifact.as_deref())?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                for e in entries {
                    let tx = e.record.transaction_hash.as_deref().unwrap_or("-");
                    println!("{} {} {} run={} tx={}", e.record.deployed_at, e.record.name, e.record.address, e.run_id, tx);
                }
            }
        }
    }

    Ok(())
}
