use clap::{Parser, Subcommand};
use kove_core::config::DEFAULT_QUERY;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kove")]
#[command(about = "Kove CLI - Check policies, diffs and watch lists offline")]
#[command(version = kove_core::VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate one object against policy sources
    Evaluate {
        /// Policy source file or directory
        #[arg(short, long, required = true)]
        policy: Vec<PathBuf>,
        #[arg(short, long, default_value = DEFAULT_QUERY)]
        query: String,
        /// Object as JSON or YAML
        object: PathBuf,
    },
    /// Diff two revisions of an object and apply the change filter
    Diff {
        old: PathBuf,
        new: PathBuf,
        /// Additional ignorable path, relative to the object root
        #[arg(long = "ignore-path")]
        ignore_paths: Vec<String>,
    },
    /// Compute the watch list from a discovery snapshot
    Select {
        #[arg(short, long)]
        discovery: PathBuf,
        #[arg(short, long)]
        namespace: Option<String>,
        /// Additional kind to ignore
        #[arg(long = "ignore-kind")]
        ignore_kinds: Vec<String>,
        /// Explicit group/version/resource to watch
        #[arg(long = "object")]
        objects: Vec<String>,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Evaluate {
            policy,
            query,
            object,
        } => {
            let violations = kove_cli::evaluate(&policy, &query, &object)?;
            if violations.is_empty() {
                println!("✅ no violations");
            }
            for v in &violations {
                println!(
                    "❌ {} {}/{} ({}): {} {}",
                    v.kind, v.namespace, v.name, v.api_version, v.rule_set, v.data
                );
            }
        }
        Commands::Diff {
            old,
            new,
            ignore_paths,
        } => {
            let report = kove_cli::diff_objects(&old, &new, &ignore_paths)?;
            for line in &report.lines {
                let marker = if line.ignorable { "  (ignored)" } else { "" };
                println!("{}{}", line.entry, marker);
            }
            println!(
                "legitimate change: {}",
                if report.legitimate { "yes" } else { "no" }
            );
        }
        Commands::Select {
            discovery,
            namespace,
            ignore_kinds,
            objects,
        } => {
            let selected =
                kove_cli::select(&discovery, namespace.as_deref(), &ignore_kinds, &objects)?;
            println!("📋 {} resource kinds", selected.len());
            for resource in selected {
                println!("{}", resource);
            }
        }
    }
    Ok(())
}
