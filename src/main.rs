use anyhow::Context;
use clap::{Parser, Subcommand};
use peermatch::{
    ClusterConfig, EncoderConfig, FilterCondition, MetadataField, MetadataFilter, StorageManager,
    UserProfile,
};
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Match people to compatible peers and peer groups
#[derive(Parser, Debug)]
#[command(name = "peermatch")]
#[command(about = "Profile embeddings, nearest peers and peer groups", long_about = None)]
struct Args {
    /// Path to the data directory
    #[arg(short, long, env = "PEERMATCH_DATA_DIR", default_value = "./data")]
    data_dir: PathBuf,

    /// Interest vocabulary size for a fresh data directory
    #[arg(long, default_value_t = 50)]
    max_interest_features: usize,

    /// Subtract the population mean when scaling embeddings
    #[arg(long)]
    center: bool,

    /// Seed for peer-group clustering
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Log level
    #[arg(long, env = "PEERMATCH_LOG", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fit the encoder on a population and rebuild the index from it
    Calibrate {
        /// JSON array of profiles
        #[arg(long)]
        profiles: PathBuf,
    },
    /// Add profiles using the current calibration
    Add {
        /// JSON array of profiles
        #[arg(long)]
        profiles: PathBuf,
    },
    /// Most similar users to one user
    Nearest {
        #[arg(long)]
        id: String,
        #[arg(short, default_value_t = 5)]
        k: usize,
        /// Only consider users from the same department
        #[arg(long)]
        same_department: bool,
        /// Only consider users from the same institution
        #[arg(long)]
        same_institution: bool,
    },
    /// Partition all users into peer groups
    Cluster {
        #[arg(long, default_value_t = 5)]
        groups: usize,
    },
    /// Show index and calibration state
    Status,
    /// Manage index snapshots
    Snapshot {
        #[command(subcommand)]
        action: SnapshotAction,
    },
}

#[derive(Subcommand, Debug)]
enum SnapshotAction {
    Create,
    List,
    Restore { name: String },
    Delete { name: String },
}

fn read_profiles(path: &Path) -> anyhow::Result<Vec<UserProfile>> {
    let data = std::fs::read(path).with_context(|| format!("reading {:?}", path))?;
    let profiles: Vec<UserProfile> =
        serde_json::from_slice(&data).with_context(|| format!("parsing {:?}", path))?;
    info!("Read {} profiles from {:?}", profiles.len(), path);
    Ok(profiles)
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn neighbour_filter(same_department: bool, same_institution: bool) -> Option<MetadataFilter> {
    let mut conditions = Vec::new();
    if same_department {
        conditions.push(FilterCondition::SameAsTarget(MetadataField::Department));
    }
    if same_institution {
        conditions.push(FilterCondition::SameAsTarget(MetadataField::Institution));
    }
    match conditions.len() {
        0 => None,
        1 => conditions.pop().map(MetadataFilter::new),
        _ => Some(MetadataFilter::new(FilterCondition::And(conditions))),
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Logs go to stderr so stdout stays machine-readable
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting PeerMatch v{}", env!("CARGO_PKG_VERSION"));
    info!("Data directory: {:?}", args.data_dir);

    let encoder_config = EncoderConfig {
        max_interest_features: args.max_interest_features,
        center: args.center,
    };
    let cluster_config = ClusterConfig {
        seed: args.seed,
        ..ClusterConfig::default()
    };
    let storage = StorageManager::with_config(&args.data_dir, encoder_config, cluster_config)?;

    match args.command {
        Command::Calibrate { profiles } => {
            let report = storage.calibrate(&read_profiles(&profiles)?)?;
            print_json(&report)?;
        }
        Command::Add { profiles } => {
            let report = storage.add_profiles(&read_profiles(&profiles)?)?;
            print_json(&report)?;
        }
        Command::Nearest {
            id,
            k,
            same_department,
            same_institution,
        } => {
            let filter = neighbour_filter(same_department, same_institution);
            let results = storage.nearest(
                &id,
                k,
                filter.as_ref().map(|f| f as &dyn peermatch::Filter),
            );
            print_json(&results)?;
        }
        Command::Cluster { groups } => {
            print_json(&storage.cluster_population(groups))?;
        }
        Command::Status => {
            print_json(&storage.status())?;
        }
        Command::Snapshot { action } => match action {
            SnapshotAction::Create => print_json(&storage.create_snapshot()?)?,
            SnapshotAction::List => print_json(&storage.list_snapshots()?)?,
            SnapshotAction::Restore { name } => {
                let users = storage.restore_snapshot(&name)?;
                print_json(&serde_json::json!({ "restored": users }))?;
            }
            SnapshotAction::Delete { name } => {
                let deleted = storage.delete_snapshot(&name)?;
                print_json(&serde_json::json!({ "deleted": deleted }))?;
            }
        },
    }

    Ok(())
}
