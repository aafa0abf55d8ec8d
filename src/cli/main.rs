use clap::{Parser, Subcommand};
use partitioned_index::{IndexConfig, Partition, PartitionedIndex, QueryNode};
use serde_json::json;
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "partitioned-index")]
#[command(about = "Administer a partitioned full-text index", long_about = None)]
struct Cli {
    /// Root folder of the index (defaults to the configured root)
    #[arg(short, long, env = "PARTITIONED_INDEX_ROOT")]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List partitions and their document counts
    List,

    /// Count documents in a partition
    Count {
        #[arg(value_name = "PARTITION")]
        partition: String,

        /// Only count documents of this record type
        #[arg(short = 't', long)]
        record_type: Option<String>,
    },

    /// Verify the checksums of a partition's committed files
    Check {
        #[arg(value_name = "PARTITION")]
        partition: String,
    },

    /// Drop damaged segments from a partition
    Fix {
        #[arg(value_name = "PARTITION")]
        partition: String,
    },

    /// Back up every partition
    Backup {
        #[arg(value_name = "DESTINATION")]
        destination: PathBuf,
    },

    /// Replace every partition with a backup (zip file or folder)
    Restore {
        #[arg(value_name = "SOURCE")]
        source: PathBuf,
    },

    /// Delete every partition
    DeleteAll {
        /// Required, the operation cannot be undone
        #[arg(long)]
        yes: bool,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "partitioned_index=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = IndexConfig::load()?;
    if let Some(root) = cli.root {
        config.root_path = Some(root);
    }
    if config.root_path.is_none() {
        return Err("no index root: pass --root or set root_path in the configuration".into());
    }
    let index = PartitionedIndex::with_config(config)?;

    let output = match cli.command {
        Commands::List => {
            let mut partitions = Vec::new();
            for (name, partition) in index.partitions() {
                partitions.push(json!({
                    "name": name,
                    "documents": partition.count(&QueryNode::MatchAllDocs)?,
                }));
            }
            json!({ "partitions": partitions })
        }

        Commands::Count {
            partition,
            record_type,
        } => {
            let query = match &record_type {
                Some(record_type) => QueryNode::record_type(record_type.as_str()),
                None => QueryNode::MatchAllDocs,
            };
            let count = existing(&index, &partition)?.count(&query)?;
            json!({ "partition": partition, "record_type": record_type, "count": count })
        }

        Commands::Check { partition } => {
            serde_json::to_value(existing(&index, &partition)?.check()?)?
        }

        Commands::Fix { partition } => serde_json::to_value(existing(&index, &partition)?.fix()?)?,

        Commands::Backup { destination } => {
            let partitions = index.backup(&destination)?;
            json!({ "destination": destination, "partitions": partitions })
        }

        Commands::Restore { source } => {
            let partitions = index.restore(&source)?;
            json!({ "source": source, "partitions": partitions })
        }

        Commands::DeleteAll { yes } => {
            if !yes {
                return Err("refusing to delete every partition without --yes".into());
            }
            index.delete_all()?;
            json!({ "deleted": true })
        }
    };

    index.close()?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Partitions named on the command line must already exist
fn existing(index: &PartitionedIndex, name: &str) -> Result<Arc<Partition>, Box<dyn Error>> {
    index
        .get(name)
        .ok_or_else(|| format!("no partition named {:?} under {}", name, index.root().display()).into())
}
