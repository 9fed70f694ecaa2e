use crate::{
    commands::{Commands, TargetArgs},
    error::CliError,
    output::Inspection,
};
use clap::Parser;
use connectors::sql::{base::query::generator::QueryGenerator, postgres::adapter::PgAdapter};
use engine_core::{partition::PartitionRange, state::sled_store::SledRunTracker};
use engine_processing::upsert::constant::ConstantColumns;
use model::core::data_type::SourceType;
use num_bigint::BigInt;
use std::{collections::BTreeMap, path::PathBuf, str::FromStr};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod commands;
mod error;
mod output;

#[derive(Parser)]
#[command(
    name = "partition-migrator",
    version = "0.1.0",
    about = "Token-partitioned store to SQL migration tool"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::TestConn { target } => {
            let config = target.to_config();
            let adapter = PgAdapter::connect_with(&config).await?;
            let version = adapter.server_version().await?;
            info!(target_db = %config, "Connection succeeded");
            println!("{version}");
        }
        Commands::Inspect {
            target,
            origin_types,
            constants,
            json,
        } => {
            let inspection = inspect(&target, &origin_types, constants).await?;
            output::print_inspection(&inspection, json)?;
        }
        Commands::Split {
            min,
            max,
            parts,
            json,
        } => {
            let ranges = split(&min, &max, parts)?;
            output::print_ranges(&ranges, json)?;
        }
        Commands::Runs {
            run,
            state_dir,
            json,
        } => {
            let path = match state_dir {
                Some(path) => path,
                None => default_state_dir()?,
            };
            let tracker = SledRunTracker::open(&path)?;
            let entries = tracker.list(&run)?;
            output::print_runs(&run, &entries, json)?;
        }
    }

    Ok(())
}

async fn inspect(
    target: &TargetArgs,
    origin_types: &[String],
    constants: Vec<(String, String)>,
) -> Result<Inspection, CliError> {
    // origin types are checked before connecting
    let mappings = origin_types
        .iter()
        .map(|declared| {
            SourceType::parse(declared)
                .map(|origin| {
                    let bind_type = origin.target_bind_type();
                    (origin, bind_type)
                })
                .map_err(CliError::InvalidOriginType)
        })
        .collect::<Result<Vec<_>, _>>()?;

    let config = target.to_config();
    if config.table.is_empty() {
        return Err(CliError::MissingTable);
    }

    let adapter = PgAdapter::connect_with(&config).await?;
    let table = adapter.table_metadata(&config.schema, &config.table).await?;
    let generator = QueryGenerator::new(&table);
    let upsert_sql = generator.upsert()?;
    let lookup_sql = generator.select_by_key();
    let literals = constants.into_iter().collect::<BTreeMap<_, _>>();
    let constants = ConstantColumns::parse(&literals, &table);

    Ok(Inspection {
        table,
        upsert_sql,
        lookup_sql,
        constants,
        mappings,
    })
}

fn split(min: &str, max: &str, parts: usize) -> Result<Vec<PartitionRange>, CliError> {
    let parse = |raw: &str| {
        BigInt::from_str(raw.trim())
            .map_err(|e| CliError::InvalidRange(format!("'{raw}' is not a token: {e}")))
    };
    let (min, max) = (parse(min)?, parse(max)?);
    if min >= max {
        return Err(CliError::InvalidRange(format!(
            "min {min} must be below max {max}"
        )));
    }
    if parts == 0 {
        return Err(CliError::InvalidRange("parts must be at least 1".into()));
    }
    Ok(PartitionRange::split(&min, &max, parts))
}

fn default_state_dir() -> Result<PathBuf, CliError> {
    let home = dirs::home_dir()
        .ok_or_else(|| CliError::Unexpected("Could not determine home directory".into()))?;
    Ok(home.join(".partition-migrator/runs"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_full_ring() {
        let ranges = split("-9223372036854775808", "9223372036854775807", 4).unwrap();
        assert_eq!(ranges.len(), 4);
        assert_eq!(ranges[0].min(), &BigInt::from(i64::MIN));
        assert_eq!(ranges[3].max(), &BigInt::from(i64::MAX));
        for pair in ranges.windows(2) {
            assert_eq!(pair[0].max(), pair[1].min());
        }
    }

    #[test]
    fn test_split_rejects_bad_input() {
        assert!(matches!(split("10", "5", 2), Err(CliError::InvalidRange(_))));
        assert!(matches!(split("0", "10", 0), Err(CliError::InvalidRange(_))));
        assert!(matches!(split("zero", "10", 2), Err(CliError::InvalidRange(_))));
    }
}
