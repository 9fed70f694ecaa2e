use crate::error::CliError;
use connectors::sql::base::metadata::table::TableMetadata;
use engine_core::{partition::PartitionRange, state::models::RunEntry};
use engine_processing::upsert::constant::ConstantColumns;
use model::core::data_type::{BindType, SourceType};
use serde_json::json;

/// Everything `inspect` found out about the target table.
pub struct Inspection {
    pub table: TableMetadata,
    pub upsert_sql: String,
    pub lookup_sql: String,
    pub constants: ConstantColumns,
    pub mappings: Vec<(SourceType, BindType)>,
}

pub fn print_inspection(inspection: &Inspection, as_json: bool) -> Result<(), CliError> {
    let table = &inspection.table;

    if as_json {
        let columns = table
            .columns
            .iter()
            .map(|c| {
                json!({
                    "name": c.name,
                    "ordinal": c.ordinal,
                    "type": c.type_name,
                    "bind_type": c.data_type.to_string(),
                    "nullable": c.is_nullable,
                    "primary_key": c.is_primary_key,
                    "constant": inspection.constants.get(&c.name).map(ToString::to_string),
                })
            })
            .collect::<Vec<_>>();
        let mappings = inspection
            .mappings
            .iter()
            .map(|(origin, target)| json!({ "origin": origin.to_string(), "target": target.to_string() }))
            .collect::<Vec<_>>();

        let report = json!({
            "table": table.qualified_name(),
            "primary_key": table.primary_keys,
            "columns": columns,
            "upsert_sql": inspection.upsert_sql,
            "lookup_sql": inspection.lookup_sql,
            "type_mappings": mappings,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Table {}", table.qualified_name());
    println!("Primary key: ({})", table.primary_keys.join(", "));
    println!("-----------------------------");
    println!("{:<4} {:<28} {:<28} {:<9} {}", "#", "Column", "Type", "Nullable", "Constant");
    for column in &table.columns {
        let constant = inspection
            .constants
            .get(&column.name)
            .map(ToString::to_string)
            .unwrap_or_default();
        let marker = if column.is_primary_key { "*" } else { "" };
        println!(
            "{:<4} {:<28} {:<28} {:<9} {}",
            column.ordinal,
            format!("{}{marker}", column.name),
            column.type_name,
            column.is_nullable,
            constant
        );
    }

    println!();
    println!("Upsert:\n  {}", inspection.upsert_sql);
    println!("Lookup:\n  {}", inspection.lookup_sql);

    if !inspection.mappings.is_empty() {
        println!();
        println!("{:<32} {}", "Origin type", "Target type");
        for (origin, target) in &inspection.mappings {
            println!("{:<32} {}", origin.to_string(), target.postgres_name());
        }
    }
    Ok(())
}

pub fn print_ranges(ranges: &[PartitionRange], as_json: bool) -> Result<(), CliError> {
    if as_json {
        let ranges = ranges
            .iter()
            .map(|r| json!({ "min": r.min().to_string(), "max": r.max().to_string() }))
            .collect::<Vec<_>>();
        println!("{}", serde_json::to_string_pretty(&ranges)?);
    } else {
        for range in ranges {
            println!("{range}");
        }
    }
    Ok(())
}

pub fn print_runs(run: &str, entries: &[RunEntry], as_json: bool) -> Result<(), CliError> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No partitions tracked for run '{run}'");
        return Ok(());
    }

    println!("Partitions of run '{run}':");
    println!("-----------------------------");
    println!("{:<24} {:<8} {:<26} {}", "Partition", "Status", "Updated", "Counters");
    for entry in entries {
        println!(
            "{:<24} {:<8} {:<26} {}",
            entry.partition_key,
            entry.status.to_string(),
            entry.updated_at.to_rfc3339(),
            entry.snapshot
        );
    }
    Ok(())
}
