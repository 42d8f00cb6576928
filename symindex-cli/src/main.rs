use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::process;
use symindex::{Config, DynamicRecord, Indexer};

/// symindex CLI: maintain and query symlink indices from the command line
#[derive(Parser)]
#[command(name = "symindex", version, about)]
struct Cli {
    /// Configuration file (YAML). Defaults apply when it does not exist.
    #[arg(long, default_value = "symindex.yaml")]
    config: PathBuf,

    /// Output format
    #[arg(long, default_value = "yaml")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Yaml,
    Json,
}

#[derive(clap::Args)]
struct RecordArgs {
    /// Record as a JSON object
    #[arg(long)]
    record: Option<String>,
    /// Field values, applied over --record (e.g. --field mail=a@example.com)
    #[arg(long = "field", value_parser = parse_key_value)]
    fields: Vec<(String, String)>,
}

#[derive(Subcommand)]
enum Command {
    /// Add a record to every index of its type
    Add {
        /// Record type (e.g. accounts.Account)
        #[arg(long = "type")]
        type_name: String,
        #[command(flatten)]
        record: RecordArgs,
    },

    /// Move a record's index entries from its old to its new values
    Update {
        #[arg(long = "type")]
        type_name: String,
        /// Old version of the record as JSON
        #[arg(long)]
        old: String,
        /// New version of the record as JSON
        #[arg(long)]
        new: String,
    },

    /// Remove a record from every index of its type
    Delete {
        #[arg(long = "type")]
        type_name: String,
        #[command(flatten)]
        record: RecordArgs,
    },

    /// Exact lookup on one field
    Find {
        #[arg(long = "type")]
        type_name: String,
        #[arg(long)]
        field: String,
        #[arg(long)]
        value: String,
    },

    /// Glob search on one field (e.g. --pattern 'Mr*')
    Search {
        #[arg(long = "type")]
        type_name: String,
        #[arg(long)]
        field: String,
        #[arg(long)]
        pattern: String,
    },

    /// Resolve an OData filter (e.g. --filter "mail eq 'a@example.com'")
    Query {
        #[arg(long = "type")]
        type_name: String,
        #[arg(long)]
        filter: String,
    },

    /// Delete all declared indices
    Reset,

    /// List indexed fields of a type
    Fields {
        #[arg(long = "type")]
        type_name: String,
    },
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("Invalid key=value pair: no '=' found in '{s}'"))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("ERROR:{e}");
        process::exit(1);
    }
}

fn load_config(path: &Path) -> Result<Config, Box<dyn std::error::Error>> {
    if path.exists() {
        return Ok(Config::from_yaml_file(path)?);
    }
    log::warn!("{} not found, using default configuration", path.display());
    Ok(Config::default())
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(&cli.config)?;
    let indexer = Indexer::from_config(config)?;

    match cli.command {
        Command::Add { type_name, record } => {
            let record = build_record(&type_name, &record)?;
            let results = indexer.add(&record)?;
            let results: Vec<_> = results
                .iter()
                .map(|r| {
                    serde_json::json!({
                        "field": r.field,
                        "locator": r.value,
                        "assigned": r.assigned(),
                    })
                })
                .collect();
            print_output(&serde_json::json!({ "added": results }), &cli.format)?;
        }

        Command::Update { type_name, old, new } => {
            let old = DynamicRecord::from_json(&type_name, &old)?;
            let new = DynamicRecord::from_json(&type_name, &new)?;
            indexer.update(&old, &new)?;
            print_output(&serde_json::json!({ "ok": true }), &cli.format)?;
        }

        Command::Delete { type_name, record } => {
            let record = build_record(&type_name, &record)?;
            indexer.delete(&record)?;
            print_output(&serde_json::json!({ "ok": true }), &cli.format)?;
        }

        Command::Find {
            type_name,
            field,
            value,
        } => {
            let ids = indexer.find_by(&type_name, &field, &value)?;
            print_output(&serde_json::json!(ids), &cli.format)?;
        }

        Command::Search {
            type_name,
            field,
            pattern,
        } => {
            let ids = indexer.find_by_partial(&type_name, &field, &pattern)?;
            print_output(&serde_json::json!(ids), &cli.format)?;
        }

        Command::Query { type_name, filter } => {
            let ids = indexer.query(&type_name, &filter)?;
            print_output(&serde_json::json!(ids), &cli.format)?;
        }

        Command::Reset => {
            indexer.reset()?;
            print_output(&serde_json::json!({ "ok": true }), &cli.format)?;
        }

        Command::Fields { type_name } => {
            let fields = indexer.index_fields(&type_name);
            print_output(&serde_json::json!(fields), &cli.format)?;
        }
    }

    Ok(())
}

fn build_record(
    type_name: &str,
    args: &RecordArgs,
) -> Result<DynamicRecord, Box<dyn std::error::Error>> {
    let mut record = match &args.record {
        Some(json) => DynamicRecord::from_json(type_name, json)?,
        None => DynamicRecord::new(type_name, serde_json::json!({}))?,
    };
    for (key, val) in &args.fields {
        // Numbers and booleans keep their JSON type
        let json_val =
            serde_json::from_str(val).unwrap_or_else(|_| serde_json::Value::String(val.clone()));
        record.set_field(key, json_val);
    }
    Ok(record)
}

fn print_output(
    value: &serde_json::Value,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(value)?),
    }
    Ok(())
}
