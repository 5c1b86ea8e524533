//! Tabula Command-Line Tool
//!
//! Loads a model file and prints the DDL that builds it, a listing of its
//! components, or its content hash. Built with the `mysql` feature, `ddl`
//! can also apply the schema to a server.

mod formatter;

use clap::{Parser, Subcommand};
use formatter::OutputFormat;
use std::path::{Path, PathBuf};
use tabula_core::migration::config::{DEFAULT_CHARSET, DEFAULT_ENGINE};
#[cfg(feature = "mysql")]
use tabula_core::migration::MySqlSchema;
use tabula_core::migration::{
    MemorySchema, RelationalConfig, RelationalMigrationHandler, SchemaConnection,
};
use tabula_core::{JsonFileBackend, Kind, NullMigrationHandler, Registry};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Tabula Command-Line Tool
#[derive(Parser, Debug)]
#[command(name = "tabula")]
#[command(version, about = "Inspect Tabula models and generate their schema")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print every statement needed to build a model's schema
    Ddl {
        /// Model file (JSON)
        model: PathBuf,

        /// Apply the schema to this MySQL server instead of an empty
        /// in-memory one (needs the `mysql` feature)
        #[arg(long)]
        database_url: Option<String>,

        /// Drop and recreate the permanent tables
        #[arg(long)]
        reset: bool,

        /// Do not emit foreign keys
        #[arg(long)]
        no_referential_integrity: bool,

        /// Storage engine for generated tables
        #[arg(long, default_value = DEFAULT_ENGINE)]
        engine: String,

        /// Character set for generated tables
        #[arg(long, default_value = DEFAULT_CHARSET)]
        charset: String,
    },

    /// List the components of a model
    List {
        /// Model file (JSON)
        model: PathBuf,

        /// Only list components of this kind
        #[arg(long)]
        kind: Option<Kind>,

        /// Output format
        #[arg(long, default_value = "table", value_enum)]
        format: OutputFormat,
    },

    /// Print the content hash of a model
    Hash {
        /// Model file (JSON)
        model: PathBuf,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tabula=info")),
        )
        .init();

    let args = Args::parse();

    match run(args) {
        Ok(output) => println!("{}", output),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

fn run(args: Args) -> Result<String, Box<dyn std::error::Error>> {
    match args.command {
        Command::Ddl {
            model,
            database_url,
            reset,
            no_referential_integrity,
            engine,
            charset,
        } => {
            let config = relational_config(reset, no_referential_integrity, engine, charset);
            match database_url {
                Some(url) => apply(&model, &url, config),
                None => ddl(&model, config),
            }
        }
        Command::List {
            model,
            kind,
            format,
        } => {
            let registry = Registry::load(&JsonFileBackend::new(model), NullMigrationHandler::new())?;
            Ok(formatter::format_components(
                format,
                &registry.list(kind, true),
            ))
        }
        Command::Hash { model } => {
            let registry = Registry::load(&JsonFileBackend::new(model), NullMigrationHandler::new())?;
            Ok(registry.content_hash().to_string())
        }
    }
}

fn relational_config(
    reset: bool,
    no_referential_integrity: bool,
    engine: String,
    charset: String,
) -> RelationalConfig {
    let mut config = RelationalConfig::new()
        .with_engine(engine)
        .with_charset(charset);
    if reset {
        config = config.with_reset();
    }
    if no_referential_integrity {
        config = config.without_referential_integrity();
    }
    config
}

/// Replay a model file against `conn` and hand the connection back.
fn replay<C: SchemaConnection>(
    model: &Path,
    conn: C,
    config: RelationalConfig,
) -> Result<C, Box<dyn std::error::Error>> {
    let handler = RelationalMigrationHandler::new(conn, config)?;
    let registry = Registry::load(&JsonFileBackend::new(model), handler)?;
    let (_, handler) = registry.into_parts();
    Ok(handler.into_connection())
}

fn script(statements: &[String]) -> String {
    statements
        .iter()
        .map(|s| format!("{s};"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Replay a model file against an empty in-memory schema and collect the
/// statements it ran.
fn ddl(model: &Path, config: RelationalConfig) -> Result<String, Box<dyn std::error::Error>> {
    let schema = replay(model, MemorySchema::new(), config)?;
    info!(statements = schema.statements().len(), "Schema generated");
    Ok(script(schema.statements()))
}

/// Replay a model file against a MySQL server and report what it ran.
#[cfg(feature = "mysql")]
fn apply(
    model: &Path,
    database_url: &str,
    config: RelationalConfig,
) -> Result<String, Box<dyn std::error::Error>> {
    let schema = replay(model, MySqlSchema::connect(database_url)?, config)?;
    info!(statements = schema.statements().len(), "Schema applied");
    Ok(script(schema.statements()))
}

#[cfg(not(feature = "mysql"))]
fn apply(
    _model: &Path,
    _database_url: &str,
    _config: RelationalConfig,
) -> Result<String, Box<dyn std::error::Error>> {
    Err("tabula was built without the `mysql` feature".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabula_core::model::{Attributes, ClassType, FieldType};
    use tempfile::TempDir;

    fn write_model(dir: &TempDir) -> PathBuf {
        let mut registry = Registry::new(NullMigrationHandler::new());
        let class = registry
            .create(Attributes::class("article", ClassType::Entity))
            .unwrap()
            .id();
        let group = registry
            .create(Attributes::field_group("main", class, false))
            .unwrap()
            .id();
        registry
            .create(Attributes::field("title", group, FieldType::string(64)))
            .unwrap();

        let path = dir.path().join("model.json");
        registry.save(&mut JsonFileBackend::new(&path)).unwrap();
        path
    }

    #[test]
    fn test_parse_ddl_args() {
        let args = Args::try_parse_from([
            "tabula",
            "ddl",
            "model.json",
            "--no-referential-integrity",
            "--engine",
            "MyISAM",
        ])
        .unwrap();

        let Command::Ddl {
            no_referential_integrity,
            engine,
            charset,
            reset,
            ..
        } = args.command
        else {
            panic!("expected ddl command");
        };
        let config = relational_config(reset, no_referential_integrity, engine, charset);
        assert_eq!(config.engine, "MyISAM");
        assert_eq!(config.charset, "utf8mb4");
        assert!(!config.referential_integrity);
        assert!(!config.reset);
    }

    #[test]
    fn test_parse_list_kind() {
        let args =
            Args::try_parse_from(["tabula", "list", "model.json", "--kind", "field"]).unwrap();
        assert!(matches!(
            args.command,
            Command::List {
                kind: Some(Kind::Field),
                format: OutputFormat::Table,
                ..
            }
        ));
    }

    #[test]
    fn test_ddl_output() {
        let dir = TempDir::new().unwrap();
        let path = write_model(&dir);

        let output = ddl(&path, RelationalConfig::default()).unwrap();
        assert!(output.starts_with("CREATE TABLE IF NOT EXISTS `object`"));
        assert!(output.contains("CREATE TABLE `article`"));
        assert!(output.contains("ALTER TABLE `article` ADD COLUMN `title` VARCHAR(64) NOT NULL;"));
    }

    #[cfg(not(feature = "mysql"))]
    #[test]
    fn test_database_url_needs_mysql_feature() {
        let dir = TempDir::new().unwrap();
        let path = write_model(&dir);

        let args = Args::try_parse_from([
            "tabula",
            "ddl",
            path.to_str().unwrap(),
            "--database-url",
            "mysql://localhost/tabula",
        ])
        .unwrap();
        let err = run(args).unwrap_err();
        assert!(err.to_string().contains("mysql"));
    }

    #[test]
    fn test_hash_matches_saved_model() {
        let dir = TempDir::new().unwrap();
        let path = write_model(&dir);

        let output = run(Args {
            command: Command::Hash { model: path },
        })
        .unwrap();
        assert_eq!(output.len(), 64);
    }
}
