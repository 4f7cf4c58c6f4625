//! oxide-reconcile CLI
//!
//! Command-line tool for diffing declared models against a database and
//! managing migrations.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use oxide_reconcile::prelude::*;

/// Schema reconciliation and migrations for SQLite, PostgreSQL and MySQL.
#[derive(Parser)]
#[command(name = "oxide-reconcile")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database URL; the scheme selects the dialect.
    #[arg(short, long, env = "DATABASE_URL", default_value = "sqlite:db.sqlite3?mode=rwc")]
    database: String,

    /// Migrations directory.
    #[arg(short, long, env = "MIGRATIONS_DIR", default_value = "migrations")]
    migrations_dir: PathBuf,

    /// Name of the tracking table; must start with `_`.
    #[arg(long, default_value = DEFAULT_TABLE, value_parser = parse_table)]
    table: String,

    /// Maximum pool connections.
    #[arg(long, default_value_t = 5)]
    max_connections: u32,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the tracking table.
    Init,

    /// Show migration status.
    Status {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Apply pending migrations.
    Migrate {
        /// Show SQL without executing.
        #[arg(long)]
        dry_run: bool,
    },

    /// Roll back the last applied migration.
    Rollback {
        /// Roll back every applied migration.
        #[arg(long, conflicts_with = "to")]
        all: bool,

        /// Roll back down to this id (it stays applied).
        #[arg(long)]
        to: Option<i64>,
    },

    /// Show the differences between declared models and the database.
    Diff {
        /// JSON file of model declarations.
        #[arg(long, default_value = "models.json")]
        models: PathBuf,

        /// Print the operations as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Generate the next migration file from model differences.
    #[command(name = "makemigrations")]
    MakeMigrations {
        /// JSON file of model declarations.
        #[arg(long, default_value = "models.json")]
        models: PathBuf,

        /// Migration name/description.
        #[arg(short, long, default_value = "auto")]
        name: String,

        /// Output format.
        #[arg(long, value_enum, default_value_t = Format::Sql)]
        format: Format,

        /// Create an empty migration file.
        #[arg(long)]
        empty: bool,

        /// Print the file without writing it.
        #[arg(long)]
        dry_run: bool,
    },

    /// Show SQL for one migration without executing it.
    Sql {
        /// Migration id.
        id: i64,

        /// Show rollback SQL instead of forward SQL.
        #[arg(short, long)]
        reverse: bool,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    /// `.sql` file with `-- migrate:up` / `-- migrate:down` sections.
    Sql,
    /// Rust module with `up` and `down` functions.
    Rust,
}

impl Format {
    fn extension(self) -> &'static str {
        match self {
            Self::Sql => "sql",
            Self::Rust => "rs",
        }
    }
}

fn parse_table(table: &str) -> std::result::Result<String, String> {
    validate_table_name(table)
        .map(|()| table.to_string())
        .map_err(|e| e.to_string())
}

/// Loads `.sql` migrations; a missing directory yields an empty registry.
/// Rust migrations are skipped since only the embedding application can
/// register them.
fn load_registry(dir: &Path) -> Result<MigrationRegistry> {
    let mut registry = MigrationRegistry::new();
    if dir.is_dir() {
        let loaded = registry.load_sql_files(dir)?;
        info!(dir = %dir.display(), loaded, "Loaded migrations");
    } else {
        warn!(dir = %dir.display(), "Migrations directory not found");
    }
    Ok(registry)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let db = SqlxAdapter::connect(&cli.database, cli.max_connections).await?;
    let dialect = db.dialect();
    let options = RunnerOptions {
        table: cli.table.clone(),
    };

    match cli.command {
        Commands::Init => {
            info!("Initializing migrations system...");
            let runner = MigrationRunner::new(&db, MigrationRegistry::new()).with_options(options);
            runner.applied().await?;
            info!(table = %cli.table, "Migrations table created successfully.");
        }

        Commands::Status { json } => {
            let registry = load_registry(&cli.migrations_dir)?;
            let runner = MigrationRunner::new(&db, registry).with_options(options);
            let statuses = runner.status().await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&statuses)?);
            } else if statuses.is_empty() {
                info!("No migrations found.");
            } else {
                println!("\nMigrations:");
                println!("{:-<60}", "");
                for status in &statuses {
                    let mark = if status.applied { "X" } else { " " };
                    let applied_at = status
                        .applied_at
                        .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
                        .unwrap_or_default();
                    let missing = if status.filename.is_none() {
                        " (not registered)"
                    } else {
                        ""
                    };
                    println!(
                        " [{mark}] {:04} {}{missing} {applied_at}",
                        status.id, status.name
                    );
                }
                println!();
            }
        }

        Commands::Migrate { dry_run } => {
            let registry = load_registry(&cli.migrations_dir)?;
            let runner = MigrationRunner::new(&db, registry).with_options(options);

            if dry_run {
                info!("Dry run mode - SQL will be printed but not executed.");
                for record in runner.pending().await? {
                    println!("-- {:04} {}", record.id, record.name);
                    for sql in runner.sql_for(record.id, Direction::Up)? {
                        println!("{sql};");
                    }
                }
            } else {
                let applied = runner.up().await?;
                info!(count = applied.len(), "Migrations applied");
            }
        }

        Commands::Rollback { all, to } => {
            let registry = load_registry(&cli.migrations_dir)?;
            let runner = MigrationRunner::new(&db, registry).with_options(options);

            let rolled_back = match (all, to) {
                (true, _) => runner.down_all().await?,
                (false, Some(target)) => runner.down_to(target).await?,
                (false, None) => runner.down().await?.into_iter().collect(),
            };
            for record in &rolled_back {
                info!(id = record.id, name = %record.name, "Rolled back");
            }
        }

        Commands::Diff { models, json } => {
            let models = load_models(&models)?;
            let live = introspect_schema(&db, &models).await?;
            let ops = diff_schema(&models, &live, dialect);

            if json {
                println!("{}", serde_json::to_string_pretty(&ops)?);
            } else if ops.is_empty() {
                info!("No changes detected.");
            } else {
                for op in &ops {
                    let marker = if op.is_destructive() { "!" } else { " " };
                    println!(" {marker} {}", op.describe());
                }
            }
        }

        Commands::MakeMigrations {
            models,
            name,
            format,
            empty,
            dry_run,
        } => {
            let sql = if empty {
                MigrationSql::default()
            } else {
                let models = load_models(&models)?;
                let live = introspect_schema(&db, &models).await?;
                let ops = diff_schema(&models, &live, dialect);
                if ops.is_empty() {
                    info!("No changes detected.");
                    return Ok(());
                }
                for op in ops.iter().filter(|op| op.is_destructive()) {
                    warn!(operation = %op.describe(), "Destructive operation");
                }
                generate_migration_sql(&ops, dialect)
            };

            let existing = if cli.migrations_dir.is_dir() {
                discover_migrations(&cli.migrations_dir)?
            } else {
                Vec::new()
            };
            let filename = next_migration_filename(&existing, &name, format.extension());
            let contents = match format {
                Format::Sql => generate_sql_migration_file(&sql.up, &sql.down),
                Format::Rust => generate_migration_file(&sql.up, &sql.down),
            };

            if dry_run {
                println!("Would create migration: {filename}");
                println!("\n{contents}");
            } else {
                std::fs::create_dir_all(&cli.migrations_dir)?;
                let file_path = cli.migrations_dir.join(&filename);
                std::fs::write(&file_path, contents)?;
                info!("Created migration: {}", file_path.display());
                if format == Format::Rust {
                    info!("Register it with MigrationRegistry::add; the CLI only runs .sql files.");
                }
            }
        }

        Commands::Sql { id, reverse } => {
            let registry = load_registry(&cli.migrations_dir)?;
            let runner = MigrationRunner::new(&db, registry).with_options(options);
            let direction = if reverse { Direction::Down } else { Direction::Up };
            for sql in runner.sql_for(id, direction)? {
                println!("{sql};");
            }
        }
    }

    Ok(())
}
