use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use formrelay::cache::MemoryCache;
use formrelay::commands;
use formrelay::config::Config;
use formrelay::loader::SchemaLoader;
use formrelay::prelude::*;
use formrelay::{server, store};

#[derive(Parser)]
#[command(name = "formrelay", version, about = "Schema-driven form submission relay", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, short, env = "FORMRELAY_CONFIG", default_value = "/etc/formrelay/config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server
    Serve,
    /// Create the default contact form if it is missing
    Bootstrap {
        /// Recipient of contact form emails
        #[arg(long, env = "FORMRELAY_ADMIN_EMAIL")]
        recipient: String,
    },
    /// Manage form definitions
    Form {
        #[command(subcommand)]
        action: FormCommands,
    },
}

#[derive(Subcommand)]
enum FormCommands {
    /// Create or replace a form from a JSON file
    Import { file: String },
    /// List forms
    List {
        #[arg(long)]
        search: Option<String>,
    },
    /// Delete a form by slug or id
    Delete { form: String },
    /// Print stored submissions of a form as JSON lines
    Submissions { form: String },
}

fn init_tracing(format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if format == "json" {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

async fn open_loader(cfg: &Config) -> Result<SchemaLoader> {
    let store = store::open(&cfg.db_path).await?;
    let cache = Arc::new(MemoryCache::new(Duration::from_secs(cfg.cache.ttl_secs)));
    Ok(SchemaLoader::new(store, cache))
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = Config::from_file(&cli.config)?;
    init_tracing(&cfg.log_format);

    match cli.command {
        Commands::Serve => server::run(cfg).await?,
        Commands::Bootstrap { recipient } => {
            let loader = open_loader(&cfg).await?;
            match commands::bootstrap(&loader, &recipient).await? {
                Some(id) => println!("created contact form {id}"),
                None => println!("contact form already exists"),
            }
        }
        Commands::Form { action } => {
            let loader = open_loader(&cfg).await?;
            match action {
                FormCommands::Import { file } => {
                    let json = std::fs::read_to_string(&file)?;
                    let id = commands::import_form(&loader, &json).await?;
                    println!("saved form {id}");
                }
                FormCommands::List { search } => {
                    for form in commands::list_forms(&loader, search).await? {
                        println!("{}\t{}\t{}", form.id, form.slug, form.title);
                    }
                }
                FormCommands::Delete { form } => {
                    if loader.delete(&form).await? {
                        println!("deleted {form}");
                    } else {
                        anyhow::bail!("form not found: {form}");
                    }
                }
                FormCommands::Submissions { form } => {
                    for record in commands::submissions(&loader, &form).await? {
                        println!("{}", serde_json::to_string(&record)?);
                    }
                }
            }
        }
    }
    Ok(())
}
