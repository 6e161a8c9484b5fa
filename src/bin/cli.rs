use std::io::Write;
use blobdb::backend::{Document, FieldMatch, FileBackend, Filter};
use blobdb::config::PATH_ENV;
use blobdb::engine::TransactionalStore;
use blobdb::query::{Keyed, SortDirection};
use blobdb::{BlobStore, StoreConfig};
use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Root directory of the store
    #[arg(short, long, env = PATH_ENV, default_value = "data")]
    path: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Clone)]
enum Commands {
    Put { key: String, value: String },
    Get { key: String },
    Del { key: String },
    Has { key: String },
    List,
    Insert {
        collection: String,
        json: String,
        #[arg(short, long)]
        key: Option<String>,
    },
    Find {
        collection: String,
        /// FIELD=VALUE clauses, all of which must match
        clauses: Vec<String>,
        #[arg(short, long)]
        sort: Option<String>,
        #[arg(long)]
        desc: bool,
    },
    Remove {
        collection: String,
        clauses: Vec<String>,
    },
}

fn parse_filter(clauses: &[String]) -> anyhow::Result<Filter> {
    let mut filter = Filter::new();
    for clause in clauses {
        let m = FieldMatch::parse(clause).ok_or_else(|| anyhow::anyhow!("expected FIELD=VALUE, got {:?}", clause))?;
        filter.clauses.push(m);
    }
    Ok(filter)
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let config = StoreConfig::new(&cli.path);

    match cli.command {
        Commands::Put { key, value } => {
            let mut store = TransactionalStore::new(&config)?;
            store.begin();
            store.store(&key, value.as_bytes())?;
            store.commit()?;
            println!("OK");
        }
        Commands::Get { key } => {
            let store = TransactionalStore::new(&config)?;
            std::io::stdout().write_all(&store.get(&key)?)?;
            println!();
        }
        Commands::Del { key } => {
            let mut store = TransactionalStore::new(&config)?;
            store.begin();
            store.delete(&key)?;
            store.commit()?;
            println!("OK");
        }
        Commands::Has { key } => {
            let store = TransactionalStore::new(&config)?;
            println!("{}", store.has(&key)?);
        }
        Commands::List => {
            let store = TransactionalStore::new(&config)?;
            for key in store.keys()? {
                println!("{}", key);
            }
        }
        Commands::Insert { collection, json, key } => {
            let backend = FileBackend::new(config)?;
            let value: Value = serde_json::from_str(&json)?;
            let mut doc = Document::from_value(value)?;
            if let Some(key) = key {
                doc = doc.with_key(key);
            }
            let key = backend.save(&collection, &mut doc)?;
            backend.commit()?;
            println!("{}", key);
        }
        Commands::Find { collection, clauses, sort, desc } => {
            let backend = FileBackend::new(config)?;
            let mut results = backend.all(&collection)?.filter(&parse_filter(&clauses)?)?;
            if let Some(field) = sort {
                let direction = if desc { SortDirection::Descending } else { SortDirection::Ascending };
                results.sort(&field, direction)?;
            }
            for doc in results.objects() {
                let doc = doc?;
                println!("{}\t{}", doc.storage_key().unwrap_or_default(), serde_json::to_string(&doc.fields)?);
            }
        }
        Commands::Remove { collection, clauses } => {
            let backend = FileBackend::new(config)?;
            let mut results = backend.all(&collection)?.filter(&parse_filter(&clauses)?)?;
            let removed = results.len();
            results.delete()?;
            backend.commit()?;
            println!("removed {}", removed);
        }
    }

    Ok(())
}
