//! twinkle-catalog - Manage the product catalog
//!
//! Unix-style tool for maintaining the lockable catalog of product
//! entries that posts are composed around.

use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use libtwinkle::catalog::CatalogStore;
use libtwinkle::config::expand_path;
use libtwinkle::{CatalogEntry, Config, Result, TwinkleError};

#[derive(Parser, Debug)]
#[command(name = "twinkle-catalog")]
#[command(version)]
#[command(about = "Manage the product catalog")]
#[command(long_about = "\
twinkle-catalog - Manage the product catalog

DESCRIPTION:
    twinkle-catalog maintains the catalog of product entries (rings and
    their attributes) that Twinklecast composes posts around. Entries
    can be locked to freeze them, and locked entries can be exported as
    a directory containing their metadata and image.

COMMANDS:
    add     Add a new entry
    find    Show one entry by product code
    search  Search entries by substring
    edit    Change ring name or attributes of an unlocked entry
    lock    Permanently freeze an entry
    export  Export a locked entry to a directory
    list    List all entries

USAGE EXAMPLES:
    # Add an entry with attributes
    twinkle-catalog add R-001 \"Luna Ring\" ./photos/luna.jpg \\
        --attr material=silver --attr stone=moonstone

    # Search ring names only
    twinkle-catalog search luna --field ring_name

    # Rename before locking
    twinkle-catalog edit R-001 --set ring_name=\"Luna Ring II\"

    # Freeze and export
    twinkle-catalog lock R-001
    twinkle-catalog export R-001 ./exports

CONFIGURATION:
    Configuration file: ~/.config/twinklecast/config.toml
    Catalog location:   ~/.local/share/twinklecast/catalog.json

    Override with environment variables:
        TWINKLE_CONFIG - Path to config file

EXIT CODES:
    0 - Success
    1 - Operation failed
    3 - Invalid input
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Add a new catalog entry
    Add {
        /// Unique product code
        product_code: String,

        /// Display name of the ring
        ring_name: String,

        /// Path to the product image
        image_path: String,

        /// Attributes as key=value pairs (repeatable)
        #[arg(long = "attr", value_name = "KEY=VALUE")]
        attrs: Vec<String>,
    },

    /// Show one entry by product code
    Find {
        product_code: String,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Search entries by substring
    Search {
        /// Substring to look for (case-insensitive)
        query: String,

        /// Restrict the search to one field or attribute key
        #[arg(long)]
        field: Option<String>,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Edit an unlocked entry
    Edit {
        product_code: String,

        /// Changes as key=value pairs (repeatable); keys are
        /// ring_name or attribute names
        #[arg(long = "set", value_name = "KEY=VALUE", required = true)]
        changes: Vec<String>,
    },

    /// Permanently freeze an entry against edits
    Lock { product_code: String },

    /// Export a locked entry to a directory
    Export {
        product_code: String,

        /// Directory to export into
        target_dir: PathBuf,
    },

    /// List all entries
    List {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

fn init_logging(verbose: bool) {
    libtwinkle::logging::init_cli(verbose, "error");
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let catalog = CatalogStore::open(expand_path(&config.storage.catalog_path));

    match cli.command {
        Commands::Add {
            product_code,
            ring_name,
            image_path,
            attrs,
        } => {
            let mut entry = CatalogEntry::new(product_code, ring_name, image_path);
            entry.attributes = parse_pairs(&attrs)?;
            let code = entry.product_code.clone();
            catalog.add(entry)?;
            println!("{}", code);
        }
        Commands::Find {
            product_code,
            format,
        } => {
            let entry = catalog.find(&product_code)?;
            output_entries(std::slice::from_ref(&entry), &format)?;
        }
        Commands::Search {
            query,
            field,
            format,
        } => {
            let entries = catalog.search(&query, field.as_deref());
            output_entries(&entries, &format)?;
        }
        Commands::Edit {
            product_code,
            changes,
        } => {
            let changes = parse_pairs(&changes)?;
            catalog.edit(&product_code, &changes)?;
            println!("{}", product_code);
        }
        Commands::Lock { product_code } => {
            catalog.lock(&product_code)?;
            println!("{}", product_code);
        }
        Commands::Export {
            product_code,
            target_dir,
        } => {
            let export_dir = catalog.export(&product_code, &target_dir)?;
            println!("{}", export_dir.display());
        }
        Commands::List { format } => {
            output_entries(&catalog.list(), &format)?;
        }
    }

    Ok(())
}

/// Parse repeated `key=value` arguments into a map.
fn parse_pairs(pairs: &[String]) -> Result<BTreeMap<String, String>> {
    let mut map = BTreeMap::new();
    for pair in pairs {
        let (key, value) = pair.split_once('=').ok_or_else(|| {
            TwinkleError::InvalidInput(format!("Expected KEY=VALUE, got '{}'", pair))
        })?;
        if key.is_empty() {
            return Err(TwinkleError::InvalidInput(format!(
                "Empty key in '{}'",
                pair
            )));
        }
        map.insert(key.to_string(), value.to_string());
    }
    Ok(map)
}

fn output_entries(entries: &[CatalogEntry], format: &str) -> Result<()> {
    match format {
        "json" => {
            let json = serde_json::to_string_pretty(entries)
                .map_err(libtwinkle::error::PersistenceError::Json)?;
            println!("{}", json);
        }
        "text" => {
            for entry in entries {
                let lock_marker = if entry.locked { " [locked]" } else { "" };
                println!("{} | {}{}", entry.product_code, entry.ring_name, lock_marker);
                for (key, value) in &entry.attributes {
                    println!("    {} = {}", key, value);
                }
            }
        }
        other => {
            return Err(TwinkleError::InvalidInput(format!(
                "Invalid format '{}'. Must be 'text' or 'json'",
                other
            )));
        }
    }
    Ok(())
}
