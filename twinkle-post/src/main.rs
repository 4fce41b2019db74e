//! twinkle-post - Compose and publish posts
//!
//! Unix-style tool for maintaining the fragment pools, previewing
//! composed posts, publishing immediately, or scheduling for later.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use clap::{Args, Parser, Subcommand};
use libtwinkle::composer::compose;
use libtwinkle::config::expand_path;
use libtwinkle::error::TokenError;
use libtwinkle::fragments::FragmentStore;
use libtwinkle::ledger::JobLedger;
use libtwinkle::publisher::StdoutPublisher;
use libtwinkle::scheduler::{SchedulerCore, SchedulerPolicy};
use libtwinkle::scheduling::parse_schedule;
use libtwinkle::selector::{select_by_index, select_random, CategoryFilter, IndexPicks, Selection};
use libtwinkle::tokens::TokenManager;
use libtwinkle::{Config, Deal, JobStatus, Result};
use secrecy::SecretString;

#[derive(Parser, Debug)]
#[command(name = "twinkle-post")]
#[command(version)]
#[command(about = "Compose and publish posts from catalog fragments")]
#[command(long_about = "\
twinkle-post - Compose and publish posts

DESCRIPTION:
    twinkle-post maintains the pools of reusable fragments (quotes,
    texts, symbols, deals, pictures), composes posts from them, and
    either publishes immediately or schedules for later delivery by
    twinkle-send.

    Fragments are selected by 1-based index per category, or randomly
    with --random. A post needs at least one of quote, text or symbol.

COMMANDS:
    add-quote    Append a quote fragment
    add-text     Append a text fragment
    add-symbol   Append a symbol fragment
    add-deal     Append a deal record
    add-picture  Copy a picture into the pool
    preview      Compose a post and print it without publishing
    now          Compose and publish immediately
    schedule     Compose and schedule for later

USAGE EXAMPLES:
    # Build up the pools
    twinkle-post add-quote \"Shine on\"
    twinkle-post add-text \"New arrival\"
    twinkle-post add-symbol \"✨\"
    twinkle-post add-deal \"Gold Ring\" \"120€\" \"20%\" https://shop.example/gold

    # Preview the first of each category with the first deal
    twinkle-post preview --quote 1 --text 1 --symbol 1 --deal 1

    # Publish a random composition right now
    twinkle-post now --random

    # Schedule for tomorrow morning
    twinkle-post schedule \"tomorrow 9am\" --quote 1 --text 2

CONFIGURATION:
    Configuration file: ~/.config/twinklecast/config.toml
    Fragment location:  ~/.local/share/twinklecast/fragments/

    Override with environment variables:
        TWINKLE_CONFIG       - Path to config file
        TWINKLE_ACCESS_TOKEN - Access token handed to the publisher

EXIT CODES:
    0 - Success
    1 - Operation failed
    2 - Missing or rejected credentials
    3 - Invalid input (bad index, empty selection, bad time)
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
    /// Append a quote fragment
    AddQuote { text: String },

    /// Append a text fragment
    AddText { text: String },

    /// Append a symbol fragment
    AddSymbol { text: String },

    /// Append a deal record
    AddDeal {
        product: String,
        price: String,
        discount: String,
        link: String,
    },

    /// Copy a picture into the pool
    AddPicture { path: PathBuf },

    /// Compose a post and print it without publishing
    Preview {
        #[command(flatten)]
        selection: SelectionArgs,
    },

    /// Compose and publish immediately
    Now {
        #[command(flatten)]
        selection: SelectionArgs,
    },

    /// Compose and schedule for later delivery by twinkle-send
    Schedule {
        /// When to publish (e.g., "2h", "tomorrow 9am")
        when: String,

        #[command(flatten)]
        selection: SelectionArgs,
    },
}

#[derive(Args, Debug)]
struct SelectionArgs {
    /// 1-based quote index
    #[arg(long)]
    quote: Option<usize>,

    /// 1-based text index
    #[arg(long)]
    text: Option<usize>,

    /// 1-based symbol index
    #[arg(long)]
    symbol: Option<usize>,

    /// 1-based deal index
    #[arg(long)]
    deal: Option<usize>,

    /// 1-based picture index
    #[arg(long)]
    picture: Option<usize>,

    /// Pick fragments randomly instead of by index
    #[arg(long, conflicts_with_all = ["quote", "text", "symbol", "deal", "picture"])]
    random: bool,

    /// Let random selection include a deal
    #[arg(long, requires = "random")]
    with_deals: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

fn init_logging(verbose: bool) {
    libtwinkle::logging::init_cli(verbose, "error");
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let store = FragmentStore::open(expand_path(&config.storage.fragments_dir));

    match cli.command {
        Commands::AddQuote { text } => store.add_quote(text)?,
        Commands::AddText { text } => store.add_text(text)?,
        Commands::AddSymbol { text } => store.add_symbol(text)?,
        Commands::AddDeal {
            product,
            price,
            discount,
            link,
        } => store.add_deal(Deal {
            product,
            price,
            discount,
            link,
        })?,
        Commands::AddPicture { path } => {
            let name = store.add_picture(&path)?;
            println!("{}", name);
        }
        Commands::Preview { selection } => {
            let post = compose(&select(&store, &selection)?);
            println!("{}", post.body);
            if let Some(picture) = &post.picture {
                println!("[picture: {}]", picture);
            }
        }
        Commands::Now { selection } => {
            let post = compose(&select(&store, &selection)?);
            let core = scheduler(&config)?;
            let job = core.schedule(post, chrono::Utc::now().timestamp())?;
            // Only this post; jobs queued for later belong to the daemon
            let finished = core.run_job(&job.id).await?;
            if finished.status != JobStatus::Succeeded {
                eprintln!(
                    "Error: publish failed: {}",
                    finished.last_error.unwrap_or_else(|| "unknown".to_string())
                );
                std::process::exit(1);
            }
            println!("{}", finished.published_id.unwrap_or_default());
        }
        Commands::Schedule { when, selection } => {
            let due_at = parse_schedule(&when)?.timestamp();
            let post = compose(&select(&store, &selection)?);
            let ledger = JobLedger::open(expand_path(&config.storage.ledger_path))?;
            let job = libtwinkle::ScheduledJob::new(post, due_at);
            ledger.record(&job)?;
            println!("{}", job.id);
        }
    }

    Ok(())
}

fn select(store: &FragmentStore, args: &SelectionArgs) -> Result<Selection> {
    let snapshot = store.snapshot();
    if args.random {
        let filter = CategoryFilter {
            deals: args.with_deals,
            ..Default::default()
        };
        select_random(&snapshot, &filter)
    } else {
        let picks = IndexPicks {
            quote: args.quote,
            text: args.text,
            symbol: args.symbol,
            deal: args.deal,
            picture: args.picture,
        };
        select_by_index(&snapshot, &picks)
    }
}

fn scheduler(config: &Config) -> Result<SchedulerCore> {
    let token = std::env::var("TWINKLE_ACCESS_TOKEN")
        .map_err(|_| TokenError::CredentialsRequired)?;
    let tokens = Arc::new(Mutex::new(TokenManager::with_token(
        SecretString::from(token),
        config.tokens.ttl_secs as i64,
    )));

    Ok(SchedulerCore::new(
        JobLedger::open(expand_path(&config.storage.ledger_path))?,
        Arc::new(StdoutPublisher),
        tokens,
        SchedulerPolicy::from_config(&config.scheduler),
    ))
}
