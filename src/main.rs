use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use env_logger::Env;
use log::{error, info};
use rust_decimal::Decimal;
use std::process;

use minibank_core::{cache, config, database, Ledger, TransactionRequest, TransferRequest};

mod cli;

/// MiniBank - multi-currency ledger with daily limits
#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    /// Sets the configuration file
    #[clap(short, long, value_name = "FILE", default_value = "config.toml")]
    config: String,

    /// Turn debugging information on
    #[clap(short, long, action = clap::ArgAction::Count)]
    debug: u8,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and its schema
    Init {},

    /// Register a customer and open their accounts
    Register {
        /// Full name
        #[clap(long)]
        name: String,

        /// Phone number, unique per customer
        #[clap(long)]
        phone: String,

        /// Currencies to open accounts in (default: every supported one)
        #[clap(long = "currency")]
        currencies: Vec<String>,

        /// Daily limit in base currency (default from config)
        #[clap(long)]
        daily_limit: Option<Decimal>,
    },

    /// Attach a card to an account
    IssueCard {
        /// Account ID
        #[clap(long)]
        account_id: i64,

        /// Card number
        #[clap(long)]
        number: String,

        /// Name printed on the card
        #[clap(long)]
        holder: String,

        /// Expiry date (YYYY-MM-DD)
        #[clap(long)]
        expiry: NaiveDate,
    },

    /// Deposit funds
    Deposit {
        #[clap(flatten)]
        args: MovementArgs,
    },

    /// Withdraw funds
    Withdraw {
        #[clap(flatten)]
        args: MovementArgs,
    },

    /// Transfer funds between accounts of the same currency
    Transfer {
        /// Acting user ID
        #[clap(long)]
        user_id: i64,

        /// Amount to transfer
        #[clap(short, long)]
        amount: Decimal,

        /// Currency (default: base currency)
        #[clap(long, default_value = "")]
        currency: String,

        /// Source card number
        #[clap(long)]
        from_card: Option<String>,

        /// Source phone number
        #[clap(long)]
        from_phone: Option<String>,

        /// Destination card number
        #[clap(long)]
        to_card: Option<String>,

        /// Destination phone number
        #[clap(long)]
        to_phone: Option<String>,
    },

    /// View transaction history, newest first
    History {
        /// User ID
        #[clap(long)]
        user_id: i64,

        /// Number of transactions to show
        #[clap(short, long)]
        limit: Option<u32>,

        /// Number of transactions to skip
        #[clap(long, default_value = "0")]
        offset: u32,
    },

    /// List a user's accounts
    Accounts {
        /// User ID
        #[clap(long)]
        user_id: i64,
    },
}

/// Options shared by deposit and withdraw
#[derive(clap::Args)]
struct MovementArgs {
    /// Acting user ID
    #[clap(long)]
    user_id: i64,

    /// Amount
    #[clap(short, long)]
    amount: Decimal,

    /// Currency (default: base currency)
    #[clap(long, default_value = "")]
    currency: String,

    /// Card number of the account
    #[clap(long)]
    card: Option<String>,

    /// Phone number of the account owner
    #[clap(long)]
    phone: Option<String>,
}

impl MovementArgs {
    fn request(&self) -> TransactionRequest {
        TransactionRequest {
            amount: self.amount,
            currency: self.currency.clone(),
            card_number: self.card.clone(),
            phone_number: self.phone.clone(),
        }
    }
}

fn main() {
    // Load environment variables from .env file
    dotenv().ok();

    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.debug {
        0 => log::set_max_level(log::LevelFilter::Info),
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    if let Err(err) = config::load_config(&cli.config) {
        error!("Failed to load configuration: {:#}", err);
        process::exit(1);
    }
    let config = config::get_config();
    info!("Starting {} v{}", config.app_name, config.version);

    let pool = match database::initialize(&config.database) {
        Ok(pool) => pool,
        Err(err) => {
            error!("Failed to initialize database: {:#}", err);
            process::exit(1);
        }
    };

    let ledger = match Ledger::from_config(pool.clone(), &config, cache::from_config(&config.cache)) {
        Ok(ledger) => ledger,
        Err(err) => {
            error!("Failed to set up ledger: {:#}", err);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Init {} => {
            println!("✅ Database ready at {}", config.database.path);
            Ok(())
        }
        Commands::Register { name, phone, currencies, daily_limit } => {
            cli::register(&pool, &config, &name, &phone, &currencies, daily_limit)
        }
        Commands::IssueCard { account_id, number, holder, expiry } => {
            cli::issue_card(&pool, account_id, &number, &holder, expiry)
        }
        Commands::Deposit { args } => cli::deposit(&ledger, args.user_id, &args.request()),
        Commands::Withdraw { args } => cli::withdraw(&ledger, args.user_id, &args.request()),
        Commands::Transfer {
            user_id,
            amount,
            currency,
            from_card,
            from_phone,
            to_card,
            to_phone,
        } => {
            let request = TransferRequest {
                amount,
                currency,
                from_card_number: from_card,
                from_phone_number: from_phone,
                to_card_number: to_card,
                to_phone_number: to_phone,
            };
            cli::transfer(&ledger, user_id, &request)
        }
        Commands::History { user_id, limit, offset } => cli::history(&ledger, user_id, limit, offset),
        Commands::Accounts { user_id } => cli::accounts(&ledger, user_id),
    };

    if let Err(err) = result {
        error!("{:#}", err);
        process::exit(1);
    }
}
