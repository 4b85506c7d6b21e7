use std::fs::File;
use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{debug, error};
use uuid::Uuid;

use crate::application::{
    AccountTransfer, AppError, Ledger, LedgerConfig, Repositories, ServiceTransfer, StoreTransfer,
};
use crate::domain::{
    Account, DEFAULT_CURRENCY, DestinationKind, MerchantStatus, Page, Service, ServicePrice,
    Store, Transaction, format_cents, parse_cents,
};
use crate::io::{ExportFormat, Exporter, TransactionEvent};
use crate::storage::{InMemoryStore, SqliteStore};

/// Payments - account, service and store transfer ledger
#[derive(Parser)]
#[command(name = "payments")]
#[command(about = "A payments ledger: accounts pay each other, services and stores")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, global = true, env = "PAYMENTS_DATABASE", default_value = "payments.db")]
    pub database: String,

    /// Currency recorded when neither the command nor a service price names one
    #[arg(long, global = true, env = "PAYMENTS_CURRENCY", default_value = DEFAULT_CURRENCY)]
    pub currency: String,

    /// Attempts per transfer when the source account is updated concurrently
    #[arg(long, global = true, env = "PAYMENTS_MAX_ATTEMPTS", default_value_t = 3)]
    pub max_attempts: u32,

    /// Use a throwaway in-memory ledger instead of the database
    #[arg(long, global = true)]
    pub memory: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Account management commands
    #[command(subcommand)]
    Account(AccountCommands),

    /// Service and service price management commands
    #[command(subcommand)]
    Service(ServiceCommands),

    /// Store management commands
    #[command(subcommand)]
    Store(StoreCommands),

    /// Move money out of an account
    #[command(subcommand)]
    Transfer(TransferCommands),

    /// Query the ledger
    #[command(subcommand)]
    Transactions(TransactionCommands),

    /// Mark a pending transaction as completed
    Complete {
        /// Transaction ID
        id: Uuid,
    },

    /// Mark a pending transaction as canceled
    Cancel {
        /// Transaction ID
        id: Uuid,
    },

    /// Export data to CSV or JSON
    Export {
        /// What to export
        #[arg(value_enum)]
        target: ExportTarget,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,

        #[arg(short, long, value_enum, default_value = "csv")]
        format: ExportFormat,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ExportTarget {
    Transactions,
}

#[derive(Subcommand)]
pub enum AccountCommands {
    /// Open a new account
    Create {
        /// Initial balance (e.g., "3000.93")
        #[arg(default_value = "0")]
        balance: String,
    },

    /// Show an account and its balance
    Show { id: Uuid },

    /// Credit an account
    Deposit {
        id: Uuid,

        /// Amount to credit (e.g., "50.00")
        amount: String,
    },
}

#[derive(Subcommand)]
pub enum ServiceCommands {
    /// Register a service (starts pending)
    Create(MerchantArgs),

    /// Allow the service to receive transfers
    Activate { id: Uuid },

    /// Stop the service from receiving transfers
    Disable { id: Uuid },

    /// Show a service
    Show { id: Uuid },

    /// Attach a fixed price to a service
    Price {
        /// Service ID
        service: Uuid,

        /// Price amount (e.g., "200.00")
        amount: String,

        /// Price currency (defaults to the ledger currency)
        #[arg(long)]
        price_currency: Option<String>,

        #[arg(long)]
        description: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum StoreCommands {
    /// Register a store (starts pending)
    Create(MerchantArgs),

    /// Allow the store to receive transfers
    Activate { id: Uuid },

    /// Stop the store from receiving transfers
    Disable { id: Uuid },

    /// Show a store
    Show { id: Uuid },
}

#[derive(Args)]
pub struct MerchantArgs {
    name: String,

    #[arg(long)]
    description: Option<String>,

    /// Owner ID (random if omitted)
    #[arg(long)]
    owner: Option<Uuid>,

    /// Type ID (random if omitted)
    #[arg(long = "type")]
    type_id: Option<Uuid>,
}

#[derive(Args)]
pub struct TransferArgs {
    /// Source account ID
    #[arg(long)]
    from: Uuid,

    /// Transaction currency (overrides price and ledger defaults)
    #[arg(long = "tx-currency")]
    tx_currency: Option<String>,

    /// External reference (order number, invoice, ...)
    #[arg(short, long)]
    reference: Option<String>,
}

#[derive(Subcommand)]
pub enum TransferCommands {
    /// Pay another account
    Account {
        #[command(flatten)]
        common: TransferArgs,

        /// Destination account ID
        #[arg(long)]
        to: Uuid,

        /// Amount (e.g., "50.00")
        amount: String,
    },

    /// Pay an active service, by amount or by one of its prices
    Service {
        #[command(flatten)]
        common: TransferArgs,

        /// Service ID
        #[arg(long)]
        service: Uuid,

        /// Service price ID (its amount overrides any given amount)
        #[arg(long)]
        price: Option<Uuid>,

        /// Amount (e.g., "50.00")
        amount: Option<String>,
    },

    /// Pay an active store
    Store {
        #[command(flatten)]
        common: TransferArgs,

        /// Store ID
        #[arg(long)]
        store: Uuid,

        /// Amount (e.g., "50.00")
        amount: String,
    },
}

#[derive(Args)]
pub struct PageArgs {
    #[arg(long, default_value_t = 1)]
    page: u32,

    #[arg(short, long, default_value_t = 20)]
    limit: u32,

    /// Sort order, e.g. "amount desc" (default "created_at desc")
    #[arg(long, default_value = "")]
    sort: String,
}

#[derive(Subcommand)]
pub enum TransactionCommands {
    /// List every transaction
    List(PageArgs),

    /// Show one transaction
    Show { id: Uuid },

    /// Transactions paid to an account, service or store
    ByDestination {
        /// Destination kind: account, service or store
        kind: String,

        /// Destination ID
        destination: Uuid,

        /// Fetch a single transaction instead of a page
        #[arg(long)]
        id: Option<Uuid>,

        #[command(flatten)]
        paging: PageArgs,
    },

    /// Transactions debited from an account
    BySource {
        account: Uuid,

        #[arg(long)]
        id: Option<Uuid>,

        #[command(flatten)]
        paging: PageArgs,
    },

    /// Transactions of one type: to_account, to_service or to_store
    ByType {
        kind: String,

        #[arg(long)]
        id: Option<Uuid>,

        #[command(flatten)]
        paging: PageArgs,
    },

    /// Transactions carrying an external reference
    ByReference {
        reference: String,

        #[arg(long)]
        id: Option<Uuid>,

        #[command(flatten)]
        paging: PageArgs,
    },
}

impl Cli {
    fn config(&self) -> LedgerConfig {
        LedgerConfig::default()
            .with_default_currency(self.currency.clone())
            .with_max_transfer_attempts(self.max_attempts)
    }

    async fn open(&self, create: bool) -> Result<Ledger> {
        let repos = if self.memory {
            debug!("using in-memory ledger");
            Repositories::from_backend(Arc::new(InMemoryStore::new()))
        } else {
            let store = if create {
                SqliteStore::init(&format!("sqlite:{}?mode=rwc", self.database)).await?
            } else {
                SqliteStore::connect(&format!("sqlite:{}", self.database))
                    .await
                    .with_context(|| {
                        format!("Cannot open {} (run `payments init` first)", self.database)
                    })?
            };
            Repositories::from_backend(Arc::new(store))
        };
        Ok(Ledger::new(&repos, self.config()))
    }

    pub async fn run(self) -> Result<()> {
        let ledger = self.open(matches!(self.command, Commands::Init)).await?;
        let out = Output { json: self.json };

        match self.command {
            Commands::Init => {
                println!("Database initialized: {}", self.database);
            }

            Commands::Account(cmd) => run_account_command(&ledger, &out, cmd).await?,

            Commands::Service(cmd) => run_service_command(&ledger, &out, cmd).await?,

            Commands::Store(cmd) => run_store_command(&ledger, &out, cmd).await?,

            Commands::Transfer(cmd) => run_transfer_command(&ledger, &out, cmd).await?,

            Commands::Transactions(cmd) => run_transactions_command(&ledger, &out, cmd).await?,

            Commands::Complete { id } => {
                let tx = ledger.transactions.complete(id).await?;
                out.transaction(&tx)?;
            }

            Commands::Cancel { id } => {
                let tx = ledger.transactions.cancel(id).await?;
                out.transaction(&tx)?;
            }

            Commands::Export {
                target: ExportTarget::Transactions,
                output,
                format,
            } => {
                let exporter = Exporter::new(&ledger.transactions);
                let count = match output {
                    Some(path) => {
                        let file = File::create(&path)
                            .with_context(|| format!("Failed to create {}", path))?;
                        exporter.export_transactions(format, file).await?
                    }
                    None => exporter.export_transactions(format, io::stdout()).await?,
                };
                eprintln!("Exported {} transaction(s)", count);
            }
        }

        Ok(())
    }
}

async fn run_account_command(ledger: &Ledger, out: &Output, cmd: AccountCommands) -> Result<()> {
    match cmd {
        AccountCommands::Create { balance } => {
            let cents = parse_amount(&balance)?;
            let account = ledger.provisioning.create_account(cents).await?;
            out.account(&account)?;
        }
        AccountCommands::Show { id } => {
            let account = ledger.provisioning.get_account(id).await?;
            out.account(&account)?;
        }
        AccountCommands::Deposit { id, amount } => {
            let cents = parse_amount(&amount)?;
            let account = ledger.provisioning.deposit(id, cents).await?;
            out.account(&account)?;
        }
    }
    Ok(())
}

async fn run_service_command(ledger: &Ledger, out: &Output, cmd: ServiceCommands) -> Result<()> {
    let provisioning = &ledger.provisioning;
    match cmd {
        ServiceCommands::Create(args) => {
            let service = provisioning
                .create_service(
                    args.name,
                    args.description,
                    args.owner.unwrap_or_else(Uuid::new_v4),
                    args.type_id.unwrap_or_else(Uuid::new_v4),
                )
                .await?;
            out.service(&service)?;
        }
        ServiceCommands::Activate { id } => {
            let service = provisioning
                .set_service_status(id, MerchantStatus::Active)
                .await?;
            out.service(&service)?;
        }
        ServiceCommands::Disable { id } => {
            let service = provisioning
                .set_service_status(id, MerchantStatus::Disabled)
                .await?;
            out.service(&service)?;
        }
        ServiceCommands::Show { id } => {
            out.service(&provisioning.get_service(id).await?)?;
        }
        ServiceCommands::Price {
            service,
            amount,
            price_currency,
            description,
        } => {
            let cents = parse_amount(&amount)?;
            let currency = price_currency.unwrap_or_else(|| ledger.config.default_currency.clone());
            let price = provisioning
                .create_service_price(service, description, cents, &currency)
                .await?;
            out.price(&price)?;
        }
    }
    Ok(())
}

async fn run_store_command(ledger: &Ledger, out: &Output, cmd: StoreCommands) -> Result<()> {
    let provisioning = &ledger.provisioning;
    let store = match cmd {
        StoreCommands::Create(args) => {
            provisioning
                .create_store(
                    args.name,
                    args.description,
                    args.owner.unwrap_or_else(Uuid::new_v4),
                    args.type_id.unwrap_or_else(Uuid::new_v4),
                )
                .await?
        }
        StoreCommands::Activate { id } => {
            provisioning
                .set_store_status(id, MerchantStatus::Active)
                .await?
        }
        StoreCommands::Disable { id } => {
            provisioning
                .set_store_status(id, MerchantStatus::Disabled)
                .await?
        }
        StoreCommands::Show { id } => provisioning.get_store(id).await?,
    };
    out.store(&store)
}

async fn run_transfer_command(ledger: &Ledger, out: &Output, cmd: TransferCommands) -> Result<()> {
    let tx = match cmd {
        TransferCommands::Account { common, to, amount } => {
            let request = AccountTransfer {
                to,
                amount: parse_amount(&amount)?,
            };
            ledger
                .to_accounts
                .transfer(
                    common.from,
                    request,
                    common.tx_currency.as_deref().unwrap_or_default(),
                    common.reference,
                )
                .await?
        }
        TransferCommands::Service {
            common,
            service,
            price,
            amount,
        } => {
            let request = ServiceTransfer {
                service_id: service,
                service_price_id: price,
                amount: amount.as_deref().map(parse_amount).transpose()?,
            };
            ledger
                .to_services
                .transfer(
                    common.from,
                    request,
                    common.tx_currency.as_deref().unwrap_or_default(),
                    common.reference,
                )
                .await?
        }
        TransferCommands::Store {
            common,
            store,
            amount,
        } => {
            let request = StoreTransfer {
                store_id: store,
                amount: parse_amount(&amount)?,
            };
            ledger
                .to_stores
                .transfer(
                    common.from,
                    request,
                    common.tx_currency.as_deref().unwrap_or_default(),
                    common.reference,
                )
                .await?
        }
    };
    out.transaction(&tx)
}

async fn run_transactions_command(
    ledger: &Ledger,
    out: &Output,
    cmd: TransactionCommands,
) -> Result<()> {
    let service = &ledger.transactions;
    match cmd {
        TransactionCommands::List(p) => {
            out.page(&service.find_all(p.page, p.limit, &p.sort).await?)?;
        }
        TransactionCommands::Show { id } => {
            out.transaction(&service.find(id).await?)?;
        }
        TransactionCommands::ByDestination {
            kind,
            destination,
            id,
            paging: p,
        } => {
            let kind: DestinationKind = kind.parse().map_err(AppError::from)?;
            match (kind, id) {
                (DestinationKind::Account, Some(id)) => out.transaction(
                    &ledger.to_accounts.find_by_destination(destination, id).await?,
                )?,
                (DestinationKind::Service, Some(id)) => out.transaction(
                    &ledger.to_services.find_by_destination(destination, id).await?,
                )?,
                (DestinationKind::Store, Some(id)) => out.transaction(
                    &ledger.to_stores.find_by_destination(destination, id).await?,
                )?,
                (DestinationKind::Account, None) => out.page(
                    &ledger
                        .to_accounts
                        .list_by_destination(destination, p.page, p.limit, &p.sort)
                        .await?,
                )?,
                (DestinationKind::Service, None) => out.page(
                    &ledger
                        .to_services
                        .list_by_destination(destination, p.page, p.limit, &p.sort)
                        .await?,
                )?,
                (DestinationKind::Store, None) => out.page(
                    &ledger
                        .to_stores
                        .list_by_destination(destination, p.page, p.limit, &p.sort)
                        .await?,
                )?,
            }
        }
        TransactionCommands::BySource {
            account,
            id,
            paging: p,
        } => match id {
            Some(id) => out.transaction(&service.find_by_source_account(account, id).await?)?,
            None => out.page(
                &service
                    .find_all_by_source_account(account, p.page, p.limit, &p.sort)
                    .await?,
            )?,
        },
        TransactionCommands::ByType {
            kind,
            id,
            paging: p,
        } => {
            let kind: DestinationKind = kind.parse().map_err(AppError::from)?;
            match id {
                Some(id) => out.transaction(&service.find_by_kind(kind, id).await?)?,
                None => out.page(
                    &service
                        .find_all_by_kind(kind, p.page, p.limit, &p.sort)
                        .await?,
                )?,
            }
        }
        TransactionCommands::ByReference {
            reference,
            id,
            paging: p,
        } => match id {
            Some(id) => {
                out.transaction(&service.find_by_external_reference(&reference, id).await?)?
            }
            None => out.page(
                &service
                    .find_all_by_external_reference(&reference, p.page, p.limit, &p.sort)
                    .await?,
            )?,
        },
    }
    Ok(())
}

fn parse_amount(input: &str) -> Result<i64> {
    parse_cents(input).with_context(|| format!("Invalid amount '{}'. Use '50.00' or '50'", input))
}

/// Renders command results as text or JSON on stdout.
struct Output {
    json: bool,
}

impl Output {
    fn print_json<T: serde::Serialize>(&self, value: &T) -> Result<()> {
        let mut stdout = io::stdout().lock();
        serde_json::to_writer_pretty(&mut stdout, value)?;
        writeln!(stdout)?;
        Ok(())
    }

    fn account(&self, account: &Account) -> Result<()> {
        if self.json {
            return self.print_json(account);
        }
        println!("Account {}", account.id);
        println!("  Balance: {}", format_cents(account.balance));
        println!("  Updated: {}", account.updated_at.format("%Y-%m-%d %H:%M:%S"));
        Ok(())
    }

    fn service(&self, service: &Service) -> Result<()> {
        if self.json {
            return self.print_json(service);
        }
        println!("Service {} ({})", service.name, service.id);
        println!("  Status: {}", service.status);
        if let Some(desc) = &service.description {
            println!("  Description: {}", desc);
        }
        Ok(())
    }

    fn store(&self, store: &Store) -> Result<()> {
        if self.json {
            return self.print_json(store);
        }
        println!("Store {} ({})", store.name, store.id);
        println!("  Status: {}", store.status);
        if let Some(desc) = &store.description {
            println!("  Description: {}", desc);
        }
        Ok(())
    }

    fn price(&self, price: &ServicePrice) -> Result<()> {
        if self.json {
            return self.print_json(price);
        }
        println!(
            "Price {}: {} {} for service {}",
            price.id,
            format_cents(price.amount),
            price.currency,
            price.service_id
        );
        Ok(())
    }

    fn transaction(&self, tx: &Transaction) -> Result<()> {
        if self.json {
            return self.print_json(&TransactionEvent::from_transaction(tx)?);
        }
        println!("{}", transaction_line(tx));
        Ok(())
    }

    fn page(&self, page: &Page<Transaction>) -> Result<()> {
        if self.json {
            let events = page
                .items
                .iter()
                .map(TransactionEvent::from_transaction)
                .collect::<Result<Vec<_>, _>>()?;
            return self.print_json(&serde_json::json!({
                "items": events,
                "total": page.total,
            }));
        }
        if page.is_empty() {
            println!("No transactions found (total {}).", page.total);
            return Ok(());
        }
        for tx in &page.items {
            println!("{}", transaction_line(tx));
        }
        println!("Showing {} of {}", page.items.len(), page.total);
        Ok(())
    }
}

fn transaction_line(tx: &Transaction) -> String {
    let reference = tx
        .external_reference
        .as_deref()
        .map(|r| format!(" ref={}", r))
        .unwrap_or_default();
    format!(
        "{}  {:<9}  {:>12} {}  {} -> {}{}  ({})",
        tx.created_at.format("%Y-%m-%d %H:%M"),
        tx.status,
        format_cents(tx.amount),
        tx.currency,
        tx.source_account_id,
        tx.destination,
        reference,
        tx.id
    )
}

/// Turn a failed command into the line shown to the user and an exit code.
pub fn report(err: &anyhow::Error) -> (String, u8) {
    error!(error = %format!("{:#}", err), "command failed");

    let Some(app) = err.downcast_ref::<AppError>() else {
        return (format!("{:#}", err), 1);
    };
    let code = match app {
        AppError::Validation(_) | AppError::MissingParameter(_) => 2,
        AppError::NotFound { .. } => 3,
        AppError::InsufficientFunds { .. }
        | AppError::InvalidTransition { .. }
        | AppError::Conflict { .. } => 4,
        AppError::Repository(_) => 1,
    };
    let message = match app {
        AppError::InsufficientFunds {
            balance, required, ..
        } => format!(
            "Insufficient funds: balance {}, required {}",
            format_cents(*balance),
            format_cents(*required)
        ),
        other => other.to_string(),
    };
    (message, code)
}
