use anyhow::{Context, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{Sqlite, SqliteRow};
use sqlx::{Executor, Row, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::domain::{
    Account, AccountId, AccountRepository, Destination, DestinationKind, LedgerScope, Page,
    Pagination, RepositoryError, Service, ServiceId, ServicePrice, ServicePriceId,
    ServicePriceRepository, ServiceRepository, Store, StoreId, StoreRepository, Transaction,
    TransactionId, TransactionRepository, TransactionStatus, UnitOfWork,
};

use super::{MIGRATION_001_INITIAL, TransactionFilter};

const TRANSACTION_COLUMNS: &str = "id, amount, currency, status, account_from_id, kind, account_to_id, service_id, store_id, external_reference, created_at, updated_at";

/// SQLite-backed implementation of every repository contract.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create a new store with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database URL.
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = SqlitePool::connect(database_url)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Initialize a database (connect + migrate).
    pub async fn init(database_url: &str) -> anyhow::Result<Self> {
        let store = Self::connect(database_url).await?;
        store.migrate().await?;
        Ok(store)
    }

    async fn find_transaction_where(
        &self,
        id: TransactionId,
        filter: TransactionFilter,
    ) -> Result<Option<Transaction>, RepositoryError> {
        let (clause, bind) = filter_clause(&filter);
        let query = format!(
            "SELECT {} FROM transactions WHERE id = ? AND {}",
            TRANSACTION_COLUMNS, clause
        );

        let mut sql_query = sqlx::query(&query).bind(id.to_string());
        if let Some(value) = &bind {
            sql_query = sql_query.bind(value);
        }

        let row = sql_query
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch transaction")?;

        Ok(row.as_ref().map(row_to_transaction).transpose()?)
    }

    async fn list_transactions_where(
        &self,
        filter: TransactionFilter,
        pagination: &Pagination,
    ) -> Result<Page<Transaction>, RepositoryError> {
        let (clause, bind) = filter_clause(&filter);

        let count_query = format!("SELECT COUNT(*) AS total FROM transactions WHERE {}", clause);
        let mut count = sqlx::query(&count_query);
        if let Some(value) = &bind {
            count = count.bind(value);
        }
        let total: i64 = count
            .fetch_one(&self.pool)
            .await
            .context("Failed to count transactions")?
            .get("total");

        // Sort column and direction come from closed enums, never from caller text.
        let direction = pagination.sort.direction.keyword();
        let query = format!(
            "SELECT {} FROM transactions WHERE {} ORDER BY {} {}, id {} LIMIT ? OFFSET ?",
            TRANSACTION_COLUMNS,
            clause,
            pagination.sort.field.column(),
            direction,
            direction
        );
        let mut sql_query = sqlx::query(&query);
        if let Some(value) = &bind {
            sql_query = sql_query.bind(value);
        }
        let rows = sql_query
            .bind(i64::from(pagination.limit))
            .bind(i64::try_from(pagination.offset()).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .context("Failed to list transactions")?;

        let items = rows
            .iter()
            .map(row_to_transaction)
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(Page {
            items,
            total: u64::try_from(total).unwrap_or_default(),
        })
    }
}

fn filter_clause(filter: &TransactionFilter) -> (&'static str, Option<String>) {
    match filter {
        TransactionFilter::All => ("1 = 1", None),
        TransactionFilter::Destination(Destination::Account(id)) => {
            ("account_to_id = ?", Some(id.to_string()))
        }
        TransactionFilter::Destination(Destination::Service(id)) => {
            ("service_id = ?", Some(id.to_string()))
        }
        TransactionFilter::Destination(Destination::Store(id)) => {
            ("store_id = ?", Some(id.to_string()))
        }
        TransactionFilter::SourceAccount(id) => ("account_from_id = ?", Some(id.to_string())),
        TransactionFilter::Kind(kind) => ("kind = ?", Some(kind.as_str().to_string())),
        TransactionFilter::ExternalReference(reference) => {
            ("external_reference = ?", Some(reference.clone()))
        }
    }
}

fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    // Fixed-width so text ordering matches time ordering.
    timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(value: &str, field: &str) -> anyhow::Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)
        .with_context(|| format!("Invalid {} timestamp", field))?
        .with_timezone(&Utc))
}

fn parse_id(value: &str, field: &str) -> anyhow::Result<Uuid> {
    Uuid::parse_str(value).with_context(|| format!("Invalid {}", field))
}

fn map_insert_error(err: sqlx::Error, entity: &'static str, id: Uuid) -> RepositoryError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return RepositoryError::Duplicate { entity, id };
        }
    }
    RepositoryError::Backend(anyhow::Error::new(err).context(format!("Failed to insert {}", entity)))
}

async fn insert_transaction<'e, E>(executor: E, t: &Transaction) -> Result<(), RepositoryError>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO transactions (id, amount, currency, status, account_from_id, kind, account_to_id, service_id, store_id, external_reference, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(t.id.to_string())
    .bind(t.amount)
    .bind(&t.currency)
    .bind(t.status.as_str())
    .bind(t.source_account_id.to_string())
    .bind(t.kind().as_str())
    .bind(t.destination.account_id().map(|id| id.to_string()))
    .bind(t.destination.service_id().map(|id| id.to_string()))
    .bind(t.destination.store_id().map(|id| id.to_string()))
    .bind(&t.external_reference)
    .bind(format_timestamp(&t.created_at))
    .bind(format_timestamp(&t.updated_at))
    .execute(executor)
    .await
    .map_err(|err| map_insert_error(err, "Transaction", t.id))?;
    Ok(())
}

async fn update_account<'e, E>(executor: E, account: &Account) -> Result<(), RepositoryError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        UPDATE accounts
        SET balance = ?, version = version + 1, updated_at = ?
        WHERE id = ? AND version = ?
        "#,
    )
    .bind(account.balance)
    .bind(format_timestamp(&account.updated_at))
    .bind(account.id.to_string())
    .bind(account.version)
    .execute(executor)
    .await
    .context("Failed to save account")?;

    if result.rows_affected() == 0 {
        return Err(RepositoryError::Conflict {
            entity: "Account",
            id: account.id,
        });
    }
    Ok(())
}

fn row_to_account(row: &SqliteRow) -> anyhow::Result<Account> {
    let id_str: String = row.get("id");
    let created_at_str: String = row.get("created_at");
    let updated_at_str: String = row.get("updated_at");

    Ok(Account {
        id: parse_id(&id_str, "account ID")?,
        balance: row.get("balance"),
        version: row.get("version"),
        created_at: parse_timestamp(&created_at_str, "created_at")?,
        updated_at: parse_timestamp(&updated_at_str, "updated_at")?,
    })
}

fn row_to_service(row: &SqliteRow) -> anyhow::Result<Service> {
    let id_str: String = row.get("id");
    let owner_str: String = row.get("owner_id");
    let type_str: String = row.get("type_id");
    let status_str: String = row.get("status");
    let created_at_str: String = row.get("created_at");
    let updated_at_str: String = row.get("updated_at");

    Ok(Service {
        id: parse_id(&id_str, "service ID")?,
        name: row.get("name"),
        description: row.get("description"),
        owner_id: parse_id(&owner_str, "owner ID")?,
        type_id: parse_id(&type_str, "type ID")?,
        status: status_str.parse()?,
        created_at: parse_timestamp(&created_at_str, "created_at")?,
        updated_at: parse_timestamp(&updated_at_str, "updated_at")?,
    })
}

fn row_to_store(row: &SqliteRow) -> anyhow::Result<Store> {
    let id_str: String = row.get("id");
    let owner_str: String = row.get("owner_id");
    let type_str: String = row.get("type_id");
    let status_str: String = row.get("status");
    let created_at_str: String = row.get("created_at");
    let updated_at_str: String = row.get("updated_at");

    Ok(Store {
        id: parse_id(&id_str, "store ID")?,
        name: row.get("name"),
        description: row.get("description"),
        owner_id: parse_id(&owner_str, "owner ID")?,
        type_id: parse_id(&type_str, "type ID")?,
        status: status_str.parse()?,
        created_at: parse_timestamp(&created_at_str, "created_at")?,
        updated_at: parse_timestamp(&updated_at_str, "updated_at")?,
    })
}

fn row_to_service_price(row: &SqliteRow) -> anyhow::Result<ServicePrice> {
    let id_str: String = row.get("id");
    let service_str: String = row.get("service_id");
    let created_at_str: String = row.get("created_at");
    let updated_at_str: String = row.get("updated_at");

    Ok(ServicePrice {
        id: parse_id(&id_str, "service price ID")?,
        service_id: parse_id(&service_str, "service ID")?,
        description: row.get("description"),
        amount: row.get("amount"),
        currency: row.get("currency"),
        created_at: parse_timestamp(&created_at_str, "created_at")?,
        updated_at: parse_timestamp(&updated_at_str, "updated_at")?,
    })
}

fn row_to_transaction(row: &SqliteRow) -> anyhow::Result<Transaction> {
    let id_str: String = row.get("id");
    let status_str: String = row.get("status");
    let from_str: String = row.get("account_from_id");
    let kind_str: String = row.get("kind");
    let created_at_str: String = row.get("created_at");
    let updated_at_str: String = row.get("updated_at");

    let kind: DestinationKind = kind_str.parse()?;
    let destination_column = match kind {
        DestinationKind::Account => "account_to_id",
        DestinationKind::Service => "service_id",
        DestinationKind::Store => "store_id",
    };
    let destination_str: Option<String> = row.get(destination_column);
    let destination_str = destination_str
        .ok_or_else(|| anyhow!("Transaction {} has no {}", id_str, destination_column))?;

    Ok(Transaction {
        id: parse_id(&id_str, "transaction ID")?,
        amount: row.get("amount"),
        currency: row.get("currency"),
        status: status_str.parse()?,
        source_account_id: parse_id(&from_str, "source account ID")?,
        destination: Destination::from_parts(kind, parse_id(&destination_str, "destination ID")?),
        external_reference: row.get("external_reference"),
        created_at: parse_timestamp(&created_at_str, "created_at")?,
        updated_at: parse_timestamp(&updated_at_str, "updated_at")?,
    })
}

// ========================
// Account operations
// ========================

#[async_trait]
impl AccountRepository for SqliteStore {
    async fn find(&self, id: AccountId) -> Result<Option<Account>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, balance, version, created_at, updated_at FROM accounts WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch account")?;

        Ok(row.as_ref().map(row_to_account).transpose()?)
    }

    async fn create(&self, account: &Account) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO accounts (id, balance, version, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(account.id.to_string())
        .bind(account.balance)
        .bind(account.version)
        .bind(format_timestamp(&account.created_at))
        .bind(format_timestamp(&account.updated_at))
        .execute(&self.pool)
        .await
        .map_err(|err| map_insert_error(err, "Account", account.id))?;
        Ok(())
    }

    async fn save(&self, account: &Account) -> Result<(), RepositoryError> {
        update_account(&self.pool, account).await
    }
}

// ========================
// Service and store operations
// ========================

#[async_trait]
impl ServiceRepository for SqliteStore {
    async fn find(&self, id: ServiceId) -> Result<Option<Service>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, description, owner_id, type_id, status, created_at, updated_at FROM services WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch service")?;

        Ok(row.as_ref().map(row_to_service).transpose()?)
    }

    async fn find_active(&self, id: ServiceId) -> Result<Option<Service>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, description, owner_id, type_id, status, created_at, updated_at FROM services WHERE id = ? AND status = 'active'",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch active service")?;

        Ok(row.as_ref().map(row_to_service).transpose()?)
    }

    async fn create(&self, service: &Service) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO services (id, name, description, owner_id, type_id, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(service.id.to_string())
        .bind(&service.name)
        .bind(&service.description)
        .bind(service.owner_id.to_string())
        .bind(service.type_id.to_string())
        .bind(service.status.as_str())
        .bind(format_timestamp(&service.created_at))
        .bind(format_timestamp(&service.updated_at))
        .execute(&self.pool)
        .await
        .map_err(|err| map_insert_error(err, "Service", service.id))?;
        Ok(())
    }

    async fn save(&self, service: &Service) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE services SET name = ?, description = ?, status = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&service.name)
        .bind(&service.description)
        .bind(service.status.as_str())
        .bind(format_timestamp(&service.updated_at))
        .bind(service.id.to_string())
        .execute(&self.pool)
        .await
        .context("Failed to save service")?;
        Ok(())
    }
}

#[async_trait]
impl StoreRepository for SqliteStore {
    async fn find(&self, id: StoreId) -> Result<Option<Store>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, description, owner_id, type_id, status, created_at, updated_at FROM stores WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch store")?;

        Ok(row.as_ref().map(row_to_store).transpose()?)
    }

    async fn find_active(&self, id: StoreId) -> Result<Option<Store>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, description, owner_id, type_id, status, created_at, updated_at FROM stores WHERE id = ? AND status = 'active'",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch active store")?;

        Ok(row.as_ref().map(row_to_store).transpose()?)
    }

    async fn create(&self, store: &Store) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO stores (id, name, description, owner_id, type_id, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(store.id.to_string())
        .bind(&store.name)
        .bind(&store.description)
        .bind(store.owner_id.to_string())
        .bind(store.type_id.to_string())
        .bind(store.status.as_str())
        .bind(format_timestamp(&store.created_at))
        .bind(format_timestamp(&store.updated_at))
        .execute(&self.pool)
        .await
        .map_err(|err| map_insert_error(err, "Store", store.id))?;
        Ok(())
    }

    async fn save(&self, store: &Store) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE stores SET name = ?, description = ?, status = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&store.name)
        .bind(&store.description)
        .bind(store.status.as_str())
        .bind(format_timestamp(&store.updated_at))
        .bind(store.id.to_string())
        .execute(&self.pool)
        .await
        .context("Failed to save store")?;
        Ok(())
    }
}

#[async_trait]
impl ServicePriceRepository for SqliteStore {
    async fn find(&self, id: ServicePriceId) -> Result<Option<ServicePrice>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, service_id, description, amount, currency, created_at, updated_at FROM service_prices WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch service price")?;

        Ok(row.as_ref().map(row_to_service_price).transpose()?)
    }

    async fn create(&self, price: &ServicePrice) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO service_prices (id, service_id, description, amount, currency, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(price.id.to_string())
        .bind(price.service_id.to_string())
        .bind(&price.description)
        .bind(price.amount)
        .bind(&price.currency)
        .bind(format_timestamp(&price.created_at))
        .bind(format_timestamp(&price.updated_at))
        .execute(&self.pool)
        .await
        .map_err(|err| map_insert_error(err, "Service price", price.id))?;
        Ok(())
    }
}

// ========================
// Transaction operations
// ========================

#[async_trait]
impl TransactionRepository for SqliteStore {
    async fn register(&self, transaction: &Transaction) -> Result<(), RepositoryError> {
        insert_transaction(&self.pool, transaction).await
    }

    async fn save(
        &self,
        transaction: &Transaction,
        expected: TransactionStatus,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE transactions SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
        )
        .bind(transaction.status.as_str())
        .bind(format_timestamp(&transaction.updated_at))
        .bind(transaction.id.to_string())
        .bind(expected.as_str())
        .execute(&self.pool)
        .await
        .context("Failed to save transaction")?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::Conflict {
                entity: "Transaction",
                id: transaction.id,
            });
        }
        Ok(())
    }

    async fn find(&self, id: TransactionId) -> Result<Option<Transaction>, RepositoryError> {
        self.find_transaction_where(id, TransactionFilter::All).await
    }

    async fn find_all(&self, pagination: &Pagination) -> Result<Page<Transaction>, RepositoryError> {
        self.list_transactions_where(TransactionFilter::All, pagination)
            .await
    }

    async fn find_for_destination(
        &self,
        id: TransactionId,
        destination: &Destination,
    ) -> Result<Option<Transaction>, RepositoryError> {
        self.find_transaction_where(id, TransactionFilter::Destination(*destination))
            .await
    }

    async fn list_for_destination(
        &self,
        destination: &Destination,
        pagination: &Pagination,
    ) -> Result<Page<Transaction>, RepositoryError> {
        self.list_transactions_where(TransactionFilter::Destination(*destination), pagination)
            .await
    }

    async fn find_for_source_account(
        &self,
        id: TransactionId,
        account_id: AccountId,
    ) -> Result<Option<Transaction>, RepositoryError> {
        self.find_transaction_where(id, TransactionFilter::SourceAccount(account_id))
            .await
    }

    async fn list_for_source_account(
        &self,
        account_id: AccountId,
        pagination: &Pagination,
    ) -> Result<Page<Transaction>, RepositoryError> {
        self.list_transactions_where(TransactionFilter::SourceAccount(account_id), pagination)
            .await
    }

    async fn find_for_kind(
        &self,
        id: TransactionId,
        kind: DestinationKind,
    ) -> Result<Option<Transaction>, RepositoryError> {
        self.find_transaction_where(id, TransactionFilter::Kind(kind))
            .await
    }

    async fn list_for_kind(
        &self,
        kind: DestinationKind,
        pagination: &Pagination,
    ) -> Result<Page<Transaction>, RepositoryError> {
        self.list_transactions_where(TransactionFilter::Kind(kind), pagination)
            .await
    }

    async fn find_for_external_reference(
        &self,
        id: TransactionId,
        reference: &str,
    ) -> Result<Option<Transaction>, RepositoryError> {
        self.find_transaction_where(
            id,
            TransactionFilter::ExternalReference(reference.to_string()),
        )
        .await
    }

    async fn list_for_external_reference(
        &self,
        reference: &str,
        pagination: &Pagination,
    ) -> Result<Page<Transaction>, RepositoryError> {
        self.list_transactions_where(
            TransactionFilter::ExternalReference(reference.to_string()),
            pagination,
        )
        .await
    }
}

// ========================
// Atomic transfer scope
// ========================

/// Transfer writes staged in one SQLite transaction. Dropped without commit, sqlx rolls it back.
pub struct SqliteScope {
    tx: sqlx::Transaction<'static, Sqlite>,
}

#[async_trait]
impl UnitOfWork for SqliteStore {
    async fn begin(&self) -> Result<Box<dyn LedgerScope>, RepositoryError> {
        let tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;
        Ok(Box::new(SqliteScope { tx }))
    }
}

#[async_trait]
impl LedgerScope for SqliteScope {
    async fn register_transaction(
        &mut self,
        transaction: &Transaction,
    ) -> Result<(), RepositoryError> {
        insert_transaction(&mut *self.tx, transaction).await
    }

    async fn save_account(&mut self, account: &Account) -> Result<(), RepositoryError> {
        update_account(&mut *self.tx, account).await
    }

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
        self.tx
            .commit()
            .await
            .context("Failed to commit transaction")?;
        debug!("ledger scope committed");
        Ok(())
    }
}
