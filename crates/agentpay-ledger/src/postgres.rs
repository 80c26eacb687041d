//! PostgreSQL ledger store
//!
//! Two tables, `agents` (one row per name) and `transactions` (append-only).
//! Postings run inside one SQL transaction: the booked agent rows are locked
//! with `FOR UPDATE` in name order, counters are incremented in SQL, and the
//! transaction row is inserted before commit.

use agentpay_core::{
    AgentId, AgentName, AgentProfile, AgentRecord, AgentRole, AgentStatus, Amount, LedgerError,
    Result, Transaction, TransactionId, TransactionKind, TransactionStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{FromRow, Postgres};
use tracing::{debug, info};

use crate::config::LedgerConfig;
use crate::store::{
    missing, Direction, InsertOutcome, LedgerStore, Posting, PostingReceipt, TransactionFilter,
};

const AGENT_COLUMNS: &str = "id, name, display_name, type AS role, agent_type, categories, \
     hourly_rate_cents, pricing_model, balance, opening_balance, hold, total_earned, \
     total_spent, transaction_count, avg_transaction_size, status, rating, completion_rate, \
     approval_rate, created_at, updated_at";

const TRANSACTION_COLUMNS: &str = "id, type AS kind, from_agent_id, from_agent_name, \
     to_agent_id, to_agent_name, amount, purpose, memo, status, timestamp";

/// Map a driver error onto the ledger taxonomy
pub(crate) fn map_sqlx(e: sqlx::Error) -> LedgerError {
    match e {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => LedgerError::StoreUnreachable {
            message: e.to_string(),
        },
        other => LedgerError::Store {
            message: other.to_string(),
        },
    }
}

fn corrupt(field: &str, value: impl std::fmt::Display) -> LedgerError {
    LedgerError::Store {
        message: format!("Corrupt {} in agents row: {}", field, value),
    }
}

fn to_cents(amount: Amount) -> Result<i64> {
    amount.to_signed()
}

fn from_cents(field: &str, cents: i64) -> Result<Amount> {
    u64::try_from(cents)
        .map(Amount::new)
        .map_err(|_| corrupt(field, cents))
}

// ============================================================================
// Row Models
// ============================================================================

#[derive(Debug, Clone, FromRow)]
struct DbAgent {
    id: String,
    name: String,
    display_name: String,
    role: String,
    agent_type: String,
    categories: Json<Vec<String>>,
    hourly_rate_cents: Option<i64>,
    pricing_model: Option<String>,
    balance: i64,
    opening_balance: i64,
    hold: i64,
    total_earned: i64,
    total_spent: i64,
    transaction_count: i64,
    avg_transaction_size: i64,
    status: String,
    rating: f64,
    completion_rate: f64,
    approval_rate: f64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<DbAgent> for AgentRecord {
    type Error = LedgerError;

    fn try_from(row: DbAgent) -> Result<Self> {
        let hourly_rate_cents = row
            .hourly_rate_cents
            .map(|c| u64::try_from(c).map_err(|_| corrupt("hourly_rate_cents", c)))
            .transpose()?;

        Ok(Self {
            id: AgentId::from_string(row.id),
            name: AgentName::parse(&row.name)?,
            role: AgentRole::parse(&row.role).ok_or_else(|| corrupt("type", &row.role))?,
            profile: AgentProfile {
                display_name: row.display_name,
                agent_type: row.agent_type,
                categories: row.categories.0,
                hourly_rate_cents,
                pricing_model: row.pricing_model,
            },
            balance: row.balance,
            opening_balance: row.opening_balance,
            hold: row.hold,
            total_earned: from_cents("total_earned", row.total_earned)?,
            total_spent: from_cents("total_spent", row.total_spent)?,
            transaction_count: u64::try_from(row.transaction_count)
                .map_err(|_| corrupt("transaction_count", row.transaction_count))?,
            avg_transaction_size: u64::try_from(row.avg_transaction_size)
                .map_err(|_| corrupt("avg_transaction_size", row.avg_transaction_size))?,
            status: AgentStatus::parse(&row.status).ok_or_else(|| corrupt("status", &row.status))?,
            rating: row.rating,
            completion_rate: row.completion_rate,
            approval_rate: row.approval_rate,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
struct DbTransaction {
    id: String,
    kind: String,
    from_agent_id: Option<String>,
    from_agent_name: String,
    to_agent_id: Option<String>,
    to_agent_name: String,
    amount: i64,
    purpose: String,
    memo: Option<Json<serde_json::Value>>,
    status: String,
    timestamp: DateTime<Utc>,
}

impl TryFrom<DbTransaction> for Transaction {
    type Error = LedgerError;

    fn try_from(row: DbTransaction) -> Result<Self> {
        let kind = match row.kind.as_str() {
            "payment" => TransactionKind::Payment,
            other => return Err(corrupt("transaction type", other)),
        };
        let status = match row.status.as_str() {
            "completed" => TransactionStatus::Completed,
            other => return Err(corrupt("transaction status", other)),
        };

        Ok(Self {
            id: TransactionId(row.id),
            kind,
            from_agent_id: row.from_agent_id.map(AgentId::from_string),
            from_name: row.from_agent_name,
            to_agent_id: row.to_agent_id.map(AgentId::from_string),
            to_name: row.to_agent_name,
            amount: from_cents("amount", row.amount)?,
            purpose: row.purpose,
            memo: row.memo.map(|m| m.0),
            status,
            timestamp: row.timestamp,
        })
    }
}

// ============================================================================
// Store
// ============================================================================

/// Ledger store backed by a PostgreSQL pool
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool from configuration
    pub async fn connect(config: &LedgerConfig) -> Result<Self> {
        let url = config.database_url.as_deref().ok_or_else(|| LedgerError::StoreUnreachable {
            message: "DATABASE_URL is not set".to_string(),
        })?;

        info!("Connecting to PostgreSQL: {}", config.database_url_masked());

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(std::time::Duration::from_secs(config.acquire_timeout_secs))
            .connect(url)
            .await
            .map_err(|e| LedgerError::StoreUnreachable {
                message: format!("PostgreSQL: {}", e),
            })?;

        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Run embedded migrations
    pub async fn migrate(&self) -> Result<()> {
        info!("Running ledger migrations...");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| LedgerError::Store {
                message: format!("Migration failed: {}", e),
            })?;
        info!("Migrations complete");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn lock_agent(
        conn: &mut sqlx::PgConnection,
        name: &AgentName,
    ) -> Result<AgentRecord> {
        let sql = format!("SELECT {} FROM agents WHERE name = $1 FOR UPDATE", AGENT_COLUMNS);
        let row = sqlx::query_as::<_, DbAgent>(&sql)
            .bind(name.as_str())
            .fetch_optional(&mut *conn)
            .await
            .map_err(map_sqlx)?
            .ok_or_else(|| missing(name))?;
        row.try_into()
    }

    async fn id_of(conn: &mut sqlx::PgConnection, label: &str) -> Result<Option<String>> {
        sqlx::query_scalar::<_, String>("SELECT id FROM agents WHERE name = $1")
            .bind(label)
            .fetch_optional(&mut *conn)
            .await
            .map_err(map_sqlx)
    }

    /// In-SQL read-modify-write of one side of a posting
    async fn book(
        conn: &mut sqlx::PgConnection,
        record: &AgentRecord,
        earned: i64,
        spent: i64,
        now: DateTime<Utc>,
    ) -> Result<AgentRecord> {
        let sql = format!(
            r#"
            UPDATE agents
            SET total_earned = total_earned + $2,
                total_spent = total_spent + $3,
                transaction_count = transaction_count + 1,
                balance = opening_balance + (total_earned + $2) - (total_spent + $3),
                avg_transaction_size = (total_earned + $2 + total_spent + $3) / (transaction_count + 1),
                updated_at = $4
            WHERE id = $1
            RETURNING {}
            "#,
            AGENT_COLUMNS
        );

        let row = sqlx::query_as::<_, DbAgent>(&sql)
            .bind(&record.id.0)
            .bind(earned)
            .bind(spent)
            .bind(now)
            .fetch_one(&mut *conn)
            .await
            .map_err(map_sqlx)?;
        row.try_into()
    }
}

#[async_trait]
impl LedgerStore for PgStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }

    async fn find_agent(&self, name: &AgentName) -> Result<Option<AgentRecord>> {
        let sql = format!("SELECT {} FROM agents WHERE name = $1", AGENT_COLUMNS);
        let row = sqlx::query_as::<_, DbAgent>(&sql)
            .bind(name.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;
        row.map(AgentRecord::try_from).transpose()
    }

    async fn insert_agent(&self, record: AgentRecord) -> Result<InsertOutcome> {
        let sql = format!(
            r#"
            INSERT INTO agents
                (id, name, display_name, type, agent_type, categories, hourly_rate_cents,
                 pricing_model, balance, opening_balance, hold, total_earned, total_spent,
                 transaction_count, avg_transaction_size, status, rating, completion_rate,
                 approval_rate, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21)
            ON CONFLICT (name) DO NOTHING
            RETURNING {}
            "#,
            AGENT_COLUMNS
        );

        let hourly_rate = record
            .profile
            .hourly_rate_cents
            .map(|c| to_cents(Amount::new(c)))
            .transpose()?;

        let inserted = sqlx::query_as::<_, DbAgent>(&sql)
            .bind(&record.id.0)
            .bind(record.name.as_str())
            .bind(&record.profile.display_name)
            .bind(record.role.as_str())
            .bind(&record.profile.agent_type)
            .bind(Json(&record.profile.categories))
            .bind(hourly_rate)
            .bind(&record.profile.pricing_model)
            .bind(record.balance)
            .bind(record.opening_balance)
            .bind(record.hold)
            .bind(to_cents(record.total_earned)?)
            .bind(to_cents(record.total_spent)?)
            .bind(record.transaction_count as i64)
            .bind(record.avg_transaction_size as i64)
            .bind(record.status.as_str())
            .bind(record.rating)
            .bind(record.completion_rate)
            .bind(record.approval_rate)
            .bind(record.created_at)
            .bind(record.updated_at)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;

        match inserted {
            Some(row) => Ok(InsertOutcome::Inserted(row.try_into()?)),
            None => {
                let existing = self
                    .find_agent(&record.name)
                    .await?
                    .ok_or_else(|| missing(&record.name))?;
                Ok(InsertOutcome::Existing(existing))
            }
        }
    }

    async fn apply_posting(&self, posting: Posting) -> Result<PostingReceipt> {
        posting.validate()?;
        let amount = posting.amount();
        let cents = to_cents(amount)?;
        let now = posting.transaction.timestamp;

        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        // Lock in name order so concurrent transfers cannot deadlock.
        let mut locked = Vec::new();
        for name in posting.booked_names() {
            locked.push(Self::lock_agent(&mut *tx, name).await?);
        }
        let find = |name: &Option<AgentName>| -> Option<AgentRecord> {
            name.as_ref()
                .and_then(|n| locked.iter().find(|r| &r.name == n).cloned())
        };
        let payer = find(&posting.debit);
        let payee = find(&posting.credit);

        // Same arithmetic as the in-memory store, to surface overflow before SQL does.
        if let Some(mut preview) = payer.clone() {
            preview.apply_spending(amount, now)?;
        }
        if let Some(mut preview) = payee.clone() {
            preview.apply_earning(amount, now)?;
        }

        let payer = match payer {
            Some(record) => Some(Self::book(&mut *tx, &record, 0, cents, now).await?),
            None => None,
        };
        let payee = match payee {
            Some(record) => Some(Self::book(&mut *tx, &record, cents, 0, now).await?),
            None => None,
        };

        let mut transaction = posting.transaction;
        let from_id = match &payer {
            Some(record) => Some(record.id.0.clone()),
            None => Self::id_of(&mut *tx, &transaction.from_name).await?,
        };
        let to_id = match &payee {
            Some(record) => Some(record.id.0.clone()),
            None => Self::id_of(&mut *tx, &transaction.to_name).await?,
        };
        transaction.from_agent_id = from_id.map(AgentId::from_string);
        transaction.to_agent_id = to_id.map(AgentId::from_string);

        sqlx::query::<Postgres>(
            r#"
            INSERT INTO transactions
                (id, type, from_agent_id, from_agent_name, to_agent_id, to_agent_name,
                 amount, purpose, memo, status, timestamp)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(&transaction.id.0)
        .bind(transaction.kind.as_str())
        .bind(transaction.from_agent_id.as_ref().map(|id| id.0.clone()))
        .bind(&transaction.from_name)
        .bind(transaction.to_agent_id.as_ref().map(|id| id.0.clone()))
        .bind(&transaction.to_name)
        .bind(cents)
        .bind(&transaction.purpose)
        .bind(transaction.memo.as_ref().map(Json))
        .bind(transaction.status.as_str())
        .bind(transaction.timestamp)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx)?;

        tx.commit().await.map_err(map_sqlx)?;

        debug!(tx = %transaction.id, amount = amount.0, "Posting committed");

        Ok(PostingReceipt {
            transaction,
            payer: payer.map(|r| r.snapshot()),
            payee: payee.map(|r| r.snapshot()),
        })
    }

    async fn transactions(&self, filter: TransactionFilter) -> Result<Vec<Transaction>> {
        let predicate = match filter.direction {
            Direction::Any => "from_agent_name = $1 OR to_agent_name = $1",
            Direction::Incoming => "to_agent_name = $1",
            Direction::Outgoing => "from_agent_name = $1",
        };
        let sql = format!(
            "SELECT {} FROM transactions WHERE {} ORDER BY timestamp DESC, id DESC LIMIT $2",
            TRANSACTION_COLUMNS, predicate
        );

        let rows = sqlx::query_as::<_, DbTransaction>(&sql)
            .bind(filter.agent.as_str())
            .bind(filter.limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?;

        rows.into_iter().map(Transaction::try_from).collect()
    }

    async fn list_agents(&self) -> Result<Vec<AgentRecord>> {
        let sql = format!("SELECT {} FROM agents ORDER BY name", AGENT_COLUMNS);
        let rows = sqlx::query_as::<_, DbAgent>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?;
        rows.into_iter().map(AgentRecord::try_from).collect()
    }
}
