use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    EventType, Money, Order, OrderDraft, OrderEvent, OrderLine, OrderParts, OrderStatus,
    StatusChange,
};
use sqlx::{PgConnection, PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    OrderId, OutboxEntry, OwnerId, Result, StoreError, Version,
    store::{Committed, OrderStore, WriteOptions, commit_time},
};

const IDEMPOTENCY_CONSTRAINT: &str = "unique_idempotency_key";

const ORDER_COLUMNS: &str = "id, owner_id, status, version, created_at, updated_at";

/// PostgreSQL-backed order store implementation.
///
/// Orders and their lines are written in one transaction. Status updates
/// are a single `UPDATE ... WHERE version = $expected`, which makes the
/// version check and the write atomic.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    /// Creates a new PostgreSQL order store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn find_by_idempotency_key(
        conn: &mut PgConnection,
        key: &str,
    ) -> Result<Option<Order>> {
        let id: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM orders WHERE idempotency_key = $1")
                .bind(key)
                .fetch_optional(&mut *conn)
                .await?;

        match id {
            Some(id) => fetch_order(conn, OrderId::from_uuid(id)).await,
            None => Ok(None),
        }
    }

    fn replayed(order: Order) -> Committed {
        tracing::debug!(order_id = %order.id(), "idempotency key replayed");
        Committed {
            order,
            replayed: true,
            outbox_entry: None,
        }
    }

    async fn list_where(&self, filter: Option<OwnerId>) -> Result<Vec<Order>> {
        let mut conn = self.pool.acquire().await?;

        let rows = match filter {
            Some(owner_id) => {
                sqlx::query(&format!(
                    "SELECT {ORDER_COLUMNS} FROM orders WHERE owner_id = $1 ORDER BY created_at ASC, id ASC"
                ))
                .bind(owner_id.as_uuid())
                .fetch_all(&mut *conn)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {ORDER_COLUMNS} FROM orders ORDER BY created_at ASC, id ASC"
                ))
                .fetch_all(&mut *conn)
                .await?
            }
        };

        let ids: Vec<Uuid> = rows
            .iter()
            .map(|row| row.try_get::<Uuid, _>("id"))
            .collect::<std::result::Result<_, _>>()?;
        let mut lines = fetch_lines(&mut conn, &ids).await?;

        rows.iter()
            .zip(ids)
            .map(|(row, id)| row_to_order(row, lines.remove(&id).unwrap_or_default()))
            .collect()
    }
}

async fn fetch_order(conn: &mut PgConnection, order_id: OrderId) -> Result<Option<Order>> {
    let row: Option<PgRow> = sqlx::query(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
    ))
    .bind(order_id.as_uuid())
    .fetch_optional(&mut *conn)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let mut lines = fetch_lines(conn, &[order_id.as_uuid()]).await?;
    let lines = lines.remove(&order_id.as_uuid()).unwrap_or_default();
    row_to_order(&row, lines).map(Some)
}

async fn fetch_lines(
    conn: &mut PgConnection,
    order_ids: &[Uuid],
) -> Result<HashMap<Uuid, Vec<OrderLine>>> {
    let mut lines: HashMap<Uuid, Vec<OrderLine>> = HashMap::new();
    if order_ids.is_empty() {
        return Ok(lines);
    }

    let rows = sqlx::query(
        r#"
        SELECT order_id, product_id, product_name, quantity, unit_price_cents
        FROM order_lines
        WHERE order_id = ANY($1)
        ORDER BY order_id, position ASC
        "#,
    )
    .bind(order_ids.to_vec())
    .fetch_all(&mut *conn)
    .await?;

    for row in rows {
        let order_id: Uuid = row.try_get("order_id")?;
        let quantity: i64 = row.try_get("quantity")?;
        let quantity = u32::try_from(quantity).map_err(|_| StoreError::Corrupt {
            order_id: OrderId::from_uuid(order_id),
            reason: format!("quantity {quantity} out of range"),
        })?;

        lines.entry(order_id).or_default().push(OrderLine::new(
            row.try_get::<String, _>("product_id")?,
            row.try_get::<String, _>("product_name")?,
            quantity,
            Money::from_cents(row.try_get("unit_price_cents")?),
        ));
    }

    Ok(lines)
}

fn row_to_order(row: &PgRow, lines: Vec<OrderLine>) -> Result<Order> {
    let order_id = OrderId::from_uuid(row.try_get::<Uuid, _>("id")?);
    let status: String = row.try_get("status")?;
    let status: OrderStatus = status.parse().map_err(|e| StoreError::Corrupt {
        order_id,
        reason: format!("{e}"),
    })?;

    Order::restore(OrderParts {
        id: order_id,
        owner_id: OwnerId::from_uuid(row.try_get::<Uuid, _>("owner_id")?),
        status,
        lines,
        version: Version::new(row.try_get("version")?),
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
    .map_err(|e| StoreError::Corrupt {
        order_id,
        reason: e.to_string(),
    })
}

async fn insert_outbox(
    conn: &mut PgConnection,
    order: &Order,
    event_type: EventType,
) -> Result<OutboxEntry> {
    let event = OrderEvent::for_order(order, event_type);
    let recorded_at = order.updated_at();

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO order_outbox (order_id, event_type, payload, recorded_at)
        VALUES ($1, $2, $3, $4)
        RETURNING id
        "#,
    )
    .bind(order.id().as_uuid())
    .bind(event_type.as_str())
    .bind(serde_json::to_value(&event)?)
    .bind(recorded_at)
    .fetch_one(&mut *conn)
    .await?;

    Ok(OutboxEntry {
        id,
        event,
        recorded_at,
    })
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    async fn create(&self, draft: OrderDraft, options: WriteOptions) -> Result<Committed> {
        let key = draft.idempotency_key().map(str::to_string);
        let mut tx = self.pool.begin().await?;

        if let Some(ref key) = key
            && let Some(existing) = Self::find_by_idempotency_key(&mut tx, key).await?
        {
            return Ok(Self::replayed(existing));
        }

        let order = draft.into_order(OrderId::new(), commit_time());

        let inserted = sqlx::query(
            r#"
            INSERT INTO orders (id, owner_id, status, total_amount_cents, version, idempotency_key, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(order.id().as_uuid())
        .bind(order.owner_id().as_uuid())
        .bind(order.status().as_str())
        .bind(order.total_amount().cents())
        .bind(order.version().as_i64())
        .bind(key.as_deref())
        .bind(order.created_at())
        .bind(order.updated_at())
        .execute(&mut *tx)
        .await;

        if let Err(e) = inserted {
            // A concurrent create with the same key won the unique index.
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some(IDEMPOTENCY_CONSTRAINT)
                && let Some(ref key) = key
            {
                drop(tx);
                let mut conn = self.pool.acquire().await?;
                let existing = Self::find_by_idempotency_key(&mut conn, key)
                    .await?
                    .ok_or_else(|| StoreError::Database(e))?;
                return Ok(Self::replayed(existing));
            }
            return Err(StoreError::Database(e));
        }

        for (position, line) in order.lines().iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_lines (order_id, position, product_id, product_name, quantity, unit_price_cents)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(order.id().as_uuid())
            .bind(position as i32)
            .bind(line.product_id.as_str())
            .bind(&line.product_name)
            .bind(i64::from(line.quantity))
            .bind(line.unit_price.cents())
            .execute(&mut *tx)
            .await?;
        }

        let outbox_entry = match options.outbox {
            Some(event_type) => Some(insert_outbox(&mut tx, &order, event_type).await?),
            None => None,
        };

        tx.commit().await?;

        Ok(Committed {
            order,
            replayed: false,
            outbox_entry,
        })
    }

    async fn get_by_id(&self, order_id: OrderId) -> Result<Option<Order>> {
        let mut conn = self.pool.acquire().await?;
        fetch_order(&mut conn, order_id).await
    }

    async fn conditional_update(
        &self,
        order_id: OrderId,
        expected_version: Version,
        change: StatusChange,
        options: WriteOptions,
    ) -> Result<Committed> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE orders
            SET status = $1, version = version + 1,
                updated_at = GREATEST($2, updated_at + INTERVAL '1 microsecond')
            WHERE id = $3 AND version = $4
            "#,
        )
        .bind(change.to.as_str())
        .bind(commit_time())
        .bind(order_id.as_uuid())
        .bind(expected_version.as_i64())
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            let actual: Option<i64> =
                sqlx::query_scalar("SELECT version FROM orders WHERE id = $1")
                    .bind(order_id.as_uuid())
                    .fetch_optional(&mut *tx)
                    .await?;

            return Err(match actual {
                None => StoreError::NotFound(order_id),
                Some(actual) => StoreError::VersionConflict {
                    order_id,
                    expected: expected_version,
                    actual: Version::new(actual),
                },
            });
        }

        let order = fetch_order(&mut tx, order_id)
            .await?
            .ok_or(StoreError::NotFound(order_id))?;

        let outbox_entry = match options.outbox {
            Some(event_type) => Some(insert_outbox(&mut tx, &order, event_type).await?),
            None => None,
        };

        tx.commit().await?;

        Ok(Committed {
            order,
            replayed: false,
            outbox_entry,
        })
    }

    async fn list_by_owner(&self, owner_id: OwnerId) -> Result<Vec<Order>> {
        self.list_where(Some(owner_id)).await
    }

    async fn list_all(&self) -> Result<Vec<Order>> {
        self.list_where(None).await
    }

    async fn pending_outbox(&self, limit: usize) -> Result<Vec<OutboxEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, payload, recorded_at
            FROM order_outbox
            WHERE published_at IS NULL
            ORDER BY id ASC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let payload: serde_json::Value = row.try_get("payload")?;
                Ok(OutboxEntry {
                    id: row.try_get("id")?,
                    event: serde_json::from_value(payload)?,
                    recorded_at: row.try_get("recorded_at")?,
                })
            })
            .collect()
    }

    async fn mark_published(&self, entry_id: i64) -> Result<()> {
        sqlx::query(
            "UPDATE order_outbox SET published_at = NOW() WHERE id = $1 AND published_at IS NULL",
        )
        .bind(entry_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
