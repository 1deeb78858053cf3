use crate::pool::DbPool;
use async_trait::async_trait;
use services::{
    customer::{
        phone_key, AcknowledgmentMap, ChargeEntry, ChargeLog, Customer, CustomerRepository,
        ObservationNote,
    },
    subscription::{encode_all, parse, RawSubscriptions, SubscriptionRecord},
    CustomerId,
};
use tokio_postgres::Row;

const CUSTOMER_COLUMNS: &str = "id, phone, name, subscriptions, default_duration_months, \
     override_expiration, deleted, acknowledgments, observation, charge_log, created_at, updated_at";

pub struct PostgresCustomerRepository {
    pool: DbPool,
}

impl PostgresCustomerRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Run a single-row update, failing when the customer does not exist
    async fn update_one(
        &self,
        sql: &str,
        params: &[&(dyn tokio_postgres::types::ToSql + Sync)],
        id: CustomerId,
    ) -> anyhow::Result<()> {
        let client = self.pool.get().await?;
        let updated = client.execute(sql, params).await?;
        if updated == 0 {
            anyhow::bail!("Customer {} not found", id);
        }
        Ok(())
    }
}

/// Decode a customer row; stored subscription text goes through the codec
fn customer_from_row(row: &Row) -> anyhow::Result<Customer> {
    let default_duration_months: Option<i32> = row.get("default_duration_months");
    let default_duration = default_duration_months.and_then(|m| u32::try_from(m).ok());
    let raw: String = row.get("subscriptions");

    let acknowledgments: AcknowledgmentMap =
        serde_json::from_value(row.get::<_, serde_json::Value>("acknowledgments"))?;
    let observation: Option<ObservationNote> = row
        .get::<_, Option<serde_json::Value>>("observation")
        .map(serde_json::from_value)
        .transpose()?;
    let charge_log: ChargeLog =
        serde_json::from_value(row.get::<_, serde_json::Value>("charge_log"))?;

    Ok(Customer {
        id: row.get("id"),
        phone: row.get("phone"),
        name: row.get("name"),
        subscriptions: parse(&RawSubscriptions::Text(raw), default_duration),
        default_duration_months: default_duration,
        override_expiration: row.get("override_expiration"),
        deleted: row.get("deleted"),
        acknowledgments,
        observation,
        charge_log,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[async_trait]
impl CustomerRepository for PostgresCustomerRepository {
    async fn list_customers(&self) -> anyhow::Result<Vec<Customer>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                &format!("SELECT {} FROM customers ORDER BY phone_key, id", CUSTOMER_COLUMNS),
                &[],
            )
            .await?;

        let customers = rows
            .iter()
            .map(customer_from_row)
            .collect::<anyhow::Result<Vec<_>>>()?;
        tracing::debug!("Repository: Loaded {} customers", customers.len());
        Ok(customers)
    }

    async fn get_customer(&self, id: CustomerId) -> anyhow::Result<Option<Customer>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!("SELECT {} FROM customers WHERE id = $1", CUSTOMER_COLUMNS),
                &[&id],
            )
            .await?;
        row.as_ref().map(customer_from_row).transpose()
    }

    async fn get_customer_by_phone(&self, phone: &str) -> anyhow::Result<Option<Customer>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!("SELECT {} FROM customers WHERE phone_key = $1", CUSTOMER_COLUMNS),
                &[&phone_key(phone)],
            )
            .await?;
        row.as_ref().map(customer_from_row).transpose()
    }

    async fn upsert_customer(&self, customer: &Customer) -> anyhow::Result<()> {
        tracing::info!("Repository: Upserting customer_id={}", customer.id);

        let client = self.pool.get().await?;
        let default_duration = customer
            .default_duration_months
            .and_then(|m| i32::try_from(m).ok());
        let acknowledgments = serde_json::to_value(&customer.acknowledgments)?;
        let observation = customer
            .observation
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;
        let charge_log = serde_json::to_value(&customer.charge_log)?;

        client
            .execute(
                "INSERT INTO customers (
                    id, phone, phone_key, name, subscriptions, default_duration_months,
                    override_expiration, deleted, acknowledgments, observation, charge_log,
                    created_at, updated_at
                 )
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, NOW())
                 ON CONFLICT (id) DO UPDATE SET
                    phone = EXCLUDED.phone,
                    phone_key = EXCLUDED.phone_key,
                    name = EXCLUDED.name,
                    subscriptions = EXCLUDED.subscriptions,
                    default_duration_months = EXCLUDED.default_duration_months,
                    override_expiration = EXCLUDED.override_expiration,
                    deleted = EXCLUDED.deleted,
                    acknowledgments = EXCLUDED.acknowledgments,
                    observation = EXCLUDED.observation,
                    charge_log = EXCLUDED.charge_log,
                    updated_at = NOW()",
                &[
                    &customer.id,
                    &customer.phone,
                    &customer.phone_key(),
                    &customer.name,
                    &encode_all(&customer.subscriptions),
                    &default_duration,
                    &customer.override_expiration,
                    &customer.deleted,
                    &acknowledgments,
                    &observation,
                    &charge_log,
                    &customer.created_at,
                ],
            )
            .await?;
        Ok(())
    }

    async fn update_subscriptions(
        &self,
        id: CustomerId,
        subscriptions: &[SubscriptionRecord],
    ) -> anyhow::Result<()> {
        tracing::debug!(
            "Repository: Writing {} subscriptions for customer_id={}",
            subscriptions.len(),
            id
        );
        self.update_one(
            "UPDATE customers SET subscriptions = $2, updated_at = NOW() WHERE id = $1",
            &[&id, &encode_all(subscriptions)],
            id,
        )
        .await
    }

    async fn set_deleted(&self, id: CustomerId, deleted: bool) -> anyhow::Result<()> {
        self.update_one(
            "UPDATE customers SET deleted = $2, updated_at = NOW() WHERE id = $1",
            &[&id, &deleted],
            id,
        )
        .await
    }

    async fn update_acknowledgments(
        &self,
        id: CustomerId,
        acknowledgments: &AcknowledgmentMap,
    ) -> anyhow::Result<()> {
        let value = serde_json::to_value(acknowledgments)?;
        self.update_one(
            "UPDATE customers SET acknowledgments = $2, updated_at = NOW() WHERE id = $1",
            &[&id, &value],
            id,
        )
        .await
    }

    async fn update_observation(
        &self,
        id: CustomerId,
        observation: Option<&ObservationNote>,
    ) -> anyhow::Result<()> {
        let value = observation.map(serde_json::to_value).transpose()?;
        self.update_one(
            "UPDATE customers SET observation = $2, updated_at = NOW() WHERE id = $1",
            &[&id, &value],
            id,
        )
        .await
    }

    async fn append_charge(&self, id: CustomerId, entry: &ChargeEntry) -> anyhow::Result<()> {
        // Single-element array so the append happens in SQL, not read-modify-write
        let value = serde_json::to_value([entry])?;
        self.update_one(
            "UPDATE customers SET charge_log = charge_log || $2::jsonb, updated_at = NOW()
             WHERE id = $1",
            &[&id, &value],
            id,
        )
        .await
    }
}
