//! Seat/machine registry.
//!
//! Subscriptions, machine registrations and the one-shot trial table
//! live in SQLite behind a connection pool. Every mutating operation
//! runs in an immediate transaction so concurrent activations can never
//! allocate more machines than a subscription has seats.

use chrono::{DateTime, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    pub id: String,
    pub plan: String,
    pub status: String,
    pub seats: u32,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub trial_end: Option<DateTime<Utc>>,
    pub owner_email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineRegistration {
    pub id: String,
    pub subscription_id: String,
    pub machine_fingerprint: String,
    pub machine_name: Option<String>,
    pub activated_at: DateTime<Utc>,
    pub last_validated: Option<DateTime<Utc>>,
    pub active: bool,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS subscriptions (
    id              TEXT PRIMARY KEY,
    plan            TEXT NOT NULL,
    status          TEXT NOT NULL,
    seats           INTEGER NOT NULL,
    period_start    TEXT NOT NULL,
    period_end      TEXT NOT NULL,
    trial_end       TEXT,
    owner_email     TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_subscriptions_owner ON subscriptions(owner_email);

CREATE TABLE IF NOT EXISTS machine_registrations (
    id                  TEXT PRIMARY KEY,
    subscription_id     TEXT NOT NULL REFERENCES subscriptions(id),
    machine_fingerprint TEXT NOT NULL,
    machine_name        TEXT,
    activated_at        TEXT NOT NULL,
    last_validated      TEXT,
    active              INTEGER NOT NULL DEFAULT 1,
    UNIQUE(subscription_id, machine_fingerprint)
);

CREATE TABLE IF NOT EXISTS trial_machines (
    machine_fingerprint TEXT PRIMARY KEY,
    first_trial_at      TEXT NOT NULL,
    user_email          TEXT
);
";

pub struct SeatRegistry {
    pool: Pool<SqliteConnectionManager>,
}

impl SeatRegistry {
    pub fn open(database_url: &str) -> Result<Self> {
        let manager = SqliteConnectionManager::file(database_url).with_init(|conn| {
            conn.busy_timeout(Duration::from_secs(5))?;
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn.pragma_update(None, "foreign_keys", "ON")?;
            Ok(())
        });
        let pool = Pool::builder()
            .max_size(8)
            .build(manager)
            .map_err(|e| Error::Internal(anyhow::anyhow!("registry pool: {e}")))?;

        let conn = pool
            .get()
            .map_err(|e| Error::Internal(anyhow::anyhow!("registry connection: {e}")))?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self { pool })
    }

    fn conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| Error::Internal(anyhow::anyhow!("registry connection: {e}")))
    }

    pub fn upsert_subscription(&self, record: &SubscriptionRecord) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO subscriptions
                 (id, plan, status, seats, period_start, period_end, trial_end, owner_email)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
                 plan = excluded.plan,
                 status = excluded.status,
                 seats = excluded.seats,
                 period_start = excluded.period_start,
                 period_end = excluded.period_end,
                 trial_end = excluded.trial_end,
                 owner_email = excluded.owner_email",
            params![
                record.id,
                record.plan,
                record.status,
                record.seats,
                to_ts(&record.period_start),
                to_ts(&record.period_end),
                record.trial_end.as_ref().map(to_ts),
                record.owner_email,
            ],
        )?;
        Ok(())
    }

    pub fn subscription_for_owner(&self, owner_email: &str) -> Result<SubscriptionRecord> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, plan, status, seats, period_start, period_end, trial_end, owner_email
             FROM subscriptions WHERE owner_email = ?1
             ORDER BY period_end DESC LIMIT 1",
            params![owner_email],
            row_to_subscription,
        )
        .optional()?
        .ok_or_else(|| Error::NotFound(format!("no subscription for {owner_email}")))
    }

    /// Activate a machine under a subscription.
    ///
    /// An already-active `(subscription, fingerprint)` pair is touched
    /// (`last_validated`), otherwise a seat is allocated if one is free.
    /// The whole decision runs under an immediate transaction, so two
    /// racing activations serialize and the seat cap holds.
    pub fn activate(
        &self,
        subscription_id: &str,
        machine_fingerprint: &str,
        machine_name: Option<&str>,
    ) -> Result<MachineRegistration> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = Utc::now();

        let seats: u32 = tx
            .query_row(
                "SELECT seats FROM subscriptions WHERE id = ?1",
                params![subscription_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("subscription {subscription_id}")))?;

        let existing = tx
            .query_row(
                "SELECT id, subscription_id, machine_fingerprint, machine_name,
                        activated_at, last_validated, active
                 FROM machine_registrations
                 WHERE subscription_id = ?1 AND machine_fingerprint = ?2",
                params![subscription_id, machine_fingerprint],
                row_to_machine,
            )
            .optional()?;

        let registration = match existing {
            Some(mut machine) if machine.active => {
                tx.execute(
                    "UPDATE machine_registrations SET last_validated = ?1 WHERE id = ?2",
                    params![to_ts(&now), machine.id],
                )?;
                machine.last_validated = Some(now);
                machine
            }
            Some(mut machine) => {
                self.ensure_free_seat(&tx, subscription_id, seats)?;
                tx.execute(
                    "UPDATE machine_registrations
                     SET active = 1, last_validated = ?1, machine_name = ?2
                     WHERE id = ?3",
                    params![to_ts(&now), machine_name, machine.id],
                )?;
                machine.active = true;
                machine.last_validated = Some(now);
                machine.machine_name = machine_name.map(str::to_string);
                machine
            }
            None => {
                self.ensure_free_seat(&tx, subscription_id, seats)?;
                let machine = MachineRegistration {
                    id: uuid::Uuid::new_v4().to_string(),
                    subscription_id: subscription_id.to_string(),
                    machine_fingerprint: machine_fingerprint.to_string(),
                    machine_name: machine_name.map(str::to_string),
                    activated_at: now,
                    last_validated: Some(now),
                    active: true,
                };
                tx.execute(
                    "INSERT INTO machine_registrations
                         (id, subscription_id, machine_fingerprint, machine_name,
                          activated_at, last_validated, active)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1)",
                    params![
                        machine.id,
                        machine.subscription_id,
                        machine.machine_fingerprint,
                        machine.machine_name,
                        to_ts(&machine.activated_at),
                        to_ts(&now),
                    ],
                )?;
                machine
            }
        };

        tx.commit()?;
        Ok(registration)
    }

    pub fn deactivate(&self, subscription_id: &str, machine_fingerprint: &str) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let changed = tx.execute(
            "UPDATE machine_registrations SET active = 0
             WHERE subscription_id = ?1 AND machine_fingerprint = ?2 AND active = 1",
            params![subscription_id, machine_fingerprint],
        )?;
        tx.commit()?;
        if changed == 0 {
            return Err(Error::NotFound("machine is not activated".into()));
        }
        Ok(())
    }

    /// Touch `last_validated` on an active registration.
    pub fn validate(
        &self,
        subscription_id: &str,
        machine_fingerprint: &str,
    ) -> Result<MachineRegistration> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = Utc::now();

        let machine = tx
            .query_row(
                "SELECT id, subscription_id, machine_fingerprint, machine_name,
                        activated_at, last_validated, active
                 FROM machine_registrations
                 WHERE subscription_id = ?1 AND machine_fingerprint = ?2 AND active = 1",
                params![subscription_id, machine_fingerprint],
                row_to_machine,
            )
            .optional()?
            .ok_or_else(|| Error::NotFound("machine is not activated".into()))?;

        tx.execute(
            "UPDATE machine_registrations SET last_validated = ?1 WHERE id = ?2",
            params![to_ts(&now), machine.id],
        )?;
        tx.commit()?;

        Ok(MachineRegistration {
            last_validated: Some(now),
            ..machine
        })
    }

    pub fn list_machines(&self, subscription_id: &str) -> Result<Vec<MachineRegistration>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, subscription_id, machine_fingerprint, machine_name,
                    activated_at, last_validated, active
             FROM machine_registrations
             WHERE subscription_id = ?1
             ORDER BY activated_at, machine_fingerprint",
        )?;
        let machines = stmt
            .query_map(params![subscription_id], row_to_machine)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(machines)
    }

    pub fn count_active(&self, subscription_id: &str) -> Result<u32> {
        let conn = self.conn()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM machine_registrations
             WHERE subscription_id = ?1 AND active = 1",
            params![subscription_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// One-shot trial claim. The row is write-once: a unique violation
    /// means this fingerprint has already consumed its trial, and
    /// nothing ever resets `first_trial_at`.
    pub fn claim_trial(&self, machine_fingerprint: &str, user_email: Option<&str>) -> Result<()> {
        let conn = self.conn()?;
        let outcome = conn.execute(
            "INSERT INTO trial_machines (machine_fingerprint, first_trial_at, user_email)
             VALUES (?1, ?2, ?3)",
            params![machine_fingerprint, to_ts(&Utc::now()), user_email],
        );
        match outcome {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(Error::TrialUsed)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn ensure_free_seat(
        &self,
        tx: &rusqlite::Transaction<'_>,
        subscription_id: &str,
        seats: u32,
    ) -> Result<()> {
        let active: u32 = tx.query_row(
            "SELECT COUNT(*) FROM machine_registrations
             WHERE subscription_id = ?1 AND active = 1",
            params![subscription_id],
            |row| row.get(0),
        )?;
        if active >= seats {
            return Err(Error::SeatsExhausted);
        }
        Ok(())
    }
}

fn to_ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn parse_ts(raw: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}

fn row_to_subscription(row: &rusqlite::Row<'_>) -> rusqlite::Result<SubscriptionRecord> {
    Ok(SubscriptionRecord {
        id: row.get(0)?,
        plan: row.get(1)?,
        status: row.get(2)?,
        seats: row.get(3)?,
        period_start: parse_ts(row.get(4)?)?,
        period_end: parse_ts(row.get(5)?)?,
        trial_end: row.get::<_, Option<String>>(6)?.map(parse_ts).transpose()?,
        owner_email: row.get(7)?,
    })
}

fn row_to_machine(row: &rusqlite::Row<'_>) -> rusqlite::Result<MachineRegistration> {
    Ok(MachineRegistration {
        id: row.get(0)?,
        subscription_id: row.get(1)?,
        machine_fingerprint: row.get(2)?,
        machine_name: row.get(3)?,
        activated_at: parse_ts(row.get(4)?)?,
        last_validated: row.get::<_, Option<String>>(5)?.map(parse_ts).transpose()?,
        active: row.get::<_, i64>(6)? != 0,
    })
}
