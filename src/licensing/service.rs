//! License service layer: the operations behind `/license/*`, wired
//! through the seat registry and the blob issuer.

use chrono::Utc;

use crate::audit::{self, AuditKind};
use crate::config::LicensingConfig;
use crate::errors::{Error, Result};
use crate::licensing::blob::LicenseIssuer;
use crate::licensing::registry::{SeatRegistry, SubscriptionRecord};
use crate::licensing::schemas::{
    ActivateRequest, LicenseResponse, LicenseStatusResponse, MachineResponse, ValidateRequest,
};

pub struct LicenseService {
    registry: SeatRegistry,
    issuer: LicenseIssuer,
    config: LicensingConfig,
}

impl LicenseService {
    pub fn new(registry: SeatRegistry, issuer: LicenseIssuer, config: LicensingConfig) -> Self {
        Self {
            registry,
            issuer,
            config,
        }
    }

    pub fn registry(&self) -> &SeatRegistry {
        &self.registry
    }

    pub fn public_key_b64(&self) -> String {
        self.issuer.public_key_b64()
    }

    /// Claim a seat for a machine and hand back a signed offline blob.
    pub fn activate(&self, owner_email: &str, request: &ActivateRequest) -> Result<LicenseResponse> {
        request.validate()?;
        let subscription = self.active_subscription(owner_email)?;

        self.registry.activate(
            &subscription.id,
            &request.machine_fingerprint,
            request.machine_name.as_deref(),
        )?;
        audit::license_event(
            AuditKind::MachineActivated,
            owner_email,
            &request.machine_fingerprint,
        );

        self.issue_response(&subscription, owner_email, &request.machine_fingerprint)
    }

    /// Periodic online check from the client; refreshes `last_validated`.
    pub fn validate(
        &self,
        owner_email: &str,
        request: &ValidateRequest,
    ) -> Result<LicenseStatusResponse> {
        request.validate()?;
        let subscription = self.active_subscription(owner_email)?;

        match self
            .registry
            .validate(&subscription.id, &request.machine_fingerprint)
        {
            Ok(_) => {
                audit::license_event(
                    AuditKind::LicenseValidated,
                    owner_email,
                    &request.machine_fingerprint,
                );
                let days_remaining = (subscription.period_end - Utc::now()).num_days();
                Ok(LicenseStatusResponse {
                    valid: true,
                    plan: Some(subscription.plan),
                    expires_at: Some(subscription.period_end),
                    seats: Some(subscription.seats),
                    days_remaining: Some(days_remaining.max(0)),
                    message: String::new(),
                })
            }
            Err(Error::NotFound(_)) => Ok(LicenseStatusResponse {
                valid: false,
                plan: Some(subscription.plan),
                expires_at: None,
                seats: Some(subscription.seats),
                days_remaining: None,
                message: "This machine is not activated.".into(),
            }),
            Err(e) => Err(e),
        }
    }

    /// A fresh signed blob for a machine that already holds a seat. The
    /// new blob supersedes any previously issued one.
    pub fn offline_key(&self, owner_email: &str, machine_fingerprint: &str) -> Result<LicenseResponse> {
        crate::licensing::schemas::validate_fingerprint(machine_fingerprint)?;
        let subscription = self.active_subscription(owner_email)?;
        self.registry
            .validate(&subscription.id, machine_fingerprint)?;
        self.issue_response(&subscription, owner_email, machine_fingerprint)
    }

    pub fn deactivate(&self, owner_email: &str, machine_fingerprint: &str) -> Result<()> {
        let subscription = self.active_subscription(owner_email)?;
        self.registry
            .deactivate(&subscription.id, machine_fingerprint)?;
        audit::license_event(
            AuditKind::MachineDeactivated,
            owner_email,
            machine_fingerprint,
        );
        Ok(())
    }

    pub fn machines(&self, owner_email: &str) -> Result<Vec<MachineResponse>> {
        let subscription = self.active_subscription(owner_email)?;
        let machines = self.registry.list_machines(&subscription.id)?;
        Ok(machines
            .into_iter()
            .map(|m| MachineResponse {
                id: m.id,
                machine_fingerprint: m.machine_fingerprint,
                machine_name: m.machine_name,
                activated_at: m.activated_at,
                last_validated: m.last_validated,
                is_active: m.active,
            })
            .collect())
    }

    /// One-time free trial for a machine. The fingerprint row is
    /// write-once; a machine that trialed before gets `TrialUsed` no
    /// matter which account asks.
    pub fn claim_trial(&self, machine_fingerprint: &str, user_email: Option<&str>) -> Result<()> {
        if !self.config.free_trial_allowed {
            return Err(Error::InvalidInput("free trials are not available".into()));
        }
        crate::licensing::schemas::validate_fingerprint(machine_fingerprint)?;
        self.registry.claim_trial(machine_fingerprint, user_email)?;
        audit::license_event(
            AuditKind::TrialClaimed,
            user_email.unwrap_or("-"),
            machine_fingerprint,
        );
        Ok(())
    }

    fn active_subscription(&self, owner_email: &str) -> Result<SubscriptionRecord> {
        let subscription = self.registry.subscription_for_owner(owner_email)?;
        match subscription.status.as_str() {
            "active" | "trialing" => Ok(subscription),
            other => Err(Error::NotFound(format!(
                "subscription for {owner_email} is {other}"
            ))),
        }
    }

    fn issue_response(
        &self,
        subscription: &SubscriptionRecord,
        owner_email: &str,
        machine_fingerprint: &str,
    ) -> Result<LicenseResponse> {
        let (blob, payload) = self.issuer.issue(
            owner_email,
            &subscription.plan,
            subscription.seats,
            machine_fingerprint,
        )?;
        audit::license_event(AuditKind::LicenseIssued, owner_email, machine_fingerprint);

        Ok(LicenseResponse {
            license_blob: blob,
            expires_at: payload.expires,
            plan: payload.plan,
            seats: payload.seats,
            machine_fingerprint: machine_fingerprint.to_string(),
        })
    }
}
