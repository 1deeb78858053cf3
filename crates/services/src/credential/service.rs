use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;

use super::pool::PoolPolicy;
use super::ports::{
    publish_instant, Credential, CredentialError, CredentialHealthReport, CredentialRepository,
    CredentialService, NewCredential,
};
use crate::allocation::{active_clients, Allocator};
use crate::customer::CustomerRepository;
use crate::reconciliation::ReconciliationTrigger;
use crate::subscription::codec::is_storable_service_name;
use crate::types::CredentialId;

/// Configuration for CredentialServiceImpl
pub struct CredentialServiceConfig {
    pub credential_repo: Arc<dyn CredentialRepository>,
    pub customer_repo: Arc<dyn CustomerRepository>,
    pub pool_policy: PoolPolicy,
    pub trigger: Arc<dyn ReconciliationTrigger>,
}

pub struct CredentialServiceImpl {
    credential_repo: Arc<dyn CredentialRepository>,
    customer_repo: Arc<dyn CustomerRepository>,
    pool_policy: PoolPolicy,
    trigger: Arc<dyn ReconciliationTrigger>,
}

impl CredentialServiceImpl {
    pub fn new(config: CredentialServiceConfig) -> Self {
        Self {
            credential_repo: config.credential_repo,
            customer_repo: config.customer_repo,
            pool_policy: config.pool_policy,
            trigger: config.trigger,
        }
    }

    async fn load(&self, id: CredentialId) -> Result<Credential, CredentialError> {
        self.credential_repo
            .get_credential(id)
            .await?
            .ok_or(CredentialError::NotFound)
    }
}

fn require(value: &str, field: &str) -> Result<(), CredentialError> {
    if value.trim().is_empty() {
        return Err(CredentialError::InvalidInput(format!(
            "{} cannot be empty",
            field
        )));
    }
    Ok(())
}

#[async_trait]
impl CredentialService for CredentialServiceImpl {
    async fn publish_credential(&self, new: NewCredential) -> Result<Credential, CredentialError> {
        if !is_storable_service_name(&new.service) {
            return Err(CredentialError::InvalidInput(
                "Service must be non-empty and cannot contain ';' or '|'".to_string(),
            ));
        }
        require(&new.secret_email, "Secret email")?;
        require(&new.secret_password, "Secret password")?;

        let now = publish_instant(Utc::now());
        let credential = Credential {
            id: CredentialId::new(),
            service: new.service.trim().to_string(),
            secret_email: new.secret_email.trim().to_string(),
            secret_password: new.secret_password,
            published_at: now,
            visible: new.visible,
            created_at: now,
            updated_at: now,
        };
        self.credential_repo.upsert_credential(&credential).await?;

        tracing::info!(
            credential_id = %credential.id,
            service = %credential.service,
            visible = credential.visible,
            "Published credential"
        );
        self.trigger.trigger().await;
        Ok(credential)
    }

    async fn rotate_secret(
        &self,
        id: CredentialId,
        secret_email: Option<String>,
        secret_password: String,
    ) -> Result<Credential, CredentialError> {
        require(&secret_password, "Secret password")?;
        if let Some(email) = &secret_email {
            require(email, "Secret email")?;
        }

        let mut credential = self.load(id).await?;
        let email = secret_email
            .map(|e| e.trim().to_string())
            .unwrap_or_else(|| credential.secret_email.clone());
        if email == credential.secret_email && secret_password == credential.secret_password {
            tracing::debug!(credential_id = %id, "Secret unchanged, keeping current version");
            return Ok(credential);
        }

        let published_at = credential.next_published_at(Utc::now());
        credential.secret_email = email;
        credential.secret_password = secret_password;
        credential.published_at = published_at;
        credential.updated_at = published_at;
        self.credential_repo.upsert_credential(&credential).await?;

        tracing::info!(
            credential_id = %id,
            version_key = %credential.version_key(),
            "Rotated credential secret"
        );
        self.trigger.trigger().await;
        Ok(credential)
    }

    async fn set_visibility(
        &self,
        id: CredentialId,
        visible: bool,
    ) -> Result<Credential, CredentialError> {
        let mut credential = self.load(id).await?;
        if credential.visible == visible {
            return Ok(credential);
        }

        credential.visible = visible;
        credential.updated_at = Utc::now();
        self.credential_repo.upsert_credential(&credential).await?;

        tracing::info!(credential_id = %id, visible, "Changed credential visibility");
        self.trigger.trigger().await;
        Ok(credential)
    }

    async fn delete_credential(&self, id: CredentialId) -> Result<(), CredentialError> {
        let credential = self.load(id).await?;
        self.credential_repo.delete_credential(id).await?;

        tracing::info!(
            credential_id = %id,
            service = %credential.service,
            "Deleted credential"
        );
        self.trigger.trigger().await;
        Ok(())
    }

    async fn pool_health(
        &self,
        service: &str,
    ) -> Result<Vec<CredentialHealthReport>, CredentialError> {
        let customers = self.customer_repo.list_customers().await?;
        let credentials = self.credential_repo.list_credentials().await?;
        let now = Utc::now();

        let mut allocator = Allocator::new(&customers, &credentials, &self.pool_policy);
        let mut assignees: HashMap<CredentialId, usize> = HashMap::new();
        for customer in active_clients(&customers, service) {
            if let Some(assignment) = allocator.assign(customer, service) {
                *assignees.entry(assignment.credential.id).or_default() += 1;
            }
        }

        let reports = allocator
            .pool(service)
            .credentials()
            .iter()
            .enumerate()
            .map(|(pool_index, credential)| {
                let count = assignees.get(&credential.id).copied().unwrap_or(0);
                CredentialHealthReport {
                    credential: credential.clone(),
                    pool_index,
                    assignees: count,
                    health: self.pool_policy.classify(credential, count, now),
                }
            })
            .collect();

        Ok(reports)
    }
}
