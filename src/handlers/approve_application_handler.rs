//! Application Approval Handler
//!
//! Turns a pending application into a customer: auth user, optional
//! payment customer, profile, accounts and an optional first card.
//!
//! Provider calls happen first; all database writes then go through one
//! transaction. If that transaction fails the provider records are
//! deleted again so no half-provisioned customer is left behind.

use std::sync::Arc;

use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::audit::{AuditAction, AuditLogBuilder, AuditLogService};
use crate::domain::generators::generate_temporary_password;
use crate::domain::{AccountType, Application, OperationContext};
use crate::error::AppError;
use crate::integrations::{AuthProvider, NewAuthUser, NewCustomer, PaymentProvider};
use crate::notifications::{AccountSummary, EmailTemplate, NotificationService};
use crate::state::{AppState, ProvisioningSettings};

use super::provisioning::{
    insert_account, insert_card, issued_card_view, unique_account_number, unique_card_number,
    NewAccount, NewCard,
};
use super::store::{fetch_application, profile_email_exists, Lock};
use super::{require_admin, ApprovalResult, ApproveApplicationCommand, IssuedCard, ProvisionedAccount};

/// Handler for application approval
pub struct ApproveApplicationHandler {
    pool: PgPool,
    auth: Arc<dyn AuthProvider>,
    payments: Option<Arc<dyn PaymentProvider>>,
    notifier: NotificationService,
    audit: AuditLogService,
    settings: ProvisioningSettings,
}

/// What the transaction wrote
struct Provisioned {
    accounts: Vec<ProvisionedAccount>,
    card: Option<IssuedCard>,
}

impl ApproveApplicationHandler {
    pub fn new(state: &AppState) -> Self {
        Self {
            pool: state.pool.clone(),
            auth: state.auth.clone(),
            payments: state.payments.clone(),
            notifier: state.notifier.clone(),
            audit: AuditLogService::new(state.pool.clone()),
            settings: state.settings.clone(),
        }
    }

    pub async fn execute(
        &self,
        command: ApproveApplicationCommand,
        context: &OperationContext,
    ) -> Result<ApprovalResult, AppError> {
        command.validate()?;
        let reviewer = require_admin(context)?;

        let application =
            fetch_application(&self.pool, command.application_id, Lock::None).await?;
        application.status()?.ensure_reviewable()?;

        if profile_email_exists(&self.pool, &application.email).await? {
            return Err(AppError::Conflict(format!(
                "a customer profile with email {} already exists",
                application.email
            )));
        }

        // Nothing has been written yet, so a failure here needs no cleanup
        let temporary_password = generate_temporary_password(&mut rand::thread_rng());
        let user_id = self
            .auth
            .create_user(&NewAuthUser {
                email: application.email.clone(),
                password: temporary_password.clone(),
                first_name: application.first_name.clone(),
                last_name: application.last_name.clone(),
            })
            .await?;

        let payment_customer_id = self.create_payment_customer(user_id, &application).await;

        let provisioned = match self
            .provision(&command, &application, user_id, payment_customer_id.as_deref(), reviewer)
            .await
        {
            Ok(provisioned) => provisioned,
            Err(e) => {
                tracing::error!(
                    application_id = %application.id,
                    user_id = %user_id,
                    error = %e,
                    "Approval failed after auth user creation, compensating"
                );
                self.compensate(user_id, payment_customer_id.as_deref()).await;
                return Err(e);
            }
        };

        tracing::info!(
            application_id = %application.id,
            user_id = %user_id,
            accounts = provisioned.accounts.len(),
            card_issued = provisioned.card.is_some(),
            "Application approved"
        );

        self.audit
            .record(
                AuditLogBuilder::new(AuditAction::ApplicationApproved)
                    .resource("application", application.id)
                    .before_state(&serde_json::json!({ "status": application.status }))
                    .after_state(&serde_json::json!({
                        "status": "approved",
                        "user_id": user_id,
                        "account_ids": provisioned.accounts.iter().map(|a| a.account_id).collect::<Vec<_>>(),
                        "card_id": provisioned.card.as_ref().map(|c| c.card_id),
                        "payment_customer_id": payment_customer_id,
                    }))
                    .changed_fields(&["status", "reviewed_by", "reviewed_at", "user_id"]),
                context,
            )
            .await;

        let email_sent = self
            .notifier
            .notify(
                &application.email,
                EmailTemplate::ApplicationApproved {
                    first_name: application.first_name.clone(),
                    email: application.email.clone(),
                    temporary_password,
                    accounts: provisioned
                        .accounts
                        .iter()
                        .map(|a| AccountSummary {
                            account_type: a.account_type,
                            masked_number: a.masked_number.clone(),
                        })
                        .collect(),
                    login_url: self.settings.login_url.clone(),
                },
            )
            .await;

        Ok(ApprovalResult {
            application_id: application.id,
            user_id,
            accounts: provisioned.accounts,
            card: provisioned.card,
            payment_customer_id,
            email_sent,
        })
    }

    /// Best-effort: approval proceeds without a payment customer
    async fn create_payment_customer(
        &self,
        user_id: Uuid,
        application: &Application,
    ) -> Option<String> {
        let payments = self.payments.as_ref()?;
        let customer = NewCustomer {
            user_id,
            email: application.email.clone(),
            name: application.full_name(),
        };

        match payments.create_customer(&customer).await {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!(
                    user_id = %user_id,
                    error = %e,
                    "Payment customer creation failed, continuing without it"
                );
                None
            }
        }
    }

    async fn provision(
        &self,
        command: &ApproveApplicationCommand,
        application: &Application,
        user_id: Uuid,
        payment_customer_id: Option<&str>,
        reviewer: Uuid,
    ) -> Result<Provisioned, AppError> {
        // Numbers are drawn before the transaction opens; lookups use the pool
        let mut numbers: Vec<(AccountType, String)> = Vec::with_capacity(command.account_types.len());
        for account_type in &command.account_types {
            numbers.push((*account_type, unique_account_number(&self.pool).await?));
        }
        let card_number = if command.issue_card {
            Some(unique_card_number(&self.pool, &self.settings.card_bin).await?)
        } else {
            None
        };

        let mut tx = self.pool.begin().await?;

        // Re-check under lock: a concurrent review may have won
        let locked = fetch_application(&mut *tx, application.id, Lock::ForUpdate).await?;
        locked.status()?.ensure_reviewable()?;

        sqlx::query(
            r#"
            INSERT INTO profiles (id, application_id, email, first_name, last_name, phone, payment_customer_id, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'active')
            "#,
        )
        .bind(user_id)
        .bind(application.id)
        .bind(application.email.trim())
        .bind(&application.first_name)
        .bind(&application.last_name)
        .bind(&application.phone)
        .bind(payment_customer_id)
        .execute(&mut *tx)
        .await?;

        let mut accounts = Vec::with_capacity(numbers.len());
        let mut first_account_id = None;
        for (account_type, account_number) in numbers {
            let account = insert_account(
                &mut tx,
                &NewAccount {
                    user_id,
                    account_type,
                    account_number,
                    routing_number: self.settings.routing_number.clone(),
                    opening_balance: Decimal::ZERO,
                },
            )
            .await?;
            first_account_id.get_or_insert(account.id);
            accounts.push(ProvisionedAccount {
                account_id: account.id,
                account_type,
                masked_number: account.masked_number(),
            });
        }

        let card = match (card_number, first_account_id) {
            (Some(card_number), Some(account_id)) => {
                let card = insert_card(
                    &mut tx,
                    &NewCard {
                        user_id,
                        account_id,
                        card_number,
                        cardholder_name: application.full_name().to_uppercase(),
                        card_type: command.card_type,
                        spending_limit: None,
                        validity_years: self.settings.card_validity_years,
                    },
                )
                .await?;
                Some(issued_card_view(&card, command.card_type))
            }
            _ => None,
        };

        sqlx::query(
            r#"
            UPDATE applications
            SET status = 'approved', reviewed_by = $2, reviewed_at = NOW(),
                user_id = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(application.id)
        .bind(reviewer)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Provisioned { accounts, card })
    }

    /// Undo provider-side records after a failed transaction
    async fn compensate(&self, user_id: Uuid, payment_customer_id: Option<&str>) {
        if let (Some(payments), Some(customer_id)) = (&self.payments, payment_customer_id) {
            if let Err(e) = payments.delete_customer(customer_id).await {
                tracing::warn!(customer_id, error = %e, "Failed to delete payment customer");
            }
        }

        if let Err(e) = self.auth.delete_user(user_id).await {
            tracing::error!(
                user_id = %user_id,
                error = %e,
                "Failed to delete auth user; manual cleanup required"
            );
        }
    }
}
