//! Card Handlers
//!
//! Issuance and status changes. Responses carry the masked number only;
//! the full PAN and CVV stay in the database.

use sqlx::PgPool;

use crate::audit::{AuditAction, AuditLogBuilder, AuditLogService};
use crate::domain::{CardStatus, DomainError, OperationContext};
use crate::error::AppError;
use crate::notifications::{EmailTemplate, NotificationService};
use crate::state::{AppState, ProvisioningSettings};

use super::provisioning::{
    insert_card, issued_card_view, unique_card_number, violates_live_card_index, NewCard,
};
use super::store::{fetch_account, fetch_card, fetch_profile, Lock};
use super::{
    require_admin, CardStatusResult, IssueCardCommand, IssueCardResult, UpdateCardStatusCommand,
};

// =========================================================================
// Issue
// =========================================================================

pub struct IssueCardHandler {
    pool: PgPool,
    notifier: NotificationService,
    audit: AuditLogService,
    settings: ProvisioningSettings,
}

impl IssueCardHandler {
    pub fn new(state: &AppState) -> Self {
        Self {
            pool: state.pool.clone(),
            notifier: state.notifier.clone(),
            audit: AuditLogService::new(state.pool.clone()),
            settings: state.settings.clone(),
        }
    }

    pub async fn execute(
        &self,
        command: IssueCardCommand,
        context: &OperationContext,
    ) -> Result<IssueCardResult, AppError> {
        require_admin(context)?;
        let cardholder_override = command.validated_cardholder_name()?;

        let profile = fetch_profile(&self.pool, command.user_id).await?;
        let account = fetch_account(&self.pool, command.account_id, Lock::None).await?;

        if account.user_id != profile.id {
            return Err(DomainError::BusinessRuleViolation(format!(
                "account {} does not belong to user {}",
                account.id, profile.id
            ))
            .into());
        }
        account.status()?.ensure_active()?;

        let live_exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM cards
                WHERE account_id = $1 AND card_type = $2 AND status IN ('active', 'frozen')
            )
            "#,
        )
        .bind(account.id)
        .bind(command.card_type.as_str())
        .fetch_one(&self.pool)
        .await?;

        if live_exists {
            return Err(AppError::Conflict(format!(
                "account {} already has a live {} card",
                account.id, command.card_type
            )));
        }

        let cardholder_name =
            cardholder_override.unwrap_or_else(|| profile.full_name().to_uppercase());
        let card_number = unique_card_number(&self.pool, &self.settings.card_bin).await?;

        let mut conn = self.pool.acquire().await?;
        let card = insert_card(
            &mut conn,
            &NewCard {
                user_id: profile.id,
                account_id: account.id,
                card_number,
                cardholder_name,
                card_type: command.card_type,
                spending_limit: command.spending_limit.map(|limit| limit.value()),
                validity_years: self.settings.card_validity_years,
            },
        )
        .await?;
        drop(conn);

        let view = issued_card_view(&card, command.card_type);

        tracing::info!(
            card_id = %card.id,
            account_id = %account.id,
            card_type = %command.card_type,
            last_four = %card.last_four,
            "Card issued"
        );

        self.audit
            .record(
                AuditLogBuilder::new(AuditAction::CardIssued)
                    .resource("card", card.id)
                    .after_state(&view),
                context,
            )
            .await;

        let email_sent = self
            .notifier
            .notify(
                &profile.email,
                EmailTemplate::CardIssued {
                    first_name: profile.first_name.clone(),
                    card_type: command.card_type,
                    last_four: card.last_four.clone(),
                    expiry: card.expiry(),
                },
            )
            .await;

        Ok(IssueCardResult {
            card: view,
            user_id: profile.id,
            cardholder_name: card.cardholder_name,
            spending_limit: card.spending_limit,
            status: CardStatus::Active,
            email_sent,
        })
    }
}

// =========================================================================
// Status change
// =========================================================================

pub struct UpdateCardStatusHandler {
    pool: PgPool,
    audit: AuditLogService,
}

impl UpdateCardStatusHandler {
    pub fn new(state: &AppState) -> Self {
        Self {
            pool: state.pool.clone(),
            audit: AuditLogService::new(state.pool.clone()),
        }
    }

    pub async fn execute(
        &self,
        command: UpdateCardStatusCommand,
        context: &OperationContext,
    ) -> Result<CardStatusResult, AppError> {
        require_admin(context)?;

        let mut tx = self.pool.begin().await?;

        let card = fetch_card(&mut *tx, command.card_id, Lock::ForUpdate).await?;
        let previous = card.status()?;
        let next = previous.transition_to(command.status)?;

        sqlx::query("UPDATE cards SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(card.id)
            .bind(next.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                // Unfreezing while another live card of the type exists
                if violates_live_card_index(&e) {
                    AppError::Conflict(format!(
                        "account {} already has a live {} card",
                        card.account_id, card.card_type
                    ))
                } else {
                    AppError::Database(e)
                }
            })?;

        tx.commit().await?;

        tracing::info!(
            card_id = %card.id,
            from = %previous,
            to = %next,
            "Card status changed"
        );

        self.audit
            .record(
                AuditLogBuilder::new(AuditAction::CardStatusChanged)
                    .resource("card", card.id)
                    .before_state(&serde_json::json!({ "status": previous }))
                    .after_state(&serde_json::json!({ "status": next }))
                    .changed_fields(&["status"]),
                context,
            )
            .await;

        Ok(CardStatusResult {
            card_id: card.id,
            previous_status: previous,
            status: next,
        })
    }
}
