//! Transactional email templates
//!
//! Every template renders to a subject plus matching plain-text and HTML
//! bodies. Interpolated values are HTML-escaped.

use rust_decimal::Decimal;

use crate::domain::{AccountType, AdjustmentDirection, Amount, CardExpiry, CardType};

/// A rendered email, ready for a sender
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub text: String,
    pub html: String,
}

/// Account line shown in welcome emails
#[derive(Debug, Clone)]
pub struct AccountSummary {
    pub account_type: AccountType,
    pub masked_number: String,
}

#[derive(Debug, Clone)]
pub enum EmailTemplate {
    ApplicationApproved {
        first_name: String,
        email: String,
        temporary_password: String,
        accounts: Vec<AccountSummary>,
        login_url: String,
    },
    ApplicationRejected {
        first_name: String,
        reason: String,
    },
    AccountOpened {
        first_name: String,
        account_type: AccountType,
        masked_number: String,
        opening_balance: Decimal,
    },
    CardIssued {
        first_name: String,
        card_type: CardType,
        last_four: String,
        expiry: CardExpiry,
    },
    TransactionAdjusted {
        first_name: String,
        direction: AdjustmentDirection,
        amount: Amount,
        masked_number: String,
        balance_after: Decimal,
        description: String,
    },
    AccountDeleted {
        first_name: String,
    },
    Custom {
        first_name: String,
        subject: String,
        message: String,
    },
}

impl EmailTemplate {
    /// Stable template name for logs and audit entries
    pub fn name(&self) -> &'static str {
        match self {
            EmailTemplate::ApplicationApproved { .. } => "application_approved",
            EmailTemplate::ApplicationRejected { .. } => "application_rejected",
            EmailTemplate::AccountOpened { .. } => "account_opened",
            EmailTemplate::CardIssued { .. } => "card_issued",
            EmailTemplate::TransactionAdjusted { .. } => "transaction_adjusted",
            EmailTemplate::AccountDeleted { .. } => "account_deleted",
            EmailTemplate::Custom { .. } => "custom",
        }
    }

    pub fn render(&self) -> RenderedEmail {
        let (subject, first_name, paragraphs) = match self {
            EmailTemplate::ApplicationApproved {
                first_name,
                email,
                temporary_password,
                accounts,
                login_url,
            } => {
                let mut body = vec![
                    "Your application has been approved and your accounts are ready.".to_string(),
                ];
                body.extend(accounts.iter().map(|a| {
                    format!("{} account: {}", a.account_type.label(), a.masked_number)
                }));
                body.push(format!("Sign in at {} with:", login_url));
                body.push(format!("Email: {}", email));
                body.push(format!("Temporary password: {}", temporary_password));
                body.push(
                    "You will be asked to choose a new password after your first sign-in."
                        .to_string(),
                );
                ("Welcome! Your account is approved".to_string(), first_name, body)
            }
            EmailTemplate::ApplicationRejected { first_name, reason } => (
                "Update on your account application".to_string(),
                first_name,
                vec![
                    "Thank you for applying. After review we are unable to open an account for you at this time.".to_string(),
                    format!("Reason: {}", reason),
                    "You are welcome to apply again if your circumstances change.".to_string(),
                ],
            ),
            EmailTemplate::AccountOpened {
                first_name,
                account_type,
                masked_number,
                opening_balance,
            } => (
                format!("Your new {} account is open", account_type.label()),
                first_name,
                vec![
                    format!(
                        "A new {} account ({}) has been opened for you.",
                        account_type.label(),
                        masked_number
                    ),
                    format!("Opening balance: {:.2}", opening_balance),
                ],
            ),
            EmailTemplate::CardIssued {
                first_name,
                card_type,
                last_four,
                expiry,
            } => (
                "Your new card has been issued".to_string(),
                first_name,
                vec![
                    format!(
                        "A new {} card ending in {} has been issued to you.",
                        card_type, last_four
                    ),
                    format!("Expires: {}", expiry),
                    "If you did not expect this card, contact support immediately.".to_string(),
                ],
            ),
            EmailTemplate::TransactionAdjusted {
                first_name,
                direction,
                amount,
                masked_number,
                balance_after,
                description,
            } => {
                let verb = match direction {
                    AdjustmentDirection::Credit => "credited to",
                    AdjustmentDirection::Debit => "debited from",
                };
                (
                    "An adjustment was made to your account".to_string(),
                    first_name,
                    vec![
                        format!("{} was {} your account {}.", amount, verb, masked_number),
                        format!("Description: {}", description),
                        format!("New balance: {:.2}", balance_after),
                    ],
                )
            }
            EmailTemplate::AccountDeleted { first_name } => (
                "Your account has been closed".to_string(),
                first_name,
                vec![
                    "Your profile and all associated accounts have been closed and your data removed.".to_string(),
                    "If you did not request this, contact support.".to_string(),
                ],
            ),
            EmailTemplate::Custom {
                first_name,
                subject,
                message,
            } => (
                subject.clone(),
                first_name,
                message
                    .split("\n\n")
                    .map(|p| p.trim().to_string())
                    .filter(|p| !p.is_empty())
                    .collect(),
            ),
        };

        let greeting = format!("Hello {},", first_name);
        let text = std::iter::once(greeting.as_str())
            .chain(paragraphs.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join("\n\n");
        let html = layout(&subject, &greeting, &paragraphs);

        RenderedEmail { subject, text, html }
    }
}

fn layout(title: &str, greeting: &str, paragraphs: &[String]) -> String {
    let mut html = String::new();
    html.push_str("<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>");
    html.push_str(&escape_html(title));
    html.push_str("</title></head><body style=\"font-family:sans-serif;line-height:1.5\">");
    html.push_str(&format!("<p>{}</p>", escape_html(greeting)));
    for paragraph in paragraphs {
        html.push_str(&format!("<p>{}</p>", escape_html(paragraph)));
    }
    html.push_str("</body></html>");
    html
}

pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
