//! Core data models for the finance agent

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

//
// ================= Ledger Records =================
//

/// A chat user, identified by a phone-number-like string.
///
/// Created on first inbound message from an unseen identity; never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub phone_number: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Build the record for a first-contact identity.
    ///
    /// The id is derived deterministically from the phone number so that
    /// concurrent first messages from the same sender converge on one record.
    pub fn from_phone(phone_number: &str) -> Self {
        let suffix: String = phone_number
            .chars()
            .rev()
            .take(4)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        let now = Utc::now();

        Self {
            id: stable_uuid_from_string(phone_number),
            phone_number: phone_number.to_string(),
            name: format!("Usuário {}", suffix),
            created_at: now,
            updated_at: now,
        }
    }
}

/// An expense category. Names are unique per user, case-insensitively.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Category {
    pub fn new(user_id: Uuid, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            name: name.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Case-insensitive name comparison used everywhere a category is
    /// looked up by what the user typed.
    pub fn name_matches(&self, other: &str) -> bool {
        self.name.to_lowercase() == other.to_lowercase()
    }
}

/// A single recorded expense. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expense {
    pub id: Uuid,
    pub user_id: Uuid,
    pub category_id: Uuid,
    pub description: String,
    pub amount: f64,
    pub date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Expense {
    pub fn new(
        user_id: Uuid,
        category_id: Uuid,
        description: impl Into<String>,
        amount: f64,
        date: Option<DateTime<Utc>>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            category_id,
            description: description.into(),
            amount,
            date: date.unwrap_or(now),
            created_at: now,
        }
    }
}

/// A per-category monthly spending limit.
///
/// At most one record exists per (user_id, category_id, month, year);
/// writing to an existing key updates `amount` instead of inserting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Budget {
    pub id: Uuid,
    pub user_id: Uuid,
    pub category_id: Uuid,
    pub amount: f64,
    pub month: u32,
    pub year: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//
// ================= Derived (never persisted) =================
//

/// Spend figures for one budget, recomputed from expenses on every read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetProgress {
    pub budget: Budget,
    pub category_name: String,
    pub spent: f64,
    /// spent / amount × 100, rounded to two decimals; 0 when amount ≤ 0.
    pub percentage: f64,
    /// max(0, amount − spent)
    pub remaining: f64,
    pub is_over_budget: bool,
    /// The three most recent expenses inside the budget window.
    pub recent_expenses: Vec<Expense>,
}

/// Outcome of a budget create-or-update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetUpsert {
    pub budget: Budget,
    pub is_update: bool,
    pub is_new: bool,
    pub previous_amount: Option<f64>,
}

/// Outcome of a budget deletion. A missing record is a miss, not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetDeletion {
    pub success: bool,
    pub budget: Option<Budget>,
}

//
// ================= Classified Intent =================
//

/// The structured action a free-text message is classified into.
///
/// Closed tagged variant so dispatcher branches are exhaustive; carries
/// exactly the fields each action needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Intent {
    Expense {
        description: String,
        amount: f64,
        date: Option<DateTime<Utc>>,
    },
    CategoryList,
    CategoryCreate {
        name: String,
    },
    BudgetInfo,
    BudgetCreate {
        category_name: String,
        amount: f64,
    },
    BudgetCheck {
        category_name: Option<String>,
    },
    BudgetDelete {
        category_name: Option<String>,
    },
    None,
}

//
// ================= Inbound Boundary =================
//

/// Normalized inbound event handed to the core by the chat transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    pub sender_id: String,
    pub text: String,
    pub message_id: String,
}

//
// ================= Helpers =================
//

/// Derive a stable RFC4122-shaped UUID from an arbitrary identity string.
pub fn stable_uuid_from_string(input: &str) -> Uuid {
    let hash = Sha256::digest(input.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&hash[..16]);

    // Set UUID version (4) and variant (RFC4122) bits.
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    Uuid::from_bytes(bytes)
}
