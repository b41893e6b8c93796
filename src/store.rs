//! Ledger persistence layer
//!
//! Pure data access over Users, Categories, Expenses and Budgets — no
//! business rules. The trait is the seam for a document-store driver;
//! the in-memory implementation backs tests and local runs.
//!
//! `upsert_budget` is the atomic find-and-update-or-insert primitive that
//! keeps the at-most-one-per-(user, category, month, year) invariant safe
//! under concurrent messages from the same user.

use crate::models::{Budget, Category, Expense, User};
use crate::Result;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Conjunction of predicates for expense queries.
#[derive(Debug, Clone, Default)]
pub struct ExpenseFilter {
    pub category_id: Option<Uuid>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

/// Trait for ledger persistence
#[async_trait::async_trait]
pub trait LedgerStore: Send + Sync {
    // Users
    async fn find_user_by_phone(&self, phone_number: &str) -> Result<Option<User>>;
    async fn insert_user(&self, user: User) -> Result<User>;

    // Categories
    /// All categories of a user, sorted by name.
    async fn find_categories(&self, user_id: Uuid) -> Result<Vec<Category>>;
    async fn find_category_by_id(&self, user_id: Uuid, category_id: Uuid)
        -> Result<Option<Category>>;
    /// Case-insensitive exact-name lookup.
    async fn find_category_by_name(&self, user_id: Uuid, name: &str) -> Result<Option<Category>>;
    async fn insert_category(&self, category: Category) -> Result<Category>;
    async fn count_categories(&self, user_id: Uuid) -> Result<usize>;

    // Expenses
    async fn insert_expense(&self, expense: Expense) -> Result<Expense>;
    /// Matching expenses, most recent date first.
    async fn find_expenses(&self, user_id: Uuid, filter: ExpenseFilter) -> Result<Vec<Expense>>;

    // Budgets
    async fn find_budget(
        &self,
        user_id: Uuid,
        category_id: Uuid,
        month: u32,
        year: i32,
    ) -> Result<Option<Budget>>;
    async fn find_budgets_for_period(
        &self,
        user_id: Uuid,
        month: u32,
        year: i32,
    ) -> Result<Vec<Budget>>;
    /// Atomic create-or-update on the uniqueness key. Returns the stored
    /// budget and the previous amount when an existing record was updated.
    async fn upsert_budget(
        &self,
        user_id: Uuid,
        category_id: Uuid,
        month: u32,
        year: i32,
        amount: f64,
    ) -> Result<(Budget, Option<f64>)>;
    /// Deletes the unique matching record, returning it when one existed.
    async fn delete_budget(
        &self,
        user_id: Uuid,
        category_id: Uuid,
        month: u32,
        year: i32,
    ) -> Result<Option<Budget>>;
}

/// In-memory ledger store for development and tests
pub struct InMemoryLedgerStore {
    users: Arc<RwLock<HashMap<Uuid, User>>>,
    categories: Arc<RwLock<HashMap<Uuid, Category>>>,
    expenses: Arc<RwLock<Vec<Expense>>>,
    budgets: Arc<RwLock<HashMap<Uuid, Budget>>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self {
            users: Arc::new(RwLock::new(HashMap::new())),
            categories: Arc::new(RwLock::new(HashMap::new())),
            expenses: Arc::new(RwLock::new(Vec::new())),
            budgets: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl LedgerStore for InMemoryLedgerStore {

    async fn find_user_by_phone(&self, phone_number: &str) -> Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|user| user.phone_number == phone_number)
            .cloned())
    }

    async fn insert_user(&self, user: User) -> Result<User> {
        let mut users = self.users.write().await;
        let stored = users.entry(user.id).or_insert(user);
        Ok(stored.clone())
    }

    async fn find_categories(&self, user_id: Uuid) -> Result<Vec<Category>> {
        let categories = self.categories.read().await;
        let mut owned: Vec<Category> = categories
            .values()
            .filter(|category| category.user_id == user_id)
            .cloned()
            .collect();

        owned.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        Ok(owned)
    }

    async fn find_category_by_id(
        &self,
        user_id: Uuid,
        category_id: Uuid,
    ) -> Result<Option<Category>> {
        let categories = self.categories.read().await;
        Ok(categories
            .get(&category_id)
            .filter(|category| category.user_id == user_id)
            .cloned())
    }

    async fn find_category_by_name(&self, user_id: Uuid, name: &str) -> Result<Option<Category>> {
        let categories = self.categories.read().await;
        Ok(categories
            .values()
            .find(|category| category.user_id == user_id && category.name_matches(name))
            .cloned())
    }

    async fn insert_category(&self, category: Category) -> Result<Category> {
        let mut categories = self.categories.write().await;

        // Uniqueness is case-insensitive per user; a concurrent duplicate
        // resolves to the record that got there first.
        if let Some(existing) = categories
            .values()
            .find(|c| c.user_id == category.user_id && c.name_matches(&category.name))
        {
            return Ok(existing.clone());
        }

        categories.insert(category.id, category.clone());
        Ok(category)
    }

    async fn count_categories(&self, user_id: Uuid) -> Result<usize> {
        let categories = self.categories.read().await;
        Ok(categories
            .values()
            .filter(|category| category.user_id == user_id)
            .count())
    }

    async fn insert_expense(&self, expense: Expense) -> Result<Expense> {
        let mut expenses = self.expenses.write().await;
        expenses.push(expense.clone());
        Ok(expense)
    }

    async fn find_expenses(&self, user_id: Uuid, filter: ExpenseFilter) -> Result<Vec<Expense>> {
        let expenses = self.expenses.read().await;

        let mut matching: Vec<Expense> = expenses
            .iter()
            .filter(|expense| expense.user_id == user_id)
            .filter(|expense| {
                filter
                    .category_id
                    .map_or(true, |category_id| expense.category_id == category_id)
            })
            .filter(|expense| filter.start.map_or(true, |start| expense.date >= start))
            .filter(|expense| filter.end.map_or(true, |end| expense.date <= end))
            .cloned()
            .collect();

        matching.sort_by(|a, b| b.date.cmp(&a.date));

        if let Some(limit) = filter.limit {
            matching.truncate(limit);
        }

        Ok(matching)
    }

    async fn find_budget(
        &self,
        user_id: Uuid,
        category_id: Uuid,
        month: u32,
        year: i32,
    ) -> Result<Option<Budget>> {
        let budgets = self.budgets.read().await;
        Ok(budgets
            .values()
            .find(|budget| {
                budget.user_id == user_id
                    && budget.category_id == category_id
                    && budget.month == month
                    && budget.year == year
            })
            .cloned())
    }

    async fn find_budgets_for_period(
        &self,
        user_id: Uuid,
        month: u32,
        year: i32,
    ) -> Result<Vec<Budget>> {
        let budgets = self.budgets.read().await;
        Ok(budgets
            .values()
            .filter(|budget| {
                budget.user_id == user_id && budget.month == month && budget.year == year
            })
            .cloned()
            .collect())
    }

    async fn upsert_budget(
        &self,
        user_id: Uuid,
        category_id: Uuid,
        month: u32,
        year: i32,
        amount: f64,
    ) -> Result<(Budget, Option<f64>)> {
        // Single write lock covers find + mutate, so two messages racing on
        // the same key cannot both insert.
        let mut budgets = self.budgets.write().await;

        let existing_id = budgets
            .values()
            .find(|budget| {
                budget.user_id == user_id
                    && budget.category_id == category_id
                    && budget.month == month
                    && budget.year == year
            })
            .map(|budget| budget.id);

        if let Some(id) = existing_id {
            let budget = budgets.get_mut(&id).ok_or_else(|| {
                crate::error::AgentError::Store("budget vanished during upsert".to_string())
            })?;

            let previous = budget.amount;
            budget.amount = amount;
            budget.updated_at = Utc::now();
            return Ok((budget.clone(), Some(previous)));
        }

        let now = Utc::now();
        let budget = Budget {
            id: Uuid::new_v4(),
            user_id,
            category_id,
            amount,
            month,
            year,
            created_at: now,
            updated_at: now,
        };

        budgets.insert(budget.id, budget.clone());
        Ok((budget, None))
    }

    async fn delete_budget(
        &self,
        user_id: Uuid,
        category_id: Uuid,
        month: u32,
        year: i32,
    ) -> Result<Option<Budget>> {
        let mut budgets = self.budgets.write().await;

        let existing_id = budgets
            .values()
            .find(|budget| {
                budget.user_id == user_id
                    && budget.category_id == category_id
                    && budget.month == month
                    && budget.year == year
            })
            .map(|budget| budget.id);

        Ok(existing_id.and_then(|id| budgets.remove(&id)))
    }
}
