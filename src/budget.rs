//! Budget engine
//!
//! Stateful bookkeeping over budgets: create-or-update on the unique
//! (user, category, month, year) key, derived progress arithmetic, and
//! period listings. Progress is always recomputed from expense records —
//! nothing here caches reads.

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AgentError;
use crate::models::{Budget, BudgetDeletion, BudgetProgress, BudgetUpsert};
use crate::store::{ExpenseFilter, LedgerStore};
use crate::Result;

/// Name substituted when a budget's category cannot be resolved.
pub const UNKNOWN_CATEGORY: &str = "Categoria Desconhecida";

/// A (month, year) budget window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Period {
    pub month: u32,
    pub year: i32,
}

impl Period {
    pub fn new(month: u32, year: i32) -> Self {
        Self {
            month: month.clamp(1, 12),
            year,
        }
    }

    pub fn current() -> Self {
        let now = Utc::now();
        Self::new(now.month(), now.year())
    }

    pub fn days_in_month(&self) -> i64 {
        let first = NaiveDate::from_ymd_opt(self.year, self.month, 1).expect("valid month start");
        (self.next_month_start() - first).num_days()
    }

    /// Days from `today` (1-based day of month) through the end of the
    /// month, inclusive.
    pub fn remaining_days_from(&self, today: u32) -> i64 {
        self.days_in_month() - today as i64 + 1
    }

    /// `[first day 00:00:00, last day 23:59:59.999]` in UTC.
    pub fn window(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = Utc
            .with_ymd_and_hms(self.year, self.month, 1, 0, 0, 0)
            .single()
            .expect("valid month start");

        let last_day = self
            .next_month_start()
            .pred_opt()
            .expect("valid month end");
        let end = Utc
            .with_ymd_and_hms(self.year, self.month, last_day.day(), 23, 59, 59)
            .single()
            .expect("valid month end")
            + chrono::Duration::milliseconds(999);

        (start, end)
    }

    fn next_month_start(&self) -> NaiveDate {
        let (year, month) = if self.month == 12 {
            (self.year + 1, 1)
        } else {
            (self.year, self.month + 1)
        };
        NaiveDate::from_ymd_opt(year, month, 1).expect("valid next month")
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Budget bookkeeping over an injected ledger store.
pub struct BudgetEngine {
    store: Arc<dyn LedgerStore>,
}

impl BudgetEngine {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Create or update the budget for the given key. A `None` period
    /// defaults to the current month/year.
    pub async fn upsert(
        &self,
        user_id: Uuid,
        category_id: Uuid,
        amount: f64,
        period: Option<Period>,
    ) -> Result<BudgetUpsert> {
        if !(amount > 0.0) {
            return Err(AgentError::Validation(
                "budget amount must be positive".to_string(),
            ));
        }

        let category = self
            .store
            .find_category_by_id(user_id, category_id)
            .await?
            .ok_or_else(|| {
                AgentError::Validation(format!("category {} does not exist", category_id))
            })?;

        let period = period.unwrap_or_else(Period::current);
        let (budget, previous_amount) = self
            .store
            .upsert_budget(user_id, category.id, period.month, period.year, amount)
            .await?;

        info!(
            %user_id,
            category = %category.name,
            month = period.month,
            year = period.year,
            amount,
            updated = previous_amount.is_some(),
            "budget upserted"
        );

        Ok(BudgetUpsert {
            is_update: previous_amount.is_some(),
            is_new: previous_amount.is_none(),
            previous_amount,
            budget,
        })
    }

    /// Progress for one budget key, or `None` when no budget exists.
    pub async fn progress(
        &self,
        user_id: Uuid,
        category_id: Uuid,
        period: Option<Period>,
    ) -> Result<Option<BudgetProgress>> {
        let period = period.unwrap_or_else(Period::current);
        let Some(budget) = self
            .store
            .find_budget(user_id, category_id, period.month, period.year)
            .await?
        else {
            return Ok(None);
        };

        Ok(Some(self.compute_progress(&budget).await?))
    }

    /// One progress entry per budget the user owns in the period.
    ///
    /// A failure while enriching one entry never fails the list: the entry
    /// degrades to a placeholder name with zeroed metrics.
    pub async fn list_for_period(
        &self,
        user_id: Uuid,
        period: Option<Period>,
    ) -> Result<Vec<BudgetProgress>> {
        let period = period.unwrap_or_else(Period::current);
        let budgets = self
            .store
            .find_budgets_for_period(user_id, period.month, period.year)
            .await?;

        let mut progresses = Vec::with_capacity(budgets.len());
        for budget in budgets {
            match self.compute_progress(&budget).await {
                Ok(progress) => progresses.push(progress),
                Err(error) => {
                    warn!(budget_id = %budget.id, "budget enrichment failed: {}", error);
                    progresses.push(Self::zeroed_progress(budget));
                }
            }
        }

        progresses.sort_by(|a, b| a.category_name.cmp(&b.category_name));
        Ok(progresses)
    }

    /// Delete the unique matching budget. A miss is reported, not an error.
    pub async fn delete(
        &self,
        user_id: Uuid,
        category_id: Uuid,
        period: Option<Period>,
    ) -> Result<BudgetDeletion> {
        let period = period.unwrap_or_else(Period::current);
        let deleted = self
            .store
            .delete_budget(user_id, category_id, period.month, period.year)
            .await?;

        if deleted.is_some() {
            info!(%user_id, %category_id, month = period.month, year = period.year, "budget deleted");
        }

        Ok(BudgetDeletion {
            success: deleted.is_some(),
            budget: deleted,
        })
    }

    async fn compute_progress(&self, budget: &Budget) -> Result<BudgetProgress> {
        let period = Period::new(budget.month, budget.year);
        let (start, end) = period.window();

        let expenses = self
            .store
            .find_expenses(
                budget.user_id,
                ExpenseFilter {
                    category_id: Some(budget.category_id),
                    start: Some(start),
                    end: Some(end),
                    limit: None,
                },
            )
            .await?;

        let spent: f64 = expenses.iter().map(|expense| expense.amount).sum();
        let percentage = if budget.amount > 0.0 {
            round2(spent / budget.amount * 100.0)
        } else {
            0.0
        };

        // orphan-tolerant: a dangling category reference renders as a
        // placeholder instead of failing the computation
        let category_name = self
            .store
            .find_category_by_id(budget.user_id, budget.category_id)
            .await?
            .map(|category| category.name)
            .unwrap_or_else(|| UNKNOWN_CATEGORY.to_string());

        let recent_expenses = expenses.iter().take(3).cloned().collect();

        Ok(BudgetProgress {
            category_name,
            spent,
            percentage,
            remaining: (budget.amount - spent).max(0.0),
            is_over_budget: spent > budget.amount,
            recent_expenses,
            budget: budget.clone(),
        })
    }

    fn zeroed_progress(budget: Budget) -> BudgetProgress {
        BudgetProgress {
            category_name: UNKNOWN_CATEGORY.to_string(),
            spent: 0.0,
            percentage: 0.0,
            remaining: budget.amount,
            is_over_budget: false,
            recent_expenses: vec![],
            budget,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, Expense};
    use crate::store::InMemoryLedgerStore;

    const PERIOD: Period = Period { month: 4, year: 2026 };

    async fn engine_with_category() -> (BudgetEngine, Arc<InMemoryLedgerStore>, Uuid, Category) {
        let store = Arc::new(InMemoryLedgerStore::new());
        let user_id = Uuid::new_v4();
        let category = store
            .insert_category(Category::new(user_id, "Alimentação"))
            .await
            .unwrap();

        (BudgetEngine::new(store.clone()), store, user_id, category)
    }

    fn dated(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, day, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_period_days_in_month() {
        assert_eq!(Period::new(4, 2026).days_in_month(), 30);
        assert_eq!(Period::new(12, 2026).days_in_month(), 31);
        assert_eq!(Period::new(2, 2024).days_in_month(), 29);
        assert_eq!(Period::new(2, 2026).days_in_month(), 28);
    }

    #[test]
    fn test_period_window_bounds() {
        let (start, end) = Period::new(4, 2026).window();
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).unwrap());
        assert_eq!(
            end,
            Utc.with_ymd_and_hms(2026, 4, 30, 23, 59, 59).unwrap()
                + chrono::Duration::milliseconds(999)
        );
    }

    #[test]
    fn test_period_december_rolls_year() {
        let (start, end) = Period::new(12, 2026).window();
        assert_eq!(start.month(), 12);
        assert_eq!(end.day(), 31);
        assert_eq!(end.year(), 2026);
    }

    #[tokio::test]
    async fn test_upsert_then_update_is_single_record() {
        let (engine, store, user_id, category) = engine_with_category().await;

        let first = engine
            .upsert(user_id, category.id, 800.0, Some(PERIOD))
            .await
            .unwrap();
        assert!(first.is_new);
        assert!(!first.is_update);
        assert_eq!(first.previous_amount, None);

        let second = engine
            .upsert(user_id, category.id, 900.0, Some(PERIOD))
            .await
            .unwrap();
        assert!(second.is_update);
        assert_eq!(second.previous_amount, Some(800.0));
        assert_eq!(second.budget.amount, 900.0);
        assert_eq!(second.budget.id, first.budget.id);

        let budgets = store
            .find_budgets_for_period(user_id, PERIOD.month, PERIOD.year)
            .await
            .unwrap();
        assert_eq!(budgets.len(), 1);
        assert_eq!(budgets[0].amount, 900.0);
    }

    #[tokio::test]
    async fn test_upsert_rejects_invalid_input() {
        let (engine, _store, user_id, category) = engine_with_category().await;

        let zero = engine.upsert(user_id, category.id, 0.0, Some(PERIOD)).await;
        assert!(matches!(zero, Err(AgentError::Validation(_))));

        let unknown = engine
            .upsert(user_id, Uuid::new_v4(), 100.0, Some(PERIOD))
            .await;
        assert!(matches!(unknown, Err(AgentError::Validation(_))));
    }

    #[tokio::test]
    async fn test_progress_none_without_budget() {
        let (engine, _store, user_id, category) = engine_with_category().await;

        let progress = engine
            .progress(user_id, category.id, Some(PERIOD))
            .await
            .unwrap();
        assert!(progress.is_none());
    }

    #[tokio::test]
    async fn test_progress_over_budget_math() {
        let (engine, store, user_id, category) = engine_with_category().await;
        engine
            .upsert(user_id, category.id, 800.0, Some(PERIOD))
            .await
            .unwrap();

        for (amount, day) in [(300.0, 5), (600.0, 12)] {
            store
                .insert_expense(Expense::new(
                    user_id,
                    category.id,
                    "mercado",
                    amount,
                    Some(dated(day)),
                ))
                .await
                .unwrap();
        }

        let progress = engine
            .progress(user_id, category.id, Some(PERIOD))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(progress.spent, 900.0);
        assert_eq!(progress.percentage, 112.5);
        assert!(progress.is_over_budget);
        assert_eq!(progress.remaining, 0.0);
        assert_eq!(progress.category_name, "Alimentação");
    }

    #[tokio::test]
    async fn test_progress_ignores_out_of_window_expenses() {
        let (engine, store, user_id, category) = engine_with_category().await;
        engine
            .upsert(user_id, category.id, 500.0, Some(PERIOD))
            .await
            .unwrap();

        store
            .insert_expense(Expense::new(
                user_id,
                category.id,
                "dentro",
                100.0,
                Some(dated(10)),
            ))
            .await
            .unwrap();
        store
            .insert_expense(Expense::new(
                user_id,
                category.id,
                "fora",
                999.0,
                Some(Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap()),
            ))
            .await
            .unwrap();

        let progress = engine
            .progress(user_id, category.id, Some(PERIOD))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(progress.spent, 100.0);
        assert!(!progress.is_over_budget);
        assert_eq!(progress.remaining, 400.0);
    }

    #[tokio::test]
    async fn test_progress_zero_amount_budget_has_zero_percentage() {
        let (engine, store, user_id, category) = engine_with_category().await;

        // the engine refuses amount <= 0, so write through the store to
        // exercise the division guard
        store
            .upsert_budget(user_id, category.id, PERIOD.month, PERIOD.year, 0.0)
            .await
            .unwrap();
        store
            .insert_expense(Expense::new(
                user_id,
                category.id,
                "qualquer",
                50.0,
                Some(dated(3)),
            ))
            .await
            .unwrap();

        let progress = engine
            .progress(user_id, category.id, Some(PERIOD))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(progress.percentage, 0.0);
    }

    #[tokio::test]
    async fn test_progress_caps_recent_expenses_at_three() {
        let (engine, store, user_id, category) = engine_with_category().await;
        engine
            .upsert(user_id, category.id, 1000.0, Some(PERIOD))
            .await
            .unwrap();

        for day in 1..=5 {
            store
                .insert_expense(Expense::new(
                    user_id,
                    category.id,
                    format!("compra {}", day),
                    10.0,
                    Some(dated(day)),
                ))
                .await
                .unwrap();
        }

        let progress = engine
            .progress(user_id, category.id, Some(PERIOD))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(progress.recent_expenses.len(), 3);
        assert_eq!(progress.recent_expenses[0].description, "compra 5");
    }

    #[tokio::test]
    async fn test_list_for_period_substitutes_placeholder_for_dangling_category() {
        let (engine, store, user_id, category) = engine_with_category().await;
        engine
            .upsert(user_id, category.id, 800.0, Some(PERIOD))
            .await
            .unwrap();

        // budget pointing at a category that no longer resolves
        store
            .upsert_budget(user_id, Uuid::new_v4(), PERIOD.month, PERIOD.year, 300.0)
            .await
            .unwrap();

        let progresses = engine
            .list_for_period(user_id, Some(PERIOD))
            .await
            .unwrap();

        assert_eq!(progresses.len(), 2);
        assert!(progresses.iter().any(|p| p.category_name == "Alimentação"));
        assert!(progresses.iter().any(|p| p.category_name == UNKNOWN_CATEGORY));
    }

    #[tokio::test]
    async fn test_delete_reports_miss_without_error() {
        let (engine, _store, user_id, category) = engine_with_category().await;

        let miss = engine
            .delete(user_id, category.id, Some(PERIOD))
            .await
            .unwrap();
        assert!(!miss.success);
        assert!(miss.budget.is_none());

        engine
            .upsert(user_id, category.id, 400.0, Some(PERIOD))
            .await
            .unwrap();
        let hit = engine
            .delete(user_id, category.id, Some(PERIOD))
            .await
            .unwrap();
        assert!(hit.success);
        assert_eq!(hit.budget.unwrap().amount, 400.0);
    }
}
