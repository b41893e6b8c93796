//! Dialog dispatcher
//!
//! State-free router: one inbound message runs the classification cascade,
//! drives exactly one ledger operation, and produces exactly one outbound
//! reply. Every branch isolates its own failures — an error inside a
//! branch becomes a conversational fallback, never a raw error message.

use chrono::{Datelike, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::budget::{BudgetEngine, Period, UNKNOWN_CATEGORY};
use crate::categorizer;
use crate::formatter;
use crate::llm::{CompletionApi, CompletionOptions};
use crate::matchers;
use crate::models::{Category, Expense, InboundMessage, Intent, User};
use crate::outbound::MessageGateway;
use crate::resolver;
use crate::store::{ExpenseFilter, LedgerStore};
use crate::Result;

const SPENDING_KEYWORDS: [&str; 3] = ["despesa", "gasto", "gastos"];

/// Routes classified intents to the ledger, budget engine and category
/// resolver. All collaborators are injected; the dispatcher owns no
/// global state.
pub struct Dispatcher {
    store: Arc<dyn LedgerStore>,
    llm: Arc<dyn CompletionApi>,
    gateway: Arc<dyn MessageGateway>,
    budgets: BudgetEngine,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        llm: Arc<dyn CompletionApi>,
        gateway: Arc<dyn MessageGateway>,
    ) -> Self {
        let budgets = BudgetEngine::new(store.clone());
        Self {
            store,
            llm,
            gateway,
            budgets,
        }
    }

    /// Core entry point: full cascade plus exactly one outbound send.
    pub async fn handle_inbound_message(&self, message: InboundMessage) {
        info!(
            sender = %message.sender_id,
            message_id = %message.message_id,
            "handling inbound message"
        );

        let reply = match self.get_or_create_user(&message.sender_id).await {
            Ok(user) => self.reply_for(&user, &message.text).await,
            Err(e) => {
                error!("failed to resolve user {}: {}", message.sender_id, e);
                formatter::fallback_generic()
            }
        };

        self.deliver(&message.sender_id, &reply, Some(&message.message_id))
            .await;
    }

    /// Classify and route, returning the reply text. Infallible: each
    /// branch degrades to its own conversational fallback.
    pub async fn reply_for(&self, user: &User, text: &str) -> String {
        let intent = resolver::resolve(self.llm.as_ref(), text).await;
        debug!(user = %user.id, "intent classified");

        match intent {
            Intent::CategoryList => self.handle_category_list(user).await.unwrap_or_else(|e| {
                warn!("category listing failed: {}", e);
                formatter::fallback_categories()
            }),
            Intent::CategoryCreate { name } => {
                self.handle_category_create(user, &name).await.unwrap_or_else(|e| {
                    warn!("category creation failed: {}", e);
                    formatter::fallback_categories()
                })
            }
            Intent::BudgetInfo => self.handle_budget_info(user).await.unwrap_or_else(|e| {
                warn!("budget info failed: {}", e);
                formatter::fallback_budget()
            }),
            Intent::BudgetCreate {
                category_name,
                amount,
            } => self
                .handle_budget_create(user, &category_name, amount)
                .await
                .unwrap_or_else(|e| {
                    warn!("budget creation failed: {}", e);
                    formatter::fallback_budget()
                }),
            Intent::BudgetCheck { category_name } => self
                .handle_budget_check(user, category_name.as_deref())
                .await
                .unwrap_or_else(|e| {
                    warn!("budget check failed: {}", e);
                    formatter::fallback_budget()
                }),
            Intent::BudgetDelete { category_name } => self
                .handle_budget_delete(user, category_name.as_deref())
                .await
                .unwrap_or_else(|e| {
                    warn!("budget deletion failed: {}", e);
                    formatter::fallback_budget()
                }),
            Intent::Expense {
                description,
                amount,
                date,
            } => self
                .handle_expense(user, &description, amount, date)
                .await
                .unwrap_or_else(|e| {
                    warn!("expense registration failed: {}", e);
                    formatter::fallback_expense()
                }),
            Intent::None => self.handle_freeform(user, text).await,
        }
    }

    async fn get_or_create_user(&self, phone_number: &str) -> Result<User> {
        if phone_number.trim().is_empty() {
            return Err(crate::error::AgentError::Validation(
                "missing sender identity".to_string(),
            ));
        }

        if let Some(user) = self.store.find_user_by_phone(phone_number).await? {
            return Ok(user);
        }

        let user = self.store.insert_user(User::from_phone(phone_number)).await?;
        info!(user_id = %user.id, "new user created");
        Ok(user)
    }

    /// Best-effort delivery: one attempt with the real reply, one fallback
    /// attempt, then the failure is swallowed.
    async fn deliver(&self, recipient_id: &str, text: &str, reply_to: Option<&str>) {
        if let Err(e) = self.gateway.send(recipient_id, text, reply_to).await {
            warn!("outbound send failed: {}", e);

            let fallback = formatter::fallback_generic();
            if let Err(e) = self.gateway.send(recipient_id, &fallback, reply_to).await {
                warn!("fallback send failed: {}", e);
            }
        }
    }

    //
    // ================= Category Branches =================
    //

    async fn handle_category_list(&self, user: &User) -> Result<String> {
        let categories = categorizer::ensure_categories(self.store.as_ref(), user.id).await?;
        Ok(formatter::category_list(&categories))
    }

    async fn handle_category_create(&self, user: &User, name: &str) -> Result<String> {
        let existing = self.store.find_categories(user.id).await?;

        if existing.iter().any(|category| category.name_matches(name)) {
            return Ok(formatter::category_duplicate(name, &existing));
        }

        let created = self
            .store
            .insert_category(Category::new(user.id, matchers::capitalize_first(name)))
            .await?;

        Ok(formatter::category_created(&created.name))
    }

    //
    // ================= Budget Branches =================
    //

    async fn handle_budget_info(&self, user: &User) -> Result<String> {
        let period = Period::current();
        let progresses = self.budgets.list_for_period(user.id, Some(period)).await?;

        if progresses.is_empty() {
            let categories = self.store.find_categories(user.id).await?;
            let example = categories.first().map(|category| category.name.as_str());
            return Ok(formatter::budget_onboarding(example, period.month));
        }

        Ok(formatter::budget_info_report(&progresses, period.month, period.year))
    }

    async fn handle_budget_create(
        &self,
        user: &User,
        category_name: &str,
        amount: f64,
    ) -> Result<String> {
        let name = category_name.trim();
        if name.is_empty() || !(amount > 0.0) {
            return Ok(formatter::budget_create_guidance());
        }

        let categories = self.store.find_categories(user.id).await?;
        if categories.is_empty() {
            return Ok(formatter::budget_no_categories());
        }

        let Some(category) = categories.iter().find(|c| c.name_matches(name)) else {
            return Ok(formatter::budget_unknown_category(name, &categories));
        };

        let result = self.budgets.upsert(user.id, category.id, amount, None).await?;
        Ok(formatter::budget_saved(
            &category.name,
            amount,
            result.budget.month,
            result.is_update,
        ))
    }

    async fn handle_budget_check(
        &self,
        user: &User,
        category_name: Option<&str>,
    ) -> Result<String> {
        let Some(name) = category_name.map(str::trim).filter(|n| !n.is_empty()) else {
            // no category given: fall back to the general summary
            return self.handle_budget_info(user).await;
        };

        let Some(category) = self.store.find_category_by_name(user.id, name).await? else {
            return Ok(formatter::category_not_found(name));
        };

        let period = Period::current();
        let Some(progress) = self
            .budgets
            .progress(user.id, category.id, Some(period))
            .await?
        else {
            return Ok(formatter::budget_check_no_budget(&category.name));
        };

        let remaining_days = period.remaining_days_from(Utc::now().day());
        Ok(formatter::budget_check_report(
            &progress,
            remaining_days,
            period.days_in_month(),
        ))
    }

    async fn handle_budget_delete(
        &self,
        user: &User,
        category_name: Option<&str>,
    ) -> Result<String> {
        let Some(name) = category_name.map(str::trim).filter(|n| !n.is_empty()) else {
            return Ok(formatter::budget_delete_guidance());
        };

        let Some(category) = self.store.find_category_by_name(user.id, name).await? else {
            return Ok(formatter::category_not_found(name));
        };

        let deletion = self.budgets.delete(user.id, category.id, None).await?;

        if deletion.success {
            Ok(formatter::budget_deleted(&category.name))
        } else {
            Ok(formatter::budget_delete_miss(&category.name))
        }
    }

    //
    // ================= Expense Branch =================
    //

    async fn handle_expense(
        &self,
        user: &User,
        description: &str,
        amount: f64,
        date: Option<chrono::DateTime<Utc>>,
    ) -> Result<String> {
        let category = categorizer::resolve_category(
            self.store.as_ref(),
            self.llm.as_ref(),
            user.id,
            description,
        )
        .await;

        let expense = self
            .store
            .insert_expense(Expense::new(user.id, category.id, description, amount, date))
            .await?;

        info!(
            user = %user.id,
            expense = %expense.id,
            category = %category.name,
            amount,
            "expense registered"
        );

        Ok(formatter::expense_confirmation(&expense, &category.name))
    }

    //
    // ================= Freeform Branch =================
    //

    async fn handle_freeform(&self, user: &User, text: &str) -> String {
        let context = self.build_freeform_context(user, text).await;

        match self
            .llm
            .complete(
                &context,
                text,
                CompletionOptions::default()
                    .with_max_tokens(400)
                    .with_temperature(0.7),
            )
            .await
        {
            Ok(answer) => answer,
            Err(e) => {
                warn!("freeform generation failed: {}", e);
                formatter::fallback_freeform()
            }
        }
    }

    async fn build_freeform_context(&self, user: &User, text: &str) -> String {
        let lowered = text.to_lowercase();
        let mentions_spending = SPENDING_KEYWORDS
            .iter()
            .any(|keyword| lowered.contains(keyword));

        let mut recent_context = String::new();
        if mentions_spending {
            match self
                .store
                .find_expenses(
                    user.id,
                    ExpenseFilter {
                        limit: Some(5),
                        ..Default::default()
                    },
                )
                .await
            {
                Ok(expenses) if !expenses.is_empty() => {
                    recent_context.push_str("\nDespesas recentes do usuário:\n");
                    for expense in &expenses {
                        let category_name = self
                            .store
                            .find_category_by_id(user.id, expense.category_id)
                            .await
                            .ok()
                            .flatten()
                            .map(|category| category.name)
                            .unwrap_or_else(|| UNKNOWN_CATEGORY.to_string());

                        recent_context.push_str(&format!(
                            "- {}: {} ({}) - {}\n",
                            expense.description,
                            formatter::format_currency(expense.amount),
                            category_name,
                            formatter::format_date(&expense.date),
                        ));
                    }
                }
                Ok(_) => {}
                Err(e) => warn!("failed to load recent expenses for context: {}", e),
            }
        }

        format!(
            "## Contexto Geral\n\
             Você é um assistente financeiro que ajuda usuários a organizar suas \
             finanças direto pelo chat, sem planilhas ou apps complexos.\n\
             Seu objetivo é simplificar o controle de despesas e orçamentos, \
             fornecendo insights personalizados.\n\
             Seu tom deve ser amigável, acessível e motivador, evitando jargões técnicos.\n\n\
             ## Regras Gerais\n\
             - Incentive o usuário a refletir sobre seus gastos\n\
             - Sempre explique as funcionalidades de forma simples\n\
             - Mantenha respostas concisas e diretas - máximo 3 parágrafos\n\
             - Responda em português brasileiro, conversacional\n\n\
             ## Sobre o Usuário\n\
             Nome: {}\n\
             {}",
            user.name, recent_context,
        )
    }
}
