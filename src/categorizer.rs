//! Category resolution
//!
//! Maps a free-text expense description to one of the user's categories,
//! seeding the default set for new users and creating a category only when
//! no acceptable match exists. Degrades through "Outros" down to an
//! unpersisted placeholder, so callers never block on categorization.

use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AgentError;
use crate::llm::{CompletionApi, CompletionOptions};
use crate::models::Category;
use crate::store::LedgerStore;
use crate::Result;

/// Categories seeded for users that have none yet.
pub const DEFAULT_CATEGORIES: [&str; 8] = [
    "Alimentação",
    "Transporte",
    "Moradia",
    "Saúde",
    "Educação",
    "Lazer",
    "Vestuário",
    "Outros",
];

const FALLBACK_CATEGORY: &str = "Outros";

/// Load the user's categories, seeding the defaults when none exist.
pub async fn ensure_categories(store: &dyn LedgerStore, user_id: Uuid) -> Result<Vec<Category>> {
    let existing = store.find_categories(user_id).await?;
    if !existing.is_empty() {
        return Ok(existing);
    }

    for name in DEFAULT_CATEGORIES {
        store.insert_category(Category::new(user_id, name)).await?;
    }
    info!(%user_id, "seeded default categories");

    store.find_categories(user_id).await
}

/// Resolve a description to a category. Infallible by design: any failure
/// along the way falls back to "Outros", and as a last resort to an
/// in-memory placeholder that is not persisted.
pub async fn resolve_category(
    store: &dyn LedgerStore,
    llm: &dyn CompletionApi,
    user_id: Uuid,
    description: &str,
) -> Category {
    match try_resolve(store, llm, user_id, description).await {
        Ok(category) => category,
        Err(error) => {
            warn!(%user_id, "categorization failed, using fallback: {}", error);
            fallback_category(store, user_id).await
        }
    }
}

async fn try_resolve(
    store: &dyn LedgerStore,
    llm: &dyn CompletionApi,
    user_id: Uuid,
    description: &str,
) -> Result<Category> {
    let categories = ensure_categories(store, user_id).await?;
    if categories.is_empty() {
        // the seed did not stick; make sure at least the fallback exists
        return store
            .insert_category(Category::new(user_id, FALLBACK_CATEGORY))
            .await;
    }

    let names = categories
        .iter()
        .map(|category| category.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    let system = format!(
        "Você é um assistente financeiro especializado em categorizar despesas.\n\
         Categorize a despesa em uma das seguintes categorias: {}.\n\
         Responda apenas com o nome exato da categoria, sem texto adicional.",
        names,
    );
    let prompt = format!("Categorize esta despesa: \"{}\"", description);

    let suggested = llm
        .complete(&system, &prompt, CompletionOptions::default().with_max_tokens(20))
        .await?;
    let suggested = suggested.trim();

    if suggested.is_empty() {
        return Err(AgentError::ExternalService(
            "empty category suggestion".to_string(),
        ));
    }

    // exact case-insensitive match first
    if let Some(category) = categories.iter().find(|c| c.name_matches(suggested)) {
        return Ok(category.clone());
    }

    // then substring containment either direction
    let suggested_lower = suggested.to_lowercase();
    if let Some(category) = categories.iter().find(|c| {
        let name_lower = c.name.to_lowercase();
        suggested_lower.contains(&name_lower) || name_lower.contains(&suggested_lower)
    }) {
        return Ok(category.clone());
    }

    // nothing acceptable: the suggestion becomes a new category
    let created = store
        .insert_category(Category::new(user_id, suggested))
        .await?;
    info!(%user_id, name = %created.name, "created category from suggestion");
    Ok(created)
}

/// The user's "Outros" category, created if absent; an unpersisted
/// placeholder when even the store is unavailable.
async fn fallback_category(store: &dyn LedgerStore, user_id: Uuid) -> Category {
    match store.find_category_by_name(user_id, FALLBACK_CATEGORY).await {
        Ok(Some(category)) => return category,
        Ok(None) => {
            match store
                .insert_category(Category::new(user_id, FALLBACK_CATEGORY))
                .await
            {
                Ok(category) => return category,
                Err(error) => warn!(%user_id, "failed to create fallback category: {}", error),
            }
        }
        Err(error) => warn!(%user_id, "failed to load fallback category: {}", error),
    }

    Category::new(user_id, FALLBACK_CATEGORY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::MockCompletion;
    use crate::store::InMemoryLedgerStore;

    #[tokio::test]
    async fn test_seeds_defaults_for_new_user() {
        let store = InMemoryLedgerStore::new();
        let user_id = Uuid::new_v4();

        let categories = ensure_categories(&store, user_id).await.unwrap();

        assert_eq!(categories.len(), 8);
        assert!(categories.iter().any(|c| c.name == "Outros"));
        assert!(categories.iter().any(|c| c.name == "Transporte"));
    }

    #[tokio::test]
    async fn test_seeding_is_idempotent() {
        let store = InMemoryLedgerStore::new();
        let user_id = Uuid::new_v4();

        ensure_categories(&store, user_id).await.unwrap();
        let again = ensure_categories(&store, user_id).await.unwrap();

        assert_eq!(again.len(), 8);
    }

    #[tokio::test]
    async fn test_exact_match_is_case_insensitive() {
        let store = InMemoryLedgerStore::new();
        let user_id = Uuid::new_v4();
        let llm = MockCompletion::with_replies(["transporte"]);

        let category = resolve_category(&store, &llm, user_id, "uber").await;

        assert_eq!(category.name, "Transporte");
        assert_eq!(store.count_categories(user_id).await.unwrap(), 8);
    }

    #[tokio::test]
    async fn test_substring_match_either_direction() {
        let store = InMemoryLedgerStore::new();
        let user_id = Uuid::new_v4();
        let llm = MockCompletion::with_replies(["Alimentação e bebidas"]);

        let category = resolve_category(&store, &llm, user_id, "mercado").await;

        assert_eq!(category.name, "Alimentação");
    }

    #[tokio::test]
    async fn test_unmatched_suggestion_creates_category() {
        let store = InMemoryLedgerStore::new();
        let user_id = Uuid::new_v4();
        let llm = MockCompletion::with_replies(["Assinaturas"]);

        let category = resolve_category(&store, &llm, user_id, "netflix").await;

        assert_eq!(category.name, "Assinaturas");
        assert_eq!(store.count_categories(user_id).await.unwrap(), 9);
        let persisted = store
            .find_category_by_name(user_id, "assinaturas")
            .await
            .unwrap();
        assert!(persisted.is_some());
    }

    #[tokio::test]
    async fn test_provider_failure_falls_back_to_outros() {
        let store = InMemoryLedgerStore::new();
        let user_id = Uuid::new_v4();
        let llm = MockCompletion::failing();

        let category = resolve_category(&store, &llm, user_id, "uber").await;

        assert_eq!(category.name, "Outros");
        // defaults were still seeded before the provider call
        assert_eq!(store.count_categories(user_id).await.unwrap(), 8);
    }

    #[tokio::test]
    async fn test_fallback_creates_outros_when_missing() {
        let store = InMemoryLedgerStore::new();
        let user_id = Uuid::new_v4();
        store
            .insert_category(Category::new(user_id, "Viagens"))
            .await
            .unwrap();
        let llm = MockCompletion::failing();

        let category = resolve_category(&store, &llm, user_id, "hotel").await;

        assert_eq!(category.name, "Outros");
        let persisted = store.find_category_by_name(user_id, "Outros").await.unwrap();
        assert!(persisted.is_some());
    }
}
