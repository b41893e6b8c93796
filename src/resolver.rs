//! LLM intent fallback
//!
//! Invoked only when the deterministic fast paths find nothing. Each
//! fallback asks the completion API for a strictly-typed JSON object;
//! partial or malformed results downgrade to "no intent", and provider
//! failures are never fatal to the message being handled.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::llm::{CompletionApi, CompletionOptions};
use crate::matchers;
use crate::models::Intent;

const EXPENSE_DETECTION_PROMPT: &str = r#"Você é um assistente especializado em detectar e extrair informações sobre despesas de mensagens.
Dado o texto, verifique se o usuário está querendo registrar uma despesa.

Considere como despesa mensagens com os seguintes padrões:
- Mensagens com valor numérico e uma descrição
- Menções a compra, pagamento, gasto ou similar
- Formatos como "50 uber", "almoço 25", "cinema ontem 30"

Se for uma despesa, extraia:
1. A descrição da despesa (seja específico)
2. O valor da despesa (em reais, apenas o número)
3. A data (se mencionada, caso contrário null)

Responda em JSON:
{
  "isExpense": true/false,
  "description": "descrição da despesa",
  "amount": valor numérico,
  "date": "YYYY-MM-DD" (ou null)
}

IMPORTANTE: Priorize detectar despesas mesmo em formatos simples e diretos."#;

const CATEGORY_DETECTION_PROMPT: &str = r#"Você é um assistente especializado em detectar e extrair informações sobre categorias financeiras.
Dado o texto, verifique se o usuário está querendo listar suas categorias ou criar uma nova categoria.

Considere intenções como:
- "Me mostra minhas categorias" (listar)
- "Quero criar uma categoria Viagens" (criar)
- "Adiciona categoria Presentes" (criar)

Responda em JSON:
{
  "isCategoryIntent": true/false,
  "action": "list" ou "create",
  "categoryName": "nome da categoria" (apenas se action for "create", senão null)
}

IMPORTANTE: Seja conservador. Se não tiver certeza que é uma intenção relacionada a categorias, retorne isCategoryIntent: false."#;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ExpenseDetection {
    is_expense: bool,
    description: Option<String>,
    amount: Option<f64>,
    date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct CategoryDetection {
    is_category_intent: bool,
    action: Option<String>,
    category_name: Option<String>,
}

/// Full cascade: deterministic fast paths, then the LLM fallbacks in the
/// same category-before-expense order. Returns `Intent::None` when nothing
/// structured was recognized.
pub async fn resolve(llm: &dyn CompletionApi, text: &str) -> Intent {
    if let Some(intent) = matchers::classify(text) {
        return intent;
    }

    if let Some(intent) = resolve_category_intent(llm, text).await {
        return intent;
    }

    if let Some(intent) = resolve_expense_intent(llm, text).await {
        return intent;
    }

    Intent::None
}

/// Category intent beyond the regex coverage.
pub async fn resolve_category_intent(llm: &dyn CompletionApi, text: &str) -> Option<Intent> {
    let raw = match llm
        .complete(CATEGORY_DETECTION_PROMPT, text, CompletionOptions::json())
        .await
    {
        Ok(raw) => raw,
        Err(error) => {
            warn!("category intent fallback unavailable: {}", error);
            return None;
        }
    };

    let detection: CategoryDetection = match serde_json::from_str(strip_code_fence(&raw)) {
        Ok(detection) => detection,
        Err(error) => {
            warn!("malformed category detection payload: {}", error);
            return None;
        }
    };

    if !detection.is_category_intent {
        return None;
    }

    match detection.action.as_deref() {
        Some("list") => Some(Intent::CategoryList),
        Some("create") => {
            let name = detection.category_name.as_deref().map(str::trim)?;
            if name.is_empty() {
                debug!("create-category intent without a usable name, downgrading");
                return None;
            }

            Some(Intent::CategoryCreate {
                name: matchers::capitalize_first(name),
            })
        }
        _ => None,
    }
}

/// Expense intent beyond the regex coverage.
pub async fn resolve_expense_intent(llm: &dyn CompletionApi, text: &str) -> Option<Intent> {
    let raw = match llm
        .complete(EXPENSE_DETECTION_PROMPT, text, CompletionOptions::json())
        .await
    {
        Ok(raw) => raw,
        Err(error) => {
            warn!("expense intent fallback unavailable: {}", error);
            return None;
        }
    };

    let detection: ExpenseDetection = match serde_json::from_str(strip_code_fence(&raw)) {
        Ok(detection) => detection,
        Err(error) => {
            warn!("malformed expense detection payload: {}", error);
            return None;
        }
    };

    if !detection.is_expense {
        return None;
    }

    let description = detection.description.as_deref().map(str::trim)?;
    let amount = detection.amount?;
    if description.is_empty() || !(amount > 0.0) {
        debug!("expense intent with incomplete fields, downgrading");
        return None;
    }

    Some(Intent::Expense {
        description: description.to_string(),
        amount,
        date: detection.date.as_deref().and_then(parse_iso_date),
    })
}

fn parse_iso_date(raw: &str) -> Option<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()?;
    let midnight = date.and_hms_opt(0, 0, 0)?;
    Some(Utc.from_utc_datetime(&midnight))
}

/// Some providers wrap JSON-mode output in a markdown fence; tolerate it.
fn strip_code_fence(raw: &str) -> &str {
    let mut stripped = raw.trim();

    if let Some(rest) = stripped.strip_prefix("```json") {
        stripped = rest;
    } else if let Some(rest) = stripped.strip_prefix("```") {
        stripped = rest;
    }

    if let Some(rest) = stripped.strip_suffix("```") {
        stripped = rest;
    }

    stripped.trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::MockCompletion;

    #[tokio::test]
    async fn test_expense_fallback_parses_full_payload() {
        let llm = MockCompletion::with_replies([
            r#"{"isExpense": true, "description": "jantar de aniversário", "amount": 130.5, "date": "2026-08-01"}"#,
        ]);

        let intent = resolve_expense_intent(&llm, "ontem saí pra jantar, foi uns 130 e cinquenta")
            .await
            .unwrap();

        match intent {
            Intent::Expense {
                description,
                amount,
                date,
            } => {
                assert_eq!(description, "jantar de aniversário");
                assert_eq!(amount, 130.5);
                assert_eq!(date.unwrap().format("%Y-%m-%d").to_string(), "2026-08-01");
            }
            other => panic!("unexpected intent {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_expense_fallback_downgrades_partial_payload() {
        let llm = MockCompletion::with_replies([
            r#"{"isExpense": true, "description": "", "amount": 50}"#,
        ]);
        assert_eq!(resolve_expense_intent(&llm, "alguma coisa").await, None);

        let llm = MockCompletion::with_replies([r#"{"isExpense": true, "description": "uber"}"#]);
        assert_eq!(resolve_expense_intent(&llm, "alguma coisa").await, None);
    }

    #[tokio::test]
    async fn test_expense_fallback_swallows_provider_failure() {
        let llm = MockCompletion::failing();
        assert_eq!(resolve_expense_intent(&llm, "50 em algo").await, None);
    }

    #[tokio::test]
    async fn test_expense_fallback_tolerates_fenced_json() {
        let llm = MockCompletion::with_replies([
            "```json\n{\"isExpense\": true, \"description\": \"mercado\", \"amount\": 80}\n```",
        ]);

        let intent = resolve_expense_intent(&llm, "fui no mercado hoje, 80 reais")
            .await
            .unwrap();
        assert!(matches!(intent, Intent::Expense { amount, .. } if amount == 80.0));
    }

    #[tokio::test]
    async fn test_category_fallback_list_and_create() {
        let llm = MockCompletion::with_replies([
            r#"{"isCategoryIntent": true, "action": "list", "categoryName": null}"#,
        ]);
        assert_eq!(
            resolve_category_intent(&llm, "me mostra o que eu tenho cadastrado").await,
            Some(Intent::CategoryList)
        );

        let llm = MockCompletion::with_replies([
            r#"{"isCategoryIntent": true, "action": "create", "categoryName": "viagens"}"#,
        ]);
        assert_eq!(
            resolve_category_intent(&llm, "quero separar meus gastos de viagem").await,
            Some(Intent::CategoryCreate {
                name: "Viagens".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_category_fallback_downgrades_create_without_name() {
        let llm = MockCompletion::with_replies([
            r#"{"isCategoryIntent": true, "action": "create", "categoryName": "  "}"#,
        ]);
        assert_eq!(resolve_category_intent(&llm, "cria aí pra mim").await, None);
    }

    #[tokio::test]
    async fn test_resolve_skips_llm_when_fast_path_matches() {
        // provider is down; a fast-path message must still classify
        let llm = MockCompletion::failing();

        let intent = resolve(&llm, "50 uber").await;
        assert!(matches!(intent, Intent::Expense { amount, .. } if amount == 50.0));
    }

    #[tokio::test]
    async fn test_resolve_returns_none_intent_when_nothing_matches() {
        let llm = MockCompletion::with_replies([
            r#"{"isCategoryIntent": false}"#,
            r#"{"isExpense": false}"#,
        ]);

        assert_eq!(resolve(&llm, "bom dia, tudo bem?").await, Intent::None);
    }
}
