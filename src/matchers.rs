//! Deterministic pattern matchers
//!
//! First line of the classification cascade: regex recognizers for
//! category, budget and expense commands. Zero network cost, so they
//! always run before any completion-API fallback. Priority order is
//! Category → Budget → Expense, first match wins.

use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

use crate::models::Intent;

type Matcher = fn(&str) -> Option<Intent>;

/// Ordered strategy table. The order IS the intent priority.
pub const FAST_PATHS: [(&str, Matcher); 3] = [
    ("category", match_category_intent),
    ("budget", match_budget_intent),
    ("expense", match_expense_intent),
];

/// Run the deterministic cascade over a raw message.
pub fn classify(text: &str) -> Option<Intent> {
    FAST_PATHS.iter().find_map(|(name, matcher)| {
        let intent = matcher(text);
        if intent.is_some() {
            debug!(matcher = name, "fast path matched");
        }
        intent
    })
}

lazy_static! {
    static ref CATEGORY_LIST_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"(?i)minhas\s+categorias").unwrap(),
        Regex::new(r"(?i)listar\s+categorias").unwrap(),
        Regex::new(r"(?i)mostrar\s+categorias").unwrap(),
        Regex::new(r"(?i)quais\s+categorias").unwrap(),
        Regex::new(r"(?i)ver\s+categorias").unwrap(),
    ];
    static ref CATEGORY_CREATE_PATTERN: Regex =
        Regex::new(r"(?i)(?:criar|nova|adicionar|cadastrar|incluir)\s+categoria\s+(.+)").unwrap();
    static ref CATEGORY_BARE_PATTERN: Regex = Regex::new(r"(?i)^categoria\s+(.+)$").unwrap();

    static ref BUDGET_CHECK_PATTERN: Regex = Regex::new(
        r"(?i)\b(?:verificar|consultar|como\s+est[áa]|ver)\s+(?:o\s+)?or[çc]amento(?:\s+d[aeo])?\s+(.+)$",
    )
    .unwrap();
    static ref BUDGET_DELETE_PATTERN: Regex = Regex::new(
        r"(?i)\b(?:excluir|remover|apagar|deletar)\s+(?:o\s+)?or[çc]amento(?:\s+d[aeo])?\s+(.+)$",
    )
    .unwrap();
    static ref BUDGET_CREATE_PATTERN: Regex =
        Regex::new(r"(?i)or[çc]amento\s+(\w+)\s+(\d+[.,]?\d*)").unwrap();
    static ref BUDGET_MENTION_PATTERN: Regex = Regex::new(r"(?i)or[çc]amentos?").unwrap();

    static ref EXPENSE_PATTERNS: Vec<Regex> = vec![
        // "50 uber", "50,5 cinema"
        Regex::new(r"^(\d+[,.]?\d*)\s+(.+)$").unwrap(),
        // "uber 50", "cinema 50.5"
        Regex::new(r"^(.+)\s+(\d+[,.]?\d*)$").unwrap(),
        // "gastei R$ 50 no mercado"
        Regex::new(
            r"(?i)^(?:gastei|paguei|comprei|despesa)(?:\s+(?:de|com|para))?\s+(?:R\$\s*)?(\d+[,.]?\d*)(?:\s+(?:em|com|para|por|no|na))?\s+(.+)$",
        )
        .unwrap(),
    ];
}

/// Category fast path: listing phrases and creation phrases.
pub fn match_category_intent(text: &str) -> Option<Intent> {
    let trimmed = text.trim();

    if CATEGORY_LIST_PATTERNS.iter().any(|p| p.is_match(trimmed)) {
        return Some(Intent::CategoryList);
    }

    let captured = CATEGORY_CREATE_PATTERN
        .captures(trimmed)
        .or_else(|| CATEGORY_BARE_PATTERN.captures(trimmed))?;

    let name = captured.get(1)?.as_str().trim();
    if name.is_empty() {
        return None;
    }

    Some(Intent::CategoryCreate {
        name: capitalize_first(name),
    })
}

/// Budget fast path.
///
/// Check and delete phrasings are tried before creation so that
/// "excluir orçamento transporte 100" never reads as a creation; any
/// remaining mention of the word falls back to the info intent.
pub fn match_budget_intent(text: &str) -> Option<Intent> {
    let trimmed = text.trim();

    if let Some(captured) = BUDGET_CHECK_PATTERN.captures(trimmed) {
        let name = captured.get(1)?.as_str().trim();
        if !name.is_empty() {
            return Some(Intent::BudgetCheck {
                category_name: Some(capitalize_first(name)),
            });
        }
    }

    if let Some(captured) = BUDGET_DELETE_PATTERN.captures(trimmed) {
        let name = captured.get(1)?.as_str().trim();
        if !name.is_empty() {
            return Some(Intent::BudgetDelete {
                category_name: Some(capitalize_first(name)),
            });
        }
    }

    if let Some(captured) = BUDGET_CREATE_PATTERN.captures(trimmed) {
        let name = captured.get(1)?.as_str().trim();
        let amount = parse_amount(captured.get(2)?.as_str());

        if let Some(amount) = amount {
            if !name.is_empty() {
                return Some(Intent::BudgetCreate {
                    category_name: capitalize_first(name),
                    amount,
                });
            }
        }
    }

    if BUDGET_MENTION_PATTERN.is_match(trimmed) {
        return Some(Intent::BudgetInfo);
    }

    None
}

/// Expense fast path: the three amount/description shapes.
///
/// Whichever captured side parses as a positive number is the amount;
/// the other side, trimmed, is the description.
pub fn match_expense_intent(text: &str) -> Option<Intent> {
    let trimmed = text.trim();

    for pattern in EXPENSE_PATTERNS.iter() {
        let Some(captured) = pattern.captures(trimmed) else {
            continue;
        };

        let first = captured.get(1).map(|m| m.as_str().trim()).unwrap_or("");
        let second = captured.get(2).map(|m| m.as_str().trim()).unwrap_or("");

        let (amount, description) = match parse_amount(first) {
            Some(amount) => (Some(amount), second),
            None => (parse_amount(second), first),
        };

        if let Some(amount) = amount {
            if !description.is_empty() {
                return Some(Intent::Expense {
                    description: description.to_string(),
                    amount,
                    date: None,
                });
            }
        }
    }

    None
}

/// Parse an amount token, accepting comma or dot as the decimal separator.
/// Only strictly positive finite values count as amounts.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let normalized = raw.trim().replace(',', ".");
    let value: f64 = normalized.parse().ok()?;

    if value.is_finite() && value > 0.0 {
        Some(value)
    } else {
        None
    }
}

/// First letter upper-case, rest unchanged.
pub fn capitalize_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
