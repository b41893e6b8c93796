//! Response formatting
//!
//! Pure functions mapping engine results to user-facing text. No side
//! effects, no I/O — the dispatcher decides, this module renders.

use crate::models::{BudgetProgress, Category, Expense};
use chrono::{DateTime, Utc};

const MONTH_NAMES: [&str; 12] = [
    "Janeiro", "Fevereiro", "Março", "Abril", "Maio", "Junho",
    "Julho", "Agosto", "Setembro", "Outubro", "Novembro", "Dezembro",
];

//
// ================= Primitives =================
//

/// Fixed-width 10-segment progress bar: one `█` per completed 10%,
/// `▒` otherwise, capped at 10 segments.
pub fn progress_bar(percentage: f64) -> String {
    let full = ((percentage / 10.0).floor() as i64).clamp(0, 10) as usize;

    let mut bar = String::with_capacity(10 * '█'.len_utf8());
    for _ in 0..full {
        bar.push('█');
    }
    for _ in full..10 {
        bar.push('▒');
    }
    bar
}

/// Brazilian currency rendering: "R$ 1.234,56".
pub fn format_currency(amount: f64) -> String {
    let negative = amount < 0.0;
    let cents = (amount.abs() * 100.0).round() as u128;
    let whole = (cents / 100).to_string();
    let frac = cents % 100;

    let mut grouped = String::new();
    for (i, c) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(c);
    }

    format!("R$ {}{},{:02}", if negative { "-" } else { "" }, grouped, frac)
}

/// Percentage to two decimals, comma separator: "112,50%".
pub fn format_percentage(percentage: f64) -> String {
    format!("{:.2}%", percentage).replace('.', ",")
}

/// dd/mm/yyyy
pub fn format_date(date: &DateTime<Utc>) -> String {
    date.format("%d/%m/%Y").to_string()
}

pub fn month_name(month: u32) -> &'static str {
    MONTH_NAMES[(month.clamp(1, 12) - 1) as usize]
}

pub fn month_name_lower(month: u32) -> String {
    month_name(month).to_lowercase()
}

/// One categorized tip per expense confirmation.
fn advice_for(category_name: &str) -> &'static str {
    match category_name {
        "Alimentação" => "Lembre-se de planejar suas refeições para economizar!",
        "Transporte" => "Já considerou alternativas de transporte para reduzir custos?",
        "Lazer" => "Equilibre seus gastos com lazer para manter suas finanças saudáveis.",
        "Moradia" => "Verifique se há oportunidades de reduzir custos com moradia.",
        "Saúde" => "Investir em saúde é importante, mas pesquise por melhores preços.",
        "Educação" => "Investir em educação é sempre um bom retorno a longo prazo!",
        "Vestuário" => "Considere fazer um planejamento sazonal para compras de roupas.",
        _ => "Continue monitorando seus gastos para alcançar seus objetivos!",
    }
}

//
// ================= Expense Replies =================
//

pub fn expense_confirmation(expense: &Expense, category_name: &str) -> String {
    format!(
        "✅ Despesa registrada com sucesso!\n\n\
         📝 *Descrição:* {}\n\
         💰 *Valor:* {}\n\
         🏷️ *Categoria:* {}\n\
         📅 *Data:* {}\n\n\
         💡 *Dica:* {}",
        expense.description,
        format_currency(expense.amount),
        category_name,
        format_date(&expense.date),
        advice_for(category_name),
    )
}

//
// ================= Category Replies =================
//

fn numbered_category_lines(categories: &[Category]) -> String {
    categories
        .iter()
        .enumerate()
        .map(|(i, category)| format!("{}. {}", i + 1, category.name))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn category_list(categories: &[Category]) -> String {
    format!(
        "📋 *Suas Categorias*\n\n{}\n\n✨ *Total:* {} categorias\n\n\
         💡 *Dica:* Para criar uma nova categoria, envie \"criar categoria [nome]\"",
        numbered_category_lines(categories),
        categories.len(),
    )
}

pub fn category_created(name: &str) -> String {
    format!(
        "✅ *Nova Categoria Criada*\n\n🏷️ *Nome:* {}\n\n\
         Agora você pode registrar despesas nesta categoria!",
        name,
    )
}

pub fn category_duplicate(name: &str, categories: &[Category]) -> String {
    format!(
        "Você já tem uma categoria chamada \"{}\". Suas categorias atuais são:\n\n{}",
        name,
        numbered_category_lines(categories),
    )
}

pub fn category_not_found(name: &str) -> String {
    format!(
        "Não encontrei a categoria \"{}\" entre suas categorias. \
         Verifique se escreveu corretamente.",
        name,
    )
}

//
// ================= Budget Replies =================
//

pub fn budget_saved(category_name: &str, amount: f64, month: u32, is_update: bool) -> String {
    if is_update {
        format!(
            "Ótimo! Atualizei seu orçamento de {} para {} para {}.",
            category_name,
            format_currency(amount),
            month_name_lower(month),
        )
    } else {
        format!(
            "Pronto! Criei um orçamento de {} para {} para {}.",
            format_currency(amount),
            category_name,
            month_name_lower(month),
        )
    }
}

pub fn budget_create_guidance() -> String {
    "Para criar um orçamento, preciso saber qual categoria e qual valor você quer \
     definir. Por exemplo, você pode me dizer \"orçamento alimentação 800\" para \
     definir R$ 800,00 para alimentação."
        .to_string()
}

pub fn budget_no_categories() -> String {
    "Você ainda não possui categorias. Vamos criar uma? Envie \"criar categoria \
     Alimentação\" por exemplo."
        .to_string()
}

pub fn budget_unknown_category(name: &str, available: &[Category]) -> String {
    let names = available
        .iter()
        .map(|category| category.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "Não encontrei a categoria \"{}\". Suas categorias disponíveis são: {}",
        name, names,
    )
}

/// Summary + per-category bars shown for the general budget-info intent.
pub fn budget_info_report(progresses: &[BudgetProgress], month: u32, year: i32) -> String {
    let total_amount: f64 = progresses.iter().map(|p| p.budget.amount).sum();
    let total_spent: f64 = progresses.iter().map(|p| p.spent).sum();
    let percent_spent = if total_amount > 0.0 {
        total_spent / total_amount * 100.0
    } else {
        0.0
    };

    let mut report = format!("📊 *Seus Orçamentos - {}/{}*\n\n", month_name(month), year);

    for progress in progresses {
        let percent_text = if progress.percentage >= 100.0 {
            "⚠️ *Estourado!*".to_string()
        } else {
            format_percentage(progress.percentage)
        };

        report.push_str(&format!(
            "*{}*\n{} {}\n💰 Orçado: {}\n💸 Gasto: {}\n",
            progress.category_name,
            progress_bar(progress.percentage),
            percent_text,
            format_currency(progress.budget.amount),
            format_currency(progress.spent),
        ));

        if progress.percentage < 100.0 {
            report.push_str(&format!("✅ Restante: {}\n", format_currency(progress.remaining)));
        }

        report.push('\n');
    }

    let plural = if progresses.len() > 1 { "s" } else { "" };
    report.push_str(&format!(
        "Você tem {} orçamento{} definido{} para {}, totalizando {}. ",
        progresses.len(),
        plural,
        plural,
        month_name_lower(month),
        format_currency(total_amount),
    ));

    if total_spent > 0.0 {
        report.push_str(&format!(
            "Até agora, você já gastou {} ({}) do total orçado. ",
            format_currency(total_spent),
            format_percentage(percent_spent),
        ));
    }

    if percent_spent > 90.0 {
        report.push_str("Atenção! Você já utilizou quase todo seu orçamento para este mês.");
    } else if percent_spent > 70.0 {
        report.push_str("Você já utilizou boa parte do seu orçamento, fique de olho nos gastos.");
    } else {
        report.push_str("Você ainda tem uma boa parte do seu orçamento disponível para este mês.");
    }

    report
}

/// Onboarding shown when the user asks about budgets but has none yet.
pub fn budget_onboarding(example_category: Option<&str>, month: u32) -> String {
    let mut reply =
        "Os orçamentos te ajudam a controlar seus gastos por categoria. ".to_string();

    match example_category {
        Some(name) => {
            let example = name.to_lowercase();
            reply.push_str(&format!(
                "Por exemplo, você pode definir quanto planeja gastar com {} em {}. \
                 Para criar um orçamento, basta me dizer algo como \"orçamento {} 500\" \
                 para definir R$ 500,00 para {}.",
                example,
                month_name_lower(month),
                example,
                example,
            ));
        }
        None => {
            reply.push_str(
                "Para começar, você pode me dizer \"orçamento alimentação 800\" para \
                 criar um orçamento de R$ 800,00 para alimentação este mês.",
            );
        }
    }

    reply
}

pub fn budget_check_no_budget(category_name: &str) -> String {
    format!(
        "Você ainda não definiu um orçamento para {} neste mês. Para criar, me diga \
         \"orçamento {} [valor]\", substituindo [valor] pelo valor desejado.",
        category_name,
        category_name.to_lowercase(),
    )
}

/// Conversational progress report for one category's budget.
///
/// `remaining_days` counts today through the end of the month; the daily
/// average only appears while more than a quarter of the month remains.
pub fn budget_check_report(
    progress: &BudgetProgress,
    remaining_days: i64,
    total_days: i64,
) -> String {
    let budget = &progress.budget;
    let mut reply = format!(
        "Seu orçamento para {} em {} é de {}. ",
        progress.category_name,
        month_name_lower(budget.month),
        format_currency(budget.amount),
    );

    if progress.spent <= 0.0 {
        reply.push_str("Você ainda não registrou nenhuma despesa nesta categoria neste mês.");
        return reply;
    }

    if progress.is_over_budget {
        let excess = progress.spent - budget.amount;
        reply.push_str(&format!(
            "Você já gastou {}, o que significa que estourou o orçamento em {} ({}).",
            format_currency(progress.spent),
            format_currency(excess),
            format_percentage(progress.percentage),
        ));
    } else {
        reply.push_str(&format!(
            "Você já gastou {} ({}) e ainda tem {} disponíveis.",
            format_currency(progress.spent),
            format_percentage(progress.percentage),
            format_currency(progress.remaining),
        ));

        if remaining_days > total_days / 4 && remaining_days > 0 {
            let daily_available = progress.remaining / remaining_days as f64;
            reply.push_str(&format!(
                " Para os {} dias restantes deste mês, você pode gastar em média {} \
                 por dia nesta categoria.",
                remaining_days,
                format_currency(daily_available),
            ));
        }
    }

    if !progress.recent_expenses.is_empty() {
        reply.push_str(&format!(
            "\n\nSuas despesas mais recentes em {} foram:",
            progress.category_name,
        ));
        for expense in &progress.recent_expenses {
            reply.push_str(&format!(
                "\n- {}: {} ({})",
                expense.description,
                format_currency(expense.amount),
                format_date(&expense.date),
            ));
        }
    }

    reply
}

pub fn budget_delete_guidance() -> String {
    "Para remover um orçamento, preciso saber qual categoria. Por exemplo, \
     \"remover orçamento alimentação\"."
        .to_string()
}

pub fn budget_deleted(category_name: &str) -> String {
    format!(
        "Removi o orçamento de {} para este mês. Você pode criar um novo a \
         qualquer momento.",
        category_name,
    )
}

pub fn budget_delete_miss(category_name: &str) -> String {
    format!(
        "Não encontrei um orçamento ativo para {} neste mês.",
        category_name,
    )
}

//
// ================= Fallbacks =================
//

pub fn fallback_categories() -> String {
    "Ops! Tive um problema ao processar suas categorias. Pode tentar novamente?".to_string()
}

pub fn fallback_budget() -> String {
    "Desculpe, encontrei um problema ao processar seu orçamento. Pode tentar novamente?"
        .to_string()
}

pub fn fallback_expense() -> String {
    "✅ Despesa registrada! Mas tive um pequeno problema ao recuperar os detalhes. \
     Você pode verificar seu extrato para confirmar."
        .to_string()
}

pub fn fallback_freeform() -> String {
    "Desculpe, estou com um pequeno problema para processar sua mensagem. \
     Pode tentar novamente?"
        .to_string()
}

pub fn fallback_generic() -> String {
    "Desculpe, estou com dificuldades técnicas no momento. Tente novamente em \
     alguns instantes ou entre em contato com o suporte."
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Budget;
    use uuid::Uuid;

    fn sample_progress(amount: f64, spent: f64) -> BudgetProgress {
        let now = Utc::now();
        let percentage = if amount > 0.0 { spent / amount * 100.0 } else { 0.0 };

        BudgetProgress {
            budget: Budget {
                id: Uuid::new_v4(),
                user_id: Uuid::new_v4(),
                category_id: Uuid::new_v4(),
                amount,
                month: 4,
                year: 2026,
                created_at: now,
                updated_at: now,
            },
            category_name: "Alimentação".to_string(),
            spent,
            percentage: (percentage * 100.0).round() / 100.0,
            remaining: (amount - spent).max(0.0),
            is_over_budget: spent > amount,
            recent_expenses: vec![],
        }
    }

    #[test]
    fn test_progress_bar_segments() {
        assert_eq!(progress_bar(0.0), "▒▒▒▒▒▒▒▒▒▒");
        assert_eq!(progress_bar(9.9), "▒▒▒▒▒▒▒▒▒▒");
        assert_eq!(progress_bar(10.0), "█▒▒▒▒▒▒▒▒▒");
        assert_eq!(progress_bar(55.0), "█████▒▒▒▒▒");
        assert_eq!(progress_bar(100.0), "██████████");
        // capped at 10 segments
        assert_eq!(progress_bar(250.0), "██████████");
    }

    #[test]
    fn test_format_currency() {
        assert_eq!(format_currency(50.0), "R$ 50,00");
        assert_eq!(format_currency(0.5), "R$ 0,50");
        assert_eq!(format_currency(1234.56), "R$ 1.234,56");
        assert_eq!(format_currency(1_000_000.0), "R$ 1.000.000,00");
        assert_eq!(format_currency(-12.3), "R$ -12,30");
    }

    #[test]
    fn test_format_percentage() {
        assert_eq!(format_percentage(112.5), "112,50%");
        assert_eq!(format_percentage(0.0), "0,00%");
    }

    #[test]
    fn test_expense_confirmation_fields() {
        let expense = Expense::new(Uuid::new_v4(), Uuid::new_v4(), "uber", 50.0, None);
        let reply = expense_confirmation(&expense, "Transporte");

        assert!(reply.contains("uber"));
        assert!(reply.contains("R$ 50,00"));
        assert!(reply.contains("Transporte"));
        assert!(reply.contains("alternativas de transporte"));
    }

    #[test]
    fn test_expense_confirmation_unknown_category_uses_default_advice() {
        let expense = Expense::new(Uuid::new_v4(), Uuid::new_v4(), "presente", 80.0, None);
        let reply = expense_confirmation(&expense, "Presentes");

        assert!(reply.contains("Continue monitorando seus gastos"));
    }

    #[test]
    fn test_budget_saved_create_vs_update() {
        let created = budget_saved("Alimentação", 800.0, 4, false);
        assert!(created.contains("Criei"));
        assert!(created.contains("abril"));
        assert!(created.contains("R$ 800,00"));

        let updated = budget_saved("Alimentação", 900.0, 4, true);
        assert!(updated.contains("Atualizei"));
        assert!(!updated.contains("Criei"));
    }

    #[test]
    fn test_budget_check_report_over_budget() {
        let progress = sample_progress(800.0, 900.0);
        let reply = budget_check_report(&progress, 10, 30);

        assert!(reply.contains("estourou"));
        assert!(reply.contains("R$ 100,00"));
        assert!(reply.contains("112,50%"));
        // no daily average once the budget is blown
        assert!(!reply.contains("em média"));
    }

    #[test]
    fn test_budget_check_report_daily_average_window() {
        let progress = sample_progress(800.0, 200.0);

        let early = budget_check_report(&progress, 20, 30);
        assert!(early.contains("em média"));
        assert!(early.contains("R$ 30,00"));

        let late = budget_check_report(&progress, 5, 30);
        assert!(!late.contains("em média"));
    }

    #[test]
    fn test_budget_check_report_without_spend() {
        let progress = sample_progress(800.0, 0.0);
        let reply = budget_check_report(&progress, 20, 30);

        assert!(reply.contains("ainda não registrou nenhuma despesa"));
    }

    #[test]
    fn test_budget_info_report_tiers() {
        let calm = budget_info_report(&[sample_progress(1000.0, 100.0)], 4, 2026);
        assert!(calm.contains("boa parte do seu orçamento disponível"));

        let warning = budget_info_report(&[sample_progress(1000.0, 800.0)], 4, 2026);
        assert!(warning.contains("fique de olho"));

        let critical = budget_info_report(&[sample_progress(1000.0, 950.0)], 4, 2026);
        assert!(critical.contains("Atenção!"));
        assert!(!critical.contains("Estourado"));
    }

    #[test]
    fn test_category_list_numbering() {
        let user_id = Uuid::new_v4();
        let categories = vec![
            Category::new(user_id, "Alimentação"),
            Category::new(user_id, "Transporte"),
        ];

        let reply = category_list(&categories);
        assert!(reply.contains("1. Alimentação"));
        assert!(reply.contains("2. Transporte"));
        assert!(reply.contains("*Total:* 2 categorias"));
    }
}
