//! Progressive tax bracket calculator
//!
//! Pure bracket walk plus a marginal simulation: the tax burden attributable
//! to trading profit is tax(base + profit) - tax(base), which is how marginal
//! tax is correctly attributed when stacking income sources under a
//! progressive schedule.

use crate::pipeline::types::TaxBracket;
use crate::storage::TaxStore;
use serde::{Deserialize, Serialize};

/// One applied bracket span. `up_to` is None for the open-ended residual
/// above the highest listed limit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BracketTax {
    pub up_to: Option<f64>,
    pub rate_percent: f64,
    pub tax: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxBreakdown {
    pub brackets: Vec<BracketTax>,
    pub total_tax: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxSimulation {
    pub without_trading: TaxBreakdown,
    pub with_trading: TaxBreakdown,
    /// tax(with) - tax(without): the marginal tax caused by trading profit
    pub trading_delta: f64,
}

/// Walk the brackets consuming `income` into successive spans.
///
/// Brackets are consumed in ascending income-limit order. Each span is
/// min(remaining income, bracket limit - previous limit) taxed at the
/// bracket's rate; income above the highest listed limit is taxed at the top
/// bracket's rate. Total tax is clamped to a minimum of zero.
pub fn progressive_tax(brackets: &[TaxBracket], income: f64) -> TaxBreakdown {
    let mut remaining = income;
    let mut prev_limit = 0.0;
    let mut total = 0.0;
    let mut applied = Vec::new();

    for bracket in brackets {
        let span = remaining.min(bracket.income_limit - prev_limit).max(0.0);
        let tax = span * (bracket.rate_percent / 100.0);
        applied.push(BracketTax {
            up_to: Some(bracket.income_limit),
            rate_percent: bracket.rate_percent,
            tax,
        });
        total += tax;
        remaining -= span;
        prev_limit = bracket.income_limit;
        if remaining <= 0.0 {
            break;
        }
    }

    if remaining > 0.0 {
        if let Some(top) = brackets.last() {
            let tax = remaining * (top.rate_percent / 100.0);
            applied.push(BracketTax {
                up_to: None,
                rate_percent: top.rate_percent,
                tax,
            });
            total += tax;
        }
    }

    TaxBreakdown {
        brackets: applied,
        total_tax: total.max(0.0),
    }
}

/// Simulate a year's tax with and without the trading profit stacked on top
/// of the base income.
pub async fn simulate(
    store: &dyn TaxStore,
    year: i32,
    base_income: f64,
    trading_profit: f64,
) -> Result<TaxSimulation, Box<dyn std::error::Error>> {
    let brackets = store.brackets_for_year(year).await?;
    if brackets.is_empty() {
        return Err(format!("no tax brackets seeded for {}", year).into());
    }
    let without_trading = progressive_tax(&brackets, base_income);
    let with_trading = progressive_tax(&brackets, base_income + trading_profit);
    let trading_delta = with_trading.total_tax - without_trading.total_tax;
    Ok(TaxSimulation {
        without_trading,
        with_trading,
        trading_delta,
    })
}
