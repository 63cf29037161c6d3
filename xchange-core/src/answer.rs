use rust_decimal::Decimal;
use xchange_instrument::{Currency, CurrencyClass};

use crate::router::ConversionResult;

/// Priority ladder the formatter assigns a generated answer (spec §4.11
/// "Score is a fixed priority from a small ladder"). Higher scores sort
/// first in the launcher's result list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AnswerRank {
    Inverse = 0,
    Quick = 1,
    Reverse = 2,
    Base = 3,
    Specific = 4,
}

impl AnswerRank {
    pub fn score(self) -> u32 {
        match self {
            AnswerRank::Inverse => 10,
            AnswerRank::Quick => 20,
            AnswerRank::Reverse => 30,
            AnswerRank::Base => 40,
            AnswerRank::Specific => 50,
        }
    }
}

/// Whether the query is acting as a buy or a sell of the BRIDGE_FIAT
/// endpoint, used to tag the answer (spec §4.11 "buy/sell tag driven by the
/// BRIDGE_FIAT endpoint").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeTag {
    Buy,
    Sell,
    None,
}

/// A fully formatted answer item, the core's final output shape (spec §4.11,
/// handed to the external dispatcher described in spec §4.14).
#[derive(Debug, Clone)]
pub struct Answer {
    pub title: String,
    pub subtitle: String,
    pub score: u32,
    pub trade_tag: TradeTag,
    pub slippage_warning: Option<Decimal>,
    pub clipboard_payload: String,
}

fn trade_tag(from_class: CurrencyClass, to_class: CurrencyClass) -> TradeTag {
    if from_class == CurrencyClass::BridgeFiat {
        TradeTag::Buy
    } else if to_class == CurrencyClass::BridgeFiat {
        TradeTag::Sell
    } else {
        TradeTag::None
    }
}

/// Orient the one-unit rate line. The BRIDGE_FIAT <-> USD family always
/// displays as `1 USD = … BRIDGE_FIAT` regardless of query direction (spec
/// §4.11); every other pair displays `1 from = … to`.
fn rate_line(from: &Currency, to: &Currency, from_class: CurrencyClass, to_class: CurrencyClass, rate: Decimal) -> String {
    let usd = Currency::new("USD");
    if (from_class == CurrencyClass::BridgeFiat && *to == usd) || (to_class == CurrencyClass::BridgeFiat && *from == usd) {
        let bridge_fiat = if from_class == CurrencyClass::BridgeFiat { from } else { to };
        let rub_per_usd = if from_class == CurrencyClass::BridgeFiat {
            if rate.is_zero() { Decimal::ZERO } else { Decimal::ONE / rate }
        } else {
            rate
        };
        return format!("1 USD = {rub_per_usd} {bridge_fiat}");
    }
    format!("1 {from} = {rate} {to}")
}

/// Build the final answer for a forward conversion (spec §4.11).
pub fn format_conversion(
    result: &ConversionResult,
    from_class: CurrencyClass,
    to_class: CurrencyClass,
    rank: AnswerRank,
    long_form: bool,
) -> Answer {
    let input_amount = result.input_amount.round_dp(2);
    let final_amount = result.final_amount.round_dp(2);
    let title = if long_form {
        format!("{} {} = {} {}", input_amount, result.from, final_amount, result.to)
    } else {
        format!("{} {}", final_amount, result.to)
    };

    let subtitle = rate_line(&result.from, &result.to, from_class, to_class, result.effective_rate);
    let slippage_warning = result.max_slippage_pct().filter(|pct| *pct > xchange_data::engine::SLIPPAGE_WARNING_PCT);

    Answer {
        title,
        subtitle,
        score: rank.score(),
        trade_tag: trade_tag(from_class, to_class),
        slippage_warning,
        clipboard_payload: result.final_amount.to_string(),
    }
}

/// Build the answer for an inverse query ("how much X do I need to get Y
/// Z?"): the rate line shows `1 target = … source` (spec §4.11 "For inverse
/// results the rate line shows `1 target = … source`").
pub fn format_inverse(
    source_currency: &Currency,
    target_currency: &Currency,
    required_input: Decimal,
    target_output: Decimal,
) -> Answer {
    let rate = if target_output.is_zero() { Decimal::ZERO } else { required_input / target_output };
    Answer {
        title: format!("{required_input} {source_currency}"),
        subtitle: format!("1 {target_currency} = {rate} {source_currency}"),
        score: AnswerRank::Inverse.score(),
        trade_tag: TradeTag::None,
        slippage_warning: None,
        clipboard_payload: required_input.to_string(),
    }
}

pub fn no_results_found(original_query: &str) -> Answer {
    Answer {
        title: "No results found".to_string(),
        subtitle: original_query.to_string(),
        score: 0,
        trade_tag: TradeTag::None,
        slippage_warning: None,
        clipboard_payload: String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn result(from: &str, to: &str, input: Decimal, output: Decimal) -> ConversionResult {
        ConversionResult {
            from: Currency::new(from),
            to: Currency::new(to),
            input_amount: input,
            final_amount: output,
            effective_rate: output / input,
            legs: Vec::new(),
        }
    }

    #[test]
    fn buy_tag_when_input_is_bridge_fiat() {
        let r = result("RUB", "TON", dec!(9000), dec!(100));
        let answer = format_conversion(&r, CurrencyClass::BridgeFiat, CurrencyClass::BridgeCrypto, AnswerRank::Specific, false);
        assert_eq!(answer.trade_tag, TradeTag::Buy);
    }

    #[test]
    fn sell_tag_when_target_is_bridge_fiat() {
        let r = result("TON", "RUB", dec!(100), dec!(9000));
        let answer = format_conversion(&r, CurrencyClass::BridgeCrypto, CurrencyClass::BridgeFiat, AnswerRank::Specific, false);
        assert_eq!(answer.trade_tag, TradeTag::Sell);
    }

    #[test]
    fn bridge_fiat_usd_family_always_orients_per_usd() {
        let r = result("RUB", "USD", dec!(9000), dec!(100));
        let answer = format_conversion(&r, CurrencyClass::BridgeFiat, CurrencyClass::Fiat, AnswerRank::Specific, false);
        assert!(answer.subtitle.starts_with("1 USD = "));
    }

    #[test]
    fn inverse_answer_shows_target_per_source_rate() {
        let answer = format_inverse(&Currency::new("RUB"), &Currency::new("TON"), dec!(900), dec!(10));
        assert!(answer.subtitle.starts_with("1 TON = "));
        assert_eq!(answer.score, AnswerRank::Inverse.score());
    }
}
