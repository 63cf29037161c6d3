use fnv::FnvHashMap;
use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::LazyLock;
use xchange_instrument::Currency;

use crate::error::CoreError;

const MAX_EXPRESSION_LEN: usize = 200;

/// Currencies the query parser resolves to before a route is even attempted
/// (spec §4.10, C11): a small symbol table, the alphabetic ISO fallback, and
/// a dynamic full-name alias map populated as new Spot/Fiat symbols are
/// discovered.
#[derive(Debug, Clone)]
pub struct CurrencyTables {
    symbols: Vec<(&'static str, Currency)>,
    aliases: FnvHashMap<String, Currency>,
}

impl Default for CurrencyTables {
    fn default() -> Self {
        Self::new()
    }
}

impl CurrencyTables {
    pub fn new() -> Self {
        let symbols = vec![
            ("$", Currency::new("USD")),
            ("€", Currency::new("EUR")),
            ("£", Currency::new("GBP")),
            ("₽", Currency::new("RUB")),
            ("₺", Currency::new("TRY")),
        ];
        let mut aliases = FnvHashMap::default();
        for (name, code) in [
            ("dollars", "USD"),
            ("dollar", "USD"),
            ("euros", "EUR"),
            ("euro", "EUR"),
            ("pounds", "GBP"),
            ("rubles", "RUB"),
            ("ruble", "RUB"),
            ("toncoin", "TON"),
            ("bitcoin", "BTC"),
            ("tether", "USDT"),
        ] {
            aliases.insert(name.to_string(), Currency::new(code));
        }
        Self { symbols, aliases }
    }

    /// Register a dynamically discovered alias (e.g. a full name the Fiat
    /// provider's supported-currency list surfaces for a code already known
    /// to the rate cache).
    pub fn register_alias(&mut self, name: impl Into<String>, code: Currency) {
        self.aliases.insert(name.into().to_ascii_lowercase(), code);
    }

    /// Resolve one token using, in order: the symbol table, the ISO-code map
    /// (handled by the alphabetic fallback since every code is itself a valid
    /// token), the alias map, then the alphabetic fallback of "any bare
    /// 3-letter alpha token is accepted as an ISO code" (spec §4.10).
    pub fn resolve(&self, token: &str) -> Option<Currency> {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return None;
        }
        for (symbol, currency) in &self.symbols {
            if trimmed == *symbol {
                return Some(currency.clone());
            }
        }
        if let Some(currency) = self.aliases.get(&trimmed.to_ascii_lowercase()) {
            return Some(currency.clone());
        }
        if trimmed.len() >= 3 && trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
            return Some(Currency::new(trimmed));
        }
        None
    }
}

fn strip_spaces(input: &str) -> String {
    input.chars().filter(|c| *c != ' ' && *c != '\u{a0}').collect()
}

/// Normalize one numeric literal's decimal/thousands separators (spec §4.10
/// "Amount normalization"). `raw` has already had whitespace stripped.
fn normalize_numeric_literal(raw: &str) -> Option<Decimal> {
    let last_dot = raw.rfind('.');
    let last_comma = raw.rfind(',');

    let canonical = match (last_dot, last_comma) {
        (Some(dot), Some(comma)) => {
            if dot > comma {
                raw.replace(',', "")
            } else {
                let mut s = raw.replace('.', "");
                if let Some(pos) = s.rfind(',') {
                    s.replace_range(pos..=pos, ".");
                }
                s
            }
        }
        (None, Some(_)) => {
            let comma_count = raw.matches(',').count();
            let trailing = raw.rsplit(',').next().unwrap_or("");
            let looks_decimal = comma_count == 1
                && (1..=3).contains(&trailing.len())
                && trailing.chars().all(|c| c.is_ascii_digit());
            if looks_decimal {
                raw.replace(',', ".")
            } else {
                raw.replace(',', "")
            }
        }
        _ => raw.to_string(),
    };

    Decimal::from_str(&canonical).ok()
}

fn parse_factor(token: &str) -> Option<Decimal> {
    let token = strip_spaces(token);
    let (literal, multiplier) = if let Some(stripped) = token.strip_suffix(['k', 'K']) {
        (stripped, Decimal::from(1_000))
    } else if let Some(stripped) = token.strip_suffix(['m', 'M']) {
        (stripped, Decimal::from(1_000_000))
    } else {
        (token.as_str(), Decimal::ONE)
    };
    normalize_numeric_literal(literal).map(|value| value * multiplier)
}

/// Evaluate a bounded arithmetic expression of `*`/`/`-chained numeric
/// literals (each with an optional `k`/`m` suffix) into a single [`Decimal`]
/// (spec §4.10 "Amount evaluator").
pub fn evaluate_expression(expr: &str) -> Result<Decimal, CoreError> {
    if expr.is_empty() || expr.len() > MAX_EXPRESSION_LEN {
        return Err(CoreError::InvalidAmount(expr.to_string()));
    }

    let mut result: Option<Decimal> = None;
    let mut pending_division = false;
    for raw_token in expr.split_inclusive(['*', '/']) {
        let (token, operator) = match raw_token.chars().last() {
            Some('*') => (&raw_token[..raw_token.len() - 1], Some('*')),
            Some('/') => (&raw_token[..raw_token.len() - 1], Some('/')),
            _ => (raw_token, None),
        };
        let value = parse_factor(token).ok_or_else(|| CoreError::InvalidAmount(expr.to_string()))?;

        result = Some(match result {
            None => value,
            Some(acc) if pending_division => {
                if value.is_zero() {
                    return Err(CoreError::InvalidAmount("division by zero".to_string()));
                }
                acc / value
            }
            Some(acc) => acc * value,
        });
        pending_division = operator == Some('/');
    }

    result.ok_or_else(|| CoreError::InvalidAmount(expr.to_string()))
}

/// The result of successfully parsing a free-text query (spec §4.10).
#[derive(Debug, Clone)]
pub struct ParsedQuery {
    pub amount: Decimal,
    pub from: Currency,
    /// `None` for the single-currency shape, which triggers the caller's
    /// default target list rather than naming one explicitly.
    pub to: Option<Currency>,
}

const EXPR_PATTERN: &str = r"[\d.,\u{a0}\s]+[kKmM]?(?:[*/][\d.,\u{a0}\s]+[kKmM]?)*";

fn regex_with(pattern: String) -> Regex {
    Regex::new(&pattern).expect("parser regex is a fixed, tested pattern")
}

static RE_EXPR_FROM_TO: LazyLock<Regex> = LazyLock::new(|| {
    regex_with(format!(
        r"(?i)^\s*(?P<expr>{EXPR_PATTERN})\s*(?P<from>[A-Za-z$€£₽₺]{{1,10}})\s*(?:to|in|=|→|->|2)\s*(?P<to>[A-Za-z$€£₽₺]{{1,10}})\s*$"
    ))
});
static RE_EXPR_FROM_TO_SPACED: LazyLock<Regex> = LazyLock::new(|| {
    regex_with(format!(
        r"(?i)^\s*(?P<expr>{EXPR_PATTERN})\s+(?P<from>[A-Za-z$€£₽₺]{{2,10}})\s+(?P<to>[A-Za-z$€£₽₺]{{2,10}})\s*$"
    ))
});
static RE_EXPR_GLUED: LazyLock<Regex> = LazyLock::new(|| {
    regex_with(format!(r"(?i)^\s*(?P<expr>{EXPR_PATTERN})(?P<tail>[A-Za-z]{{6,}})\s*$"))
});
static RE_HOW_MUCH: LazyLock<Regex> = LazyLock::new(|| {
    regex_with(format!(
        r"(?i)^\s*how much is\s+(?P<expr>{EXPR_PATTERN})\s+(?P<from>[A-Za-z$€£₽₺]{{1,10}})(?:\s+(?:in|to)\s+(?P<to>[A-Za-z$€£₽₺]{{1,10}}))?\s*$"
    ))
});
static RE_FROM_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    regex_with(format!(
        r"(?i)^\s*(?:from|in)\s+(?P<expr>{EXPR_PATTERN})\s+(?P<from>[A-Za-z$€£₽₺]{{1,10}})\s*$"
    ))
});
static RE_FROM_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    regex_with(format!(
        r"(?i)^\s*(?:from|in)\s+(?P<from>[A-Za-z$€£₽₺]{{1,10}})\s+(?P<expr>{EXPR_PATTERN})\s*$"
    ))
});
static RE_EXPR_FROM_ONLY: LazyLock<Regex> = LazyLock::new(|| {
    regex_with(format!(
        r"(?i)^\s*(?P<expr>{EXPR_PATTERN})\s+(?P<from>[A-Za-z$€£₽₺]{{1,10}})\s*$"
    ))
});

/// A bare currency symbol glued directly onto an amount (e.g. `"$1,234.56"`)
/// is resolved through the explicit symbol table ahead of the six
/// token-based shapes (spec §4.10 "explicit symbol table (longest-
/// prefix/suffix match against the amount string)", §8 scenario 5). There is
/// no separate target token in this shape, so it always produces a
/// single-currency query.
fn symbol_glued_amount(raw: &str, tables: &CurrencyTables) -> Option<ParsedQuery> {
    for (symbol, currency) in &tables.symbols {
        let rest = raw.strip_prefix(symbol).or_else(|| raw.strip_suffix(symbol));
        if let Some(rest) = rest {
            if let Ok(amount) = evaluate_expression(&strip_spaces(rest)) {
                return Some(ParsedQuery { amount, from: currency.clone(), to: None });
            }
        }
    }
    None
}

fn split_glued_codes(tail: &str, tables: &CurrencyTables) -> Option<(Currency, Currency)> {
    let chars: Vec<char> = tail.chars().collect();
    if chars.len() < 6 {
        return None;
    }
    for split in 3..=chars.len() - 3 {
        let a: String = chars[..split].iter().collect();
        let b: String = chars[split..].iter().collect();
        if let (Some(from), Some(to)) = (tables.resolve(&a), tables.resolve(&b)) {
            return Some((from, to));
        }
    }
    None
}

/// Parse a free-text query into `(amount, from, to?)`, trying the six
/// recognized shapes in order and returning the first match (spec §4.10).
/// Empty or non-matching input yields `None` ("no answer").
pub fn parse_query(raw: &str, tables: &CurrencyTables) -> Option<ParsedQuery> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Some(parsed) = symbol_glued_amount(raw, tables) {
        return Some(parsed);
    }

    if let Some(caps) = RE_EXPR_FROM_TO.captures(raw) {
        let amount = evaluate_expression(&strip_spaces(&caps["expr"])).ok()?;
        let from = tables.resolve(&caps["from"])?;
        let to = tables.resolve(&caps["to"])?;
        return Some(ParsedQuery { amount, from, to: Some(to) });
    }

    if let Some(caps) = RE_EXPR_FROM_TO_SPACED.captures(raw) {
        let amount = evaluate_expression(&strip_spaces(&caps["expr"])).ok()?;
        let from = tables.resolve(&caps["from"])?;
        let to = tables.resolve(&caps["to"])?;
        return Some(ParsedQuery { amount, from, to: Some(to) });
    }

    if let Some(caps) = RE_EXPR_GLUED.captures(raw) {
        let amount = evaluate_expression(&strip_spaces(&caps["expr"])).ok()?;
        let (from, to) = split_glued_codes(&caps["tail"], tables)?;
        return Some(ParsedQuery { amount, from, to: Some(to) });
    }

    if let Some(caps) = RE_HOW_MUCH.captures(raw) {
        let amount = evaluate_expression(&strip_spaces(&caps["expr"])).ok()?;
        let from = tables.resolve(&caps["from"])?;
        let to = caps.name("to").and_then(|m| tables.resolve(m.as_str()));
        return Some(ParsedQuery { amount, from, to });
    }

    if let Some(caps) = RE_FROM_PREFIX.captures(raw) {
        let amount = evaluate_expression(&strip_spaces(&caps["expr"])).ok()?;
        let from = tables.resolve(&caps["from"])?;
        return Some(ParsedQuery { amount, from, to: None });
    }

    if let Some(caps) = RE_FROM_SUFFIX.captures(raw) {
        let amount = evaluate_expression(&strip_spaces(&caps["expr"])).ok()?;
        let from = tables.resolve(&caps["from"])?;
        return Some(ParsedQuery { amount, from, to: None });
    }

    if let Some(caps) = RE_EXPR_FROM_ONLY.captures(raw) {
        let amount = evaluate_expression(&strip_spaces(&caps["expr"])).ok()?;
        let from = tables.resolve(&caps["from"])?;
        return Some(ParsedQuery { amount, from, to: None });
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn comma_is_decimal_when_trailing_group_is_short() {
        assert_eq!(normalize_numeric_literal("1234,56"), Some(dec!(1234.56)));
    }

    #[test]
    fn comma_is_thousands_separator_otherwise() {
        assert_eq!(normalize_numeric_literal("12,345"), Some(dec!(12345)));
    }

    #[test]
    fn dot_and_comma_together_rightmost_wins() {
        assert_eq!(normalize_numeric_literal("1.234,56"), Some(dec!(1234.56)));
        assert_eq!(normalize_numeric_literal("1,234.56"), Some(dec!(1234.56)));
    }

    #[test]
    fn k_and_m_suffixes_multiply() {
        assert_eq!(evaluate_expression("5k").unwrap(), dec!(5000));
        assert_eq!(evaluate_expression("2m").unwrap(), dec!(2000000));
    }

    #[test]
    fn expression_supports_chained_multiply_and_divide() {
        assert_eq!(evaluate_expression("10*2/5").unwrap(), dec!(4));
    }

    #[test]
    fn division_by_zero_is_rejected() {
        assert!(evaluate_expression("10/0").is_err());
    }

    #[test]
    fn oversized_expression_is_rejected() {
        let expr = "1".repeat(MAX_EXPRESSION_LEN + 1);
        assert!(evaluate_expression(&expr).is_err());
    }

    #[test]
    fn parses_expr_from_to_shape() {
        let tables = CurrencyTables::new();
        let parsed = parse_query("100 usd to eur", &tables).unwrap();
        assert_eq!(parsed.amount, dec!(100));
        assert_eq!(parsed.from, Currency::new("USD"));
        assert_eq!(parsed.to, Some(Currency::new("EUR")));
    }

    #[test]
    fn parses_space_separated_shape() {
        let tables = CurrencyTables::new();
        let parsed = parse_query("50 eur usd", &tables).unwrap();
        assert_eq!(parsed.from, Currency::new("EUR"));
        assert_eq!(parsed.to, Some(Currency::new("USD")));
    }

    #[test]
    fn parses_glued_codes_shape() {
        let tables = CurrencyTables::new();
        let parsed = parse_query("100usdeur", &tables).unwrap();
        assert_eq!(parsed.amount, dec!(100));
        assert_eq!(parsed.from, Currency::new("USD"));
        assert_eq!(parsed.to, Some(Currency::new("EUR")));
    }

    #[test]
    fn parses_how_much_is_shape_without_target() {
        let tables = CurrencyTables::new();
        let parsed = parse_query("how much is 10 usd", &tables).unwrap();
        assert_eq!(parsed.from, Currency::new("USD"));
        assert_eq!(parsed.to, None);
    }

    #[test]
    fn parses_how_much_is_shape_with_target() {
        let tables = CurrencyTables::new();
        let parsed = parse_query("how much is 10 usd in eur", &tables).unwrap();
        assert_eq!(parsed.to, Some(Currency::new("EUR")));
    }

    #[test]
    fn parses_single_currency_shape_with_no_target() {
        let tables = CurrencyTables::new();
        let parsed = parse_query("25 usd", &tables).unwrap();
        assert_eq!(parsed.amount, dec!(25));
        assert_eq!(parsed.to, None);
    }

    #[test]
    fn symbol_glued_amount_resolves_to_single_currency_shape() {
        let tables = CurrencyTables::new();
        let parsed = parse_query("$1,234.56", &tables).unwrap();
        assert_eq!(parsed.amount, dec!(1234.56));
        assert_eq!(parsed.from, Currency::new("USD"));
        assert_eq!(parsed.to, None);
    }

    #[test]
    fn empty_query_yields_no_answer() {
        let tables = CurrencyTables::new();
        assert!(parse_query("", &tables).is_none());
    }

    #[test]
    fn nonsense_query_yields_no_answer() {
        let tables = CurrencyTables::new();
        assert!(parse_query("what is the weather", &tables).is_none());
    }
}
