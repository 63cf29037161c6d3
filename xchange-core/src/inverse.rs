use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::error::CoreError;
use crate::router::ConversionResult;

const FIXED_POINT_MAX_PASSES: u32 = 3;
const FIXED_POINT_TOLERANCE: Decimal = dec!(0.01);
const BISECTION_MAX_ITERATIONS: u32 = 150;

/// Whether a route is priced by a monotone, smooth function of input (Spot
/// ladder walk / Fiat linear rate — amenable to bisection) or by an opaque,
/// possibly non-linear provider response (any route touching Bridge — solved
/// by corrective fixed-point iteration instead) (spec §4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteShape {
    Monotone,
    Opaque,
}

/// Find an input amount that converts to (approximately) `target_output`,
/// given one forward pricing function `price(input) -> output` (spec §4.9,
/// C10). `shape` selects the solving strategy; callers determine it from
/// whether the route touches the Bridge provider.
pub async fn solve_for_input<F, Fut>(
    target_output: Decimal,
    estimate_seed: Decimal,
    shape: RouteShape,
    mut price: F,
) -> Result<Decimal, CoreError>
where
    F: FnMut(Decimal) -> Fut,
    Fut: std::future::Future<Output = Result<ConversionResult, CoreError>>,
{
    let seed_result = price(estimate_seed).await?;
    if seed_result.final_amount.is_zero() {
        return Err(CoreError::AmountTooSmall { remainder: Decimal::ZERO });
    }
    let estimated_rate = seed_result.final_amount / estimate_seed;
    let mut estimate = target_output / estimated_rate;

    match shape {
        RouteShape::Opaque => {
            for _ in 0..FIXED_POINT_MAX_PASSES {
                let actual = price(estimate).await?.final_amount;
                if actual.is_zero() {
                    break;
                }
                let relative_error = ((actual - target_output) / target_output).abs();
                if relative_error <= FIXED_POINT_TOLERANCE {
                    return Ok(estimate);
                }
                estimate = estimate * target_output / actual;
            }
            Ok(estimate)
        }
        RouteShape::Monotone => {
            let mut low = estimate * dec!(0.1);
            let mut high = estimate * dec!(10);
            let absolute_tolerance = (target_output * dec!(0.00001)).max(dec!(0.000001));

            for _ in 0..BISECTION_MAX_ITERATIONS {
                let mid = (low + high) / dec!(2);
                let actual = price(mid).await?.final_amount;
                let diff = actual - target_output;
                if diff.abs() <= absolute_tolerance {
                    return Ok(mid);
                }
                if diff < Decimal::ZERO {
                    low = mid;
                } else {
                    high = mid;
                }
            }
            Ok((low + high) / dec!(2))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xchange_instrument::Currency;

    fn stub_result(from: Currency, to: Currency, input: Decimal, output: Decimal) -> ConversionResult {
        ConversionResult {
            from,
            to,
            input_amount: input,
            final_amount: output,
            effective_rate: if input.is_zero() { Decimal::ZERO } else { output / input },
            legs: Vec::new(),
        }
    }

    #[tokio::test]
    async fn bisection_converges_on_a_linear_price_function() {
        let from = Currency::new("USD");
        let to = Currency::new("EUR");
        let rate = dec!(0.9);
        let result = solve_for_input(dec!(90), dec!(1), RouteShape::Monotone, |input| {
            let from = from.clone();
            let to = to.clone();
            async move { Ok(stub_result(from, to, input, input * rate)) }
        })
        .await
        .unwrap();
        // 90 / 0.9 = 100, within the solver's absolute tolerance.
        assert!((result - dec!(100)).abs() < dec!(0.01));
    }

    #[tokio::test]
    async fn fixed_point_converges_on_a_slightly_nonlinear_price_function() {
        let from = Currency::new("RUB");
        let to = Currency::new("TON");
        let result = solve_for_input(dec!(10), dec!(1), RouteShape::Opaque, |input| {
            let from = from.clone();
            let to = to.clone();
            // A mildly nonlinear quote: effective rate drifts slightly with size.
            async move {
                let rate = dec!(0.01) * (Decimal::ONE + input * dec!(0.0001));
                Ok(stub_result(from, to, input, input * rate))
            }
        })
        .await
        .unwrap();
        let check = result * dec!(0.01) * (Decimal::ONE + result * dec!(0.0001));
        assert!((check - dec!(10)).abs() / dec!(10) <= FIXED_POINT_TOLERANCE);
    }
}
