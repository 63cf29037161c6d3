#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_crate_dependencies,
    unused_extern_crates,
    clippy::unused_self,
    missing_debug_implementations
)]

//! Query parsing, multi-hop conversion routing, the "how much input yields
//! this output" inverse solver and answer formatting that sit on top of
//! [`xchange_data::RateCache`]. The `process_query` entry point is the
//! crate's contract with the external module-dispatch fan-out.

pub mod answer;
pub mod dispatch;
pub mod error;
pub mod inverse;
pub mod parser;
pub mod router;

pub use answer::{format_conversion, format_inverse, no_results_found, Answer, AnswerRank, TradeTag};
pub use dispatch::{process_query, AnswerModule, CancelToken, CurrencyModule};
pub use error::CoreError;
pub use inverse::{solve_for_input, RouteShape};
pub use parser::{evaluate_expression, parse_query, CurrencyTables, ParsedQuery};
pub use router::{ConversionResult, PricedLeg, Router};
