//! Chain-agnostic domain types and the shared leverage math.

pub mod amount;
pub mod math;
mod position;
mod token;

pub use amount::{format_units, parse_units};
pub use math::{MathError, Quote, ONE_HUNDRED_PERCENT_BPS};
pub use position::{Position, RebalanceDirection, RedeemSplit};
pub use token::TokenInfo;
