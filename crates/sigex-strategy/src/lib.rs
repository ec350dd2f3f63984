//! Strategy adapter contract: the boundary a `SignalMachine` crosses to
//! ask "what should I do next". Only the contract and a thin timeout-bounded
//! host live here — concrete strategies are out of scope (Non-goals).

mod dto_validation;
mod host;

pub use dto_validation::{validate_dto, DtoValidationError};
pub use host::{Strategy, StrategyHost, StrategyHostError};
