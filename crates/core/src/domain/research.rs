use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One price extracted from a search-results snapshot by the research
/// heuristic. The label is the surrounding text fragment, kept short enough
/// for display.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceFinding {
    pub label: String,
    pub amount: Decimal,
    pub currency: String,
}
