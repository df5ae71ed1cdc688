use serde::{Deserialize, Serialize};
use std::fmt;

use super::order::OrderSide;

/// Identifier of one scheduled invocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Run id derived from the market and the scheduled slot start.
    ///
    /// Two invocations for the same slot share this id; order identities add
    /// a per-invocation token on top of it.
    pub fn for_slot(market: &str, slot_start: chrono::DateTime<chrono::Utc>) -> Self {
        Self(format!("{market}-{}", slot_start.format("%Y%m%dT%H%M")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Client-side order identity.
///
/// Stable across retries of one leg within one invocation. A different
/// invocation, leg, side or quantity gives a different id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientOrderId(pub String);

impl ClientOrderId {
    /// BLAKE3 of `run_id ‖ invocation ‖ leg ‖ side ‖ quantity`, truncated to 32 hex chars.
    pub fn for_leg(
        run_id: &RunId,
        invocation: &str,
        leg: usize,
        side: OrderSide,
        quantity: f64,
    ) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(run_id.0.as_bytes());
        hasher.update(&(invocation.len() as u64).to_le_bytes());
        hasher.update(invocation.as_bytes());
        hasher.update(&(leg as u64).to_le_bytes());
        hasher.update(&[match side {
            OrderSide::Buy => 0u8,
            OrderSide::Sell => 1u8,
        }]);
        hasher.update(&quantity.to_bits().to_le_bytes());
        let hex = hasher.finalize().to_hex();
        Self(hex.as_str()[..32].to_string())
    }
}

impl fmt::Display for ClientOrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn client_order_id_is_deterministic() {
        let run = RunId::new("ADAUSD-20240102T0100");
        let id = |inv: &str, leg, side, qty| ClientOrderId::for_leg(&run, inv, leg, side, qty);
        assert_eq!(id("a", 0, OrderSide::Buy, 2.0), id("a", 0, OrderSide::Buy, 2.0));
        assert_ne!(id("a", 0, OrderSide::Buy, 2.0), id("a", 1, OrderSide::Buy, 2.0));
        assert_eq!(id("a", 3, OrderSide::Sell, 1.0).0.len(), 32);
    }

    #[test]
    fn same_slot_different_order_gets_a_different_id() {
        let run = RunId::new("ADAUSD-20240102T0100");
        let first = ClientOrderId::for_leg(&run, "a", 0, OrderSide::Buy, 2.0);
        assert_ne!(first, ClientOrderId::for_leg(&run, "a", 0, OrderSide::Sell, 2.0));
        assert_ne!(first, ClientOrderId::for_leg(&run, "a", 0, OrderSide::Buy, 2.5));
        assert_ne!(first, ClientOrderId::for_leg(&run, "b", 0, OrderSide::Buy, 2.0));
    }

    #[test]
    fn slot_run_id_format() {
        let t = chrono::Utc.with_ymd_and_hms(2024, 1, 2, 13, 0, 0).unwrap();
        assert_eq!(RunId::for_slot("ADAUSD", t).as_str(), "ADAUSD-20240102T1300");
    }
}
