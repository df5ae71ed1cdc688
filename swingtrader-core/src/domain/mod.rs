//! Domain types for the swing trading agent

pub mod candle;
pub mod direction;
pub mod ids;
pub mod order;
pub mod position;
pub mod risk_state;
pub mod swing;

pub use candle::{Candle, CandleError, CandleInterval, CandleSeries};
pub use direction::Direction;
pub use ids::{ClientOrderId, RunId};
pub use order::{OrderRequest, OrderResult, OrderSide, OrderType};
pub use position::{AccountState, ExchangePosition, PositionIntent};
pub use risk_state::{drawdown, GuardMode, RiskState};
pub use swing::{SwingKind, SwingLevel, SwingPoint, SwingStructure};
