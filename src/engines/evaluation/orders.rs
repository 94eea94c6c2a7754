use crate::config::trade_management::ActivationRule;
use crate::error::{EvotraderError, Result};
use crate::types::{Candle, ExitReason, OrderSide, OrderType, PositionSide};
use serde::{Deserialize, Serialize};

pub type OrderId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrailingStatus {
    Pending,
    Active,
}

/// Trailing stop state: waits for the activation price, then follows the
/// most favorable price and fills once the market retraces `callback_rate`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrailingStop {
    pub callback_rate: f64,
    pub activation_price: f64,
    pub status: TrailingStatus,
    /// Highest high (longs) or lowest low (shorts) seen since activation
    pub extreme: Option<f64>,
}

impl TrailingStop {
    /// `target` is the furthest take profit, required by `PercentageToTarget`
    pub fn new(
        callback_rate: f64,
        rule: ActivationRule,
        entry_price: f64,
        target: Option<f64>,
        side: PositionSide,
    ) -> Result<Self> {
        if !(callback_rate > 0.0 && callback_rate < 1.0) {
            return Err(EvotraderError::InvalidOrder(format!(
                "Trailing callback rate must be in (0, 1), got {}",
                callback_rate
            )));
        }

        let activation_price = match rule {
            ActivationRule::ChangePercentage(change) => entry_price * (1.0 + side.direction() * change),
            ActivationRule::PercentageToTarget(share) => {
                let target = target.ok_or_else(|| {
                    EvotraderError::InvalidOrder(
                        "Trailing stop activates relative to a take profit but none is set".to_string(),
                    )
                })?;
                entry_price + (target - entry_price) * share
            }
        };

        if !(activation_price.is_finite() && activation_price > 0.0) {
            return Err(EvotraderError::InvalidOrder(format!(
                "Trailing activation price {} is not a valid price",
                activation_price
            )));
        }

        Ok(Self {
            callback_rate,
            activation_price,
            status: TrailingStatus::Pending,
            extreme: None,
        })
    }

    /// Current stop level, once active
    pub fn stop_price(&self, side: PositionSide) -> Option<f64> {
        match (self.status, self.extreme) {
            (TrailingStatus::Active, Some(extreme)) => {
                Some(extreme * (1.0 - side.direction() * self.callback_rate))
            }
            _ => None,
        }
    }

    fn on_candle(&mut self, candle: &Candle, side: PositionSide) -> Option<f64> {
        match side {
            PositionSide::Long => match self.extreme {
                Some(extreme) if self.status == TrailingStatus::Active => {
                    let level = extreme * (1.0 - self.callback_rate);
                    if candle.low <= level {
                        return Some(level.min(candle.open));
                    }
                    self.extreme = Some(extreme.max(candle.high));
                    None
                }
                _ => {
                    // The activating candle never fills
                    if candle.high >= self.activation_price {
                        self.status = TrailingStatus::Active;
                        self.extreme = Some(candle.high);
                    }
                    None
                }
            },
            PositionSide::Short => match self.extreme {
                Some(extreme) if self.status == TrailingStatus::Active => {
                    let level = extreme * (1.0 + self.callback_rate);
                    if candle.high >= level {
                        return Some(level.max(candle.open));
                    }
                    self.extreme = Some(extreme.min(candle.low));
                    None
                }
                _ => {
                    if candle.low <= self.activation_price {
                        self.status = TrailingStatus::Active;
                        self.extreme = Some(candle.low);
                    }
                    None
                }
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum OrderKind {
    Market,
    Limit { price: f64 },
    Stop { trigger: f64 },
    TrailingStopMarket(TrailingStop),
}

impl OrderKind {
    pub fn order_type(&self) -> OrderType {
        match self {
            Self::Market => OrderType::Market,
            Self::Limit { .. } => OrderType::Limit,
            Self::Stop { .. } => OrderType::Stop,
            Self::TrailingStopMarket(_) => OrderType::TrailingStopMarket,
        }
    }

    pub fn exit_reason(&self) -> ExitReason {
        match self {
            Self::Market => ExitReason::Market,
            Self::Limit { .. } => ExitReason::TakeProfit,
            Self::Stop { .. } => ExitReason::StopLoss,
            Self::TrailingStopMarket(_) => ExitReason::TrailingStop,
        }
    }

    /// When several orders trigger inside one candle the path through the
    /// candle is unknown, so adverse exits settle before limits.
    fn settlement_rank(&self) -> u8 {
        match self {
            Self::Market => 0,
            Self::Stop { .. } | Self::TrailingStopMarket(_) => 1,
            Self::Limit { .. } => 2,
        }
    }
}

/// A resting order that reduces an open position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenOrder {
    pub id: OrderId,
    pub pair: String,
    pub side: OrderSide,
    pub position_side: PositionSide,
    pub quantity: f64,
    pub kind: OrderKind,
}

impl OpenOrder {
    /// Checks the order against one candle, advancing trailing state, and
    /// returns the fill price when it triggers.
    pub fn evaluate(&mut self, candle: &Candle, slippage: f64) -> Option<f64> {
        match &mut self.kind {
            OrderKind::Market => Some(market_price(candle.close, self.side, slippage)),
            OrderKind::Limit { price } => {
                let reached = match self.side {
                    OrderSide::Sell => candle.high >= *price,
                    OrderSide::Buy => candle.low <= *price,
                };
                reached.then_some(*price)
            }
            OrderKind::Stop { trigger } => match self.side {
                OrderSide::Sell if candle.low <= *trigger => Some(trigger.min(candle.open)),
                OrderSide::Buy if candle.high >= *trigger => Some(trigger.max(candle.open)),
                _ => None,
            },
            OrderKind::TrailingStopMarket(trailing) => trailing.on_candle(candle, self.position_side),
        }
    }
}

/// Price of a market fill at `price`, moved against the trader by `slippage`
pub fn market_price(price: f64, side: OrderSide, slippage: f64) -> f64 {
    match side {
        OrderSide::Buy => price * (1.0 + slippage),
        OrderSide::Sell => price * (1.0 - slippage),
    }
}

/// An order that triggered on the current candle
#[derive(Debug, Clone, PartialEq)]
pub struct Fill {
    pub order: OpenOrder,
    pub price: f64,
}

#[derive(Debug, Default)]
pub struct OrderBook {
    orders: Vec<OpenOrder>,
    next_id: OrderId,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn place(
        &mut self,
        pair: &str,
        position_side: PositionSide,
        quantity: f64,
        kind: OrderKind,
    ) -> Result<OrderId> {
        if !(quantity.is_finite() && quantity > 0.0) {
            return Err(EvotraderError::InvalidOrder(format!(
                "Order quantity must be positive, got {}",
                quantity
            )));
        }
        let price = match kind {
            OrderKind::Limit { price } => Some(price),
            OrderKind::Stop { trigger } => Some(trigger),
            _ => None,
        };
        if let Some(price) = price {
            if !(price.is_finite() && price > 0.0) {
                return Err(EvotraderError::InvalidOrder(format!("Order price {} is not valid", price)));
            }
        }

        self.next_id += 1;
        let id = self.next_id;
        self.orders.push(OpenOrder {
            id,
            pair: pair.to_string(),
            side: position_side.exit_side(),
            position_side,
            quantity,
            kind,
        });
        log::trace!("Placed {:?} #{} for {} {:?} x{}", kind.order_type(), id, pair, position_side, quantity);
        Ok(id)
    }

    pub fn orders(&self) -> &[OpenOrder] {
        &self.orders
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn orders_for(&self, pair: &str, position_side: PositionSide) -> impl Iterator<Item = &OpenOrder> {
        let pair = pair.to_string();
        self.orders
            .iter()
            .filter(move |o| o.pair == pair && o.position_side == position_side)
    }

    /// Removes every order attached to the given position
    pub fn cancel_for(&mut self, pair: &str, position_side: PositionSide) -> usize {
        let before = self.orders.len();
        self.orders
            .retain(|o| !(o.pair == pair && o.position_side == position_side));
        before - self.orders.len()
    }

    /// Drops orders whose position no longer exists
    pub fn retain_open<F>(&mut self, mut is_open: F)
    where
        F: FnMut(&str, PositionSide) -> bool,
    {
        self.orders.retain(|o| {
            let keep = is_open(&o.pair, o.position_side);
            if !keep {
                log::debug!("Dropping order #{} with no matching position", o.id);
            }
            keep
        });
    }

    /// Evaluates every order against `candle`, removes the triggered ones and
    /// returns them in settlement order.
    pub fn trigger(&mut self, candle: &Candle, slippage: f64) -> Vec<Fill> {
        let mut fills = Vec::new();
        let mut resting = Vec::with_capacity(self.orders.len());
        for mut order in self.orders.drain(..) {
            match order.evaluate(candle, slippage) {
                Some(price) => fills.push(Fill { order, price }),
                None => resting.push(order),
            }
        }
        self.orders = resting;

        fills.sort_by(|a, b| {
            a.order
                .kind
                .settlement_rank()
                .cmp(&b.order.kind.settlement_rank())
                .then(a.order.id.cmp(&b.order.id))
        });
        fills
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    fn candle(open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            open_time: DateTime::<Utc>::from_timestamp(0, 0).unwrap(),
            open,
            high,
            low,
            close,
            volume: 1.0,
        }
    }

    #[test]
    fn test_limit_and_stop_triggers() {
        let mut book = OrderBook::new();
        book.place("BTCUSDT", PositionSide::Long, 1.0, OrderKind::Limit { price: 110.0 }).unwrap();
        book.place("BTCUSDT", PositionSide::Long, 1.0, OrderKind::Stop { trigger: 95.0 }).unwrap();

        assert!(book.trigger(&candle(100.0, 105.0, 96.0, 101.0), 0.0).is_empty());

        // Gap down through the stop fills at the open
        let fills = book.trigger(&candle(94.0, 96.0, 90.0, 92.0), 0.0);
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].price, 94.0);
        assert_eq!(book.len(), 1);
    }

    #[test]
    fn test_adverse_orders_settle_first() {
        let mut book = OrderBook::new();
        book.place("BTCUSDT", PositionSide::Long, 1.0, OrderKind::Limit { price: 110.0 }).unwrap();
        book.place("BTCUSDT", PositionSide::Long, 1.0, OrderKind::Stop { trigger: 95.0 }).unwrap();

        let fills = book.trigger(&candle(100.0, 111.0, 94.0, 100.0), 0.0);
        assert_eq!(fills.len(), 2);
        assert_eq!(fills[0].order.kind.order_type(), OrderType::Stop);
        assert_eq!(fills[1].order.kind.order_type(), OrderType::Limit);
    }

    #[test]
    fn test_short_exits_mirror_longs() {
        let mut book = OrderBook::new();
        book.place("BTCUSDT", PositionSide::Short, 1.0, OrderKind::Limit { price: 90.0 }).unwrap();
        book.place("BTCUSDT", PositionSide::Short, 1.0, OrderKind::Stop { trigger: 105.0 }).unwrap();
        assert_eq!(book.orders()[0].side, OrderSide::Buy);

        let fills = book.trigger(&candle(100.0, 104.0, 89.0, 95.0), 0.0);
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].price, 90.0);
    }

    #[test]
    fn test_trailing_stop_activates_then_trails() {
        let trailing =
            TrailingStop::new(0.1, ActivationRule::ChangePercentage(0.02), 100.0, None, PositionSide::Long)
                .unwrap();
        assert!((trailing.activation_price - 102.0).abs() < 1e-9);

        let mut book = OrderBook::new();
        book.place("BTCUSDT", PositionSide::Long, 1.0, OrderKind::TrailingStopMarket(trailing)).unwrap();

        assert!(book.trigger(&candle(100.0, 101.0, 99.5, 100.5), 0.0).is_empty());
        // Activates, low is below the would-be level but the activating candle never fills
        assert!(book.trigger(&candle(100.5, 103.0, 90.0, 102.5), 0.0).is_empty());
        assert!(book.trigger(&candle(102.5, 110.0, 102.0, 109.0), 0.0).is_empty());

        match book.orders()[0].kind {
            OrderKind::TrailingStopMarket(t) => {
                assert_eq!(t.extreme, Some(110.0));
                assert!((t.stop_price(PositionSide::Long).unwrap() - 99.0).abs() < 1e-9);
            }
            _ => panic!("expected a trailing stop"),
        }

        let fills = book.trigger(&candle(109.0, 109.5, 98.0, 98.5), 0.0);
        assert_eq!(fills.len(), 1);
        assert!((fills[0].price - 99.0).abs() < 1e-9);
    }

    #[test]
    fn test_activation_relative_to_target() {
        let trailing = TrailingStop::new(
            0.05,
            ActivationRule::PercentageToTarget(0.5),
            100.0,
            Some(90.0),
            PositionSide::Short,
        )
        .unwrap();
        assert!((trailing.activation_price - 95.0).abs() < 1e-9);

        let missing =
            TrailingStop::new(0.05, ActivationRule::PercentageToTarget(0.5), 100.0, None, PositionSide::Short);
        assert!(matches!(missing, Err(EvotraderError::InvalidOrder(_))));
    }

    #[test]
    fn test_market_fills_at_close_before_resting_orders() {
        let mut book = OrderBook::new();
        book.place("BTCUSDT", PositionSide::Long, 1.0, OrderKind::Limit { price: 104.0 }).unwrap();
        book.place("BTCUSDT", PositionSide::Long, 1.0, OrderKind::Market).unwrap();

        let fills = book.trigger(&candle(100.0, 105.0, 99.0, 102.0), 0.01);
        assert_eq!(fills.len(), 2);
        assert_eq!(fills[0].order.kind, OrderKind::Market);
        assert_eq!(fills[0].order.side, OrderSide::Sell);
        assert!((fills[0].price - 102.0 * 0.99).abs() < 1e-9);
        assert_eq!(fills[0].order.kind.exit_reason(), ExitReason::Market);
        assert!(book.is_empty());
    }

    #[test]
    fn test_invalid_quantity_rejected() {
        let mut book = OrderBook::new();
        assert!(book.place("BTCUSDT", PositionSide::Long, 0.0, OrderKind::Market).is_err());
        assert!(book.place("BTCUSDT", PositionSide::Long, f64::NAN, OrderKind::Market).is_err());
        assert!(book.is_empty());
    }

    #[test]
    fn test_retain_open_drops_orphans() {
        let mut book = OrderBook::new();
        book.place("BTCUSDT", PositionSide::Long, 1.0, OrderKind::Stop { trigger: 95.0 }).unwrap();
        book.place("BTCUSDT", PositionSide::Short, 1.0, OrderKind::Stop { trigger: 105.0 }).unwrap();
        book.retain_open(|_, side| side == PositionSide::Short);
        assert_eq!(book.len(), 1);
        assert_eq!(book.cancel_for("BTCUSDT", PositionSide::Short), 1);
    }
}
