use crate::error::{EvotraderError, Result};
use crate::types::PositionSide;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Remaining size below this share of the original counts as fully closed
const CLOSE_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub pair: String,
    pub side: PositionSide,
    pub size: f64,
    /// Collateral locked for the remaining size
    pub margin: f64,
    /// Size-weighted average entry
    pub entry_price: f64,
    pub leverage: u32,
    pub unrealized_profit: f64,
    pub opened_at: DateTime<Utc>,
    /// Largest size the position reached
    pub peak_size: f64,
    /// Gross pnl of the parts already closed
    pub realized_profit: f64,
    /// Every fee paid on the position, opening fees included
    pub fees: f64,
}

impl Position {
    pub fn notional(&self) -> f64 {
        self.size * self.entry_price
    }

    fn pnl_at(&self, price: f64, quantity: f64) -> f64 {
        (price - self.entry_price) * quantity * self.side.direction()
    }

    fn mark(&mut self, price: f64) {
        self.unrealized_profit = self.pnl_at(price, self.size);
    }
}

/// Result of reducing a position
#[derive(Debug, Clone, PartialEq)]
pub struct Settlement {
    pub quantity: f64,
    pub price: f64,
    pub gross_pnl: f64,
    pub fee: f64,
    /// The position as it was when the last of it closed
    pub closed: Option<Position>,
}

impl Settlement {
    pub fn net_pnl(&self) -> f64 {
        self.gross_pnl - self.fee
    }
}

/// Margin account of one trader
///
/// After every settlement `total_wallet_balance` equals the available balance
/// plus the margin and unrealized pnl of the open positions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub available_balance: f64,
    pub total_wallet_balance: f64,
    pub total_unrealized_profit: f64,
    pub positions: Vec<Position>,
}

impl Wallet {
    pub fn new(capital: f64) -> Self {
        Self {
            available_balance: capital,
            total_wallet_balance: capital,
            total_unrealized_profit: 0.0,
            positions: Vec::new(),
        }
    }

    pub fn position(&self, pair: &str, side: PositionSide) -> Option<&Position> {
        self.positions.iter().find(|p| p.pair == pair && p.side == side)
    }

    pub fn has_position(&self, pair: &str, side: PositionSide) -> bool {
        self.position(pair, side).is_some()
    }

    pub fn has_any_position(&self, pair: &str) -> bool {
        self.positions.iter().any(|p| p.pair == pair)
    }

    pub fn total_margin(&self) -> f64 {
        self.positions.iter().map(|p| p.margin).sum()
    }

    /// Opens or adds to a position at `price`, locking margin and paying the fee.
    ///
    /// Returns the fee charged.
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        &mut self,
        pair: &str,
        side: PositionSide,
        size: f64,
        price: f64,
        leverage: u32,
        fee_rate: f64,
        time: DateTime<Utc>,
    ) -> Result<f64> {
        if !(size.is_finite() && size > 0.0) {
            return Err(EvotraderError::InvalidOrder(format!("Position size must be positive, got {}", size)));
        }
        if !(price.is_finite() && price > 0.0) || leverage == 0 {
            return Err(EvotraderError::InvalidOrder(format!(
                "Cannot open at price {} with leverage {}",
                price, leverage
            )));
        }

        let notional = size * price;
        let margin = notional / leverage as f64;
        let fee = notional * fee_rate;
        if margin + fee > self.available_balance {
            return Err(EvotraderError::InvalidOrder(format!(
                "Insufficient margin: need {:.4}, available {:.4}",
                margin + fee,
                self.available_balance
            )));
        }

        self.available_balance -= margin + fee;
        match self.positions.iter_mut().find(|p| p.pair == pair && p.side == side) {
            Some(position) => {
                let total = position.size + size;
                position.entry_price = (position.entry_price * position.size + price * size) / total;
                position.size = total;
                position.peak_size = position.peak_size.max(total);
                position.margin += margin;
                position.fees += fee;
                position.mark(price);
            }
            None => self.positions.push(Position {
                pair: pair.to_string(),
                side,
                size,
                margin,
                entry_price: price,
                leverage,
                unrealized_profit: 0.0,
                opened_at: time,
                peak_size: size,
                realized_profit: 0.0,
                fees: fee,
            }),
        }
        self.refresh_totals();
        Ok(fee)
    }

    /// Closes up to `quantity` of a position at `price`.
    ///
    /// The quantity is capped at the open size.
    pub fn close(
        &mut self,
        pair: &str,
        side: PositionSide,
        quantity: f64,
        price: f64,
        fee_rate: f64,
    ) -> Result<Settlement> {
        if !(quantity.is_finite() && quantity > 0.0) {
            return Err(EvotraderError::InvalidOrder(format!("Close quantity must be positive, got {}", quantity)));
        }
        if !(price.is_finite() && price > 0.0) {
            return Err(EvotraderError::InvalidOrder(format!("Cannot close at price {}", price)));
        }
        let index = self
            .positions
            .iter()
            .position(|p| p.pair == pair && p.side == side)
            .ok_or_else(|| EvotraderError::InvalidOrder(format!("No {:?} position on {}", side, pair)))?;

        let position = &mut self.positions[index];
        let quantity = quantity.min(position.size);
        let released = position.margin * quantity / position.size;
        let gross_pnl = position.pnl_at(price, quantity);
        let fee = quantity * price * fee_rate;

        self.available_balance += released + gross_pnl - fee;
        position.margin -= released;
        position.size -= quantity;
        position.realized_profit += gross_pnl;
        position.fees += fee;

        let closed = if position.size <= position.peak_size * CLOSE_EPSILON {
            let mut finished = self.positions.remove(index);
            // Dust left by float error goes back with the last fill
            self.available_balance += finished.margin;
            finished.margin = 0.0;
            finished.size = 0.0;
            finished.unrealized_profit = 0.0;
            Some(finished)
        } else {
            position.mark(price);
            None
        };

        self.refresh_totals();
        Ok(Settlement {
            quantity,
            price,
            gross_pnl,
            fee,
            closed,
        })
    }

    /// Revalues the open positions on `pair` at `price`
    pub fn mark_to_market(&mut self, pair: &str, price: f64) {
        for position in self.positions.iter_mut().filter(|p| p.pair == pair) {
            position.mark(price);
        }
        self.refresh_totals();
    }

    fn refresh_totals(&mut self) {
        self.total_unrealized_profit = self.positions.iter().map(|p| p.unrealized_profit).sum();
        self.total_wallet_balance = self.available_balance + self.total_margin() + self.total_unrealized_profit;
    }

    /// Distance from the balance identity; zero up to float error
    pub fn balance_drift(&self) -> f64 {
        let margin: f64 = self.positions.iter().map(|p| p.margin).sum();
        let unrealized: f64 = self.positions.iter().map(|p| p.unrealized_profit).sum();
        (self.total_wallet_balance - (self.available_balance + margin + unrealized)).abs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn now() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(0, 0).unwrap()
    }

    #[test]
    fn test_open_locks_margin_and_fee() {
        let mut wallet = Wallet::new(1000.0);
        let fee = wallet
            .open("BTCUSDT", PositionSide::Long, 2.0, 100.0, 20, 0.001, now())
            .unwrap();
        assert_relative_eq!(fee, 0.2);
        assert_relative_eq!(wallet.available_balance, 1000.0 - 10.0 - 0.2);
        assert_relative_eq!(wallet.total_wallet_balance, 999.8);
    }

    #[test]
    fn test_partial_then_full_close() {
        let mut wallet = Wallet::new(1000.0);
        wallet.open("BTCUSDT", PositionSide::Short, 2.0, 100.0, 10, 0.0, now()).unwrap();

        let first = wallet.close("BTCUSDT", PositionSide::Short, 1.0, 90.0, 0.0).unwrap();
        assert_relative_eq!(first.gross_pnl, 10.0);
        assert!(first.closed.is_none());
        assert_relative_eq!(wallet.position("BTCUSDT", PositionSide::Short).unwrap().margin, 10.0);

        let second = wallet.close("BTCUSDT", PositionSide::Short, 5.0, 95.0, 0.0).unwrap();
        assert_relative_eq!(second.quantity, 1.0);
        let closed = second.closed.unwrap();
        assert_relative_eq!(closed.realized_profit, 15.0);
        assert!(!wallet.has_any_position("BTCUSDT"));
        assert_relative_eq!(wallet.total_wallet_balance, 1015.0);
        assert_relative_eq!(wallet.available_balance, 1015.0);
    }

    #[test]
    fn test_pyramiding_averages_entry() {
        let mut wallet = Wallet::new(1000.0);
        wallet.open("BTCUSDT", PositionSide::Long, 1.0, 100.0, 10, 0.0, now()).unwrap();
        wallet.open("BTCUSDT", PositionSide::Long, 1.0, 110.0, 10, 0.0, now()).unwrap();
        let position = wallet.position("BTCUSDT", PositionSide::Long).unwrap();
        assert_relative_eq!(position.entry_price, 105.0);
        assert_relative_eq!(position.size, 2.0);
        assert_relative_eq!(wallet.total_unrealized_profit, 10.0);
    }

    #[test]
    fn test_insufficient_margin() {
        let mut wallet = Wallet::new(10.0);
        let result = wallet.open("BTCUSDT", PositionSide::Long, 10.0, 100.0, 10, 0.0, now());
        assert!(matches!(result, Err(EvotraderError::InvalidOrder(_))));
        assert_eq!(wallet, Wallet::new(10.0));
    }

    #[test]
    fn test_close_without_position() {
        let mut wallet = Wallet::new(10.0);
        assert!(wallet.close("BTCUSDT", PositionSide::Long, 1.0, 100.0, 0.0).is_err());
    }
}
