use super::exits::{replace_exit_orders, stop_loss_price};
use super::fitness::{sanitized_score, FitnessFunction, FitnessInput};
use super::orders::{market_price, Fill, OrderBook, OrderKind};
use super::signal::{MarketState, SignalSource};
use super::sizing::{position_size, SizingContext};
use super::wallet::{Position, Settlement, Wallet};
use crate::config::{ConfigSection, TradeConfig};
use crate::data::CandleSeries;
use crate::engines::metrics::{RiskMetrics, StrategyReport, StrategyStats};
use crate::error::{EvotraderError, Result};
use crate::types::{
    Candle, Decision, ExitReason, OrderSide, OrderType, PositionSide, Trade, TradeAction, TradeHistoryRow,
};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraderState {
    Warmup,
    Running,
    Finished,
}

/// Everything a finished backtest produced
#[derive(Debug, Clone)]
pub struct BacktestOutcome {
    pub stats: StrategyStats,
    pub report: StrategyReport,
    pub fitness: f64,
    pub trades: Vec<Trade>,
    pub history: Vec<TradeHistoryRow>,
    pub equity_curve: Vec<f64>,
    pub wallet: Wallet,
}

impl BacktestOutcome {
    /// Volatility and drawdown of the per-candle equity curve
    pub fn risk(&self) -> RiskMetrics {
        RiskMetrics::calculate(&self.equity_curve)
    }
}

/// Simulates one strategy over a candle series
pub struct Trader {
    config: Arc<TradeConfig>,
    signal: Box<dyn SignalSource>,
    fitness: Arc<dyn FitnessFunction>,
    pair: String,
    state: TraderState,
    wallet: Wallet,
    book: OrderBook,
    stats: StrategyStats,
    trades: Vec<Trade>,
    history: Vec<TradeHistoryRow>,
    equity_curve: Vec<f64>,
    last_candle: Option<Candle>,
}

impl Trader {
    /// Fails with a configuration error before any candle is seen
    pub fn new(
        config: Arc<TradeConfig>,
        signal: Box<dyn SignalSource>,
        fitness: Arc<dyn FitnessFunction>,
    ) -> Result<Self> {
        config.validate()?;
        let pair = config.pair();
        let wallet = Wallet::new(config.initial_capital);
        let mut stats = StrategyStats::new();
        stats.peak_equity = config.initial_capital;
        Ok(Self {
            config,
            signal,
            fitness,
            pair,
            state: TraderState::Warmup,
            wallet,
            book: OrderBook::new(),
            stats,
            trades: Vec::new(),
            history: Vec::new(),
            equity_curve: Vec::new(),
            last_candle: None,
        })
    }

    pub fn state(&self) -> TraderState {
        self.state
    }

    pub fn wallet(&self) -> &Wallet {
        &self.wallet
    }

    pub fn orders(&self) -> &OrderBook {
        &self.book
    }

    pub fn stats(&self) -> &StrategyStats {
        &self.stats
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    /// Runs the whole series and closes whatever is still open at the end
    pub fn run(mut self, candles: &CandleSeries) -> Result<BacktestOutcome> {
        if candles.is_empty() {
            return Err(EvotraderError::DataIntegrity("Cannot backtest an empty series".to_string()));
        }

        let lookback = self.signal.lookback().max(1);
        for index in 0..candles.len() {
            self.on_candle(candles.window(index, lookback))?;
        }

        let period = match (candles.first(), candles.last()) {
            (Some(first), Some(last)) => Some(format!(
                "{} - {}",
                first.open_time.format("%Y-%m-%d"),
                last.open_time.format("%Y-%m-%d")
            )),
            _ => None,
        };
        self.finish(period)
    }

    /// Processes the last candle of `history`
    pub fn on_candle(&mut self, history: &[Candle]) -> Result<()> {
        let candle = match history.last() {
            Some(candle) => *candle,
            None => return Ok(()),
        };
        if self.state == TraderState::Finished {
            return Err(EvotraderError::InvalidOrder("Trader already finished".to_string()));
        }
        self.last_candle = Some(candle);

        if history.len() < self.signal.lookback().max(1) {
            return Ok(());
        }
        if self.state == TraderState::Warmup {
            log::trace!("{} warmed up at {}", self.pair, candle.open_time);
            self.state = TraderState::Running;
        }

        self.wallet.mark_to_market(&self.pair, candle.close);
        self.settle_orders(&candle);
        self.act_on_signal(history, &candle)?;

        self.wallet.mark_to_market(&self.pair, candle.close);
        let equity = self.wallet.total_wallet_balance;
        self.stats.record_equity(equity);
        self.equity_curve.push(equity);
        Ok(())
    }

    fn settle_orders(&mut self, candle: &Candle) {
        let wallet = &self.wallet;
        self.book.retain_open(|pair, side| wallet.has_position(pair, side));

        for fill in self.book.trigger(candle, self.config.slippage) {
            // An earlier fill on this candle may already have closed the position
            if !self.wallet.has_position(&fill.order.pair, fill.order.position_side) {
                continue;
            }
            if let Err(e) = self.apply_fill(&fill, candle) {
                log::warn!("Order #{} rejected: {}", fill.order.id, e);
            }
        }
    }

    fn apply_fill(&mut self, fill: &Fill, candle: &Candle) -> Result<()> {
        let order = &fill.order;
        let settlement = self.wallet.close(
            &order.pair,
            order.position_side,
            order.quantity,
            fill.price,
            self.config.fee_rate,
        )?;
        log::debug!(
            "{:?} {:?} filled {} @ {:.4} (pnl {:.4})",
            order.kind.order_type(),
            order.side,
            settlement.quantity,
            fill.price,
            settlement.net_pnl()
        );
        self.record_close(order.side, order.kind.order_type(), &settlement, candle);

        if let Some(closed) = settlement.closed {
            let cancelled = self.book.cancel_for(&order.pair, order.position_side);
            log::trace!("Cancelled {} sibling orders", cancelled);
            self.record_trade(closed, fill.price, order.kind.exit_reason(), candle);
        }
        Ok(())
    }

    fn act_on_signal(&mut self, history: &[Candle], candle: &Candle) -> Result<()> {
        let long = self.wallet.position(&self.pair, PositionSide::Long);
        let short = self.wallet.position(&self.pair, PositionSide::Short);
        if (long.is_some() || short.is_some()) && !self.config.allow_pyramiding {
            return Ok(());
        }

        let state = MarketState {
            position: match (long, short) {
                (Some(_), None) => Some(PositionSide::Long),
                (None, Some(_)) => Some(PositionSide::Short),
                _ => None,
            },
            unrealized_profit: self.wallet.total_unrealized_profit,
            available_balance: self.wallet.available_balance,
        };

        let side = match self.signal.signal(history, &state)? {
            Decision::Buy => PositionSide::Long,
            Decision::Sell => PositionSide::Short,
            Decision::Hold => return Ok(()),
        };

        let opposite = match side {
            PositionSide::Long => PositionSide::Short,
            PositionSide::Short => PositionSide::Long,
        };
        if self.config.unidirectional && self.wallet.has_position(&self.pair, opposite) {
            log::trace!("Ignoring {:?} signal while {:?} is open", side, opposite);
            return Ok(());
        }

        if let Err(e) = self.open_position(side, candle) {
            match e {
                EvotraderError::InvalidOrder(reason) => log::warn!("Entry rejected: {}", reason),
                other => return Err(other),
            }
        }
        Ok(())
    }

    /// Opens or adds to a position at market and (re)places its exit orders
    pub fn open_position(&mut self, side: PositionSide, candle: &Candle) -> Result<()> {
        let config = Arc::clone(&self.config);
        let entry_price = market_price(candle.close, side.entry_side(), config.slippage);
        let size = position_size(
            &config.sizing,
            &SizingContext {
                wallet_balance: self.wallet.total_wallet_balance,
                available_balance: self.wallet.available_balance,
                entry_price,
                stop_loss_price: stop_loss_price(&config.exit, entry_price, side),
                leverage: config.leverage,
                fee_rate: config.fee_rate,
                lot_step: config.lot_step,
            },
        )?;

        let fee = self.wallet.open(
            &self.pair,
            side,
            size,
            entry_price,
            config.leverage,
            config.fee_rate,
            candle.open_time,
        )?;
        log::debug!("Opened {:?} {} {} @ {:.4}", side, size, self.pair, entry_price);
        self.history.push(TradeHistoryRow {
            date: candle.open_time,
            symbol: self.pair.clone(),
            side: side.entry_side(),
            order_type: OrderType::Market,
            action: TradeAction::Open,
            size,
            price: entry_price,
            pnl: -fee,
            balance: self.wallet.total_wallet_balance,
        });

        // Pyramiding re-bases the exit ladder on the averaged entry
        let (entry, total) = match self.wallet.position(&self.pair, side) {
            Some(position) => (position.entry_price, position.size),
            None => return Ok(()),
        };
        if let Err(e) = replace_exit_orders(&mut self.book, &config.exit, &self.pair, side, entry, total) {
            log::warn!("Exit orders for {:?} {} not placed: {}", side, self.pair, e);
        }
        Ok(())
    }

    /// Closes every open position at market and produces the final figures
    pub fn finish(mut self, test_period: Option<String>) -> Result<BacktestOutcome> {
        self.book = OrderBook::new();
        if let Some(candle) = self.last_candle {
            let open: Vec<(PositionSide, f64)> = self
                .wallet
                .positions
                .iter()
                .filter(|p| p.pair == self.pair)
                .map(|p| (p.side, p.size))
                .collect();
            for (side, size) in open {
                self.book.place(&self.pair, side, size, OrderKind::Market)?;
            }
            for fill in self.book.trigger(&candle, self.config.slippage) {
                let order = &fill.order;
                let settlement = self.wallet.close(
                    &order.pair,
                    order.position_side,
                    order.quantity,
                    fill.price,
                    self.config.fee_rate,
                )?;
                self.record_close(order.side, OrderType::Market, &settlement, &candle);
                if let Some(closed) = settlement.closed {
                    self.record_trade(closed, fill.price, ExitReason::EndOfData, &candle);
                }
            }
        }
        self.book = OrderBook::new();
        self.state = TraderState::Finished;

        let final_capital = self.wallet.total_wallet_balance;
        let report = StrategyReport::from_stats(&self.stats, self.config.initial_capital, final_capital, test_period);
        let fitness = sanitized_score(self.fitness.as_ref(), &FitnessInput::from_report(&report, &self.stats));

        Ok(BacktestOutcome {
            stats: self.stats,
            report,
            fitness,
            trades: self.trades,
            history: self.history,
            equity_curve: self.equity_curve,
            wallet: self.wallet,
        })
    }

    fn record_close(&mut self, side: OrderSide, order_type: OrderType, settlement: &Settlement, candle: &Candle) {
        self.history.push(TradeHistoryRow {
            date: candle.open_time,
            symbol: self.pair.clone(),
            side,
            order_type,
            action: TradeAction::Close,
            size: settlement.quantity,
            price: settlement.price,
            pnl: settlement.net_pnl(),
            balance: self.wallet.total_wallet_balance,
        });
    }

    fn record_trade(&mut self, closed: Position, exit_price: f64, reason: ExitReason, candle: &Candle) {
        let pnl = closed.realized_profit - closed.fees;
        self.stats.record_trade(closed.side, pnl, closed.fees);
        self.trades.push(Trade {
            pair: closed.pair,
            side: closed.side,
            entry_time: closed.opened_at,
            exit_time: candle.open_time,
            entry_price: closed.entry_price,
            exit_price,
            size: closed.peak_size,
            pnl,
            fees: closed.fees,
            exit_reason: reason,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExitStrategyConfig, ProfitTarget, SizingPolicy};
    use crate::engines::evaluation::fitness::CompositeFitness;
    use crate::engines::evaluation::signal::RuleSignal;
    use chrono::{DateTime, Utc};

    fn series(bars: &[(f64, f64, f64, f64)]) -> CandleSeries {
        let candles = bars
            .iter()
            .enumerate()
            .map(|(i, &(open, high, low, close))| Candle {
                open_time: DateTime::<Utc>::from_timestamp(i as i64 * 300, 0).unwrap(),
                open,
                high,
                low,
                close,
                volume: 1.0,
            })
            .collect();
        CandleSeries::new(candles).unwrap()
    }

    fn config() -> TradeConfig {
        TradeConfig {
            leverage: 10,
            fee_rate: 0.0,
            lot_step: 0.001,
            sizing: SizingPolicy::FixedPercentage { allocation: 0.1 },
            exit: ExitStrategyConfig {
                stop_loss: Some(0.05),
                take_profits: vec![ProfitTarget { delta_percentage: 0.1, quantity_percentage: 1.0 }],
                trailing_stop: None,
            },
            ..TradeConfig::default()
        }
    }

    fn always_buy() -> Box<dyn SignalSource> {
        Box::new(RuleSignal::new(1, |_: &[Candle]| true, |_: &[Candle]| false))
    }

    #[test]
    fn test_take_profit_closes_position() {
        let candles = series(&[
            (100.0, 100.5, 99.5, 100.0),
            (100.0, 105.0, 99.0, 104.0),
            (104.0, 111.0, 103.0, 110.0),
        ]);
        let trader = Trader::new(Arc::new(config()), always_buy(), Arc::new(CompositeFitness::default())).unwrap();
        let outcome = trader.run(&candles).unwrap();

        // Re-entered at 110 on the last bar and closed flat at the end
        assert_eq!(outcome.trades.len(), 2);
        let first = &outcome.trades[0];
        assert_eq!(first.exit_reason, ExitReason::TakeProfit);
        assert!((first.exit_price - 110.0).abs() < 1e-9);
        assert!((first.pnl - 10.0).abs() < 1e-9);
        assert_eq!(outcome.trades[1].exit_reason, ExitReason::EndOfData);
        assert_eq!(outcome.stats.total_bars, 3);
        assert_eq!(outcome.equity_curve.len(), 3);
        assert!(outcome.wallet.positions.is_empty());
    }

    #[test]
    fn test_stop_loss_before_take_profit_on_wide_candle() {
        let candles = series(&[(100.0, 100.5, 99.5, 100.0), (100.0, 112.0, 90.0, 100.0)]);
        let mut trader = Trader::new(Arc::new(config()), always_buy(), Arc::new(CompositeFitness::default())).unwrap();
        trader.on_candle(&candles[..1]).unwrap();
        assert_eq!(trader.orders().len(), 2);

        trader.on_candle(&candles[1..2]).unwrap();
        assert_eq!(trader.trades()[0].exit_reason, ExitReason::StopLoss);
        assert!(trader.trades()[0].pnl < 0.0);
    }

    #[test]
    fn test_warmup_skips_trading() {
        let candles = series(&[
            (100.0, 100.5, 99.5, 100.0),
            (100.0, 100.5, 99.5, 100.0),
            (100.0, 100.5, 99.5, 100.0),
        ]);
        let signal = Box::new(RuleSignal::new(3, |_: &[Candle]| true, |_: &[Candle]| false));
        let mut trader = Trader::new(Arc::new(config()), signal, Arc::new(CompositeFitness::default())).unwrap();
        trader.on_candle(&candles[..1]).unwrap();
        trader.on_candle(&candles[..2]).unwrap();
        assert_eq!(trader.state(), TraderState::Warmup);
        assert!(!trader.wallet().has_any_position("BTCUSDT"));

        trader.on_candle(&candles[..3]).unwrap();
        assert_eq!(trader.state(), TraderState::Running);
        assert!(trader.wallet().has_position("BTCUSDT", PositionSide::Long));
    }

    #[test]
    fn test_unidirectional_ignores_opposite_signal() {
        let mut config = config();
        config.allow_pyramiding = true;
        let flip = Box::new(RuleSignal::new(
            1,
            |h: &[Candle]| h[0].close <= 100.0,
            |h: &[Candle]| h[0].close > 100.0,
        ));
        let candles = series(&[(100.0, 100.5, 99.5, 100.0), (100.0, 102.0, 99.5, 101.0)]);
        let mut trader = Trader::new(Arc::new(config), flip, Arc::new(CompositeFitness::default())).unwrap();
        trader.on_candle(&candles[..1]).unwrap();
        trader.on_candle(&candles[1..2]).unwrap();
        assert!(trader.wallet().has_position("BTCUSDT", PositionSide::Long));
        assert!(!trader.wallet().has_position("BTCUSDT", PositionSide::Short));
    }

    #[test]
    fn test_contradictory_config_is_fatal() {
        let config = TradeConfig {
            leverage: 0,
            sizing: SizingPolicy::RiskBased { risk: -0.5 },
            ..config()
        };
        let trader = Trader::new(Arc::new(config), always_buy(), Arc::new(CompositeFitness::default()));
        assert!(matches!(trader, Err(EvotraderError::Configuration(_))));
    }

    #[test]
    fn test_end_of_data_exit_pays_slippage() {
        let config = TradeConfig {
            slippage: 0.01,
            ..config()
        };
        let candles = series(&[(100.0, 100.5, 99.5, 100.0), (100.0, 104.0, 99.0, 103.0)]);
        let signal = Box::new(RuleSignal::new(1, |h: &[Candle]| h[0].close == 100.0, |_: &[Candle]| false));
        let trader = Trader::new(Arc::new(config), signal, Arc::new(CompositeFitness::default())).unwrap();
        let outcome = trader.run(&candles).unwrap();

        let trade = &outcome.trades[0];
        assert_eq!(trade.exit_reason, ExitReason::EndOfData);
        assert!((trade.entry_price - 101.0).abs() < 1e-9);
        assert!((trade.exit_price - 103.0 * 0.99).abs() < 1e-9);
        assert_eq!(outcome.history.last().map(|row| row.order_type), Some(OrderType::Market));
    }
}
