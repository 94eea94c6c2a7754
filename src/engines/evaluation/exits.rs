use super::orders::{OrderBook, OrderId, OrderKind, TrailingStop};
use crate::config::ExitStrategyConfig;
use crate::error::Result;
use crate::types::PositionSide;

/// Stop loss price for a position entered at `entry_price`
pub fn stop_loss_price(config: &ExitStrategyConfig, entry_price: f64, side: PositionSide) -> Option<f64> {
    config
        .stop_loss
        .map(|fraction| entry_price * (1.0 - side.direction() * fraction))
}

/// Take profit ladder as (price, share of the position), skipping targets a
/// short can never reach.
pub fn take_profit_levels(config: &ExitStrategyConfig, entry_price: f64, side: PositionSide) -> Vec<(f64, f64)> {
    config
        .take_profits
        .iter()
        .filter_map(|target| {
            let price = entry_price * (1.0 + side.direction() * target.delta_percentage);
            if price > 0.0 {
                Some((price, target.quantity_percentage))
            } else {
                log::debug!(
                    "Skipping take profit at {:.1}% for a {:?} entered at {}",
                    target.delta_percentage * 100.0,
                    side,
                    entry_price
                );
                None
            }
        })
        .collect()
}

/// Stop loss, take profit ladder and trailing stop for a position, each
/// checked on a scratch book.
///
/// An order that cannot be built for this side is left out with a warning;
/// the others are still returned. A trailing stop keyed to the take profits
/// follows the furthest target this side can reach.
pub fn plan_exit_orders(
    config: &ExitStrategyConfig,
    pair: &str,
    side: PositionSide,
    entry_price: f64,
    size: f64,
) -> Vec<(OrderKind, f64)> {
    let mut kinds = Vec::new();

    if let Some(trigger) = stop_loss_price(config, entry_price, side) {
        kinds.push((OrderKind::Stop { trigger }, size));
    }

    let levels = take_profit_levels(config, entry_price, side);
    for &(price, share) in &levels {
        kinds.push((OrderKind::Limit { price }, size * share));
    }

    if let Some(trailing) = &config.trailing_stop {
        let furthest = levels.last().map(|&(price, _)| price);
        let stop = trailing
            .activation_rule()
            .and_then(|rule| TrailingStop::new(trailing.callback_rate, rule, entry_price, furthest, side));
        match stop {
            Ok(stop) => kinds.push((OrderKind::TrailingStopMarket(stop), size)),
            Err(e) => log::warn!("No trailing stop for {:?} {} @ {}: {}", side, pair, entry_price, e),
        }
    }

    let mut scratch = OrderBook::new();
    kinds
        .into_iter()
        .filter(|&(kind, quantity)| match scratch.place(pair, side, quantity, kind) {
            Ok(_) => true,
            Err(e) => {
                log::warn!("Leaving out {:?} exit for {:?} {}: {}", kind.order_type(), side, pair, e);
                false
            }
        })
        .collect()
}

/// Swaps the exit orders of a position for a freshly planned set.
///
/// The new set is built before the old orders are cancelled.
pub fn replace_exit_orders(
    book: &mut OrderBook,
    config: &ExitStrategyConfig,
    pair: &str,
    side: PositionSide,
    entry_price: f64,
    size: f64,
) -> Result<Vec<OrderId>> {
    let planned = plan_exit_orders(config, pair, side, entry_price, size);
    let cancelled = book.cancel_for(pair, side);
    log::trace!("Replacing {} exit orders of {:?} {} with {}", cancelled, side, pair, planned.len());

    planned
        .into_iter()
        .map(|(kind, quantity)| book.place(pair, side, quantity, kind))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProfitTarget, TrailingStopConfig};
    use crate::types::OrderType;

    fn ladder() -> ExitStrategyConfig {
        ExitStrategyConfig {
            stop_loss: Some(0.05),
            take_profits: vec![
                ProfitTarget { delta_percentage: 0.1, quantity_percentage: 0.5 },
                ProfitTarget { delta_percentage: 0.2, quantity_percentage: 0.5 },
            ],
            trailing_stop: Some(TrailingStopConfig {
                callback_rate: 0.02,
                change_percentage: None,
                percentage_to_tp: Some(0.5),
            }),
        }
    }

    #[test]
    fn test_long_exit_prices() {
        let mut book = OrderBook::new();
        replace_exit_orders(&mut book, &ladder(), "BTCUSDT", PositionSide::Long, 100.0, 2.0).unwrap();
        assert_eq!(book.len(), 4);

        let orders = book.orders();
        match orders[0].kind {
            OrderKind::Stop { trigger } => assert!((trigger - 95.0).abs() < 1e-9),
            _ => panic!("expected a stop loss"),
        }
        assert_eq!(orders[1].kind.order_type(), OrderType::Limit);
        assert!((orders[1].quantity - 1.0).abs() < 1e-12);
        match orders[3].kind {
            // Halfway to the 120 target
            OrderKind::TrailingStopMarket(t) => assert!((t.activation_price - 110.0).abs() < 1e-9),
            _ => panic!("expected a trailing stop"),
        }
    }

    #[test]
    fn test_short_skips_unreachable_targets() {
        let config = ExitStrategyConfig {
            stop_loss: None,
            take_profits: vec![
                ProfitTarget { delta_percentage: 0.5, quantity_percentage: 0.5 },
                ProfitTarget { delta_percentage: 1.0, quantity_percentage: 0.5 },
            ],
            trailing_stop: None,
        };
        let levels = take_profit_levels(&config, 100.0, PositionSide::Short);
        assert_eq!(levels, vec![(50.0, 0.5)]);
        let stop = stop_loss_price(&ladder(), 100.0, PositionSide::Short).unwrap();
        assert!((stop - 105.0).abs() < 1e-9);
    }

    #[test]
    fn test_unbuildable_trailing_keeps_stop_loss() {
        // +100% is unreachable for a short, so the trailing stop has no target
        let mut config = ladder();
        config.take_profits = vec![ProfitTarget { delta_percentage: 1.0, quantity_percentage: 1.0 }];

        let planned = plan_exit_orders(&config, "BTCUSDT", PositionSide::Short, 100.0, 1.0);
        assert_eq!(planned.len(), 1);
        match planned[0].0 {
            OrderKind::Stop { trigger } => assert!((trigger - 105.0).abs() < 1e-9),
            _ => panic!("expected a stop loss"),
        }

        let long = plan_exit_orders(&config, "BTCUSDT", PositionSide::Long, 100.0, 1.0);
        assert_eq!(long.len(), 3);
    }

    #[test]
    fn test_replace_swaps_only_that_position() {
        let mut book = OrderBook::new();
        replace_exit_orders(&mut book, &ladder(), "BTCUSDT", PositionSide::Long, 100.0, 1.0).unwrap();
        book.place("BTCUSDT", PositionSide::Short, 1.0, OrderKind::Stop { trigger: 120.0 }).unwrap();

        let mut config = ladder();
        config.take_profits.clear();
        config.trailing_stop = None;
        let ids = replace_exit_orders(&mut book, &config, "BTCUSDT", PositionSide::Long, 104.0, 3.0).unwrap();

        assert_eq!(ids.len(), 1);
        let long: Vec<_> = book.orders_for("BTCUSDT", PositionSide::Long).collect();
        assert_eq!(long.len(), 1);
        assert!((long[0].quantity - 3.0).abs() < 1e-12);
        assert_eq!(book.orders_for("BTCUSDT", PositionSide::Short).count(), 1);
    }
}
