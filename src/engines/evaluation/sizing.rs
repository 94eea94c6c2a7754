use crate::config::SizingPolicy;
use crate::error::{EvotraderError, Result};

/// Inputs of a sizing decision, taken from the wallet and the pending entry
#[derive(Debug, Clone, Copy)]
pub struct SizingContext {
    pub wallet_balance: f64,
    pub available_balance: f64,
    pub entry_price: f64,
    pub stop_loss_price: Option<f64>,
    pub leverage: u32,
    pub fee_rate: f64,
    pub lot_step: f64,
}

/// Quantity to open, rounded down to the lot step and capped by available margin
pub fn position_size(policy: &SizingPolicy, ctx: &SizingContext) -> Result<f64> {
    if !(ctx.entry_price.is_finite() && ctx.entry_price > 0.0) {
        return Err(EvotraderError::InvalidOrder(format!("Entry price {} is not valid", ctx.entry_price)));
    }

    let raw = match policy {
        SizingPolicy::FixedPercentage { allocation } => ctx.wallet_balance * allocation / ctx.entry_price,
        SizingPolicy::RiskBased { risk } => {
            let stop = ctx.stop_loss_price.ok_or_else(|| {
                EvotraderError::InvalidOrder("Risk based sizing needs a stop loss".to_string())
            })?;
            let distance = (ctx.entry_price - stop).abs();
            if distance == 0.0 {
                return Err(EvotraderError::InvalidOrder(
                    "Stop loss sits on the entry price".to_string(),
                ));
            }
            ctx.wallet_balance * risk / distance
        }
    };

    // margin + fee must fit in the available balance
    let per_unit_cost = ctx.entry_price * (1.0 / ctx.leverage.max(1) as f64 + ctx.fee_rate);
    let affordable = ctx.available_balance / per_unit_cost;
    let size = round_down(raw.min(affordable), ctx.lot_step);

    if !(size.is_finite() && size > 0.0) {
        return Err(EvotraderError::InvalidOrder(format!(
            "Computed size {} is below the lot step {}",
            size, ctx.lot_step
        )));
    }
    Ok(size)
}

/// Rounds down to a multiple of `step`, tolerating float representation error
pub fn round_down(value: f64, step: f64) -> f64 {
    if step <= 0.0 {
        return value;
    }
    (value / step + 1e-9).floor() * step
}
