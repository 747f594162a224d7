//! Constant-product pool pricing
//!
//! Pure functions only. Every result has to equal what the pool contract
//! computes with `i128` integer division, so intermediate products are carried
//! in [`BigInt`] and truncated exactly once at the end. Floating point never
//! enters a price calculation.

use num_bigint::BigInt;
use num_traits::{ToPrimitive, Zero};
use serde::{Deserialize, Serialize};

/// Basis point denominator used by the pool contract
pub const BPS_DENOMINATOR: i128 = 10_000;

/// Direction of a swap against the configured pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapDirection {
    AToB,
    BToA,
}

impl SwapDirection {
    /// Pool contract entry point for this direction
    pub fn contract_function(&self) -> &'static str {
        match self {
            SwapDirection::AToB => "swap_a_for_b",
            SwapDirection::BToA => "swap_b_for_a",
        }
    }

    /// Order `(reserve_a, reserve_b)` as `(reserve_in, reserve_out)`
    pub fn orient(&self, reserve_a: i128, reserve_b: i128) -> (i128, i128) {
        match self {
            SwapDirection::AToB => (reserve_a, reserve_b),
            SwapDirection::BToA => (reserve_b, reserve_a),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SwapDirection::AToB => "a_to_b",
            SwapDirection::BToA => "b_to_a",
        }
    }
}

impl std::str::FromStr for SwapDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "a_to_b" | "AToB" | "a2b" => Ok(SwapDirection::AToB),
            "b_to_a" | "BToA" | "b2a" => Ok(SwapDirection::BToA),
            other => Err(format!("unknown swap direction: {}", other)),
        }
    }
}

/// Preview of a swap, as shown before submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapQuote {
    pub direction: SwapDirection,
    pub amount_in: i128,
    pub amount_out: i128,
    pub min_amount_out: i128,
    pub fee_bps: u32,
    pub price_impact_bps: i128,
}

fn to_i128_saturating(value: BigInt) -> i128 {
    value.to_i128().unwrap_or_else(|| {
        if value < BigInt::zero() {
            i128::MIN
        } else {
            i128::MAX
        }
    })
}

/// Output amount for `amount_in` against the given reserves.
///
/// Returns 0 for an empty or uninitialized pool and for non-positive input,
/// which callers treat as "no quote available".
pub fn get_amount_out(amount_in: i128, reserve_in: i128, reserve_out: i128, fee_bps: u32) -> i128 {
    if reserve_in <= 0 || reserve_out <= 0 || amount_in <= 0 {
        return 0;
    }

    let fee_factor = BigInt::from(BPS_DENOMINATOR - i128::from(fee_bps.min(10_000)));
    let amount_in_with_fee = BigInt::from(amount_in) * fee_factor;
    let numerator = &amount_in_with_fee * BigInt::from(reserve_out);
    let denominator = BigInt::from(reserve_in) * BigInt::from(BPS_DENOMINATOR) + amount_in_with_fee;

    if denominator.is_zero() {
        return 0;
    }
    // Both operands are non-negative, so truncation is floor
    to_i128_saturating(numerator / denominator)
}

/// Slippage is read to nine decimal places of a percent
pub const SLIPPAGE_SCALE: i128 = 1_000_000_000;

/// Convert a percentage into units of `1 / SLIPPAGE_SCALE` percent, clamped
/// to `[0, 100]` percent
pub fn slippage_parts(slippage_percent: f64) -> i128 {
    if !slippage_percent.is_finite() || slippage_percent <= 0.0 {
        return 0;
    }
    (slippage_percent.min(100.0) * SLIPPAGE_SCALE as f64).round() as i128
}

/// Minimum acceptable output submitted on-chain as the slippage guard:
/// `floor(quoted * (1 - slippage / 100))` in exact integer arithmetic
pub fn calc_min_amount_out(quoted_amount_out: i128, slippage_percent: f64) -> i128 {
    if quoted_amount_out <= 0 {
        return 0;
    }
    let denominator = 100 * SLIPPAGE_SCALE;
    let keep = BigInt::from(denominator - slippage_parts(slippage_percent));
    let scaled = BigInt::from(quoted_amount_out) * keep / BigInt::from(denominator);
    to_i128_saturating(scaled)
}

/// Integer square root (floor), as used by the pool for initial LP shares
pub fn integer_sqrt(value: &BigInt) -> BigInt {
    if value <= &BigInt::zero() {
        return BigInt::zero();
    }
    value.sqrt()
}

/// LP shares minted for depositing `amount_a`/`amount_b`
pub fn estimate_lp_shares(
    amount_a: i128,
    amount_b: i128,
    reserve_a: i128,
    reserve_b: i128,
    total_shares: i128,
) -> i128 {
    if amount_a <= 0 || amount_b <= 0 {
        return 0;
    }

    if total_shares <= 0 {
        let product = BigInt::from(amount_a) * BigInt::from(amount_b);
        return to_i128_saturating(integer_sqrt(&product));
    }

    if reserve_a <= 0 || reserve_b <= 0 {
        return 0;
    }

    let total = BigInt::from(total_shares);
    let shares_a = BigInt::from(amount_a) * &total / BigInt::from(reserve_a);
    let shares_b = BigInt::from(amount_b) * &total / BigInt::from(reserve_b);
    to_i128_saturating(shares_a.min(shares_b))
}

/// Token amounts returned for burning `shares`
pub fn estimate_withdrawal(
    shares: i128,
    reserve_a: i128,
    reserve_b: i128,
    total_shares: i128,
) -> (i128, i128) {
    if shares <= 0 || total_shares <= 0 {
        return (0, 0);
    }
    let shares = BigInt::from(shares);
    let total = BigInt::from(total_shares);
    let amount_a = &shares * BigInt::from(reserve_a.max(0)) / &total;
    let amount_b = &shares * BigInt::from(reserve_b.max(0)) / &total;
    (to_i128_saturating(amount_a), to_i128_saturating(amount_b))
}

/// How much worse the realized price is than the spot price, in basis points
pub fn price_impact_bps(amount_in: i128, reserve_in: i128, reserve_out: i128, fee_bps: u32) -> i128 {
    let amount_out = get_amount_out(amount_in, reserve_in, reserve_out, fee_bps);
    if amount_out <= 0 {
        return 0;
    }

    // spot_out = amount_in * reserve_out / reserve_in
    // impact = (spot_out - amount_out) / spot_out, scaled to bps without
    // dividing twice
    let spot_num = BigInt::from(amount_in) * BigInt::from(reserve_out);
    let realized_num = BigInt::from(amount_out) * BigInt::from(reserve_in);
    if spot_num.is_zero() {
        return 0;
    }
    let diff = &spot_num - realized_num;
    to_i128_saturating(diff * BigInt::from(BPS_DENOMINATOR) / spot_num)
}

/// Full quote for the UI: output, guard and impact
pub fn quote_swap(
    direction: SwapDirection,
    amount_in: i128,
    reserve_a: i128,
    reserve_b: i128,
    fee_bps: u32,
    slippage_percent: f64,
) -> SwapQuote {
    let (reserve_in, reserve_out) = direction.orient(reserve_a, reserve_b);
    let amount_out = get_amount_out(amount_in, reserve_in, reserve_out, fee_bps);
    SwapQuote {
        direction,
        amount_in,
        amount_out,
        min_amount_out: calc_min_amount_out(amount_out, slippage_percent),
        fee_bps,
        price_impact_bps: price_impact_bps(amount_in, reserve_in, reserve_out, fee_bps),
    }
}
