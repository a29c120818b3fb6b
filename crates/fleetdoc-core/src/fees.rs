// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Return-settlement arithmetic: kilometre overage, fuel shortfall, deposit
// refund. Pure functions over explicit inputs.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::FeeConfig;

/// Everything the settlement depends on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnFeeInputs {
    pub odometer_start: u32,
    pub odometer_end: u32,
    /// `None` means unlimited kilometres.
    pub allowed_kilometers: Option<u32>,
    pub extra_kilometer_rate: Decimal,
    /// Fuel level at handover, percent.
    pub fuel_level_start: u8,
    /// Fuel level at return, percent.
    pub fuel_level_end: u8,
    pub deposit: Decimal,
    pub additional_charges: Decimal,
    pub refund_override: Option<Decimal>,
}

/// Derived settlement figures. Never stored on a protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnFees {
    pub kilometers_used: u32,
    /// The end odometer read lower than the start one.
    pub odometer_anomaly: bool,
    pub kilometer_overage: u32,
    pub kilometer_fee: Decimal,
    pub fuel_used: u8,
    pub fuel_fee: Decimal,
    pub additional_charges: Decimal,
    pub total_extra_fees: Decimal,
    pub deposit: Decimal,
    /// Refund the arithmetic yields, kept even when overridden.
    pub computed_refund: Decimal,
    pub refund_override: Option<Decimal>,
    /// Refund actually paid out.
    pub final_refund: Decimal,
    /// What the customer owes once the deposit is exhausted.
    pub amount_due: Decimal,
}

fn money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Compute the return settlement.
///
/// Calling it twice with the same inputs yields the same figures.
pub fn compute_return_fees(inputs: &ReturnFeeInputs, config: &FeeConfig) -> ReturnFees {
    let odometer_anomaly = inputs.odometer_end < inputs.odometer_start;
    let kilometers_used = inputs.odometer_end.saturating_sub(inputs.odometer_start);

    let kilometer_overage = match inputs.allowed_kilometers {
        Some(allowed) => kilometers_used.saturating_sub(allowed),
        None => 0,
    };
    let kilometer_fee = money(Decimal::from(kilometer_overage) * inputs.extra_kilometer_rate);

    let start = inputs.fuel_level_start.min(100);
    let end = inputs.fuel_level_end.min(100);
    let fuel_used = start.saturating_sub(end);
    let fuel_fee = money(Decimal::from(fuel_used) * config.fuel_refill_cost_per_percent);

    let additional_charges = money(inputs.additional_charges.max(Decimal::ZERO));
    let total_extra_fees = kilometer_fee + fuel_fee + additional_charges;
    let deposit = money(inputs.deposit);

    let computed_refund = (deposit - total_extra_fees).max(Decimal::ZERO);
    let amount_due = (total_extra_fees - deposit).max(Decimal::ZERO);
    let refund_override = inputs.refund_override.map(money);
    let final_refund = refund_override.unwrap_or(computed_refund);

    if odometer_anomaly {
        debug!(
            start = inputs.odometer_start,
            end = inputs.odometer_end,
            "Odometer reading decreased, kilometres clamped to zero"
        );
    }

    ReturnFees {
        kilometers_used,
        odometer_anomaly,
        kilometer_overage,
        kilometer_fee,
        fuel_used,
        fuel_fee,
        additional_charges,
        total_extra_fees,
        deposit,
        computed_refund,
        refund_override,
        final_refund,
        amount_due,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn inputs() -> ReturnFeeInputs {
        ReturnFeeInputs {
            odometer_start: 50_000,
            odometer_end: 50_300,
            allowed_kilometers: Some(200),
            extra_kilometer_rate: Decimal::new(20, 2),
            fuel_level_start: 100,
            fuel_level_end: 80,
            deposit: Decimal::new(500, 0),
            additional_charges: Decimal::ZERO,
            refund_override: None,
        }
    }

    #[test]
    fn overage_scenario() {
        let fees = compute_return_fees(&inputs(), &FeeConfig::default());
        assert_eq!(fees.kilometers_used, 300);
        assert_eq!(fees.kilometer_overage, 100);
        assert_eq!(fees.kilometer_fee, Decimal::new(2000, 2));
        assert_eq!(fees.fuel_used, 20);
        assert_eq!(fees.fuel_fee, Decimal::new(40, 2));
        assert_eq!(fees.total_extra_fees, Decimal::new(2040, 2));
        assert_eq!(fees.computed_refund, Decimal::new(47960, 2));
        assert_eq!(fees.final_refund, fees.computed_refund);
        assert_eq!(fees.amount_due, Decimal::ZERO);
    }

    #[test]
    fn within_allowance_is_free() {
        let mut input = inputs();
        input.odometer_end = 50_150;
        input.fuel_level_end = 100;
        let fees = compute_return_fees(&input, &FeeConfig::default());
        assert_eq!(fees.kilometer_overage, 0);
        assert_eq!(fees.total_extra_fees, Decimal::ZERO);
        assert_eq!(fees.computed_refund, Decimal::new(500, 0));
    }

    #[test]
    fn unlimited_allowance_never_charges() {
        let mut input = inputs();
        input.allowed_kilometers = None;
        input.odometer_end = 90_000;
        let fees = compute_return_fees(&input, &FeeConfig::default());
        assert_eq!(fees.kilometer_overage, 0);
        assert_eq!(fees.kilometer_fee, Decimal::ZERO);
    }

    #[test]
    fn fuller_tank_is_not_credited() {
        let mut input = inputs();
        input.fuel_level_start = 40;
        input.fuel_level_end = 90;
        let fees = compute_return_fees(&input, &FeeConfig::default());
        assert_eq!(fees.fuel_used, 0);
        assert_eq!(fees.fuel_fee, Decimal::ZERO);
    }

    #[test]
    fn odometer_rollback_is_flagged() {
        let mut input = inputs();
        input.odometer_end = 49_000;
        let fees = compute_return_fees(&input, &FeeConfig::default());
        assert!(fees.odometer_anomaly);
        assert_eq!(fees.kilometers_used, 0);
        assert_eq!(fees.kilometer_fee, Decimal::ZERO);
    }

    #[test]
    fn charges_beyond_deposit_become_amount_due() {
        let mut input = inputs();
        input.additional_charges = Decimal::new(600, 0);
        let fees = compute_return_fees(&input, &FeeConfig::default());
        assert_eq!(fees.computed_refund, Decimal::ZERO);
        assert_eq!(fees.amount_due, Decimal::new(12040, 2));
    }

    #[test]
    fn override_recorded_next_to_computed() {
        let mut input = inputs();
        input.refund_override = Some(Decimal::new(450, 0));
        let fees = compute_return_fees(&input, &FeeConfig::default());
        assert_eq!(fees.final_refund, Decimal::new(450, 0));
        assert_eq!(fees.computed_refund, Decimal::new(47960, 2));
    }

    #[test]
    fn rounding_is_half_away_from_zero() {
        let mut input = inputs();
        input.odometer_end = 50_201;
        input.extra_kilometer_rate = Decimal::new(125, 3);
        input.fuel_level_end = 100;
        let fees = compute_return_fees(&input, &FeeConfig::default());
        assert_eq!(fees.kilometer_fee, Decimal::new(13, 2));
    }

    #[test]
    fn idempotent() {
        let input = inputs();
        let config = FeeConfig::default();
        assert_eq!(
            compute_return_fees(&input, &config),
            compute_return_fees(&input, &config)
        );
    }

    fn any_inputs() -> impl Strategy<Value = ReturnFeeInputs> {
        (
            0u32..1_000_000,
            0u32..20_000,
            proptest::option::of(0u32..10_000),
            0i64..500,
            (0u8..=100, 0u8..=100),
            0i64..200_000,
            0i64..100_000,
            proptest::option::of(0i64..200_000),
        )
            .prop_map(
                |(start, driven, allowed, rate, (fuel_start, fuel_end), deposit, charges, refund)| {
                    ReturnFeeInputs {
                        odometer_start: start,
                        odometer_end: start + driven,
                        allowed_kilometers: allowed,
                        extra_kilometer_rate: Decimal::new(rate, 2),
                        fuel_level_start: fuel_start,
                        fuel_level_end: fuel_end,
                        deposit: Decimal::new(deposit, 2),
                        additional_charges: Decimal::new(charges, 2),
                        refund_override: refund.map(|cents| Decimal::new(cents, 2)),
                    }
                },
            )
    }

    proptest! {
        #[test]
        fn settlement_laws_hold(input in any_inputs()) {
            let config = FeeConfig::default();
            let fees = compute_return_fees(&input, &config);
            prop_assert_eq!(&fees, &compute_return_fees(&input, &config));

            prop_assert_eq!(fees.kilometers_used, input.odometer_end - input.odometer_start);
            match input.allowed_kilometers {
                Some(allowed) if fees.kilometers_used <= allowed => {
                    prop_assert_eq!(fees.kilometer_overage, 0);
                    prop_assert_eq!(fees.kilometer_fee, Decimal::ZERO);
                }
                Some(allowed) => {
                    prop_assert_eq!(fees.kilometer_overage, fees.kilometers_used - allowed);
                }
                None => {
                    prop_assert_eq!(fees.kilometer_overage, 0);
                }
            }
            if input.fuel_level_end >= input.fuel_level_start {
                prop_assert_eq!(fees.fuel_fee, Decimal::ZERO);
            }

            prop_assert_eq!(
                fees.total_extra_fees,
                fees.kilometer_fee + fees.fuel_fee + fees.additional_charges
            );
            prop_assert_eq!(
                fees.computed_refund,
                (fees.deposit - fees.total_extra_fees).max(Decimal::ZERO)
            );
            prop_assert_eq!(
                fees.final_refund,
                fees.refund_override.unwrap_or(fees.computed_refund)
            );
            prop_assert!(fees.amount_due >= Decimal::ZERO);
        }

        #[test]
        fn decreasing_odometer_is_clamped(start in 1u32..1_000_000, back in 1u32..1_000) {
            let mut input = inputs();
            input.odometer_start = start;
            input.odometer_end = start.saturating_sub(back);
            let fees = compute_return_fees(&input, &FeeConfig::default());
            prop_assert!(fees.odometer_anomaly);
            prop_assert_eq!(fees.kilometers_used, 0);
            prop_assert_eq!(fees.kilometer_fee, Decimal::ZERO);
        }
    }
}
