//! Integration tests for the settlement engine.
//!
//! These tests drive the whole protocol through its public API: positions,
//! stability pool, liquidation in both modes, and redistribution.

use cdp_settlement::core::config::ProtocolParams;
use cdp_settlement::core::position::PositionStatus;
use cdp_settlement::error::Error;
use cdp_settlement::liquidation::recovery::LiquidationPolicy;
use cdp_settlement::oracle::price_feed::StaticPrice;
use cdp_settlement::protocol::system::{PositionAdjustment, Protocol};
use cdp_settlement::utils::constants::DECIMAL_PRECISION;
use cdp_settlement::utils::ids::AccountId;
use cdp_settlement::utils::math::{abs_diff, dec};
use primitive_types::U256;

// ═══════════════════════════════════════════════════════════════════════════════
// HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

fn id(label: &str) -> AccountId {
    AccountId::from_label(label)
}

/// Route engine logs to the test harness; `RUST_LOG=debug` shows them
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// No gas compensation and no minimum debt, so amounts stay round
fn plain_params() -> ProtocolParams {
    ProtocolParams::default()
        .with_gas_compensation_bps(0)
        .with_min_debt(0)
}

fn protocol_at(params: ProtocolParams, price: U256) -> Protocol {
    init_tracing();
    Protocol::new(params, Box::new(StaticPrice(price))).unwrap()
}

fn set_price(protocol: &mut Protocol, price: U256) {
    protocol.set_oracle(Box::new(StaticPrice(price)));
}

fn assert_close(actual: U256, expected: U256, tolerance: U256) {
    let diff = abs_diff(actual, expected);
    assert!(
        diff <= tolerance,
        "expected {} within {} of {}, off by {}",
        actual,
        tolerance,
        expected,
        diff
    );
}

/// Whale plus one position with 100 debt and 2 collateral, liquidatable at price 50
fn single_victim(deposits: &[(&str, u64)]) -> Protocol {
    let mut protocol = protocol_at(plain_params(), dec(200, 18));
    protocol
        .open_position(id("whale"), dec(1_000, 18), dec(100, 18))
        .unwrap();
    protocol
        .open_position(id("victim"), dec(2, 18), dec(100, 18))
        .unwrap();
    for (label, amount) in deposits {
        protocol
            .provide_to_pool(id(label), dec(*amount, 18), None)
            .unwrap();
    }
    set_price(&mut protocol, dec(50, 18));
    protocol
}

// ═══════════════════════════════════════════════════════════════════════════════
// STABILITY POOL SCENARIOS
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_three_depositors_share_offset() {
    let mut protocol = single_victim(&[("d1", 100), ("d2", 100), ("d3", 100)]);

    let outcome = protocol.liquidate(id("victim")).unwrap();
    assert_eq!(outcome.policy, LiquidationPolicy::OffsetAndRedistribute);
    assert_eq!(outcome.debt_offset, dec(100, 18));
    assert_eq!(outcome.coll_offset, dec(2, 18));
    assert!(outcome.debt_redistributed.is_zero());

    let tolerance = U256::from(1_000u64);
    let expected_deposit = U256::from(66_666_666_666_666_666_666u128);
    let expected_gain = U256::from(666_666_666_666_666_666u128);
    for label in ["d1", "d2", "d3"] {
        let deposit = protocol.compounded_deposit(&id(label)).unwrap();
        assert_close(deposit, expected_deposit, tolerance);
        // losses never under-reported
        assert!(deposit <= expected_deposit);
        let gain = protocol.depositor_collateral_gain(&id(label)).unwrap();
        assert_close(gain, expected_gain, tolerance);
        assert!(gain <= expected_gain);
    }

    assert_eq!(protocol.state().pool.total_deposits(), dec(200, 18));
    assert_eq!(protocol.state().pool.collateral_balance(), dec(2, 18));
}

#[test]
fn test_exact_depletion_starts_new_epoch() {
    let mut protocol = single_victim(&[("d1", 100)]);

    protocol.liquidate(id("victim")).unwrap();

    let pool = &protocol.state().pool;
    assert!(pool.total_deposits().is_zero());
    assert_eq!(pool.current_epoch(), 1);
    assert_eq!(pool.current_scale(), 0);
    assert_eq!(pool.p(), DECIMAL_PRECISION);
    assert!(protocol.compounded_deposit(&id("d1")).unwrap().is_zero());
    assert_eq!(
        protocol.depositor_collateral_gain(&id("d1")).unwrap(),
        dec(2, 18)
    );

    protocol
        .provide_to_pool(id("d2"), dec(50, 18), None)
        .unwrap();
    assert_eq!(protocol.compounded_deposit(&id("d2")).unwrap(), dec(50, 18));
    assert!(protocol.depositor_collateral_gain(&id("d2")).unwrap().is_zero());

    // the emptied depositor can still take the old gain
    let change = protocol.withdraw_from_pool(id("d1"), U256::zero()).unwrap();
    assert_eq!(change.collateral_gain, dec(2, 18));
    assert!(change.new_deposit.is_zero());
    assert!(protocol.state().pool.deposit(&id("d1")).is_none());
}

#[test]
fn test_getters_are_idempotent() {
    let mut protocol = single_victim(&[("d1", 100), ("d2", 300)]);
    protocol.liquidate(id("victim")).unwrap();

    let first = (
        protocol.compounded_deposit(&id("d1")).unwrap(),
        protocol.depositor_collateral_gain(&id("d1")).unwrap(),
    );
    let second = (
        protocol.compounded_deposit(&id("d1")).unwrap(),
        protocol.depositor_collateral_gain(&id("d1")).unwrap(),
    );
    assert_eq!(first, second);

    // proportional: d2 holds three times d1
    let d1 = protocol.compounded_deposit(&id("d1")).unwrap();
    let d2 = protocol.compounded_deposit(&id("d2")).unwrap();
    assert_close(d2, d1 * 3, U256::from(10u64));
}

// ═══════════════════════════════════════════════════════════════════════════════
// RECOVERY MODE
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_recovery_partial_offset_keeps_position_open() {
    let mut protocol = protocol_at(plain_params(), dec(2, 18));
    protocol
        .open_position(id("x"), dec(2_625, 17), dec(250, 18))
        .unwrap();
    protocol
        .open_position(id("y"), dec(300, 18), dec(200, 18))
        .unwrap();
    protocol
        .provide_to_pool(id("d"), dec(100, 18), None)
        .unwrap();

    set_price(&mut protocol, dec(1, 18));
    // TCR 562.5 / 450 = 125%
    assert!(protocol.is_recovery_mode(dec(1, 18)).unwrap());

    let outcome = protocol.liquidate(id("x")).unwrap();
    assert_eq!(outcome.policy, LiquidationPolicy::OffsetUpToPool);
    assert!(!outcome.position_closed);
    assert_eq!(outcome.debt_offset, dec(100, 18));
    assert_eq!(outcome.coll_offset, dec(105, 18));
    assert!(outcome.debt_redistributed.is_zero());
    assert!(outcome.coll_redistributed.is_zero());
    assert_eq!(outcome.debt_remaining, dec(150, 18));
    assert!(outcome.is_conserved());

    let x = protocol.position(&id("x")).unwrap();
    assert_eq!(x.status, PositionStatus::Active);
    assert_eq!(x.debt, dec(150, 18));
    assert_eq!(x.collateral, dec(1_575, 17));
    assert!(protocol.state().redistribution.l_debt().is_zero());
    assert!(protocol.state().pool.total_deposits().is_zero());
    protocol.state().check_invariants().unwrap();
}

#[test]
fn test_recovery_below_hundred_percent_redistributes_only() {
    let mut protocol = protocol_at(plain_params(), dec(2, 18));
    protocol
        .open_position(id("b"), dec(300, 18), dec(200, 18))
        .unwrap();
    protocol
        .open_position(id("c"), dec(300, 18), dec(200, 18))
        .unwrap();
    protocol
        .open_position(id("a"), dec(90, 18), dec(120, 18))
        .unwrap();
    protocol
        .provide_to_pool(id("d"), dec(1_000, 18), None)
        .unwrap();

    set_price(&mut protocol, dec(1, 18));
    let outcomes = protocol.liquidate_batch(10).unwrap();

    // b and c end up exactly at the TCR, so neither is capped-liquidatable
    assert_eq!(outcomes.len(), 1);
    let outcome = &outcomes[0];
    assert_eq!(outcome.position, id("a"));
    assert_eq!(outcome.policy, LiquidationPolicy::RedistributeOnly);
    assert!(outcome.debt_offset.is_zero());
    assert_eq!(outcome.debt_redistributed, dec(120, 18));
    assert_eq!(outcome.coll_redistributed, dec(90, 18));
    assert_eq!(protocol.state().pool.total_deposits(), dec(1_000, 18));

    let b = protocol.entire_debt_and_coll(&id("b")).unwrap();
    assert_eq!(b.debt, dec(260, 18));
    assert_eq!(b.coll, dec(345, 18));
    assert_eq!(b.pending_debt, dec(60, 18));

    let err = protocol.liquidate(id("b")).unwrap_err();
    assert!(matches!(err, Error::NothingToLiquidate(_)));
}

#[test]
fn test_recovery_capped_offset_leaves_surplus() {
    let mut protocol = protocol_at(plain_params(), dec(2, 18));
    protocol
        .open_position(id("b"), dec(300, 18), dec(200, 18))
        .unwrap();
    protocol
        .open_position(id("a"), dec(120, 18), dec(100, 18))
        .unwrap();
    protocol
        .provide_to_pool(id("d"), dec(150, 18), None)
        .unwrap();

    set_price(&mut protocol, dec(1, 18));
    // TCR 420 / 300 = 140%, a is lowest at 120%
    let outcome = protocol.liquidate(id("a")).unwrap();
    assert_eq!(outcome.policy, LiquidationPolicy::CappedOffset);
    assert_eq!(outcome.debt_offset, dec(100, 18));
    assert_eq!(outcome.coll_offset, dec(110, 18));
    assert_eq!(outcome.coll_surplus, dec(10, 18));
    assert!(outcome.is_conserved());

    assert_eq!(protocol.state().surplus.balance_of(&id("a")), dec(10, 18));
    assert_eq!(protocol.claim_collateral_surplus(id("a")).unwrap(), dec(10, 18));
    assert!(protocol.claim_collateral_surplus(id("a")).is_err());

    // back to 150%
    assert!(!protocol.is_recovery_mode(dec(1, 18)).unwrap());
    assert!(!protocol.gate().was_recovery_mode());
}

#[test]
fn test_batch_stops_once_recovery_mode_ends() {
    let mut protocol = protocol_at(plain_params(), dec(2, 18));
    protocol
        .open_position(id("c"), dec(400, 18), dec(200, 18))
        .unwrap();
    protocol
        .open_position(id("b"), dec(130, 18), dec(100, 18))
        .unwrap();
    protocol
        .open_position(id("a"), dec(315, 18), dec(300, 18))
        .unwrap();
    protocol
        .provide_to_pool(id("d"), dec(1_000, 18), None)
        .unwrap();

    set_price(&mut protocol, dec(1, 18));
    // TCR 845 / 600 ≈ 140.8%
    assert!(protocol.is_recovery_mode(dec(1, 18)).unwrap());

    let outcomes = protocol.liquidate_batch(10).unwrap();

    // After a is offset the TCR is 530 / 300 ≈ 176.7%, so b at 130% is left
    // alone instead of being capped-offset as the new lowest position
    let liquidated: Vec<_> = outcomes.iter().map(|o| o.position).collect();
    assert_eq!(liquidated, vec![id("a")]);
    assert_eq!(outcomes[0].policy, LiquidationPolicy::OffsetUpToPool);
    assert!(outcomes[0].position_closed);
    assert_eq!(outcomes[0].debt_offset, dec(300, 18));
    assert_eq!(outcomes[0].coll_offset, dec(315, 18));
    assert!(!protocol.is_recovery_mode(dec(1, 18)).unwrap());

    let b = protocol.position(&id("b")).unwrap();
    assert_eq!(b.status, PositionStatus::Active);
    assert_eq!(b.collateral, dec(130, 18));
    assert_eq!(b.debt, dec(100, 18));
    assert!(protocol.state().surplus.balance_of(&id("b")).is_zero());
    assert_eq!(protocol.state().pool.total_deposits(), dec(700, 18));
    assert!(protocol
        .engine()
        .recent_events()
        .iter()
        .all(|e| e.outcome.policy != LiquidationPolicy::CappedOffset));
    protocol.state().check_invariants().unwrap();
}

#[test]
fn test_recovery_blocks_collateral_withdrawal_and_close() {
    let mut protocol = protocol_at(plain_params(), dec(2, 18));
    protocol
        .open_position(id("b"), dec(300, 18), dec(200, 18))
        .unwrap();
    protocol
        .open_position(id("a"), dec(120, 18), dec(100, 18))
        .unwrap();
    set_price(&mut protocol, dec(1, 18));

    let err = protocol
        .adjust_position(
            id("b"),
            PositionAdjustment::withdraw_collateral(dec(1, 18)),
        )
        .unwrap_err();
    assert!(matches!(err, Error::CollateralWithdrawalInRecoveryMode));

    let err = protocol.close_position(id("b")).unwrap_err();
    assert!(matches!(err, Error::RecoveryMode));

    let err = protocol
        .open_position(id("c"), dec(140, 18), dec(100, 18))
        .unwrap_err();
    assert!(matches!(err, Error::InsufficientCollateralRatio { .. }));
    protocol
        .open_position(id("c"), dec(200, 18), dec(100, 18))
        .unwrap();
}

// ═══════════════════════════════════════════════════════════════════════════════
// REDISTRIBUTION AND CONSERVATION
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_partial_pool_splits_offset_and_redistribution() {
    let mut protocol = protocol_at(ProtocolParams::default().with_min_debt(0), dec(200, 18));
    protocol
        .open_position(id("w1"), dec(500, 18), dec(100, 18))
        .unwrap();
    protocol
        .open_position(id("w2"), dec(500, 18), dec(100, 18))
        .unwrap();
    protocol
        .open_position(id("victim"), dec(4, 18), dec(200, 18))
        .unwrap();
    protocol
        .provide_to_pool(id("d"), dec(50, 18), None)
        .unwrap();
    set_price(&mut protocol, dec(50, 18));

    let coll_before = protocol.state().entire_system_coll().unwrap();
    let debt_before = protocol.state().entire_system_debt().unwrap();

    let outcome = protocol.liquidate(id("victim")).unwrap();
    assert_eq!(outcome.debt_offset, dec(50, 18));
    assert_eq!(outcome.debt_redistributed, dec(150, 18));
    assert_eq!(outcome.coll_gas_compensation, dec(2, 16));
    assert!(outcome.is_conserved());

    let coll_after = protocol.state().entire_system_coll().unwrap();
    let debt_after = protocol.state().entire_system_debt().unwrap();
    assert_eq!(debt_before - debt_after, outcome.debt_offset);
    assert_eq!(
        coll_before - coll_after,
        outcome.coll_offset + outcome.coll_gas_compensation
    );

    let w1 = protocol.entire_debt_and_coll(&id("w1")).unwrap();
    assert_eq!(w1.debt, dec(175, 18));

    // touching applies the pending share
    protocol
        .adjust_position(
            id("w1"),
            PositionAdjustment::add_collateral(dec(1, 18)),
        )
        .unwrap();
    assert_eq!(protocol.position(&id("w1")).unwrap().debt, dec(175, 18));
    protocol.state().check_invariants().unwrap();

    let stats = protocol.engine().statistics();
    assert_eq!(stats.total_liquidations, 1);
    assert_eq!(stats.total_debt_offset, dec(50, 18));
    assert_eq!(stats.total_debt_redistributed, dec(150, 18));
}

#[test]
fn test_sole_remaining_position_guard() {
    let mut protocol = protocol_at(plain_params(), dec(200, 18));
    protocol
        .open_position(id("a"), dec(2, 18), dec(100, 18))
        .unwrap();
    set_price(&mut protocol, dec(50, 18));

    let err = protocol.liquidate(id("a")).unwrap_err();
    assert!(matches!(err, Error::SoleRemainingPosition));
    assert!(protocol.liquidate_batch(10).unwrap().is_empty());
}

#[test]
fn test_liquidate_list_of_positions() {
    let mut protocol = single_victim(&[("d1", 300)]);
    let outcomes = protocol
        .liquidate_positions(&[id("whale"), id("victim"), id("nobody")])
        .unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].position, id("victim"));
    assert_eq!(
        protocol.position(&id("victim")).unwrap().status,
        PositionStatus::ClosedByLiquidation
    );
    assert_eq!(protocol.engine().recent_events().len(), 1);
}

#[test]
fn test_move_collateral_gain_into_position() {
    let mut protocol = single_victim(&[("whale", 100)]);
    protocol.liquidate(id("victim")).unwrap();

    let before = protocol.position(&id("whale")).unwrap().collateral;
    let gain = protocol.move_collateral_gain_to_position(id("whale")).unwrap();
    assert_eq!(gain, dec(2, 18));
    assert_eq!(
        protocol.position(&id("whale")).unwrap().collateral,
        before + gain
    );
    assert!(protocol
        .depositor_collateral_gain(&id("whale"))
        .unwrap()
        .is_zero());
}

// ═══════════════════════════════════════════════════════════════════════════════
// EXTREME MAGNITUDES
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_extreme_magnitudes_do_not_overflow() {
    let price = U256::exp10(27);
    let mut protocol = protocol_at(ProtocolParams::default(), price);
    protocol
        .open_position(id("whale"), U256::exp10(29), U256::exp10(36))
        .unwrap();
    protocol
        .open_position(id("victim"), U256::exp10(27) * 2, U256::exp10(36))
        .unwrap();
    for label in ["d1", "d2", "d3"] {
        protocol
            .provide_to_pool(id(label), U256::exp10(36), None)
            .unwrap();
    }

    set_price(&mut protocol, U256::exp10(27) / 2);
    let outcome = protocol.liquidate(id("victim")).unwrap();
    assert_eq!(outcome.debt_offset, U256::exp10(36));
    assert!(outcome.is_conserved());

    // relative error bounded by 1e-15
    let expected = U256::exp10(36) * 2 / 3;
    let tolerance = expected / U256::exp10(15);
    for label in ["d1", "d2", "d3"] {
        let deposit = protocol.compounded_deposit(&id(label)).unwrap();
        assert_close(deposit, expected, tolerance);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// FRONT ENDS AND ISSUANCE
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_front_end_kickback_split() {
    let mut protocol = protocol_at(plain_params(), dec(200, 18));
    let front_end = id("frontend");
    protocol
        .register_front_end(front_end, dec(8, 17))
        .unwrap();
    protocol
        .provide_to_pool(id("d"), dec(1_000, 18), Some(front_end))
        .unwrap();

    assert!(matches!(
        protocol.provide_to_pool(front_end, dec(1, 18), None),
        Err(Error::DepositorIsFrontEnd(_))
    ));

    protocol.begin_block(1, 365 * 24 * 60 * 60).unwrap();
    let issued = protocol.trigger_issuance().unwrap();
    assert!(!issued.is_zero());

    let depositor_gain = protocol.depositor_reward_gain(&id("d")).unwrap();
    let front_end_gain = protocol
        .state()
        .pool
        .front_end_reward_gain(&front_end)
        .unwrap();
    assert_close(depositor_gain, front_end_gain * 4, issued / U256::exp10(12));
    assert!(depositor_gain + front_end_gain <= issued);
    assert_close(
        depositor_gain + front_end_gain,
        issued,
        issued / U256::exp10(12),
    );
}
