mod common;

use common::{Harness, DAY, SCALE, T0};
use soroban_sdk::{testutils::Address as _, Address};
use subs::MAX_WALK_RUNS;

/// Default per-transaction CPU limit
const TX_CPU_LIMIT: u64 = 100_000_000;

struct Walk {
    cpu: u64,
    balance: i128,
}

/// Claim after `stale` untouched periods while `bystanders` unrelated
/// subscriptions are live, metering only the claim
fn stale_claim(stale: u64, bystanders: u32) -> Walk {
    let h = Harness::new(DAY);
    let cycles = stale + 10;
    let funds = SCALE * i128::from(cycles + 1);

    let receiver = Address::generate(&h.env);
    let subscriber = h.user(funds);
    h.subs.subscribe(&subscriber, &receiver, &SCALE, &cycles);

    for _ in 0..bystanders {
        let other = h.user(funds);
        let elsewhere = Address::generate(&h.env);
        h.subs.subscribe(&other, &elsewhere, &SCALE, &cycles);
    }

    h.jump_to(T0 + stale * DAY + 1);
    h.subs.advance();

    let mut budget = h.env.cost_estimate().budget();
    budget.reset_default();
    h.subs.claim(&receiver, &0);
    let cpu = budget.cpu_instruction_cost();

    let stored = h.subs.receiver_balances(&receiver);
    assert_eq!(stored.last_update, T0 + stale * DAY);

    Walk {
        cpu,
        balance: stored.balance,
    }
}

#[test]
fn test_walk_settles_every_stale_period() {
    let walk = stale_claim(520, 0);
    assert_eq!(walk.balance, 520 * SCALE);
    assert!(walk.cpu < TX_CPU_LIMIT / 10);
}

#[test]
fn test_walk_cost_ignores_stale_periods() {
    let short = stale_claim(260, 0);
    let long = stale_claim(5_200, 0);
    assert_eq!(long.balance, 5_200 * SCALE);
    assert!(long.cpu < short.cpu * 3 / 2);
}

#[test]
fn test_walk_cost_ignores_other_subscribers() {
    let alone = stale_claim(520, 0);
    let crowded = stale_claim(520, 25);
    assert_eq!(alone.balance, crowded.balance);
    assert!(crowded.cpu <= alone.cpu * 5 / 4);
}

#[test]
fn test_busy_ledger_settles_in_bounded_chunks() {
    let h = Harness::new(DAY);
    let receiver = Address::generate(&h.env);
    let subscriber = h.user(300 * SCALE);
    h.subs.subscribe(&subscriber, &receiver, &SCALE, &200);

    // Someone moves the clock every single period
    let busy = 100u64;
    for day in 1..=busy {
        h.jump_to(T0 + day * DAY + 1);
        h.subs.advance();
    }

    let mut budget = h.env.cost_estimate().budget();
    let mut claims = 0;
    loop {
        budget.reset_default();
        h.subs.claim(&receiver, &0);
        assert!(budget.cpu_instruction_cost() < TX_CPU_LIMIT / 2);
        claims += 1;

        let stored = h.subs.receiver_balances(&receiver);
        if stored.last_update == T0 + busy * DAY {
            assert_eq!(stored.balance, 100 * SCALE);
            break;
        }
        assert!(stored.balance < 100 * SCALE);
    }

    let expected = (busy as u32).div_ceil(MAX_WALK_RUNS);
    assert_eq!(claims, expected);
}
