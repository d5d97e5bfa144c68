//! Property tests for the reward ledger: value conservation, fairness and
//! proportionality over random operation sequences.

use std::collections::BTreeMap;

use proptest::prelude::*;

use pool_ledger::{Amount, LedgerError, RewardLedger};

const ACCOUNTS: [&str; 4] = ["a", "b", "c", "d"];

#[derive(Clone, Debug)]
enum Op {
    Deposit(usize, Amount),
    Reward(Amount),
    Withdraw(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0..ACCOUNTS.len(), 1u64..1_000_000).prop_map(|(i, amt)| Op::Deposit(i, amt)),
        3 => (1u64..10_000_000).prop_map(Op::Reward),
        2 => (0..ACCOUNTS.len()).prop_map(Op::Withdraw),
    ]
}

/// Many one- or two-unit top-ups between small rewards.
fn top_up_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        12 => (0..ACCOUNTS.len(), 1u64..3).prop_map(|(i, amt)| Op::Deposit(i, amt)),
        2 => (1u64..50).prop_map(Op::Reward),
        1 => (0..ACCOUNTS.len()).prop_map(Op::Withdraw),
    ]
}

/// Running tallies kept outside the ledger.
#[derive(Default)]
struct Tally {
    deposited: u128,
    rewarded: u128,
    paid: u128,
    rewards: u128,
}

fn run(ops: &[Op]) -> (RewardLedger, Tally) {
    let mut ledger = RewardLedger::new();
    let mut tally = Tally::default();
    for op in ops {
        match *op {
            Op::Deposit(i, amount) => {
                ledger.deposit(ACCOUNTS[i], amount).unwrap();
                tally.deposited += amount as u128;
            }
            Op::Reward(amount) => match ledger.distribute_reward(amount) {
                Ok(()) => {
                    tally.rewarded += amount as u128;
                    tally.rewards += 1;
                }
                Err(LedgerError::NoStake) => assert_eq!(ledger.pool().total_staked, 0),
                Err(other) => panic!("unexpected reward error {other}"),
            },
            Op::Withdraw(i) => match ledger.withdraw(ACCOUNTS[i]) {
                Ok(payout) => {
                    assert_eq!(payout.total, payout.principal as u128 + payout.reward);
                    tally.paid += payout.total;
                }
                Err(LedgerError::NoBalance { .. }) => {
                    assert_eq!(ledger.staked_balance(ACCOUNTS[i]), 0)
                }
                Err(other) => panic!("unexpected withdraw error {other}"),
            },
        }
    }
    (ledger, tally)
}

/// Nothing is created, and at most one unit per reward per account is lost.
fn check_conservation(ops: &[Op]) -> Result<(), TestCaseError> {
    let (ledger, tally) = run(ops);

    let mut remaining = 0u128;
    for view in ledger.accounts().unwrap() {
        remaining += view.staked as u128 + view.pending_reward;
    }
    let inflow = tally.deposited + tally.rewarded;
    let outflow = tally.paid + remaining;

    prop_assert!(outflow <= inflow, "created value: out {} > in {}", outflow, inflow);
    let bound = tally.rewards * ACCOUNTS.len() as u128;
    prop_assert!(inflow - outflow <= bound, "slack {} exceeds {}", inflow - outflow, bound);

    prop_assert_eq!(ledger.totals().held(), inflow - tally.paid);
    prop_assert_eq!(ledger.unallocated_slack().unwrap(), inflow - outflow);
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn value_is_conserved_within_rounding_slack(ops in prop::collection::vec(op_strategy(), 1..60)) {
        check_conservation(&ops)?;
    }

    #[test]
    fn small_top_ups_conserve_value(ops in prop::collection::vec(top_up_strategy(), 1..400)) {
        check_conservation(&ops)?;
    }

    #[test]
    fn total_staked_matches_live_principals(ops in prop::collection::vec(op_strategy(), 1..60)) {
        let (ledger, _) = run(&ops);
        let sum: u128 = ACCOUNTS
            .iter()
            .map(|id| ledger.staked_balance(id) as u128)
            .sum();
        prop_assert_eq!(sum, ledger.pool().total_staked as u128);
    }

    #[test]
    fn accumulator_never_decreases(ops in prop::collection::vec(op_strategy(), 1..60)) {
        let mut ledger = RewardLedger::new();
        let mut last = 0u128;
        for op in ops {
            let _ = match op {
                Op::Deposit(i, amount) => ledger.deposit(ACCOUNTS[i], amount),
                Op::Reward(amount) => ledger.distribute_reward(amount),
                Op::Withdraw(i) => ledger.withdraw(ACCOUNTS[i]).map(|_| ()),
            };
            prop_assert!(ledger.pool().acc_reward_per_share >= last);
            last = ledger.pool().acc_reward_per_share;
        }
    }

    #[test]
    fn late_depositor_receives_none_of_earlier_reward(
        history in prop::collection::vec(op_strategy(), 0..30),
        reward in 1u64..10_000_000,
        late in 1u64..1_000_000,
    ) {
        let (mut ledger, _) = run(&history);
        ledger.deposit("seed", 1).unwrap();
        ledger.distribute_reward(reward).unwrap();
        ledger.deposit("late", late).unwrap();
        prop_assert_eq!(ledger.pending_reward("late").unwrap(), 0);
        prop_assert_eq!(ledger.withdraw("late").unwrap().reward, 0);
    }

    #[test]
    fn rewards_split_in_proportion_to_stake(
        p1 in 1u64..1_000_000,
        p2 in 1u64..1_000_000,
        reward in 1u64..100_000_000,
    ) {
        let mut ledger = RewardLedger::new();
        ledger.deposit("one", p1).unwrap();
        ledger.deposit("two", p2).unwrap();
        ledger.distribute_reward(reward).unwrap();
        let r1 = ledger.pending_reward("one").unwrap() as u128;
        let r2 = ledger.pending_reward("two").unwrap() as u128;

        // Each share is within one unit of its exact proportional value.
        let total = (p1 + p2) as u128;
        let exact1 = reward as u128 * p1 as u128;
        let exact2 = reward as u128 * p2 as u128;
        prop_assert!(r1 * total <= exact1 && exact1 < (r1 + 1) * total + total);
        prop_assert!(r2 * total <= exact2 && exact2 < (r2 + 1) * total + total);
        prop_assert!(r1 + r2 <= reward as u128);
        prop_assert!(reward as u128 - (r1 + r2) <= 2);
    }

    #[test]
    fn failed_withdraw_never_mutates(ops in prop::collection::vec(op_strategy(), 0..40)) {
        let (mut ledger, _) = run(&ops);
        let before = ledger.clone();
        prop_assert!(ledger.withdraw("nobody").is_err());
        prop_assert_eq!(&ledger, &before);
    }

    #[test]
    fn reward_with_zero_stake_never_mutates(ops in prop::collection::vec(op_strategy(), 0..40)) {
        let (mut ledger, _) = run(&ops);
        let live: Vec<&str> = ACCOUNTS
            .iter()
            .copied()
            .filter(|id| ledger.staked_balance(id) > 0)
            .collect();
        for id in live {
            ledger.withdraw(id).unwrap();
        }
        let before = ledger.clone();
        prop_assert_eq!(ledger.distribute_reward(1_000), Err(LedgerError::NoStake));
        prop_assert_eq!(&ledger, &before);
    }
}

#[test]
fn many_participants_cost_the_same_per_reward() {
    // 10k accounts; rewards only touch the accumulator, accounts stay untouched.
    let mut ledger = RewardLedger::new();
    let mut expected = BTreeMap::new();
    for idx in 0..10_000u64 {
        let id = format!("user-{idx}");
        ledger.deposit(&id, 1 + idx % 7).unwrap();
        expected.insert(id.clone(), ledger.account(&id));
    }
    for _ in 0..100 {
        ledger.distribute_reward(1_000_000).unwrap();
    }
    for (id, account) in &expected {
        assert_eq!(&ledger.account(id), account);
    }
    assert!(ledger.unallocated_slack().unwrap() <= 100 * 10_000);
}
