//! End-to-end tests driving a ClockTree over simulated clocks from many consumers

use std::sync::Arc;

use proptest::prelude::*;

use crate::tests::init_tracing;
use crate::{ArbiterConfig, ClockTree, Rate, RateProvider, SimulatedClocks};

const MIN: Rate = 50;
const MAX: Rate = 1_000;

#[derive(Debug, Clone)]
enum Op {
    Start(Rate),
    End(usize),
    Set(Rate),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u64..=MAX).prop_map(Op::Start),
        (0usize..16).prop_map(Op::End),
        (0u64..=2 * MAX).prop_map(Op::Set),
    ]
}

proptest! {
    #[test]
    fn prop_floor_and_restore_hold(
        baseline in MIN..=MAX,
        ops in proptest::collection::vec(op_strategy(), 1..64),
    ) {
        let clocks = SimulatedClocks::new();
        let clk = clocks.add_clock(baseline, MIN, MAX, 1);
        let tree = ClockTree::new(clocks.clone(), ArbiterConfig::default()).unwrap();
        tree.register_clock(clk).unwrap();

        let mut live = Vec::new();
        let mut expected_restore: Option<Rate> = None;

        for op in ops {
            match op {
                Op::Start(rate) => {
                    if live.is_empty() {
                        expected_restore = Some(tree.rate(clk).unwrap());
                    }
                    live.push(tree.start_request(clk, rate).unwrap());
                }
                Op::End(index) => {
                    if live.is_empty() {
                        continue;
                    }
                    let request = live.swap_remove(index % live.len());
                    tree.end_request(request);
                    if live.is_empty() {
                        let restore = expected_restore.take().unwrap();
                        prop_assert_eq!(tree.rate(clk).unwrap(), restore.clamp(MIN, MAX));
                    }
                }
                Op::Set(rate) => {
                    tree.set_rate(clk, rate).unwrap();
                    let floor = live.iter().map(|r| r.rate()).max().unwrap_or(0).max(MIN);
                    prop_assert_eq!(tree.rate(clk).unwrap(), rate.clamp(floor, MAX));
                    if !live.is_empty() {
                        expected_restore = Some(rate);
                    }
                }
            }

            let floor = live.iter().map(|r| r.rate()).max().unwrap_or(0).max(MIN);
            let rate = tree.rate(clk).unwrap();
            prop_assert!(rate >= floor, "rate {} below floor {}", rate, floor);
            prop_assert!(rate <= MAX);
            prop_assert_eq!(tree.restore_rate(clk).unwrap(), expected_restore);
            prop_assert_eq!(tree.pending_requests(clk).unwrap(), live.len());
        }

        for request in live {
            tree.end_request(request);
        }
        prop_assert_eq!(tree.metrics().live_requests, 0);
    }
}

#[test]
fn test_concurrent_consumers_share_one_clock() {
    init_tracing();
    let clocks = SimulatedClocks::new();
    let clk = clocks.add_clock(100, 0, 10_000, 1);
    let tree = Arc::new(ClockTree::new(clocks, ArbiterConfig::default()).unwrap());
    tree.register_clock(clk).unwrap();

    std::thread::scope(|scope| {
        for consumer in 0..8u64 {
            let tree = Arc::clone(&tree);
            scope.spawn(move || {
                for round in 0..100u64 {
                    let rate = 200 + consumer * 500 + round;
                    let request = tree.start_request(clk, rate).unwrap();
                    assert!(tree.rate(clk).unwrap() >= rate);
                    assert!(tree.round_rate(clk, 0).unwrap() >= rate);
                    tree.end_request(request);
                }
            });
        }
    });

    assert_eq!(tree.rate(clk).unwrap(), 100);
    assert_eq!(tree.restore_rate(clk).unwrap(), None);

    let metrics = tree.metrics();
    assert_eq!(metrics.requests_started, 800);
    assert_eq!(metrics.requests_ended, 800);
    assert_eq!(metrics.live_requests, 0);
}

#[test]
fn test_consumers_across_clocks_in_one_critical_section() {
    init_tracing();
    let clocks = SimulatedClocks::new();
    let cpu = clocks.add_clock(400, 100, 2_000, 100);
    let bus = clocks.add_clock(200, 100, 800, 50);
    let tree = ClockTree::new(clocks.clone(), ArbiterConfig::default()).unwrap();
    tree.register_clock(cpu).unwrap();
    tree.register_clock(bus).unwrap();

    // A display pipeline needs both clocks boosted together
    let (cpu_req, bus_req) = {
        let mut guard = tree.lock();
        let cpu_req = guard.start_request(cpu, 1_250).unwrap();
        let bus_req = guard.start_request(bus, 610).unwrap();
        (cpu_req, bus_req)
    };
    assert_eq!(tree.rate(cpu).unwrap(), 1_300);
    assert_eq!(tree.rate(bus).unwrap(), 650);

    // A governor lowers the cpu in the meantime; the request keeps it up
    tree.set_rate(cpu, 300).unwrap();
    assert_eq!(tree.rate(cpu).unwrap(), 1_300);

    {
        let mut guard = tree.lock();
        guard.end_request(bus_req);
        guard.end_request(cpu_req);
    }
    assert_eq!(tree.rate(cpu).unwrap(), 300);
    assert_eq!(tree.rate(bus).unwrap(), 200);
    assert_eq!(clocks.current_rate(bus).unwrap(), 200);
}
