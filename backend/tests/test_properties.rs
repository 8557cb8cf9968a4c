//! Property tests for the driver and node invariants

use proptest::prelude::*;
use queueing_sim_core::{
    discover, Distribution, Network, NodeId, SelectionPolicy, SimTime, Simulation,
};
use std::collections::HashSet;

fn uniform(min: f64, width: f64) -> Distribution {
    Distribution::Uniform {
        min,
        max: min + width,
    }
}

/// Source -> queue -> device with random timings.
fn tandem(seed: u64, arrival: (f64, f64), service: (f64, f64)) -> Simulation {
    let mut net = Network::new(seed);
    let src = net.add_source("Arrivals", uniform(arrival.0, arrival.1)).unwrap();
    let q = net.add_queue("Queue").unwrap();
    let dev = net.add_device("Server", uniform(service.0, service.1)).unwrap();
    net.connect(src, q).unwrap();
    net.connect(q, dev).unwrap();
    Simulation::new(net).unwrap()
}

/// Source feeding a random graph of queues and routers. Edges may point
/// anywhere, so cycles are common.
fn random_graph(edges: &[(usize, usize, bool)]) -> (Network, NodeId) {
    let mut net = Network::new(1);
    let src = net
        .add_source("Arrivals", Distribution::Fixed { value: 1.0 })
        .unwrap();
    let n = edges.len();
    let ids: Vec<NodeId> = edges
        .iter()
        .enumerate()
        .map(|(i, &(_, _, is_router))| {
            if is_router {
                net.add_router(&format!("R{}", i), SelectionPolicy::Priority)
                    .unwrap()
            } else {
                net.add_queue(&format!("Q{}", i)).unwrap()
            }
        })
        .collect();

    net.connect(src, ids[0]).unwrap();
    for (i, &(a, b, is_router)) in edges.iter().enumerate() {
        if is_router {
            net.add_candidate(ids[i], ids[a % n], 1).unwrap();
            net.add_candidate(ids[i], ids[b % n], 2).unwrap();
        } else {
            net.connect(ids[i], ids[a % n]).unwrap();
        }
    }
    (net, src)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Every item that arrived is either waiting, in service or done.
    #[test]
    fn prop_flow_conservation(
        seed in 1u64..10_000,
        arrival in (0.5f64..5.0, 0.1f64..5.0),
        service in (0.5f64..5.0, 0.1f64..5.0),
        horizon in 1.0f64..200.0,
    ) {
        let mut sim = tandem(seed, arrival, service);
        sim.run(SimTime::from_units(horizon)).unwrap();

        let net = sim.network();
        let arrivals = net.source(net.id("Arrivals").unwrap()).unwrap().stats().served();
        let queue = net.queue(net.id("Queue").unwrap()).unwrap();
        let server = net.device(net.id("Server").unwrap()).unwrap();
        let in_service = u64::from(server.unit().is_busy());

        prop_assert_eq!(queue.stats().requests(), arrivals);
        prop_assert_eq!(queue.stats().requests(), queue.stats().served() + queue.backlog());
        prop_assert_eq!(queue.stats().served(), server.stats().served() + in_service);
        prop_assert!(server.utilization() <= 1.0);
    }

    /// Running T1 then T2 ends in the same state as running T1 + T2.
    #[test]
    fn prop_split_horizon_equivalence(
        seed in 1u64..10_000,
        arrival in (0.5f64..5.0, 0.1f64..5.0),
        service in (0.5f64..5.0, 0.1f64..5.0),
        first in 0.0f64..100.0,
        second in 0.0f64..100.0,
    ) {
        let (t1, t2) = (SimTime::from_units(first), SimTime::from_units(second));

        let mut whole = tandem(seed, arrival, service);
        whole.run(t1 + t2).unwrap();

        let mut split = tandem(seed, arrival, service);
        split.run(t1).unwrap();
        split.run(t2).unwrap();

        prop_assert_eq!(split.elapsed(), whole.elapsed());
        prop_assert_eq!(split.network().rng().state(), whole.network().rng().state());

        let (a, b) = (split.report().unwrap(), whole.report().unwrap());
        for ((node, metric, x), (_, _, y)) in a.metric_pairs().into_iter().zip(b.metric_pairs()) {
            let tolerance = 1e-9 * x.abs().max(y.abs()).max(1.0);
            prop_assert!((x - y).abs() <= tolerance, "{}.{}: {} vs {}", node, metric, x, y);
        }
    }

    /// Discovery visits each reachable node once, is closed under
    /// successors, and rediscovering from its own output changes nothing.
    #[test]
    fn prop_discovery_idempotent(
        edges in prop::collection::vec((0usize..16, 0usize..16, any::<bool>()), 1..16),
    ) {
        let (net, src) = random_graph(&edges);
        let order = discover(&net, &[src]).unwrap();

        let unique: HashSet<NodeId> = order.iter().copied().collect();
        prop_assert_eq!(unique.len(), order.len());
        for &id in &order {
            for next in net.successors(id).unwrap() {
                prop_assert!(unique.contains(&next));
            }
        }

        prop_assert_eq!(discover(&net, &order).unwrap(), order.clone());
        prop_assert_eq!(discover(&net, &[src]).unwrap(), order);
    }

    /// With an always-ready successor a queue keeps less than one batch.
    #[test]
    fn prop_queue_exhaustive(batch in 1u64..6, items in 0u64..60) {
        let mut net = Network::new(1);
        let q = net.add_batch_queue("Batches", batch).unwrap();
        let sink = net.add_queue("Sink").unwrap();
        net.connect(q, sink).unwrap();

        for _ in 0..items {
            net.accept(q).unwrap();
            prop_assert!(net.queue(q).unwrap().backlog() < batch);
        }

        let queue = net.queue(q).unwrap();
        prop_assert_eq!(queue.backlog(), items % batch);
        prop_assert_eq!(queue.stats().served(), items - items % batch);
        prop_assert_eq!(net.queue(sink).unwrap().stats().requests(), items / batch);
    }
}
