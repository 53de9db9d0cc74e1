use softbp_core::engine::variable_update::compute_vnode_update;
use softbp_core::{update_fnode, update_vnode, BpError, Domain, FactorGraph, Relation, VnodeId};
use softbp_tests::{assert_close_vec, assert_sums_to_one, make_distribution, normalized};

/// `hub` consumed by a NOT node and an offset-XOR node, optionally produced by a
/// ROL node. Function messages are refreshed so they differ from uniform.
fn hub_graph(nk: usize, domain: Domain, with_producer: bool) -> (FactorGraph, VnodeId) {
    let mut g = FactorGraph::new(nk).unwrap();
    let hub = g.add_variable(make_distribution(nk, 1), domain).unwrap();
    let left = g.add_variable(make_distribution(nk, 2), domain).unwrap();
    let right = g.add_variable(make_distribution(nk, 3), domain).unwrap();
    g.add_function(Relation::Not, &[hub], left, None).unwrap();
    g.add_function(Relation::Xor, &[hub], right, Some(5)).unwrap();
    if with_producer {
        let source = g.add_variable(make_distribution(nk, 4), domain).unwrap();
        g.add_function(Relation::Rol, &[source], hub, Some(3)).unwrap();
    }
    for f in g.fnode_ids().collect::<Vec<_>>() {
        update_fnode(&mut g, f).unwrap();
    }
    (g, hub)
}

#[test]
fn rows_and_posterior_are_normalized() {
    for domain in [Domain::Linear, Domain::Log10] {
        let (mut g, hub) = hub_graph(16, domain, true);
        update_vnode(&mut g, hub).unwrap();
        let vnode = g.vnode(hub).unwrap();
        assert_eq!(vnode.messages().rows(), 3);
        for row in vnode.messages().iter_rows() {
            assert_sums_to_one(row, 1e-12);
        }
        assert_sums_to_one(&vnode.belief_linear().unwrap(), 1e-12);
    }
}

#[test]
fn log_and_linear_agree_without_producer() {
    let (mut lin, hub) = hub_graph(32, Domain::Linear, false);
    let (mut log, _) = hub_graph(32, Domain::Log10, false);
    update_vnode(&mut lin, hub).unwrap();
    update_vnode(&mut log, hub).unwrap();

    let (l, g) = (lin.vnode(hub).unwrap(), log.vnode(hub).unwrap());
    for slot in 0..2 {
        assert_close_vec(l.messages().row(slot), g.messages().row(slot), 1e-12);
    }
    assert_close_vec(
        &l.belief_linear().unwrap(),
        &g.belief_linear().unwrap(),
        1e-12,
    );
}

#[test]
fn log_and_linear_agree_with_producer() {
    let (mut lin, hub) = hub_graph(32, Domain::Linear, true);
    let (mut log, _) = hub_graph(32, Domain::Log10, true);
    update_vnode(&mut lin, hub).unwrap();
    update_vnode(&mut log, hub).unwrap();

    let (l, g) = (lin.vnode(hub).unwrap(), log.vnode(hub).unwrap());
    assert_eq!(l.ni(), 1);
    for slot in 0..3 {
        assert_close_vec(l.messages().row(slot), g.messages().row(slot), 1e-12);
    }
    assert_close_vec(
        &l.belief_linear().unwrap(),
        &g.belief_linear().unwrap(),
        1e-12,
    );
}

#[test]
fn outgoing_message_excludes_its_own_edge() {
    for domain in [Domain::Linear, Domain::Log10] {
        let (mut g, hub) = hub_graph(16, domain, false);
        update_vnode(&mut g, hub).unwrap();
        let before_not = g.vnode(hub).unwrap().messages().row(0).to_vec();
        let before_xor = g.vnode(hub).unwrap().messages().row(1).to_vec();

        // Row 0 goes to the NOT node; it is the prior times the XOR node's message.
        let vnode = g.vnode(hub).unwrap();
        let xor_node = g.fnode(vnode.consumers()[1]).unwrap();
        let expected: Vec<f64> = vnode
            .prior()
            .iter()
            .zip(xor_node.messages().row(1))
            .map(|(p, m)| p * m)
            .collect();
        assert_close_vec(&before_not, &normalized(&expected), 1e-12);

        // New evidence through the NOT node leaves row 0 alone and moves row 1.
        let not_node = vnode.consumers()[0];
        let left = g.fnode(not_node).unwrap().output();
        g.set_prior(left, make_distribution(16, 99)).unwrap();
        update_fnode(&mut g, not_node).unwrap();
        update_vnode(&mut g, hub).unwrap();

        let messages = g.vnode(hub).unwrap().messages();
        assert_close_vec(messages.row(0), &before_not, 1e-12);
        let moved = messages
            .row(1)
            .iter()
            .zip(&before_xor)
            .map(|(x, y)| (x - y).abs())
            .fold(0.0, f64::max);
        assert!(moved > 1e-6, "row 1 unchanged ({:?})", domain);
    }
}

#[test]
fn producer_row_uses_every_consumer() {
    let (mut g, hub) = hub_graph(8, Domain::Linear, true);
    update_vnode(&mut g, hub).unwrap();
    let vnode = g.vnode(hub).unwrap();
    let mut expected = vnode.prior().to_vec();
    for (&consumer, &slot) in vnode.consumers().iter().zip(vnode.relative()) {
        let msg = g.fnode(consumer).unwrap().messages().row(slot);
        expected.iter_mut().zip(msg).for_each(|(e, m)| *e *= m);
    }
    assert_close_vec(vnode.messages().row(0), &normalized(&expected), 1e-12);
}

#[test]
fn contradictory_evidence_is_reported() {
    let mut g = FactorGraph::new(4).unwrap();
    let a = g.add_variable(vec![1.0, 0.0, 0.0, 0.0], Domain::Linear).unwrap();
    let b = g.add_variable(vec![1.0, 0.0, 0.0, 0.0], Domain::Linear).unwrap();
    let f = g.add_function(Relation::Not, &[a], b, None).unwrap();
    update_fnode(&mut g, f).unwrap();

    // b = !a puts all of b's evidence on a = 3, which a's prior rules out.
    let err = compute_vnode_update(&g, a).unwrap_err();
    assert!(matches!(err, BpError::DegenerateDistribution(_)));
    let previous = g.vnode(a).unwrap().belief().to_vec();
    assert!(update_vnode(&mut g, a).is_err());
    assert_eq!(g.vnode(a).unwrap().belief(), previous.as_slice());
}

#[test]
fn log_domain_reports_contradictory_evidence() {
    let mut g = FactorGraph::new(4).unwrap();
    let a = g.add_variable(vec![1.0, 0.0, 0.0, 0.0], Domain::Log10).unwrap();
    let b = g.add_variable(vec![1.0, 0.0, 0.0, 0.0], Domain::Log10).unwrap();
    let f = g.add_function(Relation::Not, &[a], b, None).unwrap();
    update_fnode(&mut g, f).unwrap();

    let previous = g.vnode(a).unwrap().belief().to_vec();
    let err = update_vnode(&mut g, a).unwrap_err();
    assert!(matches!(err, BpError::DegenerateDistribution(_)));
    assert_eq!(g.vnode(a).unwrap().belief(), previous.as_slice());
}

#[test]
fn tiny_prior_mass_is_not_confused_with_zero() {
    let posteriors: Vec<Vec<f64>> = [Domain::Linear, Domain::Log10]
        .into_iter()
        .map(|domain| {
            let mut g = FactorGraph::new(2).unwrap();
            let a = g.add_variable(vec![1e-299, 1.0], domain).unwrap();
            let b = g.add_variable(vec![0.0, 1.0], domain).unwrap();
            let f = g.add_function(Relation::Not, &[a], b, None).unwrap();
            update_fnode(&mut g, f).unwrap();
            update_vnode(&mut g, a).unwrap();
            g.vnode(a).unwrap().belief_linear().unwrap()
        })
        .collect();

    // b = !a and b != 0 force a = 0, however small its prior.
    assert_close_vec(&posteriors[0], &[1.0, 0.0], 1e-12);
    assert_close_vec(&posteriors[1], &posteriors[0], 1e-12);
}

#[test]
fn unknown_variable_is_reported() {
    let mut g = FactorGraph::new(4).unwrap();
    assert!(matches!(
        update_vnode(&mut g, VnodeId(3)),
        Err(BpError::UnknownVariable(VnodeId(3)))
    ));
}
