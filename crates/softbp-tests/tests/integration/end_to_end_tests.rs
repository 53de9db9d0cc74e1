use softbp_core::{
    run_belief_propagation, run_information_propagation, update_fnode, update_vnode,
    BeliefPropagationConfig, Domain, FactorGraph, Relation,
};
use softbp_tests::{assert_close_vec, make_distribution, normalized, uniform};

#[test]
fn and_gate_single_sweep() {
    let mut g = FactorGraph::new(4).unwrap();
    let a = g.add_variable(uniform(4), Domain::Linear).unwrap();
    let b = g.add_variable(uniform(4), Domain::Linear).unwrap();
    let o = g.add_variable(vec![0.7, 0.1, 0.1, 0.1], Domain::Linear).unwrap();
    g.add_function(Relation::And, &[a, b], o, None).unwrap();

    let config = BeliefPropagationConfig {
        max_iterations: 1,
        ..Default::default()
    };
    let diagnostics = run_belief_propagation(&mut g, config).unwrap();
    assert_eq!(diagnostics.iterations_run, 1);
    assert_eq!(diagnostics.variable_count, 3);
    assert_eq!(diagnostics.function_count, 1);

    let expected = [6.3 / 7.0, 0.3 / 7.0, 0.3 / 7.0, 0.1 / 7.0];
    assert_close_vec(&g.vnode(o).unwrap().belief_linear().unwrap(), &expected, 1e-12);
}

#[test]
fn manual_updates_match_single_sweep() {
    let mut g = FactorGraph::new(4).unwrap();
    let a = g.add_variable(uniform(4), Domain::Linear).unwrap();
    let b = g.add_variable(uniform(4), Domain::Linear).unwrap();
    let o = g.add_variable(vec![0.7, 0.1, 0.1, 0.1], Domain::Log10).unwrap();
    let f = g.add_function(Relation::And, &[a, b], o, None).unwrap();

    update_fnode(&mut g, f).unwrap();
    update_vnode(&mut g, o).unwrap();
    let expected = normalized(&[6.3, 0.3, 0.3, 0.1]);
    assert_close_vec(&g.vnode(o).unwrap().belief_linear().unwrap(), &expected, 1e-12);
}

/// `c = a ^ b`, `d = !c`, `e = a & d`: one loop through `a` and `d`.
fn loopy_graph(priors: &[Vec<f64>; 5], domain: Domain) -> FactorGraph {
    let mut g = FactorGraph::new(priors[0].len()).unwrap();
    let ids: Vec<_> = priors
        .iter()
        .map(|p| g.add_variable(p.clone(), domain).unwrap())
        .collect();
    g.add_function(Relation::Xor, &[ids[0], ids[1]], ids[2], None).unwrap();
    g.add_function(Relation::Not, &[ids[2]], ids[3], None).unwrap();
    g.add_function(Relation::And, &[ids[0], ids[3]], ids[4], None).unwrap();
    g
}

#[test]
fn chain_converges_to_exact_marginals() {
    let priors = [
        make_distribution(8, 1),
        make_distribution(8, 2),
        make_distribution(8, 3),
        make_distribution(8, 4),
    ];
    let mut g = FactorGraph::new(8).unwrap();
    let ids: Vec<_> = priors
        .iter()
        .map(|p| g.add_variable(p.clone(), Domain::Linear).unwrap())
        .collect();
    g.add_function(Relation::Xor, &[ids[0], ids[1]], ids[2], None).unwrap();
    g.add_function(Relation::Not, &[ids[2]], ids[3], None).unwrap();

    let diagnostics = run_belief_propagation(&mut g, Default::default()).unwrap();
    assert!(diagnostics.converged);
    assert!(diagnostics.iterations_run < diagnostics.max_iterations);

    // Enumerate a, b with c = a ^ b, d = !c.
    let mut exact = vec![vec![0.0; 8]; 4];
    for a in 0..8 {
        for b in 0..8 {
            let c = a ^ b;
            let d = !c & 7;
            let w = priors[0][a] * priors[1][b] * priors[2][c] * priors[3][d];
            exact[0][a] += w;
            exact[1][b] += w;
            exact[2][c] += w;
            exact[3][d] += w;
        }
    }
    for (id, marginal) in ids.iter().zip(&exact) {
        let belief = g.vnode(*id).unwrap().belief_linear().unwrap();
        assert_close_vec(&belief, &normalized(marginal), 1e-9);
    }
}

#[test]
fn loopy_graph_runs_in_both_domains() {
    let priors = [
        make_distribution(8, 10),
        make_distribution(8, 11),
        make_distribution(8, 12),
        make_distribution(8, 13),
        make_distribution(8, 14),
    ];
    let mut lin = loopy_graph(&priors, Domain::Linear);
    let mut log = loopy_graph(&priors, Domain::Log10);
    let config = BeliefPropagationConfig {
        max_iterations: 200,
        ..Default::default()
    };
    run_belief_propagation(&mut lin, config).unwrap();
    run_belief_propagation(&mut log, config).unwrap();

    for id in lin.vnode_ids() {
        let l = lin.vnode(id).unwrap().belief_linear().unwrap();
        let g = log.vnode(id).unwrap().belief_linear().unwrap();
        assert_close_vec(&l, &g, 1e-8);
    }
}

#[test]
fn information_metrics_stay_in_unit_interval() {
    let priors = [
        make_distribution(8, 20),
        make_distribution(8, 21),
        make_distribution(8, 22),
        make_distribution(8, 23),
        make_distribution(8, 24),
    ];
    let mut g = loopy_graph(&priors, Domain::Linear);
    run_information_propagation(&mut g, Default::default()).unwrap();
    for vnode in g.vnodes() {
        assert!((0.0..=1.0).contains(&vnode.information()));
        for row in vnode.messages().iter_rows() {
            assert!(row[0] <= 1.0);
        }
    }
}

#[test]
fn rerun_without_reset_continues_from_current_state() {
    let priors = [
        make_distribution(4, 30),
        make_distribution(4, 31),
        make_distribution(4, 32),
        make_distribution(4, 33),
        make_distribution(4, 34),
    ];
    let mut g = loopy_graph(&priors, Domain::Linear);
    let first = run_belief_propagation(&mut g, Default::default()).unwrap();
    let config = BeliefPropagationConfig {
        reset_messages: false,
        ..Default::default()
    };
    let second = run_belief_propagation(&mut g, config).unwrap();
    if first.converged {
        assert_eq!(second.iterations_run, 1);
    }
}
