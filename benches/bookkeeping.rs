//! Benchmarks for bookkeeping and fragment identification.

use std::collections::BTreeSet;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use actiongraph::attrs::{EdgeAttrs, MetaType, NodeData};
use actiongraph::bookkeeping::Bookkeeper;
use actiongraph::diagnostics::Diagnostics;
use actiongraph::identify::{EntityIdentifier, FragmentQuery};
use actiongraph::store::{MemoryGraphStore, NodeId, TypedGraphStore};

/// One protoform with 20 regions, 40 sites and 200 residues, some of them
/// sharing a location.
fn populated_graph() -> (MemoryGraphStore, NodeId, BTreeSet<NodeId>) {
    let mut g = MemoryGraphStore::new();
    let p = g.add_node(NodeData::protoform("P00533"));
    let mut touched = BTreeSet::from([p]);
    for i in 0..20i64 {
        let r = g.add_node(NodeData::region(format!("region {i}")));
        g.add_edge(r, p, EdgeAttrs::range(i * 60, i * 60 + 80)).unwrap();
        touched.insert(r);
    }
    for i in 0..40i64 {
        let s = g.add_node(NodeData::site(format!("site {i}")));
        g.add_edge(s, p, EdgeAttrs::range(i * 30, i * 30 + 10)).unwrap();
        touched.insert(s);
    }
    for i in 0..200i64 {
        let x = g.add_node(NodeData::residue('Y'));
        g.add_edge(x, p, EdgeAttrs::at((i * 7) % 1200)).unwrap();
        touched.insert(x);
    }
    (g, p, touched)
}

fn bench_apply_bookkeeping(c: &mut Criterion) {
    let (graph, p, touched) = populated_graph();
    let protoforms = BTreeSet::from([p]);

    c.bench_function("apply_bookkeeping_260_nodes", |bench| {
        bench.iter(|| {
            let mut g = graph.clone();
            black_box(
                Bookkeeper::new(&mut g)
                    .apply_bookkeeping(&touched, &protoforms)
                    .unwrap(),
            )
        })
    });
}

fn bench_identify_region(c: &mut Criterion) {
    let (graph, p, _) = populated_graph();
    let query = FragmentQuery::named("region 7").with_range(425, 440);

    c.bench_function("identify_region_20_candidates", |bench| {
        bench.iter(|| {
            let ident = EntityIdentifier::new(&graph);
            let mut diag = Diagnostics::new();
            black_box(ident.identify_region(&query, p, &mut diag).unwrap())
        })
    });
}

fn bench_ancestors(c: &mut Criterion) {
    let (graph, p, _) = populated_graph();

    c.bench_function("ancestors_of_type_residue", |bench| {
        bench.iter(|| {
            black_box(
                EntityIdentifier::new(&graph)
                    .ancestors_of_type(p, MetaType::Residue)
                    .unwrap(),
            )
        })
    });
}

criterion_group!(
    benches,
    bench_apply_bookkeeping,
    bench_identify_region,
    bench_ancestors
);
criterion_main!(benches);
