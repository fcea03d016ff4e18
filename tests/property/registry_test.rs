// tests/property/registry_test.rs

//! Property-based tests checking the registry against a simple model.

use crate::test_helpers::TestContext;
use proptest::prelude::*;
use std::collections::BTreeMap;
use treeconn::core::TreeConnError;

#[derive(Debug, Clone)]
enum Op {
    Connect(&'static str),
    Disconnect(usize),
    Lookup(u32),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => prop::sample::select(vec!["docs", "media", "IPC$", "missing"]).prop_map(Op::Connect),
        2 => (0usize..16).prop_map(Op::Disconnect),
        2 => (0u32..10).prop_map(Op::Lookup),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        max_shrink_iters: 500,
        ..ProptestConfig::default()
    })]

    #[test]
    fn test_registry_matches_model(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let ctx = TestContext::with_shares(&crate::test_helpers::default_shares(), 8);
            // Model: tree id -> share name, for every registered tree.
            let mut model: BTreeMap<u32, &'static str> = BTreeMap::new();
            let mut live = Vec::new();

            for op in ops {
                match op {
                    Op::Connect(share) => match ctx.connect(share).await {
                        Ok(tree) => {
                            assert!(!model.contains_key(&tree.id()), "id {} reused while registered", tree.id());
                            model.insert(tree.id(), share);
                            live.push(tree);
                        }
                        Err(TreeConnError::NotFound) => assert_eq!(share, "missing"),
                        Err(TreeConnError::InvalidId) => assert_eq!(model.len(), 8),
                        Err(e) => panic!("unexpected connect error: {e}"),
                    },
                    Op::Disconnect(index) => {
                        if live.is_empty() {
                            continue;
                        }
                        let tree = live.remove(index % live.len());
                        ctx.disconnect(&tree).await.unwrap();
                        model.remove(&tree.id());
                    }
                    Op::Lookup(id) => {
                        let found = ctx.registry.lookup(&ctx.session, id);
                        match model.get(&id) {
                            Some(share) => {
                                let claim = found.expect("registered tree not found");
                                assert!(claim.share_name().unwrap().eq_ignore_ascii_case(share));
                            }
                            None => assert!(found.is_none()),
                        }
                    }
                }

                assert_eq!(ctx.session.tree_conn_count(), model.len());
                assert_eq!(ctx.ids.in_use(), model.len());
            }

            let report = ctx.registry.logoff_session(&ctx.session).await;
            assert!(report.is_ok());
            assert_eq!(report.disconnected, model.len());
            ctx.assert_clean();
        });
    }
}
