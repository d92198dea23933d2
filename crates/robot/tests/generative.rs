//! Property tests over generated dependency DAGs: reconfiguration is
//! idempotent and round-trips.

mod support;

use proptest::prelude::*;

use support::{component, config_of, sensor_api, Fixture};

/// Build a config of six sensors whose dependency edges come from the
/// bit vector; edges always point from a lower index to a higher one,
/// so every generated document is acyclic.
fn generated_config(edge_bits: &[bool]) -> chassis_config::Config {
    let names: Vec<String> = (0..6).map(|i| format!("n{i}")).collect();
    let mut components = Vec::new();
    let mut bit = 0;
    for i in 0..6 {
        let mut deps: Vec<String> = Vec::new();
        for j in (i + 1)..6 {
            if edge_bits[bit] {
                deps.push(names[j].clone());
            }
            bit += 1;
        }
        let dep_refs: Vec<&str> = deps.iter().map(String::as_str).collect();
        components.push(component(&sensor_api(), &names[i], &dep_refs));
    }
    config_of(components)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(10))]

    #[test]
    fn reconfigure_twice_is_a_no_op(edge_bits in proptest::collection::vec(any::<bool>(), 15)) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime");
        let (first_names, second_names, builds_first, builds_second) = rt.block_on(async {
            let fixture = Fixture::new();
            let robot = fixture.robot();
            let config = generated_config(&edge_bits);

            robot.reconfigure(config.clone()).await.expect("first apply");
            let first_names = robot.resource_names();
            let builds_first = fixture.recorder.with_prefix("build:").len();

            robot.reconfigure(config).await.expect("second apply");
            let second_names = robot.resource_names();
            let builds_second = fixture.recorder.with_prefix("build:").len();

            robot.close().await.expect("close");
            (first_names, second_names, builds_first, builds_second)
        });

        prop_assert_eq!(first_names, second_names);
        prop_assert_eq!(builds_first, 6);
        prop_assert_eq!(builds_first, builds_second);
    }

    #[test]
    fn a_b_a_round_trips(edge_bits in proptest::collection::vec(any::<bool>(), 15)) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime");
        let (names_a, names_a_again, close_order_is_reverse_topo) = rt.block_on(async {
            let fixture = Fixture::new();
            let robot = fixture.robot();
            let config_a = generated_config(&edge_bits);
            let config_b = config_of(vec![component(&sensor_api(), "other", &[])]);

            robot.reconfigure(config_a.clone()).await.expect("apply a");
            let names_a = robot.resource_names();

            robot.reconfigure(config_b).await.expect("apply b");
            robot.reconfigure(config_a.clone()).await.expect("apply a again");
            let names_a_again = robot.resource_names();

            robot.close().await.expect("close");

            // Dependents close before their dependencies. Instances are
            // closed more than once across the b detour, so compare the
            // final teardown's (last) close of each name.
            let closes = fixture.recorder.with_prefix("close:");
            let mut ok = true;
            for resource in &config_a.components {
                let this = format!("close:{}", resource.name);
                let Some(this_last) = closes.iter().rposition(|c| c == &this) else {
                    continue;
                };
                for dep in &resource.depends_on {
                    let dep_entry = format!("close:{dep}");
                    if let Some(dep_last) = closes.iter().rposition(|c| c == &dep_entry) {
                        ok &= this_last < dep_last;
                    }
                }
            }
            (names_a, names_a_again, ok)
        });

        prop_assert_eq!(names_a, names_a_again);
        prop_assert!(close_order_is_reverse_topo);
    }
}
