mod common;

use common::{sample_router, router_for, FakeDriver, SAMPLE_TOPOLOGY, TOPOLOGY_WITHOUT_CONTROL};
use dbroute::{ConnectRequest, RouterError};

#[test]
fn static_resolution_issues_no_control_query() {
    let driver = FakeDriver::new();
    let router = sample_router(driver.clone());

    let conn = router
        .connect(&ConnectRequest::new("knowncity").master())
        .unwrap();

    let info = conn.info().unwrap();
    assert_eq!(info.cluster, "c2");
    assert_eq!(info.hostname, "db2-master.service.consul");
    assert!(info.master);
    assert_eq!(driver.state().control_queries, 0);
}

#[test]
fn slave_request_avoids_the_master() {
    let driver = FakeDriver::new();
    let router = sample_router(driver.clone());

    for _ in 0..20 {
        let conn = router.connect(&ConnectRequest::new("knowncity")).unwrap();
        let host = conn.info().unwrap().hostname.clone();
        assert_ne!(host, "db2-master.service.consul");
        assert!(host.starts_with("db2-slave"));
    }
}

#[test]
fn single_host_cluster_serves_slave_requests_from_the_master() {
    let driver = FakeDriver::new();
    let router = sample_router(driver.clone());

    // central has two hosts but archive (external) has one
    let conn = router
        .connect(&ConnectRequest::new("archive").external())
        .unwrap();
    assert_eq!(conn.info().unwrap().hostname, "db-archive");
    assert_eq!(conn.info().unwrap().cluster, "archive");
}

#[test]
fn unknown_database_resolves_through_the_control_directory() {
    let driver = FakeDriver::new();
    driver.serve_control_row("s:2:\"c2\";");
    let router = sample_router(driver.clone());

    let conn = router
        .connect(&ConnectRequest::new("unknowncity").master())
        .unwrap();

    assert_eq!(conn.info().unwrap().cluster, "c2");
    assert_eq!(conn.info().unwrap().dbname, "unknowncity");
    let state = driver.state();
    assert_eq!(state.control_queries, 1);
    // the control connection was opened against the central cluster and closed
    assert!(state
        .connected
        .iter()
        .any(|details| details.cluster == "central"));
    assert_eq!(state.closes, 1);
}

#[test]
fn plain_cluster_names_from_the_directory_also_work() {
    let driver = FakeDriver::new();
    driver.serve_control_row("c2");
    let router = sample_router(driver.clone());

    let cluster = router.cluster_for_database("unknowncity").unwrap();
    assert_eq!(cluster, "c2");
}

#[test]
fn empty_directory_result_is_unknown_database() {
    let driver = FakeDriver::new();
    let router = sample_router(driver.clone());

    let err = router
        .connect(&ConnectRequest::new("unknowncity"))
        .unwrap_err();

    assert!(matches!(err, RouterError::UnknownDatabase(name) if name == "unknowncity"));
    assert_eq!(driver.state().control_queries, 1);
}

#[test]
fn control_database_itself_never_recurses() {
    let driver = FakeDriver::new();
    let router = router_for(TOPOLOGY_WITHOUT_CONTROL, driver.clone());

    let err = router
        .connect(&ConnectRequest::new("wikicities"))
        .unwrap_err();

    assert!(matches!(err, RouterError::ControlDatabaseNotConfigured(_)));
    assert_eq!(driver.state().control_queries, 0);
    assert!(driver.state().attempts.is_empty());
}

#[test]
fn missing_control_mapping_fails_before_any_lookup() {
    let driver = FakeDriver::new();
    let router = router_for(TOPOLOGY_WITHOUT_CONTROL, driver.clone());

    let err = router
        .connect(&ConnectRequest::new("unknowncity"))
        .unwrap_err();

    assert!(matches!(err, RouterError::ControlDatabaseNotConfigured(_)));
    assert_eq!(driver.state().control_queries, 0);
}

#[test]
fn group_failover_lands_on_a_surviving_replica() {
    let driver = FakeDriver::new();
    driver.fail_host("repl-a");
    driver.fail_host("repl-b");
    let router = sample_router(driver.clone());

    let conn = router
        .connect(&ConnectRequest::new("knowncity").group("vslow"))
        .unwrap();

    assert_eq!(conn.info().unwrap().hostname, "repl-c");
    let state = driver.state();
    // repl-b has weight 0 and is never drawn, so at most two attempts
    assert!(state.attempts.len() <= 2);
    assert!(!state.attempts.iter().any(|h| h == "repl-b"));
}

#[test]
fn group_failover_exhausts_after_one_attempt_per_candidate() {
    let driver = FakeDriver::new();
    driver.fail_host("bad-x");
    driver.fail_host("bad-y");
    driver.fail_host("bad-z");
    let router = sample_router(driver.clone());

    let err = router
        .connect(&ConnectRequest::new("knowncity").group("allfail"))
        .unwrap_err();

    match err {
        RouterError::NoReachableServer { cluster, attempts } => {
            assert_eq!(cluster, "c2");
            assert_eq!(attempts, 3);
        }
        other => panic!("expected NoReachableServer, got {:?}", other),
    }
    assert_eq!(driver.state().attempts.len(), 3);
}

#[test]
fn unknown_group_falls_back_to_the_plain_slave_path() {
    let driver = FakeDriver::new();
    let router = sample_router(driver.clone());

    let conn = router
        .connect(&ConnectRequest::new("knowncity").group("nosuch"))
        .unwrap();

    assert!(conn.info().unwrap().hostname.starts_with("db2-slave"));
    assert_eq!(driver.state().attempts.len(), 1);
}

#[test]
fn single_host_path_does_not_retry_on_failure() {
    let driver = FakeDriver::new();
    driver.fail_host("db2-master.service.consul");
    let router = sample_router(driver.clone());

    let err = router
        .connect(&ConnectRequest::new("knowncity").master())
        .unwrap_err();

    assert!(matches!(err, RouterError::Driver(_)));
    assert_eq!(driver.state().attempts.len(), 1);
}

#[test]
fn explicit_credentials_are_used_verbatim() {
    let driver = FakeDriver::new();
    let router = sample_router(driver.clone());

    let conn = router
        .connect(
            &ConnectRequest::new("knowncity")
                .master()
                .credentials("me", "secret"),
        )
        .unwrap();

    let info = conn.info().unwrap();
    assert_eq!(info.username, "me");
    assert_eq!(info.password, "secret");
    assert_eq!(info.dbname, "knowncity");
}

#[test]
fn override_layers_apply_on_the_resolved_host() {
    let driver = FakeDriver::new();
    let router = sample_router(driver.clone());

    // force the host with a server-level override by failing nothing and
    // retrying until the slave pick lands on db2-slave1
    for _ in 0..50 {
        let conn = router.connect(&ConnectRequest::new("knowncity")).unwrap();
        let info = conn.info().unwrap().clone();
        assert_eq!(info.username, "c2user");
        if info.hostname == "db2-slave1.service.consul" {
            assert_eq!(info.password, "hostpass");
            assert_eq!(info.dbname, "hostdb");
            return;
        }
        assert_eq!(info.password, "mwpass");
    }
    panic!("uniform slave pick never chose db2-slave1");
}

#[test]
fn override_dbname_is_applied_last() {
    let driver = FakeDriver::new();
    let router = sample_router(driver.clone());

    let conn = router
        .connect(
            &ConnectRequest::new("knowncity")
                .master()
                .override_dbname("newdb"),
        )
        .unwrap();

    assert_eq!(conn.info().unwrap().dbname, "newdb");
}

#[test]
fn dc_override_rewrites_consul_hostnames() {
    let driver = FakeDriver::new();
    let router = sample_router(driver.clone()).with_dc_override("sjc");

    let conn = router
        .connect(&ConnectRequest::new("knowncity").master())
        .unwrap();

    assert_eq!(
        conn.info().unwrap().hostname,
        "db2-master.service.sjc.consul"
    );
}

#[test]
fn connection_details_resolve_without_connecting() {
    let driver = FakeDriver::new();
    let router = sample_router(driver.clone());

    let details = router
        .connection_details(&ConnectRequest::new("knowncity").master())
        .unwrap();

    assert_eq!(details.hostname, "db2-master.service.consul");
    assert!(driver.state().attempts.is_empty());
}

#[test]
fn external_pool_is_addressed_by_pseudo_cluster_name() {
    let driver = FakeDriver::new();
    let router = sample_router(driver.clone());

    let err = router
        .connect(&ConnectRequest::new("nosuchpool").external())
        .unwrap_err();
    assert!(matches!(err, RouterError::Topology(_)));

    let conn = router
        .connect(&ConnectRequest::new("archive").external().master())
        .unwrap();
    let info = conn.info().unwrap();
    assert_eq!(info.hostname, "db-archive");
    assert_eq!(info.username, "mwuser");
}

#[test]
fn topology_without_groups_parses_and_routes() {
    let driver = FakeDriver::new();
    let router = router_for(SAMPLE_TOPOLOGY, driver.clone());
    let cluster = router.cluster_for_database("knowncity").unwrap();
    assert_eq!(cluster, "c2");
}
