#![allow(dead_code)]

use std::sync::{Arc, Mutex, MutexGuard};

use dbroute::{
    ConnectionDetails, DatabaseRouter, Driver, DriverError, RawHandle, RawResult, SqlArgs,
    SqlValue, TopologyConfig, TopologyDocument,
};

/// Topology used across the integration suites: a control cluster, a
/// sharded cluster with replica groups, and an external archive pool.
pub const SAMPLE_TOPOLOGY: &str = r#"
- sectionsByDB:
    wikicities: central
    knowncity: c2
  serverTemplate:
    user: mwuser
    password: mwpass
  templateOverridesByCluster:
    c2:
      user: c2user
  templateOverridesByServer:
    db2-slave1.service.consul:
      password: hostpass
      dbname: hostdb
  groupLoadsBySection:
    c2:
      vslow:
        repl-a: 1
        repl-b: 0
        repl-c: 3
      allfail:
        bad-x: 1
        bad-y: 2
        bad-z: 3
- central:
    - ctrl-master
    - ctrl-slave
  c2:
    - db2-master.service.consul
    - db2-slave1.service.consul
    - db2-slave2.service.consul
- archive:
    - db-archive
"#;

/// Same document without a static entry for the control database.
pub const TOPOLOGY_WITHOUT_CONTROL: &str = r#"
- sectionsByDB:
    knowncity: c2
  serverTemplate:
    user: mwuser
    password: mwpass
- c2:
    - db2-master.service.consul
    - db2-slave1.service.consul
- {}
"#;

#[derive(Debug, Default)]
pub struct FakeState {
    /// Hostnames that refuse every connection attempt.
    pub failing_hosts: Vec<String>,
    /// Every hostname handed to `connect`, in order.
    pub attempts: Vec<String>,
    /// Details of successful connections, in order.
    pub connected: Vec<ConnectionDetails>,
    /// Rows served for the control-directory lookup query.
    pub control_rows: Vec<Vec<SqlValue>>,
    /// How many control-directory lookups ran.
    pub control_queries: usize,
    /// Every executed statement, in order.
    pub executed: Vec<String>,
    /// Statements containing a substring fail with the given driver code.
    pub statement_errors: Vec<(String, u32)>,
    pub commits: usize,
    pub closes: usize,
}

/// Injected connect collaborator recording everything it is asked to do.
#[derive(Clone, Default)]
pub struct FakeDriver {
    state: Arc<Mutex<FakeState>>,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn fail_host(&self, host: &str) {
        self.state().failing_hosts.push(host.to_string());
    }

    pub fn serve_control_row(&self, cluster_cell: &str) {
        self.state()
            .control_rows
            .push(vec![SqlValue::from(cluster_cell)]);
    }

    pub fn fail_statement(&self, needle: &str, code: u32) {
        self.state()
            .statement_errors
            .push((needle.to_string(), code));
    }

    /// A standalone handle for exercising `Connection` without a router.
    pub fn handle(&self) -> FakeHandle {
        FakeHandle {
            state: self.state.clone(),
        }
    }
}

#[derive(Debug)]
pub struct FakeHandle {
    state: Arc<Mutex<FakeState>>,
}

impl Driver for FakeDriver {
    type Handle = FakeHandle;

    fn connect(&self, details: &ConnectionDetails) -> Result<FakeHandle, DriverError> {
        let mut state = self.state.lock().unwrap();
        state.attempts.push(details.hostname.clone());
        if state.failing_hosts.iter().any(|h| h == &details.hostname) {
            return Err(DriverError::new(format!(
                "cannot reach {}",
                details.hostname
            )));
        }
        state.connected.push(details.clone());
        Ok(FakeHandle {
            state: self.state.clone(),
        })
    }
}

impl RawHandle for FakeHandle {
    fn execute(&mut self, sql: &str, _args: &SqlArgs) -> Result<RawResult, DriverError> {
        let mut state = self.state.lock().unwrap();
        state.executed.push(sql.to_string());

        for (needle, code) in &state.statement_errors {
            if sql.contains(needle.as_str()) {
                let code = *code;
                let needle = needle.clone();
                return Err(DriverError::with_code(
                    code,
                    format!("duplicate: {}", needle),
                ));
            }
        }

        if sql.starts_with("SELECT city_cluster") {
            state.control_queries += 1;
            let rows = state.control_rows.clone();
            return Ok(RawResult {
                affected: rows.len() as u64,
                columns: vec!["city_cluster".to_string()],
                rows,
            });
        }

        Ok(RawResult::default())
    }

    fn last_insert_id(&mut self) -> Result<u64, DriverError> {
        Ok(42)
    }

    fn commit(&mut self) -> Result<(), DriverError> {
        self.state.lock().unwrap().commits += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), DriverError> {
        self.state.lock().unwrap().closes += 1;
        Ok(())
    }
}

pub fn sample_router(driver: FakeDriver) -> DatabaseRouter<FakeDriver> {
    router_for(SAMPLE_TOPOLOGY, driver)
}

pub fn router_for(topology: &str, driver: FakeDriver) -> DatabaseRouter<FakeDriver> {
    let doc = TopologyDocument::from_yaml(topology, "test").expect("test topology parses");
    DatabaseRouter::new(TopologyConfig::new(doc), driver)
}
