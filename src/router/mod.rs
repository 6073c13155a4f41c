//! Database router
//!
//! Orchestrates one connection request end to end: resolve the owning
//! cluster (querying the control database for names absent from the static
//! map), pick a host, expand credentials, connect. Replica-group requests
//! get weighted random failover across the group's remaining candidates.

use indexmap::IndexMap;
use log::{debug, warn};
use rand::Rng;

use crate::executor::{Connection, ConnectionError, Driver, DriverError};
use crate::sql::{SqlArgs, SqlValue};
use crate::topology::{ConnectionDetails, TopologyConfig, TopologyError};

/// The well-known database holding the dbname → cluster directory. It must
/// always be resolvable through the static map, never through the directory
/// lookup itself.
pub const CONTROL_DATABASE: &str = "wikicities";

const SECTION_LOOKUP_SQL: &str =
    "SELECT city_cluster FROM city_list WHERE city_dbname = %(db_name)s";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Role {
    Master,
    #[default]
    Slave,
}

impl Role {
    pub fn is_master(self) -> bool {
        self == Role::Master
    }
}

/// One connection request.
#[derive(Debug, Clone, Default)]
pub struct ConnectRequest {
    pub dbname: String,
    pub role: Role,
    pub groups: Vec<String>,
    pub override_dbname: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub external: bool,
}

impl ConnectRequest {
    pub fn new(dbname: impl Into<String>) -> Self {
        Self {
            dbname: dbname.into(),
            ..Default::default()
        }
    }

    pub fn master(mut self) -> Self {
        self.role = Role::Master;
        self
    }

    /// Adds a replica group to try; the first one the cluster defines wins.
    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.groups.push(group.into());
        self
    }

    /// Connects with this database name instead of the resolved one
    /// (useful when creating a database that does not exist yet).
    pub fn override_dbname(mut self, dbname: impl Into<String>) -> Self {
        self.override_dbname = Some(dbname.into());
        self
    }

    /// Explicit credentials; both must be given or they are void.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Addresses the external pool directly by pseudo-cluster name.
    pub fn external(mut self) -> Self {
        self.external = true;
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("could not find database '{0}'")]
    UnknownDatabase(String),

    #[error("no reachable server for cluster '{cluster}' after {attempts} attempt(s)")]
    NoReachableServer { cluster: String, attempts: usize },

    #[error("control database '{0}' is not mapped in sectionsByDB")]
    ControlDatabaseNotConfigured(String),

    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("driver error: {0}")]
    Driver(#[from] DriverError),
}

pub struct DatabaseRouter<D: Driver> {
    topology: TopologyConfig,
    driver: D,
    dc_override: Option<String>,
}

impl<D: Driver> DatabaseRouter<D> {
    pub fn new(topology: TopologyConfig, driver: D) -> Self {
        Self {
            topology,
            driver,
            dc_override: None,
        }
    }

    /// Rewrites resolved consul hostnames into the given datacenter.
    pub fn with_dc_override(mut self, dc: impl Into<String>) -> Self {
        self.dc_override = Some(dc.into());
        self
    }

    pub fn topology(&self) -> &TopologyConfig {
        &self.topology
    }

    pub fn connect(&self, request: &ConnectRequest) -> Result<Connection<D::Handle>, RouterError> {
        debug!(
            "connect(): dbname={} role={:?} groups={:?} external={}",
            request.dbname, request.role, request.groups, request.external
        );

        if request.external {
            let host = self
                .topology
                .external_host(&request.dbname, request.role.is_master(), &mut rand::thread_rng())?
                .name
                .clone();
            let details = self.details_for(&host, &request.dbname, request);
            return self.connect_details(details);
        }

        let cluster = self.cluster_for_database(&request.dbname)?;

        if request.role == Role::Slave && !request.groups.is_empty() {
            if let Some(weights) = self.topology.group_weights(&cluster, &request.groups) {
                return self.connect_any(&cluster, weights, request);
            }
        }

        let host = self
            .topology
            .host_for_cluster(&cluster, request.role.is_master(), &mut rand::thread_rng())?
            .name
            .clone();
        let details = self.details_for(&host, &cluster, request);
        // single deterministic host, no fallback pool
        self.connect_details(details)
    }

    /// Resolves routing without connecting.
    pub fn connection_details(&self, request: &ConnectRequest) -> Result<ConnectionDetails, RouterError> {
        if request.external {
            let host = self
                .topology
                .external_host(&request.dbname, request.role.is_master(), &mut rand::thread_rng())?
                .name
                .clone();
            return Ok(self.rewrite_dc(self.details_for(&host, &request.dbname, request)));
        }
        let cluster = self.cluster_for_database(&request.dbname)?;
        let host = self
            .topology
            .host_for_cluster(&cluster, request.role.is_master(), &mut rand::thread_rng())?
            .name
            .clone();
        Ok(self.rewrite_dc(self.details_for(&host, &cluster, request)))
    }

    /// Resolves the owning cluster: static `sectionsByDB` map first, then
    /// the control-database directory.
    pub fn cluster_for_database(&self, dbname: &str) -> Result<String, RouterError> {
        if let Some(cluster) = self.topology.static_cluster_for(dbname) {
            return Ok(cluster.to_string());
        }
        self.cluster_from_control_database(dbname)
    }

    fn cluster_from_control_database(&self, dbname: &str) -> Result<String, RouterError> {
        // The static map is the sole base case of this recursion: the
        // control database itself must never fall through to here.
        if dbname == CONTROL_DATABASE {
            return Err(RouterError::ControlDatabaseNotConfigured(dbname.to_string()));
        }
        if self.topology.static_cluster_for(CONTROL_DATABASE).is_none() {
            return Err(RouterError::ControlDatabaseNotConfigured(
                CONTROL_DATABASE.to_string(),
            ));
        }

        debug!(
            "resolving cluster for '{}' via {}",
            dbname, CONTROL_DATABASE
        );
        let mut conn = self.connect(&ConnectRequest::new(CONTROL_DATABASE))?;
        let mut args = SqlArgs::new();
        args.insert("db_name".to_string(), SqlValue::from(dbname));
        let result = conn.query(SECTION_LOOKUP_SQL, &args)?;
        conn.close()?;

        let cell = result
            .rows
            .first()
            .and_then(|row| row.first())
            .ok_or_else(|| RouterError::UnknownDatabase(dbname.to_string()))?;
        let raw = cell
            .as_str()
            .ok_or_else(|| RouterError::UnknownDatabase(dbname.to_string()))?;
        let cluster = decode_serialized_scalar(raw);
        debug!("'{}' lives on cluster '{}'", dbname, cluster);
        Ok(cluster.to_string())
    }

    /// Weighted random failover: draw among the remaining candidates by
    /// weight, drop a candidate on connect failure, stop when one connects
    /// or the pool (or its total weight) is exhausted.
    fn connect_any(
        &self,
        cluster: &str,
        mut weights: IndexMap<String, u32>,
        request: &ConnectRequest,
    ) -> Result<Connection<D::Handle>, RouterError> {
        let mut rng = rand::thread_rng();
        let mut attempts = 0;

        while let Some(host) = weighted_pick(&weights, &mut rng).map(str::to_string) {
            attempts += 1;
            let details = self.rewrite_dc(self.details_for(&host, cluster, request));
            match self.driver.connect(&details) {
                Ok(handle) => {
                    debug!("connect_any(): connected to {}", host);
                    return Ok(Connection::new(handle, Some(details)));
                }
                Err(e) => {
                    warn!("connect_any(): {} failed: {}", host, e);
                    weights.shift_remove(&host);
                }
            }
        }

        Err(RouterError::NoReachableServer {
            cluster: cluster.to_string(),
            attempts,
        })
    }

    fn connect_details(
        &self,
        details: ConnectionDetails,
    ) -> Result<Connection<D::Handle>, RouterError> {
        let details = self.rewrite_dc(details);
        debug!("connecting: {}", details.describe());
        let handle = self.driver.connect(&details)?;
        Ok(Connection::new(handle, Some(details)))
    }

    fn details_for(&self, host: &str, cluster: &str, request: &ConnectRequest) -> ConnectionDetails {
        let mut details = self.topology.connection_details(
            host,
            &request.dbname,
            cluster,
            request.role.is_master(),
            request.username.as_deref(),
            request.password.as_deref(),
        );
        if let Some(dbname) = &request.override_dbname {
            details.dbname = dbname.clone();
        }
        details
    }

    fn rewrite_dc(&self, mut details: ConnectionDetails) -> ConnectionDetails {
        if let Some(dc) = &self.dc_override {
            details.hostname = details
                .hostname
                .replace(".service.consul", &format!(".service.{}.consul", dc));
        }
        details
    }
}

/// One weighted draw over the candidate table. Returns `None` when the
/// total weight is zero, so a pool of zero-weight stragglers counts as
/// exhausted.
fn weighted_pick<'a, R: Rng>(weights: &'a IndexMap<String, u32>, rng: &mut R) -> Option<&'a str> {
    let total: u64 = weights.values().map(|w| u64::from(*w)).sum();
    if total == 0 {
        return None;
    }
    let draw = rng.gen_range(0..total);
    let mut up_to = 0u64;
    for (name, weight) in weights {
        up_to += u64::from(*weight);
        if up_to > draw {
            return Some(name);
        }
    }
    None
}

/// The control directory may store the cluster name as a PHP-serialized
/// string (`s:2:"c2";`); plain names pass through unchanged.
fn decode_serialized_scalar(raw: &str) -> &str {
    if let Some(rest) = raw.strip_prefix("s:") {
        if let Some((len, tail)) = rest.split_once(':') {
            if let (Ok(len), Some(inner)) = (
                len.parse::<usize>(),
                tail.strip_prefix('"').and_then(|t| t.strip_suffix("\";")),
            ) {
                if inner.len() == len {
                    return inner;
                }
            }
        }
    }
    raw
}
