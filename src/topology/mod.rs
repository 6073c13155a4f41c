//! Topology document model and resolution
//!
//! Answers "which cluster owns this database", "which host serves this
//! cluster as master/slave", and expands credentials through the layered
//! override maps. Resolution that needs a live query (the control-database
//! fallback) lives in the router, not here.

pub mod document;

use indexmap::IndexMap;
use log::debug;
use rand::Rng;

pub use document::{
    ClusterMap, GlobalConfig, GroupLoads, HostSpec, ServerTemplate, TemplateOverride,
    TopologyDocument, ENV_TOPOLOGY_FILE,
};

#[derive(Debug, thiserror::Error)]
pub enum TopologyError {
    #[error("no topology file given and DBROUTE_DB_YML is not set")]
    NoConfigFile,

    #[error("failed to read topology file '{0}': {1}")]
    FileRead(String, String),

    #[error("failed to parse topology document '{0}': {1}")]
    Parse(String, String),

    #[error("unknown cluster '{0}'")]
    UnknownCluster(String),

    #[error("cluster '{0}' has no hosts")]
    EmptyCluster(String),
}

/// Fully expanded connection target, ready to hand to the driver.
/// Built fresh per connection request, never cached.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionDetails {
    pub hostname: String,
    pub username: String,
    pub password: String,
    pub dbname: String,
    pub cluster: String,
    pub master: bool,
}

impl ConnectionDetails {
    /// One-line description with the password left out, for log records.
    pub fn describe(&self) -> String {
        format!(
            "host={} dbname={} cluster={} master={} user={}",
            self.hostname, self.dbname, self.cluster, self.master, self.username
        )
    }
}

/// Credentials after layered override resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedCredentials {
    pub dbname: String,
    pub username: String,
    pub password: String,
}

pub struct TopologyConfig {
    doc: TopologyDocument,
    service_name: Option<String>,
}

impl TopologyConfig {
    pub fn new(doc: TopologyDocument) -> Self {
        Self {
            doc,
            service_name: None,
        }
    }

    /// Service identity used for the service-level credential override.
    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    pub fn document(&self) -> &TopologyDocument {
        &self.doc
    }

    /// Looks `dbname` up in the static `sectionsByDB` map only.
    pub fn static_cluster_for(&self, dbname: &str) -> Option<&str> {
        self.doc
            .global
            .sections_by_db
            .get(dbname)
            .map(String::as_str)
    }

    /// Picks a host in the main pool: the master (index 0) when asked for
    /// the master or when the cluster has a single host, otherwise a
    /// uniformly random slave. Weighting is a failover-ordering concern and
    /// deliberately plays no part here.
    pub fn host_for_cluster<R: Rng>(
        &self,
        cluster: &str,
        master: bool,
        rng: &mut R,
    ) -> Result<&HostSpec, TopologyError> {
        let hosts = self
            .doc
            .clusters
            .get(cluster)
            .ok_or_else(|| TopologyError::UnknownCluster(cluster.to_string()))?;
        pick_host(cluster, hosts, master, rng)
    }

    /// Same selection against the external pool, addressed directly by
    /// pseudo-cluster name.
    pub fn external_host<R: Rng>(
        &self,
        cluster: &str,
        master: bool,
        rng: &mut R,
    ) -> Result<&HostSpec, TopologyError> {
        let hosts = self
            .doc
            .external
            .get(cluster)
            .ok_or_else(|| TopologyError::UnknownCluster(cluster.to_string()))?;
        pick_host(cluster, hosts, master, rng)
    }

    /// The weight table of the first requested group the cluster defines.
    pub fn group_weights(&self, cluster: &str, groups: &[String]) -> Option<IndexMap<String, u32>> {
        let by_group = self.doc.global.group_loads.get(cluster)?;
        for group in groups {
            if let Some(weights) = by_group.get(group) {
                debug!("group_weights(): cluster={} group={} hosts={}", cluster, group, weights.len());
                return Some(weights.clone());
            }
        }
        None
    }

    /// Expands credentials for a resolved host. Explicit username AND
    /// password bypass the override layers entirely.
    pub fn resolve_credentials(
        &self,
        hostname: &str,
        dbname: &str,
        cluster: &str,
        username: Option<&str>,
        password: Option<&str>,
    ) -> ResolvedCredentials {
        if let (Some(user), Some(pass)) = (username, password) {
            return ResolvedCredentials {
                dbname: dbname.to_string(),
                username: user.to_string(),
                password: pass.to_string(),
            };
        }

        let global = &self.doc.global;
        resolve_layered(
            &global.server_template,
            global.overrides_by_cluster.get(cluster),
            global.overrides_by_host.get(hostname),
            self.service_name
                .as_deref()
                .and_then(|name| global.overrides_by_service.get(name)),
            dbname,
        )
    }

    /// Assembles a full [`ConnectionDetails`] for a resolved host.
    pub fn connection_details(
        &self,
        hostname: &str,
        dbname: &str,
        cluster: &str,
        master: bool,
        username: Option<&str>,
        password: Option<&str>,
    ) -> ConnectionDetails {
        let creds = self.resolve_credentials(hostname, dbname, cluster, username, password);
        ConnectionDetails {
            hostname: hostname.to_string(),
            username: creds.username,
            password: creds.password,
            dbname: creds.dbname,
            cluster: cluster.to_string(),
            master,
        }
    }
}

/// Pure layered resolution: template, then cluster override, then host
/// override, then service override. Each layer only replaces the keys it
/// defines. The service layer is consulted only when a host override
/// matched, and never touches `dbname` (legacy precedence, kept).
fn resolve_layered(
    template: &ServerTemplate,
    cluster_override: Option<&TemplateOverride>,
    host_override: Option<&TemplateOverride>,
    service_override: Option<&TemplateOverride>,
    dbname: &str,
) -> ResolvedCredentials {
    let mut username = template.user.clone();
    let mut password = template.password.clone();
    let mut dbname = dbname.to_string();

    if let Some(o) = cluster_override {
        if let Some(user) = &o.user {
            username = user.clone();
        }
        if let Some(pass) = &o.password {
            password = pass.clone();
        }
        if let Some(db) = &o.dbname {
            dbname = db.clone();
        }
    }

    let host_matched = host_override.is_some();
    if let Some(o) = host_override {
        if let Some(user) = &o.user {
            username = user.clone();
        }
        if let Some(pass) = &o.password {
            password = pass.clone();
        }
        if let Some(db) = &o.dbname {
            dbname = db.clone();
        }
    }

    if host_matched {
        if let Some(o) = service_override {
            if let Some(user) = &o.user {
                username = user.clone();
            }
            if let Some(pass) = &o.password {
                password = pass.clone();
            }
        }
    }

    ResolvedCredentials {
        dbname,
        username,
        password,
    }
}

fn pick_host<'a, R: Rng>(
    cluster: &str,
    hosts: &'a [HostSpec],
    master: bool,
    rng: &mut R,
) -> Result<&'a HostSpec, TopologyError> {
    if hosts.is_empty() {
        return Err(TopologyError::EmptyCluster(cluster.to_string()));
    }
    let index = if master || hosts.len() <= 1 {
        0
    } else {
        rng.gen_range(1..hosts.len())
    };
    Ok(&hosts[index])
}
