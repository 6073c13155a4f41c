use indexmap::IndexMap;
use log::debug;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::fs;

use super::TopologyError;

/// Environment variable consulted when no topology file path is given.
pub const ENV_TOPOLOGY_FILE: &str = "DBROUTE_DB_YML";

/// Default credential keys applied to every server before overrides.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ServerTemplate {
    #[serde(default)]
    pub user: String,

    #[serde(default)]
    pub password: String,

    #[serde(default)]
    pub dbname: Option<String>,

    #[serde(default)]
    pub utf8: bool,
}

/// Partial credential override; only the keys present here replace the
/// template values.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TemplateOverride {
    #[serde(default)]
    pub user: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default)]
    pub dbname: Option<String>,
}

/// One host in a cluster list: either a bare hostname (load 1) or an
/// explicit `{name, load}` pair.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "HostSpecRepr")]
pub struct HostSpec {
    pub name: String,
    pub load: u32,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum HostSpecRepr {
    Name(String),
    Weighted {
        name: String,
        #[serde(default = "default_load")]
        load: u32,
    },
}

fn default_load() -> u32 {
    1
}

impl From<HostSpecRepr> for HostSpec {
    fn from(repr: HostSpecRepr) -> Self {
        match repr {
            HostSpecRepr::Name(name) => HostSpec {
                name,
                load: default_load(),
            },
            HostSpecRepr::Weighted { name, load } => HostSpec { name, load },
        }
    }
}

/// Ordered cluster name → host list; the first host is the master.
pub type ClusterMap = IndexMap<String, Vec<HostSpec>>;

/// Per-cluster named replica groups mapping host name → weight.
pub type GroupLoads = HashMap<String, HashMap<String, IndexMap<String, u32>>>;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct GlobalConfig {
    #[serde(rename = "sectionsByDB", default)]
    pub sections_by_db: HashMap<String, String>,

    #[serde(rename = "serverTemplate", default)]
    pub server_template: ServerTemplate,

    #[serde(rename = "templateOverridesByCluster", default)]
    pub overrides_by_cluster: HashMap<String, TemplateOverride>,

    #[serde(rename = "templateOverridesByServer", default)]
    pub overrides_by_host: HashMap<String, TemplateOverride>,

    #[serde(rename = "templateOverridesByService", default)]
    pub overrides_by_service: HashMap<String, TemplateOverride>,

    #[serde(rename = "groupLoadsBySection", default)]
    pub group_loads: GroupLoads,
}

/// The three-part topology document: global config, the main sharded
/// cluster map, and the external pool addressed by pseudo-cluster name.
#[derive(Debug, Clone, Default)]
pub struct TopologyDocument {
    pub global: GlobalConfig,
    pub clusters: ClusterMap,
    pub external: ClusterMap,
}

impl TopologyDocument {
    /// Loads the document from an explicit path, falling back to the
    /// `DBROUTE_DB_YML` environment variable.
    pub fn load(path: Option<&str>) -> Result<Self, TopologyError> {
        let path = match path {
            Some(p) => p.to_string(),
            None => env::var(ENV_TOPOLOGY_FILE).map_err(|_| TopologyError::NoConfigFile)?,
        };
        Self::from_file(&path)
    }

    pub fn from_file(path: &str) -> Result<Self, TopologyError> {
        debug!("loading topology document from {}", path);
        let content = fs::read_to_string(path)
            .map_err(|e| TopologyError::FileRead(path.to_string(), e.to_string()))?;
        Self::from_yaml(&content, path)
    }

    /// Parses the on-disk format: a YAML sequence of exactly three elements.
    pub fn from_yaml(content: &str, origin: &str) -> Result<Self, TopologyError> {
        let (global, clusters, external): (GlobalConfig, ClusterMap, ClusterMap) =
            serde_yaml::from_str(content)
                .map_err(|e| TopologyError::Parse(origin.to_string(), e.to_string()))?;
        Ok(Self {
            global,
            clusters,
            external,
        })
    }
}
