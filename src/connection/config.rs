use crate::core::{DbError, Result};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Replica agreement requested for a read or write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsistencyLevel {
    Any,
    One,
    Two,
    Three,
    Quorum,
    LocalQuorum,
    EachQuorum,
    All,
}

impl FromStr for ConsistencyLevel {
    type Err = DbError;

    /// Accepts both `QUORUM` and `CL_QUORUM` spellings.
    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_uppercase();
        let name = normalized.strip_prefix("CL_").unwrap_or(&normalized);
        match name {
            "ANY" => Ok(Self::Any),
            "ONE" => Ok(Self::One),
            "TWO" => Ok(Self::Two),
            "THREE" => Ok(Self::Three),
            "QUORUM" => Ok(Self::Quorum),
            "LOCAL_QUORUM" => Ok(Self::LocalQuorum),
            "EACH_QUORUM" => Ok(Self::EachQuorum),
            "ALL" => Ok(Self::All),
            _ => Err(DbError::Configuration(format!("unknown consistency level '{}'", s))),
        }
    }
}

impl fmt::Display for ConsistencyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Any => "CL_ANY",
            Self::One => "CL_ONE",
            Self::Two => "CL_TWO",
            Self::Three => "CL_THREE",
            Self::Quorum => "CL_QUORUM",
            Self::LocalQuorum => "CL_LOCAL_QUORUM",
            Self::EachQuorum => "CL_EACH_QUORUM",
            Self::All => "CL_ALL",
        };
        write!(f, "{}", name)
    }
}

/// How the client learns about cluster members.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryMode {
    None,
    RingDescribe,
    Discovery,
    TokenAware,
}

impl FromStr for DiscoveryMode {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "NONE" => Ok(Self::None),
            "RING_DESCRIBE" => Ok(Self::RingDescribe),
            "DISCOVERY_SERVICE" | "DISCOVERY" => Ok(Self::Discovery),
            "TOKEN_AWARE" => Ok(Self::TokenAware),
            _ => Err(DbError::Configuration(format!("unknown discovery mode '{}'", s))),
        }
    }
}

impl fmt::Display for DiscoveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "NONE",
            Self::RingDescribe => "RING_DESCRIBE",
            Self::Discovery => "DISCOVERY_SERVICE",
            Self::TokenAware => "TOKEN_AWARE",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolType {
    RoundRobin,
    Bag,
    TokenAware,
}

impl FromStr for PoolType {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "ROUND_ROBIN" => Ok(Self::RoundRobin),
            "BAG" => Ok(Self::Bag),
            "TOKEN_AWARE" => Ok(Self::TokenAware),
            _ => Err(DbError::Configuration(format!("unknown pool type '{}'", s))),
        }
    }
}

impl fmt::Display for PoolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::RoundRobin => "ROUND_ROBIN",
            Self::Bag => "BAG",
            Self::TokenAware => "TOKEN_AWARE",
        };
        write!(f, "{}", name)
    }
}

/// Which storage port implementation a store is opened with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Wide-column store with counter families and composite columns.
    ColumnFamily,
    /// Table-per-type emulation for fast local runs.
    Relational,
}

impl FromStr for BackendKind {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "column_family" | "cassandra" | "wide" => Ok(Self::ColumnFamily),
            "relational" | "memdb" | "sql" => Ok(Self::Relational),
            _ => Err(DbError::Configuration(format!("unknown backend '{}'", s))),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ColumnFamily => write!(f, "column_family"),
            Self::Relational => write!(f, "relational"),
        }
    }
}

/// Store configuration.
///
/// Built with chained setters or read from a flat property map.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: BackendKind,

    pub cluster: String,

    pub keyspace: String,

    /// Seed hosts as `host:port`
    pub seeds: Vec<String>,

    pub max_conns_per_host: usize,

    pub discovery: DiscoveryMode,

    pub pool_type: PoolType,

    /// Default read consistency
    pub read_default: ConsistencyLevel,

    /// Default write consistency (counters, dictionaries, deletes)
    pub write_default: ConsistencyLevel,

    /// Consistency for record row writes
    pub write_model: ConsistencyLevel,

    /// Consistency for counter reads inside reconciliation
    pub read_counter: ConsistencyLevel,

    /// Rows per scan page
    pub page_size: usize,

    /// Row deletions per flushed batch
    pub delete_batch_size: usize,

    /// Counter columns read per row while clearing a counter family
    pub counter_page_columns: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::ColumnFamily,
            cluster: "Test Cluster".to_string(),
            keyspace: "cfmapper".to_string(),
            seeds: vec!["127.0.0.1:9160".to_string()],
            max_conns_per_host: 50,
            discovery: DiscoveryMode::None,
            pool_type: PoolType::RoundRobin,
            read_default: ConsistencyLevel::Quorum,
            write_default: ConsistencyLevel::Quorum,
            write_model: ConsistencyLevel::Quorum,
            read_counter: ConsistencyLevel::Quorum,
            page_size: 100,
            delete_batch_size: 80,
            counter_page_columns: 25,
        }
    }
}

impl StoreConfig {
    pub fn new(keyspace: &str) -> Self {
        Self {
            keyspace: keyspace.to_string(),
            ..Self::default()
        }
    }

    pub fn backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    pub fn cluster(mut self, cluster: &str) -> Self {
        self.cluster = cluster.to_string();
        self
    }

    pub fn seeds(mut self, seeds: &[&str]) -> Self {
        self.seeds = seeds.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn max_conns_per_host(mut self, max: usize) -> Self {
        self.max_conns_per_host = max;
        self
    }

    pub fn discovery(mut self, discovery: DiscoveryMode) -> Self {
        self.discovery = discovery;
        self
    }

    pub fn pool_type(mut self, pool_type: PoolType) -> Self {
        self.pool_type = pool_type;
        self
    }

    pub fn read_consistency(mut self, level: ConsistencyLevel) -> Self {
        self.read_default = level;
        self
    }

    pub fn write_consistency(mut self, level: ConsistencyLevel) -> Self {
        self.write_default = level;
        self
    }

    pub fn model_write_consistency(mut self, level: ConsistencyLevel) -> Self {
        self.write_model = level;
        self
    }

    pub fn counter_read_consistency(mut self, level: ConsistencyLevel) -> Self {
        self.read_counter = level;
        self
    }

    pub fn page_size(mut self, size: usize) -> Self {
        self.page_size = size;
        self
    }

    pub fn delete_batch_size(mut self, size: usize) -> Self {
        self.delete_batch_size = size;
        self
    }

    pub fn counter_page_columns(mut self, columns: usize) -> Self {
        self.counter_page_columns = columns;
        self
    }

    /// Reads `store.*` properties on top of the defaults.
    ///
    /// Recognised keys: `store.backend`, `store.cluster`, `store.keyspace`,
    /// `store.seeds` (comma separated), `store.maxConnsPerHost`,
    /// `store.discovery`, `store.pool`, `store.consistency.read.default`,
    /// `store.consistency.write.default`, `store.consistency.write.model`,
    /// `store.consistency.read.counter`, `store.pageSize`,
    /// `store.deleteBatchSize`.
    pub fn from_properties(props: &HashMap<String, String>) -> Result<Self> {
        let mut config = Self::default();
        let get = |key: &str| props.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());

        if let Some(v) = get("store.backend") {
            config.backend = v.parse()?;
        }
        if let Some(v) = get("store.cluster") {
            config.cluster = v.to_string();
        }
        if let Some(v) = get("store.keyspace") {
            config.keyspace = v.to_string();
        }
        if let Some(v) = get("store.seeds") {
            config.seeds = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(v) = get("store.maxConnsPerHost") {
            config.max_conns_per_host = parse_usize("store.maxConnsPerHost", v)?;
        }
        if let Some(v) = get("store.discovery") {
            config.discovery = v.parse()?;
        }
        if let Some(v) = get("store.pool") {
            config.pool_type = v.parse()?;
        }
        if let Some(v) = get("store.consistency.read.default") {
            config.read_default = v.parse()?;
        }
        if let Some(v) = get("store.consistency.write.default") {
            config.write_default = v.parse()?;
        }
        if let Some(v) = get("store.consistency.write.model") {
            config.write_model = v.parse()?;
        }
        if let Some(v) = get("store.consistency.read.counter") {
            config.read_counter = v.parse()?;
        }
        if let Some(v) = get("store.pageSize") {
            config.page_size = parse_usize("store.pageSize", v)?;
        }
        if let Some(v) = get("store.deleteBatchSize") {
            config.delete_batch_size = parse_usize("store.deleteBatchSize", v)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.keyspace.trim().is_empty() {
            return Err(DbError::Configuration("keyspace cannot be empty".to_string()));
        }

        if self.backend == BackendKind::ColumnFamily && self.seeds.is_empty() {
            return Err(DbError::Configuration("at least one seed host is required".to_string()));
        }

        if self.max_conns_per_host == 0 {
            return Err(DbError::Configuration("max_conns_per_host must be > 0".to_string()));
        }

        if self.page_size == 0 || self.delete_batch_size == 0 || self.counter_page_columns == 0 {
            return Err(DbError::Configuration(
                "page and batch sizes must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_usize(key: &str, value: &str) -> Result<usize> {
    value
        .parse()
        .map_err(|_| DbError::Configuration(format!("{} expects a number, got '{}'", key, value)))
}
