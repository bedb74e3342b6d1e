//! Data source configuration: which (type, field) pairs a data source resolves, its entity
//! metadata, and the per-fetch planner it contributes to the plan.
//!
//! ## Capabilities
//! The planner for a fetch is created by the data source's [`PlannerFactory`]. Optional behaviors
//! (request minification, fetch-level query plans, fetch identifiers, debug output) are small
//! capability traits; [`DataSourcePlanner`] exposes them through probing methods that return
//! `None` unless the implementation opts in. The plan assembly checks each capability once per
//! planned fetch.

use std::fmt;
use std::sync::Arc;

use apollo_compiler::Name;
use apollo_compiler::Node;
use apollo_compiler::executable;
use apollo_compiler::executable::VariableDefinition;
use serde::Deserialize;
use serde::Serialize;
use sha1::Digest;

use crate::error::PlanningError;
use crate::plan::FetchKind;
use crate::plan::FetchQueryPlan;
use crate::plan::OperationKind;

mod graphql;

pub use graphql::GraphQlDataSourcePlanner;
pub use graphql::GraphQlFetchConfiguration;
pub use graphql::GraphQlPlannerFactory;
pub use graphql::HttpMethod;

/// A type and the fields of that type a data source can resolve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeField {
    pub type_name: String,
    pub field_names: Vec<String>,
}

impl TypeField {
    pub fn new(
        type_name: impl Into<String>,
        field_names: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            field_names: field_names.into_iter().map(Into::into).collect(),
        }
    }

    fn has_field(&self, type_name: &str, field_name: &str) -> bool {
        self.type_name == type_name && self.field_names.iter().any(|name| name == field_name)
    }
}

/// An entity key: the fields another fetch must provide so that this data source can resolve
/// fields of `type_name` through its entity entry point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyConfiguration {
    pub type_name: String,
    pub selection_set: String,
}

/// Fields that must be resolved by other data sources before `field_name` can be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiresConfiguration {
    pub type_name: String,
    pub field_name: String,
    pub selection_set: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FederationMetaData {
    pub keys: Vec<KeyConfiguration>,
    pub requires: Vec<RequiresConfiguration>,
}

/// Content hash of a data source configuration, used as the fetch's data source identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DataSourceHash(pub u64);

impl fmt::Display for DataSourceHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0.to_be_bytes()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSourceConfiguration {
    /// Must be unique among the data sources handed to one planner.
    pub id: String,
    #[serde(default)]
    pub root_nodes: Vec<TypeField>,
    #[serde(default)]
    pub child_nodes: Vec<TypeField>,
    #[serde(default)]
    pub federation: FederationMetaData,
    /// Fetch configuration interpreted by the data source's planner only.
    #[serde(default)]
    pub custom: serde_json::Value,
    #[serde(skip, default = "default_planner_factory")]
    pub planner_factory: Arc<dyn PlannerFactory>,
}

fn default_planner_factory() -> Arc<dyn PlannerFactory> {
    Arc::new(GraphQlPlannerFactory)
}

impl DataSourceConfiguration {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            root_nodes: Vec::new(),
            child_nodes: Vec::new(),
            federation: FederationMetaData::default(),
            custom: serde_json::Value::Null,
            planner_factory: default_planner_factory(),
        }
    }

    pub fn with_root_node(
        mut self,
        type_name: impl Into<String>,
        field_names: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.root_nodes.push(TypeField::new(type_name, field_names));
        self
    }

    pub fn with_child_node(
        mut self,
        type_name: impl Into<String>,
        field_names: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.child_nodes.push(TypeField::new(type_name, field_names));
        self
    }

    pub fn with_key(mut self, type_name: impl Into<String>, selection_set: impl Into<String>) -> Self {
        self.federation.keys.push(KeyConfiguration {
            type_name: type_name.into(),
            selection_set: selection_set.into(),
        });
        self
    }

    pub fn with_requires(
        mut self,
        type_name: impl Into<String>,
        field_name: impl Into<String>,
        selection_set: impl Into<String>,
    ) -> Self {
        self.federation.requires.push(RequiresConfiguration {
            type_name: type_name.into(),
            field_name: field_name.into(),
            selection_set: selection_set.into(),
        });
        self
    }

    pub fn with_custom(mut self, custom: serde_json::Value) -> Self {
        self.custom = custom;
        self
    }

    pub fn with_planner_factory(mut self, factory: Arc<dyn PlannerFactory>) -> Self {
        self.planner_factory = factory;
        self
    }

    pub fn has_root_node(&self, type_name: &str, field_name: &str) -> bool {
        self.root_nodes
            .iter()
            .any(|node| node.has_field(type_name, field_name))
    }

    pub fn has_child_node(&self, type_name: &str, field_name: &str) -> bool {
        self.child_nodes
            .iter()
            .any(|node| node.has_field(type_name, field_name))
    }

    pub fn has_node(&self, type_name: &str, field_name: &str) -> bool {
        self.has_root_node(type_name, field_name) || self.has_child_node(type_name, field_name)
    }

    pub fn has_root_node_with_typename(&self, type_name: &str) -> bool {
        self.root_nodes.iter().any(|node| node.type_name == type_name)
    }

    /// Whether any field of `type_name` is resolvable, as a root or as a child node.
    pub fn has_node_with_typename(&self, type_name: &str) -> bool {
        self.has_root_node_with_typename(type_name)
            || self.child_nodes.iter().any(|node| node.type_name == type_name)
    }

    pub fn key_for(&self, type_name: &str) -> Option<&KeyConfiguration> {
        self.federation
            .keys
            .iter()
            .find(|key| key.type_name == type_name)
    }

    pub fn requires_for(&self, type_name: &str, field_name: &str) -> Option<&RequiresConfiguration> {
        self.federation
            .requires
            .iter()
            .find(|requires| requires.type_name == type_name && requires.field_name == field_name)
    }

    /// Hashes everything but the planner factory: two configurations with the same id, nodes,
    /// federation metadata and custom configuration are the same fetch target.
    pub fn hash(&self) -> DataSourceHash {
        #[derive(Serialize)]
        struct HashInput<'a> {
            id: &'a str,
            root_nodes: &'a [TypeField],
            child_nodes: &'a [TypeField],
            federation: &'a FederationMetaData,
            custom: &'a serde_json::Value,
        }

        let input = HashInput {
            id: &self.id,
            root_nodes: &self.root_nodes,
            child_nodes: &self.child_nodes,
            federation: &self.federation,
            custom: &self.custom,
        };
        let mut hasher = sha1::Sha1::new();
        // Serializing plain data into a Vec cannot fail; fall back to the id alone if it ever does.
        match serde_json::to_vec(&input) {
            Ok(bytes) => hasher.update(&bytes),
            Err(_) => hasher.update(self.id.as_bytes()),
        }
        let digest = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        DataSourceHash(u64::from_be_bytes(bytes))
    }
}

/// Creates the planner responsible for one fetch against a data source.
pub trait PlannerFactory: fmt::Debug + Send + Sync {
    fn planner(&self) -> Box<dyn DataSourcePlanner>;
}

/// What a data source planner learns about the fetch it is registered for.
#[derive(Debug, Clone, Copy)]
pub struct FetchRegistration<'a> {
    pub fetch_id: usize,
    pub data_source: &'a DataSourceConfiguration,
    pub parent_path: &'a str,
    pub kind: &'a FetchKind,
}

/// The finalized fetch handed to its data source planner.
#[derive(Debug, Clone, Copy)]
pub struct FetchDescription<'a> {
    pub fetch_id: usize,
    pub data_source: &'a DataSourceConfiguration,
    pub operation_kind: OperationKind,
    pub operation_name: Option<&'a Name>,
    pub kind: &'a FetchKind,
    pub parent_path: &'a str,
    pub selection_set: &'a executable::SelectionSet,
    pub representations: Option<&'a executable::SelectionSet>,
    pub variables: &'a [Node<VariableDefinition>],
    pub depends_on_fetch_ids: &'a [usize],
}

/// What a data source planner produces for its fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchConfiguration {
    /// The request sent to the data source, e.g. a subgraph operation.
    pub input: String,
    pub query_plan: Option<FetchQueryPlan>,
    pub debug_id: Option<String>,
}

pub trait DataSourcePlanner: Send {
    /// Called once before the plan assembly traversal.
    fn register(&mut self, registration: &FetchRegistration<'_>) -> Result<(), PlanningError>;

    fn configure_fetch(
        &mut self,
        fetch: &FetchDescription<'_>,
    ) -> Result<FetchConfiguration, PlanningError>;

    fn subgraph_request_minifier(&mut self) -> Option<&mut dyn SubgraphRequestMinifier> {
        None
    }

    fn query_plan_provider(&mut self) -> Option<&mut dyn QueryPlanProvider> {
        None
    }

    fn fetch_identifier(&mut self) -> Option<&mut dyn FetchIdentifier> {
        None
    }

    fn debugger(&mut self) -> Option<&mut dyn DataSourceDebugger> {
        None
    }
}

pub trait SubgraphRequestMinifier {
    fn enable_subgraph_request_minifier(&mut self);
}

pub trait QueryPlanProvider {
    fn include_query_plan_in_fetch_configuration(&mut self);
}

pub trait FetchIdentifier {
    fn set_id(&mut self, id: usize);
}

pub trait DataSourceDebugger {
    fn enable_debug(&mut self);
    fn enable_debug_query_plan_logging(&mut self);
}
