//! Configuration module for the catalog reconciler.
//!
//! This module handles all configuration-related functionality:
//! - Parsing and deserializing `catalog.yaml`
//! - Validation of configuration values
//! - Computing content hashes for plan fingerprints

mod spec;
mod parser;
mod validator;
mod hash;

pub use spec::{
    CatalogConfig, CollectionSpec, ConnectionConfig, FunctionSpec, Generation, IndexField,
    IndexSpec, Membership, NestedIndexSpec, OWNER_TAG_CURRENT, OWNER_TAG_LEGACY, Privilege,
    RetentionPolicy, RoleSpec, SchemaSection,
};
pub use parser::{ConfigParser, DEFAULT_CONFIG_FILES, ENV_ENDPOINT, find_config_file};
pub use validator::{ConfigValidator, ValidationError, ValidationResult};
pub use hash::ConfigHasher;
