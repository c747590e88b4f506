//! # dsr-core
//!
//! Data models, access policies and document repositories for Datasource
//! Registry.
//!
//! Datasources are stored as JSON documents. Every read is filtered by the
//! entity's policies for the calling [`User`] and hides archived entities.

pub mod datasource;
pub mod db;
pub mod domain;
pub mod policy;
pub mod policy_utils;
pub mod user;

pub use datasource::{
    AuthenticationDTO, Datasource, DatasourceConfiguration, Endpoint, Property,
};
pub use domain::{BaseDomain, Entity};
pub use policy::{AclPermission, Policy};
pub use policy_utils::PolicyUtils;
pub use user::User;
