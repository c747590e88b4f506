//! Datasource data models.
//!
//! A datasource is a configured connection to an external system (a database
//! or an HTTP API) that queries and API actions are executed against.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::domain::{BaseDomain, Entity};

/// Placeholder written over secrets in redacted copies.
pub const REDACTED: &str = "***REDACTED***";

/// A key/value pair, used for HTTP headers and query parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub key: String,
    pub value: String,
}

impl Property {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A host/port pair for database-style datasources.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
}

/// Credentials used to connect to the datasource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationDTO {
    #[serde(default)]
    pub auth_type: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub database_name: Option<String>,
}

/// Connection settings of a datasource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasourceConfiguration {
    /// Base URL, for API datasources.
    #[serde(default)]
    pub url: Option<String>,
    /// Default headers sent with every request.
    #[serde(default)]
    pub headers: Vec<Property>,
    #[serde(default)]
    pub authentication: Option<AuthenticationDTO>,
    /// Hosts, for database datasources.
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
}

/// A configured external data connection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Datasource {
    #[serde(flatten)]
    pub base: BaseDomain,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub plugin_id: Option<String>,
    #[serde(default)]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub template_name: Option<String>,
    #[serde(default)]
    pub datasource_configuration: Option<DatasourceConfiguration>,
    /// Validation messages from the last [`Datasource::refresh_validity`].
    #[serde(default)]
    pub invalids: BTreeSet<String>,
    #[serde(default)]
    pub is_valid: bool,
}

/// Document field names of [`Datasource`].
pub mod fields {
    pub const NAME: &str = "name";
    pub const PLUGIN_ID: &str = "pluginId";
    pub const ORGANIZATION_ID: &str = "organizationId";
    pub const TEMPLATE_NAME: &str = "templateName";
    pub const DATASOURCE_CONFIGURATION: &str = "datasourceConfiguration";
    pub const INVALIDS: &str = "invalids";
    pub const IS_VALID: &str = "isValid";
}

impl Entity for Datasource {
    const COLLECTION: &'static str = "datasource";
    const ENTITY_NAME: &'static str = "Datasource";

    fn base(&self) -> &BaseDomain {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseDomain {
        &mut self.base
    }
}

impl Datasource {
    /// Creates an unsaved datasource.
    pub fn new(
        name: impl Into<String>,
        plugin_id: impl Into<String>,
        organization_id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            plugin_id: Some(plugin_id.into()),
            organization_id: Some(organization_id.into()),
            ..Default::default()
        }
    }

    /// Sets the connection settings.
    pub fn with_configuration(mut self, configuration: DatasourceConfiguration) -> Self {
        self.datasource_configuration = Some(configuration);
        self
    }

    /// Returns the configured base URL, if any.
    pub fn url(&self) -> Option<&str> {
        self.datasource_configuration
            .as_ref()
            .and_then(|c| c.url.as_deref())
            .filter(|u| !u.trim().is_empty())
    }

    /// Collects validation problems without modifying the datasource.
    pub fn validate(&self) -> BTreeSet<String> {
        let mut invalids = BTreeSet::new();

        if self.name.trim().is_empty() {
            invalids.insert("Missing name for datasource".to_string());
        }

        if self.plugin_id.as_deref().map_or(true, str::is_empty) {
            invalids.insert("Missing plugin id. Please input correct plugin id".to_string());
        }

        if self.organization_id.as_deref().map_or(true, str::is_empty) {
            invalids.insert("Missing organization id. Please enter one".to_string());
        }

        match &self.datasource_configuration {
            None => {
                invalids.insert("Missing datasource configuration".to_string());
            }
            Some(configuration) => {
                if let Some(url) = self.url() {
                    if let Err(e) = url::Url::parse(url) {
                        invalids.insert(format!("Invalid URL '{}': {}", url, e));
                    }
                }

                if configuration
                    .endpoints
                    .iter()
                    .any(|e| e.host.as_deref().map_or(true, |h| h.trim().is_empty()))
                {
                    invalids.insert("Missing host for endpoint".to_string());
                }
            }
        }

        invalids
    }

    /// Recomputes `invalids` and `is_valid`.
    pub fn refresh_validity(&mut self) {
        self.invalids = self.validate();
        self.is_valid = self.invalids.is_empty();
    }

    /// Returns a copy safe to display, with credentials masked.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if let Some(auth) = copy
            .datasource_configuration
            .as_mut()
            .and_then(|c| c.authentication.as_mut())
        {
            if auth.password.is_some() {
                auth.password = Some(REDACTED.to_string());
            }
        }
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_configuration(url: &str) -> DatasourceConfiguration {
        DatasourceConfiguration {
            url: Some(url.to_string()),
            headers: vec![Property::new("Accept", "application/json")],
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_api_datasource() {
        let mut ds = Datasource::new("Users API", "restapi-plugin", "org-1")
            .with_configuration(api_configuration("https://api.example.com/v1"));
        ds.refresh_validity();

        assert!(ds.is_valid);
        assert!(ds.invalids.is_empty());
        assert_eq!(ds.url(), Some("https://api.example.com/v1"));
    }

    #[test]
    fn test_missing_fields_are_reported() {
        let mut ds = Datasource::default();
        ds.refresh_validity();

        assert!(!ds.is_valid);
        assert!(ds.invalids.contains("Missing name for datasource"));
        assert!(ds
            .invalids
            .contains("Missing plugin id. Please input correct plugin id"));
        assert!(ds
            .invalids
            .contains("Missing organization id. Please enter one"));
        assert!(ds.invalids.contains("Missing datasource configuration"));
    }

    #[test]
    fn test_unparseable_url_is_invalid() {
        let ds = Datasource::new("Broken", "restapi-plugin", "org-1")
            .with_configuration(api_configuration("not a url"));
        let invalids = ds.validate();

        assert_eq!(invalids.len(), 1);
        assert!(invalids.iter().next().unwrap().starts_with("Invalid URL"));
    }

    #[test]
    fn test_endpoint_without_host_is_invalid() {
        let ds = Datasource::new("Postgres", "postgres-plugin", "org-1").with_configuration(
            DatasourceConfiguration {
                endpoints: vec![Endpoint {
                    host: None,
                    port: Some(5432),
                }],
                ..Default::default()
            },
        );

        assert!(ds.validate().contains("Missing host for endpoint"));
    }

    #[test]
    fn test_redacted_masks_password() {
        let ds = Datasource::new("Postgres", "postgres-plugin", "org-1").with_configuration(
            DatasourceConfiguration {
                authentication: Some(AuthenticationDTO {
                    username: Some("app".to_string()),
                    password: Some("hunter2".to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            },
        );

        let redacted = ds.redacted();
        let auth = redacted
            .datasource_configuration
            .unwrap()
            .authentication
            .unwrap();
        assert_eq!(auth.password.as_deref(), Some(REDACTED));
        assert_eq!(auth.username.as_deref(), Some("app"));
    }

    #[test]
    fn test_serialized_field_names() {
        let ds = Datasource::new("Users API", "restapi-plugin", "org-1")
            .with_configuration(api_configuration("https://api.example.com"));
        let json = serde_json::to_value(&ds).unwrap();

        assert_eq!(json[fields::PLUGIN_ID], "restapi-plugin");
        assert_eq!(json[fields::ORGANIZATION_ID], "org-1");
        assert_eq!(
            json[fields::DATASOURCE_CONFIGURATION]["url"],
            "https://api.example.com"
        );
        assert_eq!(json["deleted"], false);
        assert!(json.get("id").is_none());
    }

    #[test]
    fn test_deserialize_flattened_base() {
        let json = serde_json::json!({
            "id": "ds-1",
            "name": "Users API",
            "pluginId": "restapi-plugin",
            "deleted": true,
            "policies": [{"permission": "read:datasources", "users": ["ana@example.com"]}]
        });
        let ds: Datasource = serde_json::from_value(json).unwrap();

        assert_eq!(ds.id(), Some("ds-1"));
        assert!(ds.base.deleted);
        assert_eq!(ds.base.policies.len(), 1);
        assert!(ds.organization_id.is_none());
    }
}
