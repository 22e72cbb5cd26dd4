//! Asset API client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, instrument};

/// Errors returned by the asset API client.
#[derive(Debug, Error)]
pub enum AssetError {
    /// The request could not be sent or the response could not be read.
    #[error("asset API request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-success status.
    #[error("asset API returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, as returned.
        body: String,
    },
}

/// A single attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeValue {
    pub value: String,
}

/// One attribute of an asset object, addressed by its object-type attribute id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetAttribute {
    pub object_type_attribute_id: String,
    #[serde(rename = "objectAttributeValues")]
    pub values: Vec<AttributeValue>,
}

impl AssetAttribute {
    /// An attribute holding exactly one value.
    #[must_use]
    pub fn single(attribute_id: u32, value: impl Into<String>) -> Self {
        Self {
            object_type_attribute_id: attribute_id.to_string(),
            values: vec![AttributeValue {
                value: value.into(),
            }],
        }
    }
}

/// An object as returned by the asset API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetObject {
    pub id: String,
    #[serde(default)]
    pub object_key: String,
    #[serde(default)]
    pub label: String,
}

#[derive(Debug, Deserialize)]
struct AqlPage {
    #[serde(default)]
    values: Vec<AssetObject>,
}

/// Operations the sync handler needs from the asset system.
#[async_trait]
pub trait AssetClient: Send + Sync {
    /// Look up the object whose Email attribute equals `email`.
    async fn find_by_email(&self, email: &str) -> Result<Option<AssetObject>, AssetError>;

    /// Create an object and return its id.
    async fn create(&self, attributes: &[AssetAttribute]) -> Result<String, AssetError>;

    /// Overwrite the given attributes on an existing object.
    async fn update(&self, object_id: &str, attributes: &[AssetAttribute])
    -> Result<(), AssetError>;

    /// Look up the role object labelled `label`.
    async fn find_role_by_label(&self, label: &str) -> Result<Option<AssetObject>, AssetError>;

    /// Create a role object named `label`.
    async fn create_role(&self, label: &str) -> Result<AssetObject, AssetError>;

    /// Verify the API is reachable with the configured credentials.
    async fn check_connection(&self) -> Result<(), AssetError>;
}

/// The object type that job roles are stored as. Employees reference a role
/// object by key instead of carrying the job title as text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleTypeConfig {
    pub object_type_id: String,
    /// Type name as used in AQL, e.g. `Role`.
    pub object_type_name: String,
    /// Attribute of the role object holding its name.
    pub name_attribute_id: u32,
}

/// Connection settings for [`HttpAssetClient`].
#[derive(Debug, Clone)]
pub struct AssetClientConfig {
    /// Base URL of the asset REST API, e.g.
    /// `https://api.atlassian.com/jsm/assets/workspace/<id>/v1`.
    pub base_url: String,
    pub user: String,
    pub api_token: String,
    /// Object type that employee objects are created as.
    pub object_type_id: String,
    pub roles: RoleTypeConfig,
    pub timeout: Duration,
}

/// `reqwest`-backed asset API client using basic authentication.
#[derive(Debug, Clone)]
pub struct HttpAssetClient {
    http: Client,
    config: AssetClientConfig,
}

impl HttpAssetClient {
    /// Build a client from connection settings.
    ///
    /// # Errors
    ///
    /// Returns `AssetError::Http` if the underlying HTTP client cannot be
    /// constructed.
    pub fn new(config: AssetClientConfig) -> Result<Self, AssetError> {
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { http, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, AssetError> {
        let response = request
            .basic_auth(&self.config.user, Some(&self.config.api_token))
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(AssetError::Status {
            status: status.as_u16(),
            body,
        })
    }

    /// First object matching an AQL query.
    async fn find_first(&self, query: String) -> Result<Option<AssetObject>, AssetError> {
        let request = self
            .http
            .post(self.url("object/aql"))
            .query(&[("maxResults", "1")])
            .json(&json!({ "qlQuery": query }));

        let page: AqlPage = self.send(request).await?.json().await?;
        Ok(page.values.into_iter().next())
    }

    async fn create_object(
        &self,
        object_type_id: &str,
        attributes: &[AssetAttribute],
    ) -> Result<AssetObject, AssetError> {
        let request = self.http.post(self.url("object/create")).json(&json!({
            "objectTypeId": object_type_id,
            "attributes": attributes,
        }));

        let created: AssetObject = self.send(request).await?.json().await?;
        debug!(object_id = %created.id, object_key = %created.object_key, "asset object created");
        Ok(created)
    }
}

fn aql_string(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[async_trait]
impl AssetClient for HttpAssetClient {
    #[instrument(skip(self))]
    async fn find_by_email(&self, email: &str) -> Result<Option<AssetObject>, AssetError> {
        let query = format!(
            "objectTypeId = {} AND Email = \"{}\"",
            self.config.object_type_id,
            aql_string(email)
        );
        self.find_first(query).await
    }

    #[instrument(skip(self, attributes))]
    async fn create(&self, attributes: &[AssetAttribute]) -> Result<String, AssetError> {
        let created = self.create_object(&self.config.object_type_id, attributes).await?;
        Ok(created.id)
    }

    #[instrument(skip(self, attributes))]
    async fn update(
        &self,
        object_id: &str,
        attributes: &[AssetAttribute],
    ) -> Result<(), AssetError> {
        let request = self
            .http
            .put(self.url(&format!("object/{object_id}")))
            .json(&json!({
                "objectTypeId": self.config.object_type_id,
                "attributes": attributes,
            }));

        self.send(request).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn find_role_by_label(&self, label: &str) -> Result<Option<AssetObject>, AssetError> {
        let query = format!(
            "objectType = \"{}\" AND Label = \"{}\"",
            aql_string(&self.config.roles.object_type_name),
            aql_string(label)
        );
        self.find_first(query).await
    }

    #[instrument(skip(self))]
    async fn create_role(&self, label: &str) -> Result<AssetObject, AssetError> {
        let roles = &self.config.roles;
        let attributes = [AssetAttribute::single(roles.name_attribute_id, label)];
        self.create_object(&roles.object_type_id, &attributes).await
    }

    async fn check_connection(&self) -> Result<(), AssetError> {
        self.send(self.http.get(self.url("objectschema/list")))
            .await?;
        Ok(())
    }
}
