//! Dynamics 365 Web API (OData v4) client.
//!
//! [`ODataClient`] implements both [`EntityMetadataService`] and
//! [`QueryService`] over HTTP. Every request carries a bearer token from the
//! shared [`Authenticator`].

mod types;

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::auth::Authenticator;
use crate::config::Config;
use crate::error::{ExtractError, Result};
use crate::source::{
    EntityMetadataService, EntityQuery, OptionLabel, PicklistAttribute, QueryService,
    RecordPage, RemoteProperty,
};

use types::{
    AttributeDefinition, EntityDefinition, ODataCollection, ODataErrorBody, OptionSetDefinition,
    PicklistDefinition, RecordCollection,
};

/// HTTP client for one Dynamics organization.
pub struct ODataClient {
    http: Client,
    auth: Arc<dyn Authenticator>,
    service_url: String,
    oversized_error_code: String,
    page_size: u32,
}

impl ODataClient {
    /// Create a client for the Web API rooted at `service_url`.
    pub fn new(
        http: Client,
        auth: Arc<dyn Authenticator>,
        service_url: impl Into<String>,
        oversized_error_code: impl Into<String>,
        page_size: u32,
    ) -> Self {
        Self {
            http,
            auth,
            service_url: service_url.into(),
            oversized_error_code: oversized_error_code.into(),
            page_size,
        }
    }

    /// Create a client from configuration.
    pub fn from_config(http: Client, auth: Arc<dyn Authenticator>, config: &Config) -> Self {
        Self::new(
            http,
            auth,
            config.service_url(),
            config.sync.oversized_error_code.clone(),
            config.sync.page_size,
        )
    }

    /// Web API root this client talks to.
    pub fn service_url(&self) -> &str {
        &self.service_url
    }

    async fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        let token = self.auth.bearer_token().await?;
        Ok(request
            .bearer_auth(token)
            .header("Accept", "application/json")
            .header("OData-MaxVersion", "4.0")
            .header("OData-Version", "4.0")
            .header("Prefer", format!("odata.maxpagesize={}", self.page_size)))
    }

    async fn get_metadata(&self, path: &str, params: &[(&str, String)]) -> Result<Response> {
        let url = format!("{}{}", self.service_url, path);
        debug!("GET {}", url);
        let request = self.authorized(self.http.get(&url).query(params)).await?;
        Ok(request.send().await?)
    }

    /// Decode a metadata response, turning any non-success status into a fatal error.
    async fn decode_metadata<T: DeserializeOwned>(response: Response) -> Result<T> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ExtractError::MetadataFetch {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl EntityMetadataService for ODataClient {
    async fn list_collections(&self) -> Result<Vec<String>> {
        let params = [("$select", "EntitySetName,LogicalName".to_string())];
        let response = self.get_metadata("EntityDefinitions", &params).await?;
        let definitions: ODataCollection<EntityDefinition> =
            Self::decode_metadata(response).await?;

        let mut names: Vec<String> = definitions
            .value
            .into_iter()
            .filter_map(|d| d.entity_set_name)
            .collect();
        names.sort();
        Ok(names)
    }

    async fn describe_entity(&self, logical_name: &str) -> Result<Vec<RemoteProperty>> {
        let path = format!(
            "EntityDefinitions(LogicalName='{}')/Attributes",
            escape_literal(logical_name)
        );
        let params = [(
            "$select",
            "LogicalName,AttributeType,IsPrimaryId,AttributeOf,IsValidODataAttribute".to_string(),
        )];
        let response = self.get_metadata(&path, &params).await?;
        let attributes: ODataCollection<AttributeDefinition> =
            Self::decode_metadata(response).await?;

        Ok(attributes
            .value
            .into_iter()
            .filter_map(property_from_attribute)
            .collect())
    }

    async fn lookup_logical_name(&self, collection: &str) -> Result<Option<String>> {
        let params = [
            ("$select", "LogicalName".to_string()),
            (
                "$filter",
                format!("EntitySetName eq '{}'", escape_literal(collection)),
            ),
        ];
        let response = self.get_metadata("EntityDefinitions", &params).await?;
        let definitions: ODataCollection<EntityDefinition> =
            Self::decode_metadata(response).await?;
        Ok(definitions.value.into_iter().next().map(|d| d.logical_name))
    }

    async fn fetch_picklist_attributes(
        &self,
        logical_name: &str,
    ) -> Result<Option<Vec<PicklistAttribute>>> {
        let path = format!(
            "EntityDefinitions(LogicalName='{}')/Attributes/Microsoft.Dynamics.CRM.PicklistAttributeMetadata",
            escape_literal(logical_name)
        );
        let params = [
            ("$select", "LogicalName".to_string()),
            ("$expand", "OptionSet,GlobalOptionSet".to_string()),
        ];
        let response = self.get_metadata(&path, &params).await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!("No pick list metadata for {}", logical_name);
            return Ok(None);
        }

        let picklists: ODataCollection<PicklistDefinition> =
            Self::decode_metadata(response).await?;
        Ok(Some(
            picklists
                .value
                .into_iter()
                .map(|p| PicklistAttribute {
                    logical_name: p.logical_name,
                    options: option_labels(p.option_set),
                    global_options: option_labels(p.global_option_set),
                })
                .collect(),
        ))
    }
}

#[async_trait]
impl QueryService for ODataClient {
    async fn fetch_page(
        &self,
        query: &EntityQuery,
        next_link: Option<&str>,
    ) -> Result<RecordPage> {
        let request = match next_link {
            Some(link) => self.http.get(link),
            None => {
                let url = format!("{}{}", self.service_url, query.collection);
                let mut params = Vec::new();
                if let Some(filter) = query.filter_expression() {
                    params.push(("$filter", filter));
                }
                if let Some(order) = query.order_expression() {
                    params.push(("$orderby", order));
                }
                self.http.get(url).query(&params)
            }
        };

        let response = self.authorized(request).await?.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<ODataErrorBody>(&body) {
                if error.error.code == self.oversized_error_code {
                    return Err(ExtractError::OversizedResponse {
                        code: error.error.code,
                        message: error.error.message,
                    });
                }
            }
            return Err(ExtractError::Query {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        let page: RecordCollection = serde_json::from_str(&body)?;
        debug!(
            "{}: fetched page of {} rows (more: {})",
            query.collection,
            page.value.len(),
            page.next_link.is_some()
        );
        Ok(RecordPage {
            records: page.value,
            next_link: page.next_link,
        })
    }
}

/// Translate a Web API attribute definition into a queryable property.
///
/// Returns `None` for attributes that never appear in query results.
fn property_from_attribute(attribute: AttributeDefinition) -> Option<RemoteProperty> {
    if attribute.attribute_of.is_some() || attribute.is_valid_odata_attribute == Some(false) {
        return None;
    }
    let attribute_type = attribute.attribute_type.as_deref().unwrap_or("String");
    if attribute_type == "Virtual" {
        return None;
    }

    let name = match attribute_type {
        "Lookup" | "Customer" | "Owner" => format!("_{}_value", attribute.logical_name),
        _ => attribute.logical_name,
    };
    Some(RemoteProperty::new(
        name,
        edm_type_for_attribute(attribute_type),
        attribute.is_primary_id.unwrap_or(false),
    ))
}

/// Edm type under which the Web API exposes an attribute type.
pub fn edm_type_for_attribute(attribute_type: &str) -> &'static str {
    match attribute_type {
        "BigInt" => "Edm.Int64",
        "Integer" | "Picklist" | "State" | "Status" => "Edm.Int32",
        "Boolean" => "Edm.Boolean",
        "DateTime" => "Edm.DateTimeOffset",
        "Decimal" | "Money" => "Edm.Decimal",
        "Double" => "Edm.Double",
        "Uniqueidentifier" | "Lookup" | "Customer" | "Owner" => "Edm.Guid",
        _ => "Edm.String",
    }
}

fn option_labels(option_set: Option<OptionSetDefinition>) -> Vec<OptionLabel> {
    option_set
        .map(|set| {
            set.options
                .into_iter()
                .filter_map(|option| {
                    let label = option.label?.user_localized_label?.label;
                    Some(OptionLabel {
                        value: option.value,
                        label,
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Extract the OData error message from a response body, falling back to the raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<ODataErrorBody>(body)
        .map(|e| {
            if e.error.code.is_empty() {
                e.error.message
            } else {
                format!("{} ({})", e.error.message, e.error.code)
            }
        })
        .unwrap_or_else(|_| body.to_string())
}

/// Escape a value for use inside a single-quoted OData literal.
fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attribute(name: &str, attribute_type: &str) -> AttributeDefinition {
        AttributeDefinition {
            logical_name: name.to_string(),
            attribute_type: Some(attribute_type.to_string()),
            is_primary_id: Some(false),
            attribute_of: None,
            is_valid_odata_attribute: Some(true),
        }
    }

    #[test]
    fn test_edm_type_for_attribute() {
        assert_eq!(edm_type_for_attribute("DateTime"), "Edm.DateTimeOffset");
        assert_eq!(edm_type_for_attribute("Picklist"), "Edm.Int32");
        assert_eq!(edm_type_for_attribute("BigInt"), "Edm.Int64");
        assert_eq!(edm_type_for_attribute("Money"), "Edm.Decimal");
        assert_eq!(edm_type_for_attribute("Memo"), "Edm.String");
        assert_eq!(edm_type_for_attribute("SomethingNew"), "Edm.String");
    }

    #[test]
    fn test_lookup_attributes_use_value_name() {
        let property = property_from_attribute(attribute("parentaccountid", "Lookup")).unwrap();
        assert_eq!(property.name, "_parentaccountid_value");
        assert_eq!(property.edm_type, "Edm.Guid");
    }

    #[test]
    fn test_shadow_attributes_are_skipped() {
        let mut name_attribute = attribute("parentaccountidname", "String");
        name_attribute.attribute_of = Some("parentaccountid".to_string());
        assert!(property_from_attribute(name_attribute).is_none());

        assert!(property_from_attribute(attribute("entityimage", "Virtual")).is_none());

        let mut invalid = attribute("legacy", "String");
        invalid.is_valid_odata_attribute = Some(false);
        assert!(property_from_attribute(invalid).is_none());
    }

    #[test]
    fn test_primary_id_flag() {
        let mut id = attribute("accountid", "Uniqueidentifier");
        id.is_primary_id = Some(true);
        let property = property_from_attribute(id).unwrap();
        assert!(property.is_primary_key);
    }

    #[test]
    fn test_error_message() {
        let body = r#"{"error":{"code":"0x80040217","message":"Not found"}}"#;
        assert_eq!(error_message(body), "Not found (0x80040217)");
        assert_eq!(error_message("plain failure"), "plain failure");
    }

    #[test]
    fn test_escape_literal() {
        assert_eq!(escape_literal("o'neil"), "o''neil");
    }
}
