//! Wire types for the Dynamics Web API.

use serde::Deserialize;

use crate::source::Record;

/// `{"value": [...], "@odata.nextLink": "..."}` envelope.
#[derive(Debug, Deserialize)]
pub(crate) struct ODataCollection<T> {
    pub value: Vec<T>,

    #[serde(rename = "@odata.nextLink", default)]
    pub next_link: Option<String>,
}

pub(crate) type RecordCollection = ODataCollection<Record>;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct EntityDefinition {
    pub logical_name: String,

    #[serde(default)]
    pub entity_set_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct AttributeDefinition {
    pub logical_name: String,

    #[serde(default)]
    pub attribute_type: Option<String>,

    #[serde(default)]
    pub is_primary_id: Option<bool>,

    #[serde(default)]
    pub attribute_of: Option<String>,

    #[serde(default, rename = "IsValidODataAttribute")]
    pub is_valid_odata_attribute: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct PicklistDefinition {
    pub logical_name: String,

    #[serde(default)]
    pub option_set: Option<OptionSetDefinition>,

    #[serde(default)]
    pub global_option_set: Option<OptionSetDefinition>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct OptionSetDefinition {
    #[serde(default)]
    pub options: Vec<OptionDefinition>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct OptionDefinition {
    pub value: i64,

    #[serde(default)]
    pub label: Option<LabelDefinition>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct LabelDefinition {
    #[serde(default)]
    pub user_localized_label: Option<LocalizedLabel>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct LocalizedLabel {
    pub label: String,
}

/// `{"error": {"code": "...", "message": "..."}}` body of a failed request.
#[derive(Debug, Deserialize)]
pub(crate) struct ODataErrorBody {
    pub error: ODataErrorDetail,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ODataErrorDetail {
    #[serde(default)]
    pub code: String,

    #[serde(default)]
    pub message: String,
}
