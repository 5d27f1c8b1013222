//! Device deployment resources.
//!
//! A representative slice of the service's resource models: registering a
//! batch of devices for a customer and polling the upload status.

use crate::{collection::ResourceAttributes, link::Link};
use serde::{Deserialize, Serialize};

/// Follow-up links of a single resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLink {
    #[serde(rename = "self", default, skip_serializing_if = "Option::is_none")]
    pub self_link: Option<Link>,
}

/// A device registered for deployment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hardware_hash: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oem_manufacturer_name: Option<String>,

    /// Deployment policy ids applied to the device.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub policies: Vec<String>,

    /// RFC 3339 timestamp set by the service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_date: Option<String>,

    #[serde(default)]
    pub links: ResourceLink,

    #[serde(default)]
    pub attributes: ResourceAttributes,
}

/// Body of a request that creates a device batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceBatchCreationRequest {
    pub batch_id: String,

    pub devices: Vec<Device>,

    #[serde(default)]
    pub attributes: ResourceAttributes,
}

/// A group of devices uploaded together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceBatch {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_date: Option<String>,

    #[serde(default)]
    pub devices_count: u32,

    #[serde(default)]
    pub links: ResourceLink,

    #[serde(default)]
    pub attributes: ResourceAttributes,
}

/// Progress of an asynchronous device upload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceUploadStatus {
    #[default]
    Unknown,
    Queued,
    Processing,
    Finished,
    FinishedWithErrors,
}

/// Upload outcome of one device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceUploadDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_key: Option<String>,

    #[serde(default)]
    pub status: DeviceUploadStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

/// Status of a batch upload, polled through its tracking link.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchUploadDetails {
    pub batch_tracking_id: String,

    #[serde(default)]
    pub status: DeviceUploadStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_time: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_time: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub devices_status: Vec<DeviceUploadDetails>,

    #[serde(default)]
    pub attributes: ResourceAttributes,
}

impl BatchUploadDetails {
    /// Returns `true` once the service has stopped processing the batch.
    pub fn is_complete(&self) -> bool {
        matches!(
            self.status,
            DeviceUploadStatus::Finished | DeviceUploadStatus::FinishedWithErrors
        )
    }
}
