//! Uploads a device batch from blocking code and polls the upload status.
//!
//! Everything in `main` is synchronous. Each call goes through
//! `sync::run_sync`, which drives it on a worker thread.
//!
//! Run with: `PARTNER_TOKEN=... CUSTOMER_ID=... cargo run --example sync_device_batch`

use http::Method;
use partner_client::models::{BatchUploadDetails, Device, DeviceBatchCreationRequest};
use partner_client::sync::run_sync;
use partner_client::{Credential, Error, Link, PartnerClient, RequestDescriptor, RetryPolicy};
use std::time::Duration;

fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter("partner_client=info")
        .init();

    let token = std::env::var("PARTNER_TOKEN")
        .map_err(|_| Error::Authentication("PARTNER_TOKEN is not set".to_string()))?;
    let customer_id = std::env::var("CUSTOMER_ID")
        .map_err(|_| Error::Argument("CUSTOMER_ID is not set".to_string()))?;

    // Batch creation must not be repeated.
    let client = PartnerClient::builder()
        .credential(Credential::expiring_in(token, Duration::from_secs(3600))?)
        .retry_policy(RetryPolicy::default().retry_non_idempotent(false))
        .build()?;

    let batch = DeviceBatchCreationRequest {
        batch_id: format!("demo-{}", std::process::id()),
        devices: vec![
            Device {
                serial_number: Some("1R9-ZNP67".to_string()),
                product_key: Some("00329-00000-0003-AA606".to_string()),
                model_name: Some("Surface Laptop 5".to_string()),
                oem_manufacturer_name: Some("Microsoft Corporation".to_string()),
                ..Default::default()
            },
            Device {
                hardware_hash: Some("aaaaaaaaaaaaaaaaaaaa".to_string()),
                ..Default::default()
            },
        ],
        ..Default::default()
    };

    let request = RequestDescriptor::builder(Method::POST, "customers/{0}/deviceBatches")
        .arg(customer_id.as_str())
        .json_body(&batch)?
        .build()?;

    // The service answers 202 with the status location in the body.
    let status_link: Link = run_sync(client.execute(request))?;
    println!("Upload accepted, tracking at {}", status_link.uri);

    loop {
        let details: BatchUploadDetails = run_sync(client.follow_link(&status_link))?;
        println!("Batch {}: {:?}", details.batch_tracking_id, details.status);
        if details.is_complete() {
            for device in details.devices_status {
                println!(
                    "  {} {:?} {}",
                    device.serial_number.unwrap_or_default(),
                    device.status,
                    device.error_description.unwrap_or_default()
                );
            }
            break;
        }
        std::thread::sleep(Duration::from_secs(5));
    }

    Ok(())
}
