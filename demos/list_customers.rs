//! Lists every customer of the signed-in partner, page by page.
//!
//! Reads the access token from `PARTNER_TOKEN` and, optionally, the service
//! root from `PARTNER_BASE_URL`. Expired tokens are re-read from the
//! environment by the refresh delegate.
//!
//! Run with: `PARTNER_TOKEN=... cargo run --example list_customers`

use http::Method;
use partner_client::{
    BoxError, CollectionEnumerator, Credential, Error, Pagination, PartnerClient, RequestContext,
    RequestDescriptor, ResourceCollection, ServiceConfig,
};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(dead_code)]
struct CompanyProfile {
    domain: Option<String>,
    company_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Customer {
    id: String,
    company_profile: Option<CompanyProfile>,
}

fn token_from_env() -> Result<Credential, Error> {
    let token = std::env::var("PARTNER_TOKEN")
        .map_err(|_| Error::Authentication("PARTNER_TOKEN is not set".to_string()))?;
    Credential::expiring_in(token, Duration::from_secs(3600))
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter("partner_client=debug,list_customers=info")
        .init();

    let mut config = ServiceConfig::default();
    if let Ok(base_url) = std::env::var("PARTNER_BASE_URL") {
        config.base_url = base_url;
    }
    config
        .apis
        .insert("GetCustomers".to_string(), "customers".to_string());

    let client = PartnerClient::builder()
        .config(config)
        .credential(token_from_env()?)
        .refresher(|_stale: Credential, _context: RequestContext| async move {
            Ok::<_, BoxError>(token_from_env()?)
        })
        .build()?;

    let request = RequestDescriptor::builder(Method::GET, client.config().api("GetCustomers")?)
        .paginate(Pagination::Offset { offset: 0, size: 50 })
        .build()?;

    let first: ResourceCollection<Customer> = match client.execute(request).await {
        Ok(page) => page,
        Err(Error::Service(fault)) => {
            eprintln!("Service refused the request: {}", fault);
            if let Some(correlation_id) = fault.correlation_id() {
                eprintln!("Quote correlation id {} when contacting support", correlation_id);
            }
            return Err(Error::Service(fault));
        }
        Err(e) => return Err(e),
    };

    let mut pages = CollectionEnumerator::new(client.clone(), first);
    let mut total = 0;
    while let Some(page) = pages.next_page().await? {
        for customer in &page.items {
            let name = customer
                .company_profile
                .as_ref()
                .and_then(|p| p.company_name.as_deref())
                .unwrap_or("<unnamed>");
            println!("{}  {}", customer.id, name);
        }
        total += page.items.len();
    }

    println!();
    println!("{} customer(s)", total);
    Ok(())
}
