//! Paged resource collections and the enumerator that walks them.

use crate::{link::Link, PartnerClient, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Navigation links of a collection page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLinks {
    #[serde(rename = "self", default, skip_serializing_if = "Option::is_none")]
    pub self_link: Option<Link>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<Link>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<Link>,
}

/// Metadata the service attaches to every resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_type: Option<String>,
}

/// One page of a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceCollection<T> {
    /// Items on this page. Some endpoints report the total across all pages instead.
    #[serde(default)]
    pub total_count: u64,

    #[serde(default = "Vec::new")]
    pub items: Vec<T>,

    #[serde(default)]
    pub links: ResourceLinks,

    #[serde(default)]
    pub attributes: ResourceAttributes,
}

impl<T> Default for ResourceCollection<T> {
    fn default() -> Self {
        Self {
            total_count: 0,
            items: Vec::new(),
            links: ResourceLinks::default(),
            attributes: ResourceAttributes::default(),
        }
    }
}

impl<T> ResourceCollection<T> {
    pub fn next_link(&self) -> Option<&Link> {
        self.links.next.as_ref()
    }
}

/// Walks a collection page by page through its `next` links.
///
/// Seek-based collections carry their continuation token as a header on the
/// `next` link; it is sent along with the link like any other link header.
///
/// # Examples
///
/// ```no_run
/// use partner_client::{CollectionEnumerator, PartnerClient, RequestDescriptor, ResourceCollection};
/// use http::Method;
///
/// # async fn example(client: PartnerClient) -> Result<(), partner_client::Error> {
/// let first: ResourceCollection<serde_json::Value> = client
///     .execute(RequestDescriptor::builder(Method::GET, "customers").query("size", "100").build()?)
///     .await?;
///
/// let mut pages = CollectionEnumerator::new(client.clone(), first);
/// while let Some(page) = pages.next_page().await? {
///     for customer in page.items {
///         println!("{customer}");
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub struct CollectionEnumerator<T> {
    client: PartnerClient,
    pending: Option<ResourceCollection<T>>,
    next_link: Option<Link>,
}

impl<T> CollectionEnumerator<T>
where
    T: DeserializeOwned,
{
    /// Starts an enumeration at `first_page`, which is yielded first.
    pub fn new(client: PartnerClient, first_page: ResourceCollection<T>) -> Self {
        Self {
            client,
            pending: Some(first_page),
            next_link: None,
        }
    }

    /// Returns `true` if [`next_page`](Self::next_page) has another page to yield.
    pub fn has_more(&self) -> bool {
        self.pending.is_some() || self.next_link.is_some()
    }

    /// Returns the next page, or `None` once a page without a `next` link
    /// has been yielded.
    pub async fn next_page(&mut self) -> Result<Option<ResourceCollection<T>>> {
        let page = match (self.pending.take(), self.next_link.take()) {
            (Some(page), _) => page,
            (None, Some(link)) => {
                tracing::debug!(uri = %link.uri, "Fetching next collection page");
                self.client.follow_link(&link).await?
            }
            (None, None) => return Ok(None),
        };

        self.next_link = page.links.next.clone();
        Ok(Some(page))
    }

    /// Fetches the remaining pages and returns all their items.
    pub async fn collect_items(mut self) -> Result<Vec<T>> {
        let mut items = Vec::new();
        while let Some(page) = self.next_page().await? {
            items.extend(page.items);
        }
        Ok(items)
    }
}
