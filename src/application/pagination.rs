//! Page-by-page iteration over Chargify listings.

use std::future::Future;
use std::sync::Arc;

use futures::stream::{self, Stream, StreamExt};
use serde_json::Value;

use crate::domain::subscription::SubscriptionSnapshot;
use crate::ports::{BillingError, BillingProvider, Page, DEFAULT_PER_PAGE};

/// Streams every item of a paginated listing.
///
/// Pages are requested from 1 upwards until one comes back empty. An error
/// is yielded once and ends the stream.
pub fn paginate<T, F, Fut>(per_page: u32, fetch: F) -> impl Stream<Item = Result<T, BillingError>>
where
    F: FnMut(Page) -> Fut,
    Fut: Future<Output = Result<Vec<T>, BillingError>>,
{
    let first = Page { page: 1, per_page };

    stream::unfold((fetch, Some(first)), |(mut fetch, page)| async move {
        let page = page?;
        match fetch(page).await {
            Ok(items) if items.is_empty() => None,
            Ok(items) => {
                let items: Vec<_> = items.into_iter().map(Ok).collect();
                Some((stream::iter(items), (fetch, Some(page.next()))))
            }
            Err(e) => Some((stream::iter(vec![Err(e)]), (fetch, None))),
        }
    })
    .flatten()
}

/// Every subscription of the site.
pub fn all_subscriptions(
    provider: Arc<dyn BillingProvider>,
) -> impl Stream<Item = Result<SubscriptionSnapshot, BillingError>> {
    paginate(DEFAULT_PER_PAGE, move |page| {
        let provider = provider.clone();
        async move { provider.list_subscriptions(page).await }
    })
}

/// Every invoice of the site.
pub fn all_invoices(provider: Arc<dyn BillingProvider>) -> impl Stream<Item = Result<Value, BillingError>> {
    paginate(DEFAULT_PER_PAGE, move |page| {
        let provider = provider.clone();
        async move { provider.list_invoices(page).await }
    })
}
