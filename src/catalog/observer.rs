//! Owned-object observer.
//!
//! This module lists the remote catalog page by page and keeps only the
//! objects carrying the active owner marker. Everything else is invisible
//! to a run.

use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, info};

use crate::error::Result;
use crate::planner::owner_tag_of;

use super::client::RemoteClient;
use super::types::{ObjectKind, ObservedObject};

/// Observer for the objects a run owns.
pub struct CatalogObserver<'a> {
    /// Catalog connection.
    client: &'a dyn RemoteClient,
    /// Maximum number of kinds listed concurrently.
    concurrency: usize,
}

impl<'a> CatalogObserver<'a> {
    /// Creates a new observer.
    #[must_use]
    pub fn new(client: &'a dyn RemoteClient, concurrency: usize) -> Self {
        Self {
            client,
            concurrency: concurrency.max(1),
        }
    }

    /// Lists every owned object of the given kinds.
    ///
    /// Kinds are listed concurrently; pages within a kind are fetched in
    /// sequence. The result is ordered by kind then name.
    ///
    /// # Errors
    ///
    /// Returns the first listing error encountered.
    pub async fn fetch_owned(
        &self,
        kinds: &[ObjectKind],
        owner_tag: &str,
    ) -> Result<Vec<ObservedObject>> {
        info!("Observing owned objects ({owner_tag})");

        let per_kind: Vec<Vec<ObservedObject>> = stream::iter(kinds.iter().copied())
            .map(|kind| self.fetch_kind(kind, owner_tag))
            .buffer_unordered(self.concurrency)
            .try_collect()
            .await?;

        let mut owned: Vec<ObservedObject> = per_kind.into_iter().flatten().collect();
        owned.sort_by(|a, b| (a.kind, &a.name).cmp(&(b.kind, &b.name)));

        debug!("Found {} owned objects", owned.len());
        Ok(owned)
    }

    /// Lists every page of one kind and filters to owned objects.
    async fn fetch_kind(&self, kind: ObjectKind, owner_tag: &str) -> Result<Vec<ObservedObject>> {
        let mut owned = Vec::new();
        let mut cursor = None;
        let mut pages = 0usize;
        let mut seen = 0usize;

        loop {
            let page = self.client.list_page(kind, cursor.take()).await?;
            pages += 1;
            seen += page.items.len();

            owned.extend(
                page.items
                    .into_iter()
                    .filter(|object| owner_tag_of(&object.attributes) == Some(owner_tag)),
            );

            match page.after {
                Some(after) => cursor = Some(after),
                None => break,
            }
        }

        debug!(
            "{}: {} owned of {} listed across {} pages",
            kind.section(),
            owned.len(),
            seen,
            pages
        );
        Ok(owned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::client::MockRemoteClient;
    use crate::catalog::Page;
    use crate::error::{CatalogSyncError, RemoteError};
    use serde_json::{Value, json};

    fn object(kind: ObjectKind, name: &str, data: Value) -> ObservedObject {
        let Value::Object(attributes) = json!({ "data": data }) else {
            unreachable!()
        };
        ObservedObject::new(kind, name, attributes)
    }

    #[tokio::test]
    async fn test_filters_to_owned_objects_across_pages() {
        let mut client = MockRemoteClient::new();
        client
            .expect_list_page()
            .returning(|kind, cursor| match (kind, cursor.as_deref()) {
                (ObjectKind::Function, None) => Ok(Page {
                    items: vec![
                        object(kind, "a", json!({"owner_tag": "managed:v2"})),
                        object(kind, "b", json!({"owner_tag": "someone-else"})),
                    ],
                    after: Some(String::from("b")),
                }),
                (ObjectKind::Function, Some("b")) => Ok(Page {
                    items: vec![object(kind, "c", json!({"owner_tag": "managed:v2"}))],
                    after: None,
                }),
                _ => Ok(Page::default()),
            });

        let observer = CatalogObserver::new(&client, 2);
        let owned = observer
            .fetch_owned(&[ObjectKind::Role, ObjectKind::Function], "managed:v2")
            .await
            .unwrap();

        let names: Vec<_> = owned.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_listing_error_is_returned() {
        let mut client = MockRemoteClient::new();
        client
            .expect_list_page()
            .returning(|_, _| Err(RemoteError::network("connection reset").into()));

        let observer = CatalogObserver::new(&client, 4);
        let result = observer.fetch_owned(&ObjectKind::ALL, "managed:v2").await;
        assert!(matches!(
            result,
            Err(CatalogSyncError::Remote(RemoteError::NetworkError { .. }))
        ));
    }
}
