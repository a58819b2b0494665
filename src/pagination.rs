use std::collections::HashMap;
use std::future::Future;

use serde_json::value::RawValue;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::api::{ChatClient, ChatError, QueryParams};

/// One page of a list response. Items keep the text the server sent.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub items: Vec<Box<RawValue>>,
    pub next_page_token: String,
}

impl Page {
    pub fn has_more(&self) -> bool {
        !self.next_page_token.is_empty()
    }
}

/// Decodes `{"<items_field>": [...], "nextPageToken": "..."}`.
pub fn decode_page(body: &[u8], items_field: &str) -> Result<Page, ChatError> {
    let mut object: HashMap<String, Box<RawValue>> = serde_json::from_slice(body)?;
    let items = match object.remove(items_field) {
        None => Vec::new(),
        Some(items) => serde_json::from_str::<Option<Vec<Box<RawValue>>>>(items.get())?
            .unwrap_or_default(),
    };
    let next_page_token = object
        .get("nextPageToken")
        .and_then(|token| serde_json::from_str::<String>(token.get()).ok())
        .unwrap_or_default();
    Ok(Page {
        items,
        next_page_token,
    })
}

/// Drives a list operation across pages.
///
/// With `fetch_all` unset exactly one call is made with `page_token` and its
/// page is returned as-is. Otherwise the continuation token of each page is fed
/// into the next call until it comes back empty, and the items are
/// concatenated in fetch order. A failed call discards everything collected.
pub async fn collect_pages<F, Fut>(
    fetch_all: bool,
    page_token: String,
    cancel: &CancellationToken,
    mut fetch: F,
) -> Result<Page, ChatError>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<Page, ChatError>>,
{
    if cancel.is_cancelled() {
        return Err(ChatError::Cancelled);
    }
    let first = fetch(page_token).await?;
    if !fetch_all {
        return Ok(first);
    }

    let mut items = first.items;
    let mut token = first.next_page_token;
    let mut pages = 1usize;
    while !token.is_empty() {
        if cancel.is_cancelled() {
            return Err(ChatError::Cancelled);
        }
        let page = fetch(token).await?;
        pages += 1;
        items.extend(page.items);
        token = page.next_page_token;
    }
    debug!("fetched {} items across {} pages", items.len(), pages);
    Ok(Page {
        items,
        next_page_token: String::new(),
    })
}

/// A paginated collection endpoint.
#[derive(Debug, Clone)]
pub struct ListRequest {
    pub path: String,
    pub query: QueryParams,
    pub items_field: &'static str,
}

impl ListRequest {
    pub fn new(path: impl Into<String>, items_field: &'static str) -> Self {
        Self {
            path: path.into(),
            query: QueryParams::new(),
            items_field,
        }
    }

    pub fn query(mut self, query: QueryParams) -> Self {
        self.query = query;
        self
    }
}

/// The first page of a listing along with the untouched response body.
#[derive(Debug, Clone)]
pub struct RawPage {
    pub body: Vec<u8>,
    pub page: Page,
}

async fn fetch_body(client: &ChatClient, list: &ListRequest, page_token: &str) -> Result<Vec<u8>, ChatError> {
    let mut query = list.query.clone();
    query.set("pageToken", page_token);
    client.get(&list.path, query).await
}

pub async fn list_page(client: &ChatClient, list: &ListRequest, page_token: &str) -> Result<RawPage, ChatError> {
    if client.cancellation().is_cancelled() {
        return Err(ChatError::Cancelled);
    }
    let body = fetch_body(client, list, page_token).await?;
    let page = decode_page(&body, list.items_field)?;
    Ok(RawPage { body, page })
}

pub async fn list_all(client: &ChatClient, list: &ListRequest, page_token: &str) -> Result<Page, ChatError> {
    collect_pages(true, page_token.to_string(), client.cancellation(), |token| async move {
        let body = fetch_body(client, list, &token).await?;
        decode_page(&body, list.items_field)
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(items: &[i64], token: &str) -> Page {
        Page {
            items: items
                .iter()
                .map(|item| RawValue::from_string(item.to_string()).expect("raw"))
                .collect(),
            next_page_token: token.to_string(),
        }
    }

    fn texts(page: &Page) -> Vec<&str> {
        page.items.iter().map(|item| item.get()).collect()
    }

    fn api_failure() -> ChatError {
        crate::api::parse_api_error(reqwest::StatusCode::SERVICE_UNAVAILABLE, b"down").into()
    }

    #[tokio::test]
    async fn fetch_all_concatenates_pages_in_order() {
        let pages = vec![page(&[1, 2], "t1"), page(&[3], "t2"), page(&[4, 5], "")];
        let mut tokens = Vec::new();
        let cancel = CancellationToken::new();

        let result = collect_pages(true, String::new(), &cancel, |token| {
            let next = pages[tokens.len()].clone();
            tokens.push(token);
            async move { Ok(next) }
        })
        .await
        .expect("all pages");

        assert_eq!(texts(&result), vec!["1", "2", "3", "4", "5"]);
        assert!(result.next_page_token.is_empty());
        assert_eq!(tokens, vec!["", "t1", "t2"]);
    }

    #[tokio::test]
    async fn single_page_makes_one_call_even_with_token() {
        let mut calls = 0;
        let cancel = CancellationToken::new();

        let result = collect_pages(false, "start".to_string(), &cancel, |token| {
            calls += 1;
            assert_eq!(token, "start");
            async { Ok(page(&[7], "more")) }
        })
        .await
        .expect("page");

        assert_eq!(calls, 1);
        assert_eq!(result.next_page_token, "more");
        assert_eq!(texts(&result), vec!["7"]);
    }

    #[tokio::test]
    async fn fetch_all_stops_on_empty_first_token() {
        let mut calls = 0;
        let cancel = CancellationToken::new();
        let result = collect_pages(true, String::new(), &cancel, |_| {
            calls += 1;
            async { Ok(page(&[1], "")) }
        })
        .await
        .expect("page");
        assert_eq!(calls, 1);
        assert_eq!(result.items.len(), 1);
    }

    #[tokio::test]
    async fn failure_mid_walk_returns_error_without_items() {
        let mut calls = 0;
        let cancel = CancellationToken::new();
        let result = collect_pages(true, String::new(), &cancel, |_| {
            calls += 1;
            let outcome = if calls < 3 {
                Ok(page(&[calls], &format!("t{calls}")))
            } else {
                Err(api_failure())
            };
            async move { outcome }
        })
        .await;

        let error = result.expect_err("third call fails");
        assert_eq!(error.as_api_error().map(|api| api.code), Some(503));
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn cancellation_stops_before_next_call() {
        let cancel = CancellationToken::new();
        let mut calls = 0;
        let result = collect_pages(true, String::new(), &cancel, |_| {
            calls += 1;
            cancel.cancel();
            async { Ok(page(&[1], "next")) }
        })
        .await;

        assert!(matches!(result, Err(ChatError::Cancelled)));
        assert_eq!(calls, 1);
    }

    #[test]
    fn decode_page_reads_items_and_token() {
        let body = br#"{"spaces":[{"name":"spaces/A"},{"name":"spaces/B"}],"nextPageToken":"abc"}"#;
        let page = decode_page(body, "spaces").expect("page");
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[1].get(), r#"{"name":"spaces/B"}"#);
        assert_eq!(page.next_page_token, "abc");
        assert!(page.has_more());
    }

    #[test]
    fn decode_page_keeps_item_text() {
        let body = br#"{"messages":[{"name":"m","count":12345678901234567890123,"ratio":1.50}]}"#;
        let page = decode_page(body, "messages").expect("page");
        assert_eq!(
            page.items[0].get(),
            r#"{"name":"m","count":12345678901234567890123,"ratio":1.50}"#
        );
    }

    #[test]
    fn decode_page_treats_missing_items_as_empty() {
        let page = decode_page(b"{}", "messages").expect("page");
        assert!(page.items.is_empty());
        let page = decode_page(br#"{"messages":null,"nextPageToken":null}"#, "messages").expect("page");
        assert!(page.items.is_empty());
        assert!(!page.has_more());
    }

    #[test]
    fn decode_page_rejects_non_object() {
        assert!(matches!(decode_page(b"[1,2]", "spaces"), Err(ChatError::Decode(_))));
        assert!(matches!(decode_page(b"not json", "spaces"), Err(ChatError::Decode(_))));
    }
}
