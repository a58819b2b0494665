//! Command handlers for each REST resource.
//!
//! Every handler follows the same shape: build the request from flags, make
//! one call (or walk pages), then hand the body to the formatter. JSON mode
//! always prints what the server returned.

pub mod attachments;
pub mod emoji;
pub mod events;
pub mod media;
pub mod members;
pub mod messages;
pub mod notifications;
pub mod reactions;
pub mod readstate;
pub mod spaces;

use clap::Args;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::api::{ApiError, ChatClient, ChatError, Request};
use crate::output::{Formatter, OutputError, Table, project_rows};
use crate::pagination::{ListRequest, list_all, list_page};

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("{action}: {source}")]
    Chat {
        action: String,
        #[source]
        source: ChatError,
    },
    #[error(transparent)]
    Output(#[from] OutputError),
    #[error("{0}")]
    Usage(String),
    #[error("{path}: {source}")]
    File {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl CommandError {
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            CommandError::Chat { source, .. } => source.as_api_error(),
            _ => None,
        }
    }

    /// True when the request never produced a response.
    pub fn is_transport(&self) -> bool {
        matches!(self, CommandError::Chat { source, .. } if source.is_transport())
    }
}

/// Attaches the action being performed to a client error.
pub trait During<T> {
    fn during(self, action: &str) -> Result<T, CommandError>;
}

impl<T> During<T> for Result<T, ChatError> {
    fn during(self, action: &str) -> Result<T, CommandError> {
        self.map_err(|source| CommandError::Chat {
            action: action.to_string(),
            source,
        })
    }
}

pub struct Context {
    pub client: ChatClient,
    pub formatter: Formatter,
}

/// Continuation flags shared by list commands.
#[derive(Args, Debug, Clone, Default)]
pub struct PageArgs {
    #[arg(
        long,
        default_value = "",
        hide_default_value = true,
        help = "Page token returned by a previous call"
    )]
    pub page_token: String,

    #[arg(long, help = "Fetch every page of results")]
    pub all: bool,
}

pub fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, ChatError> {
    Ok(serde_json::from_slice(body)?)
}

/// Sends a request whose response is shown as a single resource.
///
/// In JSON mode the body is printed right away and `None` comes back.
pub async fn fetch_for_display<T: DeserializeOwned>(
    ctx: &Context,
    request: Request,
    action: &str,
) -> Result<Option<T>, CommandError> {
    let body = ctx.client.send(request).await.during(action)?;
    if ctx.formatter.is_json() {
        ctx.formatter.print_raw(&body)?;
        return Ok(None);
    }
    decode(&body).during(action).map(Some)
}

/// Sends a request whose response carries nothing worth showing, printing
/// `done` on success in human mode.
pub async fn execute(ctx: &Context, request: Request, action: &str, done: &str) -> Result<(), CommandError> {
    let body = ctx.client.send(request).await.during(action)?;
    if ctx.formatter.is_json() {
        ctx.formatter.print_raw(&body)?;
    } else {
        ctx.formatter.success(done);
    }
    Ok(())
}

/// Lists a paginated collection as a table, or as JSON.
///
/// `noun` names the items in messages ("No {noun} found.").
pub async fn print_list<T, F>(
    ctx: &Context,
    list: &ListRequest,
    pages: &PageArgs,
    noun: &str,
    headers: &[&str],
    row: F,
) -> Result<(), CommandError>
where
    T: DeserializeOwned,
    F: Fn(&T) -> Vec<String>,
{
    let action = format!("listing {noun}");
    let formatter = &ctx.formatter;

    let page = if pages.all {
        let page = list_all(&ctx.client, list, &pages.page_token)
            .await
            .during(&action)?;
        if formatter.is_json() {
            formatter.print_items(list.items_field, &page.items)?;
            return Ok(());
        }
        page
    } else {
        let raw = list_page(&ctx.client, list, &pages.page_token)
            .await
            .during(&action)?;
        if formatter.is_json() {
            formatter.print_raw(&raw.body)?;
            return Ok(());
        }
        raw.page
    };

    if page.items.is_empty() {
        formatter.message(&format!("No {noun} found."));
        return Ok(());
    }

    let mut table = Table::new(headers);
    table.extend(project_rows(&page.items, row));
    formatter.print_table(&table)?;

    if page.has_more() {
        formatter.message(&more_results_hint(&page.next_page_token));
    }
    Ok(())
}

pub fn more_results_hint(token: &str) -> String {
    format!(
        "\nMore results available. Use --page-token {token} to see the next page, or use --all to fetch everything."
    )
}

/// A user or app as embedded in other resources.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct User {
    pub name: String,
    pub display_name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub domain_id: String,
}

impl User {
    /// Display name when the API provides one, resource name otherwise.
    pub fn label(&self) -> String {
        if self.display_name.is_empty() {
            self.name.clone()
        } else {
            self.display_name.clone()
        }
    }
}

/// Builds a comma-separated field mask from the fields that were set.
pub fn field_mask(explicit: Option<&str>, fields: &[(&str, bool)]) -> String {
    if let Some(mask) = explicit.filter(|mask| !mask.is_empty()) {
        return mask.to_string();
    }
    fields
        .iter()
        .filter(|(_, set)| *set)
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_label_prefers_display_name() {
        let user = User {
            name: "users/1".to_string(),
            display_name: "Ada".to_string(),
            ..User::default()
        };
        assert_eq!(user.label(), "Ada");
        let anonymous = User {
            name: "users/2".to_string(),
            ..User::default()
        };
        assert_eq!(anonymous.label(), "users/2");
    }

    #[test]
    fn field_mask_uses_explicit_value_first() {
        assert_eq!(field_mask(Some("role"), &[("displayName", true)]), "role");
        assert_eq!(
            field_mask(None, &[("displayName", true), ("spaceDetails.description", false), ("spaceHistoryState", true)]),
            "displayName,spaceHistoryState"
        );
        assert_eq!(field_mask(Some(""), &[("muteSetting", false)]), "");
    }

    #[test]
    fn hint_names_both_continuation_options() {
        let hint = more_results_hint("tok123");
        assert!(hint.contains("--page-token tok123"));
        assert!(hint.contains("--all"));
    }

    #[test]
    fn chat_errors_keep_their_action() {
        let api = crate::api::parse_api_error(reqwest::StatusCode::NOT_FOUND, b"gone");
        let result: Result<(), ChatError> = Err(api.into());
        let err = result.during("getting space").expect_err("error");
        assert_eq!(err.to_string(), "getting space: API error 404 (Not Found): gone");
        assert_eq!(err.api_error().map(|api| api.code), Some(404));
    }
}
