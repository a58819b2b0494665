use clap::{Args, Subcommand};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::api::{QueryParams, Request, normalize_name};
use crate::dates::format_time;
use crate::output::truncate_display;
use crate::pagination::ListRequest;

use super::{CommandError, Context, PageArgs, fetch_for_display, print_list};

const PAYLOAD_PREVIEW_WIDTH: usize = 80;

#[derive(Subcommand)]
pub enum EventsCommand {
    #[command(about = "List events in a space")]
    List(EventsListArgs),
    #[command(about = "Get a single space event")]
    Get(EventNameArgs),
}

#[derive(Args)]
pub struct EventsListArgs {
    #[arg(value_name = "SPACE", help = "Space id or resource name")]
    space: String,

    #[arg(long, help = "Event filter; must name event types (e.g. event_types:\"google.workspace.chat.message.v1.created\")")]
    filter: String,

    #[arg(long, default_value_t = 0, hide_default_value = true, help = "Maximum number of events per page")]
    page_size: i64,

    #[command(flatten)]
    pages: PageArgs,
}

#[derive(Args)]
pub struct EventNameArgs {
    #[arg(value_name = "EVENT", help = "Event resource name (spaces/{space}/spaceEvents/{event})")]
    event: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SpaceEvent {
    pub name: String,
    pub event_type: String,
    pub event_time: String,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl SpaceEvent {
    fn row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.event_type.clone(),
            format_time(&self.event_time),
        ]
    }

    /// The first `*EventData` field, abbreviated.
    fn payload_summary(&self) -> String {
        self.payload
            .iter()
            .find(|(key, _)| key.ends_with("EventData"))
            .map(|(key, data)| {
                format!("{key}: {}", truncate_display(&data.to_string(), PAYLOAD_PREVIEW_WIDTH))
            })
            .unwrap_or_default()
    }

    fn details(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Name", self.name.clone()),
            ("Event Type", self.event_type.clone()),
            ("Event Time", format_time(&self.event_time)),
            ("Payload", self.payload_summary()),
        ]
    }
}

pub async fn run(command: EventsCommand, ctx: &Context) -> Result<(), CommandError> {
    match command {
        EventsCommand::List(args) => {
            if args.filter.trim().is_empty() {
                return Err(CommandError::Usage(
                    "--filter is required and must name at least one event type".to_string(),
                ));
            }
            let parent = normalize_name(&args.space, "spaces/");
            let list = ListRequest::new(format!("{parent}/spaceEvents"), "spaceEvents").query(
                QueryParams::new()
                    .with("filter", &args.filter)
                    .with_int("pageSize", args.page_size),
            );
            print_list(
                ctx,
                &list,
                &args.pages,
                "events",
                &["EVENT_NAME", "EVENT_TYPE", "EVENT_TIME"],
                SpaceEvent::row,
            )
            .await
        }
        EventsCommand::Get(args) => {
            let request = Request::get(args.event);
            if let Some(event) = fetch_for_display::<SpaceEvent>(ctx, request, "getting event").await? {
                ctx.formatter.print_details(&event.details())?;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_summary_picks_event_data() {
        let event: SpaceEvent = serde_json::from_value(json!({
            "name": "spaces/A/spaceEvents/1",
            "eventType": "google.workspace.chat.message.v1.created",
            "messageCreatedEventData": {"message": {"name": "spaces/A/messages/9"}}
        }))
        .expect("event");
        assert_eq!(
            event.payload_summary(),
            "messageCreatedEventData: {\"message\":{\"name\":\"spaces/A/messages/9\"}}"
        );
        assert_eq!(event.row()[1], "google.workspace.chat.message.v1.created");
    }

    #[test]
    fn events_without_payload_have_empty_summary() {
        assert_eq!(SpaceEvent::default().payload_summary(), "");
    }
}
