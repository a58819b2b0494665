use clap::{Args, Subcommand};
use serde::Deserialize;
use serde_json::json;

use crate::api::{QueryParams, Request, normalize_name};
use crate::dates::format_time;

use super::{CommandError, Context, fetch_for_display};

#[derive(Subcommand)]
pub enum ReadStateCommand {
    #[command(name = "get-space", about = "Get the caller's read state in a space")]
    GetSpace(SpaceReadStateArgs),
    #[command(name = "update-space", about = "Update the caller's read state in a space")]
    UpdateSpace(UpdateSpaceReadStateArgs),
    #[command(name = "get-thread", about = "Get the caller's read state in a thread")]
    GetThread(ThreadReadStateArgs),
}

#[derive(Args)]
pub struct SpaceReadStateArgs {
    #[arg(
        value_name = "SPACE",
        help = "Space id, space name, or full read state name (users/{user}/spaces/{space}/spaceReadState)"
    )]
    target: String,
}

#[derive(Args)]
pub struct UpdateSpaceReadStateArgs {
    #[arg(
        value_name = "SPACE",
        help = "Space id, space name, or full read state name (users/{user}/spaces/{space}/spaceReadState)"
    )]
    target: String,

    #[arg(long, help = "Last read time in RFC 3339 format")]
    last_read_time: String,

    #[arg(long, default_value = "lastReadTime", help = "Fields to update (comma-separated)")]
    update_mask: String,
}

#[derive(Args)]
pub struct ThreadReadStateArgs {
    #[arg(
        value_name = "THREAD",
        help = "Thread name (spaces/{space}/threads/{thread}) or full read state name"
    )]
    target: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReadState {
    pub name: String,
    pub last_read_time: String,
}

impl ReadState {
    fn details(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Name", self.name.clone()),
            ("Last Read Time", format_time(&self.last_read_time)),
        ]
    }
}

/// Resolves a space reference to the caller's space read state.
fn space_read_state_name(target: &str) -> String {
    if target.starts_with("users/") {
        return target.to_string();
    }
    format!("users/me/{}/spaceReadState", normalize_name(target, "spaces/"))
}

fn thread_read_state_name(target: &str) -> String {
    if target.starts_with("users/") {
        return target.to_string();
    }
    format!("users/me/{target}/threadReadState")
}

pub async fn run(command: ReadStateCommand, ctx: &Context) -> Result<(), CommandError> {
    match command {
        ReadStateCommand::GetSpace(args) => {
            let request = Request::get(space_read_state_name(&args.target));
            if let Some(state) =
                fetch_for_display::<ReadState>(ctx, request, "getting space read state").await?
            {
                ctx.formatter.print_details(&state.details())?;
            }
            Ok(())
        }
        ReadStateCommand::UpdateSpace(args) => {
            let request = Request::patch(
                space_read_state_name(&args.target),
                json!({ "lastReadTime": args.last_read_time }),
            )
            .query(QueryParams::new().with("updateMask", &args.update_mask));
            if let Some(state) =
                fetch_for_display::<ReadState>(ctx, request, "updating space read state").await?
            {
                ctx.formatter.success("Space read state updated.");
                ctx.formatter.print_details(&state.details())?;
            }
            Ok(())
        }
        ReadStateCommand::GetThread(args) => {
            let request = Request::get(thread_read_state_name(&args.target));
            if let Some(state) =
                fetch_for_display::<ReadState>(ctx, request, "getting thread read state").await?
            {
                ctx.formatter.print_details(&state.details())?;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_state_names_accept_short_forms() {
        assert_eq!(space_read_state_name("AAAA"), "users/me/spaces/AAAA/spaceReadState");
        assert_eq!(space_read_state_name("spaces/AAAA"), "users/me/spaces/AAAA/spaceReadState");
        assert_eq!(
            space_read_state_name("users/123/spaces/AAAA/spaceReadState"),
            "users/123/spaces/AAAA/spaceReadState"
        );
        assert_eq!(
            thread_read_state_name("spaces/AAAA/threads/T1"),
            "users/me/spaces/AAAA/threads/T1/threadReadState"
        );
    }
}
