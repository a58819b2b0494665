use clap::{Args, Subcommand};
use serde::Deserialize;
use serde_json::json;

use crate::api::{QueryParams, Request, normalize_name};
use crate::dates::format_time;
use crate::output::truncate_display;
use crate::pagination::ListRequest;

use super::{CommandError, Context, PageArgs, User, execute, fetch_for_display, print_list};

const LIST_TEXT_WIDTH: usize = 60;
const DETAIL_TEXT_WIDTH: usize = 80;

#[derive(Subcommand)]
pub enum MessagesCommand {
    #[command(about = "List messages in a space")]
    List(MessagesListArgs),
    #[command(about = "Get a message by resource name")]
    Get(MessageNameArgs),
    #[command(about = "Send a message to a space")]
    Send(MessagesSendArgs),
    #[command(about = "Partially update a message (PATCH)")]
    Update(MessagesEditArgs),
    #[command(about = "Delete a message")]
    Delete(MessagesDeleteArgs),
    #[command(about = "Fully replace a message (PUT)")]
    Replace(MessagesEditArgs),
}

#[derive(Args)]
pub struct MessagesListArgs {
    #[arg(value_name = "SPACE", help = "Space id or resource name")]
    space: String,

    #[arg(long, default_value_t = 25, help = "Maximum number of messages per page")]
    page_size: i64,

    #[arg(long, default_value = "", hide_default_value = true, help = "Filter expression for messages")]
    filter: String,

    #[arg(long, default_value = "", hide_default_value = true, help = "Order results (e.g. 'createTime desc')")]
    order_by: String,

    #[arg(long, help = "Include deleted messages")]
    show_deleted: bool,

    #[command(flatten)]
    pages: PageArgs,
}

#[derive(Args)]
pub struct MessageNameArgs {
    #[arg(value_name = "MESSAGE", help = "Message resource name (spaces/{space}/messages/{message})")]
    message: String,
}

#[derive(Args)]
pub struct MessagesSendArgs {
    #[arg(value_name = "SPACE", help = "Space id or resource name")]
    space: String,

    #[arg(long, help = "Message text")]
    text: String,

    #[arg(long, default_value = "", hide_default_value = true, help = "Thread key for threading messages")]
    thread_key: String,

    #[arg(long, default_value = "", hide_default_value = true, help = "Unique request id for idempotency")]
    request_id: String,

    #[arg(long, default_value = "", hide_default_value = true, help = "Custom message id (client-assigned-...)")]
    message_id: String,

    #[arg(
        long,
        default_value = "",
        hide_default_value = true,
        help = "Reply option (REPLY_MESSAGE_FALLBACK_TO_NEW_THREAD or REPLY_MESSAGE_OR_FAIL)"
    )]
    reply_option: String,
}

#[derive(Args)]
pub struct MessagesEditArgs {
    #[arg(value_name = "MESSAGE", help = "Message resource name (spaces/{space}/messages/{message})")]
    message: String,

    #[arg(long, help = "New message text")]
    text: String,

    #[arg(long, help = "Comma-separated list of fields to update")]
    update_mask: Option<String>,

    #[arg(long, help = "Create the message if it does not exist yet")]
    allow_missing: bool,
}

#[derive(Args)]
pub struct MessagesDeleteArgs {
    #[arg(value_name = "MESSAGE", help = "Message resource name (spaces/{space}/messages/{message})")]
    message: String,

    #[arg(long, help = "Also delete threaded replies and reactions")]
    force_threads: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Message {
    pub name: String,
    pub text: String,
    pub create_time: String,
    pub last_update_time: String,
    pub sender: User,
    pub thread: Thread,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Thread {
    pub name: String,
}

impl Message {
    fn row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.sender.label(),
            truncate_display(&self.text, LIST_TEXT_WIDTH),
            format_time(&self.create_time),
        ]
    }

    fn details(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Name", self.name.clone()),
            ("Sender", self.sender.label()),
            ("Text", self.text.clone()),
            ("Create Time", format_time(&self.create_time)),
            ("Last Update Time", format_time(&self.last_update_time)),
            ("Thread", self.thread.name.clone()),
        ]
    }

    fn summary(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Name", self.name.clone()),
            ("Sender", self.sender.label()),
            ("Text", truncate_display(&self.text, DETAIL_TEXT_WIDTH)),
            ("Create Time", format_time(&self.create_time)),
            ("Last Update Time", format_time(&self.last_update_time)),
            ("Thread", self.thread.name.clone()),
        ]
    }
}

pub async fn run(command: MessagesCommand, ctx: &Context) -> Result<(), CommandError> {
    match command {
        MessagesCommand::List(args) => {
            let parent = normalize_name(&args.space, "spaces/");
            let list = ListRequest::new(format!("{parent}/messages"), "messages").query(
                QueryParams::new()
                    .with_int("pageSize", args.page_size)
                    .with("filter", &args.filter)
                    .with("orderBy", &args.order_by)
                    .with_bool("showDeleted", args.show_deleted),
            );
            print_list(
                ctx,
                &list,
                &args.pages,
                "messages",
                &["NAME", "SENDER", "TEXT", "CREATE_TIME"],
                Message::row,
            )
            .await
        }
        MessagesCommand::Get(args) => {
            let request = Request::get(args.message);
            if let Some(message) = fetch_for_display::<Message>(ctx, request, "getting message").await? {
                ctx.formatter.print_details(&message.details())?;
            }
            Ok(())
        }
        MessagesCommand::Send(args) => {
            let parent = normalize_name(&args.space, "spaces/");
            let request = Request::post(format!("{parent}/messages"), json!({ "text": args.text }))
                .query(send_query(&args));
            if let Some(message) = fetch_for_display::<Message>(ctx, request, "sending message").await? {
                ctx.formatter.success("Message sent");
                ctx.formatter.print_details(&message.summary())?;
            }
            Ok(())
        }
        MessagesCommand::Update(args) => {
            // PATCH needs a mask; the text is what this command edits.
            let mask = args.update_mask.clone().unwrap_or_else(|| "text".to_string());
            let request = Request::patch(args.message.clone(), json!({ "text": args.text }))
                .query(edit_query(&mask, args.allow_missing));
            if let Some(message) = fetch_for_display::<Message>(ctx, request, "updating message").await? {
                ctx.formatter.success("Message updated");
                ctx.formatter.print_details(&message.summary())?;
            }
            Ok(())
        }
        MessagesCommand::Replace(args) => {
            let mask = args.update_mask.clone().unwrap_or_default();
            let request = Request::put(args.message.clone(), json!({ "text": args.text }))
                .query(edit_query(&mask, args.allow_missing));
            if let Some(message) = fetch_for_display::<Message>(ctx, request, "replacing message").await? {
                ctx.formatter.success("Message replaced");
                ctx.formatter.print_details(&message.summary())?;
            }
            Ok(())
        }
        MessagesCommand::Delete(args) => {
            let done = format!("Message {} deleted.", args.message);
            let request = Request::delete(args.message)
                .query(QueryParams::new().with_bool("force", args.force_threads));
            execute(ctx, request, "deleting message", &done).await
        }
    }
}

fn send_query(args: &MessagesSendArgs) -> QueryParams {
    QueryParams::new()
        .with("threadKey", &args.thread_key)
        .with("requestId", &args.request_id)
        .with("messageId", &args.message_id)
        .with("messageReplyOption", &args.reply_option)
}

fn edit_query(mask: &str, allow_missing: bool) -> QueryParams {
    QueryParams::new()
        .with("updateMask", mask)
        .with_bool("allowMissing", allow_missing)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_query_omits_unset_options() {
        let args = MessagesSendArgs {
            space: "AAAA".to_string(),
            text: "hi".to_string(),
            thread_key: "deploys".to_string(),
            request_id: String::new(),
            message_id: String::new(),
            reply_option: "REPLY_MESSAGE_OR_FAIL".to_string(),
        };
        let query = send_query(&args);
        assert_eq!(query.get("threadKey"), Some("deploys"));
        assert_eq!(query.get("messageReplyOption"), Some("REPLY_MESSAGE_OR_FAIL"));
        assert_eq!(query.get("requestId"), None);
        assert_eq!(query.get("messageId"), None);
    }

    #[test]
    fn list_rows_truncate_text_and_fall_back_to_sender_name() {
        let message: Message = serde_json::from_value(json!({
            "name": "spaces/A/messages/1",
            "text": "x".repeat(100),
            "sender": {"name": "users/9"}
        }))
        .expect("message");
        let row = message.row();
        assert_eq!(row[1], "users/9");
        assert_eq!(row[2].len(), 60);
        assert!(row[2].ends_with("..."));
    }
}
