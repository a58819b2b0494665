use clap::{Args, Subcommand};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::api::{QueryParams, Request};
use crate::pagination::ListRequest;

use super::{CommandError, Context, PageArgs, User, execute, fetch_for_display, print_list};

#[derive(Subcommand)]
pub enum ReactionsCommand {
    #[command(about = "List reactions on a message")]
    List(ReactionsListArgs),
    #[command(about = "React to a message")]
    Add(ReactionsAddArgs),
    #[command(about = "Remove a reaction")]
    Remove(ReactionNameArgs),
}

#[derive(Args)]
pub struct ReactionsListArgs {
    #[arg(value_name = "MESSAGE", help = "Message resource name (spaces/{space}/messages/{message})")]
    message: String,

    #[arg(long, default_value_t = 25, help = "Maximum number of reactions per page")]
    page_size: i64,

    #[arg(long, default_value = "", hide_default_value = true, help = "Filter reactions by emoji or user")]
    filter: String,

    #[command(flatten)]
    pages: PageArgs,
}

#[derive(Args)]
pub struct ReactionsAddArgs {
    #[arg(value_name = "MESSAGE", help = "Message resource name (spaces/{space}/messages/{message})")]
    message: String,

    #[arg(long, help = "Unicode emoji (e.g. \"👍\") or custom emoji uid")]
    emoji: String,
}

#[derive(Args)]
pub struct ReactionNameArgs {
    #[arg(value_name = "REACTION", help = "Reaction resource name")]
    reaction: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Reaction {
    pub name: String,
    pub emoji: Emoji,
    pub user: User,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Emoji {
    pub unicode: String,
    pub custom_emoji: CustomEmojiRef,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CustomEmojiRef {
    pub uid: String,
}

impl Emoji {
    fn label(&self) -> String {
        if self.unicode.is_empty() {
            self.custom_emoji.uid.clone()
        } else {
            self.unicode.clone()
        }
    }
}

impl Reaction {
    fn row(&self) -> Vec<String> {
        vec![self.name.clone(), self.emoji.label(), self.user.label()]
    }
}

/// Non-ASCII input is a unicode emoji; anything else names a custom emoji.
fn emoji_body(emoji: &str) -> Value {
    if emoji.chars().next().is_some_and(|ch| !ch.is_ascii()) {
        json!({ "emoji": { "unicode": emoji } })
    } else {
        json!({ "emoji": { "customEmoji": { "uid": emoji } } })
    }
}

pub async fn run(command: ReactionsCommand, ctx: &Context) -> Result<(), CommandError> {
    match command {
        ReactionsCommand::List(args) => {
            let list = ListRequest::new(format!("{}/reactions", args.message), "reactions").query(
                QueryParams::new()
                    .with_int("pageSize", args.page_size)
                    .with("filter", &args.filter),
            );
            print_list(
                ctx,
                &list,
                &args.pages,
                "reactions",
                &["REACTION_NAME", "EMOJI", "USER"],
                Reaction::row,
            )
            .await
        }
        ReactionsCommand::Add(args) => {
            let request = Request::post(format!("{}/reactions", args.message), emoji_body(&args.emoji));
            if let Some(reaction) = fetch_for_display::<Reaction>(ctx, request, "adding reaction").await? {
                ctx.formatter
                    .success(&format!("Reaction {} added to {}", args.emoji, args.message));
                ctx.formatter.print_details(&[("Name", reaction.name.clone())])?;
            }
            Ok(())
        }
        ReactionsCommand::Remove(args) => {
            let done = format!("Reaction {} removed.", args.reaction);
            execute(ctx, Request::delete(args.reaction), "removing reaction", &done).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unicode_and_custom_emoji_bodies() {
        assert_eq!(emoji_body("👍"), json!({"emoji": {"unicode": "👍"}}));
        assert_eq!(
            emoji_body("abc123"),
            json!({"emoji": {"customEmoji": {"uid": "abc123"}}})
        );
    }

    #[test]
    fn rows_prefer_unicode_then_custom_uid() {
        let custom: Reaction = serde_json::from_value(json!({
            "name": "spaces/A/messages/1/reactions/r",
            "emoji": {"customEmoji": {"uid": "party"}},
            "user": {"name": "users/5", "displayName": "Grace"}
        }))
        .expect("reaction");
        assert_eq!(custom.row(), vec!["spaces/A/messages/1/reactions/r", "party", "Grace"]);
    }
}
