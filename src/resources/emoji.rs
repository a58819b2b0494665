use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use clap::{Args, Subcommand};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::api::{QueryParams, Request, normalize_name};
use crate::dates::format_time;
use crate::pagination::ListRequest;

use super::{CommandError, Context, PageArgs, User, execute, fetch_for_display, print_list};

#[derive(Subcommand)]
pub enum EmojiCommand {
    #[command(about = "List custom emojis")]
    List(EmojiListArgs),
    #[command(about = "Get a custom emoji")]
    Get(EmojiNameArgs),
    #[command(about = "Create a custom emoji from an image file")]
    Create(EmojiCreateArgs),
    #[command(about = "Delete a custom emoji")]
    Delete(EmojiNameArgs),
}

#[derive(Args)]
pub struct EmojiListArgs {
    #[arg(long, default_value_t = 25, help = "Maximum number of emojis per page")]
    page_size: i64,

    #[arg(long, default_value = "", hide_default_value = true, help = "Filter expression for custom emojis")]
    filter: String,

    #[command(flatten)]
    pages: PageArgs,
}

#[derive(Args)]
pub struct EmojiNameArgs {
    #[arg(value_name = "EMOJI", help = "Custom emoji id or resource name (customEmojis/XXXX)")]
    emoji: String,
}

#[derive(Args)]
pub struct EmojiCreateArgs {
    #[arg(long, help = "Short name for the emoji (e.g. :party-parrot:)")]
    name: String,

    #[arg(long, value_name = "PATH", help = "Image file for the emoji")]
    image_file: PathBuf,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CustomEmoji {
    pub name: String,
    pub uid: String,
    pub emoji_name: String,
    pub temporary_image_uri: String,
    pub creator: User,
    pub payload: EmojiPayload,
    pub create_time: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct EmojiPayload {
    pub filename: String,
}

impl CustomEmoji {
    fn row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.emoji_name.clone(),
            self.creator.label(),
            format_time(&self.create_time),
        ]
    }

    fn image(&self) -> String {
        if !self.temporary_image_uri.is_empty() {
            self.temporary_image_uri.clone()
        } else if !self.payload.filename.is_empty() {
            self.payload.filename.clone()
        } else {
            "(none)".to_string()
        }
    }

    fn details(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Name", self.name.clone()),
            ("Short Name", self.emoji_name.clone()),
            ("Emoji ID", self.uid.clone()),
            ("Creator", self.creator.label()),
            ("Payload", self.image()),
            ("Create Time", format_time(&self.create_time)),
        ]
    }
}

fn create_body(short_name: &str, path: &Path, contents: &[u8]) -> Value {
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    json!({
        "emojiName": short_name,
        "payload": {
            "fileContent": STANDARD.encode(contents),
            "filename": filename,
        },
    })
}

pub async fn run(command: EmojiCommand, ctx: &Context) -> Result<(), CommandError> {
    match command {
        EmojiCommand::List(args) => {
            let list = ListRequest::new("customEmojis", "customEmojis").query(
                QueryParams::new()
                    .with_int("pageSize", args.page_size)
                    .with("filter", &args.filter),
            );
            print_list(
                ctx,
                &list,
                &args.pages,
                "custom emojis",
                &["NAME", "SHORT_NAME", "CREATOR", "CREATE_TIME"],
                CustomEmoji::row,
            )
            .await
        }
        EmojiCommand::Get(args) => {
            let request = Request::get(normalize_name(&args.emoji, "customEmojis/"));
            if let Some(emoji) = fetch_for_display::<CustomEmoji>(ctx, request, "getting custom emoji").await? {
                ctx.formatter.print_details(&emoji.details())?;
            }
            Ok(())
        }
        EmojiCommand::Create(args) => {
            let contents = tokio::fs::read(&args.image_file)
                .await
                .map_err(|source| CommandError::File {
                    path: args.image_file.display().to_string(),
                    source,
                })?;
            let request = Request::post("customEmojis", create_body(&args.name, &args.image_file, &contents));
            if let Some(emoji) =
                fetch_for_display::<CustomEmoji>(ctx, request, "creating custom emoji").await?
            {
                ctx.formatter.success("Custom emoji created!");
                ctx.formatter.print_details(&emoji.details())?;
            }
            Ok(())
        }
        EmojiCommand::Delete(args) => {
            let name = normalize_name(&args.emoji, "customEmojis/");
            let done = format!("Custom emoji {name} deleted.");
            execute(ctx, Request::delete(name), "deleting custom emoji", &done).await
        }
    }
}
