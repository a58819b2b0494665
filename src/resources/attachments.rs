use clap::{Args, Subcommand};
use serde::Deserialize;
use serde_json::Value;

use crate::api::Request;

use super::{CommandError, Context, fetch_for_display};

#[derive(Subcommand)]
pub enum AttachmentsCommand {
    #[command(about = "Get attachment metadata")]
    Get(AttachmentNameArgs),
}

#[derive(Args)]
pub struct AttachmentNameArgs {
    #[arg(
        value_name = "ATTACHMENT",
        help = "Attachment resource name (spaces/{space}/messages/{message}/attachments/{attachment})"
    )]
    attachment: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Attachment {
    pub name: String,
    pub content_name: String,
    pub content_type: String,
    pub download_uri: String,
    pub source: String,
    pub thumbnail_uri: String,
    pub attachment_data_ref: AttachmentDataRef,
    pub drive_data_ref: DriveDataRef,
    pub size_bytes: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AttachmentDataRef {
    pub resource_name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DriveDataRef {
    pub drive_file_id: String,
}

impl Attachment {
    fn size(&self) -> String {
        match &self.size_bytes {
            Some(Value::String(size)) => format!("{size} bytes"),
            Some(Value::Number(size)) => format!("{size} bytes"),
            _ => String::new(),
        }
    }

    fn details(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Name", self.name.clone()),
            ("Content Name", self.content_name.clone()),
            ("Content Type", self.content_type.clone()),
            ("Download URI", self.download_uri.clone()),
            ("Source", self.source.clone()),
            ("Thumbnail URI", self.thumbnail_uri.clone()),
            ("Media Resource", self.attachment_data_ref.resource_name.clone()),
            ("Drive File ID", self.drive_data_ref.drive_file_id.clone()),
            ("Size", self.size()),
        ]
    }
}

pub async fn run(command: AttachmentsCommand, ctx: &Context) -> Result<(), CommandError> {
    match command {
        AttachmentsCommand::Get(args) => {
            let request = Request::get(args.attachment);
            if let Some(attachment) =
                fetch_for_display::<Attachment>(ctx, request, "getting attachment").await?
            {
                ctx.formatter.print_details(&attachment.details())?;
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
    fn size_accepts_string_or_number() {
        let quoted: Attachment = serde_json::from_value(json!({"sizeBytes": "2048"})).expect("attachment");
        assert_eq!(quoted.size(), "2048 bytes");
        let numeric: Attachment = serde_json::from_value(json!({"sizeBytes": 12})).expect("attachment");
        assert_eq!(numeric.size(), "12 bytes");
        assert_eq!(Attachment::default().size(), "");
    }
}
