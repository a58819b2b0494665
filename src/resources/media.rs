use std::path::{Path, PathBuf};

use clap::{Args, Subcommand};
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::api::{QueryParams, normalize_name};

use super::{CommandError, Context, During, decode};

#[derive(Subcommand)]
pub enum MediaCommand {
    #[command(about = "Upload a file as an attachment to a space")]
    Upload(MediaUploadArgs),
    #[command(about = "Download a media resource to a local file")]
    Download(MediaDownloadArgs),
}

#[derive(Args)]
pub struct MediaUploadArgs {
    #[arg(value_name = "SPACE", help = "Space id or resource name")]
    space: String,

    #[arg(long, value_name = "PATH", help = "File to upload")]
    file: PathBuf,
}

#[derive(Args)]
pub struct MediaDownloadArgs {
    #[arg(value_name = "RESOURCE", help = "Media resource name (from an attachment's attachmentDataRef)")]
    resource: String,

    #[arg(short, long, value_name = "PATH", help = "Output file (defaults to the last segment of RESOURCE)")]
    output: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct UploadResponse {
    attachment_data_ref: UploadDataRef,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct UploadDataRef {
    resource_name: String,
}

/// A `multipart/related` upload body: JSON metadata followed by the file.
struct RelatedBody {
    boundary: String,
    bytes: Vec<u8>,
}

impl RelatedBody {
    fn new(filename: &str, content_type: &str, contents: &[u8]) -> Self {
        let boundary: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(30)
            .map(char::from)
            .collect();
        Self::with_boundary(boundary, filename, content_type, contents)
    }

    fn with_boundary(boundary: String, filename: &str, content_type: &str, contents: &[u8]) -> Self {
        let metadata = json!({ "filename": filename });
        let mut bytes = Vec::with_capacity(contents.len() + 256);
        bytes.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{metadata}\r\n--{boundary}\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        bytes.extend_from_slice(contents);
        bytes.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
        Self { boundary, bytes }
    }

    fn content_type(&self) -> String {
        format!("multipart/related; boundary={}", self.boundary)
    }
}

/// Picks a local file name from the last segment of a resource name.
fn derive_output_filename(resource: &str) -> PathBuf {
    let last = resource.rsplit('/').next().unwrap_or_default();
    if last.is_empty() {
        PathBuf::from("download")
    } else {
        PathBuf::from(last)
    }
}

fn file_error(path: &Path, source: std::io::Error) -> CommandError {
    CommandError::File {
        path: path.display().to_string(),
        source,
    }
}

pub async fn run(command: MediaCommand, ctx: &Context) -> Result<(), CommandError> {
    match command {
        MediaCommand::Upload(args) => upload(args, ctx).await,
        MediaCommand::Download(args) => download(args, ctx).await,
    }
}

async fn upload(args: MediaUploadArgs, ctx: &Context) -> Result<(), CommandError> {
    let metadata = tokio::fs::metadata(&args.file)
        .await
        .map_err(|source| file_error(&args.file, source))?;
    if metadata.is_dir() {
        return Err(CommandError::Usage(format!(
            "{} is a directory, not a file",
            args.file.display()
        )));
    }
    let contents = tokio::fs::read(&args.file)
        .await
        .map_err(|source| file_error(&args.file, source))?;

    let filename = args
        .file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());
    let mime = mime_guess::from_path(&args.file).first_or_octet_stream();
    debug!("uploading {} as {}", filename, mime);
    let body = RelatedBody::new(&filename, mime.essence_str(), &contents);

    let parent = normalize_name(&args.space, "spaces/");
    let response = ctx
        .client
        .upload(
            &format!("{parent}/attachments:upload"),
            QueryParams::new().with("uploadType", "multipart"),
            body.bytes.clone(),
            &body.content_type(),
        )
        .await
        .during("uploading media")?;

    if ctx.formatter.is_json() {
        ctx.formatter.print_raw(&response)?;
        return Ok(());
    }

    let uploaded: UploadResponse = decode(&response).during("uploading media")?;
    ctx.formatter.success("File uploaded successfully!");
    ctx.formatter.print_details(&[
        ("Resource Name", uploaded.attachment_data_ref.resource_name),
        ("Source File", args.file.display().to_string()),
        ("File Size", format!("{} bytes", metadata.len())),
    ])?;
    Ok(())
}

async fn download(args: MediaDownloadArgs, ctx: &Context) -> Result<(), CommandError> {
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| derive_output_filename(&args.resource));

    let download = ctx
        .client
        .download(
            &format!("media/{}", args.resource),
            QueryParams::new().with("alt", "media"),
        )
        .await
        .during("downloading media")?;
    let content_type = download.content_type.clone();

    let mut file = tokio::fs::File::create(&output)
        .await
        .map_err(|source| file_error(&output, source))?;
    let written = download
        .copy_to(&mut file)
        .await
        .during("downloading media")?;

    if ctx.formatter.is_json() {
        ctx.formatter.print_json(&json!({
            "outputFile": output.display().to_string(),
            "size": written,
            "contentType": content_type,
        }))?;
        return Ok(());
    }
    ctx.formatter.success(&format!(
        "Downloaded to {} ({} bytes, {})",
        output.display(),
        written,
        content_type
    ));
    Ok(())
}
