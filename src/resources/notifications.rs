use clap::{Args, Subcommand};
use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::api::{QueryParams, Request, normalize_name};

use super::{CommandError, Context, fetch_for_display, field_mask};

#[derive(Subcommand)]
pub enum NotificationsCommand {
    #[command(about = "Get the caller's notification setting for a space")]
    Get(NotificationTargetArgs),
    #[command(about = "Update the caller's notification setting for a space")]
    Update(NotificationsUpdateArgs),
}

#[derive(Args)]
pub struct NotificationTargetArgs {
    #[arg(
        value_name = "SPACE",
        help = "Space id, space name, or full setting name (users/{user}/spaces/{space}/spaceNotificationSetting)"
    )]
    target: String,
}

#[derive(Args)]
pub struct NotificationsUpdateArgs {
    #[arg(
        value_name = "SPACE",
        help = "Space id, space name, or full setting name (users/{user}/spaces/{space}/spaceNotificationSetting)"
    )]
    target: String,

    #[arg(long, help = "Notification setting (e.g. NOTIFICATION_SETTING_ALL, NOTIFICATION_SETTING_OFF)")]
    notification_setting: Option<String>,

    #[arg(long, help = "Mute setting (e.g. MUTED, UNMUTED)")]
    mute_setting: Option<String>,

    #[arg(long, help = "Fields to update (derived from the flags above if not set)")]
    update_mask: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotificationSetting {
    pub name: String,
    pub notification_setting: String,
    pub mute_setting: String,
}

fn or_not_set(value: &str) -> String {
    if value.is_empty() {
        "(not set)".to_string()
    } else {
        value.to_string()
    }
}

impl NotificationSetting {
    fn details(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Name", self.name.clone()),
            ("Notification Setting", or_not_set(&self.notification_setting)),
            ("Mute Setting", or_not_set(&self.mute_setting)),
        ]
    }
}

fn setting_name(target: &str) -> String {
    if target.starts_with("users/") {
        return target.to_string();
    }
    format!(
        "users/me/{}/spaceNotificationSetting",
        normalize_name(target, "spaces/")
    )
}

fn update_body(args: &NotificationsUpdateArgs) -> Result<(Value, String), CommandError> {
    let notification = args.notification_setting.as_deref().filter(|v| !v.is_empty());
    let mute = args.mute_setting.as_deref().filter(|v| !v.is_empty());

    let mut body = Map::new();
    if let Some(value) = notification {
        body.insert("notificationSetting".to_string(), json!(value));
    }
    if let Some(value) = mute {
        body.insert("muteSetting".to_string(), json!(value));
    }
    if body.is_empty() {
        return Err(CommandError::Usage(
            "at least one of --notification-setting or --mute-setting must be provided".to_string(),
        ));
    }

    let mask = field_mask(
        args.update_mask.as_deref(),
        &[
            ("notificationSetting", notification.is_some()),
            ("muteSetting", mute.is_some()),
        ],
    );
    Ok((Value::Object(body), mask))
}

pub async fn run(command: NotificationsCommand, ctx: &Context) -> Result<(), CommandError> {
    match command {
        NotificationsCommand::Get(args) => {
            let request = Request::get(setting_name(&args.target));
            if let Some(setting) = fetch_for_display::<NotificationSetting>(
                ctx,
                request,
                "getting notification settings",
            )
            .await?
            {
                ctx.formatter.print_details(&setting.details())?;
            }
            Ok(())
        }
        NotificationsCommand::Update(args) => {
            let (body, mask) = update_body(&args)?;
            let request = Request::patch(setting_name(&args.target), body)
                .query(QueryParams::new().with("updateMask", &mask));
            if let Some(setting) = fetch_for_display::<NotificationSetting>(
                ctx,
                request,
                "updating notification settings",
            )
            .await?
            {
                ctx.formatter.success("Notification setting updated.");
                ctx.formatter.print_details(&setting.details())?;
            }
            Ok(())
        }
    }
}
