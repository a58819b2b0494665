use clap::{ArgAction, Args, Subcommand};
use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::api::{QueryParams, Request, normalize_name};
use crate::dates::format_time;
use crate::pagination::ListRequest;

use super::{CommandError, Context, PageArgs, field_mask, fetch_for_display, execute, print_list};

#[derive(Subcommand)]
pub enum SpacesCommand {
    #[command(about = "List spaces the caller is a member of")]
    List(SpacesListArgs),
    #[command(about = "Get details about a space")]
    Get(SpaceTargetArgs),
    #[command(about = "Create a new space")]
    Create(SpacesCreateArgs),
    #[command(about = "Update an existing space")]
    Update(SpacesUpdateArgs),
    #[command(about = "Delete a space")]
    Delete(SpaceTargetArgs),
    #[command(about = "Search for spaces (admin)")]
    Search(SpacesSearchArgs),
    #[command(about = "Create a space and add members in one call")]
    Setup(SpacesSetupArgs),
    #[command(name = "find-dm", about = "Find a direct message space with a user")]
    FindDm(SpacesFindDmArgs),
    #[command(name = "complete-import", about = "Complete the import process for a space")]
    CompleteImport(SpaceNameArgs),
}

#[derive(Args)]
pub struct SpacesListArgs {
    #[arg(long, default_value = "", hide_default_value = true, help = "Filter spaces (e.g. spaceType = \"SPACE\")")]
    filter: String,

    #[arg(long, default_value_t = 100, help = "Maximum number of spaces per page")]
    page_size: i64,

    #[command(flatten)]
    pages: PageArgs,
}

#[derive(Args)]
pub struct SpaceNameArgs {
    #[arg(value_name = "SPACE", help = "Space id or resource name (spaces/XXXX)")]
    space: String,
}

#[derive(Args)]
pub struct SpaceTargetArgs {
    #[arg(value_name = "SPACE", help = "Space id or resource name (spaces/XXXX)")]
    space: String,

    #[arg(long, help = "Use admin access")]
    admin: bool,
}

#[derive(Args)]
pub struct SpacesCreateArgs {
    #[arg(long, help = "Display name for the space")]
    display_name: String,

    #[arg(long, default_value = "SPACE", help = "Space type (SPACE, GROUP_CHAT, DIRECT_MESSAGE)")]
    space_type: String,

    #[arg(long, help = "Description for the space")]
    description: Option<String>,

    #[arg(long, default_value = "", hide_default_value = true, help = "Unique request id for idempotency")]
    request_id: String,
}

#[derive(Args)]
pub struct SpacesUpdateArgs {
    #[arg(value_name = "SPACE", help = "Space id or resource name (spaces/XXXX)")]
    space: String,

    #[arg(long, help = "New display name")]
    display_name: Option<String>,

    #[arg(long, help = "New description")]
    description: Option<String>,

    #[arg(long, help = "History state (HISTORY_ON or HISTORY_OFF)")]
    history_state: Option<String>,

    #[arg(long, help = "Comma-separated field mask (derived from the flags above if not set)")]
    update_mask: Option<String>,

    #[arg(long, help = "Use admin access")]
    admin: bool,
}

#[derive(Args)]
pub struct SpacesSearchArgs {
    #[arg(long, help = "Search query")]
    query: String,

    #[arg(long, default_value_t = 100, help = "Maximum number of spaces per page")]
    page_size: i64,

    #[arg(long, default_value = "", hide_default_value = true, help = "Order results (e.g. \"membershipCount.joined_direct_human_user_count desc\")")]
    order_by: String,

    #[arg(long, default_value_t = true, action = ArgAction::Set, help = "Use admin access")]
    admin: bool,

    #[command(flatten)]
    pages: PageArgs,
}

#[derive(Args)]
pub struct SpacesSetupArgs {
    #[arg(long, help = "Display name for the space")]
    display_name: Option<String>,

    #[arg(long, default_value = "SPACE", help = "Space type (SPACE, GROUP_CHAT, DIRECT_MESSAGE)")]
    space_type: String,

    #[arg(long, value_delimiter = ',', help = "User resource names to add (e.g. users/12345)")]
    members: Vec<String>,
}

#[derive(Args)]
pub struct SpacesFindDmArgs {
    #[arg(long, help = "User resource name (e.g. users/12345)")]
    user: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Space {
    pub name: String,
    pub display_name: String,
    pub space_type: String,
    #[serde(rename = "type")]
    pub legacy_type: String,
    pub space_details: SpaceDetails,
    pub space_threading_state: String,
    pub space_history_state: String,
    pub external_user_allowed: Option<bool>,
    pub admin_installed: Option<bool>,
    pub membership_count: Option<MembershipCount>,
    pub create_time: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SpaceDetails {
    pub description: String,
    pub guidelines: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MembershipCount {
    pub joined_direct_human_user_count: Option<i64>,
    pub joined_group_count: Option<i64>,
}

impl MembershipCount {
    fn render(&self) -> String {
        match (self.joined_direct_human_user_count, self.joined_group_count) {
            (Some(users), Some(groups)) if groups > 0 => format!("{users} (+{groups} groups)"),
            (Some(users), _) => users.to_string(),
            (None, Some(groups)) => format!("{groups} groups"),
            (None, None) => String::new(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CompleteImportResponse {
    space: Space,
}

fn flag(value: Option<bool>) -> String {
    value.map(|value| value.to_string()).unwrap_or_default()
}

impl Space {
    fn row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.display_name.clone(),
            self.space_type.clone(),
            self.member_count(),
            format_time(&self.create_time),
        ]
    }

    fn member_count(&self) -> String {
        self.membership_count
            .as_ref()
            .map(MembershipCount::render)
            .unwrap_or_default()
    }

    fn details(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Name", self.name.clone()),
            ("Display Name", self.display_name.clone()),
            ("Type", self.space_type.clone()),
            ("Space Type", self.legacy_type.clone()),
            ("Description", self.space_details.description.clone()),
            ("Guidelines", self.space_details.guidelines.clone()),
            ("Threading State", self.space_threading_state.clone()),
            ("History State", self.space_history_state.clone()),
            ("External Access", flag(self.external_user_allowed)),
            ("Admin Installed", flag(self.admin_installed)),
            ("Member Count", self.member_count()),
            ("Create Time", format_time(&self.create_time)),
        ]
    }
}

const SPACE_COLUMNS: &[&str] = &["NAME", "DISPLAY_NAME", "TYPE", "MEMBER_COUNT", "CREATE_TIME"];

pub async fn run(command: SpacesCommand, ctx: &Context) -> Result<(), CommandError> {
    match command {
        SpacesCommand::List(args) => {
            let list = ListRequest::new("spaces", "spaces").query(
                QueryParams::new()
                    .with("filter", &args.filter)
                    .with_int("pageSize", args.page_size),
            );
            print_list(ctx, &list, &args.pages, "spaces", SPACE_COLUMNS, Space::row).await
        }
        SpacesCommand::Get(args) => {
            let request = Request::get(normalize_name(&args.space, "spaces/"))
                .query(QueryParams::new().with_bool("useAdminAccess", args.admin));
            if let Some(space) = fetch_for_display::<Space>(ctx, request, "getting space").await? {
                ctx.formatter.print_details(&space.details())?;
            }
            Ok(())
        }
        SpacesCommand::Create(args) => {
            let mut space = Map::new();
            space.insert("displayName".to_string(), json!(args.display_name));
            space.insert("spaceType".to_string(), json!(args.space_type));
            if let Some(description) = args.description.filter(|d| !d.is_empty()) {
                space.insert("spaceDetails".to_string(), json!({ "description": description }));
            }
            let request = Request::post("spaces", Value::Object(space))
                .query(QueryParams::new().with("requestId", &args.request_id));
            if let Some(space) = fetch_for_display::<Space>(ctx, request, "creating space").await? {
                ctx.formatter.success(&format!("Space created: {}", space.name));
                ctx.formatter.print_details(&space.details())?;
            }
            Ok(())
        }
        SpacesCommand::Update(args) => {
            let (body, mask) = update_body(&args)?;
            let request = Request::patch(normalize_name(&args.space, "spaces/"), body).query(
                QueryParams::new()
                    .with("updateMask", &mask)
                    .with_bool("useAdminAccess", args.admin),
            );
            if let Some(space) = fetch_for_display::<Space>(ctx, request, "updating space").await? {
                ctx.formatter.success(&format!("Space updated: {}", space.name));
                ctx.formatter.print_details(&space.details())?;
            }
            Ok(())
        }
        SpacesCommand::Delete(args) => {
            let name = normalize_name(&args.space, "spaces/");
            let request = Request::delete(name.clone())
                .query(QueryParams::new().with_bool("useAdminAccess", args.admin));
            execute(ctx, request, "deleting space", &format!("Space deleted: {name}")).await
        }
        SpacesCommand::Search(args) => {
            let list = ListRequest::new("spaces:search", "spaces").query(
                QueryParams::new()
                    .with("query", &args.query)
                    .with_int("pageSize", args.page_size)
                    .with("orderBy", &args.order_by)
                    .with_bool("useAdminAccess", args.admin),
            );
            print_list(ctx, &list, &args.pages, "spaces", SPACE_COLUMNS, Space::row).await
        }
        SpacesCommand::Setup(args) => {
            let request = Request::post("spaces:setup", setup_body(&args));
            if let Some(space) = fetch_for_display::<Space>(ctx, request, "setting up space").await? {
                ctx.formatter.success(&format!("Space created: {}", space.name));
                ctx.formatter.print_details(&space.details())?;
            }
            Ok(())
        }
        SpacesCommand::FindDm(args) => {
            let request = Request::get("spaces:findDirectMessage")
                .query(QueryParams::new().with("name", &args.user));
            if let Some(space) =
                fetch_for_display::<Space>(ctx, request, "finding direct message").await?
            {
                ctx.formatter.print_details(&space.details())?;
            }
            Ok(())
        }
        SpacesCommand::CompleteImport(args) => {
            let name = normalize_name(&args.space, "spaces/");
            let request = Request::post(format!("{name}:completeImport"), json!({}));
            if let Some(response) =
                fetch_for_display::<CompleteImportResponse>(ctx, request, "completing import").await?
            {
                ctx.formatter.success(&format!("Import completed for space: {name}"));
                ctx.formatter.print_details(&response.space.details())?;
            }
            Ok(())
        }
    }
}

fn update_body(args: &SpacesUpdateArgs) -> Result<(Value, String), CommandError> {
    let mut space = Map::new();
    if let Some(display_name) = &args.display_name {
        space.insert("displayName".to_string(), json!(display_name));
    }
    if let Some(description) = &args.description {
        space.insert("spaceDetails".to_string(), json!({ "description": description }));
    }
    if let Some(history_state) = &args.history_state {
        space.insert("spaceHistoryState".to_string(), json!(history_state));
    }

    let mask = field_mask(
        args.update_mask.as_deref(),
        &[
            ("displayName", args.display_name.is_some()),
            ("spaceDetails.description", args.description.is_some()),
            ("spaceHistoryState", args.history_state.is_some()),
        ],
    );
    if mask.is_empty() {
        return Err(CommandError::Usage(
            "no fields to update; use --display-name, --description, --history-state, or --update-mask"
                .to_string(),
        ));
    }
    Ok((Value::Object(space), mask))
}

fn setup_body(args: &SpacesSetupArgs) -> Value {
    let mut space = Map::new();
    space.insert("spaceType".to_string(), json!(args.space_type));
    if let Some(display_name) = args.display_name.as_deref().filter(|name| !name.is_empty()) {
        space.insert("displayName".to_string(), json!(display_name));
    }

    let mut request = Map::new();
    request.insert("space".to_string(), Value::Object(space));
    if !args.members.is_empty() {
        let memberships: Vec<Value> = args
            .members
            .iter()
            .map(|member| json!({ "member": { "name": member, "type": "HUMAN" } }))
            .collect();
        request.insert("memberships".to_string(), Value::Array(memberships));
    }
    Value::Object(request)
}
