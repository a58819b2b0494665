use clap::{Args, Subcommand};
use serde::Deserialize;
use serde_json::json;

use crate::api::{QueryParams, Request, normalize_name};
use crate::dates::format_time;
use crate::pagination::ListRequest;

use super::{CommandError, Context, PageArgs, User, execute, fetch_for_display, print_list};

#[derive(Subcommand)]
pub enum MembersCommand {
    #[command(about = "List members of a space")]
    List(MembersListArgs),
    #[command(about = "Get a membership")]
    Get(MemberNameArgs),
    #[command(about = "Add a user to a space")]
    Add(MembersAddArgs),
    #[command(about = "Change a member's role")]
    Update(MembersUpdateArgs),
    #[command(about = "Remove a member from a space")]
    Remove(MemberNameArgs),
}

#[derive(Args)]
pub struct MembersListArgs {
    #[arg(value_name = "SPACE", help = "Space id or resource name")]
    space: String,

    #[arg(long, default_value_t = 100, help = "Maximum number of members per page")]
    page_size: i64,

    #[arg(long, default_value = "", hide_default_value = true, help = "Filter query for members")]
    filter: String,

    #[arg(long, help = "Include invited members")]
    show_invited: bool,

    #[arg(long, help = "Include Google Groups members")]
    show_groups: bool,

    #[arg(long, help = "Use admin access")]
    admin: bool,

    #[command(flatten)]
    pages: PageArgs,
}

#[derive(Args)]
pub struct MemberNameArgs {
    #[arg(value_name = "MEMBER", help = "Membership resource name (spaces/{space}/members/{member})")]
    member: String,

    #[arg(long, help = "Use admin access")]
    admin: bool,
}

#[derive(Args)]
pub struct MembersAddArgs {
    #[arg(value_name = "SPACE", help = "Space id or resource name")]
    space: String,

    #[arg(long, help = "User resource name (e.g. users/123456)")]
    user: String,

    #[arg(long, default_value = "ROLE_MEMBER", help = "Member role (ROLE_MEMBER or ROLE_MANAGER)")]
    role: String,

    #[arg(long, help = "Use admin access")]
    admin: bool,
}

#[derive(Args)]
pub struct MembersUpdateArgs {
    #[arg(value_name = "MEMBER", help = "Membership resource name (spaces/{space}/members/{member})")]
    member: String,

    #[arg(long, help = "Member role (ROLE_MEMBER or ROLE_MANAGER)")]
    role: String,

    #[arg(long, default_value = "role", help = "Fields to update (comma-separated)")]
    update_mask: String,

    #[arg(long, help = "Use admin access")]
    admin: bool,
}

/// Membership state, reported either by enum name or by number.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum MemberState {
    Name(String),
    Code(i64),
}

impl MemberState {
    pub fn label(&self) -> String {
        match self {
            MemberState::Name(name) => name.clone(),
            MemberState::Code(0) => "MEMBER_STATE_UNSPECIFIED".to_string(),
            MemberState::Code(1) => "JOINED".to_string(),
            MemberState::Code(2) => "INVITED".to_string(),
            MemberState::Code(3) => "NOT_A_MEMBER".to_string(),
            MemberState::Code(other) => other.to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Membership {
    pub name: String,
    pub state: Option<MemberState>,
    pub role: String,
    pub member: User,
    pub group_member: GroupMember,
    pub create_time: String,
    pub delete_time: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GroupMember {
    pub name: String,
}

impl Membership {
    fn state_label(&self) -> String {
        self.state.as_ref().map(MemberState::label).unwrap_or_default()
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.member.name.clone(),
            self.member.display_name.clone(),
            self.role.clone(),
            self.member.kind.clone(),
            self.state_label(),
        ]
    }

    fn details(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Name", self.name.clone()),
            ("Role", self.role.clone()),
            ("State", self.state_label()),
            ("Member Name", self.member.name.clone()),
            ("Display Name", self.member.display_name.clone()),
            ("Type", self.member.kind.clone()),
            ("Domain ID", self.member.domain_id.clone()),
            ("Group Member", self.group_member.name.clone()),
            ("Created", format_time(&self.create_time)),
            ("Deleted", format_time(&self.delete_time)),
        ]
    }
}

fn admin_query(admin: bool) -> QueryParams {
    QueryParams::new().with_bool("useAdminAccess", admin)
}

pub async fn run(command: MembersCommand, ctx: &Context) -> Result<(), CommandError> {
    match command {
        MembersCommand::List(args) => {
            let parent = normalize_name(&args.space, "spaces/");
            let list = ListRequest::new(format!("{parent}/members"), "memberships").query(
                admin_query(args.admin)
                    .with_int("pageSize", args.page_size)
                    .with("filter", &args.filter)
                    .with_bool("showInvited", args.show_invited)
                    .with_bool("showGroups", args.show_groups),
            );
            print_list(
                ctx,
                &list,
                &args.pages,
                "members",
                &["NAME", "MEMBER_NAME", "DISPLAY_NAME", "ROLE", "TYPE", "STATE"],
                Membership::row,
            )
            .await
        }
        MembersCommand::Get(args) => {
            let request = Request::get(args.member).query(admin_query(args.admin));
            if let Some(membership) =
                fetch_for_display::<Membership>(ctx, request, "getting member").await?
            {
                ctx.formatter.print_details(&membership.details())?;
            }
            Ok(())
        }
        MembersCommand::Add(args) => {
            let parent = normalize_name(&args.space, "spaces/");
            let body = json!({
                "member": { "name": args.user, "type": "HUMAN" },
                "role": args.role,
            });
            let request = Request::post(format!("{parent}/members"), body).query(admin_query(args.admin));
            if let Some(membership) =
                fetch_for_display::<Membership>(ctx, request, "adding member").await?
            {
                ctx.formatter.success(&format!("Member added to space {parent}"));
                ctx.formatter.print_details(&membership.details())?;
            }
            Ok(())
        }
        MembersCommand::Update(args) => {
            let request = Request::patch(args.member.clone(), json!({ "role": args.role })).query(
                admin_query(args.admin).with("updateMask", &args.update_mask),
            );
            if let Some(membership) =
                fetch_for_display::<Membership>(ctx, request, "updating member").await?
            {
                ctx.formatter.success(&format!("Member {} updated", args.member));
                ctx.formatter.print_details(&membership.details())?;
            }
            Ok(())
        }
        MembersCommand::Remove(args) => {
            let done = format!("Member {} removed", args.member);
            let request = Request::delete(args.member).query(admin_query(args.admin));
            execute(ctx, request, "removing member", &done).await
        }
    }
}
