use std::{
    collections::BTreeSet,
    io::{self, BufRead, Write},
    sync::Arc,
};

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use client_core::{BulkOperation, ClubClient, HeaderCheckboxState, ListController, Record};
use serde::Serialize;
use shared::{
    domain::{
        Honour, HonourField, HonourId, HonourStatus, Member, MemberField, MemberId, MemberStatus,
        RegistrationFlag,
    },
    protocol::{HonourQuery, MemberQuery},
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Club membership console")]
struct Cli {
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    server_url: String,
    /// Name recorded in the audit log for bulk changes.
    #[arg(long, default_value = "admin")]
    actor: String,
    /// Print list output as JSON.
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Members {
        #[command(subcommand)]
        action: MembersAction,
    },
    Honours {
        #[command(subcommand)]
        action: HonoursAction,
    },
    Groups {
        #[command(subcommand)]
        action: GroupsAction,
    },
    /// Show recent audit entries, newest first.
    Audit {
        #[arg(long)]
        limit: Option<u32>,
    },
}

#[derive(Subcommand, Debug)]
enum MembersAction {
    List(MemberFilter),
    Bulk {
        #[command(flatten)]
        filter: MemberFilter,
        #[command(flatten)]
        target: Target,
        #[command(flatten)]
        mutation: MemberMutation,
        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand, Debug)]
enum HonoursAction {
    List(HonourFilter),
    Bulk {
        #[command(flatten)]
        filter: HonourFilter,
        #[command(flatten)]
        target: Target,
        #[command(flatten)]
        mutation: HonourMutation,
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand, Debug)]
enum GroupsAction {
    List,
    Create { name: String },
}

#[derive(Args, Debug, Clone, Default)]
struct MemberFilter {
    #[arg(long)]
    search: Option<String>,
    #[arg(long)]
    group: Option<String>,
    #[arg(long)]
    class: Option<String>,
    #[arg(long)]
    status: Option<MemberStatus>,
}

impl From<MemberFilter> for MemberQuery {
    fn from(filter: MemberFilter) -> Self {
        Self {
            search: filter.search,
            group: filter.group,
            class: filter.class,
            status: filter.status,
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
struct HonourFilter {
    #[arg(long)]
    search: Option<String>,
    #[arg(long)]
    member: Option<String>,
    #[arg(long)]
    category: Option<String>,
    #[arg(long)]
    status: Option<HonourStatus>,
}

impl From<HonourFilter> for HonourQuery {
    fn from(filter: HonourFilter) -> Self {
        Self {
            search: filter.search,
            member_id: filter.member.as_deref().map(MemberId::from),
            category: filter.category,
            status: filter.status,
        }
    }
}

/// Which visible rows a bulk command selects.
#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
struct Target {
    /// Select every row matching the filters.
    #[arg(long)]
    all: bool,
    /// Select one row by id; repeatable.
    #[arg(long = "id")]
    ids: Vec<String>,
}

#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
struct MemberMutation {
    #[arg(long)]
    set_status: Option<MemberStatus>,
    /// Move to a group; an empty value clears it.
    #[arg(long)]
    set_group: Option<String>,
    #[arg(long)]
    set_class: Option<String>,
    /// Mark a registration flag (form, healthInfo, feesPaid).
    #[arg(long)]
    mark: Option<RegistrationFlag>,
    #[arg(long)]
    unmark: Option<RegistrationFlag>,
    #[arg(long)]
    delete: bool,
}

impl MemberMutation {
    fn into_operation(self) -> Result<BulkOperation<Member>> {
        let op = if let Some(status) = self.set_status {
            BulkOperation::set_field(MemberField::Status, status.as_str())
        } else if let Some(group) = self.set_group {
            BulkOperation::set_field(MemberField::Group, group)
        } else if let Some(class) = self.set_class {
            BulkOperation::set_field(MemberField::Class, class)
        } else if let Some(flag) = self.mark {
            BulkOperation::set_flag(flag, true)
        } else if let Some(flag) = self.unmark {
            BulkOperation::set_flag(flag, false)
        } else if self.delete {
            BulkOperation::delete()
        } else {
            bail!("choose one change to apply");
        };
        Ok(op)
    }
}

#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
struct HonourMutation {
    #[arg(long)]
    set_status: Option<HonourStatus>,
    #[arg(long)]
    set_category: Option<String>,
    #[arg(long)]
    delete: bool,
}

impl HonourMutation {
    fn into_operation(self) -> Result<BulkOperation<Honour>> {
        let op = if let Some(status) = self.set_status {
            BulkOperation::set_field(HonourField::Status, status.as_str())
        } else if let Some(category) = self.set_category {
            BulkOperation::set_field(HonourField::Category, category)
        } else if self.delete {
            BulkOperation::delete()
        } else {
            bail!("choose one change to apply");
        };
        Ok(op)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();
    let cli = Cli::parse();
    let client = Arc::new(ClubClient::new(&cli.server_url)?);

    match cli.command {
        Command::Members { action } => match action {
            MembersAction::List(filter) => {
                let members = client.list_members(&filter.into()).await?;
                if cli.json {
                    print_json(&members)?;
                } else {
                    members.iter().for_each(print_member);
                }
            }
            MembersAction::Bulk {
                filter,
                target,
                mutation,
                yes,
            } => {
                let controller =
                    ListController::<Member>::new(client.clone(), client.clone(), &cli.actor);
                let ids = target.ids.iter().map(|id| MemberId::from(id.as_str()));
                run_bulk(
                    controller,
                    filter.into(),
                    target.all,
                    ids.collect(),
                    mutation.into_operation()?,
                    yes,
                )
                .await?;
            }
        },
        Command::Honours { action } => match action {
            HonoursAction::List(filter) => {
                let honours = client.list_honours(&filter.into()).await?;
                if cli.json {
                    print_json(&honours)?;
                } else {
                    honours.iter().for_each(print_honour);
                }
            }
            HonoursAction::Bulk {
                filter,
                target,
                mutation,
                yes,
            } => {
                let controller =
                    ListController::<Honour>::new(client.clone(), client.clone(), &cli.actor);
                let ids = target.ids.iter().map(|id| HonourId::from(id.as_str()));
                run_bulk(
                    controller,
                    filter.into(),
                    target.all,
                    ids.collect(),
                    mutation.into_operation()?,
                    yes,
                )
                .await?;
            }
        },
        Command::Groups { action } => match action {
            GroupsAction::List => {
                let groups = client.list_groups().await?;
                if cli.json {
                    print_json(&groups)?;
                } else {
                    for group in groups {
                        println!(
                            "{:>4}  {:<24} {} members",
                            group.group_id.0, group.name, group.member_count
                        );
                    }
                }
            }
            GroupsAction::Create { name } => {
                let group = client.create_group(&name).await?;
                println!("created group_id={} name={}", group.group_id.0, group.name);
            }
        },
        Command::Audit { limit } => {
            let entries = client.list_audit(limit).await?;
            if cli.json {
                print_json(&entries)?;
            } else {
                for entry in entries {
                    println!(
                        "{}  {:<16} {}  {}",
                        entry.created_at.format("%Y-%m-%d %H:%M:%S"),
                        entry.actor,
                        entry.action,
                        entry.details
                    );
                }
            }
        }
    }

    Ok(())
}

async fn run_bulk<R: Record>(
    mut controller: ListController<R>,
    filter: R::Filter,
    all: bool,
    ids: Vec<R::Id>,
    operation: BulkOperation<R>,
    assume_yes: bool,
) -> Result<()> {
    controller.refresh().await?;
    controller.set_filter(filter);

    if all {
        controller.toggle_all();
    } else {
        let ids: BTreeSet<R::Id> = ids.into_iter().collect();
        for id in &ids {
            if !controller.toggle_one(id) {
                eprintln!("skipping {id}: no such {}", R::NOUN);
            }
        }
    }

    let visible = controller.visible().count();
    println!(
        "{} of {visible} visible {} selected [{}]",
        controller.selection().len(),
        R::noun(visible),
        header_marker(controller.header_state())
    );

    let gate = controller.request_bulk(operation)?;
    let Some(bulk) = gate.resolve(|pending| assume_yes || confirm(&pending.prompt())) else {
        println!("cancelled");
        return Ok(());
    };

    info!(label = %bulk.operation().label, count = bulk.count(), "applying bulk change");
    let report = controller.apply_bulk(bulk).await?;
    for failure in report.failures() {
        eprintln!(
            "  {}: {}",
            failure.id,
            failure.error.as_deref().unwrap_or("failed")
        );
    }
    println!("{}: {}", report.label, report.summary());
    if !report.is_success() {
        bail!(
            "{} of {} {} failed",
            report.failed(),
            report.attempted(),
            R::noun(report.attempted())
        );
    }
    Ok(())
}

fn header_marker(state: HeaderCheckboxState) -> &'static str {
    match (state.checked, state.indeterminate) {
        (true, _) => "x",
        (false, true) => "-",
        (false, false) => " ",
    }
}

fn confirm(prompt: &str) -> bool {
    print!("{prompt} [y/N] ");
    if io::stdout().flush().is_err() {
        return false;
    }
    let mut answer = String::new();
    if io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_member(member: &Member) {
    let reg = member.registration;
    let flag = |set: bool, mark: char| if set { mark } else { '.' };
    println!(
        "{}  {:<28} {:<12} {:<10} {:<8} {}{}{}",
        member.id,
        member.full_name(),
        member.group.as_deref().unwrap_or("-"),
        member.class,
        member.status.as_str(),
        flag(reg.form, 'F'),
        flag(reg.health_info, 'H'),
        flag(reg.fees_paid, 'P'),
    );
}

fn print_honour(honour: &Honour) {
    println!(
        "{}  {:<28} {:<12} {:<11} member={}",
        honour.id,
        honour.name,
        honour.category,
        honour.status.as_str(),
        honour.member_id
    );
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
