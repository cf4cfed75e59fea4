use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use shared::domain::{HonourStatus, MemberId, MemberStatus};
use storage::{NewHonour, NewMember, Storage};

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "sqlite://./data/club.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    CreateGroup {
        name: String,
    },
    AddMember {
        first_name: String,
        last_name: String,
        #[arg(long)]
        group: Option<String>,
        #[arg(long, default_value = "")]
        class: String,
        #[arg(long, default_value = "pending")]
        status: MemberStatus,
    },
    AddHonour {
        member_id: String,
        name: String,
        #[arg(long, default_value = "")]
        category: String,
        #[arg(long, default_value = "in_progress")]
        status: HonourStatus,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let storage = Storage::new(&cli.database_url).await?;

    match cli.command {
        Command::CreateGroup { name } => {
            let group = storage.create_group(name.trim()).await?;
            println!("created group_id={} name={}", group.group_id.0, group.name);
        }
        Command::AddMember {
            first_name,
            last_name,
            group,
            class,
            status,
        } => {
            let group = match group.as_deref().map(str::trim).filter(|name| !name.is_empty()) {
                Some(name) => match storage.canonical_group_name(name).await? {
                    Some(stored) => Some(stored),
                    None => bail!("group '{name}' does not exist"),
                },
                None => None,
            };
            let member = storage
                .create_member(NewMember {
                    first_name: first_name.trim().to_string(),
                    last_name: last_name.trim().to_string(),
                    group,
                    class: class.trim().to_string(),
                    status,
                })
                .await?;
            println!("created member_id={} name={}", member.id, member.full_name());
        }
        Command::AddHonour {
            member_id,
            name,
            category,
            status,
        } => {
            let member_id = MemberId::from(member_id.as_str());
            if storage.get_member(&member_id).await?.is_none() {
                bail!("member '{member_id}' does not exist");
            }
            let honour = storage
                .create_honour(NewHonour {
                    member_id,
                    name: name.trim().to_string(),
                    category: category.trim().to_string(),
                    status,
                })
                .await?;
            println!("created honour_id={} status={}", honour.id, honour.status);
        }
    }

    Ok(())
}
