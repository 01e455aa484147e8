use std::sync::Arc;

use anyhow::{Result, anyhow, bail};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use grocer_client::GrocerClient;
use grocer_db::LocalBackend;
use grocer_types::Backend;
use grocer_types::api::{Credentials, ProfileUpdate};
use grocer_types::models::{ANONYMOUS_MEMBER, Language, ListRole};

use crate::cli::Command;
use crate::session::SessionFile;

pub struct App {
    pub backend: Arc<LocalBackend>,
    pub client: GrocerClient,
    pub session: SessionFile,
    pub json: bool,
}

impl App {
    /// Picks up the session of a previous `signin`. A stale token is dropped.
    pub async fn restore(&self) -> Result<()> {
        let Some(token) = self.session.load()? else {
            return Ok(());
        };
        match self.backend.restore_session(&token).await {
            Ok(session) => info!("Restored session for {}", session.user.email),
            Err(e) => {
                warn!("Stored session is no longer valid: {}", e);
                self.session.clear()?;
            }
        }
        Ok(())
    }

    pub async fn run(&self, command: Command) -> Result<()> {
        match command {
            Command::Signup { email, password } => {
                let session = self.backend.sign_up(&Credentials { email, password }).await?;
                self.session.save(&session.access_token)?;
                println!("Signed up as {}", session.user.email);
            }
            Command::Signin { email, password } => {
                let session = self.backend.sign_in(&Credentials { email, password }).await?;
                self.session.save(&session.access_token)?;
                println!("Signed in as {}", session.user.email);
            }
            Command::Signout => {
                self.backend.sign_out().await?;
                self.session.clear()?;
                println!("Signed out");
            }
            Command::Whoami => {
                let user = self.backend.current_user().await?;
                self.print(&user, || println!("{} ({})", user.email, user.id))?;
            }
            Command::Lists => {
                let lists = self.client.sync().refresh_lists().await?;
                self.print(&lists, || {
                    if lists.is_empty() {
                        println!("No lists yet. Create one or join with a share code.");
                    }
                    for summary in &lists {
                        let role = match summary.role {
                            ListRole::Owner => "owner",
                            ListRole::Shared => "shared",
                        };
                        println!(
                            "{}  {:<24} {:>3} items  {:<6}  {}",
                            summary.list.share_code,
                            summary.list.name,
                            summary.item_count,
                            role,
                            summary.list.id
                        );
                    }
                })?;
            }
            Command::CreateList { name } => {
                let list = self.client.sync().create_list(&name).await?;
                self.print(&list, || {
                    println!("{}  share code {}", list.id, list.share_code)
                })?;
            }
            Command::Join { share_code } => {
                let user = self.backend.current_user().await?;
                let outcome = self.client.membership().join_list(&share_code, user.id).await?;
                self.print(&outcome, || println!("{}", outcome.list.id))?;
            }
            Command::DeleteList { list_id, confirm } => {
                let user = self.backend.current_user().await?;
                // Populate the dashboard so the optimistic removal has a row to remove
                let lists = self.client.sync().refresh_lists().await?;
                let summary = lists
                    .iter()
                    .find(|s| s.list.id == list_id)
                    .ok_or_else(|| anyhow!("no list {} on your dashboard", list_id))?;
                if confirm != summary.list.name {
                    bail!(
                        "confirmation does not match; type \"{}\" exactly to delete",
                        summary.list.name
                    );
                }
                let outcome = self.client.sync().delete_list(list_id, user.id).await?;
                if !outcome.deleted {
                    bail!("list {} was not deleted", list_id);
                }
            }
            Command::Items { list_id } => {
                let items = self.client.sync().list(list_id).refresh_items().await?;
                self.print(&items, || {
                    for item in &items {
                        let mark = if item.completed { "x" } else { " " };
                        let mut line = format!("[{}] {}", mark, item.name);
                        if let Some(quantity) = &item.quantity {
                            line.push_str(&format!(" ({})", quantity));
                        }
                        if let Some(store) = &item.store {
                            line.push_str(&format!(" @ {}", store));
                        }
                        println!("{:<48} {}", line, item.id);
                    }
                })?;
            }
            Command::Add {
                list_id,
                name,
                store,
                quantity,
            } => {
                let item = self
                    .client
                    .sync()
                    .list(list_id)
                    .add_item(&name, store.as_deref(), quantity.as_deref())
                    .await?;
                self.print(&item, || println!("{}", item.id))?;
            }
            Command::Toggle { list_id, item_id } => {
                let current = self.current_completed(list_id, item_id).await?;
                self.client
                    .sync()
                    .list(list_id)
                    .toggle_item(item_id, current)
                    .await?;
            }
            Command::Rm { list_id, item_id } => {
                let items = self.client.sync().list(list_id);
                items.refresh_items().await?;
                items.delete_item(item_id).await?;
            }
            Command::Stores { list_id } => {
                let stores = self.client.sync().list(list_id).refresh_stores().await?;
                self.print(&stores, || stores.iter().for_each(|s| println!("{}", s)))?;
            }
            Command::AddStore { list_id, name } => {
                self.client.sync().list(list_id).add_store(&name).await?;
            }
            Command::Members { list_id } => {
                let members = self.client.sync().list(list_id).refresh_members().await?;
                self.print(&members, || {
                    if members.is_empty() {
                        println!("Nobody has joined yet.");
                    }
                    for member in &members {
                        println!("{:<24} {}", member.display_name, member.user_id);
                    }
                })?;
            }
            Command::Profile {
                first_name,
                language,
            } => self.profile(first_name, language).await?,
        }
        Ok(())
    }

    async fn profile(
        &self,
        first_name: Option<String>,
        language: Option<Language>,
    ) -> Result<()> {
        let profile = if first_name.is_none() && language.is_none() {
            let user = self.backend.current_user().await?;
            self.backend
                .profile(user.id)
                .await?
                .ok_or_else(|| anyhow!("no profile for {}", user.email))?
        } else {
            self.client
                .sync()
                .update_profile(ProfileUpdate {
                    first_name,
                    preferred_language: language,
                })
                .await?
        };

        self.print(&profile, || {
            println!(
                "{} (language: {})",
                profile.first_name.as_deref().unwrap_or(ANONYMOUS_MEMBER),
                profile.preferred_language
            )
        })
    }

    async fn current_completed(&self, list_id: Uuid, item_id: Uuid) -> Result<bool> {
        self.client.sync().list(list_id).refresh_items().await?;
        self.client
            .cache()
            .item(list_id, item_id)
            .map(|item| item.completed)
            .ok_or_else(|| anyhow!("no item {} in list {}", item_id, list_id))
    }

    fn print<T: Serialize>(&self, value: &T, human: impl FnOnce()) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            human();
        }
        Ok(())
    }
}
