use clap::{Parser, Subcommand};
use uuid::Uuid;

use grocer_types::models::Language;

#[derive(Parser)]
#[command(name = "grocer")]
#[command(about = "Shared grocery lists")]
pub struct Cli {
    /// Print read results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create an account and sign in
    Signup {
        email: String,
        #[arg(long, env = "GROCER_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Sign in to an existing account
    Signin {
        email: String,
        #[arg(long, env = "GROCER_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Forget the stored session
    Signout,
    /// Show the signed-in user
    Whoami,
    /// Show owned and shared lists
    Lists,
    /// Create a list and print its share code
    CreateList { name: String },
    /// Join a list with its share code
    Join { share_code: String },
    /// Delete a list you own
    DeleteList {
        list_id: Uuid,
        /// The list's name, typed exactly
        #[arg(long)]
        confirm: String,
    },
    /// Show the items of a list
    Items { list_id: Uuid },
    /// Add an item to a list
    Add {
        list_id: Uuid,
        name: String,
        #[arg(long)]
        store: Option<String>,
        #[arg(long, short = 'q')]
        quantity: Option<String>,
    },
    /// Check or uncheck an item
    Toggle { list_id: Uuid, item_id: Uuid },
    /// Remove an item
    Rm { list_id: Uuid, item_id: Uuid },
    /// Show the stores of a list
    Stores { list_id: Uuid },
    /// Add a store to a list
    AddStore { list_id: Uuid, name: String },
    /// Show who has joined a list
    Members { list_id: Uuid },
    /// Show or change your profile
    Profile {
        #[arg(long)]
        first_name: Option<String>,
        /// en, es or da
        #[arg(long)]
        language: Option<Language>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_add_with_options() {
        let id = Uuid::new_v4();
        let cli = Cli::try_parse_from([
            "grocer",
            "add",
            &id.to_string(),
            "Milk",
            "--store",
            "Aldi",
            "-q",
            "2",
            "--json",
        ])
        .unwrap();

        assert!(cli.json);
        match cli.command {
            Command::Add {
                list_id,
                name,
                store,
                quantity,
            } => {
                assert_eq!(list_id, id);
                assert_eq!(name, "Milk");
                assert_eq!(store.as_deref(), Some("Aldi"));
                assert_eq!(quantity.as_deref(), Some("2"));
            }
            _ => panic!("expected add"),
        }
    }

    #[test]
    fn rejects_unknown_language() {
        assert!(Cli::try_parse_from(["grocer", "profile", "--language", "fr"]).is_err());
        assert!(Cli::try_parse_from(["grocer", "profile", "--language", "ES"]).is_ok());
    }

    #[test]
    fn delete_list_needs_a_confirmation() {
        let id = Uuid::new_v4().to_string();
        assert!(Cli::try_parse_from(["grocer", "delete-list", &id]).is_err());

        let cli = Cli::try_parse_from(["grocer", "delete-list", &id, "--confirm", "Weekly"])
            .unwrap();
        assert!(matches!(cli.command, Command::DeleteList { confirm, .. } if confirm == "Weekly"));
    }

    #[test]
    fn list_ids_must_be_uuids() {
        assert!(Cli::try_parse_from(["grocer", "items", "not-a-uuid"]).is_err());
    }
}
