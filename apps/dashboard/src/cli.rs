use clap::{Args as ClapArgs, Parser, Subcommand};
use shared::domain::{FilterMode, ItemDraft, SearchPredicate};

#[derive(Parser, Debug)]
#[command(name = "dashboard", version, about = "Inventory dashboard client")]
pub struct Args {
    /// Inventory API base url. Overrides dashboard.toml and the environment.
    #[arg(long, global = true)]
    pub api_url: Option<String>,
    /// Local state database (sqlite url or file path).
    #[arg(long, global = true)]
    pub database_url: Option<String>,
    #[command(subcommand)]
    pub command: Command,
}

/// One line typed at the interactive prompt.
#[derive(Parser, Debug)]
#[command(name = "dashboard", no_binary_name = true)]
pub struct ShellLine {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Log in; prompts for the password when --password is omitted.
    Login {
        username: String,
        #[arg(long)]
        password: Option<String>,
    },
    Register {
        username: String,
        #[arg(long)]
        password: Option<String>,
    },
    Logout,
    Whoami,
    /// Show the current list, or switch filter with --filter.
    List {
        #[arg(long)]
        filter: Option<FilterMode>,
    },
    Search(SearchArgs),
    ClearSearch,
    /// Switch filter mode: all, available or not-available.
    Filter { mode: FilterMode },
    Purchase { id: String, quantity: u32 },
    Restock { id: String, quantity: u32 },
    Create(DraftArgs),
    Update {
        id: String,
        #[command(flatten)]
        draft: DraftArgs,
    },
    Delete {
        id: String,
        /// Skip the confirmation prompt.
        #[arg(long, short = 'y')]
        yes: bool,
    },
    /// Interactive prompt; search and filter state lives across commands.
    Shell,
}

#[derive(ClapArgs, Debug, Clone, Default, PartialEq)]
pub struct SearchArgs {
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub category: Option<String>,
    #[arg(long)]
    pub min_price: Option<String>,
    #[arg(long)]
    pub max_price: Option<String>,
}

impl From<SearchArgs> for SearchPredicate {
    fn from(args: SearchArgs) -> Self {
        Self {
            name: args.name,
            category: args.category,
            min_price: args.min_price,
            max_price: args.max_price,
        }
    }
}

#[derive(ClapArgs, Debug, Clone, PartialEq)]
pub struct DraftArgs {
    #[arg(long)]
    pub name: String,
    #[arg(long)]
    pub category: String,
    #[arg(long)]
    pub price: f64,
    #[arg(long)]
    pub quantity: u32,
}

impl From<DraftArgs> for ItemDraft {
    fn from(args: DraftArgs) -> Self {
        ItemDraft::new(args.name, args.category, args.price, args.quantity)
    }
}

/// Splits a prompt line into words. Single or double quotes group words.
pub fn split_line(line: &str) -> Result<Vec<String>, String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut in_word = false;

    for ch in line.chars() {
        match quote {
            Some(open) if ch == open => quote = None,
            Some(_) => current.push(ch),
            None if ch == '"' || ch == '\'' => {
                quote = Some(ch);
                in_word = true;
            }
            None if ch.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            None => {
                current.push(ch);
                in_word = true;
            }
        }
    }

    if quote.is_some() {
        return Err("unterminated quote".into());
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}
