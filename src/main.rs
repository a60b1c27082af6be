//! Binary entrypoint for the SideQuest CLI.
//!
//! Commands:
//! - `init` - write a starter `sidequest.toml`
//! - `user create|show` - register a user, print level and XP bar
//! - `quest create|list|show|complete|delete` - manage quests
//! - `quest generate|regenerate` - plan a quest with the configured model (feature `ai`)
//! - `sidequest add|complete|delete|generate` - manage a quest's steps
//!
//! `--ephemeral` swaps the sled store for an in-memory one, handy for trying
//! commands without touching `data_dir`.
use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use log::{debug, info};

use sidequest::config::Config;
use sidequest::progression::{LevelChange, ProgressionEngine};
use sidequest::store::{DocumentStore, MemoryDocumentStore, SledDocumentStore};
use sidequest::types::{NewQuest, NewSidequest, QuestRecord, SidequestRecord};

#[derive(Parser)]
#[command(name = "sidequest")]
#[command(about = "Quest and sidequest XP progression tracker")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "sidequest.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use an in-memory store instead of the on-disk database
    #[arg(long, global = true)]
    ephemeral: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init,
    /// Manage users
    User {
        #[command(subcommand)]
        action: UserCommand,
    },
    /// Manage quests
    Quest {
        #[command(subcommand)]
        action: QuestCommand,
    },
    /// Manage sidequests
    Sidequest {
        #[command(subcommand)]
        action: SidequestCommand,
    },
}

#[derive(Subcommand)]
enum UserCommand {
    /// Create a user at level 1 (no-op if the id exists)
    Create {
        id: String,
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Show level and XP progress
    Show { id: String },
}

#[derive(Subcommand)]
enum QuestCommand {
    /// Create an empty quest
    Create {
        #[arg(short, long)]
        user: String,
        title: String,
        #[arg(short, long, default_value = "")]
        description: String,
        /// Completion bonus
        #[arg(short, long, default_value_t = 0)]
        xp: u64,
    },
    /// List a user's quests, newest first
    List {
        #[arg(short, long)]
        user: String,
    },
    /// Show a quest and its sidequests
    Show { id: String },
    /// Complete a quest whose sidequests are all done
    Complete { id: String },
    /// Delete a quest
    Delete { id: String },
    /// Plan a new quest with the text generator
    Generate {
        #[arg(short, long)]
        user: String,
        title: String,
        #[arg(short, long, default_value = "")]
        description: String,
    },
    /// Replace a quest's sidequests with a freshly generated plan
    Regenerate { id: String },
}

#[derive(Subcommand)]
enum SidequestCommand {
    /// Append a sidequest to a quest
    Add {
        #[arg(short, long)]
        quest: String,
        title: String,
        #[arg(short, long, default_value = "")]
        description: String,
        #[arg(short, long, default_value_t = 0)]
        xp: u64,
    },
    /// Complete a sidequest
    Complete { id: String },
    /// Delete a sidequest from its quest
    Delete {
        id: String,
        #[arg(short, long)]
        quest: String,
    },
    /// Generate more sidequests for a quest
    Generate {
        #[arg(short, long)]
        quest: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Init = cli.command {
        init_logging(&None, cli.verbose);
        Config::create_default(&cli.config).await?;
        info!("Configuration file created at {}", cli.config);
        println!("Wrote {}", cli.config);
        return Ok(());
    }

    let config = Config::load_or_default(&cli.config).await?;
    config.validate()?;
    init_logging(&Some(config.clone()), cli.verbose);

    let store: Arc<dyn DocumentStore> = if cli.ephemeral {
        debug!("using in-memory store");
        Arc::new(MemoryDocumentStore::new())
    } else {
        Arc::new(SledDocumentStore::open(&config.storage.data_dir)?)
    };
    let engine = ProgressionEngine::with_options(store, config.progression.engine_options());

    match cli.command {
        Commands::Init => {}
        Commands::User { action } => run_user(&engine, action)?,
        Commands::Quest { action } => run_quest(&engine, &config, action).await?,
        Commands::Sidequest { action } => run_sidequest(&engine, &config, action).await?,
    }
    Ok(())
}

fn run_user(engine: &ProgressionEngine, action: UserCommand) -> Result<()> {
    match action {
        UserCommand::Create { id, name } => {
            let user = engine.create_user(&id, name.as_deref().unwrap_or(&id))?;
            println!("{} ({}) level {} xp {}", user.id, user.display_name, user.level, user.current_xp);
        }
        UserCommand::Show { id } => {
            let user = engine
                .get_user(&id)?
                .ok_or_else(|| anyhow!("user {} not found", id))?;
            let progress = engine.user_progress(&id)?;
            println!("{} ({})", user.id, user.display_name);
            println!(
                "Level {}  {}/{} XP  {}",
                progress.level,
                progress.current_xp,
                progress.threshold,
                xp_bar(progress.fraction)
            );
        }
    }
    Ok(())
}

async fn run_quest(engine: &ProgressionEngine, config: &Config, action: QuestCommand) -> Result<()> {
    match action {
        QuestCommand::Create {
            user,
            title,
            description,
            xp,
        } => {
            let quest = engine.create_quest(&user, NewQuest::new(&title, &description, xp))?;
            println!("Created quest {}", quest.id);
        }
        QuestCommand::List { user } => {
            let quests = engine.list_quests(&user)?;
            if quests.is_empty() {
                println!("No quests.");
            }
            for quest in quests {
                let progress = engine.quest_progress(&quest.id)?;
                println!(
                    "{}  [{}] {}  {}/{} steps  +{} XP",
                    quest.id,
                    quest.status.as_str(),
                    quest.title,
                    progress.completed,
                    progress.total,
                    quest.total_quest_xp
                );
            }
        }
        QuestCommand::Show { id } => {
            let quest = engine
                .get_quest(&id)?
                .ok_or_else(|| anyhow!("quest {} not found", id))?;
            let sidequests = engine.list_sidequests(&id)?;
            print_quest(&quest, &sidequests);
        }
        QuestCommand::Complete { id } => {
            let done = engine.complete_quest(&id)?;
            println!("Quest {} completed", done.quest.title);
            print_award(done.award.as_ref());
        }
        QuestCommand::Delete { id } => {
            let removed = engine.delete_quest(&id)?;
            println!("Deleted quest {} ({} sidequests)", id, removed);
        }
        QuestCommand::Generate {
            user,
            title,
            description,
        } => {
            let planner = planner(config)?;
            let plan = planner.generate_quest(engine, &user, &title, &description).await?;
            print_quest(&plan.quest, &plan.sidequests);
        }
        QuestCommand::Regenerate { id } => {
            let planner = planner(config)?;
            let plan = planner.regenerate_quest(engine, &id).await?;
            print_quest(&plan.quest, &plan.sidequests);
        }
    }
    Ok(())
}

async fn run_sidequest(engine: &ProgressionEngine, config: &Config, action: SidequestCommand) -> Result<()> {
    match action {
        SidequestCommand::Add {
            quest,
            title,
            description,
            xp,
        } => {
            let sidequest = engine.add_sidequest(&quest, NewSidequest::new(&title, &description, xp))?;
            println!("Added sidequest {} at position {}", sidequest.id, sidequest.order_index + 1);
        }
        SidequestCommand::Complete { id } => match engine.complete_sidequest(&id)? {
            Some(done) => {
                println!("Completed {}", done.sidequest.title);
                print_award(done.sidequest_award.as_ref());
                if done.quest_completed {
                    println!("Quest complete!");
                    print_award(done.quest_award.as_ref());
                }
            }
            None => println!("Sidequest {} not found", id),
        },
        SidequestCommand::Delete { id, quest } => {
            let removal = engine.delete_sidequest(&id, &quest)?;
            println!("Deleted {}", removal.removed.title);
            if let Some(total) = removal.total_quest_xp {
                println!("Quest bonus reduced by {} to {}", removal.reduction, total);
            }
        }
        SidequestCommand::Generate { quest } => {
            let planner = planner(config)?;
            let added = planner.generate_sidequests(engine, &quest).await?;
            for sidequest in added {
                println!(
                    "{}. {} (+{} XP)",
                    sidequest.order_index + 1,
                    sidequest.title,
                    sidequest.total_sidequest_xp
                );
            }
        }
    }
    Ok(())
}

#[cfg(feature = "ai")]
fn planner(config: &Config) -> Result<sidequest::generator::QuestPlanner<sidequest::openai::OpenAiClient>> {
    let client = sidequest::openai::OpenAiClient::new(config.ai.clone());
    let options = client.default_options();
    Ok(sidequest::generator::QuestPlanner::with_options(client, options))
}

#[cfg(not(feature = "ai"))]
fn planner(_config: &Config) -> Result<sidequest::generator::QuestPlanner<Unavailable>> {
    Err(anyhow!("this build has no text generator; rebuild with --features ai"))
}

#[cfg(not(feature = "ai"))]
struct Unavailable;

#[cfg(not(feature = "ai"))]
#[async_trait::async_trait]
impl sidequest::generator::TextGenerator for Unavailable {
    async fn chat(
        &self,
        _messages: &[sidequest::generator::ChatMessage],
        _options: &sidequest::generator::ChatOptions,
    ) -> Result<String, sidequest::SideQuestError> {
        Err(sidequest::SideQuestError::ConfigurationMissing("text generation".to_string()))
    }
}

fn print_quest(quest: &QuestRecord, sidequests: &[SidequestRecord]) {
    println!("{}  [{}]", quest.title, quest.status.as_str());
    if !quest.description.is_empty() {
        println!("  {}", quest.description);
    }
    println!("  id {}  bonus +{} XP", quest.id, quest.total_quest_xp);
    for sidequest in sidequests {
        let mark = if sidequest.is_completed { "x" } else { " " };
        println!(
            "  [{}] {}. {} (+{} XP)  {}",
            mark,
            sidequest.order_index + 1,
            sidequest.title,
            sidequest.total_sidequest_xp,
            sidequest.id
        );
    }
}

fn print_award(award: Option<&LevelChange>) {
    match award {
        Some(change) if change.leveled_up() => println!(
            "+{} XP, level up! {} -> {} ({} XP)",
            change.awarded, change.previous_level, change.level, change.current_xp
        ),
        Some(change) => println!("+{} XP (level {}, {} XP)", change.awarded, change.level, change.current_xp),
        None => {}
    }
}

fn xp_bar(fraction: f64) -> String {
    const WIDTH: usize = 20;
    let filled = ((fraction.clamp(0.0, 1.0) * WIDTH as f64).round() as usize).min(WIDTH);
    format!("[{}{}]", "#".repeat(filled), "-".repeat(WIDTH - filled))
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity wins over the configured level
    let base_level = match (verbosity, config) {
        (0, Some(cfg)) => cfg.logging.level_filter(),
        (0, None) => log::LevelFilter::Info,
        (1, _) => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);

    let log_file = config
        .as_ref()
        .and_then(|cfg| cfg.logging.file.as_ref())
        .and_then(|path| std::fs::OpenOptions::new().create(true).append(true).open(path).ok());

    if let Some(f) = log_file {
        let write_mutex = std::sync::Arc::new(std::sync::Mutex::new(f));
        let is_tty = atty::is(atty::Stream::Stderr);
        builder.format(move |fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            let line = format!("{} [{}] {}", ts, record.level(), record.args());
            if let Ok(mut guard) = write_mutex.lock() {
                let _ = writeln!(guard, "{}", line);
            }
            if is_tty {
                writeln!(fmt, "{}", line)
            } else {
                Ok(())
            }
        });
    } else {
        builder.format(|fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            writeln!(fmt, "{} [{}] {}", ts, record.level(), record.args())
        });
    }
    let _ = builder.try_init();
}
