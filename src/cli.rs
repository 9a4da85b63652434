use std::env;

use anyhow::Result;

use gcal_feeds::{Calendar, CalendarSet, FetchOutcome, SyncEngine};

pub const USAGE: &str = "\
Usage: gcal-feeds [COMMAND]

Commands:
  sync                  Fetch calendars and merge them with local preferences (default)
  login                 Sign in, then sync
  list                  Show cached calendars
  show <ID>             Make a calendar visible and push the change
  hide <ID>             Hide a calendar and push the change
  sets                  Show calendar sets
  sets add <NAME> [ID]  Create a calendar set
  sets use <NAME>       Activate a set and push its selection";

#[derive(Debug, Clone, PartialEq)]
pub enum CliMode {
    Help,
    Sync,
    Login,
    List,
    Visibility { calendar_id: String, selected: bool },
    Sets,
    AddSet { name: String, selection: Vec<String> },
    UseSet { name: String },
}

pub fn parse_cli_mode() -> Result<CliMode, String> {
    parse_args(env::args().skip(1))
}

pub fn parse_args<I>(args: I) -> Result<CliMode, String>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();

    let Some(command) = args.next() else {
        return Ok(CliMode::Sync);
    };

    let mode = match command.as_str() {
        "--help" | "-h" | "help" => CliMode::Help,
        "sync" => CliMode::Sync,
        "login" => CliMode::Login,
        "list" => CliMode::List,
        "show" | "hide" => {
            let calendar_id = args
                .next()
                .ok_or_else(|| format!("'{}' needs a calendar id", command))?;
            CliMode::Visibility {
                calendar_id,
                selected: command == "show",
            }
        }
        "sets" => match args.next().as_deref() {
            None => CliMode::Sets,
            Some("add") => {
                let name = args.next().ok_or("'sets add' needs a name")?;
                CliMode::AddSet {
                    name,
                    selection: args.by_ref().collect(),
                }
            }
            Some("use") => {
                let name = args.next().ok_or("'sets use' needs a name")?;
                CliMode::UseSet { name }
            }
            Some(other) => return Err(format!("Unknown sets command: {}", other)),
        },
        _ => return Err(format!("Unknown argument: {}", command)),
    };

    match args.next() {
        Some(extra) => Err(format!("Unexpected argument: {}", extra)),
        None => Ok(mode),
    }
}

pub async fn run(engine: &SyncEngine, mode: CliMode) -> Result<()> {
    match mode {
        CliMode::Help => println!("{}", USAGE),
        CliMode::Sync => report_fetch(engine.fetch_calendars().await?),
        CliMode::Login => report_fetch(engine.request_interactive_auth_token().await?),
        CliMode::List => {
            let calendars = engine.calendars()?;
            if calendars.is_empty() {
                println!("No calendars cached. Run 'gcal-feeds sync' first.");
            }
            for calendar in calendars.values() {
                println!("{}", format_calendar_line(calendar));
            }
        }
        CliMode::Visibility { calendar_id, selected } => {
            engine.set_calendar_visibility(&calendar_id, selected).await?;
            println!("{} is now {}", calendar_id, if selected { "visible" } else { "hidden" });
        }
        CliMode::Sets => {
            let sets = engine.sets()?;
            if sets.is_empty() {
                println!("No calendar sets defined.");
            }
            for set in &sets {
                println!("{}", format_set_line(set));
            }
        }
        CliMode::AddSet { name, selection } => {
            engine.create_set(&name, selection)?;
            println!("Created set {}", name);
        }
        CliMode::UseSet { name } => {
            engine.activate_set(&name)?;
            let summary = engine.update_sets().await?;
            println!("Set {} active, {} calendars updated", name, summary.pushed);
        }
    }

    Ok(())
}

fn report_fetch(outcome: FetchOutcome) {
    match outcome {
        FetchOutcome::Updated { calendars } => println!("Synced {} calendars", calendars),
        FetchOutcome::NotAuthorized => println!("Not signed in, nothing synced"),
    }
}

fn format_calendar_line(calendar: &Calendar) -> String {
    format!(
        "[{}] {:<40} {}{}",
        if calendar.selected { "x" } else { " " },
        calendar.summary,
        calendar.id,
        if calendar.access_role { "" } else { " (read-only)" }
    )
}

fn format_set_line(set: &CalendarSet) -> String {
    format!(
        "{} {} ({} calendars)",
        if set.selected { "*" } else { " " },
        set.name,
        set.selection.len()
    )
}
