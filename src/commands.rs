//! Command execution.

use crate::config::Config;
use crate::Commands;
use colored::Colorize;
use serde_json::Value;
use std::sync::Arc;
use talkstate_core::{
    public_label, public_label_for_raw, BroadcastNotifier, Expectation, HookContext, NoticeFilter,
    Signal, State, Talk, TransitionEngine,
};
use talkstate_storage::TalkStore;

/// Everything a command needs, built once in `main`.
pub struct Session {
    pub engine: Arc<TransitionEngine>,
    pub notifier: Option<Arc<BroadcastNotifier>>,
    pub config: Config,
}

impl Session {
    fn store(&self) -> Result<TalkStore, Box<dyn std::error::Error>> {
        Ok(TalkStore::open(
            self.engine.clone(),
            self.config.storage.talks_dir(),
        )?)
    }
}

/// Executes a command and returns the formatted output.
pub fn execute(session: &Session, cmd: Commands) -> Result<String, Box<dyn std::error::Error>> {
    match cmd {
        Commands::Table { json } => {
            let table = session.engine.table();
            if json {
                return Ok(format_json(&table.to_json()?));
            }

            let mut lines = vec![format!(
                "{} (checksum: {})",
                "Transition table".bold(),
                table.checksum()
            )];
            for rule in table.rules() {
                let from: Vec<&str> = rule.from.iter().map(State::as_str).collect();
                let hook = rule
                    .hook
                    .map(|h| format!(" [{}]", h).dimmed().to_string())
                    .unwrap_or_default();
                lines.push(format!(
                    "  {:<13} {} -> {}{}",
                    rule.signal.as_str().cyan(),
                    from.join(", "),
                    rule.to.as_str().yellow(),
                    hook
                ));
            }
            Ok(lines.join("\n"))
        }

        Commands::Available { state } => {
            let state: State = state.parse()?;
            let signals = session.engine.available_signals(state);
            if signals.is_empty() {
                return Ok(format!("{} is terminal", state.as_str().yellow()));
            }
            Ok(signals
                .iter()
                .map(Signal::as_str)
                .collect::<Vec<_>>()
                .join("\n"))
        }

        Commands::Label { state } => Ok(public_label_for_raw(&state).to_string()),

        Commands::Submit {
            title,
            abstract_text,
        } => {
            let store = session.store()?;
            let talk = store.submit(title, abstract_text)?;
            Ok(format!(
                "{} talk {} (state: {})",
                "Submitted".green(),
                talk.id.cyan(),
                talk.state.as_str().yellow()
            ))
        }

        Commands::Show { id } => {
            let store = session.store()?;
            let talk = store.get(&id)?;
            Ok(format_talk(&session.engine, &talk))
        }

        Commands::List => {
            let store = session.store()?;
            let talks = store.list();
            if talks.is_empty() {
                return Ok("No talks".dimmed().to_string());
            }
            Ok(talks
                .iter()
                .map(|t| {
                    format!(
                        "{}  {:<11} v{:<3} {}",
                        t.id.cyan(),
                        t.state.as_str().yellow(),
                        t.version,
                        t.title
                    )
                })
                .collect::<Vec<_>>()
                .join("\n"))
        }

        Commands::Fire {
            id,
            signal,
            ctx,
            expected_state,
            expected_version,
        } => {
            let signal: Signal = signal.parse()?;
            let expectation = Expectation {
                state: expected_state.map(|s| s.parse()).transpose()?,
                version: expected_version,
            };

            let data = match ctx {
                Some(arg) => parse_json_arg(&arg)?,
                None => Value::Null,
            };
            if !(data.is_object() || data.is_null()) {
                return Err("hook context must be a JSON object".into());
            }
            let mut hook_ctx = HookContext::new(data);
            hook_ctx.set_default(
                "send_mail",
                Value::Bool(session.config.review.send_mail_default),
            );

            // Subscribe before firing; broadcast drops notices nobody listens for.
            let subscription = session.notifier.as_ref().map(|n| {
                let filter = NoticeFilter {
                    talks: vec![id.clone()],
                    ..Default::default()
                };
                (n, n.subscribe(filter))
            });

            let store = session.store()?;
            let outcome = store.fire(&id, signal, hook_ctx, expectation)?;

            let mut lines = vec![format!(
                "{} {} on talk {}: {} -> {} (version: {})",
                "Fired".green(),
                outcome.signal.as_str().cyan(),
                outcome.talk_id.cyan(),
                outcome.from.as_str().yellow(),
                outcome.to.as_str().yellow(),
                outcome.version
            )];

            if let Some((notifier, (sub_id, mut receiver))) = subscription {
                while let Ok(notice) = receiver.try_recv() {
                    if !notifier.accepts(&sub_id, &notice) {
                        continue;
                    }
                    tracing::info!(
                        talk = %notice.talk_id,
                        hook = %notice.hook,
                        to = %notice.to,
                        "transition notice queued"
                    );
                    lines.push(format!(
                        "{} {} for talk {}",
                        "Queued".green(),
                        notice.hook.as_str().dimmed(),
                        notice.talk_id
                    ));
                }
                notifier.unsubscribe(&sub_id);
            }

            Ok(lines.join("\n"))
        }
    }
}

fn format_talk(engine: &TransitionEngine, talk: &Talk) -> String {
    let available: Vec<&str> = engine
        .available_signals(talk.state)
        .iter()
        .map(Signal::as_str)
        .collect();

    let mut lines = vec![
        format!("Talk {}", talk.id.cyan()).bold().to_string(),
        format!("  title:     {}", talk.title),
        format!(
            "  state:     {} ({})",
            talk.state.as_str().yellow(),
            public_label(talk.state)
        ),
        format!("  version:   {}", talk.version),
        format!("  words:     {}", talk.abstract_word_count()),
    ];
    if available.is_empty() {
        lines.push(format!("  signals:   {}", "none".dimmed()));
    } else {
        lines.push(format!("  signals:   {}", available.join(", ")));
    }
    lines.join("\n")
}

/// Formats JSON for display.
fn format_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// Parses a JSON argument, supporting @file syntax.
fn parse_json_arg(arg: &str) -> Result<Value, Box<dyn std::error::Error>> {
    if let Some(path) = arg.strip_prefix('@') {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    } else {
        Ok(serde_json::from_str(arg)?)
    }
}
