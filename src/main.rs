//! LingoPal terminal front end
//!
//! Line-based chat: pick topics and a level, then talk. Slash commands manage
//! the vocabulary deck and speech playback.

use anyhow::{Context, Result};
use lingopal::audio::PulsePlayback;
use lingopal::session::{self, Command, Services, Update};
use lingopal::types::{resolve_topic, Level, Message, Sender, VocabularyCard, TOPICS};
use lingopal::{GeminiClient, LingoConfig, SpeechTarget};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

const HELP: &str = "\
Commands:
  /extract        pull new words from the recent conversation
  /words          show the vocabulary deck
  /master <n>     toggle mastery of card n
  /say [n]        speak the nth most recent reply (default: 1)
  /sayword <n>    speak the word on card n
  /help           show this help
  /quit           leave";

/// What the printer has seen so far; used to map numbers to ids
#[derive(Default)]
struct View {
    messages: Vec<Message>,
    deck: Vec<VocabularyCard>,
    mastered: usize,
}

enum Input {
    Send(Command),
    ShowWords,
    Help,
    Quit,
    Invalid(String),
}

fn parse_index(arg: Option<&str>, len: usize, what: &str) -> Result<usize, String> {
    let n: usize = arg
        .ok_or_else(|| format!("Which {}? Give a number.", what))?
        .parse()
        .map_err(|_| format!("'{}' is not a number.", arg.unwrap_or_default()))?;
    if n == 0 || n > len {
        return Err(format!("No {} #{}.", what, n));
    }
    Ok(n - 1)
}

fn parse_input(line: &str, view: &View) -> Input {
    let line = line.trim();
    if !line.starts_with('/') {
        return Input::Send(Command::Say(line.to_string()));
    }

    let mut parts = line.split_whitespace();
    let cmd = parts.next().unwrap_or_default();
    let arg = parts.next();

    match cmd {
        "/extract" => Input::Send(Command::Extract),
        "/words" => Input::ShowWords,
        "/help" => Input::Help,
        "/quit" | "/exit" => Input::Quit,
        "/master" => match parse_index(arg, view.deck.len(), "card") {
            Ok(i) => Input::Send(Command::ToggleMastery(view.deck[i].id.clone())),
            Err(e) => Input::Invalid(e),
        },
        "/sayword" => match parse_index(arg, view.deck.len(), "card") {
            Ok(i) => Input::Send(Command::Speak(SpeechTarget::Card(view.deck[i].id.clone()))),
            Err(e) => Input::Invalid(e),
        },
        "/say" => {
            let replies: Vec<&Message> = view
                .messages
                .iter()
                .rev()
                .filter(|m| m.sender == Sender::Bot)
                .collect();
            let target = match arg {
                None => replies
                    .first()
                    .map(|m| m.id.clone())
                    .ok_or_else(|| "Nothing to say yet.".to_string()),
                Some(_) => parse_index(arg, replies.len(), "reply").map(|i| replies[i].id.clone()),
            };
            match target {
                Ok(id) => Input::Send(Command::Speak(SpeechTarget::Message(id))),
                Err(e) => Input::Invalid(e),
            }
        }
        other => Input::Invalid(format!("Unknown command {}. Try /help.", other)),
    }
}

fn print_words(view: &View) {
    println!("生词本: 已掌握 {} / {} 个单词", view.mastered, view.deck.len());
    if view.deck.is_empty() {
        println!("  还没有单词哦. Chat a bit, then try /extract.");
    }
    for (i, card) in view.deck.iter().enumerate() {
        println!(
            "  {:>2}. [{}] {}  /{}/  {}",
            i + 1,
            if card.mastered { "x" } else { " " },
            card.word,
            card.phonetic,
            card.meaning
        );
        println!("      \"{}\"", card.example_sentence);
    }
}

fn render(update: Update, view: &Mutex<View>) {
    let Ok(mut view) = view.lock() else {
        return;
    };
    match update {
        Update::MessageAdded(message) => {
            if message.sender != Sender::User {
                println!("\nLingoPal> {}\n", message.text);
            }
            view.messages.push(message);
        }
        Update::Deck {
            cards,
            mastered,
            unseen,
        } => {
            let added = cards.len().saturating_sub(view.deck.len());
            view.deck = cards;
            view.mastered = mastered;
            if unseen && added > 0 {
                println!("✨ {} new word(s) in your deck. Type /words to review.", added);
            }
        }
        Update::Status {
            loading, extracting, ..
        } => {
            if loading {
                println!("LingoPal is typing...");
            }
            if extracting {
                println!("提取中... (extracting words)");
            }
        }
        Update::Notice(text) => println!("! {}", text),
    }
}

async fn prompt(lines: &mut Lines<BufReader<Stdin>>, question: &str) -> Result<Option<String>> {
    println!("{}", question);
    Ok(lines.next_line().await?)
}

async fn onboard(lines: &mut Lines<BufReader<Stdin>>) -> Result<Option<(Vec<String>, Level)>> {
    println!("Welcome to LingoPal 英语语伴!\n");
    for (i, topic) in TOPICS.iter().enumerate() {
        println!("  {}. {} ({})", i + 1, topic.label, topic.id);
    }

    let topics = loop {
        let Some(line) = prompt(lines, "\nPick your topics (numbers or names, comma separated):").await?
        else {
            return Ok(None);
        };
        let topics: Vec<String> = line
            .split(',')
            .filter(|t| !t.trim().is_empty())
            .map(resolve_topic)
            .collect();
        if !topics.is_empty() {
            break topics;
        }
        println!("Please pick at least one topic.");
    };

    for (i, level) in Level::ALL.iter().enumerate() {
        println!("  {}. {} - {}", i + 1, level, level.label());
    }
    let level = loop {
        let Some(line) = prompt(lines, "Your level? [2]").await? else {
            return Ok(None);
        };
        if line.trim().is_empty() {
            break Level::default();
        }
        match line.parse::<Level>() {
            Ok(level) => break level,
            Err(e) => println!("{}", e),
        }
    };

    Ok(Some((topics, level)))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so they don't interleave with the chat
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lingopal=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = LingoConfig::from_env().context("failed to load configuration")?;
    info!("Starting LingoPal with model {}", config.chat_model);

    let backend = Arc::new(GeminiClient::from_config(&config)?);
    let sink = Arc::new(PulsePlayback::new("lingopal"));
    let services = Arc::new(Services::new(backend, sink, &config));

    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (upd_tx, mut upd_rx) = mpsc::unbounded_channel();
    let session = tokio::spawn(session::run(services, cmd_rx, upd_tx));

    let view = Arc::new(Mutex::new(View::default()));
    let printer_view = view.clone();
    let printer = tokio::spawn(async move {
        while let Some(update) = upd_rx.recv().await {
            render(update, &printer_view);
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    if let Some((topics, level)) = onboard(&mut lines).await? {
        cmd_tx.send(Command::Onboard { topics, level })?;
        println!("{}", HELP);

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let input = match view.lock() {
                Ok(view) => parse_input(&line, &view),
                Err(_) => break,
            };
            match input {
                Input::Send(command) => cmd_tx.send(command)?,
                Input::ShowWords => {
                    if let Ok(view) = view.lock() {
                        print_words(&view);
                    }
                    cmd_tx.send(Command::DeckSeen)?;
                }
                Input::Help => println!("{}", HELP),
                Input::Quit => break,
                Input::Invalid(reason) => println!("! {}", reason),
            }
        }
    }

    cmd_tx.send(Command::Quit)?;
    let state = session.await?;
    printer.await?;

    println!(
        "Bye! You learned {} word(s) and mastered {} today. 👋",
        state.deck().len(),
        state.mastered_count()
    );
    Ok(())
}
