//! Session runner - connects the state machine to the backend services
//!
//! [`Services::perform`] executes one [`Effect`] and returns its
//! [`Completion`]. [`Session`] drives effects one at a time (handy for
//! scripts and tests); [`run`] is the event loop used by the terminal front
//! end, where replies, extraction and playback run as concurrent tasks while
//! the loop keeps accepting commands.

use crate::audio::AudioSink;
use crate::config::LingoConfig;
use crate::conversation::ConversationClient;
use crate::gemini::GenerativeBackend;
use crate::speech::SpeechPlayer;
use crate::state::{Completion, ConversationState, Effect, SpeechTarget};
use crate::types::{Level, Message, VocabularyCard};
use crate::vocabulary::VocabularyExtractor;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info};

/// The three backend-facing services
pub struct Services<B, S> {
    conversation: ConversationClient<B>,
    vocabulary: VocabularyExtractor<B>,
    speech: SpeechPlayer<B, S>,
}

impl<B, S> Services<B, S>
where
    B: GenerativeBackend,
    S: AudioSink,
{
    pub fn new(backend: Arc<B>, sink: Arc<S>, config: &LingoConfig) -> Self {
        Self {
            conversation: ConversationClient::new(backend.clone(), config),
            vocabulary: VocabularyExtractor::new(backend.clone(), config),
            speech: SpeechPlayer::new(backend, sink, config),
        }
    }

    /// Execute one effect. Never fails: every service absorbs its own errors.
    pub async fn perform(&self, effect: Effect) -> Completion {
        match effect {
            Effect::RequestReply {
                history,
                utterance,
                interests,
            } => Completion::Reply(
                self.conversation
                    .get_reply(&history, &utterance, &interests)
                    .await,
            ),
            Effect::ExtractVocabulary { source_text } => {
                Completion::Vocabulary(self.vocabulary.extract(&source_text).await)
            }
            Effect::Speak { target, text } => {
                debug!("Speaking {:?}", target);
                self.speech.speak(&text).await;
                Completion::PlaybackFinished
            }
        }
    }
}

/// Serial driver: every action runs its effects to completion before
/// returning.
pub struct Session<B, S> {
    state: ConversationState,
    services: Arc<Services<B, S>>,
}

impl<B, S> Session<B, S>
where
    B: GenerativeBackend,
    S: AudioSink,
{
    pub fn new(services: Arc<Services<B, S>>) -> Self {
        Self {
            state: ConversationState::new(),
            services,
        }
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    async fn settle(&mut self) {
        loop {
            let effects = self.state.drain_effects();
            if effects.is_empty() {
                break;
            }
            for effect in effects {
                let completion = self.services.perform(effect).await;
                self.state.apply(completion);
            }
        }
    }

    pub fn complete_onboarding(&mut self, topics: &[String], level: Level) -> bool {
        self.state.complete_onboarding(topics, level)
    }

    pub async fn send_user_message(&mut self, text: &str) -> bool {
        let accepted = self.state.send_user_message(text);
        self.settle().await;
        accepted
    }

    pub async fn extract_vocabulary(&mut self) -> bool {
        let accepted = self.state.extract_vocabulary();
        self.settle().await;
        accepted
    }

    pub fn toggle_mastery(&mut self, card_id: &str) -> bool {
        self.state.toggle_mastery(card_id)
    }

    pub async fn speak(&mut self, target: SpeechTarget) -> bool {
        let accepted = self.state.request_speech(target);
        self.settle().await;
        accepted
    }
}

/// Commands accepted by the event loop
#[derive(Debug, Clone)]
pub enum Command {
    Onboard { topics: Vec<String>, level: Level },
    Say(String),
    Extract,
    ToggleMastery(String),
    Speak(SpeechTarget),
    /// Marks the deck as viewed
    DeckSeen,
    Quit,
}

/// Changes published by the event loop
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    MessageAdded(Message),
    Deck {
        cards: Vec<VocabularyCard>,
        mastered: usize,
        unseen: bool,
    },
    Status {
        loading: bool,
        extracting: bool,
        playing: bool,
    },
    /// A command was rejected
    Notice(String),
}

#[derive(Debug, PartialEq)]
struct Snapshot {
    messages: usize,
    deck: usize,
    mastered: usize,
    unseen: bool,
    loading: bool,
    extracting: bool,
    playing: bool,
}

impl Snapshot {
    fn of(state: &ConversationState) -> Self {
        Self {
            messages: state.messages().len(),
            deck: state.deck().len(),
            mastered: state.mastered_count(),
            unseen: state.has_unseen_cards(),
            loading: state.is_loading(),
            extracting: state.is_extracting(),
            playing: state.now_playing().is_some(),
        }
    }
}

fn publish(state: &ConversationState, before: &Snapshot, updates: &UnboundedSender<Update>) {
    let after = Snapshot::of(state);
    let mut out = Vec::new();

    for message in &state.messages()[before.messages..] {
        out.push(Update::MessageAdded(message.clone()));
    }
    if (after.deck, after.mastered, after.unseen) != (before.deck, before.mastered, before.unseen) {
        out.push(Update::Deck {
            cards: state.deck().to_vec(),
            mastered: after.mastered,
            unseen: after.unseen,
        });
    }
    if (after.loading, after.extracting, after.playing)
        != (before.loading, before.extracting, before.playing)
    {
        out.push(Update::Status {
            loading: after.loading,
            extracting: after.extracting,
            playing: after.playing,
        });
    }

    for update in out {
        if updates.send(update).is_err() {
            debug!("Update receiver dropped");
            break;
        }
    }
}

fn handle_command(state: &mut ConversationState, command: Command) -> Option<String> {
    match command {
        Command::Onboard { topics, level } => {
            if !state.complete_onboarding(&topics, level) {
                return Some("Onboarding is already done.".to_string());
            }
        }
        Command::Say(text) => {
            if state.is_loading() {
                return Some("LingoPal is still typing, please wait.".to_string());
            }
            if !state.send_user_message(&text) && state.interests().is_none() {
                return Some("Pick your topics first.".to_string());
            }
        }
        Command::Extract => {
            if state.is_extracting() {
                return Some("Already extracting words.".to_string());
            }
            if !state.extract_vocabulary() {
                return Some("Chat a little more before extracting words.".to_string());
            }
        }
        Command::ToggleMastery(id) => {
            if !state.toggle_mastery(&id) {
                return Some("No such card.".to_string());
            }
        }
        Command::Speak(target) => {
            if state.now_playing().is_some() {
                return Some("Already playing audio.".to_string());
            }
            if !state.request_speech(target) {
                return Some("Nothing to play there.".to_string());
            }
        }
        Command::DeckSeen => state.mark_deck_seen(),
        Command::Quit => {}
    }
    None
}

/// Event loop owning the conversation state. Returns the final state once
/// `Command::Quit` arrives or the command channel closes. Effects run as
/// spawned tasks and report back through an internal channel.
pub async fn run<B, S>(
    services: Arc<Services<B, S>>,
    mut commands: UnboundedReceiver<Command>,
    updates: UnboundedSender<Update>,
) -> ConversationState
where
    B: GenerativeBackend + 'static,
    S: AudioSink + 'static,
{
    let mut state = ConversationState::new();
    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<Completion>();

    info!("Session loop started");

    loop {
        tokio::select! {
            command = commands.recv() => {
                let command = match command {
                    Some(Command::Quit) | None => break,
                    Some(command) => command,
                };
                let before = Snapshot::of(&state);
                if let Some(notice) = handle_command(&mut state, command) {
                    let _ = updates.send(Update::Notice(notice));
                }
                publish(&state, &before, &updates);
            }
            Some(completion) = done_rx.recv() => {
                let before = Snapshot::of(&state);
                state.apply(completion);
                publish(&state, &before, &updates);
            }
        }

        for effect in state.drain_effects() {
            let services = services.clone();
            let done_tx = done_tx.clone();
            tokio::spawn(async move {
                let completion = services.perform(effect).await;
                if done_tx.send(completion).is_err() {
                    error!("Session loop gone, dropping completion");
                }
            });
        }
    }

    info!("Session loop shutting down");
    state
}
