//! Conversation state machine
//!
//! Owns the message log, the vocabulary deck and every in-flight flag. User
//! actions mutate the state synchronously and queue [`Effect`]s; whoever
//! drives the machine executes them and feeds the outcome back through
//! [`ConversationState::apply`].
//!
//! Single-flight rules live here rather than in the front end:
//! - one chat reply outstanding at a time
//! - one vocabulary extraction at a time
//! - one speech playback at a time (extra requests are dropped)

use crate::conversation::HISTORY_LIMIT;
use crate::types::{Level, Message, Mode, Sender, UserInterests, VocabularyCard};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Minimum log length before extraction is allowed
pub const EXTRACT_MIN_MESSAGES: usize = 2;

/// Number of recent bot messages scanned for vocabulary
pub const EXTRACT_BOT_MESSAGES: usize = 3;

/// What a playback request points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechTarget {
    /// Speak the text of a message
    Message(String),
    /// Speak the word on a card
    Card(String),
}

/// Side effects requested by the state machine
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    RequestReply {
        history: Vec<Message>,
        utterance: String,
        interests: UserInterests,
    },
    ExtractVocabulary {
        source_text: String,
    },
    Speak {
        target: SpeechTarget,
        text: String,
    },
}

/// Outcome of an executed effect
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Reply(String),
    Vocabulary(Vec<VocabularyCard>),
    PlaybackFinished,
}

#[derive(Debug, Default)]
pub struct ConversationState {
    mode: Mode,
    interests: Option<UserInterests>,
    messages: Vec<Message>,
    deck: Vec<VocabularyCard>,
    is_loading: bool,
    is_extracting: bool,
    now_playing: Option<SpeechTarget>,
    /// Set when new cards land in the deck, cleared once the deck is viewed
    unseen_cards: bool,
    /// Outbound effect queue (drained by the driver)
    outbound: Vec<Effect>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    // === Queries ===

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn interests(&self) -> Option<&UserInterests> {
        self.interests.as_ref()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn deck(&self) -> &[VocabularyCard] {
        &self.deck
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn is_extracting(&self) -> bool {
        self.is_extracting
    }

    pub fn now_playing(&self) -> Option<&SpeechTarget> {
        self.now_playing.as_ref()
    }

    pub fn has_unseen_cards(&self) -> bool {
        self.unseen_cards
    }

    pub fn mastered_count(&self) -> usize {
        self.deck.iter().filter(|c| c.mastered).count()
    }

    pub fn can_extract(&self) -> bool {
        !self.is_extracting && self.messages.len() >= EXTRACT_MIN_MESSAGES
    }

    // === User actions ===

    /// Switches to chat mode and posts the greeting. Only the first call has
    /// any effect.
    pub fn complete_onboarding(&mut self, topics: &[String], level: Level) -> bool {
        if self.mode != Mode::Onboarding {
            debug!("Onboarding already complete, ignoring");
            return false;
        }

        let interests = UserInterests::new(topics, level);
        if interests.topics.is_empty() {
            warn!("Onboarding completed without any topics");
        }

        self.messages
            .push(Message::new(Sender::Bot, greeting(&interests.topics)));
        info!(
            "Onboarding complete: topics={:?} level={}",
            interests.topics, interests.level
        );
        self.interests = Some(interests);
        self.mode = Mode::Chat;
        true
    }

    /// Appends the user's message and queues a reply request.
    pub fn send_user_message(&mut self, text: &str) -> bool {
        let Some(interests) = self.interests.clone() else {
            debug!("No interests yet, ignoring message");
            return false;
        };
        if text.trim().is_empty() {
            return false;
        }
        if self.is_loading {
            warn!("Reply still pending, ignoring message");
            return false;
        }

        let start = self.messages.len().saturating_sub(HISTORY_LIMIT);
        let history = self.messages[start..].to_vec();

        self.messages.push(Message::new(Sender::User, text));
        self.is_loading = true;
        self.outbound.push(Effect::RequestReply {
            history,
            utterance: text.to_string(),
            interests,
        });
        true
    }

    /// Queues an extraction over the most recent bot messages.
    pub fn extract_vocabulary(&mut self) -> bool {
        if self.messages.len() < EXTRACT_MIN_MESSAGES {
            debug!("Not enough messages to extract vocabulary");
            return false;
        }
        if self.is_extracting {
            debug!("Extraction already running");
            return false;
        }

        let bot_texts: Vec<&str> = self
            .messages
            .iter()
            .filter(|m| m.sender == Sender::Bot)
            .map(|m| m.text.as_str())
            .collect();
        let start = bot_texts.len().saturating_sub(EXTRACT_BOT_MESSAGES);
        let source_text = bot_texts[start..].join(" ");

        self.is_extracting = true;
        self.outbound.push(Effect::ExtractVocabulary { source_text });
        true
    }

    /// Flips the mastered flag of a card. Unknown ids are ignored.
    pub fn toggle_mastery(&mut self, card_id: &str) -> bool {
        match self.deck.iter_mut().find(|c| c.id == card_id) {
            Some(card) => {
                card.mastered = !card.mastered;
                true
            }
            None => false,
        }
    }

    /// Queues playback for a bot reply or card. Dropped while something is
    /// already playing or when the target does not exist.
    pub fn request_speech(&mut self, target: SpeechTarget) -> bool {
        if let Some(current) = &self.now_playing {
            debug!("Already playing {:?}, dropping request", current);
            return false;
        }

        let text = match &target {
            SpeechTarget::Message(id) => self
                .messages
                .iter()
                .find(|m| &m.id == id && m.sender == Sender::Bot)
                .map(|m| m.text.clone()),
            SpeechTarget::Card(id) => self.deck.iter().find(|c| &c.id == id).map(|c| c.word.clone()),
        };
        let Some(text) = text else {
            return false;
        };

        self.now_playing = Some(target.clone());
        self.outbound.push(Effect::Speak { target, text });
        true
    }

    pub fn mark_deck_seen(&mut self) {
        self.unseen_cards = false;
    }

    // === Completions ===

    pub fn apply(&mut self, completion: Completion) {
        match completion {
            Completion::Reply(text) => {
                self.messages.push(Message::new(Sender::Bot, text));
                self.is_loading = false;
            }
            Completion::Vocabulary(cards) => {
                let added = self.merge_cards(cards);
                if added > 0 {
                    self.unseen_cards = true;
                }
                info!("Added {} new cards ({} total)", added, self.deck.len());
                self.is_extracting = false;
            }
            Completion::PlaybackFinished => {
                self.now_playing = None;
            }
        }
    }

    /// Prepends cards whose word is not in the deck yet (case-insensitive),
    /// keeping their order. Returns how many were added.
    fn merge_cards(&mut self, cards: Vec<VocabularyCard>) -> usize {
        let mut seen: HashSet<String> = self.deck.iter().map(|c| c.word_key()).collect();
        let fresh: Vec<VocabularyCard> = cards
            .into_iter()
            .filter(|c| seen.insert(c.word_key()))
            .collect();

        let added = fresh.len();
        if added > 0 {
            let old = std::mem::take(&mut self.deck);
            self.deck = fresh;
            self.deck.extend(old);
        }
        added
    }

    /// Take the queued effects, oldest first.
    pub fn drain_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.outbound)
    }
}

fn greeting(topics: &[String]) -> String {
    let topics = if topics.is_empty() {
        "all sorts of things".to_string()
    } else {
        topics.join(", ")
    };
    format!(
        "Hi there! 👋 I'm LingoPal. I see you are interested in {}.\n\nLet's chat! What's on your mind today?",
        topics
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(word: &str) -> VocabularyCard {
        VocabularyCard {
            id: crate::types::new_id(),
            word: word.to_string(),
            phonetic: String::new(),
            meaning: String::new(),
            example_sentence: String::new(),
            context: None,
            mastered: false,
        }
    }

    fn chatting() -> ConversationState {
        let mut state = ConversationState::new();
        state.complete_onboarding(&["tech".to_string()], Level::Intermediate);
        state
    }

    #[test]
    fn test_onboarding() {
        let mut state = ConversationState::new();
        assert_eq!(state.mode(), Mode::Onboarding);

        assert!(state.complete_onboarding(&["tech".to_string()], Level::Intermediate));

        assert_eq!(state.mode(), Mode::Chat);
        assert_eq!(state.messages().len(), 1);
        assert_eq!(state.messages()[0].sender, Sender::Bot);
        assert!(state.messages()[0].text.contains("tech"));
        assert_eq!(state.interests().unwrap().level, Level::Intermediate);
        assert!(state.drain_effects().is_empty());
    }

    #[test]
    fn test_onboarding_twice_is_noop() {
        let mut state = chatting();
        assert!(!state.complete_onboarding(&["music".to_string()], Level::Advanced));
        assert_eq!(state.messages().len(), 1);
        assert_eq!(state.interests().unwrap().topics, vec!["tech"]);
    }

    #[test]
    fn test_onboarding_with_no_topics() {
        let mut state = ConversationState::new();
        assert!(state.complete_onboarding(&[], Level::Beginner));
        assert_eq!(state.mode(), Mode::Chat);
        assert_eq!(state.messages().len(), 1);
    }

    #[test]
    fn test_send_before_onboarding_is_noop() {
        let mut state = ConversationState::new();
        assert!(!state.send_user_message("Hi"));
        assert!(state.messages().is_empty());
        assert!(state.drain_effects().is_empty());
    }

    #[test]
    fn test_blank_message_is_noop() {
        let mut state = chatting();
        assert!(!state.send_user_message("   "));
        assert_eq!(state.messages().len(), 1);
        assert!(!state.is_loading());
    }

    #[test]
    fn test_send_queues_reply_request() {
        let mut state = chatting();
        assert!(state.send_user_message("Hi"));

        assert!(state.is_loading());
        assert_eq!(state.messages().len(), 2);
        assert_eq!(state.messages()[1].sender, Sender::User);

        let effects = state.drain_effects();
        assert_eq!(effects.len(), 1);
        match &effects[0] {
            Effect::RequestReply {
                history,
                utterance,
                interests,
            } => {
                // History is what came before the new message
                assert_eq!(history.len(), 1);
                assert_eq!(history[0].sender, Sender::Bot);
                assert_eq!(utterance, "Hi");
                assert_eq!(interests.topics, vec!["tech"]);
            }
            other => panic!("Unexpected effect: {:?}", other),
        }

        state.apply(Completion::Reply("Hello!".to_string()));
        assert!(!state.is_loading());
        assert_eq!(state.messages().len(), 3);
        assert_eq!(state.messages()[2].text, "Hello!");
    }

    #[test]
    fn test_second_send_while_loading_rejected() {
        let mut state = chatting();
        assert!(state.send_user_message("first"));
        assert!(!state.send_user_message("second"));
        assert_eq!(state.messages().len(), 2);
        assert_eq!(state.drain_effects().len(), 1);
    }

    #[test]
    fn test_history_capped() {
        let mut state = chatting();
        for i in 0..4 {
            state.send_user_message(&format!("msg {}", i));
            state.apply(Completion::Reply(format!("reply {}", i)));
        }
        state.drain_effects();

        state.send_user_message("last");
        match state.drain_effects().pop().unwrap() {
            Effect::RequestReply { history, .. } => {
                assert_eq!(history.len(), HISTORY_LIMIT);
                assert_eq!(history.last().unwrap().text, "reply 3");
            }
            other => panic!("Unexpected effect: {:?}", other),
        }
    }

    #[test]
    fn test_log_grows_by_two_per_turn() {
        let mut state = chatting();
        for n in 1..=10 {
            assert!(state.send_user_message(&format!("turn {}", n)));
            state.apply(Completion::Reply(format!("answer {}", n)));
            assert_eq!(state.messages().len(), 2 * n + 1);
        }

        let senders: Vec<Sender> = state.messages().iter().map(|m| m.sender).collect();
        assert_eq!(senders[0], Sender::Bot);
        for pair in senders[1..].chunks(2) {
            assert_eq!(pair, [Sender::User, Sender::Bot]);
        }
        assert_eq!(state.messages()[1].text, "turn 1");
        assert_eq!(state.messages()[20].text, "answer 10");
    }

    #[test]
    fn test_extract_requires_two_messages() {
        let mut state = chatting();
        assert!(!state.can_extract());
        assert!(!state.extract_vocabulary());
        assert!(!state.is_extracting());
        assert!(state.drain_effects().is_empty());
    }

    #[test]
    fn test_extract_uses_last_three_bot_messages() {
        let mut state = chatting();
        for i in 0..4 {
            state.send_user_message(&format!("user {}", i));
            state.apply(Completion::Reply(format!("bot {}", i)));
        }
        state.drain_effects();

        assert!(state.extract_vocabulary());
        assert!(state.is_extracting());
        assert_eq!(
            state.drain_effects(),
            vec![Effect::ExtractVocabulary {
                source_text: "bot 1 bot 2 bot 3".to_string()
            }]
        );
    }

    #[test]
    fn test_extract_single_flight() {
        let mut state = chatting();
        state.send_user_message("Hi");
        state.apply(Completion::Reply("Hello".to_string()));
        state.drain_effects();

        assert!(state.extract_vocabulary());
        assert!(!state.extract_vocabulary());
        assert_eq!(state.drain_effects().len(), 1);

        state.apply(Completion::Vocabulary(vec![]));
        assert!(!state.is_extracting());
        assert!(state.extract_vocabulary());
    }

    #[test]
    fn test_vocabulary_dedup_and_order() {
        let mut state = chatting();
        state.apply(Completion::Vocabulary(vec![card("alpha"), card("beta")]));
        assert!(state.has_unseen_cards());
        state.mark_deck_seen();

        state.apply(Completion::Vocabulary(vec![
            card("Gamma"),
            card("ALPHA"),
            card("gamma"),
            card("delta"),
        ]));

        let words: Vec<&str> = state.deck().iter().map(|c| c.word.as_str()).collect();
        assert_eq!(words, vec!["Gamma", "delta", "alpha", "beta"]);
        assert!(state.has_unseen_cards());
    }

    #[test]
    fn test_vocabulary_repeated_overlap_never_duplicates() {
        let mut state = chatting();
        for _ in 0..3 {
            state.apply(Completion::Vocabulary(vec![card("Word"), card("word"), card("WORD ")]));
        }
        let mut keys: Vec<String> = state.deck().iter().map(|c| c.word_key()).collect();
        let total = keys.len();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), total);
        assert_eq!(total, 1);
    }

    #[test]
    fn test_nothing_new_leaves_unseen_flag() {
        let mut state = chatting();
        state.apply(Completion::Vocabulary(vec![card("alpha")]));
        state.mark_deck_seen();
        state.apply(Completion::Vocabulary(vec![card("Alpha")]));
        assert!(!state.has_unseen_cards());
        assert_eq!(state.deck().len(), 1);
    }

    #[test]
    fn test_toggle_mastery_is_involution() {
        let mut state = chatting();
        state.apply(Completion::Vocabulary(vec![card("alpha"), card("beta")]));
        let id = state.deck()[1].id.clone();

        assert!(state.toggle_mastery(&id));
        assert!(state.deck()[1].mastered);
        assert_eq!(state.mastered_count(), 1);

        assert!(state.toggle_mastery(&id));
        assert!(!state.deck()[1].mastered);
        assert_eq!(state.mastered_count(), 0);

        assert!(!state.toggle_mastery("missing"));
    }

    #[test]
    fn test_speech_single_flight() {
        let mut state = chatting();
        let greeting_id = state.messages()[0].id.clone();

        assert!(state.request_speech(SpeechTarget::Message(greeting_id.clone())));
        assert!(!state.request_speech(SpeechTarget::Message(greeting_id.clone())));

        let effects = state.drain_effects();
        assert_eq!(effects.len(), 1);
        match &effects[0] {
            Effect::Speak { text, .. } => assert!(text.starts_with("Hi there!")),
            other => panic!("Unexpected effect: {:?}", other),
        }

        state.apply(Completion::PlaybackFinished);
        assert!(state.now_playing().is_none());
        assert!(state.request_speech(SpeechTarget::Message(greeting_id)));
    }

    #[test]
    fn test_speak_card_uses_word() {
        let mut state = chatting();
        state.apply(Completion::Vocabulary(vec![card("ubiquitous")]));
        let id = state.deck()[0].id.clone();

        assert!(state.request_speech(SpeechTarget::Card(id)));
        match state.drain_effects().pop().unwrap() {
            Effect::Speak { text, .. } => assert_eq!(text, "ubiquitous"),
            other => panic!("Unexpected effect: {:?}", other),
        }
    }

    #[test]
    fn test_speak_user_message_rejected() {
        let mut state = chatting();
        state.send_user_message("I am user text");
        state.drain_effects();
        let user_id = state.messages()[1].id.clone();

        assert!(!state.request_speech(SpeechTarget::Message(user_id)));
        assert!(state.now_playing().is_none());
        assert!(state.drain_effects().is_empty());
    }

    #[test]
    fn test_speak_unknown_target_is_noop() {
        let mut state = chatting();
        assert!(!state.request_speech(SpeechTarget::Card("missing".to_string())));
        assert!(state.now_playing().is_none());
        assert!(state.drain_effects().is_empty());
    }
}
