//! Turn-taking integration tests
//!
//! Drives a controller wired to fakes on tokio's paused clock

use std::time::Duration;

use beacon_voice::voice::{RecognitionErrorKind, RecognitionEvent, SilenceTier, TranscriptFragment};
use beacon_voice::{ChannelFault, Config, Event, Speaker, Status, TurnState};

mod common;

use common::{Harness, Options, wav_payload};

fn awaiting() -> Status {
    Status::AwaitingWakePhrase {
        phrase: "hello friday".to_string(),
    }
}

#[tokio::test(start_paused = true)]
async fn test_startup_listens_for_wake_phrase() {
    let mut h = Harness::new();
    h.settle().await;

    assert_eq!(h.controller.state(), TurnState::Idle);
    assert!(h.controller.source().is_running());
    assert_eq!(h.starts(), 1);
    assert_eq!(h.last_status(), Some(awaiting()));
    assert_eq!(h.controller.silence_armed(), None);
}

#[tokio::test(start_paused = true)]
async fn test_full_turn_with_spoken_reply() {
    let mut h = Harness::unlocked().await;

    h.interim("hello friday");
    h.settle().await;
    assert_eq!(h.controller.state(), TurnState::Active);
    assert_eq!(h.controller.silence_armed(), Some(SilenceTier::Utterance));
    assert_eq!(h.cues_played(), 1);

    h.final_text("what's the weather");
    h.settle().await;
    assert_eq!(h.buffer(), vec!["what's the weather".to_string()]);
    assert_eq!(h.last_status(), Some(Status::Heard("what's the weather".to_string())));

    h.advance(Duration::from_secs(3)).await;
    assert_eq!(h.controller.state(), TurnState::Processing);
    assert_eq!(h.sent(), vec!["what's the weather".to_string()]);
    assert_eq!(h.last_status(), Some(Status::Thinking));
    assert!(h.controller.awaiting_reply());
    assert!(h.buffer().is_empty());

    h.controller.handle(Event::Reply(beacon_voice::AgentReply {
        text: "It's sunny".to_string(),
        audio: Some(wav_payload()),
    }));
    assert_eq!(h.controller.state(), TurnState::Speaking);
    assert!(!h.controller.source().is_running());
    assert!(h.controller.source().is_suppressed());
    assert!(!h.controller.awaiting_reply());
    assert_eq!(h.last_status(), Some(Status::Speaking));

    h.settle().await;
    assert_eq!(h.replies_played(), 1);
    assert_eq!(h.controller.state(), TurnState::Active);
    assert!(h.controller.source().is_running());
    assert_eq!(h.starts(), 2);
    assert!(h.buffer().is_empty());
    assert_eq!(h.controller.silence_armed(), Some(SilenceTier::Utterance));
    assert_eq!(h.last_status(), Some(Status::Listening));
    assert_eq!(h.controller.player().live_clips(), 0);

    let messages = h.status.messages.lock().unwrap().clone();
    assert_eq!(
        messages,
        vec![
            (Speaker::User, "what's the weather".to_string()),
            (Speaker::Assistant, "It's sunny".to_string()),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_farewell_reply_ends_session_after_playback() {
    let mut h = Harness::unlocked().await;
    h.wake().await;
    h.final_text("that's all");
    h.advance(Duration::from_secs(3)).await;

    h.reply("Goodbye!", Some(wav_payload()));
    h.settle().await;

    assert_eq!(h.controller.state(), TurnState::Idle);
    assert!(h.buffer().is_empty());
    assert!(!h.controller.session().pending_deactivation);
    assert_eq!(h.last_status(), Some(awaiting()));
    assert_eq!(h.controller.silence_armed(), None);

    // Released, not forced: the normal restart delay applies
    assert!(!h.controller.source().is_running());
    assert!(!h.controller.source().is_suppressed());
    h.advance(Duration::from_millis(150)).await;
    assert!(h.controller.source().is_running());
}

#[tokio::test(start_paused = true)]
async fn test_non_wake_speech_ignored_while_idle() {
    let mut h = Harness::new();
    h.interim("hello there");
    h.final_text("hey, what's up friday");
    h.settle().await;

    assert_eq!(h.controller.state(), TurnState::Idle);
    assert_eq!(h.controller.silence_armed(), None);
}

#[tokio::test(start_paused = true)]
async fn test_final_only_wake_when_interim_matching_disabled() {
    let mut config = Config::default();
    config.wake.match_interim = false;
    let mut h = Harness::with(Options {
        config,
        ..Options::default()
    });

    h.interim("hello friday");
    h.settle().await;
    assert_eq!(h.controller.state(), TurnState::Idle);

    h.final_text("Hello Friday");
    h.settle().await;
    assert_eq!(h.controller.state(), TurnState::Active);
}

fn stripping_echo() -> Harness {
    let mut config = Config::default();
    config.wake.strip_echo = true;
    Harness::with(Options {
        config,
        ..Options::default()
    })
}

#[tokio::test(start_paused = true)]
async fn test_final_fragment_buffered_verbatim_after_interim_wake() {
    let mut h = Harness::new();
    h.wake().await;

    h.final_text("hey friday tell me a joke");
    h.final_text("Hello Friday");
    h.settle().await;

    assert_eq!(
        h.buffer(),
        vec!["hey friday tell me a joke".to_string(), "Hello Friday".to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn test_wake_echo_not_buffered() {
    let mut h = stripping_echo();
    h.wake().await;

    h.final_text("Hello Friday");
    h.final_text("turn on the lights");
    h.settle().await;

    assert_eq!(h.buffer(), vec!["turn on the lights".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_wake_echo_remainder_kept() {
    let mut h = stripping_echo();
    h.wake().await;

    h.final_text("hello friday what time is it");
    h.settle().await;

    assert_eq!(h.buffer(), vec!["what time is it".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_buffer_keeps_final_fragments_in_order() {
    let mut h = Harness::new();
    h.wake().await;

    h.final_text("set a timer");
    h.interim("for ten");
    h.final_text("for ten minutes");
    h.settle().await;

    assert_eq!(
        h.buffer(),
        vec!["set a timer".to_string(), "for ten minutes".to_string()]
    );

    h.advance(Duration::from_secs(3)).await;
    assert_eq!(h.sent(), vec!["set a timer for ten minutes".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_exit_phrase_sends_goodbye() {
    let mut h = Harness::new();
    h.wake().await;

    h.final_text("okay Stop Listening now");
    h.settle().await;

    assert_eq!(h.controller.state(), TurnState::Processing);
    assert_eq!(h.sent(), vec!["goodbye".to_string()]);
    assert_eq!(h.controller.silence_armed(), None);
    assert!(h.buffer().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_exit_phrase_logs_what_was_said() {
    let mut h = Harness::new();
    h.wake().await;

    h.final_text("thanks for the help");
    h.final_text("goodbye for now");
    h.settle().await;

    assert_eq!(h.sent(), vec!["goodbye".to_string()]);
    let messages = h.status.messages.lock().unwrap().clone();
    assert_eq!(
        messages,
        vec![(Speaker::User, "thanks for the help goodbye for now".to_string())]
    );
}

#[tokio::test(start_paused = true)]
async fn test_steady_speech_never_closes_turn() {
    let mut h = Harness::new();
    h.wake().await;

    for _ in 0..10 {
        h.advance(Duration::from_millis(2500)).await;
        h.interim("still talking");
    }
    h.settle().await;

    assert_eq!(h.controller.state(), TurnState::Active);
    assert!(h.sent().is_empty());
    assert_eq!(h.count_status(&Status::StillListening), 0);
}

#[tokio::test(start_paused = true)]
async fn test_blank_heartbeats_keep_turn_open() {
    let mut h = Harness::new();
    h.wake().await;
    h.final_text("remind me to");
    h.settle().await;

    for _ in 0..4 {
        h.advance(Duration::from_secs(2)).await;
        h.interim("");
    }
    h.settle().await;

    assert_eq!(h.controller.state(), TurnState::Active);
    assert!(h.sent().is_empty());
    assert_eq!(h.buffer(), vec!["remind me to".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_silence_ends_session_exactly_once() {
    let mut h = Harness::new();
    h.wake().await;

    h.advance(Duration::from_secs(3)).await;
    assert_eq!(h.controller.state(), TurnState::Active);
    assert_eq!(h.last_status(), Some(Status::StillListening));
    assert_eq!(h.controller.silence_armed(), Some(SilenceTier::Session));

    h.advance(Duration::from_secs(30)).await;
    assert_eq!(h.controller.state(), TurnState::Idle);
    assert_eq!(h.controller.silence_armed(), None);

    h.advance(Duration::from_secs(120)).await;
    let ended = Status::SessionEnded {
        phrase: "hello friday".to_string(),
    };
    assert_eq!(h.count_status(&ended), 1);
    assert_eq!(h.count_status(&Status::StillListening), 1);
    assert!(h.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_speech_during_session_tier_rearms_utterance_tier() {
    let mut h = Harness::new();
    h.wake().await;
    h.advance(Duration::from_secs(3)).await;
    assert_eq!(h.controller.silence_armed(), Some(SilenceTier::Session));

    h.final_text("actually one more thing");
    h.settle().await;
    assert_eq!(h.controller.silence_armed(), Some(SilenceTier::Utterance));

    h.advance(Duration::from_secs(3)).await;
    assert_eq!(h.sent(), vec!["actually one more thing".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_recognizer_end_flushes_pending_utterance() {
    let mut h = Harness::new();
    h.wake().await;
    h.final_text("turn off the oven");
    h.recognize(RecognitionEvent::Ended);
    h.settle().await;

    assert_eq!(h.controller.state(), TurnState::Processing);
    assert_eq!(h.sent(), vec!["turn off the oven".to_string()]);

    // Restarted after the short delay, not left dead
    h.advance(Duration::from_millis(150)).await;
    assert!(h.controller.source().is_running());
}

#[tokio::test(start_paused = true)]
async fn test_recognizer_end_with_empty_buffer_keeps_turn() {
    let mut h = Harness::new();
    h.wake().await;
    h.recognize(RecognitionEvent::Ended);
    h.settle().await;

    assert_eq!(h.controller.state(), TurnState::Active);
    assert!(h.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_reply_without_audio_resumes_listening() {
    let mut h = Harness::new();
    h.wake().await;
    h.final_text("what's two plus two");
    h.advance(Duration::from_secs(3)).await;

    h.reply("Four.", None);
    h.settle().await;

    assert_eq!(h.controller.state(), TurnState::Active);
    assert_eq!(h.last_status(), Some(Status::Listening));
    assert_eq!(h.replies_played(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_farewell_without_audio_goes_idle() {
    let mut h = Harness::new();
    h.wake().await;
    h.final_text("goodnight");
    h.advance(Duration::from_secs(3)).await;

    h.reply("See you tomorrow", Some(String::new()));
    h.settle().await;

    assert_eq!(h.controller.state(), TurnState::Idle);
    assert_eq!(h.last_status(), Some(awaiting()));
    assert!(h.controller.source().is_running());
}

#[tokio::test(start_paused = true)]
async fn test_locked_audio_still_completes_turn() {
    let mut h = Harness::new();
    h.wake().await;
    h.final_text("tell me a joke");
    h.advance(Duration::from_secs(3)).await;

    h.reply("Why did the chicken...", Some(wav_payload()));
    h.settle().await;

    assert_eq!(h.controller.state(), TurnState::Active);
    assert!(h.controller.source().is_running());
    assert_eq!(h.replies_played(), 0);
    assert_eq!(h.cues_played(), 0);
    assert_eq!(
        h.count_status(&Status::Fault("Voice responses locked - press Enter to enable".to_string())),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn test_undecodable_audio_still_completes_turn() {
    let mut h = Harness::unlocked().await;
    h.wake().await;
    h.final_text("play something");
    h.advance(Duration::from_secs(3)).await;

    h.reply("Here you go", Some("bm90IGF1ZGlv".to_string()));
    h.settle().await;

    assert_eq!(h.controller.state(), TurnState::Active);
    assert_eq!(h.count_status(&Status::Fault("Audio playback failed".to_string())), 1);
    assert_eq!(h.controller.player().live_clips(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_device_failure_still_completes_farewell() {
    let mut h = Harness::with(Options {
        sink_fails: true,
        ..Options::default()
    });
    h.post(Event::AudioUnlocked);
    h.wake().await;
    h.final_text("bye for now");
    h.advance(Duration::from_secs(3)).await;

    h.reply("Goodbye", Some(wav_payload()));
    h.settle().await;

    assert_eq!(h.controller.state(), TurnState::Idle);
    assert_eq!(h.count_status(&Status::Fault("Audio playback failed".to_string())), 1);
}

#[tokio::test(start_paused = true)]
async fn test_reply_timeout_returns_to_listening() {
    let mut h = Harness::new();
    h.wake().await;
    h.final_text("are you there");
    h.advance(Duration::from_secs(3)).await;
    assert_eq!(h.controller.state(), TurnState::Processing);

    h.advance(Duration::from_secs(20)).await;
    assert_eq!(h.controller.state(), TurnState::Active);
    assert_eq!(
        h.count_status(&Status::Fault("Agent unavailable - still listening".to_string())),
        1
    );

    // A reply arriving after the timeout is ignored
    h.reply("Sorry, I'm late", Some(wav_payload()));
    h.settle().await;
    assert_eq!(h.controller.state(), TurnState::Active);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_never_strands_processing() {
    let mut h = Harness::new();
    h.wake().await;
    h.final_text("hello?");
    h.advance(Duration::from_secs(3)).await;

    h.post(Event::ChannelFault(ChannelFault::Disconnected));
    h.settle().await;

    assert_eq!(h.controller.state(), TurnState::Active);
    assert!(!h.controller.awaiting_reply());
    assert_eq!(h.count_status(&Status::Disconnected), 1);
}

#[tokio::test(start_paused = true)]
async fn test_send_failure_resumes_listening() {
    let mut h = Harness::with(Options {
        agent_fails: true,
        ..Options::default()
    });
    h.wake().await;
    h.final_text("anyone home");
    h.advance(Duration::from_secs(3)).await;

    assert_eq!(h.controller.state(), TurnState::Active);
    assert!(!h.controller.awaiting_reply());
    assert_eq!(
        h.count_status(&Status::Fault("Agent unavailable - still listening".to_string())),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn test_reset_returns_to_idle_from_any_state() {
    let mut h = Harness::new();
    h.wake().await;
    h.final_text("forget everything");
    h.advance(Duration::from_secs(3)).await;
    assert_eq!(h.controller.state(), TurnState::Processing);

    h.post(Event::ResetRequested);
    h.settle().await;

    assert_eq!(h.controller.state(), TurnState::Idle);
    assert!(!h.controller.awaiting_reply());
    assert_eq!(h.controller.silence_armed(), None);

    let statuses = h.statuses();
    let tail = &statuses[statuses.len() - 2..];
    assert_eq!(tail, &[Status::ConversationReset, awaiting()]);

    // Nothing armed before the reset fires afterwards
    h.advance(Duration::from_secs(60)).await;
    assert_eq!(h.controller.state(), TurnState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_reset_while_speaking_keeps_source_paused_until_audio_ends() {
    let mut h = Harness::unlocked().await;
    h.wake().await;
    h.final_text("long story please");
    h.advance(Duration::from_secs(3)).await;

    h.controller.handle(Event::Reply(beacon_voice::AgentReply {
        text: "Once upon a time".to_string(),
        audio: Some(wav_payload()),
    }));
    assert_eq!(h.controller.state(), TurnState::Speaking);

    h.controller.handle(Event::ResetFinished(Ok(())));
    assert_eq!(h.controller.state(), TurnState::Idle);
    assert_eq!(h.last_status(), Some(awaiting()));

    // The reply is still coming out of the speakers
    assert!(h.controller.player().in_flight().is_some());
    assert!(!h.controller.source().is_running());
    assert!(h.controller.source().is_suppressed());

    h.settle().await;
    assert_eq!(h.controller.state(), TurnState::Idle);
    assert!(h.controller.player().in_flight().is_none());
    assert!(h.controller.source().is_running());
    assert!(!h.controller.source().is_suppressed());
}

#[tokio::test(start_paused = true)]
async fn test_reset_failure_keeps_state() {
    let mut h = Harness::with(Options {
        reset_ok: false,
        ..Options::default()
    });
    h.wake().await;

    h.post(Event::ResetRequested);
    h.settle().await;

    assert_eq!(h.controller.state(), TurnState::Active);
    assert_eq!(h.last_status(), Some(Status::Fault("Reset failed".to_string())));
}

#[tokio::test(start_paused = true)]
async fn test_stale_run_fragments_discarded() {
    let mut h = Harness::unlocked().await;
    h.wake().await;
    let old_run = h.controller.source().current_run();

    h.final_text("what's new");
    h.advance(Duration::from_secs(3)).await;
    h.reply("Not much", Some(wav_payload()));
    h.settle().await;
    assert_eq!(h.controller.state(), TurnState::Active);
    assert_ne!(h.controller.source().current_run(), old_run);

    h.post(Event::Recognition {
        run: old_run,
        event: RecognitionEvent::Fragment(TranscriptFragment::finalized("goodbye", 9)),
    });
    h.settle().await;

    assert_eq!(h.controller.state(), TurnState::Active);
    assert!(h.buffer().is_empty());
    assert_eq!(h.sent().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_fragments_while_processing_discarded() {
    let mut h = Harness::new();
    h.wake().await;
    h.final_text("first question");
    h.advance(Duration::from_secs(3)).await;

    h.final_text("second question");
    h.settle().await;

    assert_eq!(h.controller.state(), TurnState::Processing);
    assert!(h.buffer().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_recognition_fault_surfaces_and_retries() {
    let mut h = Harness::new();
    h.recognize(RecognitionEvent::Error(RecognitionErrorKind::Network));
    h.recognize(RecognitionEvent::Ended);
    h.settle().await;

    assert_eq!(
        h.last_status(),
        Some(Status::Fault("Network error - please check your connection".to_string()))
    );
    assert!(!h.controller.source().is_running());

    h.advance(Duration::from_millis(2900)).await;
    assert_eq!(h.starts(), 1);

    h.advance(Duration::from_millis(200)).await;
    assert_eq!(h.starts(), 2);
    assert!(h.controller.source().is_running());
}

#[tokio::test(start_paused = true)]
async fn test_no_speech_is_silent() {
    let mut h = Harness::new();
    let before = h.statuses().len();
    h.recognize(RecognitionEvent::Error(RecognitionErrorKind::NoSpeech));
    h.settle().await;

    assert_eq!(h.statuses().len(), before);
    assert!(h.controller.source().is_running());
}

#[tokio::test(start_paused = true)]
async fn test_audio_unlock_announced_once() {
    let mut h = Harness::new();
    h.post(Event::AudioUnlocked);
    h.post(Event::AudioUnlocked);
    h.settle().await;

    assert!(h.gate.is_unlocked());
    assert_eq!(h.count_status(&Status::VoiceEnabled), 1);
}

#[tokio::test(start_paused = true)]
async fn test_no_timer_fires_after_turn_ends() {
    let mut h = Harness::new();
    h.wake().await;
    h.final_text("goodbye");
    h.settle().await;

    h.reply("See you later", None);
    h.settle().await;
    assert_eq!(h.controller.state(), TurnState::Idle);

    let before = h.statuses().len();
    h.advance(Duration::from_secs(120)).await;

    assert_eq!(h.controller.state(), TurnState::Idle);
    assert_eq!(h.statuses().len(), before);
    assert_eq!(h.sent(), vec!["goodbye".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_source() {
    let mut h = Harness::new();
    h.post(Event::Shutdown);
    h.settle().await;

    assert!(h.controller.is_stopped());
    assert!(!h.controller.source().is_running());
    assert_eq!(h.recognizer.lock().unwrap().stops, 1);
}
