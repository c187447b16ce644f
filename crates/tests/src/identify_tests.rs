use std::time::Duration;

use futures::StreamExt;
use serde_json::Value;

use crate::fixtures::TestApp;
use crate::fixtures::audio::{MeetingAudio, tone, wav_bytes};

#[tokio::test]
async fn stages_stream_in_order_then_done() {
    let app = TestApp::spawn().await;
    app.diarizer.script(vec![("A", 0, 12_000)], 20_000);

    let meeting = MeetingAudio::new(20_000)
        .with_tone(0, 12_000, 400.0)
        .into_wav_bytes();
    let events = app.identify(meeting, "dev-1").await;

    let stages: Vec<&str> = events
        .iter()
        .filter(|e| e.event == "progress")
        .map(|e| e.data["stage"].as_str().unwrap())
        .collect();
    assert_eq!(
        stages,
        vec!["transcribing", "converting", "analyzing", "matching"]
    );
    assert_eq!(events.last().unwrap().event, "done");

    let done = &events.last().unwrap().data;
    assert_eq!(done["success"], true);
    assert!(done["meeting_id"].is_string());
    assert_eq!(done["audio_duration_ms"], 20_000);
    assert_eq!(done["language"], "en");
    assert_eq!(done["utterances"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn enrolled_speaker_comes_back_high_without_reinforcement() {
    let app = TestApp::spawn().await;
    app.enroll("Alice", wav_bytes(&tone(400.0, 12_000))).await;
    assert_eq!(app.speaker_samples("Alice").await, Some(2));

    app.diarizer.script(vec![("A", 0, 12_000)], 20_000);
    let meeting = MeetingAudio::new(20_000)
        .with_tone(0, 12_000, 400.0)
        .into_wav_bytes();
    let done = app.identify_done(meeting, "dev-1").await;

    let speaker = &done["speakers"][0];
    assert_eq!(speaker["confidence"], "high");
    assert_eq!(speaker["assigned_name"], "Alice");
    assert!(speaker["top_score"].as_f64().unwrap() > 0.9);

    // The transcript is labeled with the identified name.
    assert_eq!(done["utterances"][0]["speaker_name"], "Alice");

    // No reinforcement without an explicit confirm.
    assert_eq!(app.speaker_samples("Alice").await, Some(2));
}

#[tokio::test]
async fn competitive_assignment_separates_close_voices() {
    let app = TestApp::spawn().await;
    // Two enrolled voices 100 Hz apart: similar but separable.
    app.enroll("Alice", wav_bytes(&tone(400.0, 12_000))).await;
    app.enroll("Bob", wav_bytes(&tone(500.0, 12_000))).await;

    // Meeting speakers: X=Alice's voice, Y=Bob's voice, Z=unknown.
    app.diarizer.script(
        vec![("X", 0, 11_000), ("Y", 12_000, 23_000), ("Z", 24_000, 35_000)],
        36_000,
    );
    let meeting = MeetingAudio::new(36_000)
        .with_tone(0, 11_000, 400.0)
        .with_tone(12_000, 23_000, 500.0)
        .with_tone(24_000, 35_000, 1_500.0)
        .into_wav_bytes();
    let done = app.identify_done(meeting, "dev-1").await;

    let by_label = |label: &str| -> Value {
        done["speakers"]
            .as_array()
            .unwrap()
            .iter()
            .find(|s| s["meeting_speaker_id"] == label)
            .cloned()
            .unwrap()
    };

    let x = by_label("X");
    let y = by_label("Y");
    let z = by_label("Z");
    assert_eq!(x["assigned_name"], "Alice");
    assert_eq!(x["confidence"], "high");
    assert_eq!(y["assigned_name"], "Bob");
    assert_eq!(y["confidence"], "high");
    assert_eq!(z["confidence"], "low");
    assert_eq!(z["assigned_name"], Value::Null);
    assert!(z["needs_naming"].as_bool().unwrap());
}

#[tokio::test]
async fn second_identification_for_same_device_is_busy() {
    let app = TestApp::spawn().await;
    app.diarizer.script(vec![("A", 0, 12_000)], 20_000);
    app.diarizer.set_delay(Duration::from_millis(1_500));

    let meeting = || {
        MeetingAudio::new(20_000)
            .with_tone(0, 12_000, 400.0)
            .into_wav_bytes()
    };

    let first = app.identify_raw(meeting(), "dev-1").await;
    assert_eq!(first.status().as_u16(), 200);

    let second = app.identify_raw(meeting(), "dev-1").await;
    assert_eq!(second.status().as_u16(), 409);

    // A different device is not affected by the single-flight gate.
    let other = app.identify_raw(meeting(), "dev-2").await;
    assert_eq!(other.status().as_u16(), 200);

    drop(first);
    drop(other);
}

#[tokio::test]
async fn disconnect_cleans_up_and_releases_the_device() {
    let app = TestApp::spawn().await;
    app.diarizer.script(vec![("A", 0, 12_000)], 20_000);
    app.diarizer.set_delay(Duration::from_millis(800));

    let meeting = MeetingAudio::new(20_000)
        .with_tone(0, 12_000, 400.0)
        .into_wav_bytes();

    // Read the first progress event, then hang up.
    let resp = app.identify_raw(meeting.clone(), "dev-1").await;
    let mut stream = resp.bytes_stream();
    let first = stream.next().await.unwrap().unwrap();
    assert!(String::from_utf8_lossy(&first).contains("transcribing"));
    drop(stream);

    // The upload is deleted and no session exists once the job notices.
    let cleaned = app
        .wait_until(|| app.upload_files().is_empty(), Duration::from_secs(5))
        .await;
    assert!(cleaned, "upload temp file was not removed");

    // The device can identify again without hitting the busy gate.
    app.diarizer.set_delay(Duration::ZERO);
    tokio::time::sleep(Duration::from_millis(100)).await;
    let done = app.identify_done(meeting, "dev-1").await;
    assert!(done["meeting_id"].is_string());
}

#[tokio::test]
async fn empty_transcript_reports_no_speech() {
    let app = TestApp::spawn().await;
    app.diarizer.script(vec![], 5_000);

    let meeting = MeetingAudio::new(5_000).into_wav_bytes();
    let done = app.identify_done(meeting, "dev-1").await;
    assert_eq!(done["meeting_id"], Value::Null);
    assert_eq!(done["speakers"].as_array().unwrap().len(), 0);
    assert_eq!(done["message"], "No speech detected in audio");
}

#[tokio::test]
async fn speaker_with_thin_audio_is_low_quality_placeholder() {
    let app = TestApp::spawn().await;
    // B's only utterance is under the 2s stitching floor.
    app.diarizer
        .script(vec![("A", 0, 12_000), ("B", 13_000, 14_500)], 20_000);

    let meeting = MeetingAudio::new(20_000)
        .with_tone(0, 12_000, 400.0)
        .with_tone(13_000, 14_500, 800.0)
        .into_wav_bytes();
    let done = app.identify_done(meeting, "dev-1").await;

    let b = done["speakers"]
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["meeting_speaker_id"] == "B")
        .cloned()
        .unwrap();
    assert_eq!(b["confidence"], "low");
    assert_eq!(b["low_quality"], true);
    assert_eq!(b["candidates"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn new_identification_replaces_previous_session_for_device() {
    let app = TestApp::spawn().await;
    app.diarizer.script(vec![("A", 0, 12_000)], 20_000);
    let meeting = || {
        MeetingAudio::new(20_000)
            .with_tone(0, 12_000, 400.0)
            .into_wav_bytes()
    };

    let first = app.identify_done(meeting(), "dev-1").await;
    let first_id = first["meeting_id"].as_str().unwrap().to_string();
    assert!(app.sessions.get(&first_id).is_some());

    let second = app.identify_done(meeting(), "dev-1").await;
    let second_id = second["meeting_id"].as_str().unwrap().to_string();
    assert_ne!(first_id, second_id);
    assert!(
        app.sessions.get(&first_id).is_none(),
        "previous session should be cleaned up"
    );
    assert!(app.sessions.get(&second_id).is_some());
}
