use std::io::Cursor;
use std::time::Duration;

use serde_json::Value;

use crate::fixtures::TestApp;
use crate::fixtures::audio::{MeetingAudio, tone, wav_bytes};

/// Sets up a meeting whose speaker "A" is a medium-confidence match for
/// "Alice" (a 50 Hz-apart "Alison" keeps the margin under 0.10).
async fn medium_confidence_meeting(app: &TestApp) -> String {
    app.enroll("Alice", wav_bytes(&tone(400.0, 12_000))).await;
    app.enroll("Alison", wav_bytes(&tone(450.0, 12_000))).await;

    app.diarizer.script(vec![("A", 0, 12_000)], 20_000);
    let meeting = MeetingAudio::new(20_000)
        .with_tone(0, 12_000, 400.0)
        .into_wav_bytes();
    let done = app.identify_done(meeting, "dev-1").await;

    let speaker = &done["speakers"][0];
    assert_eq!(speaker["confidence"], "medium", "fixture expects medium");
    assert!(speaker["needs_confirmation"].as_bool().unwrap());
    assert_eq!(speaker["assigned_name"], Value::Null);

    done["meeting_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn confirm_with_enroll_reinforces_and_cleanup_follows_summary() {
    let app = TestApp::spawn().await;
    let meeting_id = medium_confidence_meeting(&app).await;
    assert_eq!(app.speaker_samples("Alice").await, Some(2));

    let resp = app
        .client
        .post(app.url("/api/confirm-speaker"))
        .form(&[
            ("meeting_id", meeting_id.as_str()),
            ("speaker_id", "A"),
            ("confirmed_name", "Alice"),
            ("enroll", "true"),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["ok"], true);
    assert_eq!(body["enrolled"], true);
    // Weighted regime: +1 for a weight-1 meeting sample.
    assert_eq!(body["total_samples"], 3);
    assert_eq!(body["session_cleaned_up"], false, "summary still missing");

    assert_eq!(app.speaker_samples("Alice").await, Some(3));

    // The session snapshot reflects the confirmation.
    let snapshot: Value = app
        .client
        .get(app.url(&format!("/api/meeting/{meeting_id}")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(snapshot["speakers"][0]["confidence"], "high");
    assert_eq!(snapshot["speakers"][0]["assigned_name"], "Alice");
    assert_eq!(snapshot["pending_speakers"].as_array().unwrap().len(), 0);

    // Summary generation is the last gate; afterwards the session is gone.
    let resp = app
        .client
        .post(app.url(&format!("/api/meeting/{meeting_id}/summary")))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["summary"]["key_decisions"][0], "Ship on Friday");

    let gone = app
        .wait_until(
            || app.sessions.get(&meeting_id).is_none(),
            Duration::from_secs(2),
        )
        .await;
    assert!(gone, "session should be cleaned up after summary");

    let resp = app
        .client
        .get(app.url(&format!("/api/meeting/{meeting_id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404);

    // The summarizer saw the confirmed name in the transcript.
    let transcripts = app.summarizer.transcripts_seen();
    assert!(transcripts[0].starts_with("Alice:"));
}

#[tokio::test]
async fn confirm_without_enroll_skips_reinforcement() {
    let app = TestApp::spawn().await;
    let meeting_id = medium_confidence_meeting(&app).await;

    let resp = app
        .client
        .post(app.url("/api/confirm-speaker"))
        .form(&[
            ("meeting_id", meeting_id.as_str()),
            ("speaker_id", "A"),
            ("confirmed_name", "Alice"),
            ("enroll", "false"),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["enrolled"], false);
    assert_eq!(app.speaker_samples("Alice").await, Some(2));
}

#[tokio::test]
async fn confirm_validations() {
    let app = TestApp::spawn().await;
    let meeting_id = medium_confidence_meeting(&app).await;

    // Unknown meeting.
    let resp = app
        .client
        .post(app.url("/api/confirm-speaker"))
        .form(&[
            ("meeting_id", "ffffffffffffffffffffffffffffffff"),
            ("speaker_id", "A"),
            ("confirmed_name", "Alice"),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404);

    // Unknown speaker label.
    let resp = app
        .client
        .post(app.url("/api/confirm-speaker"))
        .form(&[
            ("meeting_id", meeting_id.as_str()),
            ("speaker_id", "Q"),
            ("confirmed_name", "Alice"),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404);

    // Blank name.
    let resp = app
        .client
        .post(app.url("/api/confirm-speaker"))
        .form(&[
            ("meeting_id", meeting_id.as_str()),
            ("speaker_id", "A"),
            ("confirmed_name", "   "),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);

    // Confirming twice: the label is no longer pending.
    app.client
        .post(app.url("/api/confirm-speaker"))
        .form(&[
            ("meeting_id", meeting_id.as_str()),
            ("speaker_id", "A"),
            ("confirmed_name", "Alice"),
        ])
        .send()
        .await
        .unwrap();
    let resp = app
        .client
        .post(app.url("/api/confirm-speaker"))
        .form(&[
            ("meeting_id", meeting_id.as_str()),
            ("speaker_id", "A"),
            ("confirmed_name", "Alice"),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
}

/// A meeting where speaker "B" matched medium but with too little speech
/// to reinforce from.
async fn meeting_with_low_quality_speaker(app: &TestApp) -> String {
    app.enroll("Alice", wav_bytes(&tone(400.0, 12_000))).await;
    app.enroll("Alison", wav_bytes(&tone(450.0, 12_000))).await;

    // B speaks for 3s total: embeddable, but under the 8s quality floor.
    app.diarizer
        .script(vec![("A", 0, 12_000), ("B", 13_000, 16_000)], 20_000);
    let meeting = MeetingAudio::new(20_000)
        .with_tone(0, 12_000, 400.0)
        .with_tone(13_000, 16_000, 450.0)
        .into_wav_bytes();
    let done = app.identify_done(meeting, "dev-1").await;

    let b = done["speakers"]
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["meeting_speaker_id"] == "B")
        .cloned()
        .unwrap();
    assert_eq!(b["low_quality"], true);
    assert_eq!(b["confidence"], "medium");

    done["meeting_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn enroll_from_meeting_rejects_low_quality_speech() {
    let app = TestApp::spawn().await;
    let meeting_id = meeting_with_low_quality_speaker(&app).await;

    let resp = app
        .client
        .post(app.url("/api/enroll-from-meeting"))
        .form(&[
            ("meeting_id", meeting_id.as_str()),
            ("speaker_id", "B"),
            ("speaker_name", "Bob"),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
    let body: Value = resp.json().await.unwrap();
    assert!(
        body["message"]
            .as_str()
            .unwrap()
            .contains("Not enough speech")
    );
}

#[tokio::test]
async fn confirm_low_quality_succeeds_but_skips_reinforcement() {
    let app = TestApp::spawn().await;
    let meeting_id = meeting_with_low_quality_speaker(&app).await;
    assert_eq!(app.speaker_samples("Alison").await, Some(2));

    let resp = app
        .client
        .post(app.url("/api/confirm-speaker"))
        .form(&[
            ("meeting_id", meeting_id.as_str()),
            ("speaker_id", "B"),
            ("confirmed_name", "Alison"),
            ("enroll", "true"),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["ok"], true);
    assert_eq!(body["enrolled"], false, "low quality skips reinforcement");
    assert_eq!(app.speaker_samples("Alison").await, Some(2));
}

#[tokio::test]
async fn enroll_from_meeting_registers_new_speaker() {
    let app = TestApp::spawn().await;
    app.diarizer.script(vec![("A", 0, 12_000)], 20_000);
    let meeting = MeetingAudio::new(20_000)
        .with_tone(0, 12_000, 700.0)
        .into_wav_bytes();
    let done = app.identify_done(meeting, "dev-1").await;
    let meeting_id = done["meeting_id"].as_str().unwrap();
    assert_eq!(done["speakers"][0]["confidence"], "low");

    let resp = app
        .client
        .post(app.url("/api/enroll-from-meeting"))
        .form(&[
            ("meeting_id", meeting_id),
            ("speaker_id", "A"),
            ("speaker_name", "Carol"),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["speaker"], "Carol");
    assert_eq!(body["total_samples"], 1);

    assert_eq!(app.speaker_samples("Carol").await, Some(1));

    // The same voice now identifies as Carol.
    let meeting = MeetingAudio::new(20_000)
        .with_tone(0, 12_000, 700.0)
        .into_wav_bytes();
    let done = app.identify_done(meeting, "dev-1").await;
    assert_eq!(done["speakers"][0]["assigned_name"], "Carol");
    assert_eq!(done["speakers"][0]["confidence"], "high");
}

#[tokio::test]
async fn clip_endpoint_serves_capped_wav() {
    let app = TestApp::spawn().await;
    app.diarizer.script(vec![("A", 0, 12_000)], 20_000);
    let meeting = MeetingAudio::new(20_000)
        .with_tone(0, 12_000, 400.0)
        .into_wav_bytes();
    let done = app.identify_done(meeting, "dev-1").await;
    let meeting_id = done["meeting_id"].as_str().unwrap();

    let resp = app
        .client
        .get(app.url(&format!("/api/meeting/{meeting_id}/speaker/A/clip")))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    assert_eq!(
        resp.headers().get("content-type").unwrap().to_str().unwrap(),
        "audio/wav"
    );

    let bytes = resp.bytes().await.unwrap();
    let reader = hound::WavReader::new(Cursor::new(bytes.to_vec())).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.sample_rate, 16_000);
    assert_eq!(spec.channels, 1);
    let duration_ms = reader.duration() as u64 * 1000 / 16_000;
    assert!(duration_ms <= 5_000, "clip capped at 5s, got {duration_ms}ms");
    assert!(duration_ms >= 2_000, "clip should carry speech");

    // Unknown speaker and unknown meeting both 404.
    let resp = app
        .client
        .get(app.url(&format!("/api/meeting/{meeting_id}/speaker/Q/clip")))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404);
    let resp = app
        .client
        .get(app.url("/api/meeting/ffffffffffffffffffffffffffffffff/speaker/A/clip"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404);
}

#[tokio::test]
async fn explicit_cleanup_removes_session_and_audio() {
    let app = TestApp::spawn().await;
    app.diarizer.script(vec![("A", 0, 12_000)], 20_000);
    let meeting = MeetingAudio::new(20_000)
        .with_tone(0, 12_000, 400.0)
        .into_wav_bytes();
    let done = app.identify_done(meeting, "dev-1").await;
    let meeting_id = done["meeting_id"].as_str().unwrap().to_string();

    let audio_path = app.sessions.get(&meeting_id).unwrap().audio_path.clone();
    assert!(audio_path.exists());

    let resp = app
        .client
        .post(app.url(&format!("/api/meeting/{meeting_id}/cleanup")))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    assert!(!audio_path.exists(), "session audio should be unlinked");

    let resp = app
        .client
        .post(app.url(&format!("/api/meeting/{meeting_id}/cleanup")))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404);
}

#[tokio::test]
async fn summary_provider_failure_is_bad_gateway() {
    let app = TestApp::spawn().await;
    app.diarizer.script(vec![("A", 0, 12_000)], 20_000);
    let meeting = MeetingAudio::new(20_000)
        .with_tone(0, 12_000, 400.0)
        .into_wav_bytes();
    let done = app.identify_done(meeting, "dev-1").await;
    let meeting_id = done["meeting_id"].as_str().unwrap();

    app.summarizer.fail_next();
    let resp = app
        .client
        .post(app.url(&format!("/api/meeting/{meeting_id}/summary")))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 502);

    // The session survives a failed summary and a retry works.
    let resp = app
        .client
        .post(app.url(&format!("/api/meeting/{meeting_id}/summary")))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    // Cached copy is now served on GET.
    let resp = app
        .client
        .get(app.url(&format!("/api/meeting/{meeting_id}/summary")))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
}
