use serde_json::Value;

use crate::fixtures::TestApp;
use crate::fixtures::audio::{silence, tone, wav_bytes};

#[tokio::test]
async fn enroll_then_list_then_delete() {
    let app = TestApp::spawn().await;

    let resp = app.enroll("Alice", wav_bytes(&tone(400.0, 12_000))).await;
    assert_eq!(resp.status().as_u16(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["speaker"], "Alice");
    assert_eq!(body["total_samples"], 2);

    assert_eq!(app.speaker_samples("Alice").await, Some(2));

    let resp = app
        .client
        .delete(app.url("/api/speakers/Alice"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    assert_eq!(app.speaker_samples("Alice").await, None);
}

#[tokio::test]
async fn delete_unknown_speaker_is_404() {
    let app = TestApp::spawn().await;
    let resp = app
        .client
        .delete(app.url("/api/speakers/Nobody"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404);
}

#[tokio::test]
async fn enrollment_duration_gate() {
    let app = TestApp::spawn().await;

    // 4.99s raw audio: under the 5s floor.
    let resp = app.enroll("Alice", wav_bytes(&tone(400.0, 4_990))).await;
    assert_eq!(resp.status().as_u16(), 400);
    let body: Value = resp.json().await.unwrap();
    assert!(body["message"].as_str().unwrap().contains("too short"));

    // Exactly 5s raw and fully voiced: passes both gates.
    let resp = app.enroll("Alice", wav_bytes(&tone(400.0, 5_000))).await;
    assert_eq!(resp.status().as_u16(), 200);
}

#[tokio::test]
async fn enrollment_speech_gate_rejects_mostly_silence() {
    let app = TestApp::spawn().await;

    // 8s raw but only ~1.5s of tone.
    let mut samples = silence(6_500);
    samples.extend(tone(400.0, 1_500));
    let resp = app.enroll("Alice", wav_bytes(&samples)).await;
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
async fn short_recording_warns_but_enrolls() {
    let app = TestApp::spawn().await;

    let resp = app.enroll("Alice", wav_bytes(&tone(400.0, 6_000))).await;
    assert_eq!(resp.status().as_u16(), 200);
    let body: Value = resp.json().await.unwrap();
    assert!(body["warning"].as_str().is_some());
}

#[tokio::test]
async fn missing_fields_are_rejected() {
    let app = TestApp::spawn().await;

    let form = reqwest::multipart::Form::new().text("name", "Alice");
    let resp = app
        .client
        .post(app.url("/api/enroll"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);

    let form = reqwest::multipart::Form::new().part(
        "audio",
        reqwest::multipart::Part::bytes(wav_bytes(&tone(400.0, 6_000))).file_name("a.wav"),
    );
    let resp = app
        .client
        .post(app.url("/api/enroll"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
}

#[tokio::test]
async fn repeat_enrollment_counts_through_both_regimes() {
    let app = TestApp::spawn().await;
    let sample = || wav_bytes(&tone(400.0, 12_000));

    // Weighted regime: weight 2 each time until 4 samples.
    let first: Value = app.enroll("Bob", sample()).await.json().await.unwrap();
    assert_eq!(first["total_samples"], 2);
    let second: Value = app.enroll("Bob", sample()).await.json().await.unwrap();
    assert_eq!(second["total_samples"], 4);
    // EMA regime: count moves by 1 regardless of weight.
    let third: Value = app.enroll("Bob", sample()).await.json().await.unwrap();
    assert_eq!(third["total_samples"], 5);
}

#[tokio::test]
async fn sync_endpoint_reports_index_count() {
    let app = TestApp::spawn().await;
    app.enroll("Alice", wav_bytes(&tone(400.0, 12_000))).await;
    app.enroll("Bob", wav_bytes(&tone(700.0, 12_000))).await;

    let resp = app
        .client
        .post(app.url("/api/speakers/sync"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["count"], 2);
}
