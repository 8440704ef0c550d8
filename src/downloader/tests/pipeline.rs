use super::*;
use futures::StreamExt;

#[tokio::test]
async fn test_audio_without_codec_completes_with_mp3_name() {
    let (downloader, temp_dir) = create_downloader_with(
        Arc::new(StaticSource::new("Artist_Song | Live", b"raw audio bytes")),
        Arc::new(NoOpTranscoder),
        |_| {},
    )
    .await;

    let job_id = downloader
        .submit(JobRequest::new(VALID_URL, OutputFormat::Audio))
        .await
        .unwrap();
    let snapshot = wait_for_terminal(&downloader, &job_id).await;

    assert_eq!(snapshot.status, JobStatus::Completed);
    assert_eq!(snapshot.progress, 100);
    assert_eq!(snapshot.filename.as_deref(), Some("Artist - Song - Live.mp3"));

    // untranscoded bytes under the requested extension
    let written = std::fs::read(
        temp_dir
            .path()
            .join("downloads")
            .join("Artist - Song - Live.mp3"),
    )
    .unwrap();
    assert_eq!(written, b"raw audio bytes");
}

#[tokio::test]
async fn test_video_completes_with_mp4_name() {
    let (downloader, _temp_dir) = create_test_downloader().await;
    let job_id = downloader
        .submit(JobRequest::new(VALID_URL, OutputFormat::Video))
        .await
        .unwrap();
    let snapshot = wait_for_terminal(&downloader, &job_id).await;
    assert_eq!(snapshot.status, JobStatus::Completed);
    assert!(snapshot.filename.unwrap().ends_with(".mp4"));
}

#[tokio::test]
async fn test_transcoded_job_passes_through_converting() {
    let (downloader, temp_dir) = create_downloader_with(
        Arc::new(StaticSource::new("Converted", b"0123456789abcdefghij")),
        Arc::new(CopyTranscoder { fail: false }),
        |_| {},
    )
    .await;

    let mut updates = downloader.progress.subscribe();
    let job_id = downloader
        .submit(JobRequest::new(VALID_URL, OutputFormat::Audio))
        .await
        .unwrap();
    let snapshot = wait_for_terminal(&downloader, &job_id).await;
    assert_eq!(snapshot.status, JobStatus::Completed);
    assert_eq!(snapshot.filename.as_deref(), Some("Converted.mp3"));

    let mut seen = Vec::new();
    while let Ok(update) = updates.try_recv() {
        if update.job_id == job_id {
            seen.push((update.status, update.progress));
        }
    }

    let downloading_max = seen
        .iter()
        .filter(|(s, _)| *s == JobStatus::Downloading)
        .map(|(_, p)| *p)
        .max()
        .unwrap();
    assert!(downloading_max <= 50, "fetch is scaled into 0-50");
    assert!(seen.contains(&(JobStatus::Converting, 50)));
    assert!(seen.contains(&(JobStatus::Converting, 74)));
    assert_eq!(seen.last(), Some(&(JobStatus::Completed, 100)));

    // progress never goes backwards before the terminal update
    assert!(seen.windows(2).all(|w| w[0].1 <= w[1].1));

    let out = temp_dir.path().join("downloads").join("Converted.mp3");
    assert_eq!(std::fs::read(out).unwrap(), b"0123456789abcdefghij");
}

#[tokio::test]
async fn test_video_is_never_transcoded() {
    let (downloader, _temp_dir) = create_downloader_with(
        Arc::new(StaticSource::new("Clip", b"video bytes")),
        Arc::new(CopyTranscoder { fail: true }),
        |_| {},
    )
    .await;

    let job_id = downloader
        .submit(JobRequest::new(VALID_URL, OutputFormat::Video))
        .await
        .unwrap();
    let snapshot = wait_for_terminal(&downloader, &job_id).await;
    assert_eq!(snapshot.status, JobStatus::Completed);
    assert_eq!(snapshot.filename.as_deref(), Some("Clip.mp4"));
}

#[tokio::test]
async fn test_codec_failure_is_terminal_and_discards_output() {
    let (downloader, temp_dir) = create_downloader_with(
        Arc::new(StaticSource::new("Doomed", b"audio")),
        Arc::new(CopyTranscoder { fail: true }),
        |_| {},
    )
    .await;

    let job_id = downloader
        .submit(JobRequest::new(VALID_URL, OutputFormat::Audio))
        .await
        .unwrap();
    let snapshot = wait_for_terminal(&downloader, &job_id).await;
    wait_until_idle(&downloader).await;

    assert_eq!(snapshot.status, JobStatus::Error);
    assert_eq!(snapshot.progress, 0);
    assert_eq!(snapshot.error.as_deref(), Some("Conversion failed"));
    assert!(snapshot.filename.is_none());

    let leftovers: Vec<_> = std::fs::read_dir(temp_dir.path().join("temp"))
        .unwrap()
        .collect();
    assert!(leftovers.is_empty(), "partial output must be removed");
    let downloads: Vec<_> = std::fs::read_dir(temp_dir.path().join("downloads"))
        .unwrap()
        .collect();
    assert!(downloads.is_empty());
}

#[tokio::test]
async fn test_broken_stream_ends_in_error() {
    let (downloader, temp_dir) = create_downloader_with(
        Arc::new(BrokenStreamSource),
        Arc::new(NoOpTranscoder),
        |_| {},
    )
    .await;

    let job_id = downloader
        .submit(JobRequest::new(VALID_URL, OutputFormat::Video))
        .await
        .unwrap();
    let snapshot = wait_for_terminal(&downloader, &job_id).await;
    wait_until_idle(&downloader).await;

    assert_eq!(snapshot.status, JobStatus::Error);
    assert_eq!(
        snapshot.error.as_deref(),
        Some(crate::error::UPSTREAM_CLIENT_MESSAGE)
    );
    assert_eq!(
        std::fs::read_dir(temp_dir.path().join("temp")).unwrap().count(),
        0
    );
}

#[tokio::test]
async fn test_unavailable_media_reports_friendly_error() {
    let (downloader, _temp_dir) = create_downloader_with(
        Arc::new(FlakySource::unavailable()),
        Arc::new(NoOpTranscoder),
        |_| {},
    )
    .await;

    let job_id = downloader
        .submit(JobRequest::new(VALID_URL, OutputFormat::Audio))
        .await
        .unwrap();
    let snapshot = wait_for_terminal(&downloader, &job_id).await;
    assert_eq!(snapshot.error.as_deref(), Some("Media is unavailable or private"));
}

#[tokio::test]
async fn test_exhausted_strategies_hide_upstream_cause() {
    let (downloader, _temp_dir) = create_downloader_with(
        Arc::new(FlakySource::failing_for(vec![
            PreviewStrategy::Rotated,
            PreviewStrategy::ClientIpBound,
            PreviewStrategy::ClientIpHeaders,
            PreviewStrategy::AlternateHeaders,
            PreviewStrategy::Bare,
        ])),
        Arc::new(NoOpTranscoder),
        |_| {},
    )
    .await;

    let job_id = downloader
        .submit(JobRequest::new(VALID_URL, OutputFormat::Audio))
        .await
        .unwrap();
    let snapshot = wait_for_terminal(&downloader, &job_id).await;
    assert_eq!(snapshot.status, JobStatus::Error);
    assert_eq!(
        snapshot.error.as_deref(),
        Some(crate::error::UPSTREAM_CLIENT_MESSAGE)
    );
}

#[tokio::test]
async fn test_same_title_twice_gets_disambiguated() {
    let (downloader, temp_dir) = create_test_downloader().await;

    let first = downloader
        .submit(JobRequest::new(VALID_URL, OutputFormat::Audio))
        .await
        .unwrap();
    let first = wait_for_terminal(&downloader, &first).await;
    let second = downloader
        .submit(JobRequest::new(VALID_URL, OutputFormat::Audio))
        .await
        .unwrap();
    let second = wait_for_terminal(&downloader, &second).await;

    assert_eq!(first.filename.as_deref(), Some("Test Song.mp3"));
    assert_eq!(second.filename.as_deref(), Some("Test Song (1).mp3"));
    assert!(temp_dir.path().join("downloads/Test Song (1).mp3").exists());
}

#[tokio::test]
async fn test_fetch_timeout_fails_stalled_job() {
    let (downloader, _temp_dir) = create_downloader_with(
        Arc::new(StaticSource::new("Slow", b"0123456789").slow(Duration::from_secs(5))),
        Arc::new(NoOpTranscoder),
        |config| config.download.fetch_timeout = Some(Duration::from_millis(200)),
    )
    .await;

    let job_id = downloader
        .submit(JobRequest::new(VALID_URL, OutputFormat::Audio))
        .await
        .unwrap();
    let snapshot = wait_for_terminal(&downloader, &job_id).await;
    assert_eq!(snapshot.status, JobStatus::Error);
    assert!(snapshot.error.unwrap().starts_with("Download timed out"));
}

#[tokio::test]
async fn test_cancel_job_stops_pipeline() {
    let (downloader, _temp_dir) = create_downloader_with(
        Arc::new(StaticSource::new("Slow", b"0123456789").slow(Duration::from_secs(5))),
        Arc::new(NoOpTranscoder),
        |_| {},
    )
    .await;

    let job_id = downloader
        .submit(JobRequest::new(VALID_URL, OutputFormat::Audio))
        .await
        .unwrap();
    assert!(downloader.cancel_job(&job_id).await);

    let snapshot = wait_for_terminal(&downloader, &job_id).await;
    assert_eq!(snapshot.status, JobStatus::Error);
    assert_eq!(snapshot.error.as_deref(), Some("Download cancelled"));

    wait_until_idle(&downloader).await;
    assert!(!downloader.cancel_job(&job_id).await, "finished jobs cannot be cancelled");
}

#[tokio::test]
async fn test_progress_stream_ends_after_terminal_snapshot() {
    let (downloader, _temp_dir) = create_downloader_with(
        Arc::new(StaticSource::new("Streamed", b"0123456789abcdef").slow(Duration::from_millis(5))),
        Arc::new(NoOpTranscoder),
        |_| {},
    )
    .await;
    let job_id = downloader
        .submit(JobRequest::new(VALID_URL, OutputFormat::Audio))
        .await
        .unwrap();

    let snapshots: Vec<_> = tokio::time::timeout(
        Duration::from_secs(5),
        downloader.progress_stream(job_id.clone()).collect::<Vec<_>>(),
    )
    .await
    .unwrap();

    assert_eq!(snapshots.first().unwrap().status, JobStatus::Downloading);
    assert_eq!(snapshots.last().unwrap().status, JobStatus::Completed);
    assert!(snapshots.iter().all(|s| s.job_id == job_id));
}

#[tokio::test]
async fn test_progress_stream_for_unknown_job_is_single_item() {
    let (downloader, _temp_dir) = create_test_downloader().await;
    let snapshots: Vec<_> = downloader
        .progress_stream(JobId::from("1"))
        .collect()
        .await;
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].error.as_deref(), Some("not found"));
}

#[tokio::test]
async fn test_progress_stream_closes_without_further_writes() {
    let (downloader, _temp_dir) = create_test_downloader().await;
    let job_id = JobId::from("42");
    downloader.progress.seed(job_id.clone(), None);

    let stream = downloader.progress_stream(job_id.clone());
    downloader
        .progress
        .apply(&job_id, crate::progress::ProgressUpdate::completed("done.mp3"))
        .unwrap();

    // nothing else is written to the store after the terminal snapshot
    let snapshots: Vec<_> = tokio::time::timeout(Duration::from_secs(2), stream.collect::<Vec<_>>())
        .await
        .expect("stream should end right after the terminal snapshot");

    let statuses: Vec<_> = snapshots.iter().map(|s| s.status).collect();
    assert_eq!(statuses, vec![JobStatus::Downloading, JobStatus::Completed]);
    assert_eq!(snapshots[1].filename.as_deref(), Some("done.mp3"));
}

#[tokio::test]
async fn test_progress_stream_for_finished_job_is_single_item() {
    let (downloader, _temp_dir) = create_test_downloader().await;
    let job_id = JobId::from("43");
    downloader.progress.seed(job_id.clone(), None);
    downloader
        .progress
        .apply(&job_id, crate::progress::ProgressUpdate::failed("boom"))
        .unwrap();

    let snapshots: Vec<_> = tokio::time::timeout(
        Duration::from_secs(2),
        downloader.progress_stream(job_id).collect::<Vec<_>>(),
    )
    .await
    .unwrap();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].status, JobStatus::Error);
}

#[tokio::test]
async fn test_cancel_while_placing_leaves_no_download() {
    let transcoder = Arc::new(CancellingTranscoder::new());
    let (downloader, temp_dir) = create_downloader_with(
        Arc::new(StaticSource::new("Late", b"0123456789abcdef").slow(Duration::from_millis(20))),
        transcoder.clone(),
        |_| {},
    )
    .await;

    let job_id = downloader
        .submit(JobRequest::new(VALID_URL, OutputFormat::Audio))
        .await
        .unwrap();
    transcoder.arm(job_token(&downloader, &job_id).await);

    let snapshot = wait_for_terminal(&downloader, &job_id).await;
    wait_until_idle(&downloader).await;

    assert_eq!(snapshot.status, JobStatus::Error);
    assert_eq!(snapshot.error.as_deref(), Some("Download cancelled"));
    let downloads: Vec<_> = std::fs::read_dir(temp_dir.path().join("downloads"))
        .unwrap()
        .collect();
    assert!(downloads.is_empty(), "placed file must be removed");
    let leftovers: Vec<_> = std::fs::read_dir(temp_dir.path().join("temp"))
        .unwrap()
        .collect();
    assert!(leftovers.is_empty());
}

#[tokio::test]
async fn test_cancel_while_placing_discards_artifact() {
    let transcoder = Arc::new(CancellingTranscoder::new());
    let (downloader, temp_dir) = create_downloader_with(
        Arc::new(StaticSource::new("Late", b"0123456789abcdef").slow(Duration::from_millis(20))),
        transcoder.clone(),
        |_| {},
    )
    .await;

    let (job_id, handle) = downloader
        .create_artifact(JobRequest::new(VALID_URL, OutputFormat::Audio))
        .await
        .unwrap();
    transcoder.arm(job_token(&downloader, &job_id).await);

    let snapshot = wait_for_terminal(&downloader, &job_id).await;
    wait_until_idle(&downloader).await;

    assert_eq!(snapshot.error.as_deref(), Some("Download cancelled"));
    assert!(downloader.artifacts.get(&handle).await.is_none());
    let leftovers: Vec<_> = std::fs::read_dir(temp_dir.path().join("temp"))
        .unwrap()
        .collect();
    assert!(leftovers.is_empty(), "artifact file must be removed");
}

#[tokio::test]
async fn test_rejected_updates_are_absorbed_by_record() {
    let (downloader, _temp_dir) = create_test_downloader().await;
    let job_id = JobId::from("44");
    downloader.progress.seed(job_id.clone(), None);

    downloader.record(&job_id, crate::progress::ProgressUpdate::completed("a.mp3"));
    // late writes after the terminal snapshot and writes for unknown jobs
    downloader.record(&job_id, crate::progress::ProgressUpdate::progress(10));
    downloader.record(&job_id, crate::progress::ProgressUpdate::failed("late"));
    downloader.record(&JobId::from("45"), crate::progress::ProgressUpdate::progress(10));

    let snapshot = downloader.get_progress(&job_id);
    assert_eq!(snapshot.status, JobStatus::Completed);
    assert_eq!(snapshot.progress, 100);
    assert_eq!(snapshot.filename.as_deref(), Some("a.mp3"));
    assert!(snapshot.error.is_none());
    assert!(downloader.progress.lookup(&JobId::from("45")).is_none());
}
