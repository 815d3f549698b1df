mod common;

use common::{Call, Faults, RecordingService, args, video};
use gif_dropzone::services::service_handle::HandleState;
use gif_dropzone::utils::validation::is_gif;
use gif_dropzone::widget::{DEFAULT_MESSAGE, OUTPUT_FILE};
use gif_dropzone::{
    ArtifactStore, ConversionPass, ConversionService, ConversionStatus, DragEvent, DragPhase,
    ServiceHandle, Surface, UploadState, UploadWidget, WidgetConfig, WidgetError,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

fn handle_for(service: Arc<RecordingService>) -> Arc<ServiceHandle> {
    ServiceHandle::new(move || service.clone() as Arc<dyn ConversionService>)
}

fn widget_with(service: Arc<RecordingService>) -> (Arc<UploadWidget>, ArtifactStore) {
    let artifacts = ArtifactStore::new();
    let widget = Arc::new(UploadWidget::new(
        WidgetConfig::development(),
        handle_for(service),
        artifacts.clone(),
    ));
    (widget, artifacts)
}

#[tokio::test]
async fn test_convert_clip_end_to_end() {
    let service = Arc::new(RecordingService::new());
    let (widget, artifacts) = widget_with(service.clone());

    let weak: Weak<UploadWidget> = Arc::downgrade(&widget);
    service.observe(move || weak.upgrade().and_then(|w| w.progress()));

    let surface = Surface::new("dropzone");
    widget.bind(&surface);
    surface.dispatch(&mut DragEvent::new(DragPhase::DragEnter, vec![video("clip.mp4")]));
    surface.dispatch(&mut DragEvent::new(DragPhase::Drop, vec![video("clip.mp4")]));

    assert_eq!(widget.selected_file().unwrap().name, "clip.mp4");
    assert_eq!(widget.message(), "clip.mp4");
    assert_eq!(widget.convert_label(), "convert");
    assert!(widget.can_convert());
    assert!(!widget.can_download());

    let artifact = widget.convert().await.unwrap();

    assert_eq!(
        service.calls(),
        vec![
            Call::Load,
            Call::Write("clip.mp4".to_string(), 64),
            Call::Run(args(&[
                "-i",
                "clip.mp4",
                "-filter_complex",
                "[0:v] palettegen",
                "palette.png"
            ])),
            Call::Run(args(&[
                "-i",
                "clip.mp4",
                "-i",
                "palette.png",
                "-filter_complex",
                "[0:v][1:v] paletteuse",
                "output.gif"
            ])),
            Call::Read(OUTPUT_FILE.to_string()),
        ]
    );

    // Seven ticks per pass; the first seven are the palette pass.
    let observed: Vec<u8> = service
        .observed
        .lock()
        .unwrap()
        .iter()
        .map(|v| v.expect("progress set after first tick"))
        .collect();
    assert_eq!(observed.len(), 14);
    assert!(observed.windows(2).all(|w| w[0] <= w[1]));
    assert!(observed[..7].iter().all(|p| *p <= 50));
    assert!(observed[7..].iter().all(|p| (50..=100).contains(p)));
    assert_eq!(observed[6], 50);

    assert_eq!(widget.progress(), Some(100));
    assert_eq!(widget.convert_label(), "convert (100%)");
    assert_eq!(widget.status(), ConversionStatus::Completed);
    assert_eq!(widget.upload_state(), UploadState::Loaded);
    assert!(widget.can_download());

    assert_eq!(artifact.mime_type, "image/gif");
    assert_eq!(artifact.source_name, "clip.mp4");
    let data = widget.download().unwrap();
    assert!(is_gif(&data));
    assert_eq!(artifacts.resolve(&artifact.url).unwrap().data, data);
}

#[tokio::test]
async fn test_convert_without_selection_fails_fast() {
    let service = Arc::new(RecordingService::new());
    let (widget, _) = widget_with(service.clone());

    assert!(!widget.can_convert());
    let err = widget.convert().await.unwrap_err();
    assert!(matches!(err, WidgetError::NoFileSelected));
    assert!(service.calls().is_empty());
    assert_eq!(widget.progress(), None);
    assert_eq!(widget.status(), ConversionStatus::Idle);
}

#[tokio::test]
async fn test_browse_selection_rules() {
    let service = Arc::new(RecordingService::new());
    let (widget, _) = widget_with(service);

    assert_eq!(widget.upload_state(), UploadState::Empty);

    let err = widget.select_files(&[]).unwrap_err();
    assert!(matches!(err, WidgetError::SelectionRejected(_)));
    assert!(widget.selected_file().is_none());

    assert!(widget
        .select_files(&[video("a.mp4"), video("b.mov")])
        .is_err());
    assert!(widget.selected_file().is_none());
    assert_eq!(widget.message(), DEFAULT_MESSAGE);

    assert!(widget.select_files(&[video("notes.txt")]).is_err());
    assert!(widget.selected_file().is_none());

    widget.select_files(&[video("Holiday.MKV")]).unwrap();
    assert_eq!(widget.selected_file().unwrap().name, "Holiday.MKV");
    assert_eq!(widget.upload_state(), UploadState::Loaded);

    // A rejected selection keeps the previous file.
    assert!(widget.select_files(&[video("a.webm"), video("b.webm")]).is_err());
    assert_eq!(widget.message(), "Holiday.MKV");
}

#[tokio::test]
async fn test_failed_palette_pass_stops_pipeline() {
    let service = Arc::new(RecordingService::with_faults(Faults {
        fail_run: Some(0),
        ..Faults::default()
    }));
    let (widget, _) = widget_with(service.clone());
    widget.select_files(&[video("clip.mp4")]).unwrap();

    let err = widget.convert().await.unwrap_err();
    assert!(matches!(
        err,
        WidgetError::ConversionCommandFailed {
            pass: ConversionPass::Palette,
            ..
        }
    ));
    assert_eq!(service.run_count(), 1);
    assert!(!service.calls().contains(&Call::Read(OUTPUT_FILE.to_string())));

    assert!(matches!(widget.status(), ConversionStatus::Failed(_)));
    assert!(!widget.can_download());
    assert!(widget.artifact().is_none());
    // Frozen at the last tick (0.3 of the palette pass) and retry is allowed.
    assert_eq!(widget.progress(), Some(15));
    assert!(widget.can_convert());
}

#[tokio::test]
async fn test_failed_encode_pass_keeps_artifact_unset() {
    let service = Arc::new(RecordingService::with_faults(Faults {
        fail_run: Some(1),
        ..Faults::default()
    }));
    let (widget, _) = widget_with(service.clone());
    widget.select_files(&[video("clip.webm")]).unwrap();

    let err = widget.convert().await.unwrap_err();
    assert!(matches!(
        err,
        WidgetError::ConversionCommandFailed {
            pass: ConversionPass::Encode,
            ..
        }
    ));
    assert_eq!(widget.progress(), Some(65));
    assert!(widget.artifact().is_none());
    assert_ne!(widget.status(), ConversionStatus::Completed);
}

#[tokio::test]
async fn test_missing_output_is_reported() {
    let service = Arc::new(RecordingService::with_faults(Faults {
        skip_outputs: true,
        ..Faults::default()
    }));
    let (widget, _) = widget_with(service);
    widget.select_files(&[video("clip.avi")]).unwrap();

    let err = widget.convert().await.unwrap_err();
    assert!(matches!(&err, WidgetError::WorkingStorageMissing(name) if name == OUTPUT_FILE));
    assert!(err.is_conversion_failure());
    assert!(!widget.can_download());
    assert!(matches!(widget.status(), ConversionStatus::Failed(_)));
}

#[tokio::test]
async fn test_service_load_failure_is_surfaced_and_retryable() {
    let service = Arc::new(RecordingService::with_faults(Faults {
        fail_load: true,
        ..Faults::default()
    }));
    let handle = handle_for(service.clone());
    let widget = UploadWidget::new(WidgetConfig::development(), handle.clone(), ArtifactStore::new());
    widget.select_files(&[video("clip.mov")]).unwrap();

    let err = widget.convert().await.unwrap_err();
    assert!(matches!(err, WidgetError::ServiceLoadFailed(_)));
    assert!(matches!(widget.status(), ConversionStatus::Failed(_)));
    assert_eq!(widget.progress(), None);
    assert_eq!(handle.state(), HandleState::Unloaded);
    assert_eq!(service.run_count(), 0);

    // No automatic retry; a second convert starts a second load.
    let _ = widget.convert().await;
    assert_eq!(handle.load_attempts(), 2);
}

#[tokio::test]
async fn test_concurrent_first_use_loads_once() {
    let service = Arc::new(RecordingService::new().load_delay(Duration::from_millis(50)));
    let created = Arc::new(AtomicUsize::new(0));
    let handle = {
        let service = service.clone();
        let created = created.clone();
        ServiceHandle::new(move || {
            created.fetch_add(1, Ordering::SeqCst);
            service.clone() as Arc<dyn ConversionService>
        })
    };

    let (a, b) = tokio::join!(handle.get(), handle.get());
    assert!(a.is_ok() && b.is_ok());
    assert_eq!(created.load(Ordering::SeqCst), 1);
    assert_eq!(handle.load_attempts(), 1);
    assert_eq!(
        service.calls().iter().filter(|c| **c == Call::Load).count(),
        1
    );
    assert_eq!(handle.state(), HandleState::Ready);
}

#[tokio::test]
async fn test_concurrent_failed_load_is_shared() {
    let service = Arc::new(
        RecordingService::with_faults(Faults {
            fail_load: true,
            ..Faults::default()
        })
        .load_delay(Duration::from_millis(20)),
    );
    let handle = handle_for(service.clone());

    let (a, b, c) = tokio::join!(handle.get(), handle.get(), handle.get());
    assert!(a.is_err() && b.is_err() && c.is_err());
    assert_eq!(handle.load_attempts(), 1);
    assert_eq!(handle.state(), HandleState::Unloaded);
}

#[tokio::test]
async fn test_reentrant_convert_is_rejected() {
    let service = Arc::new(RecordingService::new().run_delay(Duration::from_millis(30)));
    let (widget, _) = widget_with(service.clone());
    widget.select_files(&[video("clip.mp4")]).unwrap();

    let (first, second) = tokio::join!(widget.convert(), async {
        tokio::task::yield_now().await;
        assert_eq!(widget.upload_state(), UploadState::Loading);
        assert!(!widget.can_convert());
        widget.convert().await
    });

    assert!(first.is_ok());
    assert!(matches!(second, Err(WidgetError::ConversionInProgress)));
    assert_eq!(service.run_count(), 2);
    assert!(widget.can_convert());
}

#[tokio::test]
async fn test_reconvert_replaces_previous_artifact() {
    let service = Arc::new(RecordingService::new());
    let (widget, artifacts) = widget_with(service);
    widget.select_files(&[video("clip.mp4")]).unwrap();

    let first = widget.convert().await.unwrap();
    let second = widget.convert().await.unwrap();

    assert_ne!(first.url, second.url);
    assert!(artifacts.resolve(&first.url).is_none());
    assert!(artifacts.resolve(&second.url).is_some());
    assert_eq!(artifacts.len(), 1);
}

#[tokio::test]
async fn test_widgets_share_one_service_instance() {
    let service = Arc::new(RecordingService::new());
    let handle = handle_for(service.clone());
    let artifacts = ArtifactStore::new();

    let a = UploadWidget::new(WidgetConfig::development(), handle.clone(), artifacts.clone());
    let b = UploadWidget::new(WidgetConfig::development(), handle.clone(), artifacts.clone());
    a.select_files(&[video("one.mp4")]).unwrap();
    b.select_files(&[video("two.mp4")]).unwrap();

    a.convert().await.unwrap();
    b.convert().await.unwrap();

    assert_eq!(handle.load_attempts(), 1);
    assert_eq!(
        service.calls().iter().filter(|c| **c == Call::Load).count(),
        1
    );
    assert_eq!(artifacts.len(), 2);

    drop(a);
    assert_eq!(artifacts.len(), 1);
}

#[tokio::test]
async fn test_widgets_sharing_a_service_take_turns() {
    let service = Arc::new(RecordingService::new().run_delay(Duration::from_millis(10)));
    let handle = handle_for(service.clone());
    let artifacts = ArtifactStore::new();

    let a = UploadWidget::new(WidgetConfig::development(), handle.clone(), artifacts.clone());
    let b = UploadWidget::new(WidgetConfig::development(), handle.clone(), artifacts.clone());
    a.select_files(&[video("one.mp4")]).unwrap();
    b.select_files(&[video("two.mp4")]).unwrap();

    let (first, second) = tokio::join!(a.convert(), b.convert());
    assert!(first.is_ok() && second.is_ok());

    // Each pipeline's write, two passes and read stay contiguous.
    let pipelines: Vec<Vec<Call>> = service
        .calls()
        .into_iter()
        .filter(|c| *c != Call::Load)
        .collect::<Vec<_>>()
        .chunks(4)
        .map(|chunk| chunk.to_vec())
        .collect();
    assert_eq!(pipelines.len(), 2);
    for pipeline in &pipelines {
        let Call::Write(name, _) = &pipeline[0] else {
            panic!("pipeline must start with a write: {:?}", pipeline);
        };
        assert_eq!(pipeline[1], Call::Run(args(&[
            "-i",
            name.as_str(),
            "-filter_complex",
            "[0:v] palettegen",
            "palette.png"
        ])));
        assert!(matches!(&pipeline[2], Call::Run(encode) if encode[1] == *name));
        assert_eq!(pipeline[3], Call::Read(OUTPUT_FILE.to_string()));
    }
}
