#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::Duration;

    use ochat::dictation::{discard_audio, recording_path, DictationService, ModelLoader, SpeechModel, TranscriptionError};

    /// Tracks how many transcriptions run at the same time.
    #[derive(Default)]
    struct SlowModel {
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl SpeechModel for SlowModel {
        fn transcribe(&self, audio: &Path) -> Result<String, TranscriptionError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(20));
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(format!("heard {}", audio.file_name().unwrap().to_string_lossy()))
        }
    }

    struct CountingLoader {
        loads: Arc<AtomicUsize>,
        model: Arc<SlowModel>,
        /// Number of initial loads that fail.
        failures: usize,
    }

    impl CountingLoader {
        fn new(failures: usize) -> (Self, Arc<AtomicUsize>, Arc<SlowModel>) {
            let loads = Arc::new(AtomicUsize::new(0));
            let model = Arc::new(SlowModel::default());
            let loader = Self {
                loads: loads.clone(),
                model: model.clone(),
                failures,
            };
            (loader, loads, model)
        }
    }

    impl ModelLoader for CountingLoader {
        fn load(&self) -> Result<Arc<dyn SpeechModel>, TranscriptionError> {
            let attempt = self.loads.fetch_add(1, Ordering::SeqCst);
            // Loading a real model is slow; give racing callers time to pile up
            thread::sleep(Duration::from_millis(50));
            if attempt < self.failures {
                return Err(TranscriptionError::ModelLoad("weights missing".to_string()));
            }
            Ok(self.model.clone())
        }
    }

    #[test]
    fn test_concurrent_first_use_loads_model_once() {
        let (loader, loads, _) = CountingLoader::new(0);
        let service = Arc::new(DictationService::new(loader));
        let barrier = Arc::new(Barrier::new(2));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let service = service.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    service.handle().unwrap()
                })
            })
            .collect();

        let models: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&models[0], &models[1]));
        assert!(service.is_loaded());
    }

    #[test]
    fn test_failed_load_is_retried_by_next_caller() {
        let (loader, loads, _) = CountingLoader::new(1);
        let service = DictationService::new(loader);

        assert!(matches!(service.handle(), Err(TranscriptionError::ModelLoad(_))));
        assert!(!service.is_loaded());

        let first = service.handle().unwrap();
        let second = service.handle().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_missing_audio_is_reported_without_loading() {
        let (loader, loads, _) = CountingLoader::new(0);
        let service = DictationService::new(loader);
        let dir = tempfile::tempdir().unwrap();

        match service.transcribe(&dir.path().join("never-recorded.wav")) {
            Err(TranscriptionError::MissingAudio(path)) => assert!(path.ends_with("never-recorded.wav")),
            other => panic!("expected MissingAudio, got {:?}", other),
        }
        assert_eq!(loads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_transcriptions_are_serialised() {
        let (loader, loads, model) = CountingLoader::new(0);
        let service = Arc::new(DictationService::new(loader));
        let dir = tempfile::tempdir().unwrap();

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let path = dir.path().join(format!("clip-{}.wav", i));
                std::fs::write(&path, b"RIFF").unwrap();
                let service = service.clone();
                thread::spawn(move || service.transcribe(&path).unwrap())
            })
            .collect();

        let mut transcripts: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        transcripts.sort();

        assert_eq!(
            transcripts,
            vec!["heard clip-0.wav", "heard clip-1.wav", "heard clip-2.wav", "heard clip-3.wav"]
        );
        assert_eq!(model.peak.load(Ordering::SeqCst), 1);
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_recording_paths_are_unique_wav_files() {
        let dir = tempfile::tempdir().unwrap();
        let a = recording_path(dir.path());
        let b = recording_path(dir.path());

        assert_ne!(a, b);
        assert_eq!(a.parent(), Some(dir.path()));
        let name = a.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("input_") && name.ends_with(".wav"), "{}", name);
    }

    #[test]
    fn test_discard_audio_is_best_effort() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input_done.wav");
        std::fs::write(&path, b"RIFF").unwrap();

        discard_audio(&path);
        assert!(!path.exists());

        // Already gone: nothing to report
        discard_audio(&path);
    }
}
